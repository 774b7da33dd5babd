// Detector topology
pub const NUMBER_OF_SUPERMODULES: usize = 18;
pub const NUMBER_OF_STACKS: usize = 5;
pub const NUMBER_OF_LAYERS: usize = 6;
pub const CHAMBERS_PER_SUPERMODULE: usize = NUMBER_OF_STACKS * NUMBER_OF_LAYERS;
pub const NUMBER_OF_CHAMBERS: usize = NUMBER_OF_SUPERMODULES * CHAMBERS_PER_SUPERMODULE;
pub const NUMBER_OF_SIDES: usize = 2;
pub const NUMBER_OF_ENDPOINTS: usize = 2;
/// The stack with the short (C0) chambers
pub const C0_STACK: usize = 2;
pub const ROBS_PER_C0_CHAMBER: u8 = 6;
pub const ROBS_PER_C1_CHAMBER: u8 = 8;
pub const MCMS_PER_ROB: u8 = 16;
pub const MCM_ROWS_PER_ROB: u8 = 4;
pub const MCM_COLS_PER_ROB: u8 = 4;
pub const ADC_CHANNELS_PER_MCM: usize = 21;
pub const TIMEBINS: usize = 30;

// Readout topology
pub const LINKS_PER_HALF_CRU: usize = 15;
pub const NUMBER_OF_HALF_CRUS: usize =
    NUMBER_OF_SUPERMODULES * NUMBER_OF_SIDES * NUMBER_OF_ENDPOINTS;
pub const NUMBER_OF_CRUS: usize = NUMBER_OF_HALF_CRUS / NUMBER_OF_ENDPOINTS;
pub const NUMBER_OF_LINKS: usize = NUMBER_OF_HALF_CRUS * LINKS_PER_HALF_CRU;

// Word sizes. Link lengths on the wire are counted in 256 bit units.
pub const WORD_SIZE_BYTES: usize = 4;
pub const CRU_UNIT_WORDS: usize = 8;
pub const CRU_UNIT_BYTES: usize = CRU_UNIT_WORDS * WORD_SIZE_BYTES;

// Wire markers
pub const HALF_CRU_HEADER_SIZE: usize = 64;
pub const HALF_CRU_HEADER_VERSION: u8 = 6;
pub const TRACKLET_END_MARKER: u32 = 0x1000_1000;
pub const DIGIT_END_MARKER: u32 = 0x0000_0000;
pub const PADDING_BYTE: u8 = 0xee;
pub const PADDING_WORD: u32 = 0xeeee_eeee;
pub const MAX_TRACKLETS_PER_MCM: usize = 3;
pub const UNUSED_CHARGE_FIELD: u8 = 0xff;
pub const DIGIT_MCM_HEADER_RESERVED: u32 = 0xc;
pub const DIGIT_HC_HEADER_RESERVED: u32 = 0b01;
pub const DIGIT_WORDS_PER_CHANNEL: usize = TIMEBINS / 3;
pub const DIGIT_WORDS_PER_MCM: usize = ADC_CHANNELS_PER_MCM * DIGIT_WORDS_PER_CHANNEL;
pub const DIGIT_SAMPLE_FLAG: u32 = 0b01;
pub const DIGIT_BLANK_FLAG: u32 = 0b10;
pub const ADC_MASK: u16 = 0x3ff;
pub const DIGIT_HC_HEADER_MAJOR: u8 = 0x20;
pub const DIGIT_HC_HEADER_MINOR: u8 = 0;
pub const TRACKLET_HC_HEADER_FORMAT: u8 = 1;
pub const TRACKLET_FORMAT: u8 = 1;

// Raw data header (hardware block header)
pub const RDH_SIZE: usize = 64;
pub const RDH_VERSION: u8 = 6;
pub const TRD_SOURCE_ID: u8 = 4;
pub const TRD_LINK_ID: u8 = 15;
pub const PHYSICS_TRIGGER: u32 = 0x10;
pub const MAX_PAGE_SIZE: usize = u16::MAX as usize;
/// Bunch crossings are 12 bits wide in the RDH and the half-CRU header
pub const MAX_BUNCH_CROSSING: u16 = 0x0fff;

// Defaults for the configuration
pub const DEFAULT_MAX_HALF_CRU_BYTES: usize = 4 * 1024 * 1024;
pub const DEFAULT_PAGE_SIZE: usize = 8192;
