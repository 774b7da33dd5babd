//! Pack and unpack functions for every structure found inside a half-CRU payload.
//!
//! Each structure is a plain value type with a `pack` method producing its wire words and
//! an `unpack` constructor that validates marker bits. Bit ranges are `[low..high)` and all
//! words are little endian on the wire.
use byteorder::{ByteOrder, LittleEndian};

use super::constants::*;
use super::error::{CursorError, LinkParseError, RawDataError};

const PHYSICS_EVENT_TYPE: u8 = 1;

/// Extract `width` bits starting at bit `low`
fn field(word: u32, low: u32, width: u32) -> u32 {
    (word >> low) & ((1 << width) - 1)
}

/// Place the low `width` bits of `value` at bit `low`
fn place(value: u32, low: u32, width: u32) -> u32 {
    (value & ((1 << width) - 1)) << low
}

/// Append a 32 bit word to a byte buffer in wire order
pub fn push_word(buffer: &mut Vec<u8>, word: u32) {
    let mut bytes = [0u8; WORD_SIZE_BYTES];
    LittleEndian::write_u32(&mut bytes, word);
    buffer.extend_from_slice(&bytes);
}

/// Number of 256 bit units a link of `words` 32 bit words occupies, and the number of
/// padding words needed to fill the last unit. An empty link still occupies one unit.
pub fn link_size_padding(words: usize) -> (usize, usize) {
    if words == 0 {
        return (1, CRU_UNIT_WORDS);
    }
    let remainder = words % CRU_UNIT_WORDS;
    if remainder == 0 {
        (words / CRU_UNIT_WORDS, 0)
    } else {
        (words / CRU_UNIT_WORDS + 1, CRU_UNIT_WORDS - remainder)
    }
}

/// Convert a link length in 256 bit units to bytes. The only place this conversion happens.
pub fn units_to_bytes(units: u16) -> usize {
    units as usize * CRU_UNIT_BYTES
}

/// The 64 byte header in front of every half-CRU payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfCruHeader {
    pub version: u8,
    pub bc: u16,
    pub stop: u8,
    pub endpoint: u8,
    pub event_type: u8,
    pub fee_id: u16,
    pub cru_id: u16,
    pub link_errors: [u8; LINKS_PER_HALF_CRU],
    pub link_sizes: [u16; LINKS_PER_HALF_CRU],
}

impl Default for HalfCruHeader {
    fn default() -> Self {
        Self {
            version: HALF_CRU_HEADER_VERSION,
            bc: 0,
            stop: 0,
            endpoint: 0,
            event_type: PHYSICS_EVENT_TYPE,
            fee_id: 0,
            cru_id: 0,
            link_errors: [0; LINKS_PER_HALF_CRU],
            link_sizes: [0; LINKS_PER_HALF_CRU],
        }
    }
}

impl HalfCruHeader {
    pub fn unpack(bytes: &[u8]) -> Result<Self, RawDataError> {
        if bytes.len() < HALF_CRU_HEADER_SIZE {
            return Err(RawDataError::Cursor(CursorError::OutOfData {
                requested: HALF_CRU_HEADER_SIZE,
                offset: 0,
                remaining: bytes.len(),
            }));
        }
        let word0 = LittleEndian::read_u64(&bytes[0..8]);
        let header = Self {
            version: (word0 & 0xff) as u8,
            bc: ((word0 >> 8) & 0xfff) as u16,
            stop: ((word0 >> 20) & 0xf) as u8,
            endpoint: ((word0 >> 24) & 0xf) as u8,
            event_type: ((word0 >> 28) & 0xf) as u8,
            fee_id: ((word0 >> 32) & 0xffff) as u16,
            cru_id: ((word0 >> 48) & 0xfff) as u16,
            link_errors: {
                let mut errors = [0u8; LINKS_PER_HALF_CRU];
                errors.copy_from_slice(&bytes[8..8 + LINKS_PER_HALF_CRU]);
                errors
            },
            link_sizes: {
                let mut sizes = [0u16; LINKS_PER_HALF_CRU];
                LittleEndian::read_u16_into(&bytes[32..32 + 2 * LINKS_PER_HALF_CRU], &mut sizes);
                sizes
            },
        };

        if header.version != HALF_CRU_HEADER_VERSION {
            return Err(RawDataError::BadHalfCruVersion(header.version));
        }
        if header.cru_id as usize >= NUMBER_OF_CRUS || header.endpoint as usize >= NUMBER_OF_ENDPOINTS
        {
            return Err(RawDataError::BadHalfCruAddress(
                header.cru_id,
                header.endpoint,
            ));
        }
        Ok(header)
    }

    pub fn pack(&self) -> [u8; HALF_CRU_HEADER_SIZE] {
        let mut bytes = [0u8; HALF_CRU_HEADER_SIZE];
        let word0: u64 = self.version as u64
            | ((self.bc as u64 & 0xfff) << 8)
            | ((self.stop as u64 & 0xf) << 20)
            | ((self.endpoint as u64 & 0xf) << 24)
            | ((self.event_type as u64 & 0xf) << 28)
            | ((self.fee_id as u64) << 32)
            | ((self.cru_id as u64 & 0xfff) << 48);
        LittleEndian::write_u64(&mut bytes[0..8], word0);
        bytes[8..8 + LINKS_PER_HALF_CRU].copy_from_slice(&self.link_errors);
        LittleEndian::write_u16_into(
            &self.link_sizes,
            &mut bytes[32..32 + 2 * LINKS_PER_HALF_CRU],
        );
        bytes
    }

    /// Index of this half-CRU among all 72
    pub fn half_cru_index(&self) -> usize {
        self.cru_id as usize * NUMBER_OF_ENDPOINTS + self.endpoint as usize
    }

    pub fn total_units(&self) -> usize {
        self.link_sizes.iter().map(|size| *size as usize).sum()
    }

    /// Size of the payload following this header in bytes
    pub fn total_bytes(&self) -> usize {
        self.total_units() * CRU_UNIT_BYTES
    }
}

/// Chip header in front of up to three tracklet data words.
///
/// `charge_slots[i]` is the `pid<i>` field. The k-th tracklet of a chip occupies slot
/// `2 - k`; unused slots hold 0xff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackletMcmHeader {
    pub padrow: u8,
    pub col: u8,
    pub charge_slots: [u8; MAX_TRACKLETS_PER_MCM],
}

impl TrackletMcmHeader {
    pub fn new(padrow: u8, col: u8) -> Self {
        Self {
            padrow,
            col,
            charge_slots: [UNUSED_CHARGE_FIELD; MAX_TRACKLETS_PER_MCM],
        }
    }

    /// True if the word carries the two marker bits of a chip header
    pub fn is_header(word: u32) -> bool {
        field(word, 0, 1) == 1 && field(word, 31, 1) == 1
    }

    pub fn unpack(word: u32) -> Result<Self, LinkParseError> {
        if !Self::is_header(word) {
            return Err(LinkParseError::BadTrackletMcmHeader(word));
        }
        let header = Self {
            padrow: field(word, 27, 4) as u8,
            col: field(word, 25, 2) as u8,
            charge_slots: [
                field(word, 1, 8) as u8,
                field(word, 9, 8) as u8,
                field(word, 17, 8) as u8,
            ],
        };
        if header.tracklet_count() == 0 {
            return Err(LinkParseError::BadTrackletMcmHeader(word));
        }
        Ok(header)
    }

    pub fn pack(&self) -> u32 {
        place(1, 0, 1)
            | place(self.charge_slots[0] as u32, 1, 8)
            | place(self.charge_slots[1] as u32, 9, 8)
            | place(self.charge_slots[2] as u32, 17, 8)
            | place(self.col as u32, 25, 2)
            | place(self.padrow as u32, 27, 4)
            | place(1, 31, 1)
    }

    /// Slot used by the k-th tracklet of the chip
    pub fn slot_for(k: usize) -> usize {
        MAX_TRACKLETS_PER_MCM - 1 - k
    }

    /// Number of tracklets announced, counting used slots from slot 2 downwards
    pub fn tracklet_count(&self) -> usize {
        (0..MAX_TRACKLETS_PER_MCM)
            .take_while(|k| self.charge_slots[Self::slot_for(*k)] != UNUSED_CHARGE_FIELD)
            .count()
    }
}

/// One tracklet data word following a TrackletMcmHeader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackletMcmData {
    pub check: u8,
    pub slope: u8,
    pub pid: u16,
    pub position: u16,
}

impl TrackletMcmData {
    pub fn unpack(word: u32) -> Self {
        Self {
            check: field(word, 0, 1) as u8,
            slope: field(word, 1, 8) as u8,
            pid: field(word, 9, 12) as u16,
            position: field(word, 21, 11) as u16,
        }
    }

    pub fn pack(&self) -> u32 {
        place(self.check as u32, 0, 1)
            | place(self.slope as u32, 1, 8)
            | place(self.pid as u32, 9, 12)
            | place(self.position as u32, 21, 11)
    }
}

/// Half-chamber header in front of the digit headers in run 3 streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackletHcHeader {
    pub side: u8,
    pub layer: u8,
    pub stack: u8,
    pub supermodule: u8,
    pub format: u8,
    pub mclk: u16,
}

impl TrackletHcHeader {
    pub fn unpack(word: u32) -> Result<Self, LinkParseError> {
        if field(word, 12, 1) != 1 {
            return Err(LinkParseError::BadHalfChamberHeader(word));
        }
        Ok(Self {
            side: field(word, 0, 1) as u8,
            layer: field(word, 1, 3) as u8,
            stack: field(word, 4, 3) as u8,
            supermodule: field(word, 7, 5) as u8,
            format: field(word, 13, 4) as u8,
            mclk: field(word, 17, 15) as u16,
        })
    }

    pub fn pack(&self) -> u32 {
        place(self.side as u32, 0, 1)
            | place(self.layer as u32, 1, 3)
            | place(self.stack as u32, 4, 3)
            | place(self.supermodule as u32, 7, 5)
            | place(1, 12, 1)
            | place(self.format as u32, 13, 4)
            | place(self.mclk as u32, 17, 15)
    }

    pub fn detector(&self) -> u16 {
        detector_of(self.supermodule, self.stack, self.layer)
    }
}

fn detector_of(supermodule: u8, stack: u8, layer: u8) -> u16 {
    supermodule as u16 * CHAMBERS_PER_SUPERMODULE as u16
        + stack as u16 * NUMBER_OF_LAYERS as u16
        + layer as u16
}

/// The two word digit half-chamber header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitHcHeader {
    pub side: u8,
    pub stack: u8,
    pub layer: u8,
    pub supermodule: u8,
    pub extra_words: u8,
    pub minor: u8,
    pub major: u8,
    pub version: u8,
    pub pretrigger_phase: u8,
    pub pretrigger_count: u8,
    pub bc: u16,
    pub timebins: u8,
}

impl DigitHcHeader {
    pub fn new(detector: u16, side: u8, bc: u16) -> Self {
        let detector = detector as usize;
        Self {
            side,
            stack: ((detector % CHAMBERS_PER_SUPERMODULE) / NUMBER_OF_LAYERS) as u8,
            layer: (detector % NUMBER_OF_LAYERS) as u8,
            supermodule: (detector / CHAMBERS_PER_SUPERMODULE) as u8,
            extra_words: 1,
            minor: DIGIT_HC_HEADER_MINOR,
            major: DIGIT_HC_HEADER_MAJOR,
            version: 1,
            pretrigger_phase: 0,
            pretrigger_count: 0,
            bc,
            timebins: TIMEBINS as u8,
        }
    }

    pub fn unpack(word0: u32, word1: u32) -> Result<Self, LinkParseError> {
        if field(word0, 0, 2) != DIGIT_HC_HEADER_RESERVED {
            return Err(LinkParseError::BadHalfChamberHeader(word0));
        }
        if field(word1, 0, 2) != DIGIT_HC_HEADER_RESERVED {
            return Err(LinkParseError::BadHalfChamberHeader(word1));
        }
        Ok(Self {
            side: field(word0, 2, 1) as u8,
            stack: field(word0, 3, 3) as u8,
            layer: field(word0, 6, 3) as u8,
            supermodule: field(word0, 9, 5) as u8,
            extra_words: field(word0, 14, 3) as u8,
            minor: field(word0, 17, 7) as u8,
            major: field(word0, 24, 7) as u8,
            version: field(word0, 31, 1) as u8,
            pretrigger_phase: field(word1, 2, 4) as u8,
            pretrigger_count: field(word1, 6, 4) as u8,
            bc: field(word1, 10, 16) as u16,
            timebins: field(word1, 26, 6) as u8,
        })
    }

    pub fn pack(&self) -> [u32; 2] {
        let word0 = place(DIGIT_HC_HEADER_RESERVED, 0, 2)
            | place(self.side as u32, 2, 1)
            | place(self.stack as u32, 3, 3)
            | place(self.layer as u32, 6, 3)
            | place(self.supermodule as u32, 9, 5)
            | place(self.extra_words as u32, 14, 3)
            | place(self.minor as u32, 17, 7)
            | place(self.major as u32, 24, 7)
            | place(self.version as u32, 31, 1);
        let word1 = place(DIGIT_HC_HEADER_RESERVED, 0, 2)
            | place(self.pretrigger_phase as u32, 2, 4)
            | place(self.pretrigger_count as u32, 6, 4)
            | place(self.bc as u32, 10, 16)
            | place(self.timebins as u32, 26, 6);
        [word0, word1]
    }

    pub fn detector(&self) -> u16 {
        detector_of(self.supermodule, self.stack, self.layer)
    }
}

/// Chip header in front of the 210 digit data words of one MCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitMcmHeader {
    pub event_count: u32,
    pub mcm: u8,
    pub rob: u8,
    pub year_flag: u8,
}

impl DigitMcmHeader {
    pub fn new(rob: u8, mcm: u8, event_count: u32) -> Self {
        Self {
            event_count: event_count & 0xf_ffff,
            mcm,
            rob,
            year_flag: 1,
        }
    }

    pub fn unpack(word: u32) -> Result<Self, LinkParseError> {
        if field(word, 0, 4) != DIGIT_MCM_HEADER_RESERVED {
            return Err(LinkParseError::BadDigitMcmHeader(word));
        }
        Ok(Self {
            event_count: field(word, 4, 20),
            mcm: field(word, 24, 4) as u8,
            rob: field(word, 28, 3) as u8,
            year_flag: field(word, 31, 1) as u8,
        })
    }

    pub fn pack(&self) -> u32 {
        place(DIGIT_MCM_HEADER_RESERVED, 0, 4)
            | place(self.event_count, 4, 20)
            | place(self.mcm as u32, 24, 4)
            | place(self.rob as u32, 28, 3)
            | place(self.year_flag as u32, 31, 1)
    }
}

/// One digit data word: three consecutive 10 bit samples of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitMcmData {
    pub flag: u32,
    pub samples: [u16; 3],
}

impl DigitMcmData {
    pub fn blank() -> Self {
        Self {
            flag: DIGIT_BLANK_FLAG,
            samples: [0; 3],
        }
    }

    pub fn new(samples: [u16; 3]) -> Self {
        Self {
            flag: DIGIT_SAMPLE_FLAG,
            samples,
        }
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            flag: field(word, 0, 2),
            samples: [
                field(word, 22, 10) as u16,
                field(word, 12, 10) as u16,
                field(word, 2, 10) as u16,
            ],
        }
    }

    pub fn pack(&self) -> u32 {
        place(self.flag, 0, 2)
            | place(self.samples[2] as u32, 2, 10)
            | place(self.samples[1] as u32, 12, 10)
            | place(self.samples[0] as u32, 22, 10)
    }

    pub fn is_blank(&self) -> bool {
        self.flag == DIGIT_BLANK_FLAG
    }
}
