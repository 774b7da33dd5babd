use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkMapError {
    #[error("Invalid detector address -- detector: {0}, ROB: {1}")]
    InvalidAddress(u16, u8),
    #[error("Invalid link id {0}; there are only {max} links", max=NUMBER_OF_LINKS)]
    InvalidLink(usize),
    #[error("Invalid half-CRU index {0}; there are only {max} half-CRUs", max=NUMBER_OF_HALF_CRUS)]
    InvalidHalfCru(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("Cursor ran out of data -- requested {requested} bytes at offset {offset} with {remaining} bytes remaining")]
    OutOfData {
        requested: usize,
        offset: usize,
        remaining: usize,
    },
    #[error("PayloadBuffer overflow -- capacity {capacity} bytes, attempted to hold {requested} bytes")]
    Overflow { capacity: usize, requested: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawDataError {
    #[error("Failed to read raw data structure: {0}")]
    Cursor(#[from] CursorError),
    #[error("Incorrect RDH version {0}; expected {exp}", exp=RDH_VERSION)]
    BadRdhVersion(u8),
    #[error("Incorrect RDH header size {0}; expected {exp}", exp=RDH_SIZE)]
    BadRdhHeaderSize(u8),
    #[error("RDH memory size {memory_size} is inconsistent with offset to next {offset_to_next}")]
    BadRdhSizes {
        memory_size: u16,
        offset_to_next: u16,
    },
    #[error("Incorrect half-CRU header version {0}; expected {exp}", exp=HALF_CRU_HEADER_VERSION)]
    BadHalfCruVersion(u8),
    #[error("Half-CRU header has an invalid CRU {0} / endpoint {1} pair")]
    BadHalfCruAddress(u16, u8),
}

/// Errors local to a single link. These are recoverable: the link is skipped and
/// decoding continues with the next link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkParseError {
    #[error("Link ended before the tracklet end marker was found")]
    MissingTrackletEndMarker,
    #[error("Link ended before the digit end marker was found")]
    MissingDigitEndMarker,
    #[error("Invalid tracklet MCM header word {0:#010x}")]
    BadTrackletMcmHeader(u32),
    #[error("Tracklet MCM header {0:#010x} announces more data words than the link holds")]
    TruncatedTrackletData(u32),
    #[error("Link ended inside the half-chamber header")]
    MissingHalfChamberHeader,
    #[error("Invalid half-chamber header word {0:#010x}")]
    BadHalfChamberHeader(u32),
    #[error("Invalid digit MCM header word {0:#010x}")]
    BadDigitMcmHeader(u32),
    #[error("Digit MCM block for ROB {0} MCM {1} is truncated")]
    TruncatedDigitBlock(u8, u8),
    #[error("Digit channel {channel} of ROB {rob} MCM {mcm} mixes blank and sample words")]
    MixedChannelWords { rob: u8, mcm: u8, channel: u8 },
    #[error("Digit MCM header ROB {0} does not belong to link side {1}")]
    RobSideMismatch(u8, u8),
    #[error("Half-chamber header names detector {found_detector} side {found_side} but the link reads out detector {detector} side {side}")]
    HalfChamberMismatch {
        detector: u16,
        side: u8,
        found_detector: u16,
        found_side: u8,
    },
    #[error("Link parsing failed: {0}")]
    Cursor(#[from] CursorError),
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Half-CRU payload of {0} bytes does not fit in the reader buffer of {1} bytes")]
    BufferOverflow(usize, usize),
    #[error("CruRawReader failed due to malformed raw data: {0}")]
    BadRawData(#[from] RawDataError),
    #[error("CruRawReader received a block of {0} bytes but the RDH declares {1} bytes")]
    ShortBlock(usize, usize),
    #[error("CruRawReader failed due to cursor error: {0}")]
    Cursor(#[from] CursorError),
    #[error("CruRawReader failed due to link mapping error: {0}")]
    LinkMap(#[from] LinkMapError),
}

#[derive(Debug, Error)]
pub enum RawWriterError {
    #[error("RawFileWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("RawFileWriter was given a page size of {0} bytes; it must be a multiple of {unit} between {min} and {max}", unit=WORD_SIZE_BYTES, min=RDH_SIZE + WORD_SIZE_BYTES, max=MAX_PAGE_SIZE)]
    BadPageSize(usize),
    #[error("RawFileWriter was given bunch crossing {0} which does not fit in 12 bits")]
    BadBunchCrossing(u16),
    #[error("RawFileWriter was given an invalid half-CRU: {0}")]
    LinkMap(#[from] LinkMapError),
}

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Link {0} needs {1} 256 bit units which does not fit in the half-CRU header")]
    LinkTooLarge(usize, usize),
    #[error("Trigger record references records {0}..{1} but only {2} exist")]
    BadTriggerRecord(usize, usize, usize),
    #[error("Bunch crossing {0} does not fit in 12 bits")]
    BadBunchCrossing(u16),
    #[error("Trap2Cru failed due to link mapping error: {0}")]
    LinkMap(#[from] LinkMapError),
    #[error("Trap2Cru failed due to RawSink error: {0}")]
    Sink(#[from] RawWriterError),
}

#[derive(Debug, Error)]
pub enum RawFileError {
    #[error("Could not open RawFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Reached end of RawFile")]
    EndOfFile,
    #[error("RawFile ended inside a page at byte {0}")]
    TruncatedPage(u64),
    #[error("RawFile contains a bad page header: {0}")]
    BadPage(#[from] RawDataError),
    #[error("RawFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config could not find any raw files in {0:?}")]
    NoMatchingFiles(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to RawFile error: {0}")]
    RawFile(#[from] RawFileError),
    #[error("Processor failed due to CruRawReader error: {0}")]
    Reader(#[from] ReaderError),
    #[error("Processor failed due to Trap2Cru error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("Processor failed due to RawFileWriter error: {0}")]
    Writer(#[from] RawWriterError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
