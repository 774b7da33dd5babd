use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fxhash::FxHashMap;

use super::config::FeeParams;
use super::constants::*;
use super::error::RawWriterError;
use super::event_index::InteractionRecord;
use super::link_map::HalfCruId;
use super::rdh::Rdh;

/// Destination for encoded half-CRU payloads.
///
/// The encoder hands over one complete payload (half-CRU header + link data) per half-CRU
/// and event, together with the event's interaction record.
pub trait RawSink {
    fn add_data(
        &mut self,
        half_cru: &HalfCruId,
        ir: InteractionRecord,
        payload: &[u8],
    ) -> Result<(), RawWriterError>;
}

/// Check that a page can hold an RDH plus at least one word and is word aligned
pub fn check_page_size(page_size: usize) -> Result<(), RawWriterError> {
    if page_size % WORD_SIZE_BYTES != 0
        || page_size < RDH_SIZE + WORD_SIZE_BYTES
        || page_size > MAX_PAGE_SIZE
    {
        Err(RawWriterError::BadPageSize(page_size))
    } else {
        Ok(())
    }
}

/// Split a payload into hardware blocks of at most `page_size` bytes and write them out.
///
/// Every page carries an RDH for the half-CRU; the payload pages are followed by an empty
/// page with the stop bit set, which closes the event. Returns the number of bytes written.
pub fn write_pages<W: Write>(
    writer: &mut W,
    half_cru: &HalfCruId,
    ir: InteractionRecord,
    payload: &[u8],
    page_size: usize,
    packet_counter: &mut u8,
) -> Result<u64, RawWriterError> {
    if ir.bc > MAX_BUNCH_CROSSING {
        return Err(RawWriterError::BadBunchCrossing(ir.bc));
    }
    let max_payload = page_size - RDH_SIZE;
    let mut rdh = Rdh {
        fee_id: half_cru.fee_id(),
        cru_id: half_cru.cru_id,
        endpoint: half_cru.endpoint,
        bc: ir.bc,
        orbit: ir.orbit,
        trigger_type: PHYSICS_TRIGGER,
        ..Default::default()
    };
    let mut written = 0;
    for (page, chunk) in payload.chunks(max_payload).enumerate() {
        let size = (RDH_SIZE + chunk.len()) as u16;
        rdh.memory_size = size;
        rdh.offset_to_next = size;
        rdh.pages_counter = page as u16;
        rdh.packet_counter = *packet_counter;
        *packet_counter = packet_counter.wrapping_add(1);
        writer.write_all(&rdh.pack())?;
        writer.write_all(chunk)?;
        written += size as u64;
    }

    rdh.memory_size = RDH_SIZE as u16;
    rdh.offset_to_next = RDH_SIZE as u16;
    rdh.pages_counter = payload.len().div_ceil(max_payload) as u16;
    rdh.packet_counter = *packet_counter;
    rdh.stop_bit = 1;
    *packet_counter = packet_counter.wrapping_add(1);
    writer.write_all(&rdh.pack())?;
    written += RDH_SIZE as u64;
    Ok(written)
}

/// RawFileWriter writes each half-CRU to its own paged raw file in an output directory.
///
/// Files are opened on first use and named after the half-CRU and the payload format.
#[derive(Debug)]
pub struct RawFileWriter {
    output_dir: PathBuf,
    params: FeeParams,
    files: FxHashMap<usize, BufWriter<File>>,
    packet_counters: FxHashMap<usize, u8>,
    bytes_written: u64,
}

impl RawFileWriter {
    pub fn new(output_dir: &Path, params: &FeeParams) -> Result<Self, RawWriterError> {
        check_page_size(params.page_size)?;
        if !output_dir.exists() {
            std::fs::create_dir_all(output_dir)?;
        }
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            params: *params,
            files: FxHashMap::default(),
            packet_counters: FxHashMap::default(),
            bytes_written: 0,
        })
    }

    pub fn get_file_path(&self, half_cru: &HalfCruId) -> PathBuf {
        self.output_dir
            .join(half_cru.file_name(self.params.format))
    }

    pub fn get_bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and close every open file
    pub fn close(mut self) -> Result<(), RawWriterError> {
        for (_, file) in self.files.iter_mut() {
            file.flush()?;
        }
        log::info!(
            "RawFileWriter wrote {} files with a total of {}",
            self.files.len(),
            human_bytes::human_bytes(self.bytes_written as f64)
        );
        Ok(())
    }
}

impl RawSink for RawFileWriter {
    fn add_data(
        &mut self,
        half_cru: &HalfCruId,
        ir: InteractionRecord,
        payload: &[u8],
    ) -> Result<(), RawWriterError> {
        if !self.files.contains_key(&half_cru.index) {
            let path = self.get_file_path(half_cru);
            log::debug!("Opening raw file {}", path.to_string_lossy());
            self.files
                .insert(half_cru.index, BufWriter::new(File::create(path)?));
        }
        let packet_counter = self.packet_counters.entry(half_cru.index).or_insert(0);
        if let Some(file) = self.files.get_mut(&half_cru.index) {
            self.bytes_written += write_pages(
                file,
                half_cru,
                ir,
                payload,
                self.params.page_size,
                packet_counter,
            )?;
        }
        Ok(())
    }
}

/// MemorySink keeps the paged stream of every half-CRU in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    page_size: usize,
    streams: FxHashMap<usize, Vec<u8>>,
    packet_counters: FxHashMap<usize, u8>,
    payloads: u64,
}

impl MemorySink {
    pub fn new(page_size: usize) -> Result<Self, RawWriterError> {
        check_page_size(page_size)?;
        Ok(Self {
            page_size,
            ..Default::default()
        })
    }

    /// The paged stream written for a half-CRU, if anything was written for it
    pub fn stream(&self, half_cru: usize) -> Option<&[u8]> {
        self.streams.get(&half_cru).map(|stream| stream.as_slice())
    }

    /// Indices of the half-CRUs that received data, ascending
    pub fn half_crus(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.streams.keys().copied().collect();
        indices.sort();
        indices
    }

    pub fn payload_count(&self) -> u64 {
        self.payloads
    }
}

impl RawSink for MemorySink {
    fn add_data(
        &mut self,
        half_cru: &HalfCruId,
        ir: InteractionRecord,
        payload: &[u8],
    ) -> Result<(), RawWriterError> {
        let stream = self.streams.entry(half_cru.index).or_default();
        let packet_counter = self.packet_counters.entry(half_cru.index).or_insert(0);
        write_pages(stream, half_cru, ir, payload, self.page_size, packet_counter)?;
        self.payloads += 1;
        Ok(())
    }
}
