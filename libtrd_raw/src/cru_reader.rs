use super::config::FeeParams;
use super::constants::*;
use super::cursor::{PayloadBuffer, WordCursor};
use super::digit::{CompressedDigit, Digit};
use super::digit_parser::{DigitParser, HalfChamberHeaders};
use super::error::{LinkParseError, ReaderError};
use super::event_index::{DataKind, EventIndex, InteractionRecord};
use super::link_map::{link_address, HalfCruId, LinkId};
use super::raw_data::{units_to_bytes, HalfCruHeader};
use super::rdh::Rdh;
use super::stats::ReaderStats;
use super::tracklet::Tracklet;
use super::tracklet_parser::TrackletParser;

/// Where the reader is within the half-CRU stream. Carried across blocks, so a half-CRU
/// header or body may straddle any number of hardware blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// Waiting for a half-CRU header. `pending` holds the header bytes staged so far.
    ExpectHalfCruHeader { pending: Vec<u8> },
    /// Collecting the body of a half-CRU of `total` bytes, `read` of which have arrived.
    InHalfCruBody {
        header: HalfCruHeader,
        total: usize,
        read: usize,
    },
}

impl Default for ReaderState {
    fn default() -> Self {
        Self::ExpectHalfCruHeader {
            pending: Vec::with_capacity(HALF_CRU_HEADER_SIZE),
        }
    }
}

/// CruRawReader decodes the raw stream of a CRU into tracklets and digits.
///
/// The reader is fed one hardware block (RDH + payload) at a time through `feed_block`, or
/// a whole buffer of blocks through `run`. Decoded records are appended to flat vectors and
/// every completed half-CRU is recorded in the EventIndex under the interaction record of
/// the block that completed it.
///
/// Errors local to a link are logged, counted and the link is skipped. Anything that breaks
/// the block or half-CRU framing is returned as a ReaderError.
#[derive(Debug)]
pub struct CruRawReader {
    params: FeeParams,
    state: ReaderState,
    payload: PayloadBuffer,
    current_ir: InteractionRecord,
    tracklets: Vec<Tracklet>,
    digits: Vec<Digit>,
    compressed_digits: Vec<CompressedDigit>,
    index: EventIndex,
    stats: ReaderStats,
}

impl CruRawReader {
    pub fn new(params: &FeeParams) -> Self {
        Self {
            params: *params,
            state: ReaderState::default(),
            payload: PayloadBuffer::new(params.max_half_cru_bytes),
            current_ir: InteractionRecord::default(),
            tracklets: Vec::new(),
            digits: Vec::new(),
            compressed_digits: Vec::new(),
            index: EventIndex::new(),
            stats: ReaderStats::default(),
        }
    }

    /// Decode every block in `buffer`, walking from block to block with the RDH offset
    pub fn run(&mut self, buffer: &[u8]) -> Result<(), ReaderError> {
        let mut offset = 0;
        while offset < buffer.len() {
            let rdh = Rdh::unpack(&buffer[offset..])?;
            let next = rdh.offset_to_next as usize;
            if offset + next > buffer.len() {
                self.stats.fatals += 1;
                return Err(ReaderError::ShortBlock(buffer.len() - offset, next));
            }
            self.feed_block(&buffer[offset..offset + next])?;
            offset += next;
        }
        Ok(())
    }

    /// Decode one hardware block. The block must start with its RDH.
    pub fn feed_block(&mut self, block: &[u8]) -> Result<(), ReaderError> {
        match self.process_block(block) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stats.fatals += 1;
                log::error!("CruRawReader failed at {}: {e}", self.current_ir);
                Err(e)
            }
        }
    }

    fn process_block(&mut self, block: &[u8]) -> Result<(), ReaderError> {
        let rdh = Rdh::unpack(block)?;
        let memory_size = rdh.memory_size as usize;
        if block.len() < memory_size {
            return Err(ReaderError::ShortBlock(block.len(), memory_size));
        }
        self.current_ir = rdh.interaction_record();
        self.stats.blocks += 1;
        self.stats.bytes_read += block.len() as u64;
        log::debug!(
            "Block for FEE {:#06x} at {} with {} payload bytes, stop: {}",
            rdh.fee_id,
            self.current_ir,
            rdh.payload_size(),
            rdh.stop_bit
        );

        self.process_payload(&block[RDH_SIZE..memory_size])?;

        if rdh.is_stop() {
            self.stats.events += 1;
        }
        Ok(())
    }

    fn process_payload(&mut self, payload: &[u8]) -> Result<(), ReaderError> {
        let mut cursor = WordCursor::new(payload);
        while !cursor.is_empty() {
            let state = std::mem::take(&mut self.state);
            self.state = match state {
                ReaderState::ExpectHalfCruHeader { mut pending } => {
                    if pending.is_empty() && cursor.peek_u32(0).ok() == Some(PADDING_WORD) {
                        self.stats.blank_blocks += 1;
                        cursor.rest();
                        ReaderState::ExpectHalfCruHeader { pending }
                    } else {
                        let needed = HALF_CRU_HEADER_SIZE - pending.len();
                        let take = needed.min(cursor.remaining());
                        pending.extend_from_slice(cursor.read_bytes(take)?);
                        if pending.len() < HALF_CRU_HEADER_SIZE {
                            ReaderState::ExpectHalfCruHeader { pending }
                        } else {
                            let header = HalfCruHeader::unpack(&pending)?;
                            pending.clear();
                            self.begin_half_cru(header, &mut cursor, pending)?
                        }
                    }
                }
                ReaderState::InHalfCruBody {
                    header,
                    total,
                    read,
                } => {
                    let take = (total - read).min(cursor.remaining());
                    self.payload.extend(cursor.read_bytes(take)?)?;
                    if read + take == total {
                        self.finish_half_cru(&header)?;
                        ReaderState::default()
                    } else {
                        ReaderState::InHalfCruBody {
                            header,
                            total,
                            read: read + take,
                        }
                    }
                }
            };
        }
        Ok(())
    }

    /// Start collecting the body of a half-CRU whose header has just been read. If the
    /// whole body is in the current block it is parsed immediately.
    fn begin_half_cru(
        &mut self,
        header: HalfCruHeader,
        cursor: &mut WordCursor,
        pending: Vec<u8>,
    ) -> Result<ReaderState, ReaderError> {
        let total = header.total_bytes();
        if total > self.params.max_half_cru_bytes {
            return Err(ReaderError::BufferOverflow(
                total,
                self.params.max_half_cru_bytes,
            ));
        }
        self.payload.clear();
        let available = cursor.remaining();
        if total <= available {
            self.payload.extend(cursor.read_bytes(total)?)?;
            self.finish_half_cru(&header)?;
            Ok(ReaderState::ExpectHalfCruHeader { pending })
        } else {
            self.payload.extend(cursor.rest())?;
            Ok(ReaderState::InHalfCruBody {
                header,
                total,
                read: available,
            })
        }
    }

    /// Parse every link of a fully assembled half-CRU and index the records it produced
    fn finish_half_cru(&mut self, header: &HalfCruHeader) -> Result<(), ReaderError> {
        let half_cru = HalfCruId::new(header.half_cru_index())?;
        self.stats.half_crus += 1;
        let tracklet_start = self.tracklets.len();
        let digit_start = self.digits.len();
        let compressed_start = self.compressed_digits.len();

        let payload = std::mem::take(&mut self.payload);
        let mut offset = 0;
        for (link, size) in half_cru.links().iter().zip(header.link_sizes.iter()) {
            let size = units_to_bytes(*size);
            let bytes = &payload.as_slice()[offset..offset + size];
            offset += size;
            let (detector, side) = link_address(*link)?;
            if let Err(e) = self.parse_link(*link, detector, side, bytes) {
                self.stats.link_errors += 1;
                log::warn!(
                    "Skipping link {link} of half-CRU {} at {}: {e}",
                    half_cru.index,
                    self.current_ir
                );
            }
        }
        self.payload = payload;

        let n_tracklets = self.tracklets.len() - tracklet_start;
        self.index
            .add_tracklets(self.current_ir, tracklet_start, n_tracklets);
        if self.params.keep_compressed_digits {
            let n_compressed = self.compressed_digits.len() - compressed_start;
            self.index
                .add_compressed_digits(self.current_ir, compressed_start, n_compressed);
        } else {
            let n_digits = self.digits.len() - digit_start;
            self.index.add_digits(self.current_ir, digit_start, n_digits);
        }
        Ok(())
    }

    fn parse_link(
        &mut self,
        link: LinkId,
        detector: u16,
        side: u8,
        bytes: &[u8],
    ) -> Result<(), LinkParseError> {
        if bytes.iter().all(|byte| *byte == PADDING_BYTE) {
            self.stats.empty_links += 1;
            return Ok(());
        }
        self.stats.links_parsed += 1;
        let mut cursor = WordCursor::new(bytes);

        let tracklet_mark = self.tracklets.len();
        let tracklet_count =
            match TrackletParser::new(detector, side).parse(&mut cursor, &mut self.tracklets) {
                Ok(count) => count,
                Err(e) => {
                    self.tracklets.truncate(tracklet_mark);
                    return Err(e);
                }
            };

        let headers = match HalfChamberHeaders::read(&mut cursor, self.params.format) {
            Ok(headers) => headers,
            Err(e) => {
                self.tracklets.truncate(tracklet_mark);
                return Err(e);
            }
        };
        // A link whose headers name another chamber is misaddressed as a whole
        if !headers.matches(detector, side) {
            self.stats.hc_header_mismatches += 1;
            self.tracklets.truncate(tracklet_mark);
            log::debug!("Link {link} half-chamber headers: {headers:?}");
            return Err(LinkParseError::HalfChamberMismatch {
                detector,
                side,
                found_detector: headers.digit.detector(),
                found_side: headers.digit.side,
            });
        }
        self.stats.tracklets += tracklet_count as u64;

        let digit_mark = self.digits.len();
        let compressed_mark = self.compressed_digits.len();
        match DigitParser::new(detector, side, self.params.keep_compressed_digits).parse(
            &mut cursor,
            &mut self.digits,
            &mut self.compressed_digits,
        ) {
            Ok(count) => self.stats.digits += count as u64,
            Err(e) => {
                self.digits.truncate(digit_mark);
                self.compressed_digits.truncate(compressed_mark);
                return Err(e);
            }
        }

        let trailing = cursor
            .rest()
            .chunks_exact(WORD_SIZE_BYTES)
            .filter(|word| word.iter().any(|byte| *byte != PADDING_BYTE))
            .count();
        if trailing > 0 {
            self.stats.trailing_words += trailing as u64;
            log::warn!("Link {link} has {trailing} non-padding words after the digit end marker");
        }
        Ok(())
    }

    /// Clear all decoded data, counters and state for a new run
    pub fn reset(&mut self) {
        self.state = ReaderState::default();
        self.payload.clear();
        self.current_ir = InteractionRecord::default();
        self.tracklets.clear();
        self.digits.clear();
        self.compressed_digits.clear();
        self.index.clear();
        self.stats = ReaderStats::default();
    }

    pub fn tracklets(&self) -> &[Tracklet] {
        &self.tracklets
    }

    pub fn digits(&self) -> &[Digit] {
        &self.digits
    }

    pub fn compressed_digits(&self) -> &[CompressedDigit] {
        &self.compressed_digits
    }

    pub fn event_index(&self) -> &EventIndex {
        &self.index
    }

    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    pub fn current_ir(&self) -> InteractionRecord {
        self.current_ir
    }

    /// Number of records indexed for a kind across all interactions
    pub fn indexed_count(&self, kind: DataKind) -> usize {
        self.index.sum_of(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_data::push_word;

    fn wrap_block(payload: &[u8], ir: InteractionRecord, stop: bool) -> Vec<u8> {
        let size = (RDH_SIZE + payload.len()) as u16;
        let rdh = Rdh {
            offset_to_next: size,
            memory_size: size,
            bc: ir.bc,
            orbit: ir.orbit,
            stop_bit: stop as u8,
            ..Default::default()
        };
        let mut block = rdh.pack().to_vec();
        block.extend_from_slice(payload);
        block
    }

    /// Two units of link data: one tracklet chip, run 3 half-chamber headers for `detector`
    /// and `side`, no digit chips
    fn tracklet_link(tracklet: &Tracklet, detector: u16, side: u8) -> Vec<u8> {
        let mut link = Vec::new();
        let mut header = crate::raw_data::TrackletMcmHeader::new(tracklet.padrow, tracklet.col);
        header.charge_slots[2] = tracklet.header_charge_field().0;
        push_word(&mut link, header.pack());
        push_word(&mut link, tracklet.data_word().pack());
        push_word(&mut link, TRACKLET_END_MARKER);
        push_word(&mut link, TRACKLET_END_MARKER);
        let digit_hc = crate::raw_data::DigitHcHeader::new(detector, side, 0);
        let hc = crate::raw_data::TrackletHcHeader {
            side,
            layer: digit_hc.layer,
            stack: digit_hc.stack,
            supermodule: digit_hc.supermodule,
            format: TRACKLET_HC_HEADER_FORMAT,
            mclk: 0,
        };
        push_word(&mut link, hc.pack());
        for word in digit_hc.pack() {
            push_word(&mut link, word);
        }
        push_word(&mut link, DIGIT_END_MARKER);
        push_word(&mut link, DIGIT_END_MARKER);
        link.resize(2 * CRU_UNIT_BYTES, PADDING_BYTE);
        link
    }

    /// Half-CRU 0 with the given links in its first slots; the other slots are empty
    fn half_cru_with_links(links: &[Vec<u8>]) -> Vec<u8> {
        let mut header = HalfCruHeader::default();
        header.link_sizes = [1; LINKS_PER_HALF_CRU];
        let mut body = Vec::new();
        for (slot, link) in links.iter().enumerate() {
            header.link_sizes[slot] = (link.len() / CRU_UNIT_BYTES) as u16;
            body.extend_from_slice(link);
        }
        let mut bytes = header.pack().to_vec();
        bytes.extend_from_slice(&body);
        bytes.resize(HALF_CRU_HEADER_SIZE + header.total_bytes(), PADDING_BYTE);
        bytes
    }

    /// A half-CRU where only link 0 carries one tracklet chip and no digit chips
    fn single_link_half_cru() -> Vec<u8> {
        let tracklet = Tracklet::from_chip(0, 0, 5, 100, 3, 10, 20, 30);
        half_cru_with_links(&[tracklet_link(&tracklet, 0, 0)])
    }

    #[test]
    fn test_single_half_cru() {
        let ir = InteractionRecord::new(12, 34);
        let mut reader = CruRawReader::new(&FeeParams::default());
        reader
            .run(&wrap_block(&single_link_half_cru(), ir, true))
            .unwrap();
        assert_eq!(reader.tracklets().len(), 1);
        assert_eq!(reader.tracklets()[0].position, 100);
        assert_eq!(reader.stats().events, 1);
        assert_eq!(reader.stats().half_crus, 1);
        assert_eq!(reader.stats().links_parsed, 1);
        assert_eq!(reader.stats().empty_links, 14);
        assert_eq!(
            reader.event_index().ranges_for(&ir, DataKind::Tracklets),
            &[crate::event_index::DataRange::new(0, 1)]
        );
        assert_eq!(*reader.state(), ReaderState::default());
    }

    #[test]
    fn test_blank_block_and_reset() {
        let mut reader = CruRawReader::new(&FeeParams::default());
        let blank = vec![PADDING_BYTE; 64];
        reader
            .feed_block(&wrap_block(&blank, InteractionRecord::default(), false))
            .unwrap();
        assert_eq!(reader.stats().blank_blocks, 1);
        assert_eq!(reader.stats().half_crus, 0);

        reader.reset();
        assert_eq!(*reader.stats(), ReaderStats::default());
        assert!(reader.event_index().is_empty());
    }

    #[test]
    fn test_straddled_half_cru() {
        let ir = InteractionRecord::new(7, 99);
        let stream = single_link_half_cru();
        for split in [1, 30, 64, 65, 100, stream.len() - 4] {
            let mut reader = CruRawReader::new(&FeeParams::default());
            reader
                .feed_block(&wrap_block(&stream[..split], ir, false))
                .unwrap();
            assert_eq!(reader.stats().half_crus, 0);
            reader
                .feed_block(&wrap_block(&stream[split..], ir, true))
                .unwrap();
            assert_eq!(reader.stats().half_crus, 1, "split at {split}");
            assert_eq!(reader.tracklets().len(), 1);
        }
    }

    #[test]
    fn test_buffer_overflow_is_fatal() {
        let params = FeeParams {
            max_half_cru_bytes: 256,
            ..Default::default()
        };
        let mut reader = CruRawReader::new(&params);
        let result = reader.run(&wrap_block(&single_link_half_cru(), InteractionRecord::default(), true));
        assert!(matches!(result, Err(ReaderError::BufferOverflow(512, 256))));
        assert_eq!(reader.stats().fatals, 1);
    }

    #[test]
    fn test_short_block() {
        let mut block = wrap_block(&single_link_half_cru(), InteractionRecord::default(), true);
        block.truncate(200);
        let mut reader = CruRawReader::new(&FeeParams::default());
        assert!(matches!(
            reader.run(&block),
            Err(ReaderError::ShortBlock(200, _))
        ));
    }

    #[test]
    fn test_bad_link_is_skipped() {
        let mut stream = single_link_half_cru();
        // Corrupt the tracklet MCM header of link 0
        stream[HALF_CRU_HEADER_SIZE..HALF_CRU_HEADER_SIZE + 4].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        let ir = InteractionRecord::new(1, 1);
        let mut reader = CruRawReader::new(&FeeParams::default());
        reader.run(&wrap_block(&stream, ir, true)).unwrap();
        assert_eq!(reader.stats().link_errors, 1);
        assert!(reader.tracklets().is_empty());
        assert_eq!(reader.event_index().len(), 1);
    }

    #[test]
    fn test_next_link_decodes_after_bad_link() {
        // Links 0 and 1 of half-CRU 0 read out detectors 0 and 1 on side 0
        let first = Tracklet::from_chip(0, 0, 5, 100, 3, 10, 20, 30);
        let second = Tracklet::from_chip(1, 2, 9, 200, 4, 1, 2, 3);
        let mut stream =
            half_cru_with_links(&[tracklet_link(&first, 0, 0), tracklet_link(&second, 1, 0)]);
        stream[HALF_CRU_HEADER_SIZE..HALF_CRU_HEADER_SIZE + 4]
            .copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);

        let ir = InteractionRecord::new(3, 3);
        let mut reader = CruRawReader::new(&FeeParams::default());
        reader.run(&wrap_block(&stream, ir, true)).unwrap();
        assert_eq!(reader.stats().link_errors, 1);
        assert_eq!(reader.stats().links_parsed, 2);
        assert_eq!(reader.stats().empty_links, 13);
        assert_eq!(reader.tracklets(), &[second]);
        assert_eq!(reader.stats().tracklets, 1);
        assert_eq!(
            reader.event_index().ranges_for(&ir, DataKind::Tracklets),
            &[crate::event_index::DataRange::new(0, 1)]
        );
    }

    #[test]
    fn test_misaddressed_link_is_skipped() {
        // Slot 1 reads out detector 1, but its headers name detector 0
        let tracklet = Tracklet::from_chip(0, 0, 5, 100, 3, 10, 20, 30);
        let good = Tracklet::from_chip(0, 2, 1, 50, 0, 0, 0, 0);
        let stream =
            half_cru_with_links(&[tracklet_link(&good, 0, 0), tracklet_link(&tracklet, 0, 0)]);

        let mut reader = CruRawReader::new(&FeeParams::default());
        reader
            .run(&wrap_block(&stream, InteractionRecord::new(4, 4), true))
            .unwrap();
        assert_eq!(reader.stats().hc_header_mismatches, 1);
        assert_eq!(reader.stats().link_errors, 1);
        assert_eq!(reader.tracklets(), &[good]);
        assert_eq!(reader.stats().tracklets, 1);
    }
}
