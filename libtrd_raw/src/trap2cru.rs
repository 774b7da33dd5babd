use bitvec::prelude::*;
use fxhash::FxHashMap;

use super::config::FeeParams;
use super::constants::*;
use super::digit::Digit;
use super::error::EncoderError;
use super::event_index::{DataRange, InteractionRecord, TriggerRecord};
use super::link_map::{link_address, ori_of, pad_from_chip, HalfCruId, LinkId};
use super::raw_data::{
    link_size_padding, push_word, units_to_bytes, DigitHcHeader, DigitMcmData, DigitMcmHeader,
    HalfCruHeader, TrackletHcHeader, TrackletMcmHeader,
};
use super::raw_writer::RawSink;
use super::stats::EncoderStats;
use super::tracklet::Tracklet;

/// The records of one link within an event: a window into a link-sorted index vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRecord {
    pub link_id: LinkId,
    pub range: DataRange,
}

/// One event's records, sorted into link order.
///
/// `tracklet_order` and `digit_order` hold indices into the caller's flat vectors; the link
/// records are windows into these index vectors, ascending by link id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedEvent {
    pub tracklet_order: Vec<usize>,
    pub digit_order: Vec<usize>,
    pub tracklet_links: Vec<LinkRecord>,
    pub digit_links: Vec<LinkRecord>,
}

/// Group a link-sorted `(link, index)` list into an index vector and its link records
fn group_by_link(sorted: &[(LinkId, usize)]) -> (Vec<usize>, Vec<LinkRecord>) {
    let mut order = Vec::with_capacity(sorted.len());
    let mut records: Vec<LinkRecord> = Vec::new();
    for (position, (link, index)) in sorted.iter().enumerate() {
        order.push(*index);
        match records.last_mut() {
            Some(record) if record.link_id == *link => record.range.count += 1,
            _ => records.push(LinkRecord {
                link_id: *link,
                range: DataRange::new(position, 1),
            }),
        }
    }
    (order, records)
}

fn check_range(range: DataRange, len: usize) -> Result<(), EncoderError> {
    if range.end() > len {
        Err(EncoderError::BadTriggerRecord(range.start, range.end(), len))
    } else {
        Ok(())
    }
}

/// Trap2Cru converts flat tracklet and digit vectors back into the half-CRU wire format.
///
/// For every trigger each of the 72 half-CRUs is assembled in an internal buffer (header,
/// then the 15 links in ascending order, each padded to a 256 bit boundary) and handed to a
/// RawSink.
#[derive(Debug)]
pub struct Trap2Cru {
    params: FeeParams,
    event_counter: u32,
    buffer: Vec<u8>,
    stats: EncoderStats,
}

impl Trap2Cru {
    pub fn new(params: &FeeParams) -> Self {
        Self {
            params: *params,
            event_counter: 0,
            buffer: Vec::new(),
            stats: EncoderStats::default(),
        }
    }

    pub fn stats(&self) -> &EncoderStats {
        &self.stats
    }

    pub fn event_counter(&self) -> u32 {
        self.event_counter
    }

    /// Encode every trigger, handing each half-CRU payload to the sink
    pub fn convert<S: RawSink>(
        &mut self,
        tracklets: &[Tracklet],
        digits: &[Digit],
        triggers: &[TriggerRecord],
        sink: &mut S,
    ) -> Result<(), EncoderError> {
        for trigger in triggers {
            self.convert_trigger(tracklets, digits, trigger, sink)?;
        }
        Ok(())
    }

    fn convert_trigger<S: RawSink>(
        &mut self,
        tracklets: &[Tracklet],
        digits: &[Digit],
        trigger: &TriggerRecord,
        sink: &mut S,
    ) -> Result<(), EncoderError> {
        if trigger.ir.bc > MAX_BUNCH_CROSSING {
            return Err(EncoderError::BadBunchCrossing(trigger.ir.bc));
        }
        self.event_counter = self.event_counter.wrapping_add(1);
        self.stats.events += 1;
        let event = self.sort_data_to_links(tracklets, digits, trigger)?;
        let tracklet_links: FxHashMap<LinkId, DataRange> = event
            .tracklet_links
            .iter()
            .map(|record| (record.link_id, record.range))
            .collect();
        let digit_links: FxHashMap<LinkId, DataRange> = event
            .digit_links
            .iter()
            .map(|record| (record.link_id, record.range))
            .collect();
        log::debug!(
            "Encoding {} with {} tracklets and {} digits",
            trigger.ir,
            trigger.n_tracklets,
            trigger.n_digits
        );

        for index in 0..NUMBER_OF_HALF_CRUS {
            let half_cru = HalfCruId::new(index)?;
            let occupied = half_cru
                .links()
                .iter()
                .any(|link| tracklet_links.contains_key(link) || digit_links.contains_key(link));
            if !occupied && self.params.skip_empty_half_crus {
                continue;
            }

            self.buffer.clear();
            self.buffer.resize(HALF_CRU_HEADER_SIZE, 0);
            let mut header = HalfCruHeader {
                bc: trigger.ir.bc,
                endpoint: half_cru.endpoint,
                fee_id: half_cru.fee_id(),
                cru_id: half_cru.cru_id,
                ..Default::default()
            };

            for (slot, link) in half_cru.links().iter().enumerate() {
                let start = self.buffer.len();
                let link_tracklets = tracklet_links
                    .get(link)
                    .map(|range| &event.tracklet_order[range.start..range.end()]);
                let link_digits = digit_links
                    .get(link)
                    .map(|range| &event.digit_order[range.start..range.end()]);
                if link_tracklets.is_some() || link_digits.is_some() {
                    self.stats.links_with_data += 1;
                    let (detector, side) = link_address(*link)?;
                    self.write_tracklets(tracklets, link_tracklets.unwrap_or_default());
                    push_word(&mut self.buffer, TRACKLET_END_MARKER);
                    push_word(&mut self.buffer, TRACKLET_END_MARKER);
                    self.write_half_chamber_headers(detector, side, trigger.ir);
                    self.write_digits(digits, link_digits.unwrap_or_default());
                    push_word(&mut self.buffer, DIGIT_END_MARKER);
                    push_word(&mut self.buffer, DIGIT_END_MARKER);
                }

                let words = (self.buffer.len() - start) / WORD_SIZE_BYTES;
                let (units, padding) = link_size_padding(words);
                if units > u16::MAX as usize {
                    return Err(EncoderError::LinkTooLarge(*link, units));
                }
                self.buffer
                    .resize(self.buffer.len() + padding * WORD_SIZE_BYTES, PADDING_BYTE);
                header.link_sizes[slot] = units as u16;

                let written = self.buffer.len() - start;
                if written != units_to_bytes(header.link_sizes[slot]) {
                    self.stats.link_length_mismatches += 1;
                    log::warn!(
                        "Link {link} wrote {written} bytes but its header length is {} units",
                        header.link_sizes[slot]
                    );
                }
            }

            self.buffer[..HALF_CRU_HEADER_SIZE].copy_from_slice(&header.pack());
            sink.add_data(&half_cru, trigger.ir, &self.buffer)?;
            self.stats.half_crus += 1;
            self.stats.bytes_written += self.buffer.len() as u64;
        }
        Ok(())
    }

    /// Sort the records of one trigger into link order.
    ///
    /// Tracklets are ordered by (link, pad row, column) and digits by (link, ROB, MCM,
    /// channel). Both sorts are stable, so records with equal keys keep their input order.
    pub fn sort_data_to_links(
        &mut self,
        tracklets: &[Tracklet],
        digits: &[Digit],
        trigger: &TriggerRecord,
    ) -> Result<SortedEvent, EncoderError> {
        let tracklet_range = trigger.tracklet_range();
        let digit_range = trigger.digit_range();
        check_range(tracklet_range, tracklets.len())?;
        check_range(digit_range, digits.len())?;

        let mut tracklet_keys = Vec::with_capacity(tracklet_range.count);
        for index in tracklet_range.start..tracklet_range.end() {
            let tracklet = &tracklets[index];
            // The chip header only carries the pad row and column, so those win on decode
            if pad_from_chip(tracklet.rob, tracklet.mcm) != (tracklet.padrow, tracklet.col) {
                self.stats.readdressed_tracklets += 1;
                log::warn!(
                    "Tracklet of detector {} ROB {} MCM {} sits at pad row {} column {}; it will decode at that pad",
                    tracklet.detector,
                    tracklet.rob,
                    tracklet.mcm,
                    tracklet.padrow,
                    tracklet.col
                );
            }
            tracklet_keys.push((ori_of(tracklet.detector, tracklet.rob)?, index));
        }
        tracklet_keys.sort_by_key(|(link, index)| {
            (*link, tracklets[*index].padrow, tracklets[*index].col)
        });

        let mut digit_keys = Vec::with_capacity(digit_range.count);
        for index in digit_range.start..digit_range.end() {
            let digit = &digits[index];
            if digit.mcm >= MCMS_PER_ROB || digit.channel as usize >= ADC_CHANNELS_PER_MCM {
                self.stats.invalid_digits += 1;
                log::warn!(
                    "Dropping digit with invalid address -- detector: {} ROB: {} MCM: {} channel: {}",
                    digit.detector,
                    digit.rob,
                    digit.mcm,
                    digit.channel
                );
                continue;
            }
            digit_keys.push((ori_of(digit.detector, digit.rob)?, index));
        }
        digit_keys.sort_by_key(|(link, index)| {
            let digit = &digits[*index];
            (*link, digit.rob, digit.mcm, digit.channel)
        });

        let (tracklet_order, tracklet_links) = group_by_link(&tracklet_keys);
        let (digit_order, digit_links) = group_by_link(&digit_keys);
        Ok(SortedEvent {
            tracklet_order,
            digit_order,
            tracklet_links,
            digit_links,
        })
    }

    /// One chip header per (pad row, column) group followed by up to three data words
    fn write_tracklets(&mut self, tracklets: &[Tracklet], order: &[usize]) {
        let same_chip = |a: &usize, b: &usize| {
            (tracklets[*a].padrow, tracklets[*a].col) == (tracklets[*b].padrow, tracklets[*b].col)
        };
        for group in order.chunk_by(same_chip) {
            if group.len() > MAX_TRACKLETS_PER_MCM {
                self.stats.truncated_tracklet_groups += 1;
                let first = &tracklets[group[0]];
                log::error!(
                    "Detector {} pad row {} column {} has {} tracklets; only {} are written",
                    first.detector,
                    first.padrow,
                    first.col,
                    group.len(),
                    MAX_TRACKLETS_PER_MCM
                );
            }
            let chip = &group[..group.len().min(MAX_TRACKLETS_PER_MCM)];
            let first = &tracklets[chip[0]];
            let mut header = TrackletMcmHeader::new(first.padrow, first.col);
            for (k, index) in chip.iter().enumerate() {
                let (charge_field, clamped) = tracklets[*index].header_charge_field();
                if clamped {
                    self.stats.clamped_charges += 1;
                    log::debug!("Clamped charge field of tracklet {index}");
                }
                header.charge_slots[TrackletMcmHeader::slot_for(k)] = charge_field;
            }
            push_word(&mut self.buffer, header.pack());
            for index in chip {
                push_word(&mut self.buffer, tracklets[*index].data_word().pack());
            }
        }
    }

    fn write_half_chamber_headers(&mut self, detector: u16, side: u8, ir: InteractionRecord) {
        let digit_header = DigitHcHeader::new(detector, side, ir.bc);
        if self.params.format.has_tracklet_hc_header() {
            let tracklet_header = TrackletHcHeader {
                side,
                layer: digit_header.layer,
                stack: digit_header.stack,
                supermodule: digit_header.supermodule,
                format: TRACKLET_HC_HEADER_FORMAT,
                mclk: ir.bc & 0x7fff,
            };
            push_word(&mut self.buffer, tracklet_header.pack());
        }
        for word in digit_header.pack() {
            push_word(&mut self.buffer, word);
        }
    }

    /// One full 21 channel block per (ROB, MCM) group; channels without a digit are blank
    fn write_digits(&mut self, digits: &[Digit], order: &[usize]) {
        let same_chip = |a: &usize, b: &usize| {
            (digits[*a].rob, digits[*a].mcm) == (digits[*b].rob, digits[*b].mcm)
        };
        for chip in order.chunk_by(same_chip) {
            let first = &digits[chip[0]];
            push_word(
                &mut self.buffer,
                DigitMcmHeader::new(first.rob, first.mcm, self.event_counter).pack(),
            );

            let mut present = BitVec::<u32, Lsb0>::repeat(false, ADC_CHANNELS_PER_MCM);
            let mut slots = [0usize; ADC_CHANNELS_PER_MCM];
            for index in chip {
                let channel = digits[*index].channel as usize;
                if present[channel] {
                    self.stats.duplicate_channels += 1;
                    log::warn!(
                        "Duplicate digit for detector {} ROB {} MCM {} channel {channel}; keeping the first",
                        first.detector,
                        first.rob,
                        first.mcm
                    );
                    continue;
                }
                present.set(channel, true);
                slots[channel] = *index;
            }

            for channel in 0..ADC_CHANNELS_PER_MCM {
                if present[channel] {
                    let (words, clipped) = digits[slots[channel]].data_words();
                    self.stats.clipped_samples += clipped as u64;
                    for word in words {
                        push_word(&mut self.buffer, word);
                    }
                } else {
                    for _ in 0..DIGIT_WORDS_PER_CHANNEL {
                        push_word(&mut self.buffer, DigitMcmData::blank().pack());
                    }
                }
            }
        }
    }
}
