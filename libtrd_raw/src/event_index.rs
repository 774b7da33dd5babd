use std::cell::Cell;
use std::fmt::Display;

use fxhash::FxHashMap;

use super::digit::{CompressedDigit, Digit};
use super::tracklet::Tracklet;

/// Bunch crossing and orbit identifying one collision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InteractionRecord {
    pub orbit: u32,
    pub bc: u16,
}

impl InteractionRecord {
    pub fn new(bc: u16, orbit: u32) -> Self {
        Self { orbit, bc }
    }
}

impl Display for InteractionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BC: {} Orbit: {}", self.bc, self.orbit)
    }
}

/// A `(start, count)` window into one of the flat record vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataRange {
    pub start: usize,
    pub count: usize,
}

impl DataRange {
    pub fn new(start: usize, count: usize) -> Self {
        Self { start, count }
    }

    pub fn end(&self) -> usize {
        self.start + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Tracklets,
    Digits,
    CompressedDigits,
}

/// Per event summary handed to the encoder: where the event's records sit in
/// event ordered flat vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerRecord {
    pub ir: InteractionRecord,
    pub first_tracklet: usize,
    pub n_tracklets: usize,
    pub first_digit: usize,
    pub n_digits: usize,
}

impl TriggerRecord {
    pub fn new(
        ir: InteractionRecord,
        first_tracklet: usize,
        n_tracklets: usize,
        first_digit: usize,
        n_digits: usize,
    ) -> Self {
        Self {
            ir,
            first_tracklet,
            n_tracklets,
            first_digit,
            n_digits,
        }
    }

    pub fn tracklet_range(&self) -> DataRange {
        DataRange::new(self.first_tracklet, self.n_tracklets)
    }

    pub fn digit_range(&self) -> DataRange {
        DataRange::new(self.first_digit, self.n_digits)
    }
}

/// All ranges recorded for one interaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    pub ir: InteractionRecord,
    pub tracklets: Vec<DataRange>,
    pub digits: Vec<DataRange>,
    pub compressed_digits: Vec<DataRange>,
}

impl EventRecord {
    fn new(ir: InteractionRecord) -> Self {
        Self {
            ir,
            ..Default::default()
        }
    }

    pub fn ranges(&self, kind: DataKind) -> &[DataRange] {
        match kind {
            DataKind::Tracklets => &self.tracklets,
            DataKind::Digits => &self.digits,
            DataKind::CompressedDigits => &self.compressed_digits,
        }
    }

    fn ranges_mut(&mut self, kind: DataKind) -> &mut Vec<DataRange> {
        match kind {
            DataKind::Tracklets => &mut self.tracklets,
            DataKind::Digits => &mut self.digits,
            DataKind::CompressedDigits => &mut self.compressed_digits,
        }
    }

    pub fn count_of(&self, kind: DataKind) -> usize {
        self.ranges(kind).iter().map(|range| range.count).sum()
    }
}

/// EventIndex maps interaction records to the ranges of decoded records that belong to them.
///
/// Records are kept in arrival order with at most one record per interaction. The index does
/// not own the record vectors; it only stores windows into them, which become meaningless
/// once the index is cleared.
#[derive(Debug, Default)]
pub struct EventIndex {
    records: Vec<EventRecord>,
    lookup: FxHashMap<InteractionRecord, usize>,
    lookup_misses: Cell<u64>,
}

impl EventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a range under the record for `ir`, creating the record at the end if this
    /// interaction has not been seen. Appending to a known interaction merges into its record.
    pub fn record_range(&mut self, ir: InteractionRecord, kind: DataKind, start: usize, count: usize) {
        let index = match self.lookup.get(&ir) {
            Some(index) => *index,
            None => {
                self.records.push(EventRecord::new(ir));
                self.lookup.insert(ir, self.records.len() - 1);
                self.records.len() - 1
            }
        };
        self.records[index]
            .ranges_mut(kind)
            .push(DataRange::new(start, count));
    }

    pub fn add_tracklets(&mut self, ir: InteractionRecord, start: usize, count: usize) {
        self.record_range(ir, DataKind::Tracklets, start, count);
    }

    pub fn add_digits(&mut self, ir: InteractionRecord, start: usize, count: usize) {
        self.record_range(ir, DataKind::Digits, start, count);
    }

    pub fn add_compressed_digits(&mut self, ir: InteractionRecord, start: usize, count: usize) {
        self.record_range(ir, DataKind::CompressedDigits, start, count);
    }

    /// The ranges of a kind recorded for `ir`. An unknown interaction yields an empty slice
    /// and is counted as a lookup miss.
    pub fn ranges_for(&self, ir: &InteractionRecord, kind: DataKind) -> &[DataRange] {
        match self.lookup.get(ir) {
            Some(index) => self.records[*index].ranges(kind),
            None => {
                self.lookup_misses.set(self.lookup_misses.get() + 1);
                log::warn!("No event record found for interaction {ir}");
                self.log_records();
                &[]
            }
        }
    }

    pub fn contains(&self, ir: &InteractionRecord) -> bool {
        self.lookup.contains_key(ir)
    }

    /// Reset to empty. The lookup miss counter is kept for the run summary.
    pub fn clear(&mut self) {
        self.records.clear();
        self.lookup.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn interaction_records(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.records.iter().map(|record| &record.ir)
    }

    /// Total number of records of a kind over all interactions
    pub fn sum_of(&self, kind: DataKind) -> usize {
        self.records.iter().map(|record| record.count_of(kind)).sum()
    }

    pub fn lookup_misses(&self) -> u64 {
        self.lookup_misses.get()
    }

    /// Dump every known interaction at debug level
    pub fn log_records(&self) {
        log::debug!("EventIndex holds {} interaction records", self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            log::debug!(
                "{index}: {} -- tracklets: {} digits: {} compressed digits: {}",
                record.ir,
                record.count_of(DataKind::Tracklets),
                record.count_of(DataKind::Digits),
                record.count_of(DataKind::CompressedDigits)
            );
        }
    }

    /// Gather the indexed records into event ordered vectors with one TriggerRecord per
    /// interaction, ready to be handed to the encoder. Compressed digits are expanded.
    pub fn unpack_for_sending(
        &self,
        tracklets: &[Tracklet],
        digits: &[Digit],
        compressed_digits: &[CompressedDigit],
    ) -> (Vec<TriggerRecord>, Vec<Tracklet>, Vec<Digit>) {
        let mut triggers = Vec::with_capacity(self.records.len());
        let mut event_tracklets: Vec<Tracklet> = Vec::with_capacity(tracklets.len());
        let mut event_digits: Vec<Digit> = Vec::with_capacity(digits.len());

        for record in self.records.iter() {
            let first_tracklet = event_tracklets.len();
            for range in record.tracklets.iter() {
                match tracklets.get(range.start..range.end()) {
                    Some(window) => event_tracklets.extend_from_slice(window),
                    None => log::warn!(
                        "Tracklet range {}..{} for {} is outside of the {} tracklets",
                        range.start,
                        range.end(),
                        record.ir,
                        tracklets.len()
                    ),
                }
            }

            let first_digit = event_digits.len();
            for range in record.digits.iter() {
                match digits.get(range.start..range.end()) {
                    Some(window) => event_digits.extend_from_slice(window),
                    None => log::warn!(
                        "Digit range {}..{} for {} is outside of the {} digits",
                        range.start,
                        range.end(),
                        record.ir,
                        digits.len()
                    ),
                }
            }
            for range in record.compressed_digits.iter() {
                match compressed_digits.get(range.start..range.end()) {
                    Some(window) => {
                        event_digits.extend(window.iter().map(|digit| digit.expand()))
                    }
                    None => log::warn!(
                        "Compressed digit range {}..{} for {} is outside of the {} compressed digits",
                        range.start,
                        range.end(),
                        record.ir,
                        compressed_digits.len()
                    ),
                }
            }

            triggers.push(TriggerRecord::new(
                record.ir,
                first_tracklet,
                event_tracklets.len() - first_tracklet,
                first_digit,
                event_digits.len() - first_digit,
            ));
        }

        (triggers, event_tracklets, event_digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_order_and_merge() {
        let mut index = EventIndex::new();
        let first = InteractionRecord::new(10, 1);
        let second = InteractionRecord::new(5, 1);
        index.add_tracklets(first, 0, 4);
        index.add_tracklets(second, 4, 2);
        index.add_digits(first, 0, 3);
        index.add_tracklets(first, 6, 1);

        assert_eq!(index.len(), 2);
        let order: Vec<_> = index.interaction_records().copied().collect();
        assert_eq!(order, vec![first, second]);
        assert_eq!(
            index.ranges_for(&first, DataKind::Tracklets),
            &[DataRange::new(0, 4), DataRange::new(6, 1)]
        );
        assert_eq!(index.ranges_for(&first, DataKind::Digits), &[DataRange::new(0, 3)]);
        assert!(index.ranges_for(&second, DataKind::Digits).is_empty());
        assert_eq!(index.sum_of(DataKind::Tracklets), 7);
        assert_eq!(index.lookup_misses(), 0);
    }

    #[test]
    fn test_lookup_miss() {
        let mut index = EventIndex::new();
        index.add_digits(InteractionRecord::new(1, 1), 0, 1);
        let missing = InteractionRecord::new(2, 1);
        assert!(index.ranges_for(&missing, DataKind::Digits).is_empty());
        assert!(index.ranges_for(&missing, DataKind::Tracklets).is_empty());
        assert_eq!(index.lookup_misses(), 2);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut index = EventIndex::new();
        let ir = InteractionRecord::new(3, 9);
        index.add_compressed_digits(ir, 0, 2);
        index.clear();
        assert!(index.is_empty());
        assert!(!index.contains(&ir));
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.sum_of(DataKind::CompressedDigits), 0);

        index.add_tracklets(ir, 0, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_unpack_for_sending() {
        let tracklets: Vec<Tracklet> = (0..5)
            .map(|position| Tracklet::from_chip(0, 0, 0, position, 0, 0, 0, 0))
            .collect();
        let digits: Vec<Digit> = (0..3)
            .map(|channel| Digit::new(0, 0, 0, channel, [channel as u16; 30]))
            .collect();
        let compressed = vec![CompressedDigit::from_digit(&Digit::new(1, 1, 1, 1, [7; 30]))];

        let first = InteractionRecord::new(1, 100);
        let second = InteractionRecord::new(2, 100);
        let mut index = EventIndex::new();
        index.add_tracklets(first, 0, 2);
        index.add_tracklets(second, 2, 3);
        index.add_digits(second, 0, 3);
        index.add_compressed_digits(first, 0, 1);
        index.add_tracklets(first, 2, 1);

        let (triggers, event_tracklets, event_digits) =
            index.unpack_for_sending(&tracklets, &digits, &compressed);
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0], TriggerRecord::new(first, 0, 3, 0, 1));
        assert_eq!(triggers[1], TriggerRecord::new(second, 3, 3, 1, 3));
        assert_eq!(event_tracklets.len(), 6);
        assert_eq!(event_tracklets[2].position, 2);
        assert_eq!(event_digits[0].adc[0], 7);
    }
}
