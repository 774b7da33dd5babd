use std::fmt::Display;

/// Counters kept by the CruRawReader over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub events: u64,
    pub blocks: u64,
    pub half_crus: u64,
    pub links_parsed: u64,
    pub empty_links: u64,
    pub blank_blocks: u64,
    pub link_errors: u64,
    pub fatals: u64,
    pub trailing_words: u64,
    pub hc_header_mismatches: u64,
    pub tracklets: u64,
    pub digits: u64,
    pub bytes_read: u64,
}

impl ReaderStats {
    pub fn log_summary(&self) {
        log::info!("CruRawReader summary -- {self}");
        if self.link_errors > 0 || self.fatals > 0 {
            log::warn!(
                "CruRawReader encountered {} link errors and {} fatal errors",
                self.link_errors,
                self.fatals
            );
        }
    }
}

impl Display for ReaderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Events: {} Blocks: {} Half-CRUs: {} Links: {} Empty links: {} Blank blocks: {} Link errors: {} Fatals: {} Trailing words: {} HC header mismatches: {} Tracklets: {} Digits: {} Read: {}",
            self.events,
            self.blocks,
            self.half_crus,
            self.links_parsed,
            self.empty_links,
            self.blank_blocks,
            self.link_errors,
            self.fatals,
            self.trailing_words,
            self.hc_header_mismatches,
            self.tracklets,
            self.digits,
            human_bytes::human_bytes(self.bytes_read as f64)
        )
    }
}

/// Counters kept by Trap2Cru over one conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderStats {
    pub events: u64,
    pub half_crus: u64,
    pub links_with_data: u64,
    pub truncated_tracklet_groups: u64,
    pub readdressed_tracklets: u64,
    pub clamped_charges: u64,
    pub clipped_samples: u64,
    pub duplicate_channels: u64,
    pub invalid_digits: u64,
    pub link_length_mismatches: u64,
    pub bytes_written: u64,
}

impl EncoderStats {
    pub fn log_summary(&self) {
        log::info!("Trap2Cru summary -- {self}");
        if self.link_length_mismatches > 0 {
            log::warn!(
                "Trap2Cru wrote {} links whose size disagrees with the half-CRU header",
                self.link_length_mismatches
            );
        }
    }
}

impl Display for EncoderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Events: {} Half-CRUs: {} Links with data: {} Truncated tracklet groups: {} Readdressed tracklets: {} Clamped charges: {} Clipped samples: {} Duplicate channels: {} Invalid digits: {} Link length mismatches: {} Written: {}",
            self.events,
            self.half_crus,
            self.links_with_data,
            self.truncated_tracklet_groups,
            self.readdressed_tracklets,
            self.clamped_charges,
            self.clipped_samples,
            self.duplicate_channels,
            self.invalid_digits,
            self.link_length_mismatches,
            human_bytes::human_bytes(self.bytes_written as f64)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lines() {
        let stats = ReaderStats {
            events: 3,
            link_errors: 1,
            ..Default::default()
        };
        let line = stats.to_string();
        assert!(line.starts_with("Events: 3"));
        assert!(line.contains("Link errors: 1"));

        let stats = EncoderStats {
            clamped_charges: 2,
            ..Default::default()
        };
        assert!(stats.to_string().contains("Clamped charges: 2"));
    }
}
