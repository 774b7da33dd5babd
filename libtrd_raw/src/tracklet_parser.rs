use super::constants::TRACKLET_END_MARKER;
use super::cursor::WordCursor;
use super::error::LinkParseError;
use super::raw_data::{TrackletMcmData, TrackletMcmHeader};
use super::tracklet::Tracklet;

/// Parses the tracklet section of one link: chip headers each followed by their data
/// words, terminated by the two word tracklet end marker.
#[derive(Debug, Clone, Copy)]
pub struct TrackletParser {
    detector: u16,
    side: u8,
}

impl TrackletParser {
    pub fn new(detector: u16, side: u8) -> Self {
        Self { detector, side }
    }

    fn at_end_marker(cursor: &WordCursor) -> bool {
        matches!(
            (cursor.peek_u32(0), cursor.peek_u32(1)),
            (Ok(TRACKLET_END_MARKER), Ok(TRACKLET_END_MARKER))
        )
    }

    /// Parse up to and including the end marker, appending tracklets to `output`.
    ///
    /// Returns the number of tracklets appended. On error, tracklets already appended for
    /// this link are left in `output`; the caller decides whether to keep them.
    pub fn parse(
        &self,
        cursor: &mut WordCursor,
        output: &mut Vec<Tracklet>,
    ) -> Result<usize, LinkParseError> {
        let mut count = 0;
        loop {
            if Self::at_end_marker(cursor) {
                cursor.read_u32()?;
                cursor.read_u32()?;
                return Ok(count);
            }
            if cursor.remaining_words() < 2 {
                return Err(LinkParseError::MissingTrackletEndMarker);
            }

            let word = cursor.read_u32()?;
            let header = TrackletMcmHeader::unpack(word)?;
            let n_tracklets = header.tracklet_count();
            if cursor.remaining_words() < n_tracklets {
                return Err(LinkParseError::TruncatedTrackletData(word));
            }
            for k in 0..n_tracklets {
                let data = TrackletMcmData::unpack(cursor.read_u32()?);
                let charge_field = header.charge_slots[TrackletMcmHeader::slot_for(k)];
                output.push(Tracklet::from_wire(
                    self.detector,
                    self.side,
                    &header,
                    charge_field,
                    &data,
                ));
                count += 1;
            }
        }
    }
}
