use super::config::FormatVersion;
use super::constants::*;
use super::cursor::WordCursor;
use super::digit::{CompressedDigit, Digit};
use super::error::LinkParseError;
use super::link_map::robs_per_chamber;
use super::raw_data::{DigitHcHeader, DigitMcmData, DigitMcmHeader, TrackletHcHeader};

/// The half-chamber header words found between the tracklet end marker and the first
/// digit chip header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfChamberHeaders {
    pub tracklet: Option<TrackletHcHeader>,
    pub digit: DigitHcHeader,
}

impl HalfChamberHeaders {
    pub fn read(cursor: &mut WordCursor, format: FormatVersion) -> Result<Self, LinkParseError> {
        if cursor.remaining_words() < format.hc_header_words() {
            return Err(LinkParseError::MissingHalfChamberHeader);
        }
        let tracklet = if format.has_tracklet_hc_header() {
            Some(TrackletHcHeader::unpack(cursor.read_u32()?)?)
        } else {
            None
        };
        let word0 = cursor.read_u32()?;
        let word1 = cursor.read_u32()?;
        Ok(Self {
            tracklet,
            digit: DigitHcHeader::unpack(word0, word1)?,
        })
    }

    /// True if every header names the given half-chamber
    pub fn matches(&self, detector: u16, side: u8) -> bool {
        let digit_ok = self.digit.detector() == detector && self.digit.side == side;
        let tracklet_ok = self
            .tracklet
            .map(|header| header.detector() == detector && header.side == side)
            .unwrap_or(true);
        digit_ok && tracklet_ok
    }
}

/// Parses the digit section of one link: non zero-suppressed chip blocks of 21 channels ×
/// 10 words, terminated by the two word digit end marker.
#[derive(Debug, Clone, Copy)]
pub struct DigitParser {
    detector: u16,
    side: u8,
    keep_compressed: bool,
}

impl DigitParser {
    pub fn new(detector: u16, side: u8, keep_compressed: bool) -> Self {
        Self {
            detector,
            side,
            keep_compressed,
        }
    }

    fn at_end_marker(cursor: &WordCursor) -> bool {
        matches!(
            (cursor.peek_u32(0), cursor.peek_u32(1)),
            (Ok(DIGIT_END_MARKER), Ok(DIGIT_END_MARKER))
        )
    }

    /// Parse up to and including the end marker. Channels are appended to `digits`, or to
    /// `compressed` when the parser keeps the wire form. Blank channels produce nothing.
    ///
    /// Returns the number of channels appended.
    pub fn parse(
        &self,
        cursor: &mut WordCursor,
        digits: &mut Vec<Digit>,
        compressed: &mut Vec<CompressedDigit>,
    ) -> Result<usize, LinkParseError> {
        let mut count = 0;
        loop {
            if Self::at_end_marker(cursor) {
                cursor.read_u32()?;
                cursor.read_u32()?;
                return Ok(count);
            }
            if cursor.remaining_words() < 2 {
                return Err(LinkParseError::MissingDigitEndMarker);
            }

            let header = DigitMcmHeader::unpack(cursor.read_u32()?)?;
            if header.rob % NUMBER_OF_SIDES as u8 != self.side
                || header.rob >= robs_per_chamber(self.detector)
            {
                return Err(LinkParseError::RobSideMismatch(header.rob, self.side));
            }
            if cursor.remaining_words() < DIGIT_WORDS_PER_MCM {
                return Err(LinkParseError::TruncatedDigitBlock(header.rob, header.mcm));
            }

            for channel in 0..ADC_CHANNELS_PER_MCM as u8 {
                let mut words = [0u32; DIGIT_WORDS_PER_CHANNEL];
                for word in words.iter_mut() {
                    *word = cursor.read_u32()?;
                }
                let blanks = words
                    .iter()
                    .filter(|word| DigitMcmData::unpack(**word).is_blank())
                    .count();
                let samples = words
                    .iter()
                    .filter(|word| DigitMcmData::unpack(**word).flag == DIGIT_SAMPLE_FLAG)
                    .count();

                if blanks == DIGIT_WORDS_PER_CHANNEL {
                    continue;
                }
                if samples != DIGIT_WORDS_PER_CHANNEL {
                    return Err(LinkParseError::MixedChannelWords {
                        rob: header.rob,
                        mcm: header.mcm,
                        channel,
                    });
                }

                if self.keep_compressed {
                    compressed.push(CompressedDigit::new(
                        self.detector,
                        header.rob,
                        header.mcm,
                        channel,
                        &words,
                    ));
                } else {
                    digits.push(Digit::from_words(
                        self.detector,
                        header.rob,
                        header.mcm,
                        channel,
                        &words,
                    ));
                }
                count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_data::push_word;

    fn to_bytes(words: &[u32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in words {
            push_word(&mut bytes, *word);
        }
        bytes
    }

    fn chip_block(rob: u8, mcm: u8, present: &[Digit]) -> Vec<u32> {
        let mut words = vec![DigitMcmHeader::new(rob, mcm, 1).pack()];
        for channel in 0..ADC_CHANNELS_PER_MCM as u8 {
            match present.iter().find(|digit| digit.channel == channel) {
                Some(digit) => words.extend(digit.data_words().0),
                None => words.extend([DigitMcmData::blank().pack(); DIGIT_WORDS_PER_CHANNEL]),
            }
        }
        words
    }

    #[test]
    fn test_parse_chip_with_blank_channels() {
        let present = [
            Digit::new(44, 2, 9, 0, [12; TIMEBINS]),
            Digit::new(44, 2, 9, 20, [1023; TIMEBINS]),
        ];
        let mut words = chip_block(2, 9, &present);
        words.extend([DIGIT_END_MARKER, DIGIT_END_MARKER]);
        let bytes = to_bytes(&words);

        let mut cursor = WordCursor::new(&bytes);
        let mut digits = Vec::new();
        let mut compressed = Vec::new();
        let count = DigitParser::new(44, 0, false)
            .parse(&mut cursor, &mut digits, &mut compressed)
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(digits, present);
        assert!(compressed.is_empty());
        assert!(cursor.is_empty());

        let mut cursor = WordCursor::new(&bytes);
        let mut digits = Vec::new();
        DigitParser::new(44, 0, true)
            .parse(&mut cursor, &mut digits, &mut compressed)
            .unwrap();
        assert!(digits.is_empty());
        assert_eq!(compressed[1].expand(), present[1]);
    }

    #[test]
    fn test_truncated_block_and_side_mismatch() {
        let words = chip_block(2, 9, &[]);
        let bytes = to_bytes(&words[..100]);
        let mut cursor = WordCursor::new(&bytes);
        assert_eq!(
            DigitParser::new(44, 0, false).parse(&mut cursor, &mut Vec::new(), &mut Vec::new()),
            Err(LinkParseError::TruncatedDigitBlock(2, 9))
        );

        let bytes = to_bytes(&words);
        let mut cursor = WordCursor::new(&bytes);
        assert_eq!(
            DigitParser::new(44, 1, false).parse(&mut cursor, &mut Vec::new(), &mut Vec::new()),
            Err(LinkParseError::RobSideMismatch(2, 1))
        );
    }

    #[test]
    fn test_missing_end_marker_and_mixed_words() {
        let mut words = chip_block(0, 0, &[]);
        let bytes = to_bytes(&words);
        let mut cursor = WordCursor::new(&bytes);
        assert_eq!(
            DigitParser::new(0, 0, false).parse(&mut cursor, &mut Vec::new(), &mut Vec::new()),
            Err(LinkParseError::MissingDigitEndMarker)
        );

        words[1] = DigitMcmData::new([1, 2, 3]).pack();
        words.extend([DIGIT_END_MARKER, DIGIT_END_MARKER]);
        let bytes = to_bytes(&words);
        let mut cursor = WordCursor::new(&bytes);
        assert_eq!(
            DigitParser::new(0, 0, false).parse(&mut cursor, &mut Vec::new(), &mut Vec::new()),
            Err(LinkParseError::MixedChannelWords {
                rob: 0,
                mcm: 0,
                channel: 0
            })
        );
    }

    #[test]
    fn test_half_chamber_headers() {
        let digit = DigitHcHeader::new(44, 1, 100);
        let tracklet = TrackletHcHeader {
            side: 1,
            layer: 2,
            stack: 2,
            supermodule: 1,
            format: TRACKLET_HC_HEADER_FORMAT,
            mclk: 100,
        };
        let [word0, word1] = digit.pack();
        let bytes = to_bytes(&[tracklet.pack(), word0, word1]);

        let mut cursor = WordCursor::new(&bytes);
        let headers = HalfChamberHeaders::read(&mut cursor, FormatVersion::Run3).unwrap();
        assert_eq!(headers.tracklet, Some(tracklet));
        assert!(headers.matches(44, 1));
        assert!(!headers.matches(44, 0));

        let mut cursor = WordCursor::new(&bytes[4..]);
        let headers = HalfChamberHeaders::read(&mut cursor, FormatVersion::Run2).unwrap();
        assert!(headers.tracklet.is_none());
        assert!(headers.matches(44, 1));

        let mut cursor = WordCursor::new(&bytes[8..]);
        assert_eq!(
            HalfChamberHeaders::read(&mut cursor, FormatVersion::Run2),
            Err(LinkParseError::MissingHalfChamberHeader)
        );
    }
}
