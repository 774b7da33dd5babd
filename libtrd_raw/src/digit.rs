use super::constants::{ADC_MASK, DIGIT_WORDS_PER_CHANNEL, NUMBER_OF_SIDES, TIMEBINS};
use super::raw_data::DigitMcmData;

/// The full ADC time series of one channel of one chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digit {
    pub detector: u16,
    pub rob: u8,
    pub mcm: u8,
    pub channel: u8,
    pub adc: [u16; TIMEBINS],
}

impl Digit {
    pub fn new(detector: u16, rob: u8, mcm: u8, channel: u8, adc: [u16; TIMEBINS]) -> Self {
        Self {
            detector,
            rob,
            mcm,
            channel,
            adc,
        }
    }

    pub fn side(&self) -> u8 {
        self.rob % NUMBER_OF_SIDES as u8
    }

    pub fn adc_sum(&self) -> u32 {
        self.adc.iter().map(|sample| *sample as u32).sum()
    }

    /// Pack the samples into the channel's data words. Samples wider than 10 bits are
    /// clipped to the maximum; the number of clipped samples is returned alongside.
    pub fn data_words(&self) -> ([u32; DIGIT_WORDS_PER_CHANNEL], usize) {
        let mut words = [0u32; DIGIT_WORDS_PER_CHANNEL];
        let mut clipped = 0;
        for (word, samples) in words.iter_mut().zip(self.adc.chunks_exact(3)) {
            let mut triplet = [0u16; 3];
            for (slot, sample) in triplet.iter_mut().zip(samples) {
                if *sample > ADC_MASK {
                    clipped += 1;
                    *slot = ADC_MASK;
                } else {
                    *slot = *sample;
                }
            }
            *word = DigitMcmData::new(triplet).pack();
        }
        (words, clipped)
    }

    /// Rebuild a digit from the data words of one channel
    pub fn from_words(detector: u16, rob: u8, mcm: u8, channel: u8, words: &[u32]) -> Self {
        let mut adc = [0u16; TIMEBINS];
        for (samples, word) in adc.chunks_exact_mut(3).zip(words) {
            samples.copy_from_slice(&DigitMcmData::unpack(*word).samples);
        }
        Self::new(detector, rob, mcm, channel, adc)
    }
}

/// A digit kept in its wire form: the address plus the 10 packed data words of the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedDigit {
    pub detector: u16,
    pub rob: u8,
    pub mcm: u8,
    pub channel: u8,
    pub words: [u32; DIGIT_WORDS_PER_CHANNEL],
}

impl CompressedDigit {
    pub fn new(detector: u16, rob: u8, mcm: u8, channel: u8, words: &[u32]) -> Self {
        let mut packed = [0u32; DIGIT_WORDS_PER_CHANNEL];
        for (slot, word) in packed.iter_mut().zip(words) {
            *slot = *word;
        }
        Self {
            detector,
            rob,
            mcm,
            channel,
            words: packed,
        }
    }

    pub fn from_digit(digit: &Digit) -> Self {
        let (words, _) = digit.data_words();
        Self {
            detector: digit.detector,
            rob: digit.rob,
            mcm: digit.mcm,
            channel: digit.channel,
            words,
        }
    }

    pub fn expand(&self) -> Digit {
        Digit::from_words(self.detector, self.rob, self.mcm, self.channel, &self.words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> [u16; TIMEBINS] {
        let mut adc = [0u16; TIMEBINS];
        for (bin, sample) in adc.iter_mut().enumerate() {
            *sample = (bin as u16) * 30 + 1;
        }
        adc
    }

    #[test]
    fn test_data_words_sample_order() {
        let digit = Digit::new(0, 0, 0, 0, ramp());
        let (words, clipped) = digit.data_words();
        assert_eq!(clipped, 0);
        let first = DigitMcmData::unpack(words[0]);
        assert_eq!(first.samples, [1, 31, 61]);
        assert!(!first.is_blank());
        assert_eq!(Digit::from_words(0, 0, 0, 0, &words), digit);
    }

    #[test]
    fn test_clipping() {
        let mut adc = ramp();
        adc[4] = 2000;
        let digit = Digit::new(5, 3, 2, 20, adc);
        let (words, clipped) = digit.data_words();
        assert_eq!(clipped, 1);
        assert_eq!(DigitMcmData::unpack(words[1]).samples[1], ADC_MASK);
    }

    #[test]
    fn test_compressed_expand() {
        let digit = Digit::new(100, 7, 15, 3, ramp());
        let compressed = CompressedDigit::from_digit(&digit);
        assert_eq!(compressed.expand(), digit);
        assert_eq!(digit.side(), 1);
        assert_eq!(digit.adc_sum(), (0..30).map(|bin| bin * 30 + 1).sum::<u32>());
    }
}
