use super::constants::{NUMBER_OF_SIDES, TRACKLET_FORMAT, UNUSED_CHARGE_FIELD};
use super::link_map::{mcm_from_pad, pad_from_chip, rob_from_pad};
use super::raw_data::{TrackletMcmData, TrackletMcmHeader};

const CLAMPED_CHARGE_FIELD: u8 = UNUSED_CHARGE_FIELD - 1;

/// A tracklet as produced by one TRAP chip.
///
/// Charges are Q0 (7 bit), Q1 (7 bit) and Q2 (6 bit). On the wire the charges are split
/// between the chip header and the data word; see `header_charge_field` and `data_pid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tracklet {
    pub detector: u16,
    pub rob: u8,
    pub mcm: u8,
    pub col: u8,
    pub padrow: u8,
    pub position: u16,
    pub slope: u8,
    pub q0: u8,
    pub q1: u8,
    pub q2: u8,
}

impl Tracklet {
    /// Create a tracklet for a chip, deriving the pad row and MCM column from the ROB and MCM
    #[allow(clippy::too_many_arguments)]
    pub fn from_chip(
        detector: u16,
        rob: u8,
        mcm: u8,
        position: u16,
        slope: u8,
        q0: u8,
        q1: u8,
        q2: u8,
    ) -> Self {
        let (padrow, col) = pad_from_chip(rob, mcm);
        Self {
            detector,
            rob,
            mcm,
            col,
            padrow,
            position: position & 0x7ff,
            slope,
            q0: q0 & 0x7f,
            q1: q1 & 0x7f,
            q2: q2 & 0x3f,
        }
    }

    /// Rebuild a tracklet from its wire words. The ROB and MCM are derived from the pad row,
    /// column and the side of the link the tracklet arrived on.
    pub fn from_wire(
        detector: u16,
        side: u8,
        header: &TrackletMcmHeader,
        charge_field: u8,
        data: &TrackletMcmData,
    ) -> Self {
        Self {
            detector,
            rob: rob_from_pad(header.padrow, side),
            mcm: mcm_from_pad(header.padrow, header.col),
            col: header.col,
            padrow: header.padrow,
            position: data.position,
            slope: data.slope,
            q0: (data.pid & 0x7f) as u8,
            q1: (((data.pid >> 7) & 0x1f) as u8) | ((charge_field & 0x3) << 5),
            q2: charge_field >> 2,
        }
    }

    pub fn side(&self) -> u8 {
        self.rob % NUMBER_OF_SIDES as u8
    }

    /// Half-chamber id: detector * 2 + side
    pub fn hcid(&self) -> u16 {
        self.detector * 2 + self.side() as u16
    }

    /// Value stored in the chip header charge slot, and whether it had to be clamped away
    /// from the unused marker.
    pub fn header_charge_field(&self) -> (u8, bool) {
        let value = ((self.q2 & 0x3f) << 2) | ((self.q1 & 0x7f) >> 5);
        if value == UNUSED_CHARGE_FIELD {
            (CLAMPED_CHARGE_FIELD, true)
        } else {
            (value, false)
        }
    }

    pub fn data_pid(&self) -> u16 {
        (self.q0 as u16 & 0x7f) | ((self.q1 as u16 & 0x1f) << 7)
    }

    pub fn data_word(&self) -> TrackletMcmData {
        TrackletMcmData {
            check: 0,
            slope: self.slope,
            pid: self.data_pid(),
            position: self.position,
        }
    }

    /// The 64 bit packed form of the tracklet
    pub fn word(&self) -> u64 {
        (TRACKLET_FORMAT as u64 & 0xf) << 60
            | (self.hcid() as u64 & 0x7ff) << 49
            | (self.padrow as u64 & 0xf) << 45
            | (self.col as u64 & 0x3) << 43
            | (self.position as u64 & 0x7ff) << 32
            | (self.slope as u64) << 24
            | (self.q2 as u64) << 16
            | (self.q1 as u64) << 8
            | self.q0 as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_split() {
        let tracklet = Tracklet::from_chip(0, 0, 5, 100, 12, 10, 20, 30);
        let (field, clamped) = tracklet.header_charge_field();
        assert_eq!(field, 120);
        assert!(!clamped);
        assert_eq!(tracklet.data_pid(), 10 | (20 << 7));

        let mut header = TrackletMcmHeader::new(tracklet.padrow, tracklet.col);
        header.charge_slots[2] = field;
        let rebuilt = Tracklet::from_wire(0, 0, &header, field, &tracklet.data_word());
        assert_eq!(rebuilt, tracklet);
    }

    #[test]
    fn test_high_charge_bits() {
        let tracklet = Tracklet::from_chip(3, 1, 15, 2047, 255, 127, 100, 40);
        let (field, _) = tracklet.header_charge_field();
        let header = TrackletMcmHeader::new(tracklet.padrow, tracklet.col);
        let rebuilt = Tracklet::from_wire(3, 1, &header, field, &tracklet.data_word());
        assert_eq!(rebuilt, tracklet);
    }

    #[test]
    fn test_unused_marker_is_clamped() {
        let tracklet = Tracklet::from_chip(0, 0, 0, 0, 0, 0, 0x60, 0x3f);
        assert_eq!(tracklet.header_charge_field(), (0xfe, true));
    }

    #[test]
    fn test_packed_word() {
        let tracklet = Tracklet::from_chip(1, 1, 6, 0x155, 0xab, 1, 2, 3);
        let word = tracklet.word();
        assert_eq!(word >> 60, TRACKLET_FORMAT as u64);
        assert_eq!((word >> 49) & 0x7ff, 3);
        assert_eq!((word >> 45) & 0xf, tracklet.padrow as u64);
        assert_eq!((word >> 32) & 0x7ff, 0x155);
        assert_eq!(word & 0xff_ffff, 3 << 16 | 2 << 8 | 1);
    }
}
