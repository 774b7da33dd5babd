use byteorder::{ByteOrder, LittleEndian};

use super::constants::{MAX_BUNCH_CROSSING, RDH_SIZE, RDH_VERSION, TRD_LINK_ID, TRD_SOURCE_ID};
use super::error::{CursorError, RawDataError};
use super::event_index::InteractionRecord;

const CRU_ID_MASK: u16 = 0x0fff;
const ENDPOINT_SHIFT: u16 = 12;

/// The Raw Data Header found at the start of every hardware block (page).
///
/// Only the fields the TRD readout cares about are represented. All other bytes of the
/// 64 byte header are written as zero and ignored when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rdh {
    pub fee_id: u16,
    pub priority: u8,
    pub source_id: u8,
    pub offset_to_next: u16,
    pub memory_size: u16,
    pub link_id: u8,
    pub packet_counter: u8,
    pub cru_id: u16,
    pub endpoint: u8,
    pub bc: u16,
    pub orbit: u32,
    pub trigger_type: u32,
    pub pages_counter: u16,
    pub stop_bit: u8,
}

impl Default for Rdh {
    fn default() -> Self {
        Self {
            fee_id: 0,
            priority: 0,
            source_id: TRD_SOURCE_ID,
            offset_to_next: RDH_SIZE as u16,
            memory_size: RDH_SIZE as u16,
            link_id: TRD_LINK_ID,
            packet_counter: 0,
            cru_id: 0,
            endpoint: 0,
            bc: 0,
            orbit: 0,
            trigger_type: 0,
            pages_counter: 0,
            stop_bit: 0,
        }
    }
}

impl Rdh {
    /// Read an RDH from the front of a byte slice. The slice may be longer than the header.
    pub fn unpack(bytes: &[u8]) -> Result<Self, RawDataError> {
        if bytes.len() < RDH_SIZE {
            return Err(RawDataError::Cursor(CursorError::OutOfData {
                requested: RDH_SIZE,
                offset: 0,
                remaining: bytes.len(),
            }));
        }
        if bytes[0] != RDH_VERSION {
            return Err(RawDataError::BadRdhVersion(bytes[0]));
        }
        if bytes[1] as usize != RDH_SIZE {
            return Err(RawDataError::BadRdhHeaderSize(bytes[1]));
        }

        let cru_word = LittleEndian::read_u16(&bytes[14..16]);
        let rdh = Self {
            fee_id: LittleEndian::read_u16(&bytes[2..4]),
            priority: bytes[4],
            source_id: bytes[5],
            offset_to_next: LittleEndian::read_u16(&bytes[8..10]),
            memory_size: LittleEndian::read_u16(&bytes[10..12]),
            link_id: bytes[12],
            packet_counter: bytes[13],
            cru_id: cru_word & CRU_ID_MASK,
            endpoint: (cru_word >> ENDPOINT_SHIFT) as u8,
            bc: LittleEndian::read_u16(&bytes[16..18]) & MAX_BUNCH_CROSSING,
            orbit: LittleEndian::read_u32(&bytes[20..24]),
            trigger_type: LittleEndian::read_u32(&bytes[32..36]),
            pages_counter: LittleEndian::read_u16(&bytes[36..38]),
            stop_bit: bytes[38],
        };

        if (rdh.memory_size as usize) < RDH_SIZE || rdh.offset_to_next < rdh.memory_size {
            return Err(RawDataError::BadRdhSizes {
                memory_size: rdh.memory_size,
                offset_to_next: rdh.offset_to_next,
            });
        }
        Ok(rdh)
    }

    pub fn pack(&self) -> [u8; RDH_SIZE] {
        let mut bytes = [0u8; RDH_SIZE];
        bytes[0] = RDH_VERSION;
        bytes[1] = RDH_SIZE as u8;
        LittleEndian::write_u16(&mut bytes[2..4], self.fee_id);
        bytes[4] = self.priority;
        bytes[5] = self.source_id;
        LittleEndian::write_u16(&mut bytes[8..10], self.offset_to_next);
        LittleEndian::write_u16(&mut bytes[10..12], self.memory_size);
        bytes[12] = self.link_id;
        bytes[13] = self.packet_counter;
        LittleEndian::write_u16(
            &mut bytes[14..16],
            (self.cru_id & CRU_ID_MASK) | ((self.endpoint as u16) << ENDPOINT_SHIFT),
        );
        LittleEndian::write_u16(&mut bytes[16..18], self.bc & MAX_BUNCH_CROSSING);
        LittleEndian::write_u32(&mut bytes[20..24], self.orbit);
        LittleEndian::write_u32(&mut bytes[32..36], self.trigger_type);
        LittleEndian::write_u16(&mut bytes[36..38], self.pages_counter);
        bytes[38] = self.stop_bit;
        bytes
    }

    /// Size of the data following the header inside this block
    pub fn payload_size(&self) -> usize {
        self.memory_size as usize - RDH_SIZE
    }

    pub fn is_stop(&self) -> bool {
        self.stop_bit != 0
    }

    pub fn interaction_record(&self) -> InteractionRecord {
        InteractionRecord::new(self.bc, self.orbit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdh_pack_unpack() {
        let rdh = Rdh {
            fee_id: 0x0381,
            offset_to_next: 200,
            memory_size: 200,
            cru_id: 17,
            endpoint: 1,
            bc: 0xabc,
            orbit: 123_456,
            trigger_type: 0x10,
            pages_counter: 3,
            stop_bit: 1,
            ..Default::default()
        };
        let bytes = rdh.pack();
        assert_eq!(bytes[0], RDH_VERSION);
        assert_eq!(LittleEndian::read_u16(&bytes[14..16]), 17 | (1 << 12));
        let parsed = Rdh::unpack(&bytes).unwrap();
        assert_eq!(parsed, rdh);
        assert_eq!(parsed.payload_size(), 136);
        assert!(parsed.is_stop());
        assert_eq!(parsed.interaction_record(), InteractionRecord::new(0xabc, 123_456));
    }

    #[test]
    fn test_rdh_rejects_bad_headers() {
        let mut bytes = Rdh::default().pack();
        bytes[1] = 32;
        assert_eq!(Rdh::unpack(&bytes), Err(RawDataError::BadRdhHeaderSize(32)));

        let bytes = Rdh {
            memory_size: 100,
            offset_to_next: 80,
            ..Default::default()
        }
        .pack();
        assert!(matches!(
            Rdh::unpack(&bytes),
            Err(RawDataError::BadRdhSizes { .. })
        ));
        assert!(Rdh::unpack(&bytes[..40]).is_err());
    }
}
