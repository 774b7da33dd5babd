//! Mapping between the detector addressing (detector, ROB) and the optical links of the
//! readout. Every chamber is read out through two links, one per side (ROB parity). Links
//! are numbered so that half-CRU h owns links h*15..h*15+15:
//!
//! ```text
//! sm = det / 30, c = det % 30, side = rob % 2
//! link = ((sm * 2 + c / 15) * 2 + side) * 15 + c % 15
//! ```
//!
//! which makes half-CRU h read out supermodule h/4 from CRU h/2 on endpoint h%2, and the
//! endpoint equal to the chamber side.
use super::config::FormatVersion;
use super::constants::*;
use super::error::LinkMapError;

pub type LinkId = usize;

const CHAMBERS_PER_HALF_SUPERMODULE: usize = CHAMBERS_PER_SUPERMODULE / 2;

/// Number of ROBs on a chamber. The short chambers of the middle stack carry fewer.
pub fn robs_per_chamber(detector: u16) -> u8 {
    let stack = (detector as usize % CHAMBERS_PER_SUPERMODULE) / NUMBER_OF_LAYERS;
    if stack == C0_STACK {
        ROBS_PER_C0_CHAMBER
    } else {
        ROBS_PER_C1_CHAMBER
    }
}

/// Link (ORI) that reads out a given ROB of a given chamber
pub fn ori_of(detector: u16, rob: u8) -> Result<LinkId, LinkMapError> {
    if detector as usize >= NUMBER_OF_CHAMBERS || rob >= robs_per_chamber(detector) {
        return Err(LinkMapError::InvalidAddress(detector, rob));
    }
    let supermodule = detector as usize / CHAMBERS_PER_SUPERMODULE;
    let chamber = detector as usize % CHAMBERS_PER_SUPERMODULE;
    let side = rob as usize % NUMBER_OF_SIDES;
    let half_cru = (supermodule * 2 + chamber / CHAMBERS_PER_HALF_SUPERMODULE) * NUMBER_OF_SIDES
        + side;
    Ok(half_cru * LINKS_PER_HALF_CRU + chamber % CHAMBERS_PER_HALF_SUPERMODULE)
}

/// The 15 links of a half-CRU in ascending order
pub fn link_range_for(half_cru: usize) -> Result<[LinkId; LINKS_PER_HALF_CRU], LinkMapError> {
    if half_cru >= NUMBER_OF_HALF_CRUS {
        return Err(LinkMapError::InvalidHalfCru(half_cru));
    }
    let mut links = [0; LINKS_PER_HALF_CRU];
    for (offset, link) in links.iter_mut().enumerate() {
        *link = half_cru * LINKS_PER_HALF_CRU + offset;
    }
    Ok(links)
}

/// Inverse of `ori_of`: the chamber and side a link reads out
pub fn link_address(link: LinkId) -> Result<(u16, u8), LinkMapError> {
    let half_cru = half_cru_of(link)?;
    let side = half_cru % NUMBER_OF_SIDES;
    let cru = half_cru / NUMBER_OF_ENDPOINTS;
    let supermodule = cru / 2;
    let chamber =
        (cru % 2) * CHAMBERS_PER_HALF_SUPERMODULE + link % LINKS_PER_HALF_CRU;
    Ok((
        (supermodule * CHAMBERS_PER_SUPERMODULE + chamber) as u16,
        side as u8,
    ))
}

pub fn half_cru_of(link: LinkId) -> Result<usize, LinkMapError> {
    if link >= NUMBER_OF_LINKS {
        return Err(LinkMapError::InvalidLink(link));
    }
    Ok(link / LINKS_PER_HALF_CRU)
}

/// ROB holding a pad row on a given side
pub fn rob_from_pad(padrow: u8, side: u8) -> u8 {
    (padrow / MCM_ROWS_PER_ROB) * 2 + side
}

/// MCM holding a pad row / MCM column pair within its ROB
pub fn mcm_from_pad(padrow: u8, col: u8) -> u8 {
    (padrow % MCM_ROWS_PER_ROB) * MCM_COLS_PER_ROB + col
}

/// Pad row and MCM column of a chip. Inverse of `rob_from_pad` and `mcm_from_pad`.
pub fn pad_from_chip(rob: u8, mcm: u8) -> (u8, u8) {
    (
        (rob / 2) * MCM_ROWS_PER_ROB + mcm / MCM_COLS_PER_ROB,
        mcm % MCM_COLS_PER_ROB,
    )
}

/// HalfCruId identifies one of the 72 half-CRUs along with its hardware addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HalfCruId {
    pub index: usize,
    pub supermodule: u8,
    pub side: u8,
    pub endpoint: u8,
    pub cru_id: u16,
}

impl HalfCruId {
    pub fn new(index: usize) -> Result<Self, LinkMapError> {
        if index >= NUMBER_OF_HALF_CRUS {
            return Err(LinkMapError::InvalidHalfCru(index));
        }
        Ok(Self {
            index,
            supermodule: (index / (NUMBER_OF_SIDES * NUMBER_OF_ENDPOINTS)) as u8,
            side: (index % NUMBER_OF_SIDES) as u8,
            endpoint: (index % NUMBER_OF_ENDPOINTS) as u8,
            cru_id: (index / NUMBER_OF_ENDPOINTS) as u16,
        })
    }

    pub fn from_link(link: LinkId) -> Result<Self, LinkMapError> {
        Self::new(half_cru_of(link)?)
    }

    pub fn fee_id(&self) -> u16 {
        (self.supermodule as u16) << 8 | (self.side as u16) << 7 | self.endpoint as u16
    }

    pub fn side_letter(&self) -> char {
        if self.side == 0 {
            'a'
        } else {
            'c'
        }
    }

    pub fn links(&self) -> [LinkId; LINKS_PER_HALF_CRU] {
        let mut links = [0; LINKS_PER_HALF_CRU];
        for (offset, link) in links.iter_mut().enumerate() {
            *link = self.index * LINKS_PER_HALF_CRU + offset;
        }
        links
    }

    /// Name of the raw file this half-CRU is written to
    pub fn file_name(&self, format: FormatVersion) -> String {
        format!(
            "trd_cru_{}_{}_{}.raw",
            self.cru_id,
            self.side_letter(),
            format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ori_mapping() {
        assert_eq!(ori_of(0, 0).unwrap(), 0);
        assert_eq!(ori_of(0, 1).unwrap(), 15);
        assert_eq!(ori_of(14, 0).unwrap(), 14);
        assert_eq!(ori_of(15, 0).unwrap(), 30);
        assert_eq!(ori_of(30, 3).unwrap(), 75);
        assert_eq!(ori_of(539, 7).unwrap(), NUMBER_OF_LINKS - 1);
    }

    #[test]
    fn test_ori_rejects_bad_address() {
        assert_eq!(ori_of(540, 0), Err(LinkMapError::InvalidAddress(540, 0)));
        // detector 12 sits in the short stack
        assert!(ori_of(12, 5).is_ok());
        assert_eq!(ori_of(12, 6), Err(LinkMapError::InvalidAddress(12, 6)));
        assert!(ori_of(0, 7).is_ok());
        assert!(ori_of(0, 8).is_err());
    }

    #[test]
    fn test_link_address_inverts_ori() {
        for detector in 0..NUMBER_OF_CHAMBERS as u16 {
            for side in 0..2u8 {
                let link = ori_of(detector, side).unwrap();
                assert_eq!(link_address(link).unwrap(), (detector, side));
                let half_cru = half_cru_of(link).unwrap();
                assert!(link_range_for(half_cru).unwrap().contains(&link));
            }
        }
        assert!(link_address(NUMBER_OF_LINKS).is_err());
        assert!(link_range_for(NUMBER_OF_HALF_CRUS).is_err());
    }

    #[test]
    fn test_pad_helpers() {
        for rob in 0..8u8 {
            for mcm in 0..MCMS_PER_ROB {
                let (padrow, col) = pad_from_chip(rob, mcm);
                assert_eq!(rob_from_pad(padrow, rob % 2), rob);
                assert_eq!(mcm_from_pad(padrow, col), mcm);
            }
        }
        assert_eq!(pad_from_chip(0, 5), (1, 1));
    }

    #[test]
    fn test_half_cru_id() {
        let id = HalfCruId::new(15).unwrap();
        assert_eq!(id.supermodule, 3);
        assert_eq!(id.cru_id, 7);
        assert_eq!(id.endpoint, 1);
        assert_eq!(id.fee_id(), 3 << 8 | 1 << 7 | 1);
        assert_eq!(id.file_name(FormatVersion::Run3), "trd_cru_7_c_run3.raw");
        assert_eq!(id.links()[0], 225);
        assert_eq!(HalfCruId::from_link(225).unwrap(), id);
        assert!(HalfCruId::new(72).is_err());
    }
}
