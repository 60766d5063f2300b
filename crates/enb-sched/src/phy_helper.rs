//! PHY numerology the scheduler depends on
//!
//! The scheduler only needs a handful of answers from the PHY: how many data
//! REs a grant gets, how many CCEs the control region holds and what TBS a
//! (MCS, PRB count) pair yields. These are behind the `PhyHelper` trait. The
//! bundled `DefaultPhyHelper` is a simplified model: it ignores the REs taken by
//! PSS/SSS/PBCH and approximates the TBS as linear in the PRB count.

use enb_config::PhyCellCfg;
use enb_core::{CyclicPrefix, Modulation, TtiPoint};

pub const MAX_MCS: u32 = 28;
/// Highest valid MCS when the 256QAM table is in use
pub const MAX_MCS_ALT: u32 = 27;

/// Transport block size in bits for a single PRB, indexed by I_TBS
const TBS_1PRB: [u32; 34] = [
    16, 24, 32, 40, 56, 72, 88, 104, 120, 136, 144, 176, 208, 224, 256, 280, 328, 336, 376, 408, 440, 488, 520,
    552, 584, 616, 712, 776, 808, 840, 904, 968, 1000, 1032,
];

/// Bits added to the TB for the CRC when computing the code rate
const TB_CRC_BITS: u32 = 24;

/// Maximum code rate relative to the modulation order
pub const MAX_CODERATE_FACTOR: f32 = 0.93;

/// DL modulation and TBS index for an MCS, None if the MCS is reserved
pub fn dl_mcs_to_mod_tbs_idx(mcs: u32, use_tbs_index_alt: bool) -> Option<(Modulation, u32)> {
    if use_tbs_index_alt {
        match mcs {
            0..=4 => Some((Modulation::Qpsk, 2 * mcs)),
            5..=10 => Some((Modulation::Qam16, mcs + 5)),
            11..=19 => Some((Modulation::Qam64, mcs + 5)),
            20..=27 => Some((Modulation::Qam256, mcs + 6)),
            _ => None,
        }
    } else {
        match mcs {
            0..=9 => Some((Modulation::Qpsk, mcs)),
            10..=16 => Some((Modulation::Qam16, mcs - 1)),
            17..=28 => Some((Modulation::Qam64, mcs - 2)),
            _ => None,
        }
    }
}

/// UL modulation and TBS index for an MCS, None if the MCS is reserved
pub fn ul_mcs_to_mod_tbs_idx(mcs: u32) -> Option<(Modulation, u32)> {
    match mcs {
        0..=10 => Some((Modulation::Qpsk, mcs)),
        11..=20 => Some((Modulation::Qam16, mcs - 1)),
        21..=28 => Some((Modulation::Qam64, mcs - 2)),
        _ => None,
    }
}

pub fn dl_mod_from_mcs(mcs: u32, use_tbs_index_alt: bool) -> Option<Modulation> {
    dl_mcs_to_mod_tbs_idx(mcs, use_tbs_index_alt).map(|(m, _)| m)
}

/// TBS in bytes for a TBS index and PRB count
pub fn tbs_bytes_from_idx(tbs_idx: u32, nof_prb: u32) -> Option<u32> {
    let bits_1prb = TBS_1PRB.get(tbs_idx as usize)?;
    Some(bits_1prb * nof_prb / 8)
}

/// Effective code rate of a transport block of `tbs_bytes` mapped onto `nof_re` REs
pub fn coderate(tbs_bytes: u32, nof_re: u32) -> f32 {
    if nof_re == 0 {
        return f32::INFINITY;
    }
    (tbs_bytes * 8 + TB_CRC_BITS) as f32 / nof_re as f32
}

/// Highest code rate a UE accepts for a modulation. UEs without 256QAM cap Qm at 6.
pub fn max_coderate(modulation: Modulation, use_tbs_index_alt: bool) -> f32 {
    let max_qm = if use_tbs_index_alt { 8 } else { 6 };
    MAX_CODERATE_FACTOR * modulation.bits().min(max_qm) as f32
}

/// Channel quality to DL MCS
pub fn cqi_to_mcs(cqi: u32, use_tbs_index_alt: bool) -> u32 {
    const CQI_MCS: [u32; 16] = [0, 0, 0, 2, 4, 6, 8, 11, 13, 15, 18, 20, 22, 24, 26, 28];
    const CQI_MCS_ALT: [u32; 16] = [0, 0, 0, 1, 2, 3, 5, 6, 8, 10, 12, 14, 17, 20, 23, 27];
    let cqi = cqi.min(15) as usize;
    if use_tbs_index_alt { CQI_MCS_ALT[cqi] } else { CQI_MCS[cqi] }
}

/// UL SINR estimate in dB to UL MCS
pub fn snr_to_ul_mcs(snr_db: f32) -> u32 {
    (snr_db + 4.0).clamp(0.0, MAX_MCS as f32) as u32
}

/// PHY-level numerology used by the scheduler and by the result checker
pub trait PhyHelper: Send + Sync {
    /// Number of PDSCH REs of a grant of `nof_prb` PRBs in DL subframe `tti_tx_dl`
    fn dl_nof_re(&self, cell: &PhyCellCfg, cfi: u32, tti_tx_dl: TtiPoint, nof_prb: u32) -> u32;

    /// Number of CCEs available in the control region
    fn nof_cce(&self, cell: &PhyCellCfg, cfi: u32) -> u32;

    fn dl_tbs_bytes(&self, mcs: u32, nof_prb: u32, use_tbs_index_alt: bool) -> Option<u32> {
        let (_, tbs_idx) = dl_mcs_to_mod_tbs_idx(mcs, use_tbs_index_alt)?;
        tbs_bytes_from_idx(tbs_idx, nof_prb)
    }

    fn ul_tbs_bytes(&self, mcs: u32, nof_prb: u32) -> Option<u32> {
        let (_, tbs_idx) = ul_mcs_to_mod_tbs_idx(mcs)?;
        tbs_bytes_from_idx(tbs_idx, nof_prb)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPhyHelper;

impl DefaultPhyHelper {
    /// CRS REs per PRB pair lying outside of the control region
    fn crs_re_outside_ctrl(nof_ports: u32, cfi: u32) -> u32 {
        match nof_ports {
            1 => 6,
            2 => 12,
            _ => {
                if cfi >= 2 { 16 } else { 20 }
            }
        }
    }

    /// REGs per PRB in control symbol `l`
    fn regs_in_symbol(nof_ports: u32, l: u32) -> u32 {
        match l {
            0 => 2,
            1 if nof_ports == 4 => 2,
            _ => 3,
        }
    }

    pub fn nof_phich_groups(cell: &PhyCellCfg) -> u32 {
        let ngroups = (cell.phich_resources.ng_times_6() * cell.nof_prb).div_ceil(48);
        match cell.cp {
            CyclicPrefix::Normal => ngroups,
            CyclicPrefix::Extended => 2 * ngroups,
        }
    }
}

impl PhyHelper for DefaultPhyHelper {
    fn dl_nof_re(&self, cell: &PhyCellCfg, cfi: u32, _tti_tx_dl: TtiPoint, nof_prb: u32) -> u32 {
        let nof_symbols = 2 * cell.cp.nof_symbols_slot();
        let re_per_prb = 12 * nof_symbols.saturating_sub(cfi) - Self::crs_re_outside_ctrl(cell.nof_ports, cfi);
        nof_prb * re_per_prb
    }

    fn nof_cce(&self, cell: &PhyCellCfg, cfi: u32) -> u32 {
        let regs_per_prb: u32 = (0..cfi).map(|l| Self::regs_in_symbol(cell.nof_ports, l)).sum();
        let total_regs = cell.nof_prb * regs_per_prb;
        let pcfich_regs = 4;
        let phich_regs = 3 * Self::nof_phich_groups(cell);
        total_regs.saturating_sub(pcfich_regs + phich_regs) / 9
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enb_config::CellCfg;

    #[test]
    fn test_mcs_tables() {
        assert_eq!(dl_mcs_to_mod_tbs_idx(9, false), Some((Modulation::Qpsk, 9)));
        assert_eq!(dl_mcs_to_mod_tbs_idx(10, false), Some((Modulation::Qam16, 9)));
        assert_eq!(dl_mcs_to_mod_tbs_idx(28, false), Some((Modulation::Qam64, 26)));
        assert_eq!(dl_mcs_to_mod_tbs_idx(29, false), None);
        assert_eq!(dl_mcs_to_mod_tbs_idx(27, true), Some((Modulation::Qam256, 33)));
        assert_eq!(dl_mcs_to_mod_tbs_idx(28, true), None);
        assert_eq!(ul_mcs_to_mod_tbs_idx(21), Some((Modulation::Qam64, 19)));
    }

    #[test]
    fn test_coderate_limit_lowers_top_mcs() {
        let cell = CellCfg::new(25).phy;
        let phy = DefaultPhyHelper;
        let nof_re = phy.dl_nof_re(&cell, 3, TtiPoint::new(0), 10);
        assert_eq!(nof_re, 10 * 126);

        // Top MCS of the 64QAM table does not fit with 3 control symbols
        let tbs = phy.dl_tbs_bytes(28, 10, false).unwrap();
        assert!(coderate(tbs, nof_re) > max_coderate(Modulation::Qam64, false));
        let tbs = phy.dl_tbs_bytes(27, 10, false).unwrap();
        assert!(coderate(tbs, nof_re) <= max_coderate(Modulation::Qam64, false));
    }

    #[test]
    fn test_nof_cce() {
        let phy = DefaultPhyHelper;
        assert_eq!(phy.nof_cce(&CellCfg::new(6).phy, 3), 4);
        assert_eq!(phy.nof_cce(&CellCfg::new(25).phy, 3), 20);
        assert!(phy.nof_cce(&CellCfg::new(100).phy, 1) > phy.nof_cce(&CellCfg::new(50).phy, 1));
    }
}
