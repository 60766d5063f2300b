//! System information broadcast

use enb_core::{SIRNTI, TtiPoint};

use crate::harq::get_rvidx;
use crate::phy_helper::{coderate, dl_mod_from_mcs, max_coderate};
use crate::result::{BcDci, BcGrant, DlSchedResult};
use crate::sf_grid::{CellCtx, SfGrid};

/// Broadcast-style PDSCH is restricted to QPSK
const BC_MAX_MCS: u32 = 9;

/// Smallest (nof_prb, mcs, tbs) able to carry `len` bytes in one broadcast
/// PDSCH. PRBs are grown first, the MCS is then raised within that PRB count.
pub fn bc_alloc_size(ctx: &CellCtx, tti_tx_dl: TtiPoint, len: u32) -> Option<(u32, u32, u32)> {
    for nof_prb in 1..=ctx.nof_prb() {
        let nof_re = ctx.phy.dl_nof_re(&ctx.cell.phy, ctx.args.cfi, tti_tx_dl, nof_prb);
        for mcs in 0..=BC_MAX_MCS {
            let Some(tbs) = ctx.phy.dl_tbs_bytes(mcs, nof_prb, false) else {
                continue;
            };
            if tbs < len {
                continue;
            }
            let Some(modulation) = dl_mod_from_mcs(mcs, false) else {
                continue;
            };
            if coderate(tbs, nof_re) <= max_coderate(modulation, false) {
                return Some((nof_prb, mcs, tbs));
            }
        }
    }
    None
}

/// SIB1 goes out in subframe 5 of every even radio frame
pub fn is_sib1_tti(tti_tx_dl: TtiPoint) -> bool {
    tti_tx_dl.sf_idx() == 5 && tti_tx_dl.sfn() % 2 == 0
}

/// Whether SI message `sib_idx` (1-based, 0 being SIB1) is due in `tti_tx_dl`.
/// Each SI message is sent once per period, in the first subframe of its SI
/// window that does not carry SIB1.
pub fn is_si_tti(tti_tx_dl: TtiPoint, sib_idx: u32, period_rf: u32, si_window_ms: u32) -> bool {
    if sib_idx == 0 {
        return is_sib1_tti(tti_tx_dl);
    }
    let mut target = (sib_idx - 1) * si_window_ms;
    if target % 10 == 5 && (target / 10) % 2 == 0 {
        target += 1;
    }
    (tti_tx_dl.sfn() % period_rf) * 10 + tti_tx_dl.sf_idx() == target
}

/// Allocates the SIB1/SI messages due in the DL subframe of this TTI
pub fn schedule_bc(ctx: &CellCtx, grid: &mut SfGrid, result: &mut DlSchedResult) {
    let tti_tx_dl = ctx.timing.to_tx_dl(grid.tti_rx());
    for (idx, sib) in ctx.cell.sibs.iter().enumerate() {
        let idx = idx as u32;
        if sib.len == 0 || !is_si_tti(tti_tx_dl, idx, sib.period_rf, ctx.cell.si_window_ms) {
            continue;
        }
        let Some((nof_prb, mcs, tbs)) = bc_alloc_size(ctx, tti_tx_dl, sib.len) else {
            tracing::error!("schedule_bc: SIB{} of {} bytes does not fit the carrier", idx + 1, sib.len);
            continue;
        };
        let Some(prbs) = grid.dl_mask().find_free(nof_prb) else {
            tracing::warn!("schedule_bc: no PRBs left for SIB{}", idx + 1);
            continue;
        };
        let Some(cce) = grid.alloc_dl_with_cce(&prbs, ctx.aggr_level()) else {
            tracing::warn!("schedule_bc: no CCE left for SIB{}", idx + 1);
            continue;
        };
        // SIB1 cycles its RV over the four transmissions of an 80 ms period
        let rv = if idx == 0 { get_rvidx((tti_tx_dl.sfn() / 2) % 4) } else { 0 };
        tracing::trace!("schedule_bc: SIB{} tti_tx_dl={} prbs={:?} mcs={}", idx + 1, tti_tx_dl, prbs, mcs);
        result.bc.push(BcGrant { index: idx, dci: BcDci { rnti: SIRNTI, mcs, rv, prbs, cce }, tbs });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy_helper::DefaultPhyHelper;
    use enb_config::{CellCfg, SchedArgs};
    use enb_core::HarqTiming;

    #[test]
    fn test_si_positions() {
        let sib1: Vec<u32> = (0..200).filter(|t| is_sib1_tti(TtiPoint::new(*t))).collect();
        assert_eq!(sib1, vec![5, 25, 45, 65, 85, 105, 125, 145, 165, 185]);

        // SI 1 with an 8 frame period, window starts at subframe 0
        let si: Vec<u32> = (0..200).filter(|t| is_si_tti(TtiPoint::new(*t), 1, 8, 40)).collect();
        assert_eq!(si, vec![0, 80, 160]);

        // Window start collides with SIB1 and is moved one subframe later
        let si: Vec<u32> = (0..200).filter(|t| is_si_tti(TtiPoint::new(*t), 2, 16, 5)).collect();
        assert_eq!(si, vec![6, 166]);
    }

    #[test]
    fn test_schedule_sib1() {
        let cell = CellCfg::new(25);
        let args = SchedArgs::default();
        let timing = HarqTiming::FDD;
        let phy = DefaultPhyHelper;
        let ctx = CellCtx { enb_cc_idx: 0, cell: &cell, args: &args, timing: &timing, phy: &phy };

        // tx_dl = 5
        let mut grid = SfGrid::new(TtiPoint::new(1), &cell, 20);
        let mut result = DlSchedResult::default();
        schedule_bc(&ctx, &mut grid, &mut result);
        assert_eq!(result.bc.len(), 1);
        let bc = &result.bc[0];
        assert_eq!(bc.index, 0);
        assert_eq!(bc.dci.rnti, SIRNTI);
        assert!(bc.tbs >= cell.sibs[0].len);
        assert_eq!(grid.dl_mask().nof_used(), bc.dci.prbs.len);

        // tx_dl = 6, nothing due
        let mut grid = SfGrid::new(TtiPoint::new(2), &cell, 20);
        let mut result = DlSchedResult::default();
        schedule_bc(&ctx, &mut grid, &mut result);
        assert!(result.bc.is_empty());
    }
}
