//! PDSCH allocation for UE data: HARQ retransmissions first, then new transport blocks

use std::collections::BTreeMap;

use enb_core::{DciFormat, Rnti, TtiPoint};

use crate::phy_helper::{coderate, dl_mod_from_mcs, max_coderate};
use crate::prb::PrbInterval;
use crate::result::{CceLocation, DlDci, DlSchedData, DlSchedResult, TbDci};
use crate::sf_grid::{CellCtx, SfGrid};
use crate::ue::SchedUe;

/// Smallest TB worth sending, one subheader and one payload byte
const MIN_DL_TBS: u32 = 3;
/// A Msg4 must at least carry the contention resolution CE
const MIN_MSG4_TBS: u32 = 7;

/// RNTIs in scheduling order: ascending, starting at an offset that rotates every TTI
pub fn rotated_rntis(ues: &BTreeMap<Rnti, SchedUe>, tti_rx: TtiPoint) -> Vec<Rnti> {
    let mut rntis: Vec<Rnti> = ues.keys().copied().collect();
    if !rntis.is_empty() {
        let start = tti_rx.to_uint() as usize % rntis.len();
        rntis.rotate_left(start);
    }
    rntis
}

fn dl_dci(rnti: Rnti, format: DciFormat, pid: u32, ue_cc_idx: usize, tb0: TbDci, prbs: PrbInterval, cce: CceLocation) -> DlDci {
    DlDci { rnti, format, pid, ue_cc_idx: ue_cc_idx as u32, tb: [tb0, TbDci::default()], prbs, cce }
}

/// Retransmits the DL HARQ processes that got a NACK, same MCS and PRB count.
/// The old PRBs are reused when free.
pub fn schedule_dl_retxs(ctx: &CellCtx, grid: &mut SfGrid, ues: &mut BTreeMap<Rnti, SchedUe>, result: &mut DlSchedResult) {
    let tti_rx = grid.tti_rx();
    for rnti in rotated_rntis(ues, tti_rx) {
        let Some(ue) = ues.get_mut(&rnti) else {
            continue;
        };
        let gap_blocked = ue.meas_gap().blocks_dl(ctx.timing, tti_rx);
        let Some((ue_cc_idx, carrier)) = ue.active_carrier_mut(ctx.enb_cc_idx) else {
            continue;
        };
        let h = carrier.harq.dl_harq_for_tx(tti_rx);
        if !h.is_pending_retx() {
            continue;
        }
        if ue_cc_idx == 0 && gap_blocked {
            tracing::debug!("schedule_dl_retxs: rnti=0x{:x} pid={} retx postponed by measurement gap", rnti, h.harq().pid());
            continue;
        }

        let old = h.harq().prbs();
        let prbs = if grid.dl_mask().is_free(&old) { Some(old) } else { grid.dl_mask().find_free(old.len) };
        let Some(prbs) = prbs.filter(|p| grid.can_alloc_dl(p, ctx.aggr_level())) else {
            tracing::debug!("schedule_dl_retxs: rnti=0x{:x} pid={} no room for retx", rnti, h.harq().pid());
            continue;
        };
        if let Err(e) = h.new_retx(tti_rx, ctx.timing, prbs) {
            enb_core::assert_warn!(false, "rnti=0x{:x} dl retx rejected: {}", rnti, e);
            continue;
        }
        let Some(cce) = grid.alloc_dl_with_cce(&prbs, ctx.aggr_level()) else {
            continue;
        };

        let p = h.harq();
        let tb0 = TbDci { enabled: true, mcs: p.mcs(), rv: p.rv(), ndi: p.ndi() };
        tracing::debug!(
            "schedule_dl_retxs: rnti=0x{:x} cc={} pid={} rv={} prbs={:?} tbs={}",
            rnti,
            ctx.enb_cc_idx,
            p.pid(),
            p.rv(),
            prbs,
            p.tbs()
        );
        result.data.push(DlSchedData {
            dci: dl_dci(rnti, h.dci_format(), p.pid(), ue_cc_idx, tb0, prbs, cce),
            tbs: [p.tbs(), 0],
            pdus: [h.pdus().to_vec(), Vec::new()],
        });
    }
}

/// Picks PRB count and MCS for a new TB of `required` bytes. Starts with the
/// fewest PRBs that fit the data at `max_mcs`, then lowers the MCS until the
/// code rate is acceptable, adding PRBs while the TB is below `min_tbs`.
pub fn select_dl_mcs_nof_prb(
    ctx: &CellCtx,
    tti_tx_dl: TtiPoint,
    required: u32,
    min_tbs: u32,
    max_nof_prb: u32,
    max_mcs: u32,
    use_tbs_index_alt: bool,
) -> Option<(u32, u32, u32)> {
    let fits = |n: u32| ctx.phy.dl_tbs_bytes(max_mcs, n, use_tbs_index_alt).is_some_and(|tbs| tbs >= required);
    let first = (1..=max_nof_prb).find(|n| fits(*n)).unwrap_or(max_nof_prb);

    for nof_prb in first..=max_nof_prb {
        let nof_re = ctx.phy.dl_nof_re(&ctx.cell.phy, ctx.args.cfi, tti_tx_dl, nof_prb);
        let best = (0..=max_mcs).rev().find_map(|mcs| {
            let tbs = ctx.phy.dl_tbs_bytes(mcs, nof_prb, use_tbs_index_alt)?;
            let modulation = dl_mod_from_mcs(mcs, use_tbs_index_alt)?;
            (coderate(tbs, nof_re) <= max_coderate(modulation, use_tbs_index_alt)).then_some((mcs, tbs))
        });
        if let Some((mcs, tbs)) = best {
            if tbs >= min_tbs {
                return Some((nof_prb, mcs, tbs));
            }
        }
    }
    None
}

/// New DL transmissions. A UE whose Msg3 was decoded gets its Msg4 here,
/// carrying the contention resolution CE in a Format1A grant.
pub fn schedule_dl_newtxs(ctx: &CellCtx, grid: &mut SfGrid, ues: &mut BTreeMap<Rnti, SchedUe>, result: &mut DlSchedResult) {
    let tti_rx = grid.tti_rx();
    let tti_tx_dl = ctx.timing.to_tx_dl(tti_rx);
    for rnti in rotated_rntis(ues, tti_rx) {
        if !grid.pdcch().has_space(ctx.aggr_level()) {
            tracing::trace!("schedule_dl_newtxs: PDCCH full at tti={}", tti_rx);
            break;
        }
        let Some(ue) = ues.get_mut(&rnti) else {
            continue;
        };
        let Some(ue_cc_idx) = ue.ue_cc_idx(ctx.enb_cc_idx) else {
            continue;
        };
        if !ue.carrier(ue_cc_idx).is_some_and(|c| c.is_active()) || !ue.dl_allowed(ue_cc_idx) {
            continue;
        }
        if ue.dl_blocked_by_gap(ue_cc_idx, ctx.timing, tti_rx) {
            continue;
        }
        let conres = ue_cc_idx == 0 && ue.is_conres_pending();
        let required = ue.required_dl_bytes(conres);
        if required == 0 {
            continue;
        }
        let Some(carrier) = ue.carrier_mut(ue_cc_idx) else {
            continue;
        };
        if carrier.harq.dl_harq_for_tx(tti_rx).harq().is_active() {
            continue;
        }

        let Some(free) = grid.dl_mask().largest_free() else {
            break;
        };
        let max_nof_prb = match ctx.args.max_nof_prb_per_ue {
            0 => free.len,
            n => free.len.min(n),
        };
        let alt = ue.cfg().use_tbs_index_alt;
        let max_mcs = ue.dl_mcs(ue_cc_idx, ctx.args);
        let min_tbs = if conres { MIN_MSG4_TBS } else { MIN_DL_TBS };
        let Some((nof_prb, mcs, tbs)) =
            select_dl_mcs_nof_prb(ctx, tti_tx_dl, required, min_tbs, max_nof_prb, max_mcs, alt)
        else {
            tracing::debug!("schedule_dl_newtxs: rnti=0x{:x} no MCS/PRB combination fits", rnti);
            continue;
        };
        let prbs = PrbInterval::new(free.start, nof_prb);
        let Some(cce) = grid.alloc_dl_with_cce(&prbs, ctx.aggr_level()) else {
            continue;
        };

        let pdus = ue.plan_dl_pdus(tbs, conres);
        let format = if conres { DciFormat::Format1A } else { ue.cfg().dl_tm.dl_dci_format() };
        let max_tx = ue.cfg().maxharq_tx;
        let Some(carrier) = ue.carrier_mut(ue_cc_idx) else {
            continue;
        };
        let h = carrier.harq.dl_harq_mut(tti_rx);
        if let Err(e) = h.new_tx(tti_rx, mcs, tbs, prbs, max_tx, format, pdus.clone()) {
            tracing::error!("schedule_dl_newtxs: rnti=0x{:x} {}", rnti, e);
            continue;
        }
        let (pid, rv, ndi) = (h.harq().pid(), h.harq().rv(), h.harq().ndi());

        // Buffers and RA state only move once the TB owns a HARQ process
        ue.consume_dl_pdus(&pdus);
        if conres {
            if let Some(Err(e)) = ue.ra_mut().map(|ra| ra.on_msg4_scheduled(tti_rx)) {
                tracing::error!("schedule_dl_newtxs: {}", e);
            }
        }

        let tb0 = TbDci { enabled: true, mcs, rv, ndi };
        tracing::debug!(
            "schedule_dl_newtxs: rnti=0x{:x} cc={} pid={} prbs={:?} mcs={} tbs={}{}",
            rnti,
            ctx.enb_cc_idx,
            pid,
            prbs,
            mcs,
            tbs,
            if conres { " (Msg4)" } else { "" }
        );
        result.data.push(DlSchedData {
            dci: dl_dci(rnti, format, pid, ue_cc_idx, tb0, prbs, cce),
            tbs: [tbs, 0],
            pdus: [pdus, Vec::new()],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy_helper::{DefaultPhyHelper, PhyHelper};
    use crate::ra::RachInfo;
    use crate::result::RarUlGrant;
    use enb_config::{CellCfg, SchedArgs};
    use enb_core::{CONRES_CE_LCID, HarqTiming};

    /// UE whose Msg3 was just decoded, with 20 bytes queued on SRB0
    fn msg3_decoded_ue(cells: &[CellCfg]) -> SchedUe {
        let mut ue = SchedUe::new(0x46, Default::default(), cells, HarqTiming::FDD);
        let rach = RachInfo { prach_tti: TtiPoint::new(0), preamble_idx: 1, temp_crnti: 0x46, msg3_size: 7 };
        ue.start_ra(rach, 0).unwrap();
        let ra = ue.ra_mut().unwrap();
        let grant = RarUlGrant { riv: 0, mcs: 0, prbs: PrbInterval::new(2, 3) };
        ra.on_rar_scheduled(TtiPoint::new(2), grant).unwrap();
        ra.on_msg3_scheduled(TtiPoint::new(4), HarqTiming::FDD.msg3_delay).unwrap();
        ra.on_msg3_decoded().unwrap();
        ue.dl_buffer_state(0, 20, 0);
        ue
    }

    #[test]
    fn test_rotated_order() {
        let cells = vec![CellCfg::new(25)];
        let mut ues = BTreeMap::new();
        for rnti in [0x48, 0x46, 0x47] {
            ues.insert(rnti, SchedUe::new(rnti, Default::default(), &cells, HarqTiming::FDD));
        }
        assert_eq!(rotated_rntis(&ues, TtiPoint::new(0)), vec![0x46, 0x47, 0x48]);
        assert_eq!(rotated_rntis(&ues, TtiPoint::new(4)), vec![0x47, 0x48, 0x46]);
    }

    #[test]
    fn test_mcs_nof_prb_selection() {
        let cell = CellCfg::new(25);
        let args = SchedArgs::default();
        let timing = HarqTiming::FDD;
        let phy = DefaultPhyHelper;
        let ctx = CellCtx { enb_cc_idx: 0, cell: &cell, args: &args, timing: &timing, phy: &phy };
        let tti = TtiPoint::new(4);

        // Few bytes fit in one PRB at a low MCS
        let (n, mcs, tbs) = select_dl_mcs_nof_prb(&ctx, tti, 10, 3, 25, 9, false).unwrap();
        assert_eq!((n, mcs), (1, 9));
        assert_eq!(tbs, 17);

        // Top MCS gets lowered to meet the code rate
        let (n, mcs, tbs) = select_dl_mcs_nof_prb(&ctx, tti, 10_000, 3, 10, 28, false).unwrap();
        assert_eq!(n, 10);
        assert!(mcs < 28);
        let nof_re = phy.dl_nof_re(&cell.phy, args.cfi, tti, n);
        assert!(coderate(tbs, nof_re) <= max_coderate(dl_mod_from_mcs(mcs, false).unwrap(), false));

        // Nothing fits a Msg4 in zero PRBs
        assert!(select_dl_mcs_nof_prb(&ctx, tti, 10, 7, 0, 9, false).is_none());
    }

    #[test]
    fn test_msg4_not_consumed_without_harq() {
        enb_core::debug::setup_logging_verbose();
        let cell = CellCfg::new(25);
        let cells = vec![cell.clone()];
        let args = SchedArgs::default();
        let timing = HarqTiming::FDD;
        let phy = DefaultPhyHelper;
        let ctx = CellCtx { enb_cc_idx: 0, cell: &cell, args: &args, timing: &timing, phy: &phy };
        let nof_cce = phy.nof_cce(&cell.phy, args.cfi);
        let tti = TtiPoint::new(12);

        let mut ues = BTreeMap::new();
        ues.insert(0x46, msg3_decoded_ue(&cells));

        // The pid of this TTI still carries a TB awaiting its ACK
        let h = ues.get_mut(&0x46).unwrap().carrier_mut(0).unwrap().harq.dl_harq_mut(tti);
        h.new_tx(tti, 9, 17, PrbInterval::new(0, 1), 4, DciFormat::Format1, Vec::new()).unwrap();

        let mut grid = SfGrid::new(tti, &cell, nof_cce);
        let mut result = DlSchedResult::default();
        schedule_dl_newtxs(&ctx, &mut grid, &mut ues, &mut result);
        assert!(result.data.is_empty());
        let ue = &ues[&0x46];
        assert_eq!(ue.dl_buffer(0), 20);
        assert!(ue.is_conres_pending());

        // Once the process is free the Msg4 goes out with the CE and the SRB0 bytes
        let h = ues.get_mut(&0x46).unwrap().carrier_mut(0).unwrap().harq.dl_harq_mut(tti);
        assert!(h.set_ack(true).unwrap());
        let mut grid = SfGrid::new(tti, &cell, nof_cce);
        schedule_dl_newtxs(&ctx, &mut grid, &mut ues, &mut result);
        assert_eq!(result.data.len(), 1);
        let msg4 = &result.data[0];
        assert_eq!(msg4.dci.format, DciFormat::Format1A);
        assert_eq!(msg4.pdus[0][0].lcid, CONRES_CE_LCID);
        let ue = &ues[&0x46];
        let sent: u32 = msg4.pdus[0].iter().filter(|p| p.lcid == 0).map(|p| p.nbytes).sum();
        assert_eq!(ue.dl_buffer(0), 20 - sent);
        assert!(ue.is_connected());
    }
}
