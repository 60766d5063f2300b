//! PUSCH allocation and PHICH generation
//!
//! Synchronous UL HARQ: the process transmitted at `tti_rx - 8` is the one
//! whose PHICH goes out in the DL subframe of `tti_rx`, and the same process
//! is reused for the PUSCH granted at `tti_rx`.

use std::collections::BTreeMap;

use enb_core::Rnti;

use crate::dl_alloc::rotated_rntis;
use crate::harq::{UlHarqOutcome, UlHarqProc};
use crate::prb::{PrbInterval, round_down_ul_nof_prb, round_up_ul_nof_prb};
use crate::ra::RaCellSched;
use crate::result::{CceLocation, PhichElem, PhichValue, TbDci, UlDci, UlSchedData, UlSchedResult};
use crate::sf_grid::{CellCtx, SfGrid};
use crate::ue::SchedUe;

fn ul_sched_data(
    ctx: &CellCtx,
    rnti: Rnti,
    ue_cc_idx: usize,
    h: &UlHarqProc,
    cce: Option<CceLocation>,
    cqi_request: bool,
) -> UlSchedData {
    let p = h.harq();
    let prbs = p.prbs();
    UlSchedData {
        dci: UlDci {
            rnti,
            pid: p.pid(),
            ue_cc_idx: ue_cc_idx as u32,
            riv: prbs.riv(ctx.nof_prb()),
            prbs,
            tb: TbDci { enabled: true, mcs: p.mcs(), rv: p.rv(), ndi: p.ndi() },
            cce,
            cqi_request,
        },
        tbs: p.tbs(),
        needs_pdcch: cce.is_some(),
        current_tx_nb: p.nof_retxs(),
    }
}

/// Places the Msg3s promised by the RARs sent `msg3_delay` TTIs ago.
/// They are not signalled on the PDCCH.
pub fn schedule_msg3(
    ctx: &CellCtx,
    grid: &mut SfGrid,
    ra: &mut RaCellSched,
    ues: &mut BTreeMap<Rnti, SchedUe>,
    result: &mut UlSchedResult,
) {
    let tti_rx = grid.tti_rx();
    for m in ra.take_msg3(tti_rx) {
        let Some(ue) = ues.get_mut(&m.rnti) else {
            tracing::warn!("schedule_msg3: rnti=0x{:x} removed before its Msg3", m.rnti);
            continue;
        };
        let Some((ue_cc_idx, carrier)) = ue.active_carrier_mut(ctx.enb_cc_idx) else {
            tracing::warn!("schedule_msg3: rnti=0x{:x} no longer uses cc={}", m.rnti, ctx.enb_cc_idx);
            continue;
        };
        if !carrier.harq.ul_harq(tti_rx).is_empty() {
            tracing::error!("schedule_msg3: rnti=0x{:x} UL HARQ busy at Msg3 tti={}", m.rnti, tti_rx);
            continue;
        }
        if !grid.alloc_ul(&m.grant.prbs) {
            tracing::error!("schedule_msg3: rnti=0x{:x} reserved PRBs {:?} already taken", m.rnti, m.grant.prbs);
            continue;
        }
        let h = carrier.harq.ul_harq_mut(tti_rx);
        if let Err(e) = h.new_tx(tti_rx, m.grant.mcs, m.tbs, m.grant.prbs, ctx.cell.maxharq_msg3tx, true) {
            tracing::error!("schedule_msg3: rnti=0x{:x} {}", m.rnti, e);
            continue;
        }
        let data = ul_sched_data(ctx, m.rnti, ue_cc_idx, h, None, false);
        if let Some(Err(e)) = ue.ra_mut().map(|ra| ra.on_msg3_scheduled(tti_rx, ctx.timing.msg3_delay)) {
            tracing::error!("schedule_msg3: {}", e);
        }
        tracing::debug!("schedule_msg3: rnti=0x{:x} tti={} prbs={:?}", m.rnti, tti_rx, m.grant.prbs);
        result.pusch.push(data);
    }
}

/// Sends the PHICH of every UL process transmitted one round trip ago and
/// places the retransmissions that follow a NACK. A retx that cannot be
/// placed is acknowledged on the PHICH and kept paused for a later adaptive retx.
pub fn schedule_ul_harq(ctx: &CellCtx, grid: &mut SfGrid, ues: &mut BTreeMap<Rnti, SchedUe>, result: &mut UlSchedResult) {
    let tti_rx = grid.tti_rx();
    let aggr_level = ctx.aggr_level();
    for rnti in rotated_rntis(ues, tti_rx) {
        let Some(ue) = ues.get_mut(&rnti) else {
            continue;
        };
        let gap_blocked = ue.meas_gap().blocks_ul(ctx.timing, tti_rx);
        let Some((ue_cc_idx, carrier)) = ue.active_carrier_mut(ctx.enb_cc_idx) else {
            continue;
        };
        let h = carrier.harq.ul_harq_mut(tti_rx);
        // Msg3 granted earlier in this TTI shares the pid, its PHICH comes one round trip later
        if h.harq().last_tti_rx() == Some(tti_rx) {
            continue;
        }
        let phich = match h.outcome() {
            UlHarqOutcome::Idle | UlHarqOutcome::Paused => continue,
            UlHarqOutcome::Ack => {
                h.release();
                PhichValue::Ack
            }
            UlHarqOutcome::MaxTxReached => {
                tracing::info!(
                    "schedule_ul_harq: rnti=0x{:x} pid={} discarded after {} transmissions",
                    rnti,
                    h.harq().pid(),
                    h.harq().nof_txs()
                );
                h.release();
                PhichValue::Nack
            }
            UlHarqOutcome::Retx => {
                let old = h.harq().prbs();
                let (prbs, adaptive) = if ue_cc_idx == 0 && gap_blocked {
                    (None, false)
                } else if grid.ul_mask().is_free(&old) {
                    (Some(old), false)
                } else {
                    let other = grid.ul_mask().find_free_where(old.len, |iv| iv.start != old.start);
                    (other.filter(|p| grid.can_alloc_ul(p, aggr_level)), true)
                };
                match prbs.map(|p| h.new_retx(tti_rx, ctx.timing, p).map(|_| p)) {
                    Some(Ok(prbs)) => {
                        let cce = if adaptive {
                            grid.alloc_ul_with_cce(&prbs, aggr_level)
                        } else {
                            grid.alloc_ul(&prbs);
                            None
                        };
                        tracing::debug!(
                            "schedule_ul_harq: rnti=0x{:x} pid={} {} retx prbs={:?} rv={}",
                            rnti,
                            h.harq().pid(),
                            if adaptive { "adaptive" } else { "non-adaptive" },
                            prbs,
                            h.harq().rv()
                        );
                        result.pusch.push(ul_sched_data(ctx, rnti, ue_cc_idx, h, cce, false));
                        PhichValue::Nack
                    }
                    other => {
                        if let Some(Err(e)) = other {
                            enb_core::assert_warn!(false, "rnti=0x{:x} ul retx rejected: {}", rnti, e);
                        }
                        tracing::debug!("schedule_ul_harq: rnti=0x{:x} pid={} retx paused", rnti, h.harq().pid());
                        h.pause();
                        PhichValue::Ack
                    }
                }
            }
        };
        result.phich.push(PhichElem { rnti, phich });
    }
}

/// Adaptive retransmission of paused UL processes, any free block of the original length
pub fn schedule_ul_resumes(ctx: &CellCtx, grid: &mut SfGrid, ues: &mut BTreeMap<Rnti, SchedUe>, result: &mut UlSchedResult) {
    let tti_rx = grid.tti_rx();
    let aggr_level = ctx.aggr_level();
    for rnti in rotated_rntis(ues, tti_rx) {
        let Some(ue) = ues.get_mut(&rnti) else {
            continue;
        };
        let gap_blocked = ue.meas_gap().blocks_ul(ctx.timing, tti_rx);
        let Some((ue_cc_idx, carrier)) = ue.active_carrier_mut(ctx.enb_cc_idx) else {
            continue;
        };
        let h = carrier.harq.ul_harq_mut(tti_rx);
        if !h.is_paused() || (ue_cc_idx == 0 && gap_blocked) {
            continue;
        }
        let len = h.harq().prbs().len;
        let Some(prbs) = grid.ul_mask().find_free(len).filter(|p| grid.can_alloc_ul(p, aggr_level)) else {
            continue;
        };
        if let Err(e) = h.resume(tti_rx, ctx.timing, prbs) {
            enb_core::assert_warn!(false, "rnti=0x{:x} ul resume rejected: {}", rnti, e);
            continue;
        }
        let cce = grid.alloc_ul_with_cce(&prbs, aggr_level);
        tracing::debug!("schedule_ul_resumes: rnti=0x{:x} pid={} prbs={:?}", rnti, h.harq().pid(), prbs);
        result.pusch.push(ul_sched_data(ctx, rnti, ue_cc_idx, h, cce, false));
    }
}

/// PRB count for a new PUSCH carrying `pending` bytes, at most `max_nof_prb`
pub fn select_ul_nof_prb(ctx: &CellCtx, mcs: u32, pending: u32, max_nof_prb: u32) -> u32 {
    let n = (1..=max_nof_prb)
        .find(|n| ctx.phy.ul_tbs_bytes(mcs, *n).is_some_and(|tbs| tbs >= pending))
        .unwrap_or(max_nof_prb);
    let n = round_up_ul_nof_prb(n);
    if n > max_nof_prb { round_down_ul_nof_prb(max_nof_prb) } else { n }
}

/// New UL grants for connected UEs with data reported through BSR or SR
pub fn schedule_ul_newtxs(ctx: &CellCtx, grid: &mut SfGrid, ues: &mut BTreeMap<Rnti, SchedUe>, result: &mut UlSchedResult) {
    let tti_rx = grid.tti_rx();
    let aggr_level = ctx.aggr_level();
    for rnti in rotated_rntis(ues, tti_rx) {
        if !grid.pdcch().has_space(aggr_level) {
            break;
        }
        let Some(ue) = ues.get_mut(&rnti) else {
            continue;
        };
        if !ue.ul_newtx_allowed(tti_rx) {
            continue;
        }
        let pending = ue.pending_ul_bytes();
        if pending == 0 {
            continue;
        }
        let Some(ue_cc_idx) = ue.ue_cc_idx(ctx.enb_cc_idx) else {
            continue;
        };
        if ue.ul_blocked_by_gap(ue_cc_idx, ctx.timing, tti_rx) {
            continue;
        }
        let Some(carrier) = ue.carrier(ue_cc_idx) else {
            continue;
        };
        if !carrier.is_active() || !carrier.harq.ul_harq(tti_rx).is_empty() {
            continue;
        }

        let Some(free) = grid.ul_mask().largest_free() else {
            break;
        };
        let max_nof_prb = match ctx.args.max_nof_prb_per_ue {
            0 => free.len,
            n => free.len.min(n),
        };
        let mcs = ue.ul_mcs(ue_cc_idx, ctx.args);
        let nof_prb = select_ul_nof_prb(ctx, mcs, pending, max_nof_prb);
        let Some(tbs) = ctx.phy.ul_tbs_bytes(mcs, nof_prb).filter(|tbs| *tbs > 0) else {
            continue;
        };
        let prbs = PrbInterval::new(free.start, nof_prb);
        let Some(cce) = grid.alloc_ul_with_cce(&prbs, aggr_level) else {
            continue;
        };

        let max_tx = ue.cfg().maxharq_tx;
        let cqi_request = ue_cc_idx == 0 && ue.take_cqi_request(ue_cc_idx, tti_rx);
        ue.consume_ul(tbs);
        let Some(carrier) = ue.carrier_mut(ue_cc_idx) else {
            continue;
        };
        let h = carrier.harq.ul_harq_mut(tti_rx);
        if let Err(e) = h.new_tx(tti_rx, mcs, tbs, prbs, max_tx, false) {
            tracing::error!("schedule_ul_newtxs: rnti=0x{:x} {}", rnti, e);
            continue;
        }
        tracing::debug!(
            "schedule_ul_newtxs: rnti=0x{:x} cc={} pid={} prbs={:?} mcs={} tbs={}",
            rnti,
            ctx.enb_cc_idx,
            h.harq().pid(),
            prbs,
            mcs,
            tbs
        );
        result.pusch.push(ul_sched_data(ctx, rnti, ue_cc_idx, h, Some(cce), cqi_request));
    }
}
