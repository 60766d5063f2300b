//! Verification oracle for scheduler results
//!
//! Every function compares one `SfSchedResult` against the simulated
//! contexts as they were before that TTI, and returns the first rule
//! that is broken.

use core::fmt;

use enb_core::{CONRES_CE_LCID, DciFormat, Rnti, TtiInterval, TtiPoint, ra_rnti};

use crate::harq::get_rvidx;
use crate::meas_gap::MeasGap;
use crate::phy_helper::{PhyHelper, coderate, dl_mod_from_mcs, max_coderate};
use crate::prb::{PrbInterval, is_valid_ul_nof_prb};
use crate::ra::RAR_WINDOW_OFFSET;
use crate::result::{CceLocation, PhichValue, SfSchedResult};
use crate::testing::sim_ue::SimEnbCtxt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCategory {
    Dl,
    Ul,
    Ra,
    MeasGap,
    Resources,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckError {
    pub category: CheckCategory,
    pub tti_rx: TtiPoint,
    pub enb_cc_idx: u32,
    pub rnti: Option<Rnti>,
    pub reason: String,
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] tti_rx={} cc={}", self.category, self.tti_rx, self.enb_cc_idx)?;
        if let Some(rnti) = self.rnti {
            write!(f, " rnti=0x{:x}", rnti)?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl std::error::Error for CheckError {}

/// Where a rule is being checked, used to build the error
#[derive(Clone, Copy)]
struct Scope {
    category: CheckCategory,
    tti_rx: TtiPoint,
    enb_cc_idx: u32,
}

impl Scope {
    fn new(category: CheckCategory, tti_rx: TtiPoint, enb_cc_idx: usize) -> Self {
        Scope { category, tti_rx, enb_cc_idx: enb_cc_idx as u32 }
    }

    fn err(&self, rnti: Option<Rnti>, reason: String) -> CheckError {
        CheckError { category: self.category, tti_rx: self.tti_rx, enb_cc_idx: self.enb_cc_idx, rnti, reason }
    }

    fn ensure<F: FnOnce() -> String>(&self, cond: bool, rnti: Rnti, reason: F) -> Result<(), CheckError> {
        if cond { Ok(()) } else { Err(self.err(Some(rnti), reason())) }
    }
}

/// PDSCH grants: carrier ownership, synchronous pid, RV sequence, TBS kept
/// across retransmissions, code rate of new transmissions.
pub fn test_dl_sched_result(enb: &SimEnbCtxt, phy: &dyn PhyHelper, result: &SfSchedResult) -> Result<(), CheckError> {
    let tti_rx = result.tti_rx;
    let tti_tx_dl = enb.timing.to_tx_dl(tti_rx);
    let expected_pid = enb.timing.harq_pid(tti_tx_dl);

    for (cc, dl) in result.dl_cc_result.iter().enumerate() {
        let scope = Scope::new(CheckCategory::Dl, tti_rx, cc);
        let Some(cell) = enb.cells.get(cc) else {
            return Err(scope.err(None, "result for unknown carrier".to_string()));
        };
        for (i, data) in dl.data.iter().enumerate() {
            let rnti = data.dci.rnti;
            scope.ensure(dl.data[..i].iter().all(|d| d.dci.rnti != rnti), rnti, || "two PDSCH on one carrier".into())?;
            let ue = enb.ues.get(&rnti).ok_or_else(|| scope.err(Some(rnti), "PDSCH for unknown rnti".into()))?;
            let ue_cc_idx = ue
                .ue_cc_idx(cc as u32)
                .ok_or_else(|| scope.err(Some(rnti), "PDSCH on a carrier the UE does not use".into()))?;
            let sim_cc = &ue.cc_list[ue_cc_idx];
            scope.ensure(sim_cc.active, rnti, || "PDSCH on an inactive carrier".into())?;
            scope.ensure(data.dci.ue_cc_idx as usize == ue_cc_idx, rnti, || {
                format!("DCI ue_cc_idx={} expected {}", data.dci.ue_cc_idx, ue_cc_idx)
            })?;
            scope.ensure(data.dci.pid == expected_pid, rnti, || {
                format!("pid={} but tti_tx_dl={} maps to pid={}", data.dci.pid, tti_tx_dl, expected_pid)
            })?;

            let tb = data.dci.tb[0];
            scope.ensure(tb.enabled && !data.dci.tb[1].enabled, rnti, || "exactly TB0 must be enabled".into())?;
            scope.ensure(data.tbs[0] > 0, rnti, || "empty TB".into())?;
            let h = &sim_cc.dl_harq[data.dci.pid as usize];
            let is_newtx = h.nof_txs == 0 || tb.ndi != h.ndi;

            if is_newtx {
                scope.ensure(tb.rv == 0, rnti, || format!("new tx with rv={}", tb.rv))?;
                scope.ensure(!h.active, rnti, || format!("new tx on pid={} still waiting for feedback", data.dci.pid))?;
                let alt = ue.ue_cfg.use_tbs_index_alt;
                let expected_tbs = phy.dl_tbs_bytes(tb.mcs, data.dci.prbs.len, alt);
                scope.ensure(expected_tbs == Some(data.tbs[0]), rnti, || {
                    format!("tbs={} does not match mcs={} over {} PRBs", data.tbs[0], tb.mcs, data.dci.prbs.len)
                })?;
                let modulation = dl_mod_from_mcs(tb.mcs, alt)
                    .ok_or_else(|| scope.err(Some(rnti), format!("invalid mcs={}", tb.mcs)))?;
                let nof_re = phy.dl_nof_re(&cell.phy, dl.cfi, tti_tx_dl, data.dci.prbs.len);
                let rate = coderate(data.tbs[0], nof_re);
                scope.ensure(rate <= max_coderate(modulation, alt), rnti, || {
                    format!("code rate {:.3} above the limit of {:?}", rate, modulation)
                })?;
            } else {
                scope.ensure(h.active, rnti, || format!("retx of inactive pid={}", data.dci.pid))?;
                let expected_rv = get_rvidx(h.nof_retxs + 1);
                scope.ensure(tb.rv == expected_rv, rnti, || format!("retx with rv={} expected {}", tb.rv, expected_rv))?;
                scope.ensure(h.nof_retxs + 1 < ue.ue_cfg.maxharq_tx, rnti, || {
                    format!("retx beyond maxharq_tx={}", ue.ue_cfg.maxharq_tx)
                })?;
                scope.ensure(h.last_tti_rx.is_some_and(|last| enb.timing.to_tx_dl_ack(last) <= tti_rx), rnti, || {
                    "retx before the HARQ feedback was due".into()
                })?;
                scope.ensure(data.tbs[0] == h.tbs, rnti, || format!("retx tbs={} differs from {}", data.tbs[0], h.tbs))?;
            }

            let payload: u32 = data.pdus[0].iter().map(|p| p.nbytes + 1).sum();
            scope.ensure(payload <= data.tbs[0], rnti, || format!("{} bytes of PDUs in a TB of {}", payload, data.tbs[0]))?;
        }
    }
    Ok(())
}

/// PUSCH grants and PHICH: PHICH present exactly for active processes,
/// new tx only on finished processes, retx keeps TBS and follows the RV
/// sequence, non-adaptive retx reuses the PRBs and adaptive retx moves them.
pub fn test_ul_sched_result(enb: &SimEnbCtxt, phy: &dyn PhyHelper, result: &SfSchedResult) -> Result<(), CheckError> {
    let tti_rx = result.tti_rx;
    let pid = enb.timing.harq_pid(enb.timing.to_tx_ul(tti_rx));

    for (cc, ul) in result.ul_cc_result.iter().enumerate() {
        let scope = Scope::new(CheckCategory::Ul, tti_rx, cc);
        let Some(cell) = enb.cells.get(cc) else {
            return Err(scope.err(None, "result for unknown carrier".to_string()));
        };
        let nof_prb = cell.phy.nof_prb;

        for phich in &ul.phich {
            let ue = enb.ues.get(&phich.rnti).ok_or_else(|| scope.err(Some(phich.rnti), "PHICH for unknown rnti".into()))?;
            scope.ensure(ue.ue_cc_idx(cc as u32).is_some(), phich.rnti, || "PHICH on a carrier the UE does not use".into())?;
        }
        for (rnti, ue) in &enb.ues {
            let Some(ue_cc_idx) = ue.ue_cc_idx(cc as u32) else {
                continue;
            };
            let sim_cc = &ue.cc_list[ue_cc_idx];
            if !sim_cc.active {
                continue;
            }
            let h = &sim_cc.ul_harq[pid as usize];
            let nof_phich = ul.phich.iter().filter(|p| p.rnti == *rnti).count();
            scope.ensure(nof_phich <= 1, *rnti, || "more than one PHICH".into())?;
            scope.ensure((nof_phich == 1) == h.active, *rnti, || {
                format!("PHICH present={} but UL pid={} active={}", nof_phich == 1, pid, h.active)
            })?;
        }

        for (i, pusch) in ul.pusch.iter().enumerate() {
            let rnti = pusch.dci.rnti;
            scope.ensure(ul.pusch[..i].iter().all(|p| p.dci.rnti != rnti), rnti, || "two PUSCH on one carrier".into())?;
            let ue = enb.ues.get(&rnti).ok_or_else(|| scope.err(Some(rnti), "PUSCH for unknown rnti".into()))?;
            let ue_cc_idx = ue
                .ue_cc_idx(cc as u32)
                .ok_or_else(|| scope.err(Some(rnti), "PUSCH on a carrier the UE does not use".into()))?;
            let sim_cc = &ue.cc_list[ue_cc_idx];
            scope.ensure(sim_cc.active, rnti, || "PUSCH on an inactive carrier".into())?;
            scope.ensure(pusch.dci.ue_cc_idx as usize == ue_cc_idx, rnti, || {
                format!("DCI ue_cc_idx={} expected {}", pusch.dci.ue_cc_idx, ue_cc_idx)
            })?;
            scope.ensure(pusch.dci.pid == pid, rnti, || format!("pid={} expected {}", pusch.dci.pid, pid))?;
            scope.ensure(pusch.dci.riv == pusch.dci.prbs.riv(nof_prb), rnti, || "RIV does not match the PRBs".into())?;
            scope.ensure(is_valid_ul_nof_prb(pusch.dci.prbs.len), rnti, || {
                format!("{} PRBs is not a valid PUSCH size", pusch.dci.prbs.len)
            })?;
            scope.ensure(pusch.needs_pdcch == pusch.dci.cce.is_some(), rnti, || "needs_pdcch and CCE disagree".into())?;

            let tb = pusch.dci.tb;
            let h = &sim_cc.ul_harq[pid as usize];
            let phich = result.find_phich(cc, rnti).map(|p| p.phich);
            let last_retx = h.nof_retxs + 1 >= enb.ul_max_tx(ue, h);
            let h_inactive = !h.active || phich == Some(PhichValue::Ack) || last_retx;

            if pusch.current_tx_nb == 0 {
                scope.ensure(tb.rv == 0, rnti, || format!("new tx with rv={}", tb.rv))?;
                scope.ensure(h_inactive, rnti, || format!("new tx on pid={} with a pending retx", pid))?;
                let expected_tbs = phy.ul_tbs_bytes(tb.mcs, pusch.dci.prbs.len);
                scope.ensure(expected_tbs == Some(pusch.tbs), rnti, || {
                    format!("tbs={} does not match mcs={} over {} PRBs", pusch.tbs, tb.mcs, pusch.dci.prbs.len)
                })?;
            } else {
                scope.ensure(h.nof_txs > 0, rnti, || "retx of a process never transmitted".into())?;
                scope.ensure(pusch.current_tx_nb == h.nof_retxs + 1, rnti, || {
                    format!("current_tx_nb={} expected {}", pusch.current_tx_nb, h.nof_retxs + 1)
                })?;
                scope.ensure(!last_retx, rnti, || format!("retx beyond max_tx={}", enb.ul_max_tx(ue, h)))?;
                let expected_rv = get_rvidx(pusch.current_tx_nb);
                scope.ensure(tb.rv == expected_rv, rnti, || format!("retx with rv={} expected {}", tb.rv, expected_rv))?;
                scope.ensure(pusch.tbs == h.tbs, rnti, || format!("retx tbs={} differs from {}", pusch.tbs, h.tbs))?;
                scope.ensure(h.last_tti_rx.is_some_and(|last| enb.timing.to_tx_ul(last) <= tti_rx), rnti, || {
                    "retx before the CRC of the previous tx".into()
                })?;
                if h.active {
                    scope.ensure(phich == Some(PhichValue::Nack), rnti, || "retx without a NACK on PHICH".into())?;
                    if pusch.needs_pdcch {
                        scope.ensure(pusch.dci.riv != h.riv, rnti, || "adaptive retx on the same PRBs".into())?;
                    } else {
                        scope.ensure(pusch.dci.riv == h.riv, rnti, || "non-adaptive retx moved the PRBs".into())?;
                    }
                } else {
                    scope.ensure(pusch.needs_pdcch, rnti, || "resumed retx without a DCI".into())?;
                }
            }
        }

        // A NACK without retransmission is only allowed when the process ends
        for phich in ul.phich.iter().filter(|p| p.phich == PhichValue::Nack) {
            if result.find_pusch(cc, phich.rnti).is_some() {
                continue;
            }
            let Some(ue) = enb.ues.get(&phich.rnti) else {
                continue;
            };
            let Some(ue_cc_idx) = ue.ue_cc_idx(cc as u32) else {
                continue;
            };
            let h = &ue.cc_list[ue_cc_idx].ul_harq[pid as usize];
            scope.ensure(h.nof_retxs + 1 >= enb.ul_max_tx(ue, h), phich.rnti, || "NACK without retx on a live process".into())?;
        }
    }
    Ok(())
}

/// Random access ordering: no grant before RACH, one RAR inside the
/// window, Msg3 exactly `msg3_delay` after the RAR, ConRes only in Msg4.
pub fn test_ra(enb: &SimEnbCtxt, result: &SfSchedResult) -> Result<(), CheckError> {
    let tti_rx = result.tti_rx;
    let tti_tx_dl = enb.timing.to_tx_dl(tti_rx);
    let nof_procs = enb.timing.nof_harq_procs() as i32;

    for (cc, dl) in result.dl_cc_result.iter().enumerate() {
        let scope = Scope::new(CheckCategory::Ra, tti_rx, cc);
        let Some(cell) = enb.cells.get(cc) else {
            continue;
        };
        for rar in &dl.rar {
            if rar.msg3_grant.is_empty() {
                return Err(scope.err(None, format!("RAR 0x{:x} without Msg3 grant", rar.ra_rnti)));
            }
            for g in &rar.msg3_grant {
                let rnti = g.data.temp_crnti;
                let ue = enb.ues.get(&rnti).ok_or_else(|| scope.err(Some(rnti), "RAR for unknown temp C-RNTI".into()))?;
                scope.ensure(ue.prach_tti == Some(g.data.prach_tti), rnti, || "RAR for a PRACH the UE never sent".into())?;
                scope.ensure(ue.pcell_enb_cc_idx() == Some(cc as u32), rnti, || "RAR outside the PCell".into())?;
                scope.ensure(rar.ra_rnti == ra_rnti(g.data.prach_tti), rnti, || format!("wrong RA-RNTI 0x{:x}", rar.ra_rnti))?;
                scope.ensure(ue.rar_tti_rx.is_none(), rnti, || "second RAR for one PRACH".into())?;
                scope.ensure(g.grant.riv == g.grant.prbs.riv(cell.phy.nof_prb), rnti, || "Msg3 RIV does not match the PRBs".into())?;
                let start = g.data.prach_tti + RAR_WINDOW_OFFSET;
                let window = TtiInterval::new(start, start + cell.prach_rar_window);
                scope.ensure(window.contains(tti_tx_dl), rnti, || format!("RAR at {} outside window {:?}", tti_tx_dl, window))?;
            }
        }
    }

    for ue in enb.ues.values() {
        let rnti = ue.rnti;
        let pcell = ue.pcell_enb_cc_idx().unwrap_or(0) as usize;
        let scope = Scope::new(CheckCategory::Ra, tti_rx, pcell);
        let pdsch: Vec<_> = (0..result.dl_cc_result.len()).filter_map(|cc| result.find_pdsch(cc, rnti).map(|d| (cc, d))).collect();
        let pusch: Vec<_> = (0..result.ul_cc_result.len()).filter_map(|cc| result.find_pusch(cc, rnti).map(|p| (cc, p))).collect();

        let Some(prach_tti) = ue.prach_tti else {
            scope.ensure(pdsch.is_empty() && pusch.is_empty(), rnti, || "grant before RACH".into())?;
            continue;
        };

        let Some(rar_tti_rx) = ue.rar_tti_rx else {
            let window_stop = prach_tti + RAR_WINDOW_OFFSET + enb.cells.get(pcell).map_or(0, |c| c.prach_rar_window);
            scope.ensure(tti_tx_dl != window_stop, rnti, || format!("no RAR sent before the window closed at {}", window_stop))?;
            scope.ensure(pdsch.is_empty() && pusch.is_empty(), rnti, || "grant before RAR".into())?;
            continue;
        };

        let msg3_tti_rx = enb.timing.msg3_tti_rx(rar_tti_rx);
        if tti_rx == msg3_tti_rx {
            let msg3 = result
                .find_pusch(pcell, rnti)
                .ok_or_else(|| scope.err(Some(rnti), format!("no Msg3 {} TTIs after the RAR", enb.timing.msg3_delay)))?;
            scope.ensure(!msg3.needs_pdcch && msg3.current_tx_nb == 0, rnti, || "Msg3 must be a new tx without DCI".into())?;
            scope.ensure(Some(msg3.dci.riv) == ue.msg3_riv, rnti, || "Msg3 PRBs differ from the RAR grant".into())?;
        }

        match ue.msg4_tti_rx {
            None => {
                for (cc, p) in &pusch {
                    let since_msg3 = tti_rx.diff(msg3_tti_rx);
                    scope.ensure(*cc == pcell && since_msg3 >= 0 && since_msg3 % nof_procs == 0, rnti, || {
                        "PUSCH before Msg4 that is not the Msg3".into()
                    })?;
                    scope.ensure(p.current_tx_nb > 0 || tti_rx == msg3_tti_rx, rnti, || "UL new tx before Msg4".into())?;
                }
            }
            Some(msg4_tti_rx) => {
                for (_, p) in &pusch {
                    scope.ensure(p.current_tx_nb > 0 || msg4_tti_rx < tti_rx, rnti, || "UL new tx before Msg4 was sent".into())?;
                }
            }
        }

        let Some(ue_msg3_tti_rx) = ue.msg3_tti_rx else {
            scope.ensure(pdsch.is_empty(), rnti, || "PDSCH before Msg3".into())?;
            continue;
        };
        for (cc, d) in &pdsch {
            let has_conres = d.pdus[0].iter().any(|p| p.lcid == CONRES_CE_LCID);
            if ue.msg4_tti_rx.is_none() {
                scope.ensure(*cc == pcell, rnti, || "Msg4 outside the PCell".into())?;
                scope.ensure(d.pdus[0].first().is_some_and(|p| p.lcid == CONRES_CE_LCID), rnti, || {
                    "first PDSCH after Msg3 without ConRes CE".into()
                })?;
                scope.ensure(d.dci.format == DciFormat::Format1A, rnti, || format!("Msg4 with {:?}", d.dci.format))?;
                scope.ensure(enb.timing.to_tx_ul(ue_msg3_tti_rx) <= tti_rx, rnti, || "Msg4 before the Msg3 CRC".into())?;
            } else if has_conres {
                let h = ue.cc_list.get(d.dci.ue_cc_idx as usize).map(|c| &c.dl_harq[d.dci.pid as usize]);
                scope.ensure(h.is_some_and(|h| h.nof_txs > 0 && h.ndi == d.dci.tb[0].ndi), rnti, || "second ConRes CE".into())?;
            }
        }
    }
    Ok(())
}

/// No PDSCH or PUSCH on the PCell of a UE whose transmission or HARQ
/// feedback falls in its measurement gap
pub fn test_meas_gaps(enb: &SimEnbCtxt, result: &SfSchedResult) -> Result<(), CheckError> {
    let tti_rx = result.tti_rx;
    for ue in enb.ues.values() {
        let gap = MeasGap::from_ue_cfg(&ue.ue_cfg);
        if !gap.is_enabled() {
            continue;
        }
        let Some(pcell) = ue.pcell_enb_cc_idx() else {
            continue;
        };
        let scope = Scope::new(CheckCategory::MeasGap, tti_rx, pcell as usize);
        if result.find_pdsch(pcell as usize, ue.rnti).is_some() {
            scope.ensure(!gap.blocks_dl(&enb.timing, tti_rx), ue.rnti, || "PDSCH overlapping a measurement gap".into())?;
        }
        if result.find_pusch(pcell as usize, ue.rnti).is_some() {
            scope.ensure(!gap.blocks_ul(&enb.timing, tti_rx), ue.rnti, || "PUSCH overlapping a measurement gap".into())?;
        }
    }
    Ok(())
}

fn first_overlap(prbs: &[PrbInterval]) -> Option<(PrbInterval, PrbInterval)> {
    for (i, a) in prbs.iter().enumerate() {
        if let Some(b) = prbs[i + 1..].iter().find(|b| a.overlaps(b)) {
            return Some((*a, *b));
        }
    }
    None
}

/// PRBs and CCEs: inside the carrier, away from the PUCCH edges in UL,
/// and never handed out twice
pub fn test_resource_collisions(enb: &SimEnbCtxt, phy: &dyn PhyHelper, result: &SfSchedResult) -> Result<(), CheckError> {
    let tti_rx = result.tti_rx;
    for (cc, (dl, ul)) in result.dl_cc_result.iter().zip(&result.ul_cc_result).enumerate() {
        let scope = Scope::new(CheckCategory::Resources, tti_rx, cc);
        let Some(cell) = enb.cells.get(cc) else {
            continue;
        };
        let nof_prb = cell.phy.nof_prb;

        let mut dl_prbs: Vec<PrbInterval> = Vec::new();
        let mut cces: Vec<CceLocation> = Vec::new();
        for bc in &dl.bc {
            dl_prbs.push(bc.dci.prbs);
            cces.push(bc.dci.cce);
        }
        for rar in &dl.rar {
            dl_prbs.push(rar.dci.prbs);
            cces.push(rar.dci.cce);
        }
        for data in &dl.data {
            dl_prbs.push(data.dci.prbs);
            cces.push(data.dci.cce);
        }
        if let Some(prbs) = dl_prbs.iter().find(|p| p.is_empty() || p.stop() > nof_prb) {
            return Err(scope.err(None, format!("DL PRBs {:?} outside the carrier", prbs)));
        }
        if let Some((a, b)) = first_overlap(&dl_prbs) {
            return Err(scope.err(None, format!("DL PRBs {:?} and {:?} collide", a, b)));
        }

        let ul_prbs: Vec<PrbInterval> = ul.pusch.iter().map(|p| p.dci.prbs).collect();
        let ul_band = PrbInterval::new(cell.nrb_pucch, nof_prb.saturating_sub(2 * cell.nrb_pucch));
        if let Some(prbs) = ul_prbs.iter().find(|p| p.is_empty() || p.start < ul_band.start || p.stop() > ul_band.stop()) {
            return Err(scope.err(None, format!("UL PRBs {:?} outside the PUSCH band {:?}", prbs, ul_band)));
        }
        if let Some((a, b)) = first_overlap(&ul_prbs) {
            return Err(scope.err(None, format!("UL PRBs {:?} and {:?} collide", a, b)));
        }

        cces.extend(ul.pusch.iter().filter_map(|p| p.dci.cce));
        let nof_cce = phy.nof_cce(&cell.phy, dl.cfi);
        let cce_ranges: Vec<PrbInterval> = cces.iter().map(|c| PrbInterval::new(c.ncce, 1 << c.aggr_level)).collect();
        if let Some(c) = cce_ranges.iter().find(|c| c.stop() > nof_cce) {
            return Err(scope.err(None, format!("CCEs {:?} beyond the {} of the control region", c, nof_cce)));
        }
        if let Some(c) = cces.iter().find(|c| c.aggr_level != enb.args.pdcch_aggr_level) {
            return Err(scope.err(None, format!("DCI with aggregation level {}", c.aggr_level)));
        }
        if let Some((a, b)) = first_overlap(&cce_ranges) {
            return Err(scope.err(None, format!("CCEs {:?} and {:?} collide", a, b)));
        }
    }
    Ok(())
}

/// Runs every rule against one TTI's result
pub fn test_all_ues(enb: &SimEnbCtxt, phy: &dyn PhyHelper, result: &SfSchedResult) -> Result<(), CheckError> {
    test_dl_sched_result(enb, phy, result)?;
    test_ul_sched_result(enb, phy, result)?;
    test_ra(enb, result)?;
    test_meas_gaps(enb, result)?;
    test_resource_collisions(enb, phy, result)
}
