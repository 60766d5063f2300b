//! Independent model of what every UE has been granted so far
//!
//! The model is built only from the emitted grants and the feedback given
//! back to the scheduler, never from scheduler internals, so the checker can
//! compare each new result against it.

use std::collections::BTreeMap;

use enb_config::{CellCfg, SchedArgs, UeCfg};
use enb_core::{CONRES_CE_LCID, HarqTiming, Rnti, TtiPoint};

use crate::result::{PhichValue, SfSchedResult};

#[derive(Debug, Clone, Default)]
pub struct SimHarqCtxt {
    pub active: bool,
    pub ndi: bool,
    /// Transmissions over the lifetime of the process
    pub nof_txs: u32,
    /// Retransmissions of the current TB
    pub nof_retxs: u32,
    pub tbs: u32,
    pub riv: u32,
    pub first_tti_rx: Option<TtiPoint>,
    pub last_tti_rx: Option<TtiPoint>,
}

#[derive(Debug, Clone)]
pub struct SimCcCtxt {
    pub enb_cc_idx: u32,
    pub active: bool,
    pub dl_harq: Vec<SimHarqCtxt>,
    pub ul_harq: Vec<SimHarqCtxt>,
}

impl SimCcCtxt {
    fn new(enb_cc_idx: u32, active: bool, nof_procs: usize) -> Self {
        SimCcCtxt {
            enb_cc_idx,
            active,
            dl_harq: vec![SimHarqCtxt::default(); nof_procs],
            ul_harq: vec![SimHarqCtxt::default(); nof_procs],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimUeCtxt {
    pub rnti: Rnti,
    pub ue_cfg: UeCfg,
    pub prach_tti: Option<TtiPoint>,
    pub preamble_idx: u32,
    pub rar_tti_rx: Option<TtiPoint>,
    pub msg3_riv: Option<u32>,
    pub msg3_tti_rx: Option<TtiPoint>,
    pub msg4_tti_rx: Option<TtiPoint>,
    /// Indexed by UE-local carrier index
    pub cc_list: Vec<SimCcCtxt>,
}

impl SimUeCtxt {
    pub fn new(rnti: Rnti, ue_cfg: UeCfg, nof_procs: usize) -> Self {
        let mut ue = SimUeCtxt {
            rnti,
            ue_cfg: UeCfg::default(),
            prach_tti: None,
            preamble_idx: 0,
            rar_tti_rx: None,
            msg3_riv: None,
            msg3_tti_rx: None,
            msg4_tti_rx: None,
            cc_list: Vec::new(),
        };
        ue.set_cfg(ue_cfg, nof_procs);
        ue
    }

    /// Carriers that keep their eNB cell and UE-local index keep their HARQ state
    pub fn set_cfg(&mut self, ue_cfg: UeCfg, nof_procs: usize) {
        let old = std::mem::take(&mut self.cc_list);
        for (i, cc) in ue_cfg.supported_cc_list.iter().enumerate() {
            let mut sim_cc = match old.get(i) {
                Some(prev) if prev.enb_cc_idx == cc.enb_cc_idx => prev.clone(),
                _ => SimCcCtxt::new(cc.enb_cc_idx, cc.active, nof_procs),
            };
            if sim_cc.active && !cc.active {
                sim_cc = SimCcCtxt::new(cc.enb_cc_idx, false, nof_procs);
            }
            sim_cc.active = cc.active;
            self.cc_list.push(sim_cc);
        }
        self.ue_cfg = ue_cfg;
    }

    pub fn pcell_enb_cc_idx(&self) -> Option<u32> {
        self.ue_cfg.pcell_enb_cc_idx()
    }

    pub fn ue_cc_idx(&self, enb_cc_idx: u32) -> Option<usize> {
        self.cc_list.iter().position(|cc| cc.enb_cc_idx == enb_cc_idx)
    }

    /// The UL process currently carries the Msg3
    pub fn is_msg3_harq(&self, h: &SimHarqCtxt) -> bool {
        self.msg3_tti_rx.is_some() && h.first_tti_rx == self.msg3_tti_rx
    }
}

/// Simulated view of the eNB: configuration plus one context per UE
#[derive(Debug, Clone)]
pub struct SimEnbCtxt {
    pub timing: HarqTiming,
    pub args: SchedArgs,
    pub cells: Vec<CellCfg>,
    pub ues: BTreeMap<Rnti, SimUeCtxt>,
}

impl SimEnbCtxt {
    pub fn new(timing: HarqTiming, args: SchedArgs, cells: Vec<CellCfg>) -> Self {
        SimEnbCtxt { timing, args, cells, ues: BTreeMap::new() }
    }

    pub fn nof_procs(&self) -> usize {
        self.timing.nof_harq_procs() as usize
    }

    pub fn ue_cfg(&mut self, rnti: Rnti, ue_cfg: UeCfg) {
        let nof_procs = self.nof_procs();
        match self.ues.get_mut(&rnti) {
            Some(ue) => ue.set_cfg(ue_cfg, nof_procs),
            None => {
                self.ues.insert(rnti, SimUeCtxt::new(rnti, ue_cfg, nof_procs));
            }
        }
    }

    pub fn rem_user(&mut self, rnti: Rnti) {
        self.ues.remove(&rnti);
    }

    pub fn add_rach(&mut self, rnti: Rnti, prach_tti: TtiPoint, preamble_idx: u32) {
        if let Some(ue) = self.ues.get_mut(&rnti) {
            ue.prach_tti = Some(prach_tti);
            ue.preamble_idx = preamble_idx;
        }
    }

    /// Max number of transmissions of an UL process, Msg3 uses the cell limit
    pub fn ul_max_tx(&self, ue: &SimUeCtxt, h: &SimHarqCtxt) -> u32 {
        if ue.is_msg3_harq(h) {
            let pcell = ue.pcell_enb_cc_idx().unwrap_or(0) as usize;
            self.cells.get(pcell).map_or(1, |c| c.maxharq_msg3tx)
        } else {
            ue.ue_cfg.maxharq_tx
        }
    }

    /// HARQ feedback given to the scheduler for a PDSCH
    pub fn dl_feedback(&mut self, rnti: Rnti, ue_cc_idx: usize, pid: u32, ack: bool) {
        let Some(ue) = self.ues.get_mut(&rnti) else {
            return;
        };
        let maxharq = ue.ue_cfg.maxharq_tx;
        let Some(h) = ue.cc_list.get_mut(ue_cc_idx).and_then(|cc| cc.dl_harq.get_mut(pid as usize)) else {
            return;
        };
        if ack || h.nof_retxs + 1 >= maxharq {
            h.active = false;
        }
    }

    /// Applies the grants of one TTI once they passed the checker
    pub fn update(&mut self, result: &SfSchedResult) {
        let tti_rx = result.tti_rx;
        let ul_pid = self.timing.harq_pid(self.timing.to_tx_ul(tti_rx)) as usize;

        for dl in &result.dl_cc_result {
            for rar in &dl.rar {
                for g in &rar.msg3_grant {
                    if let Some(ue) = self.ues.get_mut(&g.data.temp_crnti) {
                        ue.rar_tti_rx = Some(tti_rx);
                        ue.msg3_riv = Some(g.grant.riv);
                    }
                }
            }
            for data in &dl.data {
                let Some(ue) = self.ues.get_mut(&data.dci.rnti) else {
                    continue;
                };
                let Some(h) = ue.cc_list.get_mut(data.dci.ue_cc_idx as usize).and_then(|c| c.dl_harq.get_mut(data.dci.pid as usize))
                else {
                    continue;
                };
                let tb = &data.dci.tb[0];
                if h.nof_txs == 0 || tb.ndi != h.ndi {
                    h.active = true;
                    h.nof_retxs = 0;
                    h.ndi = tb.ndi;
                } else {
                    h.nof_retxs += 1;
                }
                h.last_tti_rx = Some(tti_rx);
                h.nof_txs += 1;
                h.tbs = data.tbs[0];
                if ue.msg4_tti_rx.is_none() && data.pdus[0].iter().any(|p| p.lcid == CONRES_CE_LCID) {
                    ue.msg4_tti_rx = Some(tti_rx);
                }
            }
        }

        // Msg3 bookkeeping needs the state from before this TTI's PUSCH updates
        let msg3_rntis: Vec<Rnti> = self
            .ues
            .values()
            .filter(|ue| ue.msg3_tti_rx.is_none() && ue.rar_tti_rx.is_some_and(|rar| self.timing.msg3_tti_rx(rar) == tti_rx))
            .filter(|ue| {
                ue.pcell_enb_cc_idx()
                    .is_some_and(|pcell| result.find_pusch(pcell as usize, ue.rnti).is_some())
            })
            .map(|ue| ue.rnti)
            .collect();
        for rnti in msg3_rntis {
            if let Some(ue) = self.ues.get_mut(&rnti) {
                ue.msg3_tti_rx = Some(tti_rx);
            }
        }

        for (cc, ul) in result.ul_cc_result.iter().enumerate() {
            for phich in &ul.phich {
                let Some(ue) = self.ues.get(&phich.rnti) else {
                    continue;
                };
                let Some(ue_cc_idx) = ue.ue_cc_idx(cc as u32) else {
                    continue;
                };
                let h = &ue.cc_list[ue_cc_idx].ul_harq[ul_pid];
                let last_retx = h.nof_retxs + 1 >= self.ul_max_tx(ue, h);
                if phich.phich == PhichValue::Ack || last_retx {
                    if let Some(ue) = self.ues.get_mut(&phich.rnti) {
                        ue.cc_list[ue_cc_idx].ul_harq[ul_pid].active = false;
                    }
                }
            }
            for pusch in &ul.pusch {
                let Some(ue) = self.ues.get_mut(&pusch.dci.rnti) else {
                    continue;
                };
                let Some(h) = ue.cc_list.get_mut(pusch.dci.ue_cc_idx as usize).and_then(|c| c.ul_harq.get_mut(pusch.dci.pid as usize))
                else {
                    continue;
                };
                if pusch.current_tx_nb == 0 {
                    h.active = true;
                    h.nof_retxs = 0;
                    h.ndi = pusch.dci.tb.ndi;
                    h.first_tti_rx = Some(tti_rx);
                } else {
                    h.nof_retxs += 1;
                    h.active = true;
                }
                h.last_tti_rx = Some(tti_rx);
                h.riv = pusch.dci.riv;
                h.nof_txs += 1;
                h.tbs = pusch.tbs;
            }
        }
    }
}
