//! Closed-loop scheduler test bench
//!
//! Per TTI: apply the generated events, hand back the HARQ feedback that is
//! due, run the scheduler, check the result against the simulated contexts,
//! then update those contexts and draw the feedback of the new grants.

use core::fmt;

use enb_config::EnbConfig;
use enb_core::{CONRES_CE_LCID, Rnti, TtiPoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::result::{PhichValue, SfSchedResult};
use crate::sched::{SchedError, Scheduler};
use crate::testing::checker::{self, CheckError};
use crate::testing::scenario::{SchedSimEventGenerator, TtiEvents, UserCfgEvent};
use crate::testing::sim_ue::SimEnbCtxt;

/// Keeps the feedback draws independent from the scenario draws of the same seed
const FEEDBACK_SEED_SALT: u64 = 0x5eed_f00d;

#[derive(Debug)]
pub enum TesterError {
    Sched { tti_rx: TtiPoint, source: SchedError },
    Check(CheckError),
}

impl fmt::Display for TesterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TesterError::Sched { tti_rx, source } => write!(f, "scheduler rejected input at tti_rx={}: {}", tti_rx, source),
            TesterError::Check(e) => write!(f, "result check failed: {}", e),
        }
    }
}

impl std::error::Error for TesterError {}

impl From<CheckError> for TesterError {
    fn from(e: CheckError) -> Self {
        TesterError::Check(e)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TesterStats {
    pub nof_ttis: u32,
    pub nof_ues_added: u32,
    pub nof_ues_removed: u32,
    pub nof_rar: u32,
    pub nof_msg3: u32,
    pub nof_msg4: u32,
    pub nof_dl_newtx: u32,
    pub nof_dl_retx: u32,
    pub nof_ul_newtx: u32,
    pub nof_ul_retx: u32,
    pub nof_phich_ack: u32,
    pub nof_phich_nack: u32,
    pub dl_bytes: u64,
    pub ul_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingDlAck {
    tti_rx: TtiPoint,
    rnti: Rnti,
    enb_cc_idx: u32,
    ue_cc_idx: usize,
    pid: u32,
    ack: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingUlCrc {
    tti_rx: TtiPoint,
    rnti: Rnti,
    enb_cc_idx: u32,
    crc: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingCqi {
    tti_rx: TtiPoint,
    rnti: Rnti,
    enb_cc_idx: u32,
    cqi: u32,
}

pub struct SchedTester {
    sched: Scheduler,
    sim: SimEnbCtxt,
    rng: StdRng,
    p_retx: f32,
    dl_acks: Vec<PendingDlAck>,
    ul_crcs: Vec<PendingUlCrc>,
    cqis: Vec<PendingCqi>,
    stats: TesterStats,
    trace: Vec<SfSchedResult>,
}

impl SchedTester {
    pub fn new(cfg: &EnbConfig) -> Result<Self, SchedError> {
        let sched = Scheduler::from_config(cfg)?;
        let sim = SimEnbCtxt::new(cfg.timing, cfg.sched.clone(), cfg.cells.clone());
        Ok(SchedTester {
            sched,
            sim,
            rng: StdRng::seed_from_u64(cfg.sim.seed ^ FEEDBACK_SEED_SALT),
            p_retx: cfg.sim.p_retx,
            dl_acks: Vec::new(),
            ul_crcs: Vec::new(),
            cqis: Vec::new(),
            stats: TesterStats::default(),
            trace: Vec::new(),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.sched
    }

    pub fn sim(&self) -> &SimEnbCtxt {
        &self.sim
    }

    pub fn stats(&self) -> &TesterStats {
        &self.stats
    }

    /// Every result produced so far, in TTI order
    pub fn trace(&self) -> &[SfSchedResult] {
        &self.trace
    }

    pub fn apply_events(&mut self, events: &TtiEvents) -> Result<(), TesterError> {
        let tti_rx = events.tti_rx;
        let wrap = |source| TesterError::Sched { tti_rx, source };

        for ev in &events.user_cfg {
            match ev {
                UserCfgEvent::Add { rnti, cfg, rach } => {
                    self.sched.ue_cfg(*rnti, cfg.clone()).map_err(wrap)?;
                    self.sim.ue_cfg(*rnti, cfg.clone());
                    let pcell = cfg.pcell_enb_cc_idx().unwrap_or(0);
                    self.sched.dl_rach_info(pcell, *rach).map_err(wrap)?;
                    self.sim.add_rach(*rnti, rach.prach_tti, rach.preamble_idx);
                    self.stats.nof_ues_added += 1;
                    tracing::debug!(tti = tti_rx.to_uint(), "apply_events: rnti=0x{:x} added with PRACH", rnti);
                }
                UserCfgEvent::Reconf { rnti, cfg } => {
                    self.sched.ue_cfg(*rnti, cfg.clone()).map_err(wrap)?;
                    self.sim.ue_cfg(*rnti, cfg.clone());
                    tracing::debug!(tti = tti_rx.to_uint(), "apply_events: rnti=0x{:x} reconfigured", rnti);
                }
                UserCfgEvent::Rem { rnti } => {
                    self.sched.ue_rem(*rnti).map_err(wrap)?;
                    self.sim.rem_user(*rnti);
                    self.dl_acks.retain(|a| a.rnti != *rnti);
                    self.ul_crcs.retain(|c| c.rnti != *rnti);
                    self.cqis.retain(|c| c.rnti != *rnti);
                    self.stats.nof_ues_removed += 1;
                    tracing::debug!(tti = tti_rx.to_uint(), "apply_events: rnti=0x{:x} removed", rnti);
                }
            }
        }

        for buf in &events.buffers {
            if let Some((lcid, bytes)) = buf.dl {
                self.sched.dl_rlc_buffer_state(buf.rnti, lcid, bytes, 0).map_err(wrap)?;
            }
            if let Some((lcg, bytes)) = buf.ul {
                self.sched.ul_bsr(buf.rnti, lcg, bytes).map_err(wrap)?;
            }
        }
        Ok(())
    }

    fn deliver_feedback(&mut self, tti_rx: TtiPoint) -> Result<(), TesterError> {
        let wrap = |source| TesterError::Sched { tti_rx, source };

        let (due, later): (Vec<_>, Vec<_>) = self.dl_acks.drain(..).partition(|a| a.tti_rx == tti_rx);
        self.dl_acks = later;
        for a in due {
            let pid = self.sched.dl_ack_info(tti_rx, a.rnti, a.enb_cc_idx, 0, a.ack).map_err(wrap)?;
            enb_core::assert_warn!(pid == a.pid, "rnti=0x{:x} ACK matched pid={} instead of {}", a.rnti, pid, a.pid);
            self.sim.dl_feedback(a.rnti, a.ue_cc_idx, a.pid, a.ack);
        }

        let (due, later): (Vec<_>, Vec<_>) = self.ul_crcs.drain(..).partition(|c| c.tti_rx == tti_rx);
        self.ul_crcs = later;
        for c in due {
            self.sched.ul_crc_info(tti_rx, c.rnti, c.enb_cc_idx, c.crc).map_err(wrap)?;
        }

        let (due, later): (Vec<_>, Vec<_>) = self.cqis.drain(..).partition(|c| c.tti_rx == tti_rx);
        self.cqis = later;
        for c in due {
            self.sched.dl_cqi_info(tti_rx, c.rnti, c.enb_cc_idx, c.cqi).map_err(wrap)?;
        }
        Ok(())
    }

    fn enqueue_feedback(&mut self, result: &SfSchedResult) {
        let timing = *self.sched.timing();
        let p_retx = self.p_retx as f64;
        for (cc, dl) in result.dl_cc_result.iter().enumerate() {
            for data in &dl.data {
                self.dl_acks.push(PendingDlAck {
                    tti_rx: timing.to_tx_dl_ack(result.tti_rx),
                    rnti: data.dci.rnti,
                    enb_cc_idx: cc as u32,
                    ue_cc_idx: data.dci.ue_cc_idx as usize,
                    pid: data.dci.pid,
                    ack: !self.rng.random_bool(p_retx),
                });
            }
        }
        for (cc, ul) in result.ul_cc_result.iter().enumerate() {
            for pusch in &ul.pusch {
                let tti_rx = timing.to_tx_ul(result.tti_rx);
                self.ul_crcs.push(PendingUlCrc {
                    tti_rx,
                    rnti: pusch.dci.rnti,
                    enb_cc_idx: cc as u32,
                    crc: !self.rng.random_bool(p_retx),
                });
                if pusch.dci.cqi_request {
                    let cqi = self.rng.random_range(5..=15);
                    self.cqis.push(PendingCqi { tti_rx, rnti: pusch.dci.rnti, enb_cc_idx: cc as u32, cqi });
                }
            }
        }
    }

    /// Must run before the simulated contexts see the result
    fn collect_stats(&mut self, result: &SfSchedResult) {
        let s = &mut self.stats;
        s.nof_ttis += 1;
        for dl in &result.dl_cc_result {
            s.nof_rar += dl.rar.len() as u32;
            for data in &dl.data {
                let tb = data.dci.tb[0];
                let is_newtx = self
                    .sim
                    .ues
                    .get(&data.dci.rnti)
                    .and_then(|ue| ue.cc_list.get(data.dci.ue_cc_idx as usize))
                    .map(|cc| &cc.dl_harq[data.dci.pid as usize])
                    .is_none_or(|h| h.nof_txs == 0 || h.ndi != tb.ndi);
                if is_newtx {
                    s.nof_dl_newtx += 1;
                    s.dl_bytes += data.pdus[0].iter().map(|p| p.nbytes as u64).sum::<u64>();
                    if data.pdus[0].iter().any(|p| p.lcid == CONRES_CE_LCID) {
                        s.nof_msg4 += 1;
                    }
                } else {
                    s.nof_dl_retx += 1;
                }
            }
        }
        for ul in &result.ul_cc_result {
            for pusch in &ul.pusch {
                if pusch.current_tx_nb == 0 {
                    s.nof_ul_newtx += 1;
                    s.ul_bytes += pusch.tbs as u64;
                    if !pusch.needs_pdcch {
                        s.nof_msg3 += 1;
                    }
                } else {
                    s.nof_ul_retx += 1;
                }
            }
            for phich in &ul.phich {
                match phich.phich {
                    PhichValue::Ack => s.nof_phich_ack += 1,
                    PhichValue::Nack => s.nof_phich_nack += 1,
                }
            }
        }
    }

    /// One full iteration for `tti_rx`, events must have been applied already
    pub fn run_tti(&mut self, tti_rx: TtiPoint) -> Result<SfSchedResult, TesterError> {
        self.deliver_feedback(tti_rx)?;
        let result = self.sched.run_tti(tti_rx);
        if let Err(e) = checker::test_all_ues(&self.sim, self.sched.phy(), &result) {
            tracing::error!(tti = tti_rx.to_uint(), "run_tti: {}", e);
            return Err(e.into());
        }
        self.collect_stats(&result);
        self.sim.update(&result);
        self.enqueue_feedback(&result);
        self.trace.push(result.clone());
        Ok(result)
    }

    /// Runs `nof_ttis` consecutive TTIs starting at `start`
    pub fn run(&mut self, generator: &mut SchedSimEventGenerator, start: TtiPoint, nof_ttis: u32) -> Result<(), TesterError> {
        for i in 0..nof_ttis {
            let tti_rx = start + i;
            let events = generator.next_tti(tti_rx);
            self.apply_events(&events)?;
            self.run_tti(tti_rx)?;
        }
        tracing::info!("run: {} TTIs done, {:?}", nof_ttis, self.stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ra::RachInfo;
    use enb_config::UeCfg;

    #[test]
    fn test_single_ue_connects() {
        let cfg = EnbConfig::new(25);
        let mut tester = SchedTester::new(&cfg).unwrap();
        let rach = RachInfo { prach_tti: TtiPoint::new(10), preamble_idx: 1, temp_crnti: 0x46, msg3_size: 7 };
        let events = TtiEvents {
            tti_rx: TtiPoint::new(10),
            user_cfg: vec![UserCfgEvent::Add { rnti: 0x46, cfg: UeCfg::default(), rach }],
            buffers: Vec::new(),
        };
        tester.apply_events(&events).unwrap();
        for t in 10..60 {
            tester.run_tti(TtiPoint::new(t)).unwrap();
        }
        let ue = &tester.sim().ues[&0x46];
        assert!(ue.rar_tti_rx.is_some());
        assert!(ue.msg3_tti_rx.is_some());
        assert_eq!(tester.stats().nof_rar, 1);
        assert_eq!(tester.stats().nof_msg3, 1);
        assert_eq!(tester.trace().len(), 50);
    }
}
