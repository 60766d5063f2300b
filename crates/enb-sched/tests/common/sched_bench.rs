use enb_config::{CellCfg, EnbConfig, UeCfg};
use enb_core::{CONRES_CE_LCID, Rnti, TtiPoint};
use enb_sched::testing::{SimEnbCtxt, checker};
use enb_sched::{RachInfo, Scheduler, SfSchedResult};

/// Creates a default config for testing. It can still be modified as needed
/// before passing it to the SchedBench constructor
pub fn default_test_config(nof_cells: usize, nof_prb: u32) -> EnbConfig {
    let mut cfg = EnbConfig::new(nof_prb);
    cfg.cells = (0..nof_cells).map(|_| CellCfg::new(nof_prb)).collect();
    cfg
}

/// Scheduler plus simulated UEs with scripted feedback.
/// Every result is verified by the checker before the bench moves on.
pub struct SchedBench {
    pub sched: Scheduler,
    pub sim: SimEnbCtxt,
    pub tti: TtiPoint,
    /// Feedback given to every PDSCH and PUSCH from now on
    pub dl_ack: bool,
    pub ul_crc: bool,
    pub trace: Vec<SfSchedResult>,
    dl_fb: Vec<(TtiPoint, Rnti, u32, usize, u32)>,
    ul_fb: Vec<(TtiPoint, Rnti, u32)>,
}

impl SchedBench {
    pub fn new(cfg: &EnbConfig, start: TtiPoint) -> Self {
        SchedBench {
            sched: Scheduler::from_config(cfg).unwrap(),
            sim: SimEnbCtxt::new(cfg.timing, cfg.sched.clone(), cfg.cells.clone()),
            tti: start,
            dl_ack: true,
            ul_crc: true,
            trace: Vec::new(),
            dl_fb: Vec::new(),
            ul_fb: Vec::new(),
        }
    }

    /// Adds a UE and reports its preamble, detected at the current TTI
    pub fn add_ue(&mut self, rnti: Rnti, cfg: UeCfg) {
        let pcell = cfg.pcell_enb_cc_idx().unwrap();
        self.sched.ue_cfg(rnti, cfg.clone()).unwrap();
        self.sim.ue_cfg(rnti, cfg);
        let rach = RachInfo { prach_tti: self.tti, preamble_idx: 4, temp_crnti: rnti, msg3_size: 7 };
        self.sched.dl_rach_info(pcell, rach).unwrap();
        self.sim.add_rach(rnti, rach.prach_tti, rach.preamble_idx);
    }

    pub fn reconf_ue(&mut self, rnti: Rnti, cfg: UeCfg) {
        self.sched.ue_cfg(rnti, cfg.clone()).unwrap();
        self.sim.ue_cfg(rnti, cfg);
    }

    /// Removes a UE together with the feedback still owed for it
    pub fn rem_ue(&mut self, rnti: Rnti) {
        self.sched.ue_rem(rnti).unwrap();
        self.sim.rem_user(rnti);
        self.dl_fb.retain(|f| f.1 != rnti);
        self.ul_fb.retain(|f| f.1 != rnti);
    }

    /// Runs the current TTI and advances to the next one
    pub fn step(&mut self) -> SfSchedResult {
        let tti = self.tti;
        let timing = *self.sched.timing();

        let (due, later): (Vec<_>, Vec<_>) = self.dl_fb.drain(..).partition(|f| f.0 == tti);
        self.dl_fb = later;
        for (_, rnti, cc, ue_cc_idx, pid) in due {
            let ack = self.dl_ack;
            assert_eq!(self.sched.dl_ack_info(tti, rnti, cc, 0, ack).unwrap(), pid);
            self.sim.dl_feedback(rnti, ue_cc_idx, pid, ack);
        }
        let (due, later): (Vec<_>, Vec<_>) = self.ul_fb.drain(..).partition(|f| f.0 == tti);
        self.ul_fb = later;
        for (_, rnti, cc) in due {
            self.sched.ul_crc_info(tti, rnti, cc, self.ul_crc).unwrap();
        }

        let result = self.sched.run_tti(tti);
        if let Err(e) = checker::test_all_ues(&self.sim, self.sched.phy(), &result) {
            panic!("{}", e);
        }
        self.sim.update(&result);

        for (cc, dl) in result.dl_cc_result.iter().enumerate() {
            for d in &dl.data {
                self.dl_fb.push((timing.to_tx_dl_ack(tti), d.dci.rnti, cc as u32, d.dci.ue_cc_idx as usize, d.dci.pid));
            }
        }
        for (cc, ul) in result.ul_cc_result.iter().enumerate() {
            for p in &ul.pusch {
                self.ul_fb.push((timing.to_tx_ul(tti), p.dci.rnti, cc as u32));
            }
        }
        self.trace.push(result.clone());
        self.tti = tti + 1;
        result
    }

    /// Steps until `pred` holds for a result, at most `max_ttis` times
    pub fn run_until<F: Fn(&SfSchedResult) -> bool>(&mut self, max_ttis: u32, pred: F) -> Option<SfSchedResult> {
        for _ in 0..max_ttis {
            let result = self.step();
            if pred(&result) {
                return Some(result);
            }
        }
        None
    }

    pub fn run(&mut self, nof_ttis: u32) {
        for _ in 0..nof_ttis {
            self.step();
        }
    }

    /// Steps until the Msg4 of `rnti` went out and was acknowledged
    pub fn connect(&mut self, rnti: Rnti) {
        let msg4 = self.run_until(100, |r| {
            r.find_pdsch(0, rnti).is_some_and(|d| d.pdus[0].iter().any(|p| p.lcid == CONRES_CE_LCID))
        });
        assert!(msg4.is_some(), "no Msg4 for rnti=0x{:x}", rnti);
        // Let the ACK of the Msg4 arrive
        self.run(10);
        assert!(self.sched.ue(rnti).unwrap().is_connected());
    }
}
