//! Seeded random traffic scenario
//!
//! UEs arrive with a PRACH, get reconfigured with a data bearer after a
//! while, exchange random DL and UL traffic and leave after their lifetime.

use std::collections::BTreeMap;

use enb_config::{BearerCfg, CellCfg, CfgSim, UeCcCfg, UeCfg};
use enb_core::{Direction, FIRST_CRNTI, Rnti, TtiPoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ra::RachInfo;

/// TTIs between the arrival of a UE and its reconfiguration
pub const RECONF_DELAY: u32 = 50;
/// Data bearer added on reconfiguration
pub const DRB_LCID: u32 = 2;
pub const DRB_LCG: u32 = 1;
/// Msg3 payload carrying the RRC connection request
pub const MSG3_SIZE: u32 = 7;

pub fn generate_default_cell_cfg(nof_prb: u32) -> CellCfg {
    CellCfg::new(nof_prb)
}

/// One active carrier on eNB cell 0 with SRB0 only
pub fn generate_default_ue_cfg() -> UeCfg {
    UeCfg::default()
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserCfgEvent {
    /// New UE, configured and then detected through its preamble
    Add { rnti: Rnti, cfg: UeCfg, rach: RachInfo },
    Reconf { rnti: Rnti, cfg: UeCfg },
    Rem { rnti: Rnti },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserBufferEvent {
    pub rnti: Rnti,
    /// (lcid, bytes) pending in the RLC of the eNB
    pub dl: Option<(u32, u32)>,
    /// (lcg, bytes) reported by BSR
    pub ul: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TtiEvents {
    pub tti_rx: TtiPoint,
    pub user_cfg: Vec<UserCfgEvent>,
    pub buffers: Vec<UserBufferEvent>,
}

impl TtiEvents {
    pub fn is_empty(&self) -> bool {
        self.user_cfg.is_empty() && self.buffers.is_empty()
    }
}

#[derive(Debug, Clone)]
struct GenUe {
    cfg: UeCfg,
    age: u32,
    lifetime: u32,
    reconfigured: bool,
}

pub struct SchedSimEventGenerator {
    cfg: CfgSim,
    nof_cells: usize,
    rng: StdRng,
    next_rnti: Rnti,
    ues: BTreeMap<Rnti, GenUe>,
}

impl SchedSimEventGenerator {
    pub fn new(cfg: &CfgSim, nof_cells: usize) -> Self {
        SchedSimEventGenerator {
            cfg: cfg.clone(),
            nof_cells,
            rng: StdRng::seed_from_u64(cfg.seed),
            next_rnti: FIRST_CRNTI,
            ues: BTreeMap::new(),
        }
    }

    pub fn nof_active_ues(&self) -> usize {
        self.ues.len()
    }

    fn reconf_cfg(&mut self, mut cfg: UeCfg) -> UeCfg {
        cfg.ue_bearers[DRB_LCID as usize] = BearerCfg { direction: Direction::Both, group: DRB_LCG, priority: 1 };
        if self.rng.random_bool(self.cfg.p_measgap as f64) {
            let period = if self.rng.random_bool(0.5) { 40 } else { 80 };
            cfg.measgap_period = period;
            cfg.measgap_offset = self.rng.random_range(0..period);
        }
        if self.nof_cells > 1 && self.rng.random_bool(self.cfg.p_scell as f64) {
            let pcell = cfg.pcell_enb_cc_idx().unwrap_or(0);
            let scell = (pcell + 1) % self.nof_cells as u32;
            cfg.supported_cc_list.push(UeCcCfg { enb_cc_idx: scell, active: true });
        }
        cfg
    }

    /// Events to apply before scheduling `tti_rx`
    pub fn next_tti(&mut self, tti_rx: TtiPoint) -> TtiEvents {
        let mut events = TtiEvents { tti_rx, user_cfg: Vec::new(), buffers: Vec::new() };

        let leaving: Vec<Rnti> = self.ues.iter().filter(|(_, ue)| ue.age >= ue.lifetime).map(|(rnti, _)| *rnti).collect();
        for rnti in leaving {
            self.ues.remove(&rnti);
            tracing::debug!("next_tti: rnti=0x{:x} leaves", rnti);
            events.user_cfg.push(UserCfgEvent::Rem { rnti });
        }

        let due: Vec<Rnti> =
            self.ues.iter().filter(|(_, ue)| !ue.reconfigured && ue.age >= RECONF_DELAY).map(|(rnti, _)| *rnti).collect();
        for rnti in due {
            let Some(old) = self.ues.get(&rnti).map(|ue| ue.cfg.clone()) else {
                continue;
            };
            let cfg = self.reconf_cfg(old);
            if let Some(ue) = self.ues.get_mut(&rnti) {
                ue.cfg = cfg.clone();
                ue.reconfigured = true;
            }
            events.user_cfg.push(UserCfgEvent::Reconf { rnti, cfg });
        }

        if self.ues.len() < self.cfg.max_ues as usize && self.rng.random_bool(self.cfg.p_ue_arrival as f64) {
            let rnti = self.next_rnti;
            self.next_rnti = self.next_rnti.wrapping_add(1).max(FIRST_CRNTI);
            let lifetime = self.rng.random_range(self.cfg.ue_min_duration..=self.cfg.ue_max_duration);
            let preamble_idx = self.rng.random_range(0..64);
            let cfg = generate_default_ue_cfg();
            let rach = RachInfo { prach_tti: tti_rx, preamble_idx, temp_crnti: rnti, msg3_size: MSG3_SIZE };
            tracing::debug!("next_tti: rnti=0x{:x} arrives, lifetime={}", rnti, lifetime);
            self.ues.insert(rnti, GenUe { cfg: cfg.clone(), age: 0, lifetime, reconfigured: false });
            events.user_cfg.push(UserCfgEvent::Add { rnti, cfg, rach });
        }

        for (rnti, ue) in self.ues.iter_mut() {
            let (lcid, lcg) = if ue.reconfigured { (DRB_LCID, DRB_LCG) } else { (0, 0) };
            let dl = self
                .rng
                .random_bool(self.cfg.p_dl_data as f64)
                .then(|| (lcid, self.rng.random_range(1..=self.cfg.max_dl_bytes.max(1))));
            let ul = self
                .rng
                .random_bool(self.cfg.p_ul_data as f64)
                .then(|| (lcg, self.rng.random_range(1..=self.cfg.max_ul_bytes.max(1))));
            if dl.is_some() || ul.is_some() {
                events.buffers.push(UserBufferEvent { rnti: *rnti, dl, ul });
            }
            ue.age += 1;
        }
        events
    }
}
