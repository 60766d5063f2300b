//! Scheduler façade
//!
//! All inputs (configuration, buffer state, HARQ feedback, channel reports,
//! PRACH detections) are applied between two `run_tti` calls. `run_tti`
//! performs one synchronous pass over every configured carrier and returns the
//! grants of that receive-TTI. Input errors are returned to the caller; running
//! out of PRBs, CCEs or HARQ processes is not an error, the UE simply gets no
//! grant in that TTI.

use std::collections::BTreeMap;
use std::fmt;

use enb_config::{BearerCfg, CellCfg, EnbConfig, SchedArgs, UeCfg};
use enb_core::{HarqTiming, MAX_NOF_LCGS, MAX_NOF_LCIDS, Rnti, TtiPoint};

use crate::harq::HarqError;
use crate::phy_helper::{DefaultPhyHelper, PhyHelper};
use crate::ra::{RaCellSched, RaError, RachInfo};
use crate::result::SfSchedResult;
use crate::sf_grid::{CellCtx, SfGrid};
use crate::ue::SchedUe;
use crate::{bc, dl_alloc, ul_alloc};

/// Lowest RNTI usable as C-RNTI
pub const MIN_CRNTI: Rnti = 0x003D;
/// Highest RNTI usable as C-RNTI
pub const MAX_CRNTI: Rnti = 0xFFF3;

#[derive(Debug, Clone, PartialEq)]
pub enum SchedError {
    CellNotConfigured,
    InvalidSchedCfg(&'static str),
    InvalidCellCfg(&'static str),
    UnknownCell(u32),
    InvalidRnti(Rnti),
    UnknownRnti(Rnti),
    InvalidUeCfg { rnti: Rnti, reason: &'static str },
    InvalidLcid(u32),
    InvalidLcg(u32),
    BearerNotConfigured { rnti: Rnti, lcid: u32 },
    CarrierNotConfigured { rnti: Rnti, enb_cc_idx: u32 },
    Harq(HarqError),
    Ra(RaError),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::CellNotConfigured => write!(f, "no cell configured"),
            SchedError::InvalidSchedCfg(reason) => write!(f, "invalid scheduler configuration: {}", reason),
            SchedError::InvalidCellCfg(reason) => write!(f, "invalid cell configuration: {}", reason),
            SchedError::UnknownCell(cc) => write!(f, "unknown cell {}", cc),
            SchedError::InvalidRnti(rnti) => write!(f, "rnti=0x{:x} is not a valid C-RNTI", rnti),
            SchedError::UnknownRnti(rnti) => write!(f, "rnti=0x{:x} does not exist", rnti),
            SchedError::InvalidUeCfg { rnti, reason } => write!(f, "rnti=0x{:x} invalid configuration: {}", rnti, reason),
            SchedError::InvalidLcid(lcid) => write!(f, "invalid lcid {}", lcid),
            SchedError::InvalidLcg(lcg) => write!(f, "invalid lcg {}", lcg),
            SchedError::BearerNotConfigured { rnti, lcid } => {
                write!(f, "rnti=0x{:x} has no bearer configured for lcid {}", rnti, lcid)
            }
            SchedError::CarrierNotConfigured { rnti, enb_cc_idx } => {
                write!(f, "rnti=0x{:x} is not configured on cell {}", rnti, enb_cc_idx)
            }
            SchedError::Harq(e) => write!(f, "{}", e),
            SchedError::Ra(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SchedError {}

impl From<HarqError> for SchedError {
    fn from(e: HarqError) -> Self {
        SchedError::Harq(e)
    }
}

impl From<RaError> for SchedError {
    fn from(e: RaError) -> Self {
        SchedError::Ra(e)
    }
}

pub struct Scheduler {
    timing: HarqTiming,
    args: SchedArgs,
    phy: Box<dyn PhyHelper>,
    cells: Vec<CellCfg>,
    /// CCEs of the control region, per cell
    nof_cce: Vec<u32>,
    ra_cells: Vec<RaCellSched>,
    ues: BTreeMap<Rnti, SchedUe>,
}

impl Scheduler {
    pub fn new(timing: HarqTiming, args: SchedArgs) -> Result<Self, SchedError> {
        Self::with_phy_helper(timing, args, Box::new(DefaultPhyHelper))
    }

    /// Rejects HARQ timings and tunables the allocators cannot run with
    pub fn with_phy_helper(timing: HarqTiming, args: SchedArgs, phy: Box<dyn PhyHelper>) -> Result<Self, SchedError> {
        timing.validate().map_err(SchedError::InvalidSchedCfg)?;
        args.validate().map_err(SchedError::InvalidSchedCfg)?;
        Ok(Scheduler {
            timing,
            args,
            phy,
            cells: Vec::new(),
            nof_cce: Vec::new(),
            ra_cells: Vec::new(),
            ues: BTreeMap::new(),
        })
    }

    /// Scheduler with the timing, tunables and cells of an eNB configuration
    pub fn from_config(cfg: &EnbConfig) -> Result<Self, SchedError> {
        let mut sched = Self::new(cfg.timing, cfg.sched.clone())?;
        sched.cell_cfg(cfg.cells.clone())?;
        Ok(sched)
    }

    pub fn timing(&self) -> &HarqTiming {
        &self.timing
    }

    pub fn args(&self) -> &SchedArgs {
        &self.args
    }

    pub fn phy(&self) -> &dyn PhyHelper {
        self.phy.as_ref()
    }

    pub fn cells(&self) -> &[CellCfg] {
        &self.cells
    }

    pub fn nof_ues(&self) -> usize {
        self.ues.len()
    }

    pub fn ue(&self, rnti: Rnti) -> Option<&SchedUe> {
        self.ues.get(&rnti)
    }

    /// Configures the carriers. Reconfiguring drops every UE.
    pub fn cell_cfg(&mut self, cells: Vec<CellCfg>) -> Result<(), SchedError> {
        if cells.is_empty() {
            return Err(SchedError::CellNotConfigured);
        }
        for cell in &cells {
            cell.validate().map_err(SchedError::InvalidCellCfg)?;
        }
        if !self.ues.is_empty() {
            tracing::warn!("cell_cfg: reconfiguring cells, removing {} UEs", self.ues.len());
            self.ues.clear();
        }
        self.nof_cce = cells.iter().map(|c| self.phy.nof_cce(&c.phy, self.args.cfi)).collect();
        self.ra_cells = (0..cells.len() as u32).map(RaCellSched::new).collect();
        tracing::info!("cell_cfg: {} cells configured, nof_cce={:?}", cells.len(), self.nof_cce);
        self.cells = cells;
        Ok(())
    }

    /// Adds a UE or replaces the configuration of an existing one
    pub fn ue_cfg(&mut self, rnti: Rnti, cfg: UeCfg) -> Result<(), SchedError> {
        if self.cells.is_empty() {
            return Err(SchedError::CellNotConfigured);
        }
        if !(MIN_CRNTI..=MAX_CRNTI).contains(&rnti) {
            return Err(SchedError::InvalidRnti(rnti));
        }
        cfg.validate(self.cells.len()).map_err(|reason| SchedError::InvalidUeCfg { rnti, reason })?;

        match self.ues.get_mut(&rnti) {
            Some(ue) => {
                tracing::debug!("ue_cfg: reconfiguring rnti=0x{:x}", rnti);
                ue.set_cfg(cfg, &self.cells, self.timing);
            }
            None => {
                tracing::info!("ue_cfg: adding rnti=0x{:x}", rnti);
                self.ues.insert(rnti, SchedUe::new(rnti, cfg, &self.cells, self.timing));
            }
        }
        Ok(())
    }

    pub fn ue_rem(&mut self, rnti: Rnti) -> Result<(), SchedError> {
        self.ues.remove(&rnti).ok_or(SchedError::UnknownRnti(rnti))?;
        for ra in self.ra_cells.iter_mut() {
            ra.remove_ue(rnti);
        }
        tracing::info!("ue_rem: removed rnti=0x{:x}", rnti);
        Ok(())
    }

    pub fn ue_exists(&self, rnti: Rnti) -> bool {
        self.ues.contains_key(&rnti)
    }

    fn ue_mut(&mut self, rnti: Rnti) -> Result<&mut SchedUe, SchedError> {
        self.ues.get_mut(&rnti).ok_or(SchedError::UnknownRnti(rnti))
    }

    fn check_lcid(lcid: u32) -> Result<usize, SchedError> {
        if lcid as usize >= MAX_NOF_LCIDS {
            return Err(SchedError::InvalidLcid(lcid));
        }
        Ok(lcid as usize)
    }

    pub fn bearer_ue_cfg(&mut self, rnti: Rnti, lcid: u32, cfg: BearerCfg) -> Result<(), SchedError> {
        let lcid = Self::check_lcid(lcid)?;
        if cfg.group as usize >= MAX_NOF_LCGS {
            return Err(SchedError::InvalidLcg(cfg.group));
        }
        self.ue_mut(rnti)?.set_bearer_cfg(lcid, cfg);
        Ok(())
    }

    pub fn bearer_ue_rem(&mut self, rnti: Rnti, lcid: u32) -> Result<(), SchedError> {
        let lcid = Self::check_lcid(lcid)?;
        self.ue_mut(rnti)?.rem_bearer(lcid);
        Ok(())
    }

    /// Absolute amount of DL data queued by RLC for a bearer
    pub fn dl_rlc_buffer_state(&mut self, rnti: Rnti, lcid: u32, tx_queue: u32, retx_queue: u32) -> Result<(), SchedError> {
        let lcid_idx = Self::check_lcid(lcid)?;
        let ue = self.ue_mut(rnti)?;
        if !ue.cfg().ue_bearers[lcid_idx].direction.includes_dl() {
            return Err(SchedError::BearerNotConfigured { rnti, lcid });
        }
        ue.dl_buffer_state(lcid_idx, tx_queue, retx_queue);
        Ok(())
    }

    /// Preamble detected on cell `enb_cc_idx`. The UE must have been added with
    /// the temporary C-RNTI beforehand.
    pub fn dl_rach_info(&mut self, enb_cc_idx: u32, rach: RachInfo) -> Result<(), SchedError> {
        let cell = self.cells.get(enb_cc_idx as usize).ok_or(SchedError::UnknownCell(enb_cc_idx))?;
        let rar_window = cell.prach_rar_window;
        let rnti = rach.temp_crnti;
        let ue = self.ues.get_mut(&rnti).ok_or(SchedError::UnknownRnti(rnti))?;
        if ue.cfg().pcell_enb_cc_idx() != Some(enb_cc_idx) {
            return Err(SchedError::CarrierNotConfigured { rnti, enb_cc_idx });
        }
        ue.start_ra(rach, enb_cc_idx)?;
        self.ra_cells[enb_cc_idx as usize].add_rach(rach, rar_window);
        Ok(())
    }

    fn carrier_idx(&self, rnti: Rnti, enb_cc_idx: u32) -> Result<usize, SchedError> {
        if enb_cc_idx as usize >= self.cells.len() {
            return Err(SchedError::UnknownCell(enb_cc_idx));
        }
        let ue = self.ues.get(&rnti).ok_or(SchedError::UnknownRnti(rnti))?;
        ue.ue_cc_idx(enb_cc_idx).ok_or(SchedError::CarrierNotConfigured { rnti, enb_cc_idx })
    }

    /// HARQ ACK for the PDSCH acknowledged at `tti_rx`. Returns the HARQ pid.
    pub fn dl_ack_info(&mut self, tti_rx: TtiPoint, rnti: Rnti, enb_cc_idx: u32, tb_idx: u32, ack: bool) -> Result<u32, SchedError> {
        let ue_cc_idx = self.carrier_idx(rnti, enb_cc_idx)?;
        if tb_idx != 0 {
            return Err(HarqError::InvalidTb { tb_idx }.into());
        }
        let carrier = self.ue_mut(rnti)?.carrier_mut(ue_cc_idx).ok_or(SchedError::CarrierNotConfigured { rnti, enb_cc_idx })?;
        let (pid, _) = carrier.harq.dl_ack_info(tti_rx, ack)?;
        tracing::trace!(tti = tti_rx.to_uint(), "<- dl_ack_info: rnti=0x{:x} cc={} pid={} ack={}", rnti, enb_cc_idx, pid, ack);
        Ok(pid)
    }

    /// CRC of the PUSCH received at `tti_rx`. Returns the HARQ pid.
    /// A decoded Msg3 makes the contention resolution pending.
    pub fn ul_crc_info(&mut self, tti_rx: TtiPoint, rnti: Rnti, enb_cc_idx: u32, crc: bool) -> Result<u32, SchedError> {
        let ue_cc_idx = self.carrier_idx(rnti, enb_cc_idx)?;
        let ue = self.ue_mut(rnti)?;
        let carrier = ue.carrier_mut(ue_cc_idx).ok_or(SchedError::CarrierNotConfigured { rnti, enb_cc_idx })?;
        let (pid, is_msg3) = carrier.harq.ul_crc_info(tti_rx, crc)?;
        tracing::trace!(tti = tti_rx.to_uint(), "<- ul_crc_info: rnti=0x{:x} cc={} pid={} crc={}", rnti, enb_cc_idx, pid, crc);
        if is_msg3 && crc {
            if let Some(ra) = ue.ra_mut() {
                ra.on_msg3_decoded()?;
                tracing::debug!("ul_crc_info: rnti=0x{:x} Msg3 decoded, contention resolution pending", rnti);
            }
        }
        Ok(pid)
    }

    pub fn dl_cqi_info(&mut self, tti_rx: TtiPoint, rnti: Rnti, enb_cc_idx: u32, cqi: u32) -> Result<(), SchedError> {
        let ue_cc_idx = self.carrier_idx(rnti, enb_cc_idx)?;
        tracing::trace!(tti = tti_rx.to_uint(), "<- dl_cqi_info: rnti=0x{:x} cc={} cqi={}", rnti, enb_cc_idx, cqi);
        self.ue_mut(rnti)?.set_dl_cqi(ue_cc_idx, cqi);
        Ok(())
    }

    pub fn ul_snr_info(&mut self, tti_rx: TtiPoint, rnti: Rnti, enb_cc_idx: u32, snr_db: f32) -> Result<(), SchedError> {
        let ue_cc_idx = self.carrier_idx(rnti, enb_cc_idx)?;
        tracing::trace!(tti = tti_rx.to_uint(), "<- ul_snr_info: rnti=0x{:x} cc={} snr={:.1}", rnti, enb_cc_idx, snr_db);
        self.ue_mut(rnti)?.set_ul_snr(ue_cc_idx, snr_db);
        Ok(())
    }

    /// Buffer status report, absolute bytes pending in a logical channel group
    pub fn ul_bsr(&mut self, rnti: Rnti, lcg: u32, bytes: u32) -> Result<(), SchedError> {
        if lcg as usize >= MAX_NOF_LCGS {
            return Err(SchedError::InvalidLcg(lcg));
        }
        self.ue_mut(rnti)?.ul_bsr(lcg as usize, bytes);
        Ok(())
    }

    pub fn ul_sr_info(&mut self, tti_rx: TtiPoint, rnti: Rnti) -> Result<(), SchedError> {
        tracing::trace!(tti = tti_rx.to_uint(), "<- ul_sr_info: rnti=0x{:x}", rnti);
        self.ue_mut(rnti)?.ul_sr();
        Ok(())
    }

    /// Decides every grant of receive-TTI `tti_rx`, on all carriers
    pub fn run_tti(&mut self, tti_rx: TtiPoint) -> SfSchedResult {
        let mut result = SfSchedResult::new(tti_rx, self.cells.len(), self.args.cfi);
        for (cc, cell) in self.cells.iter().enumerate() {
            let ctx = CellCtx {
                enb_cc_idx: cc as u32,
                cell,
                args: &self.args,
                timing: &self.timing,
                phy: self.phy.as_ref(),
            };
            let mut grid = SfGrid::new(tti_rx, cell, self.nof_cce[cc]);
            let dl = &mut result.dl_cc_result[cc];
            let ul = &mut result.ul_cc_result[cc];
            let ra = &mut self.ra_cells[cc];

            bc::schedule_bc(&ctx, &mut grid, dl);
            ra.schedule_rars(&ctx, &mut grid, &mut self.ues, dl);
            ul_alloc::schedule_msg3(&ctx, &mut grid, ra, &mut self.ues, ul);
            ul_alloc::schedule_ul_harq(&ctx, &mut grid, &mut self.ues, ul);
            dl_alloc::schedule_dl_retxs(&ctx, &mut grid, &mut self.ues, dl);
            ul_alloc::schedule_ul_resumes(&ctx, &mut grid, &mut self.ues, ul);
            dl_alloc::schedule_dl_newtxs(&ctx, &mut grid, &mut self.ues, dl);
            ul_alloc::schedule_ul_newtxs(&ctx, &mut grid, &mut self.ues, ul);

            tracing::trace!(
                tti = tti_rx.to_uint(),
                "-> run_tti: cc={} pdsch={} rar={} bc={} pusch={} phich={} cce_left={}",
                cc,
                dl.data.len(),
                dl.rar.len(),
                dl.bc.len(),
                ul.pusch.len(),
                ul.phich.len(),
                grid.pdcch().nof_cce_left()
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::PhichValue;
    use enb_core::Direction;

    fn sched() -> Scheduler {
        let mut sched = Scheduler::new(HarqTiming::FDD, SchedArgs::default()).unwrap();
        sched.cell_cfg(vec![CellCfg::new(25)]).unwrap();
        sched
    }

    #[test]
    fn test_input_errors() {
        let mut sched = Scheduler::new(HarqTiming::FDD, SchedArgs::default()).unwrap();
        assert_eq!(sched.ue_cfg(0x46, UeCfg::default()), Err(SchedError::CellNotConfigured));
        sched.cell_cfg(vec![CellCfg::new(25)]).unwrap();

        assert_eq!(sched.ue_cfg(0x10, UeCfg::default()), Err(SchedError::InvalidRnti(0x10)));
        assert_eq!(sched.ue_rem(0x46), Err(SchedError::UnknownRnti(0x46)));
        sched.ue_cfg(0x46, UeCfg::default()).unwrap();
        assert!(sched.ue_exists(0x46));

        assert_eq!(sched.dl_rlc_buffer_state(0x46, 11, 10, 0), Err(SchedError::InvalidLcid(11)));
        assert_eq!(
            sched.dl_rlc_buffer_state(0x46, 3, 10, 0),
            Err(SchedError::BearerNotConfigured { rnti: 0x46, lcid: 3 })
        );
        sched.bearer_ue_cfg(0x46, 3, BearerCfg { direction: Direction::Dl, group: 1, priority: 3 }).unwrap();
        assert!(sched.dl_rlc_buffer_state(0x46, 3, 10, 0).is_ok());
        assert_eq!(sched.ul_bsr(0x46, 4, 10), Err(SchedError::InvalidLcg(4)));
        assert_eq!(sched.dl_cqi_info(TtiPoint::new(0), 0x46, 1, 10), Err(SchedError::UnknownCell(1)));

        // No PDSCH was sent, there is nothing to acknowledge
        assert!(matches!(sched.dl_ack_info(TtiPoint::new(8), 0x46, 0, 0, true), Err(SchedError::Harq(_))));
    }

    #[test]
    fn test_rach_requires_ue() {
        let mut sched = sched();
        let rach = RachInfo { prach_tti: TtiPoint::new(10), preamble_idx: 3, temp_crnti: 0x46, msg3_size: 7 };
        assert_eq!(sched.dl_rach_info(0, rach), Err(SchedError::UnknownRnti(0x46)));
        sched.ue_cfg(0x46, UeCfg::default()).unwrap();
        sched.dl_rach_info(0, rach).unwrap();
        assert!(matches!(sched.dl_rach_info(0, rach), Err(SchedError::Ra(RaError::AlreadyInProgress { .. }))));
    }

    #[test]
    fn test_cell_reconfiguration_drops_ues() {
        let mut sched = sched();
        sched.ue_cfg(0x46, UeCfg::default()).unwrap();
        sched.cell_cfg(vec![CellCfg::new(50)]).unwrap();
        assert_eq!(sched.nof_ues(), 0);
    }

    #[test]
    fn test_idle_ue_gets_no_grant() {
        let mut sched = sched();
        sched.ue_cfg(0x46, UeCfg::default()).unwrap();
        sched.dl_rlc_buffer_state(0x46, 0, 100, 0).unwrap();
        sched.ul_bsr(0x46, 0, 100).unwrap();
        for tti in 0..40 {
            let res = sched.run_tti(TtiPoint::new(tti));
            assert!(res.find_pdsch(0, 0x46).is_none());
            assert!(res.find_pusch(0, 0x46).is_none());
        }
    }

    #[test]
    fn test_ra_procedure_through_run_tti() {
        enb_core::debug::setup_logging_verbose();
        let mut sched = sched();
        let timing = *sched.timing();
        sched.ue_cfg(0x46, UeCfg::default()).unwrap();
        let rach = RachInfo { prach_tti: TtiPoint::new(100), preamble_idx: 7, temp_crnti: 0x46, msg3_size: 7 };
        sched.dl_rach_info(0, rach).unwrap();

        let mut rar_tti = None;
        let mut msg3_tti: Option<TtiPoint> = None;
        let mut msg4_tti = None;
        for t in 96..130 {
            let tti_rx = TtiPoint::new(t);
            if msg3_tti.is_some_and(|m| timing.to_tx_ul(m) == tti_rx) {
                assert!(sched.ul_crc_info(tti_rx, 0x46, 0, true).is_ok());
            }
            if msg4_tti.is_some_and(|m| timing.to_tx_dl_ack(m) == tti_rx) {
                assert!(sched.dl_ack_info(tti_rx, 0x46, 0, 0, true).is_ok());
            }
            let res = sched.run_tti(tti_rx);
            let pusch = res.find_pusch(0, 0x46);
            let phich = res.find_phich(0, 0x46);

            if !res.dl_cc_result[0].rar.is_empty() {
                assert!(rar_tti.is_none());
                rar_tti = Some(tti_rx);
            }
            if let Some(p) = pusch {
                // The only PUSCH of the procedure is the Msg3, sent once
                assert!(msg3_tti.is_none());
                assert_eq!(Some(tti_rx), rar_tti.map(|r| r + timing.msg3_delay));
                assert_eq!(p.current_tx_nb, 0);
                assert!(!p.needs_pdcch);
                msg3_tti = Some(tti_rx);
            }
            // Msg3 is acknowledged one round trip after it was granted, never earlier
            let phich_due = msg3_tti.is_some_and(|m| m + timing.nof_harq_procs() == tti_rx);
            assert_eq!(phich.is_some(), phich_due, "tti_rx={} phich={:?}", tti_rx, phich);
            if phich_due {
                assert_eq!(phich.map(|p| p.phich), Some(PhichValue::Ack));
            }
            if let Some(d) = res.find_pdsch(0, 0x46) {
                assert!(msg4_tti.is_none());
                assert_eq!(d.dci.format, enb_core::DciFormat::Format1A);
                assert_eq!(d.pdus[0][0].lcid, enb_core::CONRES_CE_LCID);
                msg4_tti = Some(tti_rx);
            }
        }

        assert!(rar_tti.is_some());
        let msg3_tti = msg3_tti.unwrap();
        assert!(msg4_tti.unwrap() >= timing.to_tx_ul(msg3_tti));
        let ue = sched.ue(0x46).unwrap();
        assert!(ue.is_connected());
        assert_eq!(ue.ra().and_then(|ra| ra.msg4_tti_rx()), msg4_tti);
    }

    #[test]
    fn test_invalid_sched_config_rejected() {
        let timing = HarqTiming { ul_harq_delay: 0, ..HarqTiming::FDD };
        assert!(matches!(Scheduler::new(timing, SchedArgs::default()), Err(SchedError::InvalidSchedCfg(_))));

        let args = SchedArgs { cfi: 4, ..SchedArgs::default() };
        assert!(matches!(Scheduler::new(HarqTiming::FDD, args), Err(SchedError::InvalidSchedCfg(_))));

        let mut cfg = EnbConfig::new(25);
        cfg.sched.cfi = 0;
        assert!(matches!(Scheduler::from_config(&cfg), Err(SchedError::InvalidSchedCfg(_))));
    }
}
