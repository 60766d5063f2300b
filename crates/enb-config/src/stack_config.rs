use std::sync::Arc;

use enb_core::{CyclicPrefix, Direction, HarqTiming, MAX_NOF_LCGS, MAX_NOF_LCIDS, PhichLength, PhichResources, TransmissionMode};

use crate::stack_config_pcap::CfgPcap;
use crate::stack_config_sim::CfgSim;

/// Bandwidths (in PRBs) an LTE carrier can be configured with
pub const VALID_NOF_PRB: [u32; 6] = [6, 15, 25, 50, 75, 100];

/// Physical cell parameters the scheduler needs
#[derive(Debug, Clone, PartialEq)]
pub struct PhyCellCfg {
    pub id: u32,
    pub nof_prb: u32,
    pub cp: CyclicPrefix,
    pub nof_ports: u32,
    pub phich_length: PhichLength,
    pub phich_resources: PhichResources,
}

/// System information block. Index 0 of the list is SIB1.
#[derive(Debug, Clone, PartialEq)]
pub struct SibCfg {
    /// Length in bytes, 0 disables the SIB
    pub len: u32,
    /// Periodicity in radio frames
    pub period_rf: u32,
}

/// Per-carrier scheduler configuration. Immutable after the scheduler is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct CellCfg {
    pub phy: PhyCellCfg,
    pub sibs: Vec<SibCfg>,
    pub si_window_ms: u32,
    /// PRBs reserved for PUCCH at each edge of the UL band
    pub nrb_pucch: u32,
    pub prach_freq_offset: u32,
    /// RAR window length in subframes
    pub prach_rar_window: u32,
    /// Maximum number of Msg3 transmissions
    pub maxharq_msg3tx: u32,
    pub initial_dl_cqi: u32,
}

impl CellCfg {
    /// Single-antenna FDD carrier with SIB1 and one SI message
    pub fn new(nof_prb: u32) -> Self {
        CellCfg {
            phy: PhyCellCfg {
                id: 1,
                nof_prb,
                cp: CyclicPrefix::Normal,
                nof_ports: 1,
                phich_length: PhichLength::Normal,
                phich_resources: PhichResources::One,
            },
            sibs: vec![SibCfg { len: 18, period_rf: 8 }, SibCfg { len: 41, period_rf: 16 }],
            si_window_ms: 40,
            nrb_pucch: 2,
            prach_freq_offset: if nof_prb == 6 { 0 } else { 2 },
            prach_rar_window: 3,
            maxharq_msg3tx: 3,
            initial_dl_cqi: 5,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !VALID_NOF_PRB.contains(&self.phy.nof_prb) {
            return Err("cell nof_prb must be one of 6, 15, 25, 50, 75, 100");
        }
        if ![1, 2, 4].contains(&self.phy.nof_ports) {
            return Err("cell nof_ports must be 1, 2 or 4");
        }
        if 2 * self.nrb_pucch >= self.phy.nof_prb {
            return Err("nrb_pucch leaves no PRBs for PUSCH");
        }
        if self.prach_freq_offset + 6 > self.phy.nof_prb {
            return Err("PRACH does not fit in the UL band");
        }
        if !(2..=10).contains(&self.prach_rar_window) {
            return Err("prach_rar_window must be between 2 and 10 subframes");
        }
        if self.maxharq_msg3tx == 0 || self.maxharq_msg3tx > 8 {
            return Err("maxharq_msg3tx must be between 1 and 8");
        }
        if self.initial_dl_cqi > 15 {
            return Err("initial_dl_cqi must be a valid CQI (0..15)");
        }
        if ![1, 2, 5, 10, 15, 20, 40].contains(&self.si_window_ms) {
            return Err("si_window_ms must be one of 1, 2, 5, 10, 15, 20, 40");
        }
        for sib in &self.sibs {
            if sib.len > 0 && ![8, 16, 32, 64, 128, 256, 512].contains(&sib.period_rf) {
                return Err("SIB period_rf must be a power of two between 8 and 512 frames");
            }
        }
        Ok(())
    }
}

/// Per-carrier entry of a UE configuration. The position in the list is the
/// UE-local carrier index, position 0 is the PCell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UeCcCfg {
    pub enb_cc_idx: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BearerCfg {
    pub direction: Direction,
    /// Logical channel group used for BSR reporting
    pub group: u32,
    pub priority: u32,
}

/// UE configuration, replaced as a whole on reconfiguration
#[derive(Debug, Clone, PartialEq)]
pub struct UeCfg {
    pub supported_cc_list: Vec<UeCcCfg>,
    /// Maximum number of HARQ transmissions, first transmission included
    pub maxharq_tx: u32,
    pub ue_bearers: [BearerCfg; MAX_NOF_LCIDS],
    /// Measurement gap period in ms, 0 disables gaps
    pub measgap_period: u32,
    pub measgap_offset: u32,
    pub dl_tm: TransmissionMode,
    /// 256QAM MCS/TBS table
    pub use_tbs_index_alt: bool,
    pub aperiodic_cqi_period: u32,
}

impl Default for UeCfg {
    /// One active carrier on eNB cell 0 with SRB0 configured
    fn default() -> Self {
        let mut ue_bearers = [BearerCfg::default(); MAX_NOF_LCIDS];
        ue_bearers[0].direction = Direction::Both;
        UeCfg {
            supported_cc_list: vec![UeCcCfg { enb_cc_idx: 0, active: true }],
            maxharq_tx: 5,
            ue_bearers,
            measgap_period: 0,
            measgap_offset: 0,
            dl_tm: TransmissionMode::Tm1,
            use_tbs_index_alt: false,
            aperiodic_cqi_period: 40,
        }
    }
}

impl UeCfg {
    pub fn pcell_enb_cc_idx(&self) -> Option<u32> {
        self.supported_cc_list.first().map(|cc| cc.enb_cc_idx)
    }

    /// UE-local carrier index of eNB carrier `enb_cc_idx`, if the UE supports it
    pub fn enb_to_ue_cc_idx(&self, enb_cc_idx: u32) -> Option<usize> {
        self.supported_cc_list.iter().position(|cc| cc.enb_cc_idx == enb_cc_idx)
    }

    pub fn cc_cfg(&self, enb_cc_idx: u32) -> Option<&UeCcCfg> {
        self.supported_cc_list.iter().find(|cc| cc.enb_cc_idx == enb_cc_idx)
    }

    pub fn validate(&self, nof_cells: usize) -> Result<(), &'static str> {
        if self.supported_cc_list.is_empty() {
            return Err("UE must support at least one carrier");
        }
        for (i, cc) in self.supported_cc_list.iter().enumerate() {
            if cc.enb_cc_idx as usize >= nof_cells {
                return Err("UE carrier refers to an unconfigured cell");
            }
            if self.supported_cc_list[..i].iter().any(|other| other.enb_cc_idx == cc.enb_cc_idx) {
                return Err("UE carrier list contains a cell twice");
            }
        }
        if self.maxharq_tx == 0 || self.maxharq_tx > 28 {
            return Err("maxharq_tx must be between 1 and 28");
        }
        if self.measgap_period != 0 {
            if self.measgap_period != 40 && self.measgap_period != 80 {
                return Err("measgap_period must be 0, 40 or 80");
            }
            if self.measgap_offset >= self.measgap_period {
                return Err("measgap_offset must be smaller than measgap_period");
            }
        }
        if self.ue_bearers.iter().any(|b| b.group as usize >= MAX_NOF_LCGS) {
            return Err("bearer group must be a valid LCG (0..3)");
        }
        Ok(())
    }
}

/// Scheduler-wide tunables
#[derive(Debug, Clone, PartialEq)]
pub struct SchedArgs {
    /// Control format indicator used in every subframe
    pub cfi: u32,
    /// PDCCH aggregation level index, a DCI takes 2^aggr_level CCEs
    pub pdcch_aggr_level: u32,
    pub pdsch_max_mcs: u32,
    pub pusch_max_mcs: u32,
    /// MCS signalled in the RAR UL grant
    pub msg3_mcs: u32,
    /// Upper bound of PRBs handed to one UE in a TTI, 0 means no bound
    pub max_nof_prb_per_ue: u32,
}

impl Default for SchedArgs {
    fn default() -> Self {
        SchedArgs {
            cfi: 3,
            pdcch_aggr_level: 1,
            pdsch_max_mcs: 28,
            pusch_max_mcs: 28,
            msg3_mcs: 0,
            max_nof_prb_per_ue: 0,
        }
    }
}

impl SchedArgs {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(1..=3).contains(&self.cfi) {
            return Err("cfi must be between 1 and 3");
        }
        if self.pdcch_aggr_level > 3 {
            return Err("pdcch_aggr_level must be between 0 and 3");
        }
        if self.pdsch_max_mcs > 28 || self.pusch_max_mcs > 28 {
            return Err("max MCS must be at most 28");
        }
        if self.msg3_mcs > 10 {
            return Err("msg3_mcs must be a QPSK MCS (0..10)");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EnbConfig {
    pub debug_log: Option<String>,
    pub timing: HarqTiming,
    pub sched: SchedArgs,
    pub cells: Vec<CellCfg>,

    /// MAC PCAP export over UDP
    pub pcap: Option<CfgPcap>,
    /// Randomized scheduling scenario parameters
    pub sim: CfgSim,
}

impl EnbConfig {
    /// Configuration with one carrier of `nof_prb` PRBs and default tunables
    pub fn new(nof_prb: u32) -> Self {
        EnbConfig {
            debug_log: None,
            timing: HarqTiming::default(),
            sched: SchedArgs::default(),
            cells: vec![CellCfg::new(nof_prb)],
            pcap: None,
            sim: CfgSim::default(),
        }
    }

    /// Validate that all required configuration fields are properly set.
    pub fn validate(&self) -> Result<(), &'static str> {
        self.timing.validate()?;
        self.sched.validate()?;

        if self.cells.is_empty() {
            return Err("at least one cell must be configured");
        }
        for cell in &self.cells {
            cell.validate()?;
        }

        if let Some(ref pcap) = self.pcap {
            pcap.validate()?;
        }
        self.sim.validate()?;
        Ok(())
    }
}

/// Global shared configuration. Read-only once built, cloned cheaply across threads.
#[derive(Clone)]
pub struct SharedConfig {
    cfg: Arc<EnbConfig>,
}

impl SharedConfig {
    pub fn new(nof_prb: u32) -> Self {
        Self::from_config(EnbConfig::new(nof_prb))
    }

    /// Panics on an invalid configuration, use `try_from_config` for untrusted input
    pub fn from_config(cfg: EnbConfig) -> Self {
        match Self::try_from_config(cfg) {
            Ok(shared) => shared,
            Err(e) => panic!("Invalid eNB configuration: {}", e),
        }
    }

    pub fn try_from_config(cfg: EnbConfig) -> Result<Self, &'static str> {
        cfg.validate()?;
        Ok(Self { cfg: Arc::new(cfg) })
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<EnbConfig> {
        Arc::clone(&self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        for nof_prb in VALID_NOF_PRB {
            let cfg = EnbConfig::new(nof_prb);
            assert!(cfg.validate().is_ok(), "nof_prb={} rejected", nof_prb);
        }
    }

    #[test]
    fn test_invalid_cell_rejected() {
        let mut cfg = EnbConfig::new(25);
        cfg.cells[0].phy.nof_prb = 24;
        assert!(cfg.validate().is_err());

        let mut cfg = EnbConfig::new(6);
        cfg.cells[0].nrb_pucch = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_ue_cfg_validation() {
        let mut ue_cfg = UeCfg::default();
        assert!(ue_cfg.validate(1).is_ok());

        ue_cfg.measgap_period = 40;
        ue_cfg.measgap_offset = 40;
        assert!(ue_cfg.validate(1).is_err());
        ue_cfg.measgap_offset = 39;
        assert!(ue_cfg.validate(1).is_ok());

        ue_cfg.supported_cc_list.push(UeCcCfg { enb_cc_idx: 1, active: true });
        assert!(ue_cfg.validate(1).is_err());
        assert!(ue_cfg.validate(2).is_ok());
        assert_eq!(ue_cfg.enb_to_ue_cc_idx(1), Some(1));
        assert_eq!(ue_cfg.enb_to_ue_cc_idx(2), None);
    }
}
