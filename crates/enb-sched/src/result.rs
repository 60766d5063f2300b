//! Grant records produced by one scheduling pass
//!
//! Everything here is created fresh in `Scheduler::run_tti` and handed to the
//! PHY (and to the result checker) by value.

use enb_core::{DciFormat, Rnti, TtiPoint};

use crate::prb::PrbInterval;

/// PDCCH position of a DCI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CceLocation {
    pub ncce: u32,
    /// Aggregation level index, the DCI spans 2^aggr_level CCEs
    pub aggr_level: u32,
}

/// Per transport block DCI fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TbDci {
    pub enabled: bool,
    pub mcs: u32,
    pub rv: u32,
    pub ndi: bool,
}

/// One MAC subPDU in a DL transport block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduElem {
    pub lcid: u32,
    pub nbytes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DlDci {
    pub rnti: Rnti,
    pub format: DciFormat,
    pub pid: u32,
    pub ue_cc_idx: u32,
    pub tb: [TbDci; 2],
    pub prbs: PrbInterval,
    pub cce: CceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DlSchedData {
    pub dci: DlDci,
    /// TBS in bytes, per transport block
    pub tbs: [u32; 2],
    pub pdus: [Vec<PduElem>; 2],
}

/// Contents of one MAC RAR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarData {
    pub prach_tti: TtiPoint,
    pub preamble_idx: u32,
    pub temp_crnti: Rnti,
}

/// Msg3 UL grant carried in a MAC RAR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarUlGrant {
    pub riv: u32,
    pub mcs: u32,
    pub prbs: PrbInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarMsg3Grant {
    pub data: RarData,
    pub grant: RarUlGrant,
}

/// Broadcast-style DL DCI (RA-RNTI, SI-RNTI), always Format1A with a single TB
#[derive(Debug, Clone, PartialEq)]
pub struct BcDci {
    pub rnti: Rnti,
    pub mcs: u32,
    pub rv: u32,
    pub prbs: PrbInterval,
    pub cce: CceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RarGrant {
    pub ra_rnti: Rnti,
    pub dci: BcDci,
    pub tbs: u32,
    pub msg3_grant: Vec<RarMsg3Grant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BcGrant {
    /// SIB index, 0 is SIB1
    pub index: u32,
    pub dci: BcDci,
    pub tbs: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DlSchedResult {
    pub cfi: u32,
    pub data: Vec<DlSchedData>,
    pub rar: Vec<RarGrant>,
    pub bc: Vec<BcGrant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UlDci {
    pub rnti: Rnti,
    pub pid: u32,
    pub ue_cc_idx: u32,
    pub riv: u32,
    pub prbs: PrbInterval,
    pub tb: TbDci,
    /// None for grants that are not signalled on the PDCCH (Msg3, non-adaptive retx)
    pub cce: Option<CceLocation>,
    pub cqi_request: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UlSchedData {
    pub dci: UlDci,
    pub tbs: u32,
    pub needs_pdcch: bool,
    /// Number of earlier transmissions of this TB
    pub current_tx_nb: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhichValue {
    Ack,
    Nack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhichElem {
    pub rnti: Rnti,
    pub phich: PhichValue,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UlSchedResult {
    pub pusch: Vec<UlSchedData>,
    pub phich: Vec<PhichElem>,
}

/// All grants decided for one receive-TTI, indexed by eNB carrier
#[derive(Debug, Clone, PartialEq)]
pub struct SfSchedResult {
    pub tti_rx: TtiPoint,
    pub dl_cc_result: Vec<DlSchedResult>,
    pub ul_cc_result: Vec<UlSchedResult>,
}

impl SfSchedResult {
    pub fn new(tti_rx: TtiPoint, nof_cells: usize, cfi: u32) -> Self {
        SfSchedResult {
            tti_rx,
            dl_cc_result: (0..nof_cells).map(|_| DlSchedResult { cfi, ..Default::default() }).collect(),
            ul_cc_result: vec![UlSchedResult::default(); nof_cells],
        }
    }

    pub fn find_pdsch(&self, enb_cc_idx: usize, rnti: Rnti) -> Option<&DlSchedData> {
        self.dl_cc_result.get(enb_cc_idx)?.data.iter().find(|d| d.dci.rnti == rnti)
    }

    pub fn find_pusch(&self, enb_cc_idx: usize, rnti: Rnti) -> Option<&UlSchedData> {
        self.ul_cc_result.get(enb_cc_idx)?.pusch.iter().find(|p| p.dci.rnti == rnti)
    }

    pub fn find_phich(&self, enb_cc_idx: usize, rnti: Rnti) -> Option<&PhichElem> {
        self.ul_cc_result.get(enb_cc_idx)?.phich.iter().find(|p| p.rnti == rnti)
    }

    pub fn nof_grants(&self) -> usize {
        let dl: usize = self.dl_cc_result.iter().map(|r| r.data.len() + r.rar.len() + r.bc.len()).sum();
        let ul: usize = self.ul_cc_result.iter().map(|r| r.pusch.len()).sum();
        dl + ul
    }
}
