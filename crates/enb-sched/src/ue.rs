//! Per-UE scheduling state

use enb_config::{BearerCfg, CellCfg, SchedArgs, UeCfg};
use enb_core::{CONRES_CE_LCID, CONRES_CE_LEN, HarqTiming, MAX_NOF_LCGS, MAX_NOF_LCIDS, Rnti, TtiPoint};

use crate::harq::HarqEntity;
use crate::meas_gap::MeasGap;
use crate::phy_helper::{MAX_MCS_ALT, cqi_to_mcs, snr_to_ul_mcs};
use crate::ra::{RaCtx, RaError, RachInfo};
use crate::result::PduElem;

/// UL SINR assumed until the PHY reports one
pub const DEFAULT_UL_SNR_DB: f32 = 10.0;
/// MAC subheader of a DL SDU
pub const SDU_SUBHEADER_LEN: u32 = 2;
/// Bytes asked for by a scheduling request with empty buffers
pub const SR_GRANT_BYTES: u32 = 64;

/// Scheduling state of one UE carrier
#[derive(Debug, Clone)]
pub struct UeCarrier {
    enb_cc_idx: u32,
    active: bool,
    pub harq: HarqEntity,
    dl_cqi: u32,
    ul_snr_db: f32,
    last_cqi_request: Option<TtiPoint>,
}

impl UeCarrier {
    fn new(enb_cc_idx: u32, active: bool, cell: &CellCfg, timing: HarqTiming) -> Self {
        UeCarrier {
            enb_cc_idx,
            active,
            harq: HarqEntity::new(timing),
            dl_cqi: cell.initial_dl_cqi,
            ul_snr_db: DEFAULT_UL_SNR_DB,
            last_cqi_request: None,
        }
    }

    pub fn enb_cc_idx(&self) -> u32 {
        self.enb_cc_idx
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn dl_cqi(&self) -> u32 {
        self.dl_cqi
    }

    pub fn ul_snr_db(&self) -> f32 {
        self.ul_snr_db
    }
}

#[derive(Debug, Clone)]
pub struct SchedUe {
    rnti: Rnti,
    cfg: UeCfg,
    /// Indexed by UE-local carrier index
    carriers: Vec<UeCarrier>,
    /// Pending DL bytes per LCID, new and retransmission queue summed
    dl_buffers: [u32; MAX_NOF_LCIDS],
    /// Last reported UL buffer per LCG
    ul_buffers: [u32; MAX_NOF_LCGS],
    sr_pending: bool,
    ra: Option<RaCtx>,
    meas_gap: MeasGap,
}

impl SchedUe {
    pub fn new(rnti: Rnti, cfg: UeCfg, cells: &[CellCfg], timing: HarqTiming) -> Self {
        let mut ue = SchedUe {
            rnti,
            cfg: UeCfg::default(),
            carriers: Vec::new(),
            dl_buffers: [0; MAX_NOF_LCIDS],
            ul_buffers: [0; MAX_NOF_LCGS],
            sr_pending: false,
            ra: None,
            meas_gap: MeasGap::new(0, 0),
        };
        ue.set_cfg(cfg, cells, timing);
        ue
    }

    /// Applies a new configuration. A carrier keeps its HARQ and channel state
    /// when the same eNB cell stays at the same UE-local index.
    pub fn set_cfg(&mut self, cfg: UeCfg, cells: &[CellCfg], timing: HarqTiming) {
        let mut old = std::mem::take(&mut self.carriers).into_iter().map(Some).collect::<Vec<_>>();
        for (ue_cc_idx, cc) in cfg.supported_cc_list.iter().enumerate() {
            let kept = old.get_mut(ue_cc_idx).and_then(|c| c.take_if(|c| c.enb_cc_idx == cc.enb_cc_idx));
            let carrier = match kept {
                Some(mut carrier) => {
                    if carrier.active && !cc.active {
                        tracing::debug!("set_cfg: rnti=0x{:x} cc={} deactivated", self.rnti, cc.enb_cc_idx);
                        carrier.harq.reset();
                    }
                    carrier.active = cc.active;
                    carrier
                }
                None => UeCarrier::new(cc.enb_cc_idx, cc.active, &cells[cc.enb_cc_idx as usize], timing),
            };
            self.carriers.push(carrier);
        }

        for lcid in 0..MAX_NOF_LCIDS {
            if !cfg.ue_bearers[lcid].direction.includes_dl() {
                self.dl_buffers[lcid] = 0;
            }
        }
        self.meas_gap = MeasGap::from_ue_cfg(&cfg);
        self.cfg = cfg;
    }

    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    pub fn cfg(&self) -> &UeCfg {
        &self.cfg
    }

    pub fn carriers(&self) -> &[UeCarrier] {
        &self.carriers
    }

    pub fn carrier(&self, ue_cc_idx: usize) -> Option<&UeCarrier> {
        self.carriers.get(ue_cc_idx)
    }

    pub fn carrier_mut(&mut self, ue_cc_idx: usize) -> Option<&mut UeCarrier> {
        self.carriers.get_mut(ue_cc_idx)
    }

    pub fn ue_cc_idx(&self, enb_cc_idx: u32) -> Option<usize> {
        self.cfg.enb_to_ue_cc_idx(enb_cc_idx)
    }

    /// Active carrier on eNB cell `enb_cc_idx`, with its UE-local index
    pub fn active_carrier_mut(&mut self, enb_cc_idx: u32) -> Option<(usize, &mut UeCarrier)> {
        let ue_cc_idx = self.ue_cc_idx(enb_cc_idx)?;
        let carrier = self.carriers.get_mut(ue_cc_idx)?;
        carrier.active.then_some((ue_cc_idx, carrier))
    }

    pub fn meas_gap(&self) -> &MeasGap {
        &self.meas_gap
    }

    /// Measurement gaps only concern the PCell
    pub fn dl_blocked_by_gap(&self, ue_cc_idx: usize, timing: &HarqTiming, tti_rx: TtiPoint) -> bool {
        ue_cc_idx == 0 && self.meas_gap.blocks_dl(timing, tti_rx)
    }

    pub fn ul_blocked_by_gap(&self, ue_cc_idx: usize, timing: &HarqTiming, tti_rx: TtiPoint) -> bool {
        ue_cc_idx == 0 && self.meas_gap.blocks_ul(timing, tti_rx)
    }

    pub fn ra(&self) -> Option<&RaCtx> {
        self.ra.as_ref()
    }

    pub fn ra_mut(&mut self) -> Option<&mut RaCtx> {
        self.ra.as_mut()
    }

    pub fn start_ra(&mut self, rach: RachInfo, enb_cc_idx: u32) -> Result<(), RaError> {
        if self.ra.is_some() {
            return Err(RaError::AlreadyInProgress { rnti: self.rnti });
        }
        self.ra = Some(RaCtx::new(rach, enb_cc_idx));
        Ok(())
    }

    pub fn reset_ra(&mut self) {
        self.ra = None;
    }

    pub fn is_conres_pending(&self) -> bool {
        self.ra.as_ref().is_some_and(RaCtx::is_conres_pending)
    }

    pub fn is_connected(&self) -> bool {
        self.ra.as_ref().is_some_and(RaCtx::is_connected)
    }

    /// Whether DL data may go to carrier `ue_cc_idx`. Only the Msg4 is
    /// allowed before the contention resolution, and only on the PCell.
    pub fn dl_allowed(&self, ue_cc_idx: usize) -> bool {
        self.is_connected() || (ue_cc_idx == 0 && self.is_conres_pending())
    }

    pub fn ul_newtx_allowed(&self, tti_rx: TtiPoint) -> bool {
        self.ra.as_ref().is_some_and(|ra| ra.allows_ul_newtx(tti_rx))
    }

    pub fn set_bearer_cfg(&mut self, lcid: usize, cfg: BearerCfg) {
        self.cfg.ue_bearers[lcid] = cfg;
        if !cfg.direction.includes_dl() {
            self.dl_buffers[lcid] = 0;
        }
    }

    pub fn rem_bearer(&mut self, lcid: usize) {
        self.cfg.ue_bearers[lcid] = BearerCfg::default();
        self.dl_buffers[lcid] = 0;
    }

    pub fn dl_buffer_state(&mut self, lcid: usize, tx_queue: u32, retx_queue: u32) {
        self.dl_buffers[lcid] = tx_queue + retx_queue;
    }

    pub fn dl_buffer(&self, lcid: usize) -> u32 {
        self.dl_buffers[lcid]
    }

    pub fn ul_bsr(&mut self, lcg: usize, bytes: u32) {
        self.ul_buffers[lcg] = bytes;
    }

    pub fn ul_sr(&mut self) {
        self.sr_pending = true;
    }

    pub fn pending_dl_bytes(&self) -> u32 {
        self.dl_buffers.iter().sum()
    }

    pub fn pending_ul_bytes(&self) -> u32 {
        let bsr: u32 = self.ul_buffers.iter().sum();
        if bsr == 0 && self.sr_pending { SR_GRANT_BYTES } else { bsr }
    }

    /// Bytes needed to empty the DL buffers, MAC subheaders included
    pub fn required_dl_bytes(&self, with_conres: bool) -> u32 {
        let ce = if with_conres { CONRES_CE_LEN + 1 } else { 0 };
        let sdus: u32 = self.dl_buffers.iter().filter(|b| **b > 0).map(|b| b + SDU_SUBHEADER_LEN).sum();
        ce + sdus
    }

    /// Fills a TB of `tbs` bytes: the contention resolution CE first, then the
    /// logical channels in LCID order. The buffers are left untouched until
    /// `consume_dl_pdus` commits the grant.
    pub fn plan_dl_pdus(&self, tbs: u32, with_conres: bool) -> Vec<PduElem> {
        let mut pdus = Vec::new();
        let mut rem = tbs;
        if with_conres && rem > CONRES_CE_LEN {
            pdus.push(PduElem { lcid: CONRES_CE_LCID, nbytes: CONRES_CE_LEN });
            rem -= CONRES_CE_LEN + 1;
        }
        for (lcid, buffer) in self.dl_buffers.iter().enumerate() {
            if *buffer == 0 || rem <= SDU_SUBHEADER_LEN {
                continue;
            }
            let nbytes = (*buffer).min(rem - SDU_SUBHEADER_LEN);
            pdus.push(PduElem { lcid: lcid as u32, nbytes });
            rem -= nbytes + SDU_SUBHEADER_LEN;
        }
        pdus
    }

    /// Removes the SDU bytes of a granted TB from the DL buffers
    pub fn consume_dl_pdus(&mut self, pdus: &[PduElem]) {
        for pdu in pdus {
            if let Some(buffer) = self.dl_buffers.get_mut(pdu.lcid as usize) {
                *buffer = buffer.saturating_sub(pdu.nbytes);
            }
        }
    }

    /// Removes the bytes of a new UL grant from the reported buffers
    pub fn consume_ul(&mut self, tbs: u32) {
        let mut rem = tbs;
        for buffer in self.ul_buffers.iter_mut() {
            let n = (*buffer).min(rem);
            *buffer -= n;
            rem -= n;
        }
        self.sr_pending = false;
    }

    pub fn set_dl_cqi(&mut self, ue_cc_idx: usize, cqi: u32) {
        if let Some(c) = self.carriers.get_mut(ue_cc_idx) {
            c.dl_cqi = cqi.min(15);
        }
    }

    pub fn set_ul_snr(&mut self, ue_cc_idx: usize, snr_db: f32) {
        if let Some(c) = self.carriers.get_mut(ue_cc_idx) {
            c.ul_snr_db = snr_db;
        }
    }

    pub fn dl_mcs(&self, ue_cc_idx: usize, args: &SchedArgs) -> u32 {
        let alt = self.cfg.use_tbs_index_alt;
        let cqi = self.carriers.get(ue_cc_idx).map_or(0, |c| c.dl_cqi);
        let max = if alt { args.pdsch_max_mcs.min(MAX_MCS_ALT) } else { args.pdsch_max_mcs };
        cqi_to_mcs(cqi, alt).min(max)
    }

    pub fn ul_mcs(&self, ue_cc_idx: usize, args: &SchedArgs) -> u32 {
        let snr = self.carriers.get(ue_cc_idx).map_or(DEFAULT_UL_SNR_DB, |c| c.ul_snr_db);
        snr_to_ul_mcs(snr).min(args.pusch_max_mcs)
    }

    /// Whether the UL grant sent at `tti_rx` should trigger an aperiodic CQI report
    pub fn take_cqi_request(&mut self, ue_cc_idx: usize, tti_rx: TtiPoint) -> bool {
        let period = self.cfg.aperiodic_cqi_period;
        let Some(c) = self.carriers.get_mut(ue_cc_idx) else {
            return false;
        };
        if period == 0 {
            return false;
        }
        let due = c.last_cqi_request.is_none_or(|last| tti_rx.diff(last) >= period as i32);
        if due {
            c.last_cqi_request = Some(tti_rx);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enb_config::UeCcCfg;
    use enb_core::Direction;

    fn cells() -> Vec<CellCfg> {
        vec![CellCfg::new(25), CellCfg::new(25)]
    }

    #[test]
    fn test_pack_with_conres() {
        let mut ue = SchedUe::new(0x46, UeCfg::default(), &cells(), HarqTiming::FDD);
        ue.dl_buffer_state(0, 20, 0);
        assert_eq!(ue.required_dl_bytes(true), 7 + 22);

        let pdus = ue.plan_dl_pdus(15, true);
        assert_eq!(pdus, vec![PduElem { lcid: 28, nbytes: 6 }, PduElem { lcid: 0, nbytes: 6 }]);
        assert_eq!(ue.dl_buffer(0), 20);
        ue.consume_dl_pdus(&pdus);
        assert_eq!(ue.dl_buffer(0), 14);

        let pdus = ue.plan_dl_pdus(100, false);
        assert_eq!(pdus, vec![PduElem { lcid: 0, nbytes: 14 }]);
        ue.consume_dl_pdus(&pdus);
        assert_eq!(ue.pending_dl_bytes(), 0);
    }

    #[test]
    fn test_reconfiguration_keeps_harq() {
        let timing = HarqTiming::FDD;
        let mut ue = SchedUe::new(0x46, UeCfg::default(), &cells(), timing);
        ue.set_dl_cqi(0, 12);

        let mut cfg = UeCfg::default();
        cfg.supported_cc_list.push(UeCcCfg { enb_cc_idx: 1, active: true });
        cfg.ue_bearers[2].direction = Direction::Both;
        ue.set_cfg(cfg, &cells(), timing);
        assert_eq!(ue.carriers().len(), 2);
        assert_eq!(ue.carrier(0).unwrap().dl_cqi(), 12);
        assert_eq!(ue.carrier(1).unwrap().dl_cqi(), cells()[1].initial_dl_cqi);

        // Swapping the cells resets both carriers
        let mut cfg = UeCfg::default();
        cfg.supported_cc_list = vec![UeCcCfg { enb_cc_idx: 1, active: true }, UeCcCfg { enb_cc_idx: 0, active: true }];
        ue.set_cfg(cfg, &cells(), timing);
        assert_eq!(ue.carrier(1).unwrap().dl_cqi(), cells()[0].initial_dl_cqi);
    }

    #[test]
    fn test_ul_buffers_and_sr() {
        let mut ue = SchedUe::new(0x46, UeCfg::default(), &cells(), HarqTiming::FDD);
        assert_eq!(ue.pending_ul_bytes(), 0);
        ue.ul_sr();
        assert_eq!(ue.pending_ul_bytes(), SR_GRANT_BYTES);
        ue.ul_bsr(1, 100);
        assert_eq!(ue.pending_ul_bytes(), 100);
        ue.consume_ul(60);
        assert_eq!(ue.pending_ul_bytes(), 40);
    }

    #[test]
    fn test_cqi_request_period() {
        let mut ue = SchedUe::new(0x46, UeCfg::default(), &cells(), HarqTiming::FDD);
        assert!(ue.take_cqi_request(0, TtiPoint::new(10)));
        assert!(!ue.take_cqi_request(0, TtiPoint::new(49)));
        assert!(ue.take_cqi_request(0, TtiPoint::new(50)));
    }
}
