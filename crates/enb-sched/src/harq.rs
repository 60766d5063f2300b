use std::fmt;

use enb_core::{DciFormat, HarqTiming, TtiPoint};

use crate::prb::PrbInterval;
use crate::result::PduElem;

/// Redundancy version used by the n-th transmission of a TB
pub const RV_SEQ: [u32; 4] = [0, 2, 3, 1];

/// RV of the transmission that follows `nof_retxs` retransmissions
#[inline]
pub fn get_rvidx(nof_retxs: u32) -> u32 {
    RV_SEQ[(nof_retxs % 4) as usize]
}

/// Inverse of `get_rvidx`, position of `rv` in the RV cycle
pub fn get_nof_retx(rv: u32) -> Option<u32> {
    RV_SEQ.iter().position(|r| *r == rv).map(|p| p as u32)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarqError {
    /// New transmission requested on a process that still holds a TB
    Busy { pid: u32 },
    /// Retransmission or feedback on a process without a TB
    Idle { pid: u32 },
    MaxTxReached { pid: u32, nof_txs: u32 },
    /// Process used again before its feedback could have arrived
    ReusedTooSoon { pid: u32, tti_rx: TtiPoint },
    /// Feedback that matches no outstanding transmission
    NoPendingTx { tti_rx: TtiPoint },
    InvalidTb { tb_idx: u32 },
}

impl fmt::Display for HarqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarqError::Busy { pid } => write!(f, "harq pid={} is still active", pid),
            HarqError::Idle { pid } => write!(f, "harq pid={} holds no TB", pid),
            HarqError::MaxTxReached { pid, nof_txs } => {
                write!(f, "harq pid={} already reached its max number of transmissions ({})", pid, nof_txs)
            }
            HarqError::ReusedTooSoon { pid, tti_rx } => write!(f, "harq pid={} reused too soon at tti={}", pid, tti_rx),
            HarqError::NoPendingTx { tti_rx } => write!(f, "no harq transmission expects feedback at tti={}", tti_rx),
            HarqError::InvalidTb { tb_idx } => write!(f, "invalid transport block index {}", tb_idx),
        }
    }
}

impl std::error::Error for HarqError {}

/// State shared by DL and UL stop-and-wait processes.
/// `nof_txs` and `nof_retxs` count the transmissions of the TB currently held.
#[derive(Debug, Clone)]
pub struct HarqProc {
    pid: u32,
    active: bool,
    ndi: bool,
    nof_txs: u32,
    nof_retxs: u32,
    max_tx: u32,
    tbs: u32,
    mcs: u32,
    prbs: PrbInterval,
    first_tti_rx: Option<TtiPoint>,
    last_tti_rx: Option<TtiPoint>,
    feedback: Option<bool>,
}

impl HarqProc {
    pub fn new(pid: u32) -> Self {
        HarqProc {
            pid,
            active: false,
            ndi: false,
            nof_txs: 0,
            nof_retxs: 0,
            max_tx: 0,
            tbs: 0,
            mcs: 0,
            prbs: PrbInterval::default(),
            first_tti_rx: None,
            last_tti_rx: None,
            feedback: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn ndi(&self) -> bool {
        self.ndi
    }
    pub fn nof_txs(&self) -> u32 {
        self.nof_txs
    }
    pub fn nof_retxs(&self) -> u32 {
        self.nof_retxs
    }
    pub fn max_tx(&self) -> u32 {
        self.max_tx
    }
    pub fn tbs(&self) -> u32 {
        self.tbs
    }
    pub fn mcs(&self) -> u32 {
        self.mcs
    }
    pub fn prbs(&self) -> PrbInterval {
        self.prbs
    }
    pub fn first_tti_rx(&self) -> Option<TtiPoint> {
        self.first_tti_rx
    }
    pub fn last_tti_rx(&self) -> Option<TtiPoint> {
        self.last_tti_rx
    }
    pub fn feedback(&self) -> Option<bool> {
        self.feedback
    }

    /// RV of the last transmission
    pub fn rv(&self) -> u32 {
        get_rvidx(self.nof_retxs)
    }

    pub fn is_new_tx(&self, ndi: bool) -> bool {
        self.nof_txs == 0 || ndi != self.ndi
    }

    pub fn is_retx(&self, ndi: bool) -> bool {
        !self.is_new_tx(ndi)
    }

    /// Whether the TB may be sent once more
    pub fn has_tx_budget(&self) -> bool {
        self.nof_txs < self.max_tx
    }

    fn new_tx(&mut self, tti_rx: TtiPoint, mcs: u32, tbs: u32, prbs: PrbInterval, max_tx: u32) -> Result<(), HarqError> {
        if self.active {
            return Err(HarqError::Busy { pid: self.pid });
        }
        self.active = true;
        self.ndi = !self.ndi;
        self.nof_txs = 1;
        self.nof_retxs = 0;
        self.max_tx = max_tx;
        self.tbs = tbs;
        self.mcs = mcs;
        self.prbs = prbs;
        self.first_tti_rx = Some(tti_rx);
        self.last_tti_rx = Some(tti_rx);
        self.feedback = None;
        Ok(())
    }

    fn retx(&mut self, tti_rx: TtiPoint, prbs: PrbInterval) -> Result<(), HarqError> {
        if !self.has_tx_budget() {
            return Err(HarqError::MaxTxReached { pid: self.pid, nof_txs: self.nof_txs });
        }
        if prbs.len != self.prbs.len {
            tracing::warn!("harq pid={} retx changes PRB count {} -> {}", self.pid, self.prbs.len, prbs.len);
        }
        self.nof_txs += 1;
        self.nof_retxs += 1;
        self.prbs = prbs;
        self.last_tti_rx = Some(tti_rx);
        self.feedback = None;
        Ok(())
    }

    fn release(&mut self) {
        self.active = false;
        self.feedback = None;
    }
}

#[derive(Debug, Clone)]
pub struct DlHarqProc {
    h: HarqProc,
    dci_format: DciFormat,
    pdus: Vec<PduElem>,
}

impl DlHarqProc {
    pub fn new(pid: u32) -> Self {
        DlHarqProc { h: HarqProc::new(pid), dci_format: DciFormat::Format1, pdus: Vec::new() }
    }

    pub fn harq(&self) -> &HarqProc {
        &self.h
    }

    pub fn dci_format(&self) -> DciFormat {
        self.dci_format
    }

    pub fn pdus(&self) -> &[PduElem] {
        &self.pdus
    }

    /// Process is waiting to be retransmitted
    pub fn is_pending_retx(&self) -> bool {
        self.h.active && self.h.feedback == Some(false)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_tx(
        &mut self,
        tti_rx: TtiPoint,
        mcs: u32,
        tbs: u32,
        prbs: PrbInterval,
        max_tx: u32,
        dci_format: DciFormat,
        pdus: Vec<PduElem>,
    ) -> Result<(), HarqError> {
        self.h.new_tx(tti_rx, mcs, tbs, prbs, max_tx)?;
        self.dci_format = dci_format;
        self.pdus = pdus;
        Ok(())
    }

    pub fn new_retx(&mut self, tti_rx: TtiPoint, timing: &HarqTiming, prbs: PrbInterval) -> Result<(), HarqError> {
        if !self.h.active {
            return Err(HarqError::Idle { pid: self.h.pid });
        }
        if let Some(last) = self.h.last_tti_rx {
            if timing.to_tx_dl_ack(last) > tti_rx || self.h.feedback.is_none() {
                return Err(HarqError::ReusedTooSoon { pid: self.h.pid, tti_rx });
            }
        }
        self.h.retx(tti_rx, prbs)
    }

    /// Records HARQ feedback. Returns true if the process released its TB,
    /// either because it was acknowledged or because it ran out of transmissions.
    pub fn set_ack(&mut self, ack: bool) -> Result<bool, HarqError> {
        if !self.h.active {
            return Err(HarqError::Idle { pid: self.h.pid });
        }
        if ack {
            self.h.release();
            return Ok(true);
        }
        if !self.h.has_tx_budget() {
            tracing::info!("dl harq pid={} discarded after {} transmissions", self.h.pid, self.h.nof_txs);
            self.h.release();
            return Ok(true);
        }
        self.h.feedback = Some(false);
        Ok(false)
    }

    fn reset(&mut self) {
        self.h.release();
        self.pdus.clear();
    }
}

/// What has to happen to an UL process when its PHICH is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UlHarqOutcome {
    /// No TB in flight
    Idle,
    /// Interrupted TB waiting to be resumed through an adaptive retx
    Paused,
    /// CRC ok, the TB is done
    Ack,
    /// CRC failed on the last allowed transmission
    MaxTxReached,
    /// CRC failed, retransmission due
    Retx,
}

#[derive(Debug, Clone)]
pub struct UlHarqProc {
    h: HarqProc,
    is_msg3: bool,
    paused: bool,
}

impl UlHarqProc {
    pub fn new(pid: u32) -> Self {
        UlHarqProc { h: HarqProc::new(pid), is_msg3: false, paused: false }
    }

    pub fn harq(&self) -> &HarqProc {
        &self.h
    }

    pub fn is_msg3(&self) -> bool {
        self.is_msg3
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Free for a new transmission
    pub fn is_empty(&self) -> bool {
        !self.h.active && !self.paused
    }

    pub fn outcome(&self) -> UlHarqOutcome {
        if self.paused {
            return UlHarqOutcome::Paused;
        }
        if !self.h.active {
            return UlHarqOutcome::Idle;
        }
        // Missing CRC is handled as a failed decode
        match self.h.feedback {
            Some(true) => UlHarqOutcome::Ack,
            _ if !self.h.has_tx_budget() => UlHarqOutcome::MaxTxReached,
            _ => UlHarqOutcome::Retx,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_tx(
        &mut self,
        tti_rx: TtiPoint,
        mcs: u32,
        tbs: u32,
        prbs: PrbInterval,
        max_tx: u32,
        is_msg3: bool,
    ) -> Result<(), HarqError> {
        if self.paused {
            return Err(HarqError::Busy { pid: self.h.pid });
        }
        self.h.new_tx(tti_rx, mcs, tbs, prbs, max_tx)?;
        self.is_msg3 = is_msg3;
        Ok(())
    }

    pub fn set_crc(&mut self, crc: bool) -> Result<(), HarqError> {
        if !self.h.active {
            return Err(HarqError::Idle { pid: self.h.pid });
        }
        self.h.feedback = Some(crc);
        Ok(())
    }

    /// Retransmission right after a failed CRC, adaptive or not
    pub fn new_retx(&mut self, tti_rx: TtiPoint, timing: &HarqTiming, prbs: PrbInterval) -> Result<(), HarqError> {
        if !self.h.active {
            return Err(HarqError::Idle { pid: self.h.pid });
        }
        self.check_reuse(tti_rx, timing)?;
        self.h.retx(tti_rx, prbs)
    }

    /// Adaptive retransmission of an interrupted TB
    pub fn resume(&mut self, tti_rx: TtiPoint, timing: &HarqTiming, prbs: PrbInterval) -> Result<(), HarqError> {
        if !self.paused {
            return Err(HarqError::Idle { pid: self.h.pid });
        }
        self.check_reuse(tti_rx, timing)?;
        self.h.retx(tti_rx, prbs)?;
        self.h.active = true;
        self.paused = false;
        Ok(())
    }

    fn check_reuse(&self, tti_rx: TtiPoint, timing: &HarqTiming) -> Result<(), HarqError> {
        match self.h.last_tti_rx {
            Some(last) if timing.to_tx_ul(last) > tti_rx => Err(HarqError::ReusedTooSoon { pid: self.h.pid, tti_rx }),
            _ => Ok(()),
        }
    }

    /// TB done, either decoded or out of transmissions
    pub fn release(&mut self) {
        self.h.release();
        self.paused = false;
    }

    /// Acknowledge on PHICH while keeping the TB for a later adaptive retx
    pub fn pause(&mut self) {
        self.h.release();
        self.paused = true;
    }

    fn reset(&mut self) {
        self.h.release();
        self.paused = false;
        self.is_msg3 = false;
    }
}

/// DL and UL HARQ processes of one UE carrier. Process ids are synchronous:
/// DL pid follows the DL transmission TTI, UL pid the UL transmission TTI.
#[derive(Debug, Clone)]
pub struct HarqEntity {
    timing: HarqTiming,
    dl: Vec<DlHarqProc>,
    ul: Vec<UlHarqProc>,
}

impl HarqEntity {
    pub fn new(timing: HarqTiming) -> Self {
        let nof_procs = timing.nof_harq_procs();
        HarqEntity {
            timing,
            dl: (0..nof_procs).map(DlHarqProc::new).collect(),
            ul: (0..nof_procs).map(UlHarqProc::new).collect(),
        }
    }

    pub fn timing(&self) -> &HarqTiming {
        &self.timing
    }

    pub fn dl_pid(&self, tti_rx: TtiPoint) -> u32 {
        self.timing.harq_pid(self.timing.to_tx_dl(tti_rx))
    }

    pub fn ul_pid(&self, tti_rx: TtiPoint) -> u32 {
        self.timing.harq_pid(self.timing.to_tx_ul(tti_rx))
    }

    pub fn dl_harq(&self, tti_rx: TtiPoint) -> &DlHarqProc {
        &self.dl[self.dl_pid(tti_rx) as usize]
    }

    pub fn dl_harq_mut(&mut self, tti_rx: TtiPoint) -> &mut DlHarqProc {
        let pid = self.dl_pid(tti_rx);
        &mut self.dl[pid as usize]
    }

    pub fn ul_harq(&self, tti_rx: TtiPoint) -> &UlHarqProc {
        &self.ul[self.ul_pid(tti_rx) as usize]
    }

    pub fn ul_harq_mut(&mut self, tti_rx: TtiPoint) -> &mut UlHarqProc {
        let pid = self.ul_pid(tti_rx);
        &mut self.ul[pid as usize]
    }

    pub fn dl_procs(&self) -> &[DlHarqProc] {
        &self.dl
    }

    pub fn ul_procs(&self) -> &[UlHarqProc] {
        &self.ul
    }

    /// DL process scheduled at `tti_rx`, with missing feedback turned into a NACK
    pub fn dl_harq_for_tx(&mut self, tti_rx: TtiPoint) -> &mut DlHarqProc {
        let timing = self.timing;
        let h = self.dl_harq_mut(tti_rx);
        if h.h.active && h.h.feedback.is_none() {
            if let Some(last) = h.h.last_tti_rx {
                if timing.to_tx_dl_ack(last) <= tti_rx {
                    tracing::debug!("dl_harq_for_tx: pid={} no feedback for tx at tti={}, assuming NACK", h.h.pid, last);
                    // Cannot fail, the process is active
                    let _ = h.set_ack(false);
                }
            }
        }
        h
    }

    /// Applies the DL HARQ feedback received at `tti_rx`.
    /// Returns the pid and whether the process released its TB.
    pub fn dl_ack_info(&mut self, tti_rx: TtiPoint, ack: bool) -> Result<(u32, bool), HarqError> {
        let timing = self.timing;
        let h = self
            .dl
            .iter_mut()
            .find(|h| {
                h.h.active
                    && h.h.feedback.is_none()
                    && h.h.last_tti_rx.is_some_and(|last| timing.to_tx_dl_ack(last) == tti_rx)
            })
            .ok_or(HarqError::NoPendingTx { tti_rx })?;
        let released = h.set_ack(ack)?;
        tracing::trace!("dl_ack_info: pid={} ack={} released={}", h.h.pid, ack, released);
        Ok((h.h.pid, released))
    }

    /// Stores the CRC of the PUSCH received at `tti_rx`. Returns the pid and whether it carried Msg3.
    pub fn ul_crc_info(&mut self, tti_rx: TtiPoint, crc: bool) -> Result<(u32, bool), HarqError> {
        let timing = self.timing;
        let h = self
            .ul
            .iter_mut()
            .find(|h| h.h.active && h.h.last_tti_rx.is_some_and(|last| timing.to_tx_ul(last) == tti_rx))
            .ok_or(HarqError::NoPendingTx { tti_rx })?;
        h.set_crc(crc)?;
        tracing::trace!("ul_crc_info: pid={} crc={}", h.h.pid, crc);
        Ok((h.h.pid, h.is_msg3))
    }

    pub fn reset(&mut self) {
        self.dl.iter_mut().for_each(DlHarqProc::reset);
        self.ul.iter_mut().for_each(UlHarqProc::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prbs() -> PrbInterval {
        PrbInterval::new(2, 4)
    }

    #[test]
    fn test_rv_cycle() {
        assert_eq!((0..5).map(get_rvidx).collect::<Vec<_>>(), vec![0, 2, 3, 1, 0]);
        for n in 0..4 {
            assert_eq!(get_nof_retx(get_rvidx(n)), Some(n));
        }
        assert_eq!(get_nof_retx(4), None);
    }

    #[test]
    fn test_dl_harq_retx_until_max() {
        let timing = HarqTiming::FDD;
        let mut entity = HarqEntity::new(timing);
        let mut tti = TtiPoint::new(10);
        let pid = entity.dl_pid(tti);

        let h = entity.dl_harq_for_tx(tti);
        h.new_tx(tti, 10, 100, prbs(), 5, DciFormat::Format1, vec![]).unwrap();
        let ndi = h.harq().ndi();
        assert!(h.new_tx(tti, 10, 100, prbs(), 5, DciFormat::Format1, vec![]).is_err());

        for nof_txs in 1..5 {
            let ack_tti = timing.to_tx_dl_ack(tti);
            assert_eq!(entity.dl_ack_info(ack_tti, false).unwrap(), (pid, false));
            tti = tti + timing.nof_harq_procs();
            let h = entity.dl_harq_for_tx(tti);
            assert!(h.is_pending_retx());
            h.new_retx(tti, &timing, prbs()).unwrap();
            assert_eq!(h.harq().nof_txs(), nof_txs + 1);
            assert_eq!(h.harq().rv(), get_rvidx(nof_txs));
            assert_eq!(h.harq().ndi(), ndi);
            assert_eq!(h.harq().tbs(), 100);
        }

        // Fifth NACK drops the TB
        assert_eq!(entity.dl_ack_info(timing.to_tx_dl_ack(tti), false).unwrap(), (pid, true));
        assert!(!entity.dl_harq(tti + 8).harq().is_active());
    }

    #[test]
    fn test_dl_retx_too_soon_rejected() {
        let timing = HarqTiming::FDD;
        let mut h = DlHarqProc::new(0);
        let tti = TtiPoint::new(4);
        h.new_tx(tti, 5, 20, prbs(), 4, DciFormat::Format1, vec![]).unwrap();
        h.set_ack(false).unwrap();
        assert_eq!(
            h.new_retx(tti + 7, &timing, prbs()),
            Err(HarqError::ReusedTooSoon { pid: 0, tti_rx: tti + 7 })
        );
        assert!(h.new_retx(tti + 8, &timing, prbs()).is_ok());
    }

    #[test]
    fn test_missing_dl_feedback_is_nack() {
        let timing = HarqTiming::FDD;
        let mut entity = HarqEntity::new(timing);
        let tti = TtiPoint::new(100);
        entity.dl_harq_for_tx(tti).new_tx(tti, 5, 20, prbs(), 4, DciFormat::Format1, vec![]).unwrap();
        assert!(entity.dl_harq_for_tx(tti + 8).is_pending_retx());
    }

    #[test]
    fn test_ul_outcomes() {
        let timing = HarqTiming::FDD;
        let mut entity = HarqEntity::new(timing);
        let tti = TtiPoint::new(20);
        entity.ul_harq_mut(tti).new_tx(tti, 3, 50, prbs(), 2, false).unwrap();

        let crc_tti = timing.to_tx_ul(tti);
        assert!(!entity.ul_crc_info(crc_tti, false).unwrap().1);
        let next = tti + 8;
        let h = entity.ul_harq_mut(next);
        assert_eq!(h.outcome(), UlHarqOutcome::Retx);
        h.new_retx(next, &timing, prbs()).unwrap();

        // No CRC arrives for the retx, which is the last allowed transmission
        let h = entity.ul_harq_mut(next + 8);
        assert_eq!(h.outcome(), UlHarqOutcome::MaxTxReached);
        h.release();
        assert!(h.is_empty());
    }

    #[test]
    fn test_ul_pause_and_resume() {
        let timing = HarqTiming::FDD;
        let mut h = UlHarqProc::new(3);
        let tti = TtiPoint::new(40);
        h.new_tx(tti, 3, 50, prbs(), 4, false).unwrap();
        h.set_crc(false).unwrap();
        h.pause();
        assert_eq!(h.outcome(), UlHarqOutcome::Paused);
        assert!(!h.is_empty());
        assert!(h.new_tx(tti + 8, 3, 50, prbs(), 4, false).is_err());

        let ndi = h.harq().ndi();
        h.resume(tti + 16, &timing, PrbInterval::new(10, 4)).unwrap();
        assert!(h.harq().is_active());
        assert_eq!(h.harq().ndi(), ndi);
        assert_eq!(h.harq().nof_retxs(), 1);
        assert_eq!(h.harq().rv(), 2);
    }
}
