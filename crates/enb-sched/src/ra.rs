//! Random access: PRACH -> RAR -> Msg3 -> Msg4
//!
//! The UE side of the procedure is a `RaCtx` owned by the scheduled UE. It
//! only moves forward through `RaState` and every transition checks that the
//! event is legal in the current state. The cell side, `RaCellSched`, queues
//! detected preambles until their RAR is sent and keeps the UL resources
//! promised to each Msg3 until the Msg3 receive-TTI comes.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use enb_core::{Rnti, TtiInterval, TtiPoint, ra_rnti};

use crate::bc::bc_alloc_size;
use crate::prb::{PrbMask, round_down_ul_nof_prb, round_up_ul_nof_prb};
use crate::result::{BcDci, DlSchedResult, RarData, RarGrant, RarMsg3Grant, RarUlGrant};
use crate::sf_grid::{CellCtx, SfGrid};
use crate::ue::SchedUe;

/// The RAR window opens this many subframes after the PRACH
pub const RAR_WINDOW_OFFSET: u32 = 3;
/// Size of one MAC RAR (subheader included)
pub const RAR_PDU_LEN: u32 = 7;
/// Highest MCS the Msg3 grant may be raised to before shrinking the grant
pub const MSG3_MAX_MCS: u32 = 10;

/// Preamble detection reported by the PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RachInfo {
    pub prach_tti: TtiPoint,
    pub preamble_idx: u32,
    pub temp_crnti: Rnti,
    /// Bytes the UE needs for its Msg3
    pub msg3_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaError {
    AlreadyInProgress { rnti: Rnti },
    UnexpectedEvent { rnti: Rnti, state: &'static str, event: &'static str },
    Msg3Timing { rnti: Rnti, expected: TtiPoint, actual: TtiPoint },
}

impl fmt::Display for RaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaError::AlreadyInProgress { rnti } => write!(f, "rnti=0x{:x}: random access already in progress", rnti),
            RaError::UnexpectedEvent { rnti, state, event } => {
                write!(f, "rnti=0x{:x}: {} not allowed in state {}", rnti, event, state)
            }
            RaError::Msg3Timing { rnti, expected, actual } => {
                write!(f, "rnti=0x{:x}: Msg3 expected at tti={} but scheduled at tti={}", rnti, expected, actual)
            }
        }
    }
}

impl std::error::Error for RaError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaState {
    PrachReceived,
    RarScheduled { rar_tti_rx: TtiPoint, msg3_grant: RarUlGrant },
    Msg3Scheduled { rar_tti_rx: TtiPoint, msg3_grant: RarUlGrant, msg3_tti_rx: TtiPoint, decoded: bool },
    Msg4Scheduled { rar_tti_rx: TtiPoint, msg3_tti_rx: TtiPoint, msg4_tti_rx: TtiPoint },
}

impl RaState {
    pub fn name(&self) -> &'static str {
        match self {
            RaState::PrachReceived => "PrachReceived",
            RaState::RarScheduled { .. } => "RarScheduled",
            RaState::Msg3Scheduled { decoded: false, .. } => "Msg3Scheduled",
            RaState::Msg3Scheduled { decoded: true, .. } => "Msg3Decoded",
            RaState::Msg4Scheduled { .. } => "Msg4Scheduled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RaCtx {
    rach: RachInfo,
    pcell_enb_cc_idx: u32,
    state: RaState,
}

impl RaCtx {
    pub fn new(rach: RachInfo, pcell_enb_cc_idx: u32) -> Self {
        RaCtx { rach, pcell_enb_cc_idx, state: RaState::PrachReceived }
    }

    pub fn rach(&self) -> &RachInfo {
        &self.rach
    }

    pub fn pcell_enb_cc_idx(&self) -> u32 {
        self.pcell_enb_cc_idx
    }

    pub fn state(&self) -> &RaState {
        &self.state
    }

    pub fn rar_tti_rx(&self) -> Option<TtiPoint> {
        match self.state {
            RaState::PrachReceived => None,
            RaState::RarScheduled { rar_tti_rx, .. }
            | RaState::Msg3Scheduled { rar_tti_rx, .. }
            | RaState::Msg4Scheduled { rar_tti_rx, .. } => Some(rar_tti_rx),
        }
    }

    pub fn msg3_tti_rx(&self) -> Option<TtiPoint> {
        match self.state {
            RaState::Msg3Scheduled { msg3_tti_rx, .. } | RaState::Msg4Scheduled { msg3_tti_rx, .. } => Some(msg3_tti_rx),
            _ => None,
        }
    }

    pub fn msg4_tti_rx(&self) -> Option<TtiPoint> {
        match self.state {
            RaState::Msg4Scheduled { msg4_tti_rx, .. } => Some(msg4_tti_rx),
            _ => None,
        }
    }

    /// Msg3 decoded, the next DL grant has to carry the contention resolution CE
    pub fn is_conres_pending(&self) -> bool {
        matches!(self.state, RaState::Msg3Scheduled { decoded: true, .. })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, RaState::Msg4Scheduled { .. })
    }

    /// UL data grants are only given once the Msg4 went out in an earlier TTI
    pub fn allows_ul_newtx(&self, tti_rx: TtiPoint) -> bool {
        self.msg4_tti_rx().is_some_and(|msg4| msg4 < tti_rx)
    }

    fn unexpected(&self, event: &'static str) -> RaError {
        RaError::UnexpectedEvent { rnti: self.rach.temp_crnti, state: self.state.name(), event }
    }

    pub fn on_rar_scheduled(&mut self, tti_rx: TtiPoint, msg3_grant: RarUlGrant) -> Result<(), RaError> {
        match self.state {
            RaState::PrachReceived => {
                self.state = RaState::RarScheduled { rar_tti_rx: tti_rx, msg3_grant };
                Ok(())
            }
            _ => Err(self.unexpected("RAR")),
        }
    }

    pub fn on_msg3_scheduled(&mut self, tti_rx: TtiPoint, msg3_delay: u32) -> Result<(), RaError> {
        match self.state {
            RaState::RarScheduled { rar_tti_rx, msg3_grant } => {
                let expected = rar_tti_rx + msg3_delay;
                if expected != tti_rx {
                    return Err(RaError::Msg3Timing { rnti: self.rach.temp_crnti, expected, actual: tti_rx });
                }
                self.state = RaState::Msg3Scheduled { rar_tti_rx, msg3_grant, msg3_tti_rx: tti_rx, decoded: false };
                Ok(())
            }
            _ => Err(self.unexpected("Msg3")),
        }
    }

    pub fn on_msg3_decoded(&mut self) -> Result<(), RaError> {
        if let RaState::Msg3Scheduled { decoded, .. } = &mut self.state {
            if !*decoded {
                *decoded = true;
                return Ok(());
            }
        }
        Err(self.unexpected("Msg3 CRC"))
    }

    pub fn on_msg4_scheduled(&mut self, tti_rx: TtiPoint) -> Result<(), RaError> {
        match self.state {
            RaState::Msg3Scheduled { rar_tti_rx, msg3_tti_rx, decoded: true, .. } => {
                self.state = RaState::Msg4Scheduled { rar_tti_rx, msg3_tti_rx, msg4_tti_rx: tti_rx };
                Ok(())
            }
            _ => Err(self.unexpected("Msg4")),
        }
    }
}

/// UL resources promised to a Msg3 through its RAR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msg3Reservation {
    pub tti_rx: TtiPoint,
    pub rnti: Rnti,
    pub grant: RarUlGrant,
    pub tbs: u32,
}

#[derive(Debug, Clone)]
struct PendingRar {
    rach: RachInfo,
    window: TtiInterval,
}

/// Per-carrier RAR queue and Msg3 reservations
#[derive(Debug, Clone)]
pub struct RaCellSched {
    enb_cc_idx: u32,
    pending_rars: VecDeque<PendingRar>,
    msg3_reservations: Vec<Msg3Reservation>,
}

impl RaCellSched {
    pub fn new(enb_cc_idx: u32) -> Self {
        RaCellSched { enb_cc_idx, pending_rars: VecDeque::new(), msg3_reservations: Vec::new() }
    }

    pub fn nof_pending_rars(&self) -> usize {
        self.pending_rars.len()
    }

    /// Queues a detected preamble. The RAR must be sent within the window of the cell.
    pub fn add_rach(&mut self, rach: RachInfo, rar_window: u32) {
        let start = rach.prach_tti + RAR_WINDOW_OFFSET;
        let window = TtiInterval::new(start, start + rar_window);
        tracing::debug!(
            "add_rach: cc={} rnti=0x{:x} prach_tti={} preamble={} window={:?}",
            self.enb_cc_idx,
            rach.temp_crnti,
            rach.prach_tti,
            rach.preamble_idx,
            window
        );
        self.pending_rars.push_back(PendingRar { rach, window });
    }

    pub fn remove_ue(&mut self, rnti: Rnti) {
        self.pending_rars.retain(|p| p.rach.temp_crnti != rnti);
        self.msg3_reservations.retain(|m| m.rnti != rnti);
    }

    pub fn clear(&mut self) {
        self.pending_rars.clear();
        self.msg3_reservations.clear();
    }

    /// Removes and returns the Msg3 grants that are due at `tti_rx`
    pub fn take_msg3(&mut self, tti_rx: TtiPoint) -> Vec<Msg3Reservation> {
        let (due, later): (Vec<_>, Vec<_>) = self.msg3_reservations.drain(..).partition(|m| m.tti_rx == tti_rx);
        self.msg3_reservations = later;
        due
    }

    /// Schedules the RARs whose window contains the DL subframe of `tti_rx`.
    /// Preambles of the same PRACH TTI share one RA-RNTI PDSCH.
    pub fn schedule_rars(
        &mut self,
        ctx: &CellCtx,
        grid: &mut SfGrid,
        ues: &mut BTreeMap<Rnti, SchedUe>,
        result: &mut DlSchedResult,
    ) {
        let tti_rx = grid.tti_rx();
        let tti_tx_dl = ctx.timing.to_tx_dl(tti_rx);

        // Windows that already closed
        while let Some(pos) = self.pending_rars.iter().position(|p| tti_tx_dl >= p.window.stop()) {
            if let Some(p) = self.pending_rars.remove(pos) {
                tracing::warn!(
                    "schedule_rars: RAR window for rnti=0x{:x} prach_tti={} expired at tti_tx_dl={}",
                    p.rach.temp_crnti,
                    p.rach.prach_tti,
                    tti_tx_dl
                );
                if let Some(ue) = ues.get_mut(&p.rach.temp_crnti) {
                    ue.reset_ra();
                }
            }
        }

        let mut prach_ttis: Vec<TtiPoint> = Vec::new();
        for p in self.pending_rars.iter().filter(|p| p.window.contains(tti_tx_dl)) {
            if !prach_ttis.contains(&p.rach.prach_tti) {
                prach_ttis.push(p.rach.prach_tti);
            }
        }

        let msg3_tti_rx = ctx.timing.msg3_tti_rx(tti_rx);
        for prach_tti in prach_ttis {
            if !grid.pdcch().has_space(ctx.aggr_level()) {
                tracing::debug!("schedule_rars: no CCE left for RA-RNTI of prach_tti={}", prach_tti);
                break;
            }
            let Some(rar) = self.alloc_rar(ctx, grid, ues, prach_tti, msg3_tti_rx) else {
                continue;
            };
            result.rar.push(rar);
        }
    }

    fn alloc_rar(
        &mut self,
        ctx: &CellCtx,
        grid: &mut SfGrid,
        ues: &mut BTreeMap<Rnti, SchedUe>,
        prach_tti: TtiPoint,
        msg3_tti_rx: TtiPoint,
    ) -> Option<RarGrant> {
        let tti_rx = grid.tti_rx();
        let mut msg3_mask = *SfGrid::new(msg3_tti_rx, ctx.cell, 0).ul_mask();
        for m in self.msg3_reservations.iter().filter(|m| m.tti_rx == msg3_tti_rx) {
            msg3_mask.fill(&m.grant.prbs);
        }

        let mut candidates: Vec<(usize, Msg3Reservation, RarData)> = Vec::new();
        for (idx, p) in self.pending_rars.iter().enumerate().filter(|(_, p)| p.rach.prach_tti == prach_tti) {
            let rnti = p.rach.temp_crnti;
            let Some(ue) = ues.get(&rnti) else {
                continue;
            };
            if ue.meas_gap().blocks_ul(ctx.timing, msg3_tti_rx) {
                tracing::debug!("alloc_rar: rnti=0x{:x} Msg3 at tti={} would fall in a measurement gap", rnti, msg3_tti_rx);
                continue;
            }
            let Some((grant, tbs)) = msg3_grant(ctx, &msg3_mask, p.rach.msg3_size) else {
                tracing::debug!("alloc_rar: no UL resources left for Msg3 of rnti=0x{:x}", rnti);
                break;
            };
            msg3_mask.fill(&grant.prbs);
            let data = RarData { prach_tti, preamble_idx: p.rach.preamble_idx, temp_crnti: rnti };
            candidates.push((idx, Msg3Reservation { tti_rx: msg3_tti_rx, rnti, grant, tbs }, data));
        }
        if candidates.is_empty() {
            return None;
        }

        let tti_tx_dl = ctx.timing.to_tx_dl(tti_rx);
        let len = RAR_PDU_LEN * candidates.len() as u32;
        let Some((nof_prb, mcs, tbs)) = bc_alloc_size(ctx, tti_tx_dl, len) else {
            tracing::warn!("alloc_rar: RAR of {} bytes does not fit the carrier", len);
            return None;
        };
        let prbs = grid.dl_mask().find_free(nof_prb)?;
        let cce = grid.alloc_dl_with_cce(&prbs, ctx.aggr_level())?;

        let rnti = ra_rnti(prach_tti);
        let mut rar = RarGrant { ra_rnti: rnti, dci: BcDci { rnti, mcs, rv: 0, prbs, cce }, tbs, msg3_grant: Vec::new() };
        let mut committed = Vec::new();
        for (idx, reservation, data) in candidates {
            let Some(ue) = ues.get_mut(&reservation.rnti) else {
                continue;
            };
            let res = match ue.ra_mut() {
                Some(ra) => ra.on_rar_scheduled(tti_rx, reservation.grant),
                None => continue,
            };
            if let Err(e) = res {
                tracing::error!("alloc_rar: {}", e);
                continue;
            }
            tracing::debug!(
                "alloc_rar: rnti=0x{:x} ra_rnti={} msg3 at tti={} prbs={:?}",
                reservation.rnti,
                rnti,
                reservation.tti_rx,
                reservation.grant.prbs
            );
            committed.push(idx);
            self.msg3_reservations.push(reservation);
            rar.msg3_grant.push(RarMsg3Grant { data, grant: reservation.grant });
        }
        // Highest index first so the remaining indices stay valid
        for idx in committed.into_iter().rev() {
            self.pending_rars.remove(idx);
        }
        Some(rar)
    }
}

/// Smallest Msg3 grant fitting `msg3_size` bytes. The MCS is raised when no
/// block of the needed size is free, and as a last resort the largest free
/// block is handed out.
fn msg3_grant(ctx: &CellCtx, mask: &PrbMask, msg3_size: u32) -> Option<(RarUlGrant, u32)> {
    let nof_prb = ctx.nof_prb();
    for mcs in ctx.args.msg3_mcs..=MSG3_MAX_MCS {
        let Some(n) = (1..=nof_prb).find(|n| ctx.phy.ul_tbs_bytes(mcs, *n).is_some_and(|tbs| tbs >= msg3_size)) else {
            continue;
        };
        let n = round_up_ul_nof_prb(n);
        if let Some(prbs) = mask.find_free(n) {
            let tbs = ctx.phy.ul_tbs_bytes(mcs, n)?;
            return Some((RarUlGrant { riv: prbs.riv(nof_prb), mcs, prbs }, tbs));
        }
    }

    let mcs = ctx.args.msg3_mcs;
    let largest = mask.largest_free()?;
    let n = round_down_ul_nof_prb(largest.len);
    if n == 0 {
        return None;
    }
    let prbs = crate::prb::PrbInterval::new(largest.start, n);
    let tbs = ctx.phy.ul_tbs_bytes(mcs, n)?;
    Some((RarUlGrant { riv: prbs.riv(nof_prb), mcs, prbs }, tbs))
}
