//! Core utilities for the eNodeB MAC scheduler
//!
//! This crate provides fundamental types and utilities used across the stack:
//! - TtiPoint / TtiInterval for wrap-around aware subframe timing
//! - HarqTiming, the duplexing delay profile
//! - ByteBuffer for PDUs with header headroom
//! - PHY types (CyclicPrefix, Modulation, DciFormat, ...)
//! - Logging setup and debug macros

pub mod byte_buffer;
pub mod debug;
pub mod direction;
pub mod harq_timing;
pub mod phy_types;
pub mod tti_point;

pub use byte_buffer::{BufferError, ByteBuffer};
pub use direction::Direction;
pub use harq_timing::HarqTiming;
pub use phy_types::*;
pub use tti_point::{TtiInterval, TtiPoint};

/// Radio network temporary identifier
pub type Rnti = u16;

/// System information RNTI
pub const SIRNTI: Rnti = 0xFFFF;
/// Paging RNTI
pub const PRNTI: Rnti = 0xFFFE;
/// Lowest value handed out as a (temporary) C-RNTI
pub const FIRST_CRNTI: Rnti = 0x46;

/// Number of logical channels a UE can have configured (LCID 0..10)
pub const MAX_NOF_LCIDS: usize = 11;
/// Number of logical channel groups for BSR reporting
pub const MAX_NOF_LCGS: usize = 4;

/// MAC CE LCID carrying the UE Contention Resolution Identity
pub const CONRES_CE_LCID: u32 = 28;
/// Contention resolution identity payload length
pub const CONRES_CE_LEN: u32 = 6;

/// RA-RNTI used for the RAR answering a PRACH received in `prach_tti` (FDD, f_id 0)
#[inline]
pub fn ra_rnti(prach_tti: TtiPoint) -> Rnti {
    1 + prach_tti.sf_idx() as Rnti
}
