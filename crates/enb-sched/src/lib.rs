//! LTE eNodeB MAC scheduler
//!
//! Decides, once per 1 ms TTI and for every carrier, the PDSCH, PUSCH,
//! PHICH, RAR and system information grants of all UEs:
//! - `sched`: the facade taking configuration, feedback and buffer reports
//! - `harq`: synchronous DL/UL HARQ entities
//! - `ra`: random access (RAR, Msg3, Msg4)
//! - `dl_alloc` / `ul_alloc` / `bc`: per-TTI allocators
//! - `testing`: simulated UEs, result oracle and randomized test bench

pub mod bc;
pub mod dl_alloc;
pub mod harq;
pub mod meas_gap;
pub mod phy_helper;
pub mod prb;
pub mod ra;
pub mod result;
pub mod sched;
pub mod sf_grid;
pub mod testing;
pub mod ue;
pub mod ul_alloc;

pub use harq::{HarqEntity, HarqError};
pub use meas_gap::MeasGap;
pub use phy_helper::{DefaultPhyHelper, PhyHelper};
pub use prb::PrbInterval;
pub use ra::{RaError, RachInfo};
pub use result::*;
pub use sched::{SchedError, Scheduler};
