//! Randomized closed-loop verification of the scheduler
//!
//! Shipped with the crate so integration tests and the simulator binary can
//! drive the same bench.

pub mod checker;
pub mod scenario;
pub mod sched_tester;
pub mod sim_ue;

pub use checker::{CheckCategory, CheckError, test_all_ues};
pub use scenario::{SchedSimEventGenerator, TtiEvents, UserBufferEvent, UserCfgEvent};
pub use sched_tester::{SchedTester, TesterError, TesterStats};
pub use sim_ue::{SimEnbCtxt, SimUeCtxt};
