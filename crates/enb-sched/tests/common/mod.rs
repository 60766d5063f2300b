#![allow(dead_code)]

mod sched_bench;

pub use sched_bench::*;
