//! eNodeB scheduler configuration management
//!
//! This crate provides configuration loading and parsing:
//! - TOML configuration file parsing
//! - Cell, UE and scheduler configuration structures
//! - PCAP export and scenario settings

pub mod stack_config;
pub mod stack_config_pcap;
pub mod stack_config_sim;
pub mod toml_config;

pub use stack_config::*;
pub use stack_config_pcap::CfgPcap;
pub use stack_config_sim::CfgSim;
pub use toml_config::*;
