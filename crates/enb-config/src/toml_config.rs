use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use enb_core::{CyclicPrefix, HarqTiming, PhichLength, PhichResources};
use serde::Deserialize;
use toml::Value;

use super::stack_config::{CellCfg, EnbConfig, SchedArgs, SharedConfig, SibCfg};
use super::stack_config_pcap::{CfgPcapDto, apply_pcap_patch};
use super::stack_config_sim::{CfgSim, CfgSimDto, apply_sim_patch};

/// Build `SharedConfig` from a TOML configuration file
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    // Various sanity checks
    let expected_config_version = "0.1";
    if !root.config_version.eq(expected_config_version) {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, expected_config_version
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    if let Some(ref timing) = root.timing {
        if !timing.extra.is_empty() {
            return Err(format!("Unrecognized fields in timing: {:?}", sorted_keys(&timing.extra)).into());
        }
    }
    if let Some(ref sched) = root.sched {
        if !sched.extra.is_empty() {
            return Err(format!("Unrecognized fields in sched: {:?}", sorted_keys(&sched.extra)).into());
        }
    }
    for (i, cell) in root.cell.iter().enumerate() {
        if !cell.extra.is_empty() {
            return Err(format!("Unrecognized fields in cell[{}]: {:?}", i, sorted_keys(&cell.extra)).into());
        }
        for sib in cell.sibs.iter().flatten() {
            if !sib.extra.is_empty() {
                return Err(format!("Unrecognized fields in cell[{}].sibs: {:?}", i, sorted_keys(&sib.extra)).into());
            }
        }
    }
    if let Some(ref pcap) = root.pcap {
        if !pcap.extra.is_empty() {
            return Err(format!("Unrecognized fields in pcap: {:?}", sorted_keys(&pcap.extra)).into());
        }
    }
    if let Some(ref sim) = root.sim {
        if !sim.extra.is_empty() {
            return Err(format!("Unrecognized fields in sim: {:?}", sorted_keys(&sim.extra)).into());
        }
    }
    if root.cell.is_empty() {
        return Err("At least one [[cell]] section is required".into());
    }

    // Build config from required and optional values
    let mut cfg = EnbConfig {
        debug_log: root.debug_log,
        timing: HarqTiming::default(),
        sched: SchedArgs::default(),
        cells: Vec::with_capacity(root.cell.len()),
        pcap: None,
        sim: CfgSim::default(),
    };

    if let Some(timing) = root.timing {
        apply_timing_patch(&mut cfg.timing, timing);
    }
    if let Some(sched) = root.sched {
        apply_sched_patch(&mut cfg.sched, sched);
    }
    for cell_dto in root.cell {
        let mut cell = CellCfg::new(cell_dto.nof_prb);
        apply_cell_patch(&mut cell, cell_dto);
        cfg.cells.push(cell);
    }
    if let Some(pcap) = root.pcap {
        cfg.pcap = Some(apply_pcap_patch(pcap));
    }
    if let Some(sim) = root.sim {
        apply_sim_patch(&mut cfg.sim, sim);
    }

    Ok(SharedConfig::try_from_config(cfg)?)
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let f = File::open(path)?;
    let r = BufReader::new(f);
    let cfg = from_reader(r)?;
    Ok(cfg)
}

fn apply_timing_patch(dst: &mut HarqTiming, src: TimingDto) {
    if let Some(v) = src.tx_delay {
        dst.tx_delay = v;
    }
    if let Some(v) = src.dl_harq_delay {
        dst.dl_harq_delay = v;
    }
    if let Some(v) = src.ul_harq_delay {
        dst.ul_harq_delay = v;
    }
    if let Some(v) = src.msg3_delay {
        dst.msg3_delay = v;
    }
}

fn apply_sched_patch(dst: &mut SchedArgs, src: SchedDto) {
    if let Some(v) = src.cfi {
        dst.cfi = v;
    }
    if let Some(v) = src.pdcch_aggr_level {
        dst.pdcch_aggr_level = v;
    }
    if let Some(v) = src.pdsch_max_mcs {
        dst.pdsch_max_mcs = v;
    }
    if let Some(v) = src.pusch_max_mcs {
        dst.pusch_max_mcs = v;
    }
    if let Some(v) = src.msg3_mcs {
        dst.msg3_mcs = v;
    }
    if let Some(v) = src.max_nof_prb_per_ue {
        dst.max_nof_prb_per_ue = v;
    }
}

fn apply_cell_patch(dst: &mut CellCfg, src: CellDto) {
    if let Some(v) = src.id {
        dst.phy.id = v;
    }
    if let Some(v) = src.cp {
        dst.phy.cp = v;
    }
    if let Some(v) = src.nof_ports {
        dst.phy.nof_ports = v;
    }
    if let Some(v) = src.phich_length {
        dst.phy.phich_length = v;
    }
    if let Some(v) = src.phich_resources {
        dst.phy.phich_resources = v;
    }
    if let Some(sibs) = src.sibs {
        dst.sibs = sibs.into_iter().map(|s| SibCfg { len: s.len, period_rf: s.period_rf }).collect();
    }
    if let Some(v) = src.si_window_ms {
        dst.si_window_ms = v;
    }
    if let Some(v) = src.nrb_pucch {
        dst.nrb_pucch = v;
    }
    if let Some(v) = src.prach_freq_offset {
        dst.prach_freq_offset = v;
    }
    if let Some(v) = src.prach_rar_window {
        dst.prach_rar_window = v;
    }
    if let Some(v) = src.maxharq_msg3tx {
        dst.maxharq_msg3tx = v;
    }
    if let Some(v) = src.initial_dl_cqi {
        dst.initial_dl_cqi = v;
    }
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&str> {
    let mut v: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    v.sort_unstable();
    v
}

/// ----------------------- DTOs for input shape -----------------------

#[derive(Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,

    #[serde(default)]
    timing: Option<TimingDto>,

    #[serde(default)]
    sched: Option<SchedDto>,

    #[serde(default)]
    cell: Vec<CellDto>,

    #[serde(default)]
    pcap: Option<CfgPcapDto>,

    #[serde(default)]
    sim: Option<CfgSimDto>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct TimingDto {
    tx_delay: Option<u32>,
    dl_harq_delay: Option<u32>,
    ul_harq_delay: Option<u32>,
    msg3_delay: Option<u32>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct SchedDto {
    cfi: Option<u32>,
    pdcch_aggr_level: Option<u32>,
    pdsch_max_mcs: Option<u32>,
    pusch_max_mcs: Option<u32>,
    msg3_mcs: Option<u32>,
    max_nof_prb_per_ue: Option<u32>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct CellDto {
    nof_prb: u32,
    id: Option<u32>,
    cp: Option<CyclicPrefix>,
    nof_ports: Option<u32>,
    phich_length: Option<PhichLength>,
    phich_resources: Option<PhichResources>,

    sibs: Option<Vec<SibDto>>,
    si_window_ms: Option<u32>,
    nrb_pucch: Option<u32>,
    prach_freq_offset: Option<u32>,
    prach_rar_window: Option<u32>,
    maxharq_msg3tx: Option<u32>,
    initial_dl_cqi: Option<u32>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct SibDto {
    len: u32,
    period_rf: u32,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
config_version = "0.1"

[[cell]]
nof_prb = 25
"#;

    #[test]
    fn test_minimal_config() {
        let shared = from_toml_str(MINIMAL).unwrap();
        let cfg = shared.config();
        assert_eq!(cfg.cells.len(), 1);
        assert_eq!(cfg.cells[0].phy.nof_prb, 25);
        assert_eq!(cfg.cells[0].prach_rar_window, 3);
        assert_eq!(cfg.timing, HarqTiming::FDD);
        assert_eq!(cfg.sched.cfi, 3);
        assert!(cfg.pcap.is_none());
    }

    #[test]
    fn test_full_config() {
        let toml_str = r#"
config_version = "0.1"
debug_log = "enb.log"

[timing]
msg3_delay = 2

[sched]
cfi = 2
pdcch_aggr_level = 2

[[cell]]
nof_prb = 50
phich_resources = "Half"
nrb_pucch = 4
prach_rar_window = 5
sibs = [ { len = 18, period_rf = 8 }, { len = 60, period_rf = 32 } ]

[[cell]]
nof_prb = 15
cp = "Extended"

[pcap]
client_ip = "127.0.0.1"
client_port = 5847
ue_id = 3

[sim]
seed = 42
nof_ttis = 500
p_retx = 0.3
"#;
        let cfg = from_toml_str(toml_str).unwrap().config();
        assert_eq!(cfg.debug_log.as_deref(), Some("enb.log"));
        assert_eq!(cfg.sched.cfi, 2);
        assert_eq!(cfg.sched.pdcch_aggr_level, 2);
        assert_eq!(cfg.cells.len(), 2);
        assert_eq!(cfg.cells[0].phy.phich_resources, PhichResources::Half);
        assert_eq!(cfg.cells[0].sibs[1].period_rf, 32);
        assert_eq!(cfg.cells[1].phy.cp, CyclicPrefix::Extended);
        let pcap = cfg.pcap.as_ref().unwrap();
        assert_eq!(pcap.bind_ip, "0.0.0.0");
        assert_eq!(pcap.ue_id, 3);
        assert_eq!(cfg.sim.seed, 42);
        assert_eq!(cfg.sim.nof_ttis, 500);
        assert_eq!(cfg.sim.max_ues, CfgSim::default().max_ues);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let toml_str = r#"
config_version = "0.1"

[[cell]]
nof_prb = 25
bogus = 1
"#;
        let err = from_toml_str(toml_str).err().unwrap();
        assert!(err.to_string().contains("bogus"));

        let toml_str = r#"
config_version = "0.1"
unknown_top = true

[[cell]]
nof_prb = 25
"#;
        assert!(from_toml_str(toml_str).is_err());
    }

    #[test]
    fn test_version_and_validation() {
        assert!(from_toml_str("config_version = \"9.9\"\n[[cell]]\nnof_prb = 25\n").is_err());
        assert!(from_toml_str("config_version = \"0.1\"\n").is_err());
        assert!(from_toml_str("config_version = \"0.1\"\n[[cell]]\nnof_prb = 26\n").is_err());
        assert!(from_toml_str("config_version = \"0.1\"\n[sched]\ncfi = 4\n[[cell]]\nnof_prb = 25\n").is_err());
    }
}
