use std::collections::HashMap;

use serde::Deserialize;
use toml::Value;

/// Parameters of the randomized scheduling scenario
#[derive(Debug, Clone, PartialEq)]
pub struct CfgSim {
    pub seed: u64,
    pub nof_ttis: u32,
    /// Probability that a transmission is NACKed (DL) or fails CRC (UL)
    pub p_retx: f32,
    /// Maximum number of simultaneously connected UEs
    pub max_ues: u32,
    /// Per-TTI probability that a new UE sends a PRACH
    pub p_ue_arrival: f32,
    pub ue_min_duration: u32,
    pub ue_max_duration: u32,
    /// Per-TTI, per-UE probability of new DL or UL data
    pub p_dl_data: f32,
    pub p_ul_data: f32,
    pub max_dl_bytes: u32,
    pub max_ul_bytes: u32,
    /// Probability that a UE reconfiguration enables a measurement gap
    pub p_measgap: f32,
    /// Probability that a UE reconfiguration adds a secondary carrier, if the eNB has one
    pub p_scell: f32,
}

impl Default for CfgSim {
    fn default() -> Self {
        CfgSim {
            seed: 0,
            nof_ttis: 2000,
            p_retx: 0.1,
            max_ues: 8,
            p_ue_arrival: 0.02,
            ue_min_duration: 200,
            ue_max_duration: 1500,
            p_dl_data: 0.1,
            p_ul_data: 0.1,
            max_dl_bytes: 3000,
            max_ul_bytes: 3000,
            p_measgap: 0.3,
            p_scell: 0.5,
        }
    }
}

impl CfgSim {
    pub fn validate(&self) -> Result<(), &'static str> {
        let probs = [self.p_retx, self.p_ue_arrival, self.p_dl_data, self.p_ul_data, self.p_measgap, self.p_scell];
        if probs.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err("sim probabilities must lie in [0, 1]");
        }
        if self.ue_min_duration == 0 || self.ue_min_duration > self.ue_max_duration {
            return Err("sim UE durations must satisfy 0 < min <= max");
        }
        if self.max_ues == 0 {
            return Err("sim max_ues must be non-zero");
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct CfgSimDto {
    pub seed: Option<u64>,
    pub nof_ttis: Option<u32>,
    pub p_retx: Option<f32>,
    pub max_ues: Option<u32>,
    pub p_ue_arrival: Option<f32>,
    pub ue_min_duration: Option<u32>,
    pub ue_max_duration: Option<u32>,
    pub p_dl_data: Option<f32>,
    pub p_ul_data: Option<f32>,
    pub max_dl_bytes: Option<u32>,
    pub max_ul_bytes: Option<u32>,
    pub p_measgap: Option<f32>,
    pub p_scell: Option<f32>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

pub fn apply_sim_patch(dst: &mut CfgSim, src: CfgSimDto) {
    if let Some(v) = src.seed {
        dst.seed = v;
    }
    if let Some(v) = src.nof_ttis {
        dst.nof_ttis = v;
    }
    if let Some(v) = src.p_retx {
        dst.p_retx = v;
    }
    if let Some(v) = src.max_ues {
        dst.max_ues = v;
    }
    if let Some(v) = src.p_ue_arrival {
        dst.p_ue_arrival = v;
    }
    if let Some(v) = src.ue_min_duration {
        dst.ue_min_duration = v;
    }
    if let Some(v) = src.ue_max_duration {
        dst.ue_max_duration = v;
    }
    if let Some(v) = src.p_dl_data {
        dst.p_dl_data = v;
    }
    if let Some(v) = src.p_ul_data {
        dst.p_ul_data = v;
    }
    if let Some(v) = src.max_dl_bytes {
        dst.max_dl_bytes = v;
    }
    if let Some(v) = src.max_ul_bytes {
        dst.max_ul_bytes = v;
    }
    if let Some(v) = src.p_measgap {
        dst.p_measgap = v;
    }
    if let Some(v) = src.p_scell {
        dst.p_scell = v;
    }
}
