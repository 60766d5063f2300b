use std::collections::HashMap;
use std::net::IpAddr;

use serde::Deserialize;
use toml::Value;

/// MAC PCAP-over-UDP export configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CfgPcap {
    /// Address of the collector (e.g. a Wireshark udp listener)
    pub client_ip: String,
    pub client_port: u16,
    /// Local address the sending socket binds to
    pub bind_ip: String,
    pub bind_port: u16,
    /// UE id written into every packet context
    pub ue_id: u16,
}

impl CfgPcap {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_ip.parse::<IpAddr>().is_err() {
            return Err("pcap client_ip is not a valid IP address");
        }
        if self.bind_ip.parse::<IpAddr>().is_err() {
            return Err("pcap bind_ip is not a valid IP address");
        }
        if self.client_port == 0 {
            return Err("pcap client_port must be non-zero");
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct CfgPcapDto {
    pub client_ip: String,
    #[serde(default = "default_pcap_client_port")]
    pub client_port: u16,
    #[serde(default = "default_pcap_bind_ip")]
    pub bind_ip: String,
    #[serde(default)]
    pub bind_port: u16,
    #[serde(default)]
    pub ue_id: u16,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn default_pcap_client_port() -> u16 {
    5847
}

fn default_pcap_bind_ip() -> String {
    "0.0.0.0".to_string()
}

/// Convert a CfgPcapDto (from TOML) into a CfgPcap
pub fn apply_pcap_patch(src: CfgPcapDto) -> CfgPcap {
    CfgPcap {
        client_ip: src.client_ip,
        client_port: src.client_port,
        bind_ip: src.bind_ip,
        bind_port: src.bind_port,
        ue_id: src.ue_id,
    }
}
