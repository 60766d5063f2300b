//! MAC PCAP export over UDP
//!
//! Finished MAC PDUs are framed with a `mac-lte` or `mac-nr` start string
//! and a packed context header, then sent as single datagrams to a
//! collector. Sending happens on a writer thread, off the scheduling path.

pub mod context;
pub mod pcap_net;
pub mod transports;

pub use context::{LteMacContext, NrMacContext, PcapContext, PcapDirection, RadioType, RntiType};
pub use pcap_net::{MacPcapNet, PcapError, PcapWriterStats};
pub use transports::{NetworkError, NetworkTransport};
