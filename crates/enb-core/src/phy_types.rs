//! PHY-level types referenced by the scheduler, configuration and PCAP layers
//!
//! These originate from the PHY but are needed above it, so they live in
//! enb-core to avoid circular dependencies.

use serde::Deserialize;

/// Cyclic prefix length of the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CyclicPrefix {
    #[default]
    Normal,
    Extended,
}

impl CyclicPrefix {
    /// OFDM symbols per slot
    pub fn nof_symbols_slot(&self) -> u32 {
        match self {
            CyclicPrefix::Normal => 7,
            CyclicPrefix::Extended => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PhichLength {
    #[default]
    Normal,
    Extended,
}

/// PHICH resource factor Ng
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PhichResources {
    OneSixth,
    #[default]
    Half,
    One,
    Two,
}

impl PhichResources {
    /// Ng scaled by 6, to keep the group computation in integers
    pub fn ng_times_6(&self) -> u32 {
        match self {
            PhichResources::OneSixth => 1,
            PhichResources::Half => 3,
            PhichResources::One => 6,
            PhichResources::Two => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Modulation {
    Qpsk,
    Qam16,
    Qam64,
    Qam256,
}

impl Modulation {
    /// Bits per modulation symbol
    pub fn bits(&self) -> u32 {
        match self {
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 6,
            Modulation::Qam256 => 8,
        }
    }
}

/// DCI formats used by the scheduler. Bit packing is left to the PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciFormat {
    /// UL grant
    Format0,
    Format1,
    /// Compact DL, used for broadcast, RAR and Msg4
    Format1A,
    /// Closed-loop spatial multiplexing (TM4)
    Format2,
    /// Open-loop spatial multiplexing (TM3)
    Format2A,
}

/// Downlink transmission mode, 1 to 4 are supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TransmissionMode {
    #[default]
    Tm1,
    Tm2,
    Tm3,
    Tm4,
}

impl TransmissionMode {
    pub fn from_index(tm: u8) -> Option<Self> {
        match tm {
            1 => Some(TransmissionMode::Tm1),
            2 => Some(TransmissionMode::Tm2),
            3 => Some(TransmissionMode::Tm3),
            4 => Some(TransmissionMode::Tm4),
            _ => None,
        }
    }

    /// DCI format for UE-specific DL data in this mode
    pub fn dl_dci_format(&self) -> DciFormat {
        match self {
            TransmissionMode::Tm1 | TransmissionMode::Tm2 => DciFormat::Format1,
            TransmissionMode::Tm3 => DciFormat::Format2A,
            TransmissionMode::Tm4 => DciFormat::Format2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tm_dci_format() {
        assert_eq!(TransmissionMode::from_index(1).unwrap().dl_dci_format(), DciFormat::Format1);
        assert_eq!(TransmissionMode::from_index(3).unwrap().dl_dci_format(), DciFormat::Format2A);
        assert_eq!(TransmissionMode::from_index(4).unwrap().dl_dci_format(), DciFormat::Format2);
        assert!(TransmissionMode::from_index(9).is_none());
    }
}
