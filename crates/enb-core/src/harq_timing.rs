use crate::tti_point::{TTI_WRAP, TtiPoint};

/// Delay between receiving a TTI and the DL subframe we prepare for it
pub const FDD_TX_DELAY_MS: u32 = 4;
/// DL HARQ round trip contribution (PDSCH -> PUCCH ACK)
pub const FDD_HARQ_DELAY_DL_MS: u32 = 4;
/// UL HARQ round trip contribution (PUSCH -> PHICH)
pub const FDD_HARQ_DELAY_UL_MS: u32 = 4;
/// Msg3 receive-TTI offset relative to the RAR receive-TTI
pub const MSG3_DELAY_MS: u32 = 2;

/// Converts a receive-TTI into the TTIs at which its transmissions and
/// acknowledgements happen. Duplexing delays are configuration, FDD by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarqTiming {
    pub tx_delay: u32,
    pub dl_harq_delay: u32,
    pub ul_harq_delay: u32,
    pub msg3_delay: u32,
}

impl Default for HarqTiming {
    fn default() -> Self {
        Self::FDD
    }
}

impl HarqTiming {
    pub const FDD: HarqTiming = HarqTiming {
        tx_delay: FDD_TX_DELAY_MS,
        dl_harq_delay: FDD_HARQ_DELAY_DL_MS,
        ul_harq_delay: FDD_HARQ_DELAY_UL_MS,
        msg3_delay: MSG3_DELAY_MS,
    };

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.tx_delay == 0 || self.dl_harq_delay == 0 || self.ul_harq_delay == 0 || self.msg3_delay == 0 {
            return Err("HARQ timing delays must be non-zero");
        }
        // Feedback for a process has to be known before the process comes around again
        if self.tx_delay > self.dl_harq_delay || self.tx_delay > self.ul_harq_delay {
            return Err("tx_delay must not exceed the HARQ delays");
        }
        if TTI_WRAP % self.nof_harq_procs() != 0 {
            return Err("number of HARQ processes must divide the TTI period");
        }
        Ok(())
    }

    #[inline]
    pub fn to_tx_dl(&self, tti_rx: TtiPoint) -> TtiPoint {
        tti_rx + self.tx_delay
    }

    #[inline]
    pub fn to_tx_dl_ack(&self, tti_rx: TtiPoint) -> TtiPoint {
        self.to_tx_dl(tti_rx) + self.ul_harq_delay
    }

    #[inline]
    pub fn to_tx_ul(&self, tti_rx: TtiPoint) -> TtiPoint {
        self.to_tx_dl(tti_rx) + self.dl_harq_delay
    }

    #[inline]
    pub fn to_tx_ul_ack(&self, tti_rx: TtiPoint) -> TtiPoint {
        self.to_tx_ul(tti_rx) + self.ul_harq_delay
    }

    /// Combined DL+UL round trip, also the number of HARQ processes per direction
    #[inline]
    pub fn nof_harq_procs(&self) -> u32 {
        self.dl_harq_delay + self.ul_harq_delay
    }

    /// Synchronous HARQ process id for a transmission TTI
    #[inline]
    pub fn harq_pid(&self, tti_tx: TtiPoint) -> u32 {
        tti_tx.to_uint() % self.nof_harq_procs()
    }

    /// Msg3 retransmissions are spaced by one UL HARQ round trip
    #[inline]
    pub fn msg3_retx_period(&self) -> u32 {
        self.nof_harq_procs()
    }

    /// Receive-TTI at which the Msg3 of a RAR sent for `rar_tti_rx` is allocated
    #[inline]
    pub fn msg3_tti_rx(&self, rar_tti_rx: TtiPoint) -> TtiPoint {
        rar_tti_rx + self.msg3_delay
    }
}
