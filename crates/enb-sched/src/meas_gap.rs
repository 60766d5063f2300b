//! Measurement gap filter
//!
//! A UE with a gap pattern tunes away from its PCell for one subframe per
//! period, so no PDSCH may be sent, and no PUSCH expected, in a subframe
//! where the UE or its HARQ feedback would be in the gap.

use enb_config::UeCfg;
use enb_core::{HarqTiming, TtiPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasGap {
    /// Period in ms, 0 disables the gap
    pub period: u32,
    pub offset: u32,
}

impl MeasGap {
    pub fn new(period: u32, offset: u32) -> Self {
        MeasGap { period, offset }
    }

    pub fn from_ue_cfg(cfg: &UeCfg) -> Self {
        MeasGap { period: cfg.measgap_period, offset: cfg.measgap_offset }
    }

    pub fn is_enabled(&self) -> bool {
        self.period > 0
    }

    pub fn is_in_gap(&self, tti: TtiPoint) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let period_rf = self.period / 10;
        tti.sfn() % period_rf == self.offset / 10 && tti.sf_idx() == self.offset % 10
    }

    /// PDSCH decided at `tti_rx` would be sent or acknowledged in a gap
    pub fn blocks_dl(&self, timing: &HarqTiming, tti_rx: TtiPoint) -> bool {
        self.is_in_gap(timing.to_tx_dl(tti_rx)) || self.is_in_gap(timing.to_tx_dl_ack(tti_rx))
    }

    /// PUSCH decided at `tti_rx` would be received or answered on PHICH in a gap
    pub fn blocks_ul(&self, timing: &HarqTiming, tti_rx: TtiPoint) -> bool {
        self.is_in_gap(timing.to_tx_ul(tti_rx)) || self.is_in_gap(timing.to_tx_ul_ack(tti_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_position() {
        let gap = MeasGap::new(40, 17);
        let in_gap: Vec<u32> = (0..200).filter(|t| gap.is_in_gap(TtiPoint::new(*t))).collect();
        assert_eq!(in_gap, vec![17, 57, 97, 137, 177]);
        assert!(!MeasGap::new(0, 0).is_in_gap(TtiPoint::new(0)));
    }

    #[test]
    fn test_blocked_tx() {
        let t = HarqTiming::FDD;
        let gap = MeasGap::new(80, 25);
        // tx_dl = 25
        assert!(gap.blocks_dl(&t, TtiPoint::new(21)));
        // tx_dl_ack = 25
        assert!(gap.blocks_dl(&t, TtiPoint::new(17)));
        assert!(!gap.blocks_dl(&t, TtiPoint::new(18)));
        // tx_ul = 25 and tx_ul_ack = 25
        assert!(gap.blocks_ul(&t, TtiPoint::new(17)));
        assert!(gap.blocks_ul(&t, TtiPoint::new(13)));
        assert!(!gap.blocks_ul(&t, TtiPoint::new(21)));
    }
}
