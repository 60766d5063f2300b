//! Resource occupancy of one carrier while a TTI is being scheduled

use enb_config::{CellCfg, SchedArgs};
use enb_core::{HarqTiming, TtiPoint};

use crate::phy_helper::PhyHelper;
use crate::prb::{PrbInterval, PrbMask};
use crate::result::CceLocation;

/// Read-only parameters shared by the allocators of one carrier
#[derive(Clone, Copy)]
pub struct CellCtx<'a> {
    pub enb_cc_idx: u32,
    pub cell: &'a CellCfg,
    pub args: &'a SchedArgs,
    pub timing: &'a HarqTiming,
    pub phy: &'a dyn PhyHelper,
}

impl CellCtx<'_> {
    #[inline]
    pub fn nof_prb(&self) -> u32 {
        self.cell.phy.nof_prb
    }

    #[inline]
    pub fn aggr_level(&self) -> u32 {
        self.args.pdcch_aggr_level
    }
}

/// CCEs of the control region of the DL subframe carrying the DCIs of a TTI.
/// Each DCI takes a consecutive block of 2^aggr_level CCEs.
#[derive(Debug, Clone)]
pub struct PdcchAlloc {
    nof_cce: u32,
    next_cce: u32,
}

impl PdcchAlloc {
    pub fn new(nof_cce: u32) -> Self {
        PdcchAlloc { nof_cce, next_cce: 0 }
    }

    pub fn nof_cce(&self) -> u32 {
        self.nof_cce
    }

    pub fn nof_cce_left(&self) -> u32 {
        self.nof_cce - self.next_cce
    }

    pub fn has_space(&self, aggr_level: u32) -> bool {
        self.nof_cce_left() >= 1 << aggr_level
    }

    pub fn alloc(&mut self, aggr_level: u32) -> Option<CceLocation> {
        if !self.has_space(aggr_level) {
            return None;
        }
        let loc = CceLocation { ncce: self.next_cce, aggr_level };
        self.next_cce += 1 << aggr_level;
        Some(loc)
    }
}

#[derive(Debug, Clone)]
pub struct SfGrid {
    tti_rx: TtiPoint,
    dl_mask: PrbMask,
    ul_mask: PrbMask,
    pdcch: PdcchAlloc,
}

impl SfGrid {
    /// Empty grid with the PUCCH band edges taken out of the UL mask
    pub fn new(tti_rx: TtiPoint, cell: &CellCfg, nof_cce: u32) -> Self {
        let nof_prb = cell.phy.nof_prb;
        let mut ul_mask = PrbMask::new(nof_prb);
        if cell.nrb_pucch > 0 {
            ul_mask.fill(&PrbInterval::new(0, cell.nrb_pucch));
            ul_mask.fill(&PrbInterval::new(nof_prb - cell.nrb_pucch, cell.nrb_pucch));
        }
        SfGrid { tti_rx, dl_mask: PrbMask::new(nof_prb), ul_mask, pdcch: PdcchAlloc::new(nof_cce) }
    }

    pub fn tti_rx(&self) -> TtiPoint {
        self.tti_rx
    }

    pub fn dl_mask(&self) -> &PrbMask {
        &self.dl_mask
    }

    pub fn ul_mask(&self) -> &PrbMask {
        &self.ul_mask
    }

    pub fn pdcch(&self) -> &PdcchAlloc {
        &self.pdcch
    }

    pub fn alloc_dl(&mut self, prbs: &PrbInterval) -> bool {
        self.dl_mask.fill(prbs)
    }

    pub fn alloc_ul(&mut self, prbs: &PrbInterval) -> bool {
        self.ul_mask.fill(prbs)
    }

    pub fn alloc_cce(&mut self, aggr_level: u32) -> Option<CceLocation> {
        self.pdcch.alloc(aggr_level)
    }

    pub fn can_alloc_dl(&self, prbs: &PrbInterval, aggr_level: u32) -> bool {
        self.pdcch.has_space(aggr_level) && self.dl_mask.is_free(prbs)
    }

    pub fn can_alloc_ul(&self, prbs: &PrbInterval, aggr_level: u32) -> bool {
        self.pdcch.has_space(aggr_level) && self.ul_mask.is_free(prbs)
    }

    /// DL grant with a DCI, nothing is taken unless both are available
    pub fn alloc_dl_with_cce(&mut self, prbs: &PrbInterval, aggr_level: u32) -> Option<CceLocation> {
        if !self.can_alloc_dl(prbs, aggr_level) {
            return None;
        }
        self.dl_mask.fill(prbs);
        self.pdcch.alloc(aggr_level)
    }

    /// UL grant with a DCI, nothing is taken unless both are available
    pub fn alloc_ul_with_cce(&mut self, prbs: &PrbInterval, aggr_level: u32) -> Option<CceLocation> {
        if !self.can_alloc_ul(prbs, aggr_level) {
            return None;
        }
        self.ul_mask.fill(prbs);
        self.pdcch.alloc(aggr_level)
    }
}
