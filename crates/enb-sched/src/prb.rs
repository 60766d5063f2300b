use std::fmt;

/// Maximum carrier bandwidth in PRBs
pub const MAX_NOF_PRB: u32 = 100;

/// Contiguous run of PRBs
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PrbInterval {
    pub start: u32,
    pub len: u32,
}

impl PrbInterval {
    pub fn new(start: u32, len: u32) -> Self {
        PrbInterval { start, len }
    }

    #[inline]
    pub fn stop(&self) -> u32 {
        self.start + self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn overlaps(&self, other: &PrbInterval) -> bool {
        self.start < other.stop() && other.start < self.stop()
    }

    /// Resource indication value of a type 2 (contiguous) allocation
    pub fn riv(&self, nof_prb: u32) -> u32 {
        riv_from_prbs(nof_prb, self.start, self.len)
    }

    pub fn from_riv(riv: u32, nof_prb: u32) -> Option<PrbInterval> {
        let a = riv / nof_prb;
        let b = riv % nof_prb;
        let (start, len) = if a + b < nof_prb { (b, a + 1) } else { (nof_prb - 1 - b, nof_prb - a + 1) };
        if len == 0 || start + len > nof_prb {
            return None;
        }
        Some(PrbInterval { start, len })
    }
}

impl fmt::Debug for PrbInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.stop())
    }
}

pub fn riv_from_prbs(nof_prb: u32, start: u32, len: u32) -> u32 {
    assert!(len >= 1 && start + len <= nof_prb, "riv_from_prbs: invalid allocation start {} len {} of {}", start, len, nof_prb);
    if len - 1 <= nof_prb / 2 {
        nof_prb * (len - 1) + start
    } else {
        nof_prb * (nof_prb - len + 1) + (nof_prb - 1 - start)
    }
}

/// Occupancy bitmap of the PRBs of one carrier in one subframe.
/// Bit i set means PRB i is taken.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PrbMask {
    bits: u128,
    nof_prb: u32,
}

impl PrbMask {
    pub fn new(nof_prb: u32) -> Self {
        assert!(nof_prb <= MAX_NOF_PRB, "PrbMask: {} PRBs exceeds carrier maximum", nof_prb);
        PrbMask { bits: 0, nof_prb }
    }

    fn interval_bits(iv: &PrbInterval) -> u128 {
        if iv.len == 0 {
            return 0;
        }
        ((1u128 << iv.len) - 1) << iv.start
    }

    #[inline]
    pub fn nof_prb(&self) -> u32 {
        self.nof_prb
    }

    pub fn nof_used(&self) -> u32 {
        self.bits.count_ones()
    }

    pub fn is_used(&self, prb: u32) -> bool {
        (self.bits >> prb) & 1 == 1
    }

    pub fn is_free(&self, iv: &PrbInterval) -> bool {
        iv.stop() <= self.nof_prb && self.bits & Self::interval_bits(iv) == 0
    }

    /// Marks `iv` as taken. Returns false, leaving the mask untouched, on collision.
    pub fn fill(&mut self, iv: &PrbInterval) -> bool {
        if !self.is_free(iv) {
            return false;
        }
        self.bits |= Self::interval_bits(iv);
        true
    }

    /// Lowest free run of exactly `len` PRBs
    pub fn find_free(&self, len: u32) -> Option<PrbInterval> {
        self.find_free_where(len, |_| true)
    }

    /// Lowest free run of `len` PRBs that satisfies `accept`
    pub fn find_free_where<F: Fn(&PrbInterval) -> bool>(&self, len: u32, accept: F) -> Option<PrbInterval> {
        if len == 0 || len > self.nof_prb {
            return None;
        }
        (0..=self.nof_prb - len)
            .map(|start| PrbInterval::new(start, len))
            .find(|iv| self.is_free(iv) && accept(iv))
    }

    /// Longest free run, first one wins on ties
    pub fn largest_free(&self) -> Option<PrbInterval> {
        let mut best: Option<PrbInterval> = None;
        let mut run_start = 0;
        for prb in 0..=self.nof_prb {
            if prb == self.nof_prb || self.is_used(prb) {
                let len = prb - run_start;
                if len > 0 && best.is_none_or(|b| len > b.len) {
                    best = Some(PrbInterval::new(run_start, len));
                }
                run_start = prb + 1;
            }
        }
        best
    }
}

impl fmt::Debug for PrbMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for prb in 0..self.nof_prb {
            write!(f, "{}", if self.is_used(prb) { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// PUSCH allocations must span a PRB count of the form 2^a * 3^b * 5^c
pub fn is_valid_ul_nof_prb(nof_prb: u32) -> bool {
    if nof_prb == 0 {
        return false;
    }
    let mut n = nof_prb;
    for f in [2, 3, 5] {
        while n % f == 0 {
            n /= f;
        }
    }
    n == 1
}

/// Largest valid PUSCH PRB count not above `nof_prb`
pub fn round_down_ul_nof_prb(nof_prb: u32) -> u32 {
    (1..=nof_prb).rev().find(|n| is_valid_ul_nof_prb(*n)).unwrap_or(0)
}

/// Smallest valid PUSCH PRB count not below `nof_prb`
pub fn round_up_ul_nof_prb(nof_prb: u32) -> u32 {
    (nof_prb.max(1)..=MAX_NOF_PRB).find(|n| is_valid_ul_nof_prb(*n)).unwrap_or(MAX_NOF_PRB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_riv() {
        // Short allocations use the first branch
        assert_eq!(riv_from_prbs(25, 3, 4), 25 * 3 + 3);
        // Long allocations use the mirrored branch
        assert_eq!(riv_from_prbs(25, 2, 20), 25 * 6 + 22);
        assert_eq!(PrbInterval::from_riv(25 * 6 + 22, 25), Some(PrbInterval::new(2, 20)));
        assert_eq!(PrbInterval::from_riv(78, 25), Some(PrbInterval::new(3, 4)));

        // Same length, different start gives a different RIV
        assert_ne!(PrbInterval::new(2, 3).riv(25), PrbInterval::new(5, 3).riv(25));
    }

    #[test]
    fn test_mask_alloc() {
        let mut mask = PrbMask::new(25);
        assert!(mask.fill(&PrbInterval::new(0, 2)));
        assert!(mask.fill(&PrbInterval::new(23, 2)));
        assert!(!mask.fill(&PrbInterval::new(1, 3)));
        assert_eq!(mask.nof_used(), 4);

        assert_eq!(mask.find_free(5), Some(PrbInterval::new(2, 5)));
        assert_eq!(mask.largest_free(), Some(PrbInterval::new(2, 21)));
        assert_eq!(mask.find_free(22), None);
        assert_eq!(mask.find_free_where(3, |iv| iv.start != 2), Some(PrbInterval::new(3, 3)));
    }

    #[test]
    fn test_ul_nof_prb_rounding() {
        assert!(is_valid_ul_nof_prb(1));
        assert!(is_valid_ul_nof_prb(45));
        assert!(!is_valid_ul_nof_prb(7));
        assert!(!is_valid_ul_nof_prb(21));
        assert_eq!(round_down_ul_nof_prb(21), 20);
        assert_eq!(round_up_ul_nof_prb(7), 8);
        assert_eq!(round_up_ul_nof_prb(0), 1);
    }
}
