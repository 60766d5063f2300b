use core::fmt;
use std::cmp::Ordering;
use std::ops::{Add, Sub};

/// Number of system frames before the SFN wraps
pub const NOF_SFNS: u32 = 1024;
/// Number of subframes (TTIs) per radio frame
pub const NOF_SUBFRAMES: u32 = 10;
/// Value of the TTI counter where it wraps back to 0.
pub const TTI_WRAP: u32 = NOF_SFNS * NOF_SUBFRAMES;

/// Difference between two raw TTI counters, handling wrap-around of the SFN.
/// Result lies in [-TTI_WRAP/2, TTI_WRAP/2).
pub fn tti_int_diff(a: u32, b: u32) -> i32 {
    let wrap = TTI_WRAP as i32;
    let mut diff = a as i32 - b as i32;
    while diff < -wrap / 2 { diff += wrap; }
    while diff >= wrap / 2 { diff -= wrap; }
    diff
}

/// A point on the 1ms TTI axis, sfn * 10 + subframe, modulo 10240.
/// Ordering is defined on the shortest wrap-around distance, so any two
/// points less than half a period apart compare as expected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TtiPoint {
    tti: u32,
}

impl TtiPoint {
    pub fn new(tti: u32) -> Self {
        TtiPoint { tti: tti % TTI_WRAP }
    }

    pub fn from_sfn_sf(sfn: u32, sf_idx: u32) -> Self {
        assert!(sf_idx < NOF_SUBFRAMES, "from_sfn_sf: invalid subframe index {}", sf_idx);
        TtiPoint::new((sfn % NOF_SFNS) * NOF_SUBFRAMES + sf_idx)
    }

    #[inline(always)]
    pub fn to_uint(self) -> u32 {
        self.tti
    }

    /// System frame number, 0..1023
    #[inline(always)]
    pub fn sfn(self) -> u32 {
        self.tti / NOF_SUBFRAMES
    }

    /// Subframe index within the radio frame, 0..9
    #[inline(always)]
    pub fn sf_idx(self) -> u32 {
        self.tti % NOF_SUBFRAMES
    }

    /// Add a (possibly negative) number of TTIs
    pub fn add_ttis(self, nof_ttis: i32) -> TtiPoint {
        let v = (self.tti as i64 + nof_ttis as i64).rem_euclid(TTI_WRAP as i64);
        TtiPoint { tti: v as u32 }
    }

    /// Difference between two points in TTIs
    pub fn diff(self, b: Self) -> i32 {
        tti_int_diff(self.tti, b.tti)
    }

    /// Age of this point compared to now
    #[inline(always)]
    pub fn age(self, now: TtiPoint) -> i32 {
        now.diff(self)
    }
}

impl PartialOrd for TtiPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.diff(*other).cmp(&0))
    }
}

impl Add<u32> for TtiPoint {
    type Output = TtiPoint;
    fn add(self, rhs: u32) -> TtiPoint {
        TtiPoint::new(self.tti + rhs % TTI_WRAP)
    }
}

impl Sub<u32> for TtiPoint {
    type Output = TtiPoint;
    fn sub(self, rhs: u32) -> TtiPoint {
        self.add_ttis(-((rhs % TTI_WRAP) as i32))
    }
}

impl fmt::Display for TtiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:5} ({:4}.{})", self.tti, self.sfn(), self.sf_idx())
    }
}

impl fmt::Debug for TtiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:5} ({:4}.{})", self.tti, self.sfn(), self.sf_idx())
    }
}

/// Half-open interval [start, stop) on the TTI axis
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TtiInterval {
    start: TtiPoint,
    stop: TtiPoint,
}

impl TtiInterval {
    pub fn new(start: TtiPoint, stop: TtiPoint) -> Self {
        assert!(stop.diff(start) >= 0, "TtiInterval: stop {} before start {}", stop, start);
        TtiInterval { start, stop }
    }

    pub fn start(&self) -> TtiPoint {
        self.start
    }

    pub fn stop(&self) -> TtiPoint {
        self.stop
    }

    pub fn len(&self) -> u32 {
        self.stop.diff(self.start) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, tti: TtiPoint) -> bool {
        tti.diff(self.start) >= 0 && tti.diff(self.stop) < 0
    }
}

impl fmt::Debug for TtiInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_uint(), self.stop.to_uint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_ttis_and_diff() {
        let initial = TtiPoint::default();

        let mut tti = initial;
        // Repeat enough times that the SFN wraps many times
        let iterations = 10000;
        let increment = 1234;
        for _ in 0..iterations {
            let tti2 = tti.add_ttis(increment);
            assert_eq!(tti2.diff(tti), increment);
            assert_eq!(tti.diff(tti2), -increment);
            tti = tti2;
        }

        // Walk back to the start
        for _ in 0..iterations {
            let tti2 = tti.add_ttis(-increment);
            assert_eq!(tti2.diff(tti), -increment);
            tti = tti2;
        }
        assert_eq!(tti, initial);
    }

    #[test]
    fn test_sfn_and_sf_idx() {
        let tti = TtiPoint::from_sfn_sf(1023, 9);
        assert_eq!(tti.to_uint(), 10239);
        assert_eq!((tti + 1).to_uint(), 0);
        assert_eq!((tti + 1).sfn(), 0);
        assert_eq!(TtiPoint::new(10240 + 57).sf_idx(), 7);
        assert_eq!((TtiPoint::new(3) - 5).to_uint(), 10238);
    }

    #[test]
    fn test_ordering_across_wrap() {
        let a = TtiPoint::new(10235);
        let b = a + 10;
        assert_eq!(b.to_uint(), 5);
        assert!(a < b);
        assert!(b > a);
        assert_eq!(b.diff(a), 10);
    }

    #[test]
    fn test_interval_contains() {
        let prach = TtiPoint::new(100);
        let win = TtiInterval::new(prach + 3, prach + 6);
        assert_eq!(win.len(), 3);
        assert!(!win.contains(TtiPoint::new(102)));
        assert!(win.contains(TtiPoint::new(103)));
        assert!(win.contains(TtiPoint::new(105)));
        assert!(!win.contains(TtiPoint::new(106)));

        // Window that straddles the wrap point
        let win = TtiInterval::new(TtiPoint::new(10238), TtiPoint::new(10238) + 4);
        assert!(win.contains(TtiPoint::new(1)));
        assert!(!win.contains(TtiPoint::new(2)));
    }
}
