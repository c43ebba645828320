use core::cmp::Ordering;
use core::fmt;

/// A rational number, typically a sample rate or frame rate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    pub num: u32,
    pub denom: u32,
}

impl Fraction {
    /// Construct a new fraction.
    #[inline]
    pub const fn new(num: u32, denom: u32) -> Self {
        Self { num, denom }
    }
}

/// Fractions order by their rational value, comparing cross products so no
/// precision is lost.
impl PartialOrd for Fraction {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        let a = u64::from(self.num) * u64::from(other.denom);
        let b = u64::from(other.num) * u64::from(self.denom);
        a.cmp(&b)
    }
}

impl fmt::Debug for Fraction {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}
