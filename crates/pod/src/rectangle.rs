use core::cmp::Ordering;
use core::fmt;

/// A two dimensional size, typically a video frame size.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rectangle {
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    /// Construct a new rectangle.
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Rectangles order by their area.
impl PartialOrd for Rectangle {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rectangle {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        let a = u64::from(self.width) * u64::from(self.height);
        let b = u64::from(other.width) * u64::from(other.height);
        a.cmp(&b)
    }
}

impl fmt::Debug for Rectangle {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
