use crate::foundation::error::{HolopathError, HolopathResult};

pub use kurbo::{CubicBez, Point, Vec2};

/// Dimensions of a depth field and of every buffer derived from it, in pixels.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FieldSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FieldSize {
    /// Create a validated, non-degenerate size.
    pub fn new(width: u32, height: u32) -> HolopathResult<Self> {
        if width == 0 || height == 0 {
            return Err(HolopathError::invalid_input(
                "field dimensions must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    /// Total cell count.
    pub fn cells(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Return `true` when the float position lies inside `[0, w) x [0, h)`.
    pub fn contains(self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < f64::from(self.width) && y < f64::from(self.height)
    }
}

/// A sampled image point.
///
/// The point carries two views of the same position: an integer pixel
/// coordinate used for set membership and deduplication, and a float pair used
/// for sub-pixel motion math. Equality and hashing use only the integer view,
/// so two points landing on the same pixel collapse to one.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct SamplePoint {
    /// Pixel column (dedup key).
    pub px: i32,
    /// Pixel row (dedup key).
    pub py: i32,
    /// Sub-pixel x position.
    pub x: f64,
    /// Sub-pixel y position.
    pub y: f64,
}

impl SamplePoint {
    /// Create a point from a sub-pixel position; the pixel key is the rounded
    /// position.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            px: x.round() as i32,
            py: y.round() as i32,
            x,
            y,
        }
    }

    /// Create a point sitting exactly on a pixel.
    pub fn from_pixel(px: i32, py: i32) -> Self {
        Self {
            px,
            py,
            x: f64::from(px),
            y: f64::from(py),
        }
    }

    /// The integer key used for set membership.
    pub fn pixel_key(self) -> (i32, i32) {
        (self.px, self.py)
    }

    /// The float position used for motion math.
    pub fn pos(self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl PartialEq for SamplePoint {
    fn eq(&self, other: &Self) -> bool {
        self.pixel_key() == other.pixel_key()
    }
}

impl Eq for SamplePoint {}

impl std::hash::Hash for SamplePoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pixel_key().hash(state);
    }
}

/// A contiguous tick range `[start, end]` during which a point stays visible.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TickInterval {
    /// Inclusive start tick.
    pub start: f64,
    /// Inclusive end tick.
    pub end: f64,
}

impl TickInterval {
    /// Create a validated interval with `0 <= start <= end <= 1`.
    pub fn new(start: f64, end: f64) -> HolopathResult<Self> {
        if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start > end {
            return Err(HolopathError::invalid_input(
                "tick interval must satisfy 0 <= start <= end <= 1",
            ));
        }
        Ok(Self { start, end })
    }

    /// Return `true` when `t` lies inside the closed interval.
    pub fn contains(self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Interval width in ticks.
    pub fn width(self) -> f64 {
        self.end - self.start
    }
}
