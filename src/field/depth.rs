use std::sync::OnceLock;

use image::GrayImage;
use xxhash_rust::xxh3::Xxh3;

use crate::foundation::core::FieldSize;
use crate::foundation::error::{HolopathError, HolopathResult};

const FINGERPRINT_SEED: u64 = 0x9e3d_77a1_52c6_04bf;

/// A dense per-pixel relative depth estimate.
///
/// Values carry no fixed unit; larger means nearer to the viewer. The grid is
/// immutable after construction, which lets the content fingerprint used by
/// the result cache be computed once and memoized.
#[derive(Clone, Debug)]
pub struct DepthField {
    size: FieldSize,
    data: Vec<f32>,
    fingerprint: OnceLock<u64>,
}

impl PartialEq for DepthField {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.data == other.data
    }
}

impl DepthField {
    /// Create a field from row-major data of exactly `size.cells()` values.
    pub fn new(size: FieldSize, data: Vec<f32>) -> HolopathResult<Self> {
        if data.len() != size.cells() {
            return Err(HolopathError::invalid_input(format!(
                "depth data length {} does not match {}x{} field",
                data.len(),
                size.width,
                size.height
            )));
        }
        Ok(Self::from_parts(size, data))
    }

    /// Create a field holding `value` everywhere.
    pub fn filled(size: FieldSize, value: f32) -> Self {
        Self::from_parts(size, vec![value; size.cells()])
    }

    /// Create a field by evaluating `f(x, y)` for every cell.
    pub fn from_fn(size: FieldSize, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(size.cells());
        for y in 0..size.height {
            for x in 0..size.width {
                data.push(f(x, y));
            }
        }
        Self::from_parts(size, data)
    }

    /// Ingest an 8-bit grayscale depth map, the shape external depth
    /// estimators hand over, as `0.0..=255.0` values.
    pub fn from_luma8(image: &GrayImage) -> HolopathResult<Self> {
        let (width, height) = image.dimensions();
        let size = FieldSize::new(width, height)?;
        let data = image.as_raw().iter().map(|&v| f32::from(v)).collect();
        Ok(Self::from_parts(size, data))
    }

    pub(crate) fn from_parts(size: FieldSize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), size.cells());
        Self {
            size,
            data,
            fingerprint: OnceLock::new(),
        }
    }

    /// Field dimensions.
    pub fn size(&self) -> FieldSize {
        self.size
    }

    /// Row-major cell values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value at an integer pixel, or `None` outside the field.
    pub fn value_at_pixel(&self, px: i32, py: i32) -> Option<f32> {
        if px < 0 || py < 0 || px as u32 >= self.size.width || py as u32 >= self.size.height {
            return None;
        }
        Some(self.data[py as usize * self.size.width as usize + px as usize])
    }

    /// Value at the nearest pixel to a float position, or `None` outside the
    /// field. Positions are tested before rounding, so a point just past the
    /// right or bottom edge is outside even though it would round back in.
    pub fn sample_rounded(&self, x: f64, y: f64) -> Option<f32> {
        if !self.size.contains(x, y) {
            return None;
        }
        let px = (x.round() as u32).min(self.size.width - 1);
        let py = (y.round() as u32).min(self.size.height - 1);
        Some(self.data[py as usize * self.size.width as usize + px as usize])
    }

    /// Stable content fingerprint over dimensions and value bits, memoized.
    pub(crate) fn fingerprint(&self) -> u64 {
        *self.fingerprint.get_or_init(|| {
            let mut h = Xxh3::with_seed(FINGERPRINT_SEED);
            h.update(&self.size.width.to_le_bytes());
            h.update(&self.size.height.to_le_bytes());
            for v in &self.data {
                h.update(&v.to_bits().to_le_bytes());
            }
            h.digest()
        })
    }
}
