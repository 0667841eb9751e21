use std::str::FromStr;

use crate::foundation::error::{HolopathError, HolopathResult};

/// Scalar parameters driving curve construction, field warping and
/// visibility.
///
/// Defaults suit 8-bit depth maps: zero depth 128 (the map midpoint), handle
/// fraction 0.16, curvature divisor 1000 and 20 half frames (41 frames
/// total).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SceneParams {
    /// Reference depth with zero parallax motion.
    pub zero_depth: f32,
    /// Points closer than this to the zero-depth plane are treated as
    /// motionless and excluded from every output. The comparison is strict,
    /// so a tolerance of zero retains points sitting exactly on the plane.
    pub ignore_depth_tolerance: f32,
    /// Handle fraction narrowing the control handles toward the endpoints.
    pub a_factor: f64,
    /// Curvature divisor: `curvature = (depth - zero_depth) * width / b_factor`.
    pub b_factor: f64,
    /// Half frame count `F`; the frame sequence holds `2F + 1` fields.
    pub half_frames: u32,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            zero_depth: 128.0,
            ignore_depth_tolerance: 0.0,
            a_factor: 0.16,
            b_factor: 1000.0,
            half_frames: 20,
        }
    }
}

impl SceneParams {
    /// Total frame count, always odd.
    pub fn total_frames(&self) -> usize {
        2 * self.half_frames as usize + 1
    }

    /// Per-field curvature multiplier: `width / b_factor`.
    pub fn curvature_scale(&self, field_width: u32) -> f64 {
        f64::from(field_width) / self.b_factor
    }

    pub(crate) fn validate(&self) -> HolopathResult<()> {
        if self.half_frames == 0 {
            return Err(HolopathError::invalid_input("half_frames must be >= 1"));
        }
        if !(self.b_factor.is_finite() && self.b_factor != 0.0) {
            return Err(HolopathError::invalid_input(
                "b_factor must be finite and non-zero",
            ));
        }
        if !self.a_factor.is_finite() {
            return Err(HolopathError::invalid_input("a_factor must be finite"));
        }
        if !self.zero_depth.is_finite() {
            return Err(HolopathError::invalid_input("zero_depth must be finite"));
        }
        if !(self.ignore_depth_tolerance.is_finite() && self.ignore_depth_tolerance >= 0.0) {
            return Err(HolopathError::invalid_input(
                "ignore_depth_tolerance must be finite and >= 0",
            ));
        }
        Ok(())
    }
}

/// Marker color selection for preview rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColorMode {
    /// Sample the source image at the point's pixel.
    Source,
    /// Encode the point's depth as a grayscale value.
    DepthGray,
    /// A fixed straight-alpha RGBA color.
    Fixed([u8; 4]),
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::DepthGray
    }
}

impl FromStr for ColorMode {
    type Err = HolopathError;

    /// Accepts shorthand selector strings: anything starting with `c` samples
    /// the source image, anything starting with `d` encodes depth, and
    /// `#RRGGBB` / `#RRGGBBAA` picks a fixed color. Malformed hex is an input
    /// error, never a silent fallback color.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('c') {
            return Ok(Self::Source);
        }
        if s.starts_with('d') {
            return Ok(Self::DepthGray);
        }
        parse_hex_rgba(s).map(Self::Fixed)
    }
}

fn parse_hex_rgba(s: &str) -> HolopathResult<[u8; 4]> {
    let digits = s.strip_prefix('#').unwrap_or(s);

    fn hex_byte(pair: &str) -> HolopathResult<u8> {
        u8::from_str_radix(pair, 16)
            .map_err(|_| HolopathError::invalid_input(format!("invalid hex byte \"{pair}\"")))
    }

    match digits.len() {
        6 => Ok([
            hex_byte(&digits[0..2])?,
            hex_byte(&digits[2..4])?,
            hex_byte(&digits[4..6])?,
            255,
        ]),
        8 => Ok([
            hex_byte(&digits[0..2])?,
            hex_byte(&digits[2..4])?,
            hex_byte(&digits[4..6])?,
            hex_byte(&digits[6..8])?,
        ]),
        _ => Err(HolopathError::invalid_input(
            "color must be `c…`, `d…`, #RRGGBB or #RRGGBBAA",
        )),
    }
}
