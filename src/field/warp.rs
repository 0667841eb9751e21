use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::curve::model::ParallaxCurve;
use crate::engine::params::SceneParams;
use crate::engine::worker::{CancelToken, ProgressFn, Stage, report};
use crate::field::depth::DepthField;
use crate::foundation::error::HolopathResult;

/// Sentinel for a destination cell no source cell scattered into.
const EMPTY_CELL: u32 = f32::NEG_INFINITY.to_bits();

/// Odd-length sequence of depth fields, one per discrete tick.
///
/// Index `k` of `2F + 1` frames maps linearly to tick `k / 2F`; the center
/// frame (tick 0.5) is always an unmodified copy of the input field. The
/// sequence exists only to test occlusion against a consistently displaced
/// background, it is never displayed.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameFieldSequence {
    half_frames: u32,
    fields: Vec<DepthField>,
}

impl FrameFieldSequence {
    /// Half frame count `F`.
    pub fn half_frames(&self) -> u32 {
        self.half_frames
    }

    /// Total frame count, always `2F + 1`.
    pub fn total_frames(&self) -> usize {
        self.fields.len()
    }

    /// Tick of a frame index: `index / 2F`.
    pub fn tick_of(&self, index: usize) -> f64 {
        index as f64 / (self.fields.len() - 1) as f64
    }

    /// Field for one frame index.
    pub fn field(&self, index: usize) -> &DepthField {
        &self.fields[index]
    }

    /// The unwarped center frame.
    pub fn center(&self) -> &DepthField {
        &self.fields[self.half_frames as usize]
    }

    /// All frames in tick order.
    pub fn fields(&self) -> &[DepthField] {
        &self.fields
    }
}

/// Build the full frame sequence by displacing every cell through its own
/// depth curve and max-compositing the results.
///
/// Frames are generated outward from the center in both directions, one tick
/// step at a time; each step uses the immediately closer-to-center frame to
/// fill destination cells no source cell reached. That frame-to-frame
/// dependency is strictly sequential; the per-cell scatter inside one frame is
/// data parallel.
#[tracing::instrument(skip_all, fields(
    width = depth.size().width,
    height = depth.size().height,
    half_frames = params.half_frames,
))]
pub(crate) fn build_frame_fields(
    depth: &DepthField,
    params: &SceneParams,
    cancel: &CancelToken,
    progress: &ProgressFn,
) -> HolopathResult<FrameFieldSequence> {
    let half = params.half_frames as usize;
    let total = 2 * half + 1;

    cancel.checkpoint()?;
    let center = depth.clone();
    report(progress, Stage::WarpFields, 1.0 / total as f64);

    let mut toward_one: Vec<DepthField> = Vec::with_capacity(half);
    let mut toward_zero: Vec<DepthField> = Vec::with_capacity(half);
    for i in 1..=half {
        let step = 0.5 * i as f64 / half as f64;

        cancel.checkpoint()?;
        let warped = {
            let fallback = toward_one.last().unwrap_or(&center);
            warp_field(depth, 0.5 + step, params, fallback)
        };
        toward_one.push(warped);
        report(progress, Stage::WarpFields, (2 * i) as f64 / total as f64);

        cancel.checkpoint()?;
        let warped = {
            let fallback = toward_zero.last().unwrap_or(&center);
            warp_field(depth, 0.5 - step, params, fallback)
        };
        toward_zero.push(warped);
        report(progress, Stage::WarpFields, (2 * i + 1) as f64 / total as f64);
    }

    let mut fields = Vec::with_capacity(total);
    fields.extend(toward_zero.into_iter().rev());
    fields.push(center);
    fields.extend(toward_one);
    tracing::debug!(frames = fields.len(), "frame depth fields rebuilt");

    Ok(FrameFieldSequence {
        half_frames: params.half_frames,
        fields,
    })
}

/// Forward-displace `src` to tick `t` with max-compositing; cells receiving no
/// contribution inherit the value of `fallback` at the same cell.
fn warp_field(src: &DepthField, t: f64, params: &SceneParams, fallback: &DepthField) -> DepthField {
    let size = src.size();
    let w = size.width as usize;
    let h = size.height as usize;
    let curvature_scale = params.curvature_scale(size.width);

    let cells: Vec<AtomicU32> = std::iter::repeat_with(|| AtomicU32::new(EMPTY_CELL))
        .take(w * h)
        .collect();

    let src_data = src.data();
    (0..h).into_par_iter().for_each(|row| {
        for col in 0..w {
            let depth = src_data[row * w + col];
            // NaN depths can never win the max-reduction and would make the
            // scatter order dependent; drop them at the source.
            if depth.is_nan() {
                continue;
            }
            let d = ParallaxCurve::displacement(
                depth,
                params.zero_depth,
                params.a_factor,
                curvature_scale,
            )
            .eval(t);
            let x = col as f64 + d.x;
            let y = row as f64 + d.y;
            if !size.contains(x, y) {
                continue;
            }
            let tx = (x.round() as usize).min(w - 1);
            let ty = (y.round() as usize).min(h - 1);
            atomic_max(&cells[ty * w + tx], depth);
        }
    });

    let fallback_data = fallback.data();
    let data = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let bits = cell.load(Ordering::Relaxed);
            if bits == EMPTY_CELL {
                fallback_data[i]
            } else {
                f32::from_bits(bits)
            }
        })
        .collect();
    DepthField::from_parts(size, data)
}

/// Lock-free maximum of an f32 stored as bits. Multiple source cells scatter
/// into the same destination, so the reduction must not be last-write-wins.
fn atomic_max(cell: &AtomicU32, value: f32) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        if current != EMPTY_CELL && f32::from_bits(current) >= value {
            return;
        }
        match cell.compare_exchange_weak(
            current,
            value.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(seen) => current = seen,
        }
    }
}
