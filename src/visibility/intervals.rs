use rayon::prelude::*;
use smallvec::SmallVec;

use crate::curve::model::ParallaxCurve;
use crate::engine::params::SceneParams;
use crate::engine::worker::{CancelToken, ProgressFn, Stage, report};
use crate::field::depth::DepthField;
use crate::field::warp::FrameFieldSequence;
use crate::foundation::core::{SamplePoint, TickInterval};
use crate::foundation::error::HolopathResult;

/// Interval list of one point; almost always one or two entries.
pub type PointIntervals = SmallVec<[TickInterval; 2]>;

/// Per-point visibility intervals, aligned with the input point order.
///
/// A point with an empty list is never drawn: either it sits within the
/// zero-depth tolerance, lies outside the field, or is occluded at every
/// frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibilityTable {
    per_point: Vec<PointIntervals>,
}

impl VisibilityTable {
    /// Number of points in the table.
    pub fn len(&self) -> usize {
        self.per_point.len()
    }

    /// Return `true` when the table holds no points.
    pub fn is_empty(&self) -> bool {
        self.per_point.is_empty()
    }

    /// Sorted, non-overlapping intervals of one point.
    pub fn intervals(&self, index: usize) -> &[TickInterval] {
        &self.per_point[index]
    }

    /// Return `true` when the point is visible at the given tick.
    pub fn is_shown(&self, index: usize, tick: f64) -> bool {
        self.per_point[index].iter().any(|iv| iv.contains(tick))
    }
}

/// Decide, per point, for which ticks its own motion keeps it in front of the
/// displaced surface. Points are independent and processed in parallel into
/// disjoint output slots.
#[tracing::instrument(skip_all, fields(points = points.len()))]
pub(crate) fn compute_visibility(
    points: &[SamplePoint],
    depth: &DepthField,
    frames: &FrameFieldSequence,
    params: &SceneParams,
    cancel: &CancelToken,
    progress: &ProgressFn,
) -> HolopathResult<VisibilityTable> {
    let curvature_scale = params.curvature_scale(depth.size().width);
    let total = points.len().max(1);
    let done = std::sync::atomic::AtomicUsize::new(0);

    let per_point = points
        .par_iter()
        .map(|point| -> HolopathResult<PointIntervals> {
            cancel.checkpoint()?;
            let intervals = point_intervals(point, depth, frames, params, curvature_scale);
            let n = done.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
            report(progress, Stage::Visibility, n as f64 / total as f64);
            Ok(intervals)
        })
        .collect::<HolopathResult<Vec<_>>>()?;

    Ok(VisibilityTable { per_point })
}

fn point_intervals(
    point: &SamplePoint,
    depth: &DepthField,
    frames: &FrameFieldSequence,
    params: &SceneParams,
    curvature_scale: f64,
) -> PointIntervals {
    let Some(point_depth) = depth.value_at_pixel(point.px, point.py) else {
        // Out-of-field points are a local skip, not an error.
        return SmallVec::new();
    };
    if (point_depth - params.zero_depth).abs() < params.ignore_depth_tolerance {
        // Motionless points are excluded entirely, not given a full interval.
        return SmallVec::new();
    }

    let curve = ParallaxCurve::build(
        point.pos(),
        point_depth,
        params.zero_depth,
        params.a_factor,
        curvature_scale,
    );

    let total = frames.total_frames();
    let mut shown = Vec::with_capacity(total);
    for index in 0..total {
        let pos = curve.eval(frames.tick_of(index));
        let visible = match frames.field(index).sample_rounded(pos.x, pos.y) {
            // No occluder exists off canvas.
            None => true,
            // One unit of tolerance keeps a point from occluding itself
            // through rounding noise in the warped field.
            Some(surface) => surface - 1.0 < point_depth,
        };
        if visible {
            shown.push(index);
        }
    }
    merge_shown_frames(&shown, total)
}

/// Merge an ascending list of shown frame indices into tick intervals.
///
/// Runs of adjacent indices (difference <= 1) become one interval
/// `[first / (total-1), last / (total-1)]`. A run of length one collapses to
/// zero width and is dropped rather than emitted, so a point shown in a
/// single isolated frame never reaches the output.
pub(crate) fn merge_shown_frames(indices: &[usize], total_frames: usize) -> PointIntervals {
    let mut out = SmallVec::new();
    let Some((&first, rest)) = indices.split_first() else {
        return out;
    };
    let denominator = (total_frames - 1) as f64;

    let mut run_start = first;
    let mut run_end = first;
    for &index in rest {
        if index <= run_end + 1 {
            run_end = index;
            continue;
        }
        push_run(&mut out, run_start, run_end, denominator);
        run_start = index;
        run_end = index;
    }
    push_run(&mut out, run_start, run_end, denominator);
    out
}

fn push_run(out: &mut PointIntervals, start: usize, end: usize, denominator: f64) {
    if end > start {
        out.push(TickInterval {
            start: start as f64 / denominator,
            end: end as f64 / denominator,
        });
    }
}
