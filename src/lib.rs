//! Holopath is a depth-driven parallax curve and occlusion-visibility engine
//! for scratch hologram rendering.
//!
//! Given a per-pixel depth estimate and a set of sampled image points, the
//! engine moves every point along a depth-dependent cubic curve as a function
//! of a normalized phase (the "tick"), estimates what the whole depth field
//! looks like after that displacement, and decides per tick which points are
//! hidden behind the displaced surface. Visible curve segments are exported
//! as SVG strokes or rasterized for interactive preview.
//!
//! The public surface is session oriented:
//!
//! - Load a [`DepthField`] and a point collection into a [`ParallaxSession`]
//! - Export with [`ParallaxSession::export_svg`] or scrub with
//!   [`ParallaxSession::render_tick`]
//! - For non-blocking use, `spawn_*` variants run on a background thread and
//!   report [`StageProgress`] through a callback, with cooperative
//!   cancellation via [`CancelToken`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub(crate) mod cache;
pub(crate) mod curve;
pub(crate) mod engine;
pub(crate) mod field;
pub(crate) mod foundation;
pub(crate) mod points;
pub(crate) mod render;
pub(crate) mod visibility;

pub use crate::curve::model::ParallaxCurve;
pub use crate::engine::params::{ColorMode, SceneParams};
pub use crate::engine::session::{CacheStats, ParallaxSession};
pub use crate::engine::worker::{
    CancelToken, JobHandle, ProgressFn, Stage, StageProgress, no_progress,
};
pub use crate::field::depth::DepthField;
pub use crate::field::warp::FrameFieldSequence;
pub use crate::foundation::core::{CubicBez, FieldSize, Point, SamplePoint, TickInterval, Vec2};
pub use crate::foundation::error::{HolopathError, HolopathResult};
pub use crate::points::set::PointSet;
pub use crate::visibility::intervals::{PointIntervals, VisibilityTable};
