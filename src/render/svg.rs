use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::curve::model::ParallaxCurve;
use crate::engine::params::SceneParams;
use crate::engine::worker::{CancelToken, ProgressFn, Stage, report};
use crate::field::depth::DepthField;
use crate::foundation::core::{FieldSize, SamplePoint};
use crate::foundation::error::HolopathResult;
use crate::visibility::intervals::VisibilityTable;

const SVG_FOOTER: &str = "</svg>";

fn svg_header(size: FieldSize) -> String {
    format!(
        "<svg width=\"{}px\" height=\"{}px\" xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\">\n",
        size.width, size.height
    )
}

fn path_element(data: &str) -> String {
    format!("<path d=\"{data}\" stroke=\"black\" fill=\"none\" stroke-width=\"1\"/>\n")
}

/// Assemble the occlusion-culled vector document: one stroke per visible
/// interval of every point, each interval clipped out of the mother curve by
/// exact subdivision.
///
/// Segments are independent, non-overlapping line strokes, so their order in
/// the document carries no meaning; the fan-out over points runs in parallel
/// and results are concatenated in point order.
pub(crate) fn export_occluded(
    points: &[SamplePoint],
    depth: &DepthField,
    visibility: &VisibilityTable,
    params: &SceneParams,
    cancel: &CancelToken,
    progress: &ProgressFn,
) -> HolopathResult<String> {
    let curvature_scale = params.curvature_scale(depth.size().width);
    let total = points.len().max(1);
    let done = AtomicUsize::new(0);

    let per_point = points
        .par_iter()
        .enumerate()
        .map(|(index, point)| -> HolopathResult<Vec<String>> {
            cancel.checkpoint()?;
            let elements = match depth.value_at_pixel(point.px, point.py) {
                None => Vec::new(),
                Some(point_depth) => {
                    let curve = ParallaxCurve::build(
                        point.pos(),
                        point_depth,
                        params.zero_depth,
                        params.a_factor,
                        curvature_scale,
                    );
                    visibility
                        .intervals(index)
                        .iter()
                        .map(|iv| path_element(&curve.subsegment(iv.start, iv.end).to_path_data()))
                        .collect()
                }
            };
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            report(progress, Stage::Export, n as f64 / total as f64);
            Ok(elements)
        })
        .collect::<HolopathResult<Vec<_>>>()?;

    Ok(assemble(depth.size(), per_point.iter().flatten()))
}

/// Direct export of the full curves without occlusion culling, for quick
/// previews of the stroke layout. `positive_depth_only` drops every point
/// behind the zero-depth plane.
pub(crate) fn export_unoccluded(
    points: &[SamplePoint],
    depth: &DepthField,
    params: &SceneParams,
    positive_depth_only: bool,
    cancel: &CancelToken,
) -> HolopathResult<String> {
    let curvature_scale = params.curvature_scale(depth.size().width);

    let elements = points
        .par_iter()
        .map(|point| -> HolopathResult<Option<String>> {
            cancel.checkpoint()?;
            let Some(point_depth) = depth.value_at_pixel(point.px, point.py) else {
                return Ok(None);
            };
            if positive_depth_only && point_depth < params.zero_depth {
                return Ok(None);
            }
            if (point_depth - params.zero_depth).abs() < params.ignore_depth_tolerance {
                return Ok(None);
            }
            let curve = ParallaxCurve::build(
                point.pos(),
                point_depth,
                params.zero_depth,
                params.a_factor,
                curvature_scale,
            );
            Ok(Some(path_element(&curve.to_path_data())))
        })
        .collect::<HolopathResult<Vec<_>>>()?;

    Ok(assemble(depth.size(), elements.iter().flatten()))
}

fn assemble<'a>(size: FieldSize, elements: impl Iterator<Item = &'a String>) -> String {
    let mut doc = svg_header(size);
    for element in elements {
        doc.push_str(element);
    }
    doc.push_str(SVG_FOOTER);
    doc
}
