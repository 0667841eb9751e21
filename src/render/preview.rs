use std::collections::HashSet;

use image::{Rgba, RgbaImage};

use crate::curve::model::ParallaxCurve;
use crate::engine::params::{ColorMode, SceneParams};
use crate::engine::worker::{CancelToken, ProgressFn, Stage, report};
use crate::field::depth::DepthField;
use crate::field::warp::FrameFieldSequence;
use crate::foundation::core::{FieldSize, Point, SamplePoint};
use crate::foundation::error::{HolopathError, HolopathResult};
use crate::visibility::intervals::VisibilityTable;

/// Rasterize one tick: a one-pixel marker at every visible point's evaluated
/// position. Points outside their visibility intervals or within the
/// zero-depth tolerance are skipped; positions off canvas are skipped
/// silently.
pub(crate) fn render_tick_frame(
    points: &[SamplePoint],
    depth: &DepthField,
    source: Option<&RgbaImage>,
    visibility: &VisibilityTable,
    params: &SceneParams,
    tick: f64,
    mode: ColorMode,
    cancel: &CancelToken,
    progress: &ProgressFn,
) -> HolopathResult<RgbaImage> {
    if matches!(mode, ColorMode::Source) && source.is_none() {
        return Err(HolopathError::invalid_input(
            "color mode `source` requires a source image",
        ));
    }
    let size = depth.size();
    let curvature_scale = params.curvature_scale(size.width);
    let mut out = RgbaImage::new(size.width, size.height);
    let total = points.len().max(1);

    for (index, point) in points.iter().enumerate() {
        cancel.checkpoint()?;
        if !visibility.is_shown(index, tick) {
            continue;
        }
        let Some(point_depth) = depth.value_at_pixel(point.px, point.py) else {
            continue;
        };
        if (point_depth - params.zero_depth).abs() < params.ignore_depth_tolerance {
            continue;
        }
        let pos = ParallaxCurve::build(
            point.pos(),
            point_depth,
            params.zero_depth,
            params.a_factor,
            curvature_scale,
        )
        .eval(tick);
        let Some((x, y)) = raster_pos(pos, size) else {
            continue;
        };
        let Some(color) = marker_color(mode, source, point, point_depth) else {
            continue;
        };
        out.put_pixel(x, y, color);
        report(progress, Stage::Preview, (index + 1) as f64 / total as f64);
    }
    Ok(out)
}

/// Rasterize every visible tick position of every point, depth encoded as
/// grayscale. Repeated landings of one point on the same pixel are drawn
/// once.
pub(crate) fn render_trajectories(
    points: &[SamplePoint],
    depth: &DepthField,
    frames: &FrameFieldSequence,
    visibility: &VisibilityTable,
    params: &SceneParams,
    cancel: &CancelToken,
    progress: &ProgressFn,
) -> HolopathResult<RgbaImage> {
    let size = depth.size();
    let curvature_scale = params.curvature_scale(size.width);
    let mut out = RgbaImage::new(size.width, size.height);
    let total = points.len().max(1);

    for (index, point) in points.iter().enumerate() {
        cancel.checkpoint()?;
        let Some(point_depth) = depth.value_at_pixel(point.px, point.py) else {
            continue;
        };
        if (point_depth - params.zero_depth).abs() < params.ignore_depth_tolerance {
            continue;
        }
        let curve = ParallaxCurve::build(
            point.pos(),
            point_depth,
            params.zero_depth,
            params.a_factor,
            curvature_scale,
        );
        let mut drawn = HashSet::new();
        for frame in 0..frames.total_frames() {
            let tick = frames.tick_of(frame);
            if !visibility.is_shown(index, tick) {
                continue;
            }
            let Some((x, y)) = raster_pos(curve.eval(tick), size) else {
                continue;
            };
            if drawn.insert((x, y)) {
                out.put_pixel(x, y, depth_gray(point_depth));
            }
        }
        report(progress, Stage::Preview, (index + 1) as f64 / total as f64);
    }
    Ok(out)
}

fn raster_pos(pos: Point, size: FieldSize) -> Option<(u32, u32)> {
    if !size.contains(pos.x, pos.y) {
        return None;
    }
    let x = (pos.x.round() as u32).min(size.width - 1);
    let y = (pos.y.round() as u32).min(size.height - 1);
    Some((x, y))
}

fn marker_color(
    mode: ColorMode,
    source: Option<&RgbaImage>,
    point: &SamplePoint,
    point_depth: f32,
) -> Option<Rgba<u8>> {
    match mode {
        ColorMode::Source => {
            let image = source?;
            if point.px < 0 || point.py < 0 {
                return None;
            }
            image
                .get_pixel_checked(point.px as u32, point.py as u32)
                .copied()
        }
        ColorMode::DepthGray => Some(depth_gray(point_depth)),
        ColorMode::Fixed(rgba) => Some(Rgba(rgba)),
    }
}

fn depth_gray(depth: f32) -> Rgba<u8> {
    let v = depth.clamp(0.0, 255.0).round() as u8;
    Rgba([v, v, v, 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::worker::no_progress;
    use crate::field::warp::build_frame_fields;
    use crate::visibility::intervals::compute_visibility;

    fn scene(
        depth: &DepthField,
        points: &[SamplePoint],
        params: &SceneParams,
    ) -> (FrameFieldSequence, VisibilityTable) {
        let cancel = CancelToken::new();
        let frames = build_frame_fields(depth, params, &cancel, &no_progress()).unwrap();
        let vis =
            compute_visibility(points, depth, &frames, params, &cancel, &no_progress()).unwrap();
        (frames, vis)
    }

    fn flat_params() -> SceneParams {
        SceneParams {
            zero_depth: 0.0,
            half_frames: 2,
            ..SceneParams::default()
        }
    }

    #[test]
    fn markers_land_on_the_evaluated_position() {
        // Depth equal to zero depth: no motion, the marker sits on the point.
        let depth = DepthField::filled(FieldSize::new(8, 8).unwrap(), 0.0);
        let points = [SamplePoint::from_pixel(3, 5)];
        let params = flat_params();
        let (_, vis) = scene(&depth, &points, &params);
        let img = render_tick_frame(
            &points,
            &depth,
            None,
            &vis,
            &params,
            0.25,
            ColorMode::Fixed([9, 8, 7, 255]),
            &CancelToken::new(),
            &no_progress(),
        )
        .unwrap();
        assert_eq!(img.get_pixel(3, 5), &Rgba([9, 8, 7, 255]));
        let lit = img.pixels().filter(|p| p.0[3] != 0).count();
        assert_eq!(lit, 1);
    }

    #[test]
    fn hidden_and_tolerance_points_are_skipped() {
        let depth = DepthField::filled(FieldSize::new(8, 8).unwrap(), 1.0);
        let points = [SamplePoint::from_pixel(2, 2)];
        let params = SceneParams {
            ignore_depth_tolerance: 4.0,
            ..flat_params()
        };
        let (_, vis) = scene(&depth, &points, &params);
        let img = render_tick_frame(
            &points,
            &depth,
            None,
            &vis,
            &params,
            0.5,
            ColorMode::DepthGray,
            &CancelToken::new(),
            &no_progress(),
        )
        .unwrap();
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn source_mode_requires_a_source_image() {
        let depth = DepthField::filled(FieldSize::new(4, 4).unwrap(), 0.0);
        let points = [SamplePoint::from_pixel(1, 1)];
        let params = flat_params();
        let (_, vis) = scene(&depth, &points, &params);
        let err = render_tick_frame(
            &points,
            &depth,
            None,
            &vis,
            &params,
            0.5,
            ColorMode::Source,
            &CancelToken::new(),
            &no_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, HolopathError::InvalidInput(_)));
    }

    #[test]
    fn source_mode_samples_the_point_pixel() {
        let depth = DepthField::filled(FieldSize::new(4, 4).unwrap(), 0.0);
        let mut source = RgbaImage::new(4, 4);
        source.put_pixel(1, 2, Rgba([10, 20, 30, 255]));
        let points = [SamplePoint::from_pixel(1, 2)];
        let params = flat_params();
        let (_, vis) = scene(&depth, &points, &params);
        let img = render_tick_frame(
            &points,
            &depth,
            Some(&source),
            &vis,
            &params,
            0.5,
            ColorMode::Source,
            &CancelToken::new(),
            &no_progress(),
        )
        .unwrap();
        assert_eq!(img.get_pixel(1, 2), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn trajectories_dedup_repeated_landings() {
        // A motionless point lands on its own pixel at every frame; the
        // trajectory raster still holds exactly one marker for it.
        let depth = DepthField::filled(FieldSize::new(6, 6).unwrap(), 50.0);
        let points = [SamplePoint::from_pixel(4, 1)];
        let params = SceneParams {
            zero_depth: 50.0,
            half_frames: 3,
            ..SceneParams::default()
        };
        let (frames, vis) = scene(&depth, &points, &params);
        let img = render_trajectories(
            &points,
            &depth,
            &frames,
            &vis,
            &params,
            &CancelToken::new(),
            &no_progress(),
        )
        .unwrap();
        let lit: Vec<_> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[3] != 0)
            .collect();
        assert_eq!(lit.len(), 1);
        assert_eq!(lit[0].0, 4);
        assert_eq!(lit[0].1, 1);
        assert_eq!(lit[0].2, &Rgba([50, 50, 50, 255]));
    }
}
