use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use image::RgbaImage;

use crate::cache::result_cache::{CacheSlot, ResultCache, SceneKey};
use crate::engine::params::{ColorMode, SceneParams};
use crate::engine::worker::{CancelToken, ProgressFn};
use crate::field::depth::DepthField;
use crate::field::warp::build_frame_fields;
use crate::foundation::core::SamplePoint;
use crate::foundation::error::{HolopathError, HolopathResult};
use crate::render::{preview, svg};
use crate::visibility::intervals::compute_visibility;

/// Summary of the currently committed cache generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    /// Monotonic generation counter of the committed slot.
    pub generation: u64,
    /// Frame count of the committed sequence, always odd.
    pub total_frames: usize,
    /// Number of points the committed visibility table covers.
    pub point_count: usize,
}

/// The parallax engine session.
///
/// A session owns the scene inputs (depth field, optional source image,
/// sampled points), the scalar parameters and the result cache. Heavy
/// products are rebuilt lazily on first access after any input or parameter
/// change and discarded as a whole, never patched incrementally. All methods
/// take `&self`; a session wrapped in an [`Arc`] is shared freely with
/// background workers.
pub struct ParallaxSession {
    depth: RwLock<Option<Arc<DepthField>>>,
    source: RwLock<Option<Arc<RgbaImage>>>,
    points: RwLock<Arc<Vec<SamplePoint>>>,
    params: RwLock<SceneParams>,
    cache: ResultCache,
    in_flight: Mutex<Option<CancelToken>>,
}

/// One consistent snapshot of every input, taken at operation entry.
struct SceneInputs {
    depth: Arc<DepthField>,
    source: Option<Arc<RgbaImage>>,
    points: Arc<Vec<SamplePoint>>,
    params: SceneParams,
}

impl Default for ParallaxSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallaxSession {
    /// Create an empty session with default parameters.
    pub fn new() -> Self {
        Self {
            depth: RwLock::new(None),
            source: RwLock::new(None),
            points: RwLock::new(Arc::new(Vec::new())),
            params: RwLock::new(SceneParams::default()),
            cache: ResultCache::new(),
            in_flight: Mutex::new(None),
        }
    }

    /// Load the depth field. Cancels in-flight work; cached products are
    /// superseded lazily through the value-compared cache key.
    pub fn set_depth_field(&self, field: DepthField) {
        self.supersede_in_flight();
        *write(&self.depth) = Some(Arc::new(field));
    }

    /// Load the source image used by [`ColorMode::Source`] previews.
    pub fn set_source_image(&self, image: RgbaImage) {
        self.supersede_in_flight();
        *write(&self.source) = Some(Arc::new(image));
    }

    /// Replace the sampled point collection. Points are deduplicated on their
    /// integer pixel key, first occurrence wins, order otherwise preserved.
    pub fn set_points(&self, points: impl IntoIterator<Item = SamplePoint>) {
        self.supersede_in_flight();
        let mut seen = HashSet::new();
        let deduped: Vec<SamplePoint> = points
            .into_iter()
            .filter(|p| seen.insert(p.pixel_key()))
            .collect();
        *write(&self.points) = Arc::new(deduped);
    }

    /// Replace the scene parameters.
    pub fn set_params(&self, params: SceneParams) {
        self.supersede_in_flight();
        *write(&self.params) = params;
    }

    /// The current scene parameters.
    pub fn params(&self) -> SceneParams {
        *read(&self.params)
    }

    /// The current deduplicated point collection.
    pub fn points(&self) -> Arc<Vec<SamplePoint>> {
        Arc::clone(&read(&self.points))
    }

    /// Summary of the committed cache generation, if one exists.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.current().map(|slot| CacheStats {
            generation: slot.generation,
            total_frames: slot.frames.total_frames(),
            point_count: slot.visibility.len(),
        })
    }

    /// Export the occlusion-culled SVG document.
    ///
    /// Rebuilds the frame fields and visibility intervals if the cache
    /// generation does not match the current inputs, then emits one stroke
    /// path per visible interval of every point.
    #[tracing::instrument(skip_all)]
    pub fn export_svg(&self, cancel: &CancelToken, progress: &ProgressFn) -> HolopathResult<String> {
        let inputs = self.snapshot()?;
        let slot = self.ensure_scene(&inputs, cancel, progress)?;
        svg::export_occluded(
            &inputs.points,
            &inputs.depth,
            &slot.visibility,
            &inputs.params,
            cancel,
            progress,
        )
    }

    /// Export the full curves without occlusion culling.
    ///
    /// Never touches the result cache; `positive_depth_only` drops points
    /// behind the zero-depth plane.
    #[tracing::instrument(skip_all)]
    pub fn export_svg_unoccluded(
        &self,
        positive_depth_only: bool,
        cancel: &CancelToken,
    ) -> HolopathResult<String> {
        let inputs = self.snapshot()?;
        svg::export_unoccluded(
            &inputs.points,
            &inputs.depth,
            &inputs.params,
            positive_depth_only,
            cancel,
        )
    }

    /// Rasterize one tick for interactive preview.
    ///
    /// Served from the tick-quantized preview cache when possible; scrubbing
    /// over nearby ticks shares one rasterization per millitick.
    #[tracing::instrument(skip_all, fields(tick = tick))]
    pub fn render_tick(
        &self,
        tick: f64,
        mode: ColorMode,
        cancel: &CancelToken,
        progress: &ProgressFn,
    ) -> HolopathResult<Arc<RgbaImage>> {
        let inputs = self.snapshot()?;
        if matches!(mode, ColorMode::Source) && inputs.source.is_none() {
            return Err(HolopathError::invalid_input(
                "color mode `source` requires a source image",
            ));
        }
        let slot = self.ensure_scene(&inputs, cancel, progress)?;
        if let Some(cached) = self.cache.preview_get(slot.generation, tick, mode) {
            return Ok(cached);
        }
        let image = preview::render_tick_frame(
            &inputs.points,
            &inputs.depth,
            inputs.source.as_deref(),
            &slot.visibility,
            &inputs.params,
            tick,
            mode,
            cancel,
            progress,
        )?;
        let image = Arc::new(image);
        self.cache
            .preview_put(slot.generation, tick, mode, Arc::clone(&image));
        Ok(image)
    }

    /// Rasterize a stereo pair: the left eye at `tick`, the right eye at
    /// `tick + eye_span`. Both frames go through the tick cache.
    pub fn render_stereo_pair(
        &self,
        tick: f64,
        eye_span: f64,
        mode: ColorMode,
        cancel: &CancelToken,
        progress: &ProgressFn,
    ) -> HolopathResult<(Arc<RgbaImage>, Arc<RgbaImage>)> {
        let left = self.render_tick(tick, mode, cancel, progress)?;
        let right = self.render_tick(tick + eye_span, mode, cancel, progress)?;
        Ok((left, right))
    }

    /// Rasterize every visible tick position of every point.
    #[tracing::instrument(skip_all)]
    pub fn render_trajectories(
        &self,
        cancel: &CancelToken,
        progress: &ProgressFn,
    ) -> HolopathResult<RgbaImage> {
        let inputs = self.snapshot()?;
        let slot = self.ensure_scene(&inputs, cancel, progress)?;
        preview::render_trajectories(
            &inputs.points,
            &inputs.depth,
            &slot.frames,
            &slot.visibility,
            &inputs.params,
            cancel,
            progress,
        )
    }

    /// Validate and snapshot the inputs. Fails before any cache mutation, so
    /// a missing depth field can never leave a half-built generation behind.
    fn snapshot(&self) -> HolopathResult<SceneInputs> {
        let depth = read(&self.depth)
            .clone()
            .ok_or_else(|| HolopathError::invalid_input("no depth field loaded"))?;
        let params = *read(&self.params);
        params.validate()?;
        Ok(SceneInputs {
            depth,
            source: read(&self.source).clone(),
            points: Arc::clone(&read(&self.points)),
            params,
        })
    }

    /// Return the committed slot for the snapshot, rebuilding it if the
    /// value-compared key changed.
    ///
    /// The rebuild lock serializes writers; the double lookup after taking it
    /// collapses racing requests for the same key onto one rebuild. Frame
    /// fields are carried over from the previous generation when only the
    /// visibility half of the key changed, but the commit is still a single
    /// all-or-nothing slot swap.
    fn ensure_scene(
        &self,
        inputs: &SceneInputs,
        cancel: &CancelToken,
        progress: &ProgressFn,
    ) -> HolopathResult<Arc<CacheSlot>> {
        let key = SceneKey::new(&inputs.depth, &inputs.points, &inputs.params);
        if let Some(slot) = self.cache.lookup(&key) {
            return Ok(slot);
        }

        let mut counter = self.cache.begin_rebuild();
        if let Some(slot) = self.cache.lookup(&key) {
            return Ok(slot);
        }

        let previous = self.cache.current();
        let frames = match previous.filter(|slot| slot.key.frame == key.frame) {
            Some(slot) => Arc::clone(&slot.frames),
            None => Arc::new(build_frame_fields(
                &inputs.depth,
                &inputs.params,
                cancel,
                progress,
            )?),
        };
        let visibility = Arc::new(compute_visibility(
            &inputs.points,
            &inputs.depth,
            &frames,
            &inputs.params,
            cancel,
            progress,
        )?);
        Ok(self.cache.commit(&mut counter, key, frames, visibility))
    }

    /// Cancel whatever job is currently registered and register `token` in
    /// its place.
    pub(crate) fn register_job(&self, token: &CancelToken) {
        let mut guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = guard.replace(token.clone()) {
            old.cancel();
        }
    }

    /// Cancel in-flight work; called whenever an input or parameter changes
    /// so stale rebuilds abort instead of committing an outdated generation.
    fn supersede_in_flight(&self) {
        let mut guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = guard.take() {
            old.cancel();
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::worker::no_progress;
    use crate::foundation::core::FieldSize;

    fn ready_session() -> ParallaxSession {
        let session = ParallaxSession::new();
        session.set_depth_field(DepthField::filled(FieldSize::new(8, 8).unwrap(), 200.0));
        session.set_points([SamplePoint::from_pixel(2, 2), SamplePoint::from_pixel(5, 5)]);
        session.set_params(SceneParams {
            half_frames: 2,
            ..SceneParams::default()
        });
        session
    }

    #[test]
    fn missing_depth_field_is_an_input_error_before_any_cache_mutation() {
        let session = ParallaxSession::new();
        let err = session
            .export_svg(&CancelToken::new(), &no_progress())
            .unwrap_err();
        assert!(matches!(err, HolopathError::InvalidInput(_)));
        assert!(session.cache_stats().is_none());
    }

    #[test]
    fn points_deduplicate_on_the_pixel_key() {
        let session = ParallaxSession::new();
        session.set_points([
            SamplePoint::new(2.2, 2.2),
            SamplePoint::new(1.8, 2.4),
            SamplePoint::new(5.0, 5.0),
        ]);
        let points = session.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].pixel_key(), (2, 2));
        assert_eq!(points[1].pixel_key(), (5, 5));
    }

    #[test]
    fn repeated_exports_reuse_the_committed_generation() {
        let session = ready_session();
        let cancel = CancelToken::new();
        let a = session.export_svg(&cancel, &no_progress()).unwrap();
        let g1 = session.cache_stats().unwrap().generation;
        let b = session.export_svg(&cancel, &no_progress()).unwrap();
        let g2 = session.cache_stats().unwrap().generation;
        assert_eq!(a, b);
        assert_eq!(g1, g2);
    }

    #[test]
    fn parameter_changes_supersede_the_generation_as_a_unit() {
        let session = ready_session();
        let cancel = CancelToken::new();
        session.export_svg(&cancel, &no_progress()).unwrap();
        let before = session.cache_stats().unwrap();
        assert_eq!(before.total_frames, 5);

        session.set_params(SceneParams {
            half_frames: 4,
            ..session.params()
        });
        session.export_svg(&cancel, &no_progress()).unwrap();
        let after = session.cache_stats().unwrap();
        assert_eq!(after.total_frames, 9);
        assert_eq!(after.point_count, 2);
        assert!(after.generation > before.generation);
    }

    #[test]
    fn tolerance_only_changes_reuse_the_frame_fields() {
        let session = ready_session();
        let cancel = CancelToken::new();
        session.export_svg(&cancel, &no_progress()).unwrap();
        let before = session.cache_stats().unwrap();

        session.set_params(SceneParams {
            ignore_depth_tolerance: 3.0,
            ..session.params()
        });
        session.export_svg(&cancel, &no_progress()).unwrap();
        let after = session.cache_stats().unwrap();
        // New generation, same frame sequence shape.
        assert!(after.generation > before.generation);
        assert_eq!(after.total_frames, before.total_frames);
    }

    #[test]
    fn tick_previews_are_cached_per_millitick() {
        let session = ready_session();
        let cancel = CancelToken::new();
        let a = session
            .render_tick(0.5, ColorMode::DepthGray, &cancel, &no_progress())
            .unwrap();
        let b = session
            .render_tick(0.5002, ColorMode::DepthGray, &cancel, &no_progress())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = session
            .render_tick(0.51, ColorMode::DepthGray, &cancel, &no_progress())
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn stereo_pair_renders_two_offset_ticks() {
        let session = ready_session();
        let cancel = CancelToken::new();
        let (left, right) = session
            .render_stereo_pair(0.4, 0.2, ColorMode::DepthGray, &cancel, &no_progress())
            .unwrap();
        assert!(!Arc::ptr_eq(&left, &right));
        // The right eye equals a direct render of the offset tick.
        let direct = session
            .render_tick(0.6, ColorMode::DepthGray, &cancel, &no_progress())
            .unwrap();
        assert!(Arc::ptr_eq(&right, &direct));
    }

    #[test]
    fn cancelled_rebuilds_commit_nothing() {
        let session = ready_session();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = session.export_svg(&cancel, &no_progress()).unwrap_err();
        assert!(matches!(err, HolopathError::Cancelled));
        assert!(session.cache_stats().is_none());
    }
}
