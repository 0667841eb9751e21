use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use image::RgbaImage;
use xxhash_rust::xxh3::Xxh3;

use crate::engine::params::{ColorMode, SceneParams};
use crate::field::depth::DepthField;
use crate::field::warp::FrameFieldSequence;
use crate::foundation::core::SamplePoint;
use crate::visibility::intervals::VisibilityTable;

const POINTS_SEED: u64 = 0x41c8_2f5d_b09e_6713;

/// Value-compared identity of one frame-field rebuild.
///
/// Floats are keyed by their bit patterns; the depth field is keyed by a
/// content fingerprint rather than reference identity, so reloading an
/// identical field does not force a rebuild and mutating parameters always
/// does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct FrameKey {
    depth_fingerprint: u64,
    width: u32,
    height: u32,
    half_frames: u32,
    zero_depth_bits: u32,
    a_factor_bits: u64,
    b_factor_bits: u64,
}

impl FrameKey {
    pub(crate) fn new(depth: &DepthField, params: &SceneParams) -> Self {
        let size = depth.size();
        Self {
            depth_fingerprint: depth.fingerprint(),
            width: size.width,
            height: size.height,
            half_frames: params.half_frames,
            zero_depth_bits: params.zero_depth.to_bits(),
            a_factor_bits: params.a_factor.to_bits(),
            b_factor_bits: params.b_factor.to_bits(),
        }
    }
}

/// Value-compared identity of one full scene rebuild (frames + visibility).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SceneKey {
    pub(crate) frame: FrameKey,
    tolerance_bits: u32,
    points_fingerprint: u64,
}

impl SceneKey {
    pub(crate) fn new(depth: &DepthField, points: &[SamplePoint], params: &SceneParams) -> Self {
        Self {
            frame: FrameKey::new(depth, params),
            tolerance_bits: params.ignore_depth_tolerance.to_bits(),
            points_fingerprint: points_fingerprint(points),
        }
    }
}

/// Order-sensitive fingerprint of the point list (outputs are indexed by
/// point order, so reordering is a different scene).
fn points_fingerprint(points: &[SamplePoint]) -> u64 {
    let mut h = Xxh3::with_seed(POINTS_SEED);
    h.update(&(points.len() as u64).to_le_bytes());
    for p in points {
        h.update(&p.px.to_le_bytes());
        h.update(&p.py.to_le_bytes());
    }
    h.digest()
}

/// One committed cache generation: the frame sequence and visibility table
/// built from a single consistent snapshot of the inputs.
pub(crate) struct CacheSlot {
    pub(crate) generation: u64,
    pub(crate) key: SceneKey,
    pub(crate) frames: Arc<FrameFieldSequence>,
    pub(crate) visibility: Arc<VisibilityTable>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PreviewKey {
    generation: u64,
    millitick: i64,
    mode: ColorMode,
}

/// Memoizes frame-field and visibility rebuilds plus rasterized preview
/// frames.
///
/// Writer discipline: at most one rebuild is in flight (the mutex that owns
/// the generation counter), and a rebuild becomes visible only through a
/// single `Arc` swap of a fully built slot. Readers therefore observe either
/// the complete previous generation or the complete new one, never a mixture.
pub(crate) struct ResultCache {
    slot: RwLock<Option<Arc<CacheSlot>>>,
    rebuild: Mutex<u64>,
    previews: Mutex<HashMap<PreviewKey, Arc<RgbaImage>>>,
}

impl ResultCache {
    pub(crate) fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            rebuild: Mutex::new(0),
            previews: Mutex::new(HashMap::new()),
        }
    }

    /// The committed slot for `key`, if the current generation matches it.
    pub(crate) fn lookup(&self, key: &SceneKey) -> Option<Arc<CacheSlot>> {
        self.current().filter(|slot| slot.key == *key)
    }

    /// The committed slot regardless of key.
    pub(crate) fn current(&self) -> Option<Arc<CacheSlot>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Acquire the single-writer rebuild lock. Held for the whole rebuild so
    /// overlapping requests serialize instead of interleaving.
    pub(crate) fn begin_rebuild(&self) -> MutexGuard<'_, u64> {
        self.rebuild.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit a fully built generation and drop every cached preview raster.
    pub(crate) fn commit(
        &self,
        counter: &mut MutexGuard<'_, u64>,
        key: SceneKey,
        frames: Arc<FrameFieldSequence>,
        visibility: Arc<VisibilityTable>,
    ) -> Arc<CacheSlot> {
        **counter += 1;
        let slot = Arc::new(CacheSlot {
            generation: **counter,
            key,
            frames,
            visibility,
        });
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&slot));
        self.previews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!(generation = slot.generation, "cache generation committed");
        slot
    }

    pub(crate) fn preview_get(
        &self,
        generation: u64,
        tick: f64,
        mode: ColorMode,
    ) -> Option<Arc<RgbaImage>> {
        let key = PreviewKey {
            generation,
            millitick: quantize_tick(tick),
            mode,
        };
        self.previews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub(crate) fn preview_put(
        &self,
        generation: u64,
        tick: f64,
        mode: ColorMode,
        image: Arc<RgbaImage>,
    ) {
        let key = PreviewKey {
            generation,
            millitick: quantize_tick(tick),
            mode,
        };
        self.previews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, image);
    }
}

/// Interactive scrubbing repeats nearby ticks; quantizing to milliticks makes
/// those requests share one rasterization.
pub(crate) fn quantize_tick(tick: f64) -> i64 {
    (tick * 1000.0).round() as i64
}
