use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use image::RgbaImage;

use crate::engine::params::ColorMode;
use crate::engine::session::ParallaxSession;
use crate::foundation::error::{HolopathError, HolopathResult};

/// Cooperative cancellation flag shared between a job and its owner.
///
/// Heavy operations check the flag at per-frame and per-point granularity and
/// return [`HolopathError::Cancelled`] when it is set, so a superseding
/// parameter change can abort stale in-flight work without ever committing a
/// partial cache generation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Return `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn checkpoint(&self) -> HolopathResult<()> {
        if self.is_cancelled() {
            Err(HolopathError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Pipeline stages reported through [`ProgressFn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Building the displaced frame depth fields.
    WarpFields,
    /// Computing per-point visibility intervals.
    Visibility,
    /// Assembling exported path elements.
    Export,
    /// Rasterizing a preview frame.
    Preview,
}

/// A progress report for one stage; `fraction` grows toward `1.0` within the
/// stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageProgress {
    /// The stage being reported.
    pub stage: Stage,
    /// Completed fraction of the stage, in `[0, 1]`.
    pub fraction: f64,
}

/// Shared progress callback; invoked from worker threads, possibly
/// concurrently.
pub type ProgressFn = Arc<dyn Fn(StageProgress) + Send + Sync>;

/// A progress callback that discards every report.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

pub(crate) fn report(progress: &ProgressFn, stage: Stage, fraction: f64) {
    progress(StageProgress { stage, fraction });
}

/// Handle to a background engine job.
///
/// Dropping the handle detaches the job; it keeps running but its result is
/// discarded.
pub struct JobHandle<T> {
    cancel: CancelToken,
    handle: JoinHandle<HolopathResult<T>>,
}

impl<T> JobHandle<T> {
    /// Request cooperative cancellation of the job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the job's cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Return `true` once the job's thread has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the job finishes and return its result.
    pub fn join(self) -> HolopathResult<T> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(HolopathError::render("engine worker panicked")),
        }
    }
}

impl ParallaxSession {
    /// Export the occluded SVG document on a background thread.
    ///
    /// The calling context is never blocked; progress arrives through
    /// `progress` and the result through [`JobHandle::join`]. Spawning a new
    /// job cancels any job still in flight on this session.
    pub fn spawn_export_svg(self: &Arc<Self>, progress: ProgressFn) -> JobHandle<String> {
        spawn_job(self, move |session, cancel| {
            session.export_svg(cancel, &progress)
        })
    }

    /// Rasterize one tick on a background thread.
    pub fn spawn_render_tick(
        self: &Arc<Self>,
        tick: f64,
        mode: ColorMode,
        progress: ProgressFn,
    ) -> JobHandle<Arc<RgbaImage>> {
        spawn_job(self, move |session, cancel| {
            session.render_tick(tick, mode, cancel, &progress)
        })
    }

    /// Rasterize the full trajectory preview on a background thread.
    pub fn spawn_render_trajectories(self: &Arc<Self>, progress: ProgressFn) -> JobHandle<RgbaImage> {
        spawn_job(self, move |session, cancel| {
            session.render_trajectories(cancel, &progress)
        })
    }
}

fn spawn_job<T, F>(session: &Arc<ParallaxSession>, run: F) -> JobHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&ParallaxSession, &CancelToken) -> HolopathResult<T> + Send + 'static,
{
    let cancel = CancelToken::new();
    session.register_job(&cancel);
    let session = Arc::clone(session);
    let token = cancel.clone();
    let handle = thread::spawn(move || run(&session, &token));
    JobHandle { cancel, handle }
}
