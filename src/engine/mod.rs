//! The adaptive capture-and-stream pipeline.
//!
//! One engine exists per process. Subscribing starts the sampler loop;
//! the loop samples the display at an adaptive cadence, deduplicates and
//! coalesces pending frames, encodes the most recent one off-thread, and
//! fans the result out to every subscriber in subscription order. All
//! bookkeeping runs on the loop task, so state transitions stay serialized.

pub mod frame;
pub mod memory;
pub mod metrics;
pub mod quality;

use lazy_static::lazy_static;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep_until;

use crate::capture::{RawFrame, ScreenSize, ScreenSource};
use crate::codec::{self, JpegOptions, ResizeMode};
use crate::constants::{
    COALESCE_MAX_WAIT, FRAME_RELEASE_DELAY, HIGH_MOTION_SAMPLES, HIGH_RES_FRAME_INTERVAL_MS,
    HIGH_RES_WIDTH, MIN_FRAME_INTERVAL_MS, MIN_JPEG_QUALITY, PERFORMANCE_CHECK_INTERVAL,
    PERFORMANCE_LOG_INTERVAL, QHD_FRAME_INTERVAL_MS, QHD_WIDTH,
};
use crate::error::EngineError;
use crate::profile::{profile_for_width, DisplayProfile};

pub use frame::{ChunkedFrame, EncodedFrame, FramePayload};
pub use quality::{ControllerInputs, QualityConfig, QualityUpdate, ScaledDims};

use memory::MemoryAccountant;
use metrics::Metrics;

/// Callback invoked for every emitted frame. Must not block: sessions
/// forward into their own outbound channels.
pub type SubscriberFn = Box<dyn Fn(&FramePayload) + Send>;

struct Subscriber {
    id: u64,
    sink: SubscriberFn,
}

struct LoopHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

struct Shared {
    quality: QualityConfig,
    scaled: ScaledDims,
    metrics: Metrics,
    subscribers: Vec<Subscriber>,
    pending: Vec<RawFrame>,
    coalesce_deadline: Option<Instant>,
    adaptive_interval_ms: f64,
    last_emit: Option<Instant>,
    last_perf_check: Option<Instant>,
    loop_task: Option<LoopHandle>,
}

struct EncodeDone {
    result: Result<EncodedFrame, EngineError>,
    started: Instant,
}

/// Point-in-time view of the engine, for status reporting and tests.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub quality: QualityConfig,
    pub scaled: ScaledDims,
    pub frames_sent: u64,
    pub dropped_frames: u64,
    pub in_flight_bytes: u64,
    pub subscriber_count: usize,
    pub running: bool,
}

pub struct CaptureEngine {
    real: ScreenSize,
    profile: &'static DisplayProfile,
    source: Arc<dyn ScreenSource>,
    accountant: MemoryAccountant,
    processing: AtomicBool,
    shared: Mutex<Shared>,
    next_subscriber_id: AtomicU64,
}

impl CaptureEngine {
    pub(crate) fn new(source: Arc<dyn ScreenSource>) -> Self {
        let real = source.screen_size();
        let profile = profile_for_width(real.width);
        let quality = QualityConfig::from_profile(profile);
        let scaled = quality::scaled_dims(real, quality.width);

        info!(
            "Capture engine: {} profile for {}x{} display, streaming at {}x{}",
            profile.name, real.width, real.height, scaled.width, scaled.height
        );

        Self {
            real,
            profile,
            source,
            accountant: MemoryAccountant::new(),
            processing: AtomicBool::new(false),
            shared: Mutex::new(Shared {
                quality,
                scaled,
                metrics: Metrics::new(),
                subscribers: Vec::new(),
                pending: Vec::new(),
                coalesce_deadline: None,
                adaptive_interval_ms: MIN_FRAME_INTERVAL_MS,
                last_emit: None,
                last_perf_check: None,
                loop_task: None,
            }),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.real
    }

    pub fn profile(&self) -> &'static DisplayProfile {
        self.profile
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let shared = self.shared.lock();
        EngineSnapshot {
            quality: shared.quality,
            scaled: shared.scaled,
            frames_sent: shared.metrics.frames_sent,
            dropped_frames: shared.metrics.dropped_frames,
            in_flight_bytes: self.accountant.total(),
            subscriber_count: shared.subscribers.len(),
            running: shared.loop_task.is_some(),
        }
    }

    /// Register a frame sink. The first subscriber starts the sampler loop.
    pub fn subscribe(self: Arc<Self>, sink: SubscriberFn) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut shared = self.shared.lock();
        shared.subscribers.push(Subscriber { id, sink });
        if shared.subscribers.len() == 1 && shared.loop_task.is_none() {
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let task = tokio::spawn(run_loop(self.clone(), shutdown_rx));
            shared.loop_task = Some(LoopHandle {
                shutdown: shutdown_tx,
                task,
            });
        }
        drop(shared);
        Subscription {
            engine: self,
            id: Some(id),
        }
    }

    fn unsubscribe(&self, id: u64) {
        let handle = {
            let mut shared = self.shared.lock();
            let before = shared.subscribers.len();
            shared.subscribers.retain(|s| s.id != id);
            if shared.subscribers.len() == before {
                // Unknown or already removed: idempotent no-op.
                return;
            }
            if !shared.subscribers.is_empty() {
                return;
            }
            Self::reset_shared(&mut shared);
            shared.loop_task.take()
        };
        self.teardown(handle);
        info!("Last viewer left, sampler loop stopping");
    }

    /// Stop the loop and drop every subscriber. Safe to call at any point,
    /// any number of times.
    pub fn stop(&self) {
        let handle = {
            let mut shared = self.shared.lock();
            shared.subscribers.clear();
            Self::reset_shared(&mut shared);
            shared.loop_task.take()
        };
        self.teardown(handle);
    }

    fn reset_shared(shared: &mut Shared) {
        shared.pending.clear();
        shared.coalesce_deadline = None;
        shared.metrics.reset();
        shared.last_emit = None;
        shared.last_perf_check = None;
        shared.adaptive_interval_ms = MIN_FRAME_INTERVAL_MS;
    }

    fn teardown(&self, handle: Option<LoopHandle>) {
        if let Some(handle) = handle {
            let _ = handle.shutdown.try_send(());
            handle.task.abort();
        }
        self.accountant.clear();
        self.processing.store(false, Ordering::Release);
    }

    /// Apply a viewer-requested settings change. Valid fields take effect
    /// before the next sample tick; any accepted change clears the rolling
    /// metrics window.
    pub fn update_quality(&self, update: QualityUpdate) -> bool {
        let mut shared = self.shared.lock();
        let applied = quality::apply_update(&mut shared.quality, &update);
        if applied {
            shared.scaled = quality::scaled_dims(self.real, shared.quality.width);
            shared.metrics.reset_window();
            info!(
                "Quality updated by viewer: {}x{} q{} at {} fps",
                shared.scaled.width, shared.scaled.height, shared.quality.jpeg_quality,
                shared.quality.fps
            );
        }
        applied
    }

    fn compute_adaptive_interval(&self, shared: &Shared) -> f64 {
        let mut base = MIN_FRAME_INTERVAL_MS;
        if self.real.width >= HIGH_RES_WIDTH {
            base = base.max(HIGH_RES_FRAME_INTERVAL_MS);
        } else if self.real.width >= QHD_WIDTH {
            base = base.max(QHD_FRAME_INTERVAL_MS);
        }
        if self.accountant.pressure() {
            base *= 1.5;
        }
        let avg = shared.metrics.avg_processing_ms();
        if avg > 0.7 * base {
            base = base.max(avg * 1.2);
        }
        base
    }

    async fn sample_tick(&self) {
        {
            let mut shared = self.shared.lock();
            let interval = shared.adaptive_interval_ms;
            let busy = self.processing.load(Ordering::Acquire);
            let pressure = self.accountant.pressure();
            let elapsed_ms = shared
                .last_emit
                .map(|at| at.elapsed().as_secs_f64() * 1000.0);

            let skip = busy
                || matches!(elapsed_ms, Some(e) if e < interval)
                || (pressure && matches!(elapsed_ms, Some(e) if e < 1.5 * interval));
            if skip {
                shared.metrics.dropped_frames += 1;
                return;
            }
        }

        let raw = match self.source.capture().await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Capture failed: {}", e);
                return;
            }
        };

        let digest = frame::sampled_digest(&raw.data);
        let mut shared = self.shared.lock();
        if shared.metrics.last_frame_hash == Some(digest) {
            // Screen content unchanged; skip the encode entirely.
            shared.metrics.dropped_frames += 1;
            return;
        }
        shared.metrics.last_frame_hash = Some(digest);

        let was_empty = shared.pending.is_empty();
        shared.pending.push(raw);
        if was_empty && shared.coalesce_deadline.is_none() {
            shared.coalesce_deadline = Some(Instant::now() + COALESCE_MAX_WAIT);
        }
    }

    /// Take the most recent pending frame and encode it off-thread. Older
    /// pending frames are stale and discarded.
    fn begin_encode(&self, done_tx: mpsc::Sender<EncodeDone>) {
        if self.processing.swap(true, Ordering::AcqRel) {
            return;
        }

        let (raw, dims, jpeg_quality, mode) = {
            let mut shared = self.shared.lock();
            shared.coalesce_deadline = None;
            let raw = match shared.pending.pop() {
                Some(raw) => raw,
                None => {
                    self.processing.store(false, Ordering::Release);
                    return;
                }
            };
            let discarded = shared.pending.len();
            shared.pending.clear();
            if discarded > 0 {
                debug!("Coalesced {} stale frames", discarded);
            }

            let avg = shared.metrics.avg_processing_ms();
            let mode = if avg > 0.8 * MIN_FRAME_INTERVAL_MS {
                ResizeMode::Nearest
            } else {
                ResizeMode::Bilinear
            };
            let high_motion =
                shared.metrics.recent_avg_ms(HIGH_MOTION_SAMPLES) > 0.7 * MIN_FRAME_INTERVAL_MS;
            let jpeg_quality = if high_motion {
                shared
                    .quality
                    .jpeg_quality
                    .saturating_sub(10)
                    .max(MIN_JPEG_QUALITY)
            } else {
                shared.quality.jpeg_quality
            };
            (raw, shared.scaled, jpeg_quality, mode)
        };

        let started = Instant::now();
        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || encode_frame(raw, dims, jpeg_quality, mode))
                    .await
                    .unwrap_or_else(|e| Err(EngineError::Capture(format!("encode task: {}", e))));
            let _ = done_tx.send(EncodeDone { result, started }).await;
        });
    }

    fn finish_encode(&self, done: EncodeDone) {
        self.processing.store(false, Ordering::Release);

        let encoded = match done.result {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Frame encode failed: {}", e);
                self.rearm_coalesce_if_pending();
                return;
            }
        };

        let size = encoded.data.len();
        let payload = if size / 1024 > self.profile.max_frame_kb {
            FramePayload::Chunked(frame::chunk_frame(encoded))
        } else {
            FramePayload::Full(encoded)
        };
        let processing_ms = done.started.elapsed().as_secs_f64() * 1000.0;

        let mut shared = self.shared.lock();
        for subscriber in &shared.subscribers {
            (subscriber.sink)(&payload);
        }

        shared.metrics.frames_sent += 1;
        shared.metrics.last_frame_sent_ms = Some(epoch_ms());
        shared.metrics.push_processing_time(processing_ms);
        shared.last_emit = Some(Instant::now());
        self.accountant.add(size as u64);
        self.accountant.schedule_release(size as u64, FRAME_RELEASE_DELAY);

        let check_due = shared
            .last_perf_check
            .map(|at| at.elapsed() >= PERFORMANCE_CHECK_INTERVAL)
            .unwrap_or(true);
        if check_due {
            shared.last_perf_check = Some(Instant::now());
            let inputs = ControllerInputs {
                avg_processing_ms: shared.metrics.avg_processing_ms(),
                adaptive_interval_ms: shared.adaptive_interval_ms,
                drop_rate: shared.metrics.drop_rate(),
                memory_pressure: self.accountant.pressure(),
                high_res: self.real.width >= HIGH_RES_WIDTH,
            };
            if let Some(next) = quality::recommend(&shared.quality, self.profile, &inputs) {
                info!(
                    "Auto quality: {}w q{} -> {}w q{}",
                    shared.quality.width, shared.quality.jpeg_quality, next.width,
                    next.jpeg_quality
                );
                shared.quality = next;
                shared.scaled = quality::scaled_dims(self.real, shared.quality.width);
            }
        }

        if !shared.pending.is_empty() && shared.coalesce_deadline.is_none() {
            let wait = COALESCE_MAX_WAIT.min(Duration::from_millis(
                shared.adaptive_interval_ms as u64,
            ));
            shared.coalesce_deadline = Some(Instant::now() + wait);
        }
    }

    fn rearm_coalesce_if_pending(&self) {
        let mut shared = self.shared.lock();
        if !shared.pending.is_empty() && shared.coalesce_deadline.is_none() {
            let wait = COALESCE_MAX_WAIT.min(Duration::from_millis(
                shared.adaptive_interval_ms as u64,
            ));
            shared.coalesce_deadline = Some(Instant::now() + wait);
        }
    }

    fn log_performance(&self) {
        let mut shared = self.shared.lock();
        if shared.metrics.frames_sent > 0 || shared.metrics.dropped_frames > 0 {
            debug!(
                "Pipeline: {} sent, {} dropped, avg {:.1} ms, {} KiB in flight",
                shared.metrics.frames_sent,
                shared.metrics.dropped_frames,
                shared.metrics.avg_processing_ms(),
                self.accountant.total() / 1024
            );
        }
        shared.metrics.reset_counters();
    }
}

/// RAII subscription handle. Unsubscribing (or dropping) is idempotent;
/// the last one out stops the sampler loop.
pub struct Subscription {
    engine: Arc<CaptureEngine>,
    id: Option<u64>,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take() {
            self.engine.unsubscribe(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn encode_frame(
    raw: RawFrame,
    dims: ScaledDims,
    jpeg_quality: u8,
    mode: ResizeMode,
) -> Result<EncodedFrame, EngineError> {
    let raw_dims = (raw.width, raw.height);
    let image = codec::decode(raw)?;
    let image = if raw_dims != (dims.width, dims.height) {
        codec::resize(&image, dims.width, dims.height, mode)
    } else {
        image
    };
    let jpeg = codec::encode_jpeg(
        image,
        JpegOptions {
            quality: jpeg_quality,
        },
    )?;
    Ok(EncodedFrame {
        data: jpeg.into(),
        dims,
    })
}

fn epoch_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

async fn run_loop(engine: Arc<CaptureEngine>, mut shutdown: mpsc::Receiver<()>) {
    let (done_tx, mut done_rx) = mpsc::channel::<EncodeDone>(2);
    let mut last_tick = Instant::now();
    let mut last_perf_log = Instant::now();

    info!("Sampler loop started ({} profile)", engine.profile.name);

    loop {
        let (interval_ms, fps) = {
            let mut shared = engine.shared.lock();
            let interval = engine.compute_adaptive_interval(&shared);
            shared.adaptive_interval_ms = interval;
            (interval, shared.quality.fps)
        };
        // Two independent caps on the cadence: the adaptive interval and
        // the configured frame budget.
        let frame_budget = Duration::from_millis(1000 / fps.max(1) as u64);
        let next_sample =
            last_tick + Duration::from_millis(interval_ms as u64).max(frame_budget);

        let coalesce_at = engine.shared.lock().coalesce_deadline;
        let release_at = engine.accountant.next_deadline();
        let perf_log_at = last_perf_log + PERFORMANCE_LOG_INTERVAL;

        tokio::select! {
            _ = shutdown.recv() => break,
            Some(done) = done_rx.recv() => {
                engine.finish_encode(done);
            }
            _ = sleep_until(deadline_or_distant(coalesce_at)), if coalesce_at.is_some() => {
                engine.begin_encode(done_tx.clone());
            }
            _ = sleep_until(deadline_or_distant(release_at)), if release_at.is_some() => {
                engine.accountant.release_due(Instant::now());
            }
            _ = sleep_until(perf_log_at.into()) => {
                last_perf_log = Instant::now();
                engine.log_performance();
            }
            _ = sleep_until(next_sample.into()) => {
                last_tick = Instant::now();
                engine.sample_tick().await;
            }
        }
    }

    info!("Sampler loop stopped");
}

fn deadline_or_distant(deadline: Option<Instant>) -> tokio::time::Instant {
    match deadline {
        Some(at) => at.into(),
        None => tokio::time::Instant::now() + Duration::from_secs(3600),
    }
}

lazy_static! {
    static ref ENGINE: Mutex<Option<Arc<CaptureEngine>>> = Mutex::new(None);
}

/// Create the process-wide engine. Fails if one already exists; tests call
/// `shutdown` between runs to reset.
pub fn initialize(source: Arc<dyn ScreenSource>) -> Result<Arc<CaptureEngine>, EngineError> {
    let mut slot = ENGINE.lock();
    if slot.is_some() {
        return Err(EngineError::AlreadyInitialized);
    }
    let engine = Arc::new(CaptureEngine::new(source));
    *slot = Some(engine.clone());
    Ok(engine)
}

pub fn get() -> Option<Arc<CaptureEngine>> {
    ENGINE.lock().clone()
}

/// Like `get`, for callers that cannot proceed without an engine.
pub fn require() -> Result<Arc<CaptureEngine>, EngineError> {
    get().ok_or(EngineError::NotInitialized)
}

/// Stop and drop the process-wide engine. Safe when none exists.
pub fn shutdown() {
    let engine = ENGINE.lock().take();
    if let Some(engine) = engine {
        engine.stop();
    }
}
