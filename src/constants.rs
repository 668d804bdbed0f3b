use std::time::Duration;

/// Application constants
pub const APP_NAME: &str = "deskcast";
pub const DEFAULT_SERVER_PORT: u16 = 3000;

// Static bounds for externally supplied quality settings
pub const MIN_WIDTH: u32 = 800;
pub const MAX_WIDTH: u32 = 1920;
pub const MIN_JPEG_QUALITY: u8 = 60;
pub const MAX_JPEG_QUALITY: u8 = 90;
pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 60;

// Sampling cadence (milliseconds between emitted frames)
pub const MIN_FRAME_INTERVAL_MS: f64 = 33.0; // ~30 fps
pub const QHD_FRAME_INTERVAL_MS: f64 = 40.0; // ~25 fps at >= 2560 wide
pub const HIGH_RES_FRAME_INTERVAL_MS: f64 = 50.0; // ~20 fps at >= 3840 wide
pub const HIGH_RES_WIDTH: u32 = 3840;
pub const QHD_WIDTH: u32 = 2560;

/// Upper bound on how long a sampled frame may sit in the pending buffer
/// before the most recent one is encoded.
pub const COALESCE_MAX_WAIT: Duration = Duration::from_millis(100);

/// Minimum spacing between two quality-controller runs.
pub const PERFORMANCE_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Cadence of the performance log line (also resets the sent/dropped counters).
pub const PERFORMANCE_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// In-flight bytes above which the engine reports memory pressure.
pub const MAX_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Emitted frame bytes are assumed consumed this long after fan-out.
pub const FRAME_RELEASE_DELAY: Duration = Duration::from_secs(1);

/// Oversized encoded frames are split into sub-buffers of this size.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Rolling processing-time window length.
pub const METRICS_WINDOW: usize = 30;

/// Samples consulted by the high-motion heuristic.
pub const HIGH_MOTION_SAMPLES: usize = 5;
