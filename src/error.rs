use thiserror::Error;

/// Errors raised by the capture/encode pipeline.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Encode failed: {0}")]
    Encode(#[from] CodecError),

    #[error("Capture engine is not initialized")]
    NotInitialized,

    #[error("Capture engine is already initialized")]
    AlreadyInitialized,
}

/// Errors raised while decoding, resizing or re-encoding a frame.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid raw frame: expected {expected} bytes for {width}x{height}, got {actual}")]
    InvalidRawFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Errors raised by the WebSocket listener.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Errors raised while injecting remote input.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("Unsupported modifier: {0}")]
    UnsupportedModifier(String),

    #[error("Invalid viewer dimensions: {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },
}
