use async_trait::async_trait;
use log::{error, info};
use scrap::{Capturer, Display};
use std::io::ErrorKind::WouldBlock;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::EngineError;

/// Real pixel dimensions of the captured display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// One sampled frame: owned RGBA bytes plus the dimensions they describe.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Abstract capability to sample the host display.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    async fn capture(&self) -> Result<RawFrame, EngineError>;

    fn screen_size(&self) -> ScreenSize;
}

type FrameReply = oneshot::Sender<Result<RawFrame, EngineError>>;

/// Screen source backed by the platform capturer.
///
/// The capturer is not thread-safe, so it is created on and never leaves a
/// dedicated thread that serves one frame per request over a channel.
pub struct ScrapSource {
    size: ScreenSize,
    requests: mpsc::UnboundedSender<FrameReply>,
}

impl ScrapSource {
    pub fn new() -> Result<Self, EngineError> {
        let (init_tx, init_rx) = std::sync::mpsc::channel();
        let (requests, request_rx) = mpsc::unbounded_channel::<FrameReply>();

        thread::spawn(move || {
            let (capturer, size) = match open_capturer() {
                Ok((capturer, size)) => {
                    let _ = init_tx.send(Ok(size));
                    (capturer, size)
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };
            capture_worker(capturer, size, request_rx);
        });

        let size = init_rx
            .recv()
            .map_err(|_| EngineError::Capture("capture thread died during setup".into()))??;

        info!("Primary display: {}x{}", size.width, size.height);

        Ok(Self { size, requests })
    }
}

#[async_trait]
impl ScreenSource for ScrapSource {
    async fn capture(&self) -> Result<RawFrame, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .map_err(|_| EngineError::Capture("capture thread terminated".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Capture("capture thread dropped request".into()))?
    }

    fn screen_size(&self) -> ScreenSize {
        self.size
    }
}

fn open_capturer() -> Result<(Capturer, ScreenSize), EngineError> {
    let display = Display::primary()
        .map_err(|e| EngineError::Capture(format!("no primary display: {}", e)))?;
    let size = ScreenSize {
        width: display.width() as u32,
        height: display.height() as u32,
    };
    let capturer = Capturer::new(display)
        .map_err(|e| EngineError::Capture(format!("failed to open capturer: {}", e)))?;
    Ok((capturer, size))
}

fn capture_worker(
    mut capturer: Capturer,
    size: ScreenSize,
    mut requests: mpsc::UnboundedReceiver<FrameReply>,
) {
    while let Some(reply) = requests.blocking_recv() {
        let result = grab_frame(&mut capturer, size);
        if let Err(e) = &result {
            error!("Screen capture failed: {}", e);
        }
        // Receiver may have given up waiting; nothing to do then.
        let _ = reply.send(result);
    }
}

fn grab_frame(capturer: &mut Capturer, size: ScreenSize) -> Result<RawFrame, EngineError> {
    let buffer = loop {
        match capturer.frame() {
            Ok(buffer) => break buffer,
            Err(error) => {
                if error.kind() == WouldBlock {
                    // Wait for the next frame
                    thread::sleep(Duration::from_millis(5));
                    continue;
                }
                return Err(EngineError::Capture(error.to_string()));
            }
        }
    };

    // Convert the BGRA capture buffer (stride-padded) to tightly packed RGBA
    let w = size.width as usize;
    let h = size.height as usize;
    let stride = buffer.len() / h;
    let mut rgba = Vec::with_capacity(w * h * 4);

    for y in 0..h {
        for x in 0..w {
            let i = stride * y + 4 * x;
            rgba.push(buffer[i + 2]); // R
            rgba.push(buffer[i + 1]); // G
            rgba.push(buffer[i]); // B
            rgba.push(255); // A
        }
    }

    Ok(RawFrame {
        data: rgba,
        width: size.width,
        height: size.height,
    })
}
