use anyhow::Result;

use super::frame::CameraFrame;
use super::queue::CaptureQueue;

/// Best-effort visual feedback while frames are drained. Failures here never
/// affect what ends up on disk.
pub trait FramePreview {
    fn show(&mut self, window: &str, frame: &CameraFrame) -> Result<()>;
}

/// Discards every frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPreview;

impl FramePreview for NoPreview {
    fn show(&mut self, _window: &str, _frame: &CameraFrame) -> Result<()> {
        Ok(())
    }
}

/// Emits a debug log line per frame; handy on headless capture hosts.
#[derive(Clone, Debug, Default)]
pub struct LogPreview {
    shown: u64,
}

impl LogPreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl FramePreview for LogPreview {
    fn show(&mut self, window: &str, frame: &CameraFrame) -> Result<()> {
        self.shown += 1;
        log::debug!(
            "[{}] frame {}x{} {:?}",
            window,
            frame.width,
            frame.height,
            frame.format
        );
        Ok(())
    }
}

/// Show every queued frame without consuming the queue.
pub fn preview_queue(
    queue: &CaptureQueue<CameraFrame>,
    window: &str,
    preview: &mut dyn FramePreview,
) -> Result<usize> {
    let mut shown = 0;
    queue.for_each(|_, frame| {
        if let Err(err) = preview.show(window, frame) {
            log::debug!("{}: preview failed: {:#}", window, err);
        }
        shown += 1;
    })?;
    if shown == 0 {
        log::info!("{} is empty", window);
    }
    Ok(shown)
}
