//! Offscreen capture of scene frames at exact timeline times.

use reelcraft_core::{FrameBuffer, FrameRate, ReelcraftError, Result};
use reelcraft_gpu::RenderTarget;
use reelcraft_scene::{SceneManager, SyncMode};
use tracing::trace;

/// Renders scene frames into an offscreen target from the scene's texture
/// pool. The target is kept between captures of the same size and swapped
/// through the pool when the size changes; [`release`](Self::release)
/// returns it.
///
/// Capture moves the scene clock directly, so it must not run while
/// interactive playback drives the same scene.
#[derive(Debug, Default)]
pub struct FrameCapture {
    target: Option<RenderTarget>,
}

impl FrameCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the scene at `time` into a `width` x `height` frame.
    ///
    /// Every element is seeked to its exact local time first, so repeated
    /// captures at the same time produce identical pixels.
    pub fn capture_frame(
        &mut self,
        scene: &mut SceneManager,
        time: f64,
        width: u32,
        height: u32,
    ) -> Result<FrameBuffer> {
        if width == 0 || height == 0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "capture size must be non-zero, got {width}x{height}"
            )));
        }
        scene.set_time(time, SyncMode::Force)?;
        let mut target = match self.target.take() {
            Some(target) if target.size() == (width, height) => target,
            Some(stale) => {
                scene.release_render_target(stale);
                scene.acquire_render_target(width, height)?
            }
            None => scene.acquire_render_target(width, height)?,
        };
        scene.render_into(&mut target);
        let frame = target.read_pixels();
        self.target = Some(target);
        trace!(time, width, height, "frame captured");
        Ok(frame)
    }

    /// Hand the offscreen target back to `scene`'s texture pool.
    pub fn release(&mut self, scene: &mut SceneManager) {
        if let Some(target) = self.target.take() {
            scene.release_render_target(target);
        }
    }

    /// Capture frames `0..ceil((end - start) * fps)` and hand each to
    /// `on_frame` with its timestamp and index. Returns the frame count.
    ///
    /// Frames are not buffered; an error from `on_frame` stops the sequence.
    pub fn capture_sequence(
        &mut self,
        scene: &mut SceneManager,
        start: f64,
        end: f64,
        fps: FrameRate,
        width: u32,
        height: u32,
        mut on_frame: impl FnMut(FrameBuffer, f64, u64) -> Result<()>,
    ) -> Result<u64> {
        let frames = fps.frame_count(end - start);
        for index in 0..frames {
            let time = fps.frame_time(start, index);
            let frame = self.capture_frame(scene, time, width, height)?;
            on_frame(frame, time, index)?;
        }
        Ok(frames)
    }
}
