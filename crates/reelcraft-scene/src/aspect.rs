//! Fitting video planes to the canvas.

use reelcraft_core::FrameBuffer;
use reelcraft_timeline::AspectRatioMode;

/// Backdrop frames are blurred at this fraction of the source resolution.
pub const BACKDROP_SCALE: f32 = 0.25;
pub const BACKDROP_BLUR_RADIUS: u32 = 3;

/// World-space sizes for a clip's plane and optional backdrop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneLayout {
    pub width: f32,
    pub height: f32,
    pub backdrop: Option<(f32, f32)>,
}

/// Size a plane of aspect `video_aspect` against a `frame_width` x
/// `frame_height` canvas region.
pub fn layout(mode: AspectRatioMode, video_aspect: f32, frame_width: f32, frame_height: f32) -> PlaneLayout {
    let video_aspect = if video_aspect.is_finite() && video_aspect > 0.0 {
        video_aspect
    } else {
        1.0
    };
    let (width, height) = match mode {
        AspectRatioMode::Fit | AspectRatioMode::BlurBackground => {
            fit(video_aspect, frame_width, frame_height)
        }
        AspectRatioMode::Fill => fill(video_aspect, frame_width, frame_height),
        AspectRatioMode::Stretch => (frame_width, frame_height),
    };
    let backdrop = match mode {
        AspectRatioMode::BlurBackground => Some(fill(video_aspect, frame_width, frame_height)),
        _ => None,
    };
    PlaneLayout {
        width,
        height,
        backdrop,
    }
}

fn fit(video_aspect: f32, frame_width: f32, frame_height: f32) -> (f32, f32) {
    if video_aspect > frame_width / frame_height {
        (frame_width, frame_width / video_aspect)
    } else {
        (frame_height * video_aspect, frame_height)
    }
}

fn fill(video_aspect: f32, frame_width: f32, frame_height: f32) -> (f32, f32) {
    if video_aspect > frame_width / frame_height {
        (frame_height * video_aspect, frame_height)
    } else {
        (frame_width, frame_width / video_aspect)
    }
}

/// Downsampled and blurred copy of `frame` for a blur-background backdrop.
pub fn blurred_backdrop(frame: &FrameBuffer) -> FrameBuffer {
    box_blur(&frame.downsample(BACKDROP_SCALE), BACKDROP_BLUR_RADIUS)
}

/// Separable box blur with clamped edges.
pub fn box_blur(frame: &FrameBuffer, radius: u32) -> FrameBuffer {
    if radius == 0 || frame.width == 0 || frame.height == 0 {
        return frame.clone();
    }
    let horizontal = blur_pass(frame, radius, true);
    blur_pass(&horizontal, radius, false)
}

fn blur_pass(src: &FrameBuffer, radius: u32, horizontal: bool) -> FrameBuffer {
    let mut out = FrameBuffer::new(src.width, src.height);
    let r = radius as i64;
    let taps = 2 * radius + 1;
    let width = src.width as i64;
    let pixels = out.pixels_mut();
    for y in 0..src.height as i64 {
        for x in 0..width {
            let mut sum = [0u32; 4];
            for k in -r..=r {
                let p = if horizontal {
                    src.pixel_clamped(x + k, y)
                } else {
                    src.pixel_clamped(x, y + k)
                };
                for (acc, channel) in sum.iter_mut().zip(p) {
                    *acc += channel as u32;
                }
            }
            pixels[(y * width + x) as usize] = sum.map(|s| ((s + taps / 2) / taps) as u8);
        }
    }
    out
}
