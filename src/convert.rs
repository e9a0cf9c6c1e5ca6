//! Conversion orchestration.
//!
//! [`Converter::convert`] routes a request to the still or animated path. For
//! GIF output it owns the temporary frames: they are created under the
//! frames root, handed to the encoder and deleted whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use log::{info, warn};

use crate::encoder::GifEncoder;
use crate::frames::FrameSet;
use crate::options::{ConversionOptions, Dimensions, OutputFormat};
use crate::render::{FrameCapture, RenderDriver, StillCapture, Target};
use crate::Result;

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub dimensions: Dimensions,
    /// Frames captured for an animation; `None` for still output
    pub frames: Option<usize>,
}

pub struct Converter {
    driver: RenderDriver,
    encoder: GifEncoder,
    frames_root: PathBuf,
}

impl Converter {
    pub fn new(driver: RenderDriver, encoder: GifEncoder, frames_root: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            encoder,
            frames_root: frames_root.into(),
        }
    }

    /// Render `target` to `output` as described by `options`.
    pub async fn convert(&self, target: &Target, output: &Path, options: &ConversionOptions) -> Result<ConversionResult> {
        let frames = match options.format.still_format() {
            Some(format) => {
                let capture = StillCapture {
                    format,
                    quality: options.effective_quality(),
                    settle: options.settle_delay(),
                };
                self.driver.capture_still(target, output, &capture).await?;
                None
            }
            None => Some(self.convert_animation(target, output, options).await?),
        };

        info!("converted into {} ({})", output.display(), options.format);
        Ok(ConversionResult {
            output: output.to_path_buf(),
            format: options.format,
            dimensions: options.dimensions(),
            frames,
        })
    }

    async fn convert_animation(&self, target: &Target, output: &Path, options: &ConversionOptions) -> Result<usize> {
        let capture = FrameCapture {
            viewport: options.animation_viewport(),
            frames: options.frame_count(),
            interval: options.frame_interval(),
        };

        let mut frames = FrameSet::create_in(&self.frames_root)?;
        let outcome = match self.driver.capture_frames(target, &capture, &mut frames).await {
            Ok(()) => self.encoder.encode(frames.paths(), output, options.fps()).await,
            Err(e) => Err(e),
        };
        let captured = frames.len();
        frames.remove_all();

        if let Err(e) = &outcome {
            warn!("animation failed after {} frames: {}", captured, e);
        }
        outcome.map(|()| captured)
    }
}

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp that is strictly increasing within the process.
///
/// Two calls in the same millisecond get consecutive values, so names built
/// from it never collide.
pub fn unique_stamp() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// `converted-<stamp>.<ext>`
pub fn output_file_name(format: OutputFormat) -> String {
    format!("converted-{}.{}", unique_stamp(), format.extension())
}
