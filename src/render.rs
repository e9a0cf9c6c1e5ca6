//! Still and frame-sequence capture.
//!
//! Each capture launches its own browser through the configured
//! [`Launcher`] and closes it before returning, on success and on error.
//!
//! The two paths size the page differently: a still capture keeps the
//! launch viewport and screenshots the full document, while an animated
//! capture pins a fixed viewport before navigating and screenshots only that
//! viewport. Both behaviors are relied upon by callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::async_api::{Browser, Page};
use crate::frames::FrameSet;
use crate::{CaptureRequest, EngineConfig, Error, ImageFormat, Launcher, Result, Viewport};

/// Navigation bound for still captures.
pub const STILL_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Navigation bound for animated captures.
pub const ANIMATION_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// The resource to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Url(String),
    File(PathBuf),
}

impl Target {
    /// `http://` and `https://` locators are URLs; anything else is a local path.
    pub fn parse(locator: &str) -> Self {
        let lower = locator.trim_start().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Target::Url(locator.trim().to_string())
        } else {
            Target::File(PathBuf::from(locator))
        }
    }

    /// URL handed to the browser. Local files become absolute `file://` URLs.
    pub fn navigation_url(&self) -> Result<String> {
        match self {
            Target::Url(url) => Ok(url.clone()),
            Target::File(path) => {
                let absolute = if path.is_absolute() {
                    path.clone()
                } else {
                    std::env::current_dir()?.join(path)
                };
                url::Url::from_file_path(&absolute)
                    .map(String::from)
                    .map_err(|_| Error::LoadError(format!("Cannot build file URL for {}", absolute.display())))
            }
        }
    }
}

/// Still capture parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StillCapture {
    pub format: ImageFormat,
    pub quality: Option<u8>,
    /// Pause after network idle, before the screenshot
    pub settle: Option<Duration>,
}

/// Animated capture parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCapture {
    pub viewport: Viewport,
    pub frames: usize,
    pub interval: Duration,
}

/// Drives a browser through one capture at a time.
#[derive(Clone)]
pub struct RenderDriver {
    launcher: Arc<dyn Launcher>,
    config: EngineConfig,
    limit: Option<Arc<Semaphore>>,
}

impl RenderDriver {
    /// A driver with no bound on concurrently running browsers.
    pub fn new(launcher: Arc<dyn Launcher>, config: EngineConfig) -> Self {
        Self {
            launcher,
            config,
            limit: None,
        }
    }

    /// Allow at most `max` browsers at once; further captures wait for a slot.
    /// `0` keeps the driver unbounded.
    pub fn with_limit(mut self, max: usize) -> Self {
        self.limit = (max > 0).then(|| Arc::new(Semaphore::new(max)));
        self
    }

    /// Render `target` into a single image at `output`.
    pub async fn capture_still(&self, target: &Target, output: &Path, capture: &StillCapture) -> Result<()> {
        let url = target.navigation_url()?;
        let request = CaptureRequest::still(capture.format, capture.quality);
        info!("Attempting to load: {}", url);

        self.with_page(|page| async move {
            page.goto(&url, STILL_NAVIGATION_TIMEOUT).await?;
            if let Some(settle) = capture.settle {
                debug!("waiting {:?} for animations to settle", settle);
                tokio::time::sleep(settle).await;
            }
            let bytes = page.capture(request).await?;
            tokio::fs::write(output, &bytes).await?;
            Ok(())
        })
        .await
    }

    /// Render `target` as `capture.frames` viewport screenshots into `frames`.
    ///
    /// Frames are recorded in `frames` as soon as they are on disk, so a
    /// failure part-way still leaves every written frame owned by the set.
    pub async fn capture_frames(&self, target: &Target, capture: &FrameCapture, frames: &mut FrameSet) -> Result<()> {
        let url = target.navigation_url()?;
        info!(
            "Capturing {} frames of {} at {}x{}@{}x",
            capture.frames, url, capture.viewport.width, capture.viewport.height, capture.viewport.scale
        );

        self.with_page(|page| async move {
            page.set_viewport(capture.viewport).await?;
            page.goto(&url, ANIMATION_NAVIGATION_TIMEOUT).await?;

            let started = Instant::now();
            for _ in 0..capture.frames {
                let path = frames
                    .next_path()
                    .ok_or_else(|| Error::Other("frame directory already removed".into()))?;
                let bytes = page.capture(CaptureRequest::frame()).await?;
                tokio::fs::write(&path, &bytes).await?;
                frames.push(path);
                tokio::time::sleep(capture.interval).await;
            }
            debug!("captured {} frames in {:?}", frames.len(), started.elapsed());
            Ok(())
        })
        .await
    }

    /// Launch a browser, run `work` against a page, and close the browser on
    /// every path. Errors come back wrapped as [`Error::RenderError`].
    async fn with_page<F, Fut>(&self, work: F) -> Result<()>
    where
        F: FnOnce(Page) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let _permit = self.acquire().await?;

        let outcome = match Browser::launch(self.launcher.clone(), self.config.clone()).await {
            Ok(browser) => {
                let outcome = match browser.new_page().await {
                    Ok(page) => work(page).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser: {}", e);
                }
                outcome
            }
            Err(e) => Err(e),
        };

        outcome.map_err(|e| {
            warn!("Conversion failed: {}", e);
            match e {
                Error::RenderError(_) => e,
                other => Error::RenderError(format!("Failed to load HTML: {}", other)),
            }
        })
    }

    async fn acquire(&self) -> Result<Option<OwnedSemaphorePermit>> {
        match &self.limit {
            None => Ok(None),
            Some(semaphore) => semaphore
                .clone()
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|e| Error::Other(format!("render limiter closed: {}", e))),
        }
    }
}
