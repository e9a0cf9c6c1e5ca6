//! htmlcap
//!
//! Render HTML documents to JPEG, PNG or animated GIF by driving a headless
//! browser and, for animations, an external ffmpeg binary.
//!
//! # Layout
//!
//! - [`Engine`] / [`Launcher`]: the seam over a concrete browser. The CDP
//!   backend (`cdp` feature, on by default) drives headless Chrome.
//! - [`async_api`]: an async handle over an engine living on a worker thread.
//! - [`render`]: still and frame-sequence capture.
//! - [`encoder`]: frame sequence to GIF through ffmpeg.
//! - [`convert`]: picks a rendering path and owns temporary frames.
//! - [`server`]: the HTTP surface (`POST /api/convert`, `GET /health`, ...).
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use htmlcap::{convert::Converter, encoder::GifEncoder, render::{RenderDriver, Target}};
//! use htmlcap::options::ConversionOptions;
//!
//! # async fn run() -> htmlcap::Result<()> {
//! let driver = RenderDriver::new(htmlcap::default_launcher(), Default::default());
//! let converter = Converter::new(driver, GifEncoder::default(), "frames");
//! let options = ConversionOptions::from_json(r#"{"type":"png"}"#)?;
//! let result = converter
//!     .convert(&Target::parse("https://example.com"), Path::new("out.png"), &options)
//!     .await?;
//! println!("wrote {}", result.output.display());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly browser API (worker-thread backed)
pub mod async_api;
pub use async_api::Browser;

pub mod convert;
pub mod encoder;
pub mod frames;
pub mod options;
pub mod render;
pub mod server;

/// Browser launch configuration
///
/// One browser is launched per conversion, so these settings apply to a
/// single short-lived process. The defaults mirror what container
/// deployments need: no sandbox, no GPU, no `/dev/shm` usage.
///
/// # Examples
///
/// ```
/// let cfg = htmlcap::EngineConfig::default();
/// assert_eq!(cfg.viewport.width, 800);
/// assert!(cfg.headless);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Browser executable; `None` lets the backend locate one
    pub executable: Option<PathBuf>,
    /// Initial window size (still captures grow past it to the full page)
    pub viewport: Viewport,
    pub headless: bool,
    pub sandbox: bool,
    /// Extra command line switches passed to the browser
    pub args: Vec<String>,
    /// How long the browser connection may stay silent before it is dropped
    pub idle_timeout_ms: u64,
    /// Quiescence window used when waiting for network idle
    pub network_idle_ms: u64,
    pub user_agent: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: None,
            viewport: Viewport::default(),
            headless: true,
            sandbox: false,
            args: [
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage",
                "--disable-accelerated-2d-canvas",
                "--disable-gpu",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            idle_timeout_ms: 300_000,
            network_idle_ms: 500,
            user_agent: None,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Device scale factor
    pub scale: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            scale: 1,
        }
    }
}

/// Raster format of a single capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

/// Parameters of one screenshot.
///
/// Build through [`CaptureRequest::still`] or [`CaptureRequest::frame`]: both
/// drop the quality for PNG so a lossless capture never carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub format: ImageFormat,
    pub quality: Option<u8>,
    /// Capture the whole document rather than the viewport
    pub full_page: bool,
    /// Transparent default background
    pub omit_background: bool,
}

impl CaptureRequest {
    /// Full-page capture used for still output.
    pub fn still(format: ImageFormat, quality: Option<u8>) -> Self {
        Self {
            format,
            quality: match format {
                ImageFormat::Jpeg => quality,
                ImageFormat::Png => None,
            },
            full_page: true,
            omit_background: format == ImageFormat::Png,
        }
    }

    /// Viewport-sized PNG used as an animation frame.
    pub fn frame() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: None,
            full_page: false,
            omit_background: false,
        }
    }
}

/// A browser page that can be navigated and captured.
///
/// Implementations are synchronous and owned by a single worker thread (see
/// [`async_api::Browser`]).
pub trait Engine {
    /// Navigate to `url` and wait until the network is idle, failing after `timeout`.
    fn load_url(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Apply a fixed viewport (width × height × device scale factor).
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Capture the current page and return the encoded image bytes.
    fn capture(&mut self, request: &CaptureRequest) -> Result<Vec<u8>>;

    /// Terminate the browser. Called once; dropping the engine must also release it.
    fn close(&mut self) -> Result<()>;
}

/// Starts engines. One call per conversion.
pub trait Launcher: Send + Sync {
    fn launch(&self, config: &EngineConfig) -> Result<Box<dyn Engine>>;
}

impl<F> Launcher for F
where
    F: Fn(&EngineConfig) -> Result<Box<dyn Engine>> + Send + Sync,
{
    fn launch(&self, config: &EngineConfig) -> Result<Box<dyn Engine>> {
        self(config)
    }
}

/// The launcher for the default backend (headless Chrome over CDP).
#[cfg(feature = "cdp")]
pub fn default_launcher() -> std::sync::Arc<dyn Launcher> {
    std::sync::Arc::new(cdp::CdpLauncher)
}
