//! Chrome DevTools Protocol adapter implementation

use crate::{CaptureRequest, Engine, EngineConfig, Error, ImageFormat, Launcher, Result, Viewport};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page, DOM};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

const ACTIVITY_SCRIPT: &str = r#"JSON.stringify({
    ready: document.readyState,
    resources: performance.getEntriesByType('resource').length
})"#;

const CONTENT_SIZE_SCRIPT: &str = r#"JSON.stringify((function() {
    const doc = document.documentElement;
    const body = document.body;
    return {
        width: Math.ceil(Math.max(doc.scrollWidth, body ? body.scrollWidth : 0, doc.clientWidth)),
        height: Math.ceil(Math.max(doc.scrollHeight, body ? body.scrollHeight : 0, doc.clientHeight))
    };
})())"#;

/// Launches [`CdpEngine`]s.
pub struct CdpLauncher;

impl Launcher for CdpLauncher {
    fn launch(&self, config: &EngineConfig) -> Result<Box<dyn Engine>> {
        Ok(Box::new(CdpEngine::new(config)?))
    }
}

/// CDP-based engine (uses the `headless_chrome` crate)
///
/// Launches a headless Chrome instance and manages a single tab.
pub struct CdpEngine {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    network_idle: Duration,
}

impl CdpEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let args: Vec<&OsStr> = config.args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(config.sandbox)
            .path(config.executable.clone())
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(Duration::from_millis(config.idle_timeout_ms))
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        if let Some(user_agent) = &config.user_agent {
            tab.set_user_agent(user_agent, None, None)?;
        }

        Ok(Self {
            browser: Some(browser),
            tab,
            network_idle: Duration::from_millis(config.network_idle_ms),
        })
    }

    fn sample_activity(&self) -> Result<PageActivity> {
        let value = self
            .tab
            .evaluate(ACTIVITY_SCRIPT, false)
            .map_err(|e| Error::LoadError(format!("Failed to read page activity: {}", e)))?
            .value;
        let raw = value
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::LoadError("Page activity script returned no value".into()))?;
        let parsed: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::LoadError(format!("Malformed page activity result: {}", e)))?;

        Ok(PageActivity {
            complete: parsed.get("ready").and_then(|v| v.as_str()) == Some("complete"),
            resources: parsed.get("resources").and_then(|v| v.as_u64()).unwrap_or(0),
        })
    }

    fn wait_for_network_idle(&self, deadline: Instant, timeout: Duration) -> Result<()> {
        let mut tracker = IdleTracker::new(self.network_idle);
        loop {
            let now = Instant::now();
            if tracker.observe(self.sample_activity()?, now) {
                return Ok(());
            }
            if now >= deadline {
                return Err(Error::Timeout(timeout.as_millis() as u64));
            }
            std::thread::sleep(IDLE_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn content_size(&self) -> Result<(f64, f64)> {
        let value = self
            .tab
            .evaluate(CONTENT_SIZE_SCRIPT, false)
            .map_err(|e| Error::RenderError(format!("Failed to measure page: {}", e)))?
            .value;
        let raw = value
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::RenderError("Page size script returned no value".into()))?;
        let parsed: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::RenderError(format!("Malformed page size: {}", e)))?;

        let width = parsed.get("width").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let height = parsed.get("height").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if width <= 0.0 || height <= 0.0 {
            return Err(Error::RenderError(format!("Page has no content area ({}x{})", width, height)));
        }
        Ok((width, height))
    }

    fn set_transparent_background(&self, transparent: bool) -> Result<()> {
        let color = transparent.then_some(DOM::RGBA {
            r: 0,
            g: 0,
            b: 0,
            a: Some(0.0),
        });
        self.tab.call_method(Emulation::SetDefaultBackgroundColorOverride { color })?;
        Ok(())
    }
}

impl Engine for CdpEngine {
    fn load_url(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        self.tab.set_default_timeout(timeout);

        self.tab
            .navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;

        self.wait_for_network_idle(deadline, timeout)?;
        debug!("page settled: {}", url);
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.tab
            .call_method(device_metrics(viewport))
            .map_err(|e| Error::RenderError(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest) -> Result<Vec<u8>> {
        let clip = if request.full_page {
            let (width, height) = self.content_size()?;
            Some(Page::Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height,
                scale: 1.0,
            })
        } else {
            None
        };

        if request.omit_background {
            self.set_transparent_background(true)?;
        }

        let shot = self.tab.call_method(screenshot_params(request, clip));

        if request.omit_background {
            if let Err(e) = self.set_transparent_background(false) {
                warn!("Failed to restore background color: {}", e);
            }
        }

        let shot = shot.map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))?;
        base64::engine::general_purpose::STANDARD
            .decode(shot.data)
            .map_err(|e| Error::RenderError(format!("Screenshot data is not base64: {}", e)))
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the Browser kills the child process.
        if let Err(e) = self.tab.close(false) {
            debug!("tab close failed (browser is going away anyway): {}", e);
        }
        drop(self.browser.take());
        Ok(())
    }
}

/// Fixed, non-mobile viewport override.
fn device_metrics(viewport: Viewport) -> Emulation::SetDeviceMetricsOverride {
    Emulation::SetDeviceMetricsOverride {
        width: viewport.width,
        height: viewport.height,
        device_scale_factor: f64::from(viewport.scale),
        mobile: false,
        scale: None,
        screen_width: None,
        screen_height: None,
        position_x: None,
        position_y: None,
        dont_set_visible_size: None,
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    }
}

fn screenshot_params(request: &CaptureRequest, clip: Option<Page::Viewport>) -> Page::CaptureScreenshot {
    let format = match request.format {
        ImageFormat::Jpeg => Page::CaptureScreenshotFormatOption::Jpeg,
        ImageFormat::Png => Page::CaptureScreenshotFormatOption::Png,
    };
    Page::CaptureScreenshot {
        format: Some(format),
        quality: request.quality.map(u32::from),
        clip,
        from_surface: Some(true),
        capture_beyond_viewport: Some(request.full_page),
        optimize_for_speed: None,
    }
}

/// One observation of a loading page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageActivity {
    pub complete: bool,
    pub resources: u64,
}

/// Decides when a page is network-idle: the document is complete and the
/// number of loaded resources has not changed for a whole quiescence window.
#[derive(Debug)]
pub(crate) struct IdleTracker {
    window: Duration,
    last: Option<u64>,
    stable_since: Option<Instant>,
}

impl IdleTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            stable_since: None,
        }
    }

    /// Record a sample taken at `now`; returns true once the page is idle.
    pub fn observe(&mut self, activity: PageActivity, now: Instant) -> bool {
        if !activity.complete {
            self.last = None;
            self.stable_since = None;
            return false;
        }

        if self.last != Some(activity.resources) {
            self.last = Some(activity.resources);
            self.stable_since = Some(now);
        }

        match self.stable_since {
            Some(since) => now.duration_since(since) >= self.window,
            None => false,
        }
    }
}
