//! Shared fixtures: a scripted in-process engine and stand-in encoders.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use htmlcap::convert::Converter;
use htmlcap::encoder::GifEncoder;
use htmlcap::render::RenderDriver;
use htmlcap::server::{ensure_directories, AppState, Config};
use htmlcap::{CaptureRequest, Engine, EngineConfig, Error, ImageFormat, Launcher, Result, Viewport};

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
pub const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0";

/// One call made on a scripted browser.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Goto(String, Duration),
    SetViewport(Viewport),
    Capture(CaptureRequest),
    Close,
}

/// Everything the fake browsers were asked to do, in order, shared across
/// launches.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<EngineEvent>>,
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    fn record(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn captures(&self) -> Vec<CaptureRequest> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Capture(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Goto(url, _) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::SetViewport(viewport) => Some(viewport),
                _ => None,
            })
            .collect()
    }

    /// Most browsers that were open at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn open_browsers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Behaves like a browser that loads anything except URLs containing
/// `unreachable`, optionally taking `load_delay` per navigation.
pub struct ScriptedEngine {
    recorder: Arc<Recorder>,
    load_delay: Duration,
}

impl Engine for ScriptedEngine {
    fn load_url(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.recorder.record(EngineEvent::Goto(url.to_string(), timeout));
        std::thread::sleep(self.load_delay);
        if url.contains("unreachable") {
            return Err(Error::LoadError(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.recorder.record(EngineEvent::SetViewport(viewport));
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest) -> Result<Vec<u8>> {
        self.recorder.record(EngineEvent::Capture(*request));
        Ok(match request.format {
            ImageFormat::Png => PNG_MAGIC.to_vec(),
            ImageFormat::Jpeg => JPEG_MAGIC.to_vec(),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.recorder.record(EngineEvent::Close);
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        self.recorder.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn scripted_launcher(recorder: Arc<Recorder>, load_delay: Duration) -> Arc<dyn Launcher> {
    Arc::new(move |_: &EngineConfig| -> Result<Box<dyn Engine>> {
        recorder.launches.fetch_add(1, Ordering::SeqCst);
        let now = recorder.active.fetch_add(1, Ordering::SeqCst) + 1;
        recorder.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            recorder: recorder.clone(),
            load_delay,
        }))
    })
}

/// A shell script standing in for ffmpeg.
///
/// The successful variant writes a GIF header to its last argument, the
/// output path; the failing one exits with status 3.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, succeed: bool) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(if succeed { "ffmpeg-ok" } else { "ffmpeg-fail" });
    let script = if succeed {
        "#!/bin/sh\nfor last; do :; done\nprintf 'GIF89a' > \"$last\"\n"
    } else {
        "#!/bin/sh\necho 'Conversion failed!' >&2\nexit 3\n"
    };
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn converter(recorder: Arc<Recorder>, encoder: GifEncoder, frames_root: &Path) -> Converter {
    let driver = RenderDriver::new(scripted_launcher(recorder, Duration::ZERO), EngineConfig::default());
    Converter::new(driver, encoder, frames_root)
}

/// Server state rooted in `root` with every directory created.
pub fn app_state(root: &Path, recorder: Arc<Recorder>, ffmpeg: Option<PathBuf>, production: bool) -> Arc<AppState> {
    let mut config = Config::default().with_data_dir(root);
    config.ffmpeg_path = ffmpeg;
    if production {
        config.mode = htmlcap::server::Mode::Production;
    }
    ensure_directories(&config).unwrap();
    Arc::new(AppState::from_config(config, scripted_launcher(recorder, Duration::ZERO)))
}

/// Regular files anywhere below `dir`.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}

/// Entries (files or directories) directly inside `dir`.
pub fn entries_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|e| e.count()).unwrap_or(0)
}
