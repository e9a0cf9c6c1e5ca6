//! Server configuration, loaded from environment variables (and an optional
//! `.env` file) at startup.

use std::path::{Path, PathBuf};

/// Operating mode; production hides error details from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("production") {
            Mode::Production
        } else {
            Mode::Development
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

/// Runtime configuration for the HTTP server.
///
/// Every field has a default so the server starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind (default: `"0.0.0.0"`).
    pub host: String,

    /// TCP port (default: `3000`).
    pub port: u16,

    pub mode: Mode,

    /// Root for `uploads/`, `output/`, `frames/` and `temp/` (default: `.`).
    pub data_dir: PathBuf,

    /// Browser executable override.
    pub chrome_path: Option<PathBuf>,

    /// ffmpeg executable override.
    pub ffmpeg_path: Option<PathBuf>,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Base URL prefixed to download links; `None` keeps them relative.
    pub public_url: Option<String>,

    /// Comma-separated allowed origins; `None` allows any origin.
    pub cors_origins: Option<String>,

    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,

    /// Concurrent browser bound; `0` means unbounded.
    pub max_renders: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`Config::from_env`] after loading `path` (a `.env` file) into the
    /// process environment. Variables that are already set keep their value;
    /// a missing or unreadable file is ignored.
    pub fn from_env_file(path: impl AsRef<Path>) -> Self {
        dotenvy::from_path(path.as_ref()).ok();
        Self::from_env()
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse = |key: &str, default: u64| -> u64 {
            get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };

        Self {
            host: get("HTMLCAP_HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: u16::try_from(parse("HTMLCAP_PORT", 3000)).unwrap_or(3000),
            mode: get("HTMLCAP_ENV").map(|v| Mode::parse(&v)).unwrap_or_default(),
            data_dir: get("HTMLCAP_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            chrome_path: get("HTMLCAP_CHROME_PATH").map(PathBuf::from),
            ffmpeg_path: get("HTMLCAP_FFMPEG_PATH").map(PathBuf::from),
            log_level: get("HTMLCAP_LOG").unwrap_or_else(|| "info".to_owned()),
            log_json: get("HTMLCAP_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            public_url: get("HTMLCAP_PUBLIC_URL").map(|v| v.trim().trim_end_matches('/').to_owned()),
            cors_origins: get("HTMLCAP_CORS_ORIGINS"),
            max_upload_bytes: usize::try_from(parse("HTMLCAP_MAX_UPLOAD_MB", 50))
                .unwrap_or(50)
                .saturating_mul(1024 * 1024),
            max_renders: usize::try_from(parse("HTMLCAP_MAX_RENDERS", 0)).unwrap_or(0),
        }
    }

    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.data_dir.join("frames")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    /// Every directory the server writes to.
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![self.uploads_dir(), self.output_dir(), self.frames_dir(), self.temp_dir()]
    }

    /// Link under which `filename` is served from the output directory.
    pub fn download_url(&self, filename: &str) -> String {
        format!("{}/output/{}", self.public_url.as_deref().unwrap_or(""), filename)
    }

    /// Upload limit in whole megabytes, for messages.
    pub fn max_upload_mb(&self) -> usize {
        self.max_upload_bytes / (1024 * 1024)
    }

    /// Point every directory at `root`.
    pub fn with_data_dir(mut self, root: impl AsRef<Path>) -> Self {
        self.data_dir = root.as_ref().to_path_buf();
        self
    }
}
