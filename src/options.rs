//! Conversion options as accepted from callers.
//!
//! Callers send a loosely-typed JSON document (`{"type": "gif", "fps": "5"}`
//! is as valid as `{"type": "gif", "fps": 5}`). [`ConversionOptions::from_value`]
//! turns that document into validated options; the accessors on
//! [`ConversionOptions`] apply the defaults each rendering path uses.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, ImageFormat, Result, Viewport};

/// Viewport used for animated captures when the caller gives none.
pub const DEFAULT_ANIMATION_VIEWPORT: Viewport = Viewport {
    width: 1400,
    height: 800,
    scale: 1,
};

/// Default GIF length in milliseconds.
pub const DEFAULT_DURATION_MS: u64 = 3000;

/// Default GIF frame rate.
pub const DEFAULT_FPS: u32 = 10;

/// Default settle delay before a still capture when `waitForAnimation` is set.
pub const DEFAULT_SETTLE_MS: u64 = 1000;

/// JPEG quality used when the caller gives none (or `0`).
pub const DEFAULT_QUALITY: u8 = 100;

/// Largest accepted device scale factor.
pub const MAX_SCALE: u32 = 3;

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Gif,
}

impl OutputFormat {
    /// File extension for produced artifacts.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
        }
    }

    /// Raster format for still captures; `None` for animated output.
    pub fn still_format(self) -> Option<ImageFormat> {
        match self {
            OutputFormat::Jpeg => Some(ImageFormat::Jpeg),
            OutputFormat::Png => Some(ImageFormat::Png),
            OutputFormat::Gif => None,
        }
    }

    pub fn is_animated(self) -> bool {
        self == OutputFormat::Gif
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "gif" => Ok(OutputFormat::Gif),
            other => Err(Error::InvalidOptions(format!(
                "unsupported output type '{}' (expected jpeg, png or gif)",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Dimensions echoed back to the caller exactly as requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

/// Validated conversion options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionOptions {
    pub format: OutputFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scale: Option<u32>,
    pub quality: Option<u32>,
    pub duration_ms: Option<u64>,
    pub fps: Option<u32>,
    pub wait_for_animation: bool,
    pub animation_duration_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawOptions {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    width: Option<u64>,
    #[serde(deserialize_with = "lenient::number")]
    height: Option<u64>,
    #[serde(deserialize_with = "lenient::number")]
    scale: Option<u64>,
    #[serde(deserialize_with = "lenient::number")]
    quality: Option<u64>,
    #[serde(deserialize_with = "lenient::number")]
    duration: Option<u64>,
    #[serde(deserialize_with = "lenient::number")]
    fps: Option<u64>,
    #[serde(deserialize_with = "lenient::flag")]
    wait_for_animation: Option<bool>,
    #[serde(deserialize_with = "lenient::number")]
    animation_duration: Option<u64>,
}

impl ConversionOptions {
    /// Options for the given format with every other field defaulted.
    pub fn for_format(format: OutputFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Parse the `options` field of a request.
    ///
    /// `None`, `null` and the empty string mean "all defaults". A string is
    /// treated as a JSON-encoded document; an object is used directly.
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        let parsed;
        let document = match value {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(Self::default()),
            Some(Value::String(s)) => {
                parsed = serde_json::from_str::<Value>(s)
                    .map_err(|e| Error::InvalidOptions(format!("options is not valid JSON: {}", e)))?;
                &parsed
            }
            Some(other) => other,
        };

        if !document.is_object() {
            return Err(Error::InvalidOptions("options must be a JSON object".into()));
        }

        let raw = RawOptions::deserialize(document)
            .map_err(|e| Error::InvalidOptions(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Parse a JSON-encoded options string.
    pub fn from_json(raw: &str) -> Result<Self> {
        Self::from_value(Some(&Value::String(raw.to_string())))
    }

    fn from_raw(raw: RawOptions) -> Result<Self> {
        let format = match raw.kind.as_deref() {
            None | Some("") => OutputFormat::default(),
            Some(kind) => OutputFormat::parse(kind)?,
        };

        let options = Self {
            format,
            width: positive("width", raw.width)?,
            height: positive("height", raw.height)?,
            scale: positive("scale", raw.scale)?,
            quality: raw.quality.map(saturate_u32),
            duration_ms: raw.duration,
            fps: positive("fps", raw.fps)?,
            wait_for_animation: raw.wait_for_animation.unwrap_or(false),
            animation_duration_ms: raw.animation_duration,
        };

        if let Some(scale) = options.scale {
            if scale > MAX_SCALE {
                return Err(Error::InvalidOptions(format!(
                    "scale must be between 1 and {}, got {}",
                    MAX_SCALE, scale
                )));
            }
        }

        if format.is_animated() && options.frame_count() == 0 {
            return Err(Error::InvalidOptions(format!(
                "duration {}ms at {} fps yields no frames",
                options.duration(),
                options.fps()
            )));
        }

        Ok(options)
    }

    /// Quality forwarded to the capture call; always `None` for lossless output.
    pub fn effective_quality(&self) -> Option<u8> {
        match self.format {
            OutputFormat::Jpeg => Some(match self.quality {
                None | Some(0) => DEFAULT_QUALITY,
                Some(q) => q.min(100) as u8,
            }),
            OutputFormat::Png | OutputFormat::Gif => None,
        }
    }

    /// Fixed viewport for animated captures.
    pub fn animation_viewport(&self) -> Viewport {
        Viewport {
            width: self.width.unwrap_or(DEFAULT_ANIMATION_VIEWPORT.width),
            height: self.height.unwrap_or(DEFAULT_ANIMATION_VIEWPORT.height),
            scale: self.scale.unwrap_or(DEFAULT_ANIMATION_VIEWPORT.scale),
        }
    }

    pub fn duration(&self) -> u64 {
        self.duration_ms.unwrap_or(DEFAULT_DURATION_MS)
    }

    pub fn fps(&self) -> u32 {
        self.fps.unwrap_or(DEFAULT_FPS)
    }

    /// `floor(duration / 1000 * fps)`
    pub fn frame_count(&self) -> usize {
        let frames = self.duration().saturating_mul(u64::from(self.fps())) / 1000;
        usize::try_from(frames).unwrap_or(usize::MAX)
    }

    /// Pause between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps().max(1)))
    }

    /// Extra delay before a still capture, if requested.
    pub fn settle_delay(&self) -> Option<Duration> {
        if !self.wait_for_animation {
            return None;
        }
        match self.animation_duration_ms {
            None | Some(0) => Some(Duration::from_millis(DEFAULT_SETTLE_MS)),
            Some(ms) => Some(Duration::from_millis(ms)),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
            scale: self.scale,
        }
    }
}

fn saturate_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn positive(name: &str, value: Option<u64>) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(0) => Err(Error::InvalidOptions(format!("{} must be a positive integer", name))),
        Some(v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| Error::InvalidOptions(format!("{} is too large: {}", name, v))),
    }
}

/// Deserializers that accept the loose values browsers and forms send.
mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(v) => Ok(Some(v)),
                None => from_float(n.as_f64()).map_err(D::Error::custom),
            },
            Some(Value::String(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    return Ok(None);
                }
                match s.parse::<u64>() {
                    Ok(v) => Ok(Some(v)),
                    Err(_) => from_float(s.parse::<f64>().ok()).map_err(D::Error::custom),
                }
            }
            Some(other) => Err(D::Error::custom(format!("expected a number, got {}", other))),
        }
    }

    fn from_float(value: Option<f64>) -> Result<Option<u64>, String> {
        match value {
            Some(f) if f.is_finite() && f >= 0.0 => Ok(Some(f.floor() as u64)),
            Some(f) => Err(format!("expected a non-negative number, got {}", f)),
            None => Err("expected a number".to_string()),
        }
    }

    pub(super) fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(Some(true)),
                "false" | "0" | "off" | "no" | "" => Ok(Some(false)),
                other => Err(D::Error::custom(format!("expected a boolean, got '{}'", other))),
            },
            Some(Value::Number(n)) => Ok(Some(n.as_f64().map_or(false, |v| v != 0.0))),
            Some(other) => Err(D::Error::custom(format!("expected a boolean, got {}", other))),
        }
    }
}
