//! Frame sequence to animated GIF through an external ffmpeg binary.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::frames::FRAME_PATTERN;
use crate::{Error, Result};

/// Forces both output dimensions to even values, which GIF encoders require.
pub const EVEN_SCALE_FILTER: &str = "[0:v] scale=trunc(iw/2)*2:trunc(ih/2)*2";

/// Invokes ffmpeg once per animation.
#[derive(Debug, Clone)]
pub struct GifEncoder {
    program: PathBuf,
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl GifEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `Some(path)` when an override is given, otherwise `ffmpeg` from `PATH`.
    pub fn from_override(program: Option<&Path>) -> Self {
        program.map(Self::new).unwrap_or_default()
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Encode contiguously numbered `frames` into `output` at `fps`.
    ///
    /// Diagnostic output goes to the log and does not affect the result;
    /// only the exit status does.
    pub async fn encode(&self, frames: &[PathBuf], output: &Path, fps: u32) -> Result<()> {
        let first = frames
            .first()
            .ok_or_else(|| Error::InvalidOptions("no frames to encode".into()))?;
        let dir = first.parent().unwrap_or_else(|| Path::new("."));
        let args = encoder_args(dir, output, fps);

        info!("encoding {} frames into {}", frames.len(), output.display());
        debug!("{} {:?}", self.program.display(), args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::EncoderUnavailable(format!("{}: {}", self.program.display(), e)))?;

        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => debug!("ffmpeg: {}", line),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read encoder output: {}", e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().await?;
        if status.success() {
            info!("GIF written to {}", output.display());
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            warn!("ffmpeg exited with code {}", code);
            Err(Error::EncodeError { code })
        }
    }
}

/// Command line for one encode.
pub fn encoder_args(frame_dir: &Path, output: &Path, fps: u32) -> Vec<OsString> {
    let fps = fps.to_string();
    vec![
        "-y".into(),
        "-framerate".into(),
        fps.clone().into(),
        "-i".into(),
        frame_dir.join(FRAME_PATTERN).into_os_string(),
        "-filter_complex".into(),
        EVEN_SCALE_FILTER.into(),
        "-r".into(),
        fps.into(),
        "-f".into(),
        "gif".into(),
        output.as_os_str().to_os_string(),
    ]
}
