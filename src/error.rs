//! Error types for rendering and conversion

use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering or encoding a document
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch the browser
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Failed to render content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Caller supplied options that cannot be honored
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The encoder ran but exited unsuccessfully (-1 when killed by a signal)
    #[error("Encoder process exited with code {code}")]
    EncodeError { code: i32 },

    /// The encoder binary could not be started
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidOptions(_))
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_error_names_exit_code() {
        let err = Error::EncodeError { code: 1 };
        assert_eq!(err.to_string(), "Encoder process exited with code 1");
    }

    #[test]
    fn only_invalid_options_are_client_errors() {
        assert!(Error::InvalidOptions("fps".into()).is_client_error());
        assert!(!Error::RenderError("boom".into()).is_client_error());
        assert!(!Error::EncodeError { code: 2 }.is_client_error());
    }

    #[cfg(feature = "cdp")]
    #[test]
    fn protocol_errors_become_cdp_errors() {
        let err: Error = anyhow::anyhow!("Method not found").into();
        assert_eq!(err.to_string(), "CDP error: Method not found");
    }
}
