//! Error types for Vireo Core

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestration error types
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("plugin must have a legal name, but the name is empty")]
    InvalidPluginName,

    #[error("invalid plugin definition for \"{name}\": {reason}")]
    InvalidPluginDefinition { name: String, reason: String },

    #[error("unsupported kernel type: {name}")]
    UnsupportedKernel { name: String },

    #[error("no kernel builder resolved for box \"{box_kind}\"")]
    MissingKernelBuilder { box_kind: String },

    #[error("plugin \"{id}\" has not been installed")]
    PluginNotInstalled { id: String },

    #[error("invalid player config: {0}")]
    InvalidConfig(String),

    #[error("player has been destroyed")]
    Destroyed,

    // Playback errors
    #[error("media error: {message}")]
    Media { message: String },

    // Silent load errors
    #[error("the silent load was aborted by the user")]
    Aborted,

    #[error("the silent load for {src} timed out, set a longer duration or check the network")]
    SilentLoadTimeout { src: String },
}

impl Error {
    /// Create a media error from an element-level failure message
    pub fn media(message: impl Into<String>) -> Self {
        Error::Media {
            message: message.into(),
        }
    }

    /// Returns true if this error is a fatal validation failure raised
    /// synchronously at the call boundary
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidPluginName
                | Error::InvalidPluginDefinition { .. }
                | Error::UnsupportedKernel { .. }
                | Error::MissingKernelBuilder { .. }
                | Error::PluginNotInstalled { .. }
                | Error::InvalidConfig(_)
                | Error::Destroyed
        )
    }

    /// Returns the error code for event payloads
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidPluginName => "INVALID_PLUGIN_NAME",
            Error::InvalidPluginDefinition { .. } => "INVALID_PLUGIN_DEF",
            Error::UnsupportedKernel { .. } => "UNSUPPORTED_KERNEL",
            Error::MissingKernelBuilder { .. } => "MISSING_KERNEL_BUILDER",
            Error::PluginNotInstalled { .. } => "PLUGIN_NOT_INSTALLED",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Destroyed => "DESTROYED",
            Error::Media { .. } => "MEDIA",
            Error::Aborted => "ABORTED",
            Error::SilentLoadTimeout { .. } => "SILENT_LOAD_TIMEOUT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::InvalidPluginName.is_fatal());
        assert!(Error::UnsupportedKernel {
            name: "webm".into()
        }
        .is_fatal());
        assert!(!Error::media("decode failed").is_fatal());
        assert!(!Error::Aborted.is_fatal());
        assert!(!Error::SilentLoadTimeout { src: "a.mp4".into() }.is_fatal());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Aborted.error_code(), "ABORTED");
        assert_eq!(
            Error::SilentLoadTimeout { src: "a.mp4".into() }.error_code(),
            "SILENT_LOAD_TIMEOUT"
        );
    }
}
