use crate::services::desktop::DetachReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackdropError {
    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to find matching window.")]
    WindowNotFound,

    #[error("Failed to start process {path}: {reason}")]
    SpawnFailure { path: String, reason: String },

    #[error("Failed to retrieve main window handle (pid {pid}, waited {timeout_ms} ms)")]
    MainWindowResolutionTimeout { pid: u32, timeout_ms: u128 },

    #[error("Failed to set wallpaper: {0}")]
    AttachFailure(String),

    /// Carries whatever was already detached before the failure
    #[error("Failed to reset wallpaper: {reason}")]
    DetachFailure {
        reason: String,
        report: DetachReport,
    },

    #[error("Window system call failed: {0}")]
    Os(String),

    #[cfg_attr(windows, allow(dead_code))]
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl BackdropError {
    pub fn spawn_failure(path: impl Into<String>, reason: impl ToString) -> Self {
        BackdropError::SpawnFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackdropError>;

// Shorthand for the string-carrying variants
#[macro_export]
macro_rules! backdrop_error {
    (attach, $($arg:tt)*) => {
        $crate::error::BackdropError::AttachFailure(format!($($arg)*))
    };
    (os, $($arg:tt)*) => {
        $crate::error::BackdropError::Os(format!($($arg)*))
    };
    (unsupported, $($arg:tt)*) => {
        $crate::error::BackdropError::UnsupportedPlatform(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_not_found_message_is_stable() {
        assert_eq!(
            BackdropError::WindowNotFound.to_string(),
            "Failed to find matching window."
        );
    }

    #[test]
    fn macro_builds_formatted_variants() {
        let err = backdrop_error!(attach, "handle {:#x} is gone", 0x1a2b);
        assert_eq!(err.to_string(), "Failed to set wallpaper: handle 0x1a2b is gone");

        let err = backdrop_error!(os, "SetParent returned {}", 0);
        assert!(matches!(err, BackdropError::Os(msg) if msg == "SetParent returned 0"));
    }
}
