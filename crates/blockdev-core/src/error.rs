//! Error types for blockdev operations

use thiserror::Error;

/// Main error type for blockdev operations.
///
/// One flat taxonomy covers both subsystems; callers distinguish
/// failures by kind, never by parsing messages.
#[derive(Error, Debug)]
pub enum Error {
    #[error("module tooling initialization failed: {0}")]
    ModuleInitFailed(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("module '{name}' is already loaded: {detail}")]
    ModuleAlreadyLoaded { name: String, detail: String },

    #[error("module operation failed: {0}")]
    ModuleOperationFailed(String),

    #[error("{msg}: {source}")]
    Io {
        msg: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command '{command}' failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("failed to determine Set UUID from: {0}")]
    BcacheParse(String),

    #[error("bcache setup failed: {0}")]
    SetupFailed(String),

    #[error("failed to determine cache set UUID: {0}")]
    UuidResolution(String),

    #[error("no cache attached to '{0}' or '{0}' not set up")]
    NotAttached(String),

    #[error("failed to detach '{uuid}' from '{device}': {detail}")]
    DetachFailed {
        uuid: String,
        device: String,
        detail: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with a descriptive message
    pub fn io(msg: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            msg: msg.into(),
            source,
        }
    }

    /// Prefix additional context onto the message, keeping the kind.
    pub fn context(self, prefix: impl AsRef<str>) -> Self {
        let prefix = prefix.as_ref();
        match self {
            Error::ModuleInitFailed(msg) => Error::ModuleInitFailed(format!("{prefix}: {msg}")),
            Error::ModuleNotFound(msg) => Error::ModuleNotFound(format!("{prefix}: {msg}")),
            Error::ModuleAlreadyLoaded { name, detail } => Error::ModuleAlreadyLoaded {
                name,
                detail: format!("{prefix}: {detail}"),
            },
            Error::ModuleOperationFailed(msg) => {
                Error::ModuleOperationFailed(format!("{prefix}: {msg}"))
            }
            Error::Io { msg, source } => Error::Io {
                msg: format!("{prefix}: {msg}"),
                source,
            },
            Error::CommandFailed { command, detail } => Error::CommandFailed {
                command,
                detail: format!("{prefix}: {detail}"),
            },
            Error::BcacheParse(msg) => Error::BcacheParse(format!("{prefix}: {msg}")),
            Error::SetupFailed(msg) => Error::SetupFailed(format!("{prefix}: {msg}")),
            Error::UuidResolution(msg) => Error::UuidResolution(format!("{prefix}: {msg}")),
            Error::NotAttached(device) => Error::NotAttached(device),
            Error::DetachFailed {
                uuid,
                device,
                detail,
            } => Error::DetachFailed {
                uuid,
                device,
                detail: format!("{prefix}: {detail}"),
            },
            Error::InvalidArgument(msg) => Error::InvalidArgument(format!("{prefix}: {msg}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_the_kind() {
        let err = Error::io(
            "failed to write '1' to '/sys/block/zram0/disksize'",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        )
        .context("failed to set size for '/dev/zram0'");

        assert!(matches!(err, Error::Io { .. }));
        let rendered = err.to_string();
        assert!(rendered.starts_with("failed to set size for '/dev/zram0': "));
        assert!(rendered.contains("/sys/block/zram0/disksize"));
    }

    #[test]
    fn not_attached_names_the_device_twice() {
        let err = Error::NotAttached("bcache0".to_string());
        assert_eq!(
            err.to_string(),
            "no cache attached to 'bcache0' or 'bcache0' not set up"
        );
    }
}
