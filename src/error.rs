//! Error types for the BSA bridge.
//!
//! `BsaError` collects every failure that can be surfaced to a caller. Only
//! construction-time failures ever reach the operator: once an acquisition
//! thread is running, per-frame problems are logged and counted locally and
//! never terminate the loop.
//!
//! ## Error Hierarchy
//!
//! - **`EmptyStreamName` / `EmptyRecordPrefix` / `InvalidConfig`**: semantic
//!   configuration errors caught before any thread is started.
//! - **`Registration`**: the archiving facility refused one of the 24 channels.
//!   Construction is aborted and no partial registry is kept.
//! - **`Io` / `UnsupportedStream` / `Spawn`**: opening the frame source or
//!   starting the acquisition thread failed.
//! - **`Archive`**: a single `store_sample` call failed. The acquisition loop
//!   counts these and moves on to the next channel.
//! - **`Command` / `UnknownCommand`**: console input could not be parsed.
//! - **`Config`**: the configuration file or environment could not be loaded.
//!
//! [`FrameError`] is kept separate because it is produced per frame by the
//! decoder and never leaves the acquisition loop.

use thiserror::Error;

/// Result type alias using [`BsaError`].
pub type Result<T> = std::result::Result<T, BsaError>;

/// Errors that can occur while configuring or running a BSA stream.
#[derive(Error, Debug)]
pub enum BsaError {
    /// The stream name passed at construction was empty.
    #[error("The name of the LCLS1 BSA stream is empty")]
    EmptyStreamName,

    /// The record prefix passed at construction was empty.
    #[error("The record prefix for the LCLS1 BSA PVs is empty")]
    EmptyRecordPrefix,

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong
        message: String,
    },

    /// The archiving facility rejected a channel during registration.
    #[error("Failed to register BSA channel '{channel}': {reason}")]
    Registration {
        /// Full channel name
        channel: String,
        /// Reason given by the facility
        reason: String,
    },

    /// The stream identity does not name a supported transport.
    #[error("Unsupported stream '{name}': expected udp://<addr> or file://<path>")]
    UnsupportedStream {
        /// Stream identity as given
        name: String,
    },

    /// I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The acquisition thread could not be spawned.
    #[error("Failed to spawn acquisition thread: {0}")]
    Spawn(std::io::Error),

    /// The archiving facility failed to store a sample.
    #[error("Archive error: {message}")]
    Archive {
        /// Backend error text
        message: String,
    },

    /// A console command was malformed.
    #[error("{message}")]
    Command {
        /// Operator-facing message
        message: String,
    },

    /// A console command name is not registered.
    #[error("Command '{name}' not found")]
    UnknownCommand {
        /// Command name as typed
        name: String,
    },

    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl BsaError {
    /// Shorthand for [`BsaError::InvalidConfig`].
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Shorthand for [`BsaError::Archive`].
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Check if this error was raised while validating configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyStreamName
                | Self::EmptyRecordPrefix
                | Self::InvalidConfig { .. }
                | Self::Config(_)
        )
    }
}

impl From<figment::Error> for BsaError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Errors produced while interpreting a single stream frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer length does not match the fixed frame size.
    #[error("bad size. Received {got}, instead of {expected} bytes")]
    SizeMismatch {
        /// Bytes received
        got: usize,
        /// Bytes in a frame
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BsaError::Registration {
            channel: "MPLN:LI21:MP01:LC1_BSA_07".to_string(),
            reason: "duplicate".to_string(),
        };
        assert!(err.to_string().contains("LC1_BSA_07"));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = FrameError::SizeMismatch {
            got: 12,
            expected: 148,
        };
        assert_eq!(
            err.to_string(),
            "bad size. Received 12, instead of 148 bytes"
        );
    }

    #[test]
    fn test_config_classification() {
        assert!(BsaError::EmptyStreamName.is_config_error());
        assert!(BsaError::invalid_config("zero timeout").is_config_error());
        assert!(!BsaError::archive("disk full").is_config_error());
    }
}
