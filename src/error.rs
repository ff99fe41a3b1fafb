//! Error types for vdm-engine
//!
//! This module provides the error taxonomy of the engine adapter:
//! - Launch failures (engine executable missing or not runnable)
//! - Metadata decode failures (the engine printed something that is not the expected JSON)
//! - Engine failures (no payload, non-zero exit)
//! - Task bookkeeping errors raised by the [`TaskManager`](crate::TaskManager)
//!
//! A cooperative stop is never an error. Unrecognized engine output is never an error either.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{EngineKind, TaskKey};

/// Result type alias for vdm-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vdm-engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "charset")
        key: Option<String>,
    },

    /// The engine executable could not be started
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        /// Program that was being executed
        program: PathBuf,
        /// Underlying spawn error (not found, permission denied, ...)
        #[source]
        source: std::io::Error,
    },

    /// Metadata payload could not be decoded into the engine's schema
    #[error("failed to decode {engine} metadata: {source}")]
    StreamDecode {
        /// Engine whose schema was expected
        engine: EngineKind,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// The engine ran but did not produce a usable result
    #[error("engine failure: {0}")]
    EngineFailure(String),

    /// A run for this task key is still live
    #[error("task {0} is already running")]
    AlreadyRunning(TaskKey),

    /// Operation not supported by the engine adapter
    #[error("not supported: {0}")]
    NotSupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable error code, suitable for persisting next to a failed task row
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Launch { .. } => "launch_failure",
            Error::StreamDecode { .. } => "stream_decode_failure",
            Error::EngineFailure(_) => "engine_failure",
            Error::AlreadyRunning(_) => "already_running",
            Error::NotSupported(_) => "not_supported",
            Error::Io(_) => "io_error",
        }
    }
}
