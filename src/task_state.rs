//! Task state sink shared between one engine worker and any number of readers
//!
//! Every field is individually atomic: a reader never observes a torn progress value
//! or status, but title and size may momentarily disagree with each other while a
//! worker is writing. Text fields sit behind short-lived `RwLock`s; status and
//! progress are plain atomics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::types::{Status, TaskConfig, TaskKey};

/// Mutable record of one download task
///
/// Created by the caller before an engine runs, written by exactly one engine worker
/// at a time, readable from anywhere. Once a run has ended the sink is *sealed*: the
/// terminal status is final and further engine writes are ignored until the caller
/// starts a new run with [`begin`](Self::begin).
#[derive(Debug)]
pub struct TaskState {
    key: TaskKey,
    config: TaskConfig,
    title: RwLock<String>,
    size: RwLock<String>,
    status: AtomicI32,
    progress: AtomicU64,
    error: RwLock<Option<String>>,
    sealed: AtomicBool,
}

/// Point-in-time copy of a [`TaskState`], used for persistence and display
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task key (creation timestamp)
    pub key: TaskKey,
    /// Task configuration
    pub config: TaskConfig,
    /// Display title
    pub title: String,
    /// Human-readable size
    pub size: String,
    /// Status at snapshot time
    pub status: Status,
    /// Progress fraction in [0.0, 1.0]
    pub progress: f64,
    /// Last recorded error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskState {
    /// Create a pending task with a fresh key
    pub fn new(config: TaskConfig) -> Self {
        Self::with_key(TaskKey::now(), config)
    }

    /// Create a pending task with an explicit key
    pub fn with_key(key: TaskKey, config: TaskConfig) -> Self {
        Self {
            key,
            config,
            title: RwLock::new(String::new()),
            size: RwLock::new(String::new()),
            status: AtomicI32::new(Status::Pending.to_i32()),
            progress: AtomicU64::new(0f64.to_bits()),
            error: RwLock::new(None),
            sealed: AtomicBool::new(false),
        }
    }

    /// Rebuild a task from a persisted snapshot
    ///
    /// A restored task whose status is terminal comes back sealed.
    pub fn restore(snapshot: TaskSnapshot) -> Self {
        let sealed = snapshot.status.is_terminal();
        Self {
            key: snapshot.key,
            config: snapshot.config,
            title: RwLock::new(snapshot.title),
            size: RwLock::new(snapshot.size),
            status: AtomicI32::new(snapshot.status.to_i32()),
            progress: AtomicU64::new(snapshot.progress.clamp(0.0, 1.0).to_bits()),
            error: RwLock::new(snapshot.error),
            sealed: AtomicBool::new(sealed),
        }
    }

    /// Task key
    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Task configuration
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Display title
    pub fn title(&self) -> String {
        self.title
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Human-readable size
    pub fn size(&self) -> String {
        self.size
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current status
    pub fn status(&self) -> Status {
        Status::from_i32(self.status.load(Ordering::Acquire))
    }

    /// Progress fraction in [0.0, 1.0]
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Acquire))
    }

    /// Last recorded error
    pub fn error(&self) -> Option<String> {
        self.error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the last run has ended and its status is final
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Copy every field
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            key: self.key,
            config: self.config.clone(),
            title: self.title(),
            size: self.size(),
            status: self.status(),
            progress: self.progress(),
            error: self.error(),
        }
    }

    /// Prepare the sink for a new run: unseal, clear the error, status `Analyzing`
    pub fn begin(&self) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.status
            .store(Status::Analyzing.to_i32(), Ordering::Release);
        self.sealed.store(false, Ordering::Release);
    }

    /// Set the display title (ignored once sealed)
    pub fn set_title(&self, title: impl Into<String>) {
        if self.is_sealed() {
            return;
        }
        *self.title.write().unwrap_or_else(PoisonError::into_inner) = title.into();
    }

    /// Set the human-readable size (ignored once sealed)
    pub fn set_size(&self, size: impl Into<String>) {
        if self.is_sealed() {
            return;
        }
        *self.size.write().unwrap_or_else(PoisonError::into_inner) = size.into();
    }

    /// Set the progress fraction, clamped to [0.0, 1.0] (ignored once sealed)
    pub fn set_progress(&self, progress: f64) {
        if self.is_sealed() || progress.is_nan() {
            return;
        }
        self.progress
            .store(progress.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    /// Set a provisional status during a run (ignored once sealed)
    pub fn set_status(&self, status: Status) {
        if self.is_sealed() {
            return;
        }
        self.status.store(status.to_i32(), Ordering::Release);
    }

    /// End the run with `status` and seal the sink
    ///
    /// Returns `false` if the sink was already sealed, in which case nothing changes.
    pub fn finish(&self, status: Status) -> bool {
        if self
            .sealed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.status.store(status.to_i32(), Ordering::Release);
        true
    }

    /// End the run as `Failed`, recording `error`
    ///
    /// Returns `false` if the sink was already sealed.
    pub fn fail(&self, error: impl Into<String>) -> bool {
        if self.is_sealed() {
            return false;
        }
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = Some(error.into());
        self.finish(Status::Failed)
    }
}
