//! # vdm-engine
//!
//! Download engine adapter for a desktop video download manager.
//!
//! Media retrieval is delegated to external extractors (youtube-dl, annie). This
//! crate is the part in between: it builds the engine's command line from a task
//! configuration, launches and supervises the process, turns its unstructured output
//! into progress updates on a shared [`TaskState`], and stops it on request.
//!
//! ## Design
//!
//! - **Engine profiles** - everything engine-specific (flags, output vocabulary,
//!   metadata schema) lives behind [`engine::EngineProfile`]; process handling is shared
//! - **Lock-light state** - a [`TaskState`] can be read from any thread while its
//!   worker writes to it
//! - **Cooperative stop** - cancellation tokens instead of shared flags, with a
//!   graceful-then-forced termination of the engine process
//! - **Event-driven** - consumers subscribe to [`Event`]s from the [`TaskManager`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vdm_engine::{Config, EngineKind, Event, TaskConfig, TaskManager, TaskState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TaskManager::new(Config::default())?;
//!     let mut events = manager.subscribe();
//!
//!     let task = TaskConfig::new(EngineKind::YoutubeDl, "https://example.com/watch?v=1", "/downloads");
//!     let formats = manager.fetch_metadata(&task).await?;
//!     println!("{} formats available", formats.len());
//!
//!     let state = Arc::new(TaskState::new(task));
//!     manager.start(Arc::clone(&state)).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{:.0}% {}", state.progress() * 100.0, state.title());
//!         if matches!(event, Event::Finished { .. } | Event::Failed { .. }) {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Engine adapter: command builder, output parser, process supervisor, profiles
pub mod engine;
/// Error types
pub mod error;
/// Task manager owning the running engine invocations
pub mod manager;
/// Shared task state sink
pub mod task_state;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, EnginesConfig};
pub use engine::{CommandBuilder, Engine, EngineProfile};
pub use error::{Error, Result};
pub use manager::TaskManager;
pub use task_state::{TaskSnapshot, TaskState};
pub use types::{
    DownloadKind, EngineKind, Event, MediaFormat, ProxyKind, ProxySettings, Status, TaskConfig,
    TaskKey,
};
