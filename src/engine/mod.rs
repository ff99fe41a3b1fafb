//! Download engine adapter
//!
//! An [`Engine`] composes the pieces in this module for one external tool:
//!
//! - [`CommandBuilder`] records task options; the [`EngineProfile`] renders them
//! - [`ProcessSupervisor`] launches the tool and streams its merged output
//! - [`OutputParser`] turns output lines into title/size/progress/status updates
//!   on the caller's [`TaskState`]
//!
//! Engines differ only in their profile ([`YoutubeDl`], [`Annie`]): binary name,
//! argument spelling, line vocabulary and metadata schema.
//!
//! One `Engine` value serves one invocation; [`Engine::stop`] cancels it from any
//! thread, before or during the run.

mod annie;
mod command;
mod parser;
mod profile;
mod supervisor;
mod youtube_dl;


pub use annie::Annie;
pub use command::{Arg, CommandBuilder, CommandLine};
pub use parser::{LineClassifier, LineDelta, OutputParser, ParseScratch, ParseUpdate};
pub use profile::EngineProfile;
pub use supervisor::{ProcessSupervisor, RunMode, RunOutcome};
pub use youtube_dl::{OUTPUT_TEMPLATE, YoutubeDl};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, EnginesConfig};
use crate::error::{Error, Result};
use crate::task_state::TaskState;
use crate::types::{EngineKind, MediaFormat, Status, TaskConfig};

/// Profile for `kind`
pub fn profile_for(kind: EngineKind) -> Arc<dyn EngineProfile> {
    match kind {
        EngineKind::YoutubeDl => Arc::new(YoutubeDl),
        EngineKind::Annie => Arc::new(Annie),
    }
}

/// Find the executable for `profile`
///
/// Lookup order: explicit path from config, `engines_dir/<name>`, PATH (if
/// `search_path`). When nothing is found the `engines_dir` path is returned anyway,
/// so the eventual launch failure names the expected location.
pub fn locate_binary(profile: &dyn EngineProfile, engines: &EnginesConfig) -> PathBuf {
    if let Some(path) = engines.explicit_path(profile.kind()) {
        return path.clone();
    }

    let name = profile.binary_name();
    let bundled = engines
        .engines_dir
        .join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
    if bundled.is_file() {
        return bundled;
    }

    if engines.search_path {
        match which::which(name) {
            Ok(found) => return found,
            Err(e) => debug!(engine = name, error = %e, "engine not found in PATH"),
        }
    }

    bundled
}

/// Adapter around one external download tool, for one invocation
pub struct Engine {
    profile: Arc<dyn EngineProfile>,
    program: PathBuf,
    supervisor: ProcessSupervisor,
    cancel: CancellationToken,
}

impl Engine {
    /// Engine running `program` with `profile`'s vocabulary
    pub fn new(
        profile: Arc<dyn EngineProfile>,
        program: impl Into<PathBuf>,
        supervisor: ProcessSupervisor,
    ) -> Self {
        Self {
            profile,
            program: program.into(),
            supervisor,
            cancel: CancellationToken::new(),
        }
    }

    /// Engine of `kind`, with binary discovery and output decoding taken from `config`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured charset is unknown. A missing
    /// binary is not detected here; it surfaces as [`Error::Launch`] when a run starts.
    pub fn from_config(kind: EngineKind, config: &Config) -> Result<Self> {
        let profile = profile_for(kind);
        let program = locate_binary(profile.as_ref(), &config.engines);
        let supervisor = ProcessSupervisor::new(config.encoding()?, config.stop_grace_period);
        debug!(engine = %kind, program = ?program, "engine configured");
        Ok(Self::new(profile, program, supervisor))
    }

    /// Engine kind
    pub fn kind(&self) -> EngineKind {
        self.profile.kind()
    }

    /// Executable this engine launches
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Request a cooperative stop
    ///
    /// Safe at any time: before a run starts the run will not launch a process, after
    /// the run has ended it does nothing.
    pub fn stop(&self) {
        debug!(engine = %self.kind(), "stop requested");
        self.cancel.cancel();
    }

    /// List the formats available for `task`'s URL
    ///
    /// Does not touch any [`TaskState`].
    ///
    /// # Errors
    ///
    /// - [`Error::Launch`] if the engine cannot be started
    /// - [`Error::EngineFailure`] if the engine printed nothing, was stopped, or exited
    ///   with an error instead of JSON
    /// - [`Error::StreamDecode`] if the JSON does not match the engine's schema
    pub async fn fetch_metadata(&self, task: &TaskConfig) -> Result<Vec<MediaFormat>> {
        self.fetch_metadata_with(&CommandBuilder::for_metadata(task))
            .await
    }

    /// [`fetch_metadata`](Self::fetch_metadata) with a caller-assembled builder
    ///
    /// The simulate option is added if the builder lacks it.
    pub async fn fetch_metadata_with(&self, builder: &CommandBuilder) -> Result<Vec<MediaFormat>> {
        let builder = if builder.is_simulate() {
            builder.clone()
        } else {
            builder.clone().with_simulate()
        };
        let command = builder.build(&self.program, self.profile.as_ref());

        let outcome = self
            .supervisor
            .run(&command, RunMode::Metadata, &self.cancel)
            .await?;

        let (status, payload, last_line) = match outcome {
            RunOutcome::Exited {
                status,
                payload,
                last_line,
            } => (status, payload, last_line),
            RunOutcome::Stopped => {
                return Err(Error::EngineFailure("no media json returned".to_string()));
            }
        };

        if payload.trim().is_empty() {
            return Err(Error::EngineFailure("no media json returned".to_string()));
        }

        match self.profile.parse_metadata(&payload) {
            Ok(formats) => {
                info!(engine = %self.kind(), formats = formats.len(), "metadata fetched");
                Ok(formats)
            }
            Err(e) if !status.success() => {
                debug!(error = %e, status = %status, "metadata run failed");
                Err(Error::EngineFailure(last_line.unwrap_or_else(|| {
                    format!("{} exited with {status}", self.kind())
                })))
            }
            Err(e) => Err(e),
        }
    }

    /// Download `state`'s task, reporting progress into `state`
    ///
    /// The sink is reopened with [`TaskState::begin`] first, so re-invoking `download`
    /// on a failed or stopped task retries it. Returns the status the sink holds when
    /// the run ends. A stop is not an error.
    ///
    /// # Errors
    ///
    /// - [`Error::Launch`] if the engine cannot be started (sink `Failed`)
    /// - [`Error::EngineFailure`] if the engine exits with a non-zero status; the last
    ///   output line is recorded as the sink's error (sink `Failed`)
    pub async fn download(&self, state: &TaskState) -> Result<Status> {
        self.download_with(&CommandBuilder::for_download(state.config()), state)
            .await
    }

    /// [`download`](Self::download) with a caller-assembled builder
    pub async fn download_with(&self, builder: &CommandBuilder, state: &TaskState) -> Result<Status> {
        let command = builder.build(&self.program, self.profile.as_ref());
        info!(key = %state.key(), engine = %self.kind(), url = ?builder.url(), "starting download");
        // a retry reuses the sink sealed by the previous run
        state.begin();

        let mut parser = OutputParser::new(self.profile.as_ref());
        let mut on_line = |line: &str| apply_update(state, parser.feed(line));
        let result = self
            .supervisor
            .run(&command, RunMode::Transfer(&mut on_line), &self.cancel)
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(key = %state.key(), error = %e, "download failed");
                state.fail(e.to_string());
                return Err(e);
            }
        };

        match outcome {
            RunOutcome::Stopped => {
                state.finish(Status::Stopped);
                info!(key = %state.key(), "download stopped");
                Ok(Status::Stopped)
            }
            RunOutcome::Exited {
                status, last_line, ..
            } if !status.success() => {
                let message =
                    last_line.unwrap_or_else(|| format!("{} exited with {status}", self.kind()));
                warn!(key = %state.key(), status = %status, error = %message, "engine exited with failure");
                state.fail(message.clone());
                Err(Error::EngineFailure(message))
            }
            RunOutcome::Exited { .. } => {
                let status = state.status();
                if status == Status::Completed {
                    state.finish(Status::Completed);
                }
                info!(key = %state.key(), status = ?status, "download finished");
                Ok(status)
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &self.kind())
            .field("program", &self.program)
            .field("supervisor", &self.supervisor)
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

fn apply_update(state: &TaskState, update: ParseUpdate) {
    if let Some(title) = update.title {
        state.set_title(title);
    }
    if let Some(size) = update.size {
        state.set_size(size);
    }
    if let Some(progress) = update.progress {
        state.set_progress(progress);
    }
    if let Some(status) = update.status {
        state.set_status(status);
    }
}
