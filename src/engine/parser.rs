//! Output parser: engine output lines → task progress
//!
//! Parsing is split in two:
//! - a [`LineClassifier`] (one per engine) turns a single line into a [`LineDelta`]
//!   without touching any state;
//! - [`OutputParser`] folds deltas into [`ParseScratch`] with sticky title/size
//!   semantics and derives the task [`Status`].
//!
//! Nothing here fails: a line with no recognizable token changes nothing.

use regex::Regex;
use tracing::debug;

use crate::types::Status;

/// Tokens recognized on one line
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineDelta {
    /// File name being written
    pub title: Option<String>,
    /// Total size, as printed
    pub size: Option<String>,
    /// Progress fraction in [0.0, 1.0]
    pub progress: Option<f64>,
    /// Transfer speed, as printed
    pub speed: Option<String>,
    /// Line announces a post-processing step
    pub post_processing: bool,
}

/// Engine-specific line vocabulary
pub trait LineClassifier: Send + Sync {
    /// Classify one trimmed line
    ///
    /// `scratch` is the state before this line; classifiers skip title and size
    /// matching once those fields are known.
    fn classify(&self, line: &str, scratch: &ParseScratch) -> LineDelta;
}

/// Last-known values for one invocation
#[derive(Clone, Debug, PartialEq)]
pub struct ParseScratch {
    /// Title (sticky once set)
    pub title: String,
    /// Size (sticky once set)
    pub size: String,
    /// Progress fraction
    pub progress: f64,
    /// Transfer speed
    pub speed: String,
}

impl Default for ParseScratch {
    fn default() -> Self {
        Self {
            title: String::new(),
            size: String::new(),
            progress: 0.0,
            speed: "0MiB/s".to_string(),
        }
    }
}

impl ParseScratch {
    /// Fold `delta` into the scratch state
    ///
    /// Returns the fields that changed and the derived status.
    pub fn apply(&mut self, delta: LineDelta) -> ParseUpdate {
        let mut update = ParseUpdate::default();

        if self.title.is_empty()
            && let Some(title) = delta.title.filter(|t| !t.is_empty())
        {
            self.title = title.clone();
            update.title = Some(title);
        }

        if self.size.is_empty()
            && let Some(size) = delta.size.filter(|s| !s.is_empty())
        {
            self.size = size.clone();
            update.size = Some(size);
        }

        if let Some(progress) = delta.progress {
            self.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(speed) = delta.speed {
            self.speed = speed;
        }

        if self.progress >= 1.0 {
            update.progress = Some(1.0);
            update.status = Some(if delta.post_processing {
                Status::Merging
            } else {
                Status::Completed
            });
        } else if self.progress > 0.0 {
            update.progress = Some(self.progress);
            update.status = Some(Status::Downloading);
        }

        update
    }
}

/// Sink writes produced by one line
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParseUpdate {
    /// Newly discovered title
    pub title: Option<String>,
    /// Newly discovered size
    pub size: Option<String>,
    /// Progress to publish
    pub progress: Option<f64>,
    /// Status to publish
    pub status: Option<Status>,
}

/// Stateful line parser for one invocation
pub struct OutputParser<'a> {
    classifier: &'a dyn LineClassifier,
    scratch: ParseScratch,
}

impl<'a> OutputParser<'a> {
    /// Fresh parser using `classifier`'s vocabulary
    pub fn new(classifier: &'a dyn LineClassifier) -> Self {
        Self {
            classifier,
            scratch: ParseScratch::default(),
        }
    }

    /// Parse one line
    pub fn feed(&mut self, line: &str) -> ParseUpdate {
        let line = line.trim();
        let delta = self.classifier.classify(line, &self.scratch);
        let update = self.scratch.apply(delta);
        debug!(
            line,
            title = %self.scratch.title,
            progress = self.scratch.progress,
            size = %self.scratch.size,
            speed = %self.scratch.speed,
            "parsed engine output"
        );
        update
    }

    /// Current scratch state
    pub fn scratch(&self) -> &ParseScratch {
        &self.scratch
    }
}

/// Convert a percentage token such as "42.0%" to a fraction
pub(crate) fn percent_to_fraction(token: &str) -> Option<f64> {
    let number = token.trim().trim_end_matches('%').trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .map(|p| (p / 100.0).clamp(0.0, 1.0))
}

/// Compile a literal pattern
///
/// Only called with string literals, each of which is exercised by the profile tests.
#[allow(clippy::expect_used)]
pub(crate) fn literal_regex(source: &'static str) -> Regex {
    Regex::new(source).expect("literal pattern must compile")
}
