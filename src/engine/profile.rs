//! Per-engine vocabulary

use serde_json::Value;
use std::ffi::OsString;

use super::command::Arg;
use super::parser::LineClassifier;
use crate::error::Result;
use crate::types::{EngineKind, MediaFormat};

/// Everything that differs between two external download tools
///
/// The process supervisor and the command builder are shared; an engine only
/// contributes its executable name, how each [`Arg`] is spelled, how its output lines
/// are classified (via the [`LineClassifier`] supertrait) and its metadata schema.
pub trait EngineProfile: LineClassifier {
    /// Which engine this is
    fn kind(&self) -> EngineKind;

    /// Executable file name without platform suffix (e.g. "youtube-dl")
    fn binary_name(&self) -> &'static str;

    /// Command-line tokens for one option
    ///
    /// Returning an empty vector drops the option (the engine has no equivalent).
    fn render_arg(&self, arg: &Arg) -> Vec<OsString>;

    /// Decode the metadata-mode payload into the list of available formats
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamDecode`](crate::Error::StreamDecode) if the payload does
    /// not match the engine's schema.
    fn parse_metadata(&self, payload: &str) -> Result<Vec<MediaFormat>>;
}

/// Slice of `payload` that holds the JSON document
///
/// Engine stderr is merged into stdout, so warnings may surround the document, and
/// warnings carry brackets of their own (`WARNING: [youtube] ...`). The document
/// starts at the first `{` or `[` that opens an object, or an array of objects, and
/// runs to the last `}` or `]`.
pub(crate) fn json_document(payload: &str) -> &str {
    let start = payload
        .match_indices(['{', '['])
        .map(|(index, _)| index)
        .find(|&index| opens_document(&payload[index..]));
    let end = payload.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &payload[start..=end],
        _ => payload.trim(),
    }
}

fn opens_document(text: &str) -> bool {
    match serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
    {
        Some(Ok(Value::Object(_))) => true,
        Some(Ok(Value::Array(items))) => items.first().is_none_or(Value::is_object),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_document_strips_surrounding_warnings() {
        let payload = "WARNING: unable to extract uploader\n{\"title\": \"x\"}\n";
        assert_eq!(json_document(payload), "{\"title\": \"x\"}");
    }

    #[test]
    fn json_document_skips_bracketed_warning_tags() {
        let payload = "WARNING: [youtube] abc: unable to extract uploader\n[warn] cookie file ignored\n{\"title\": \"x\", \"formats\": [{\"format_id\": \"18\"}]}\n";
        assert_eq!(
            json_document(payload),
            "{\"title\": \"x\", \"formats\": [{\"format_id\": \"18\"}]}"
        );
    }

    #[test]
    fn json_document_skips_bracketed_numbers() {
        let payload = "[0] retrying fragment\n[{\"title\": \"x\"}]";
        assert_eq!(json_document(payload), "[{\"title\": \"x\"}]");
    }

    #[test]
    fn json_document_accepts_arrays() {
        assert_eq!(json_document("  [{\"a\": 1}]  "), "[{\"a\": 1}]");
    }

    #[test]
    fn json_document_without_brackets_returns_trimmed_payload() {
        assert_eq!(json_document("  ERROR: Unsupported URL \n"), "ERROR: Unsupported URL");
    }
}
