//! annie engine profile
//!
//! annie prints a header block before transferring:
//!
//! ```text
//!  Site:      YouTube youtube.com
//!  Title:     Clip
//!  Type:      video
//!  Stream:
//!      [248]  -------------------
//!      Quality:         1080p video/webm; codecs="vp9"
//!      Size:            12.80 MiB (13421772 Bytes)
//! ```
//!
//! followed by a progress bar redrawn with carriage returns
//! (`12.80 MiB / 12.80 MiB [====] 100.00% 1.21 MiB/s 0s`).

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::LazyLock;
use tracing::debug;

use super::command::Arg;
use super::parser::{LineClassifier, LineDelta, ParseScratch, literal_regex, percent_to_fraction};
use super::profile::{EngineProfile, json_document};
use crate::error::{Error, Result};
use crate::types::{EngineKind, MediaFormat, ProxyKind};

const POST_PROCESSING_MARKER: &str = "Merging video parts";

static TITLE: LazyLock<Regex> = LazyLock::new(|| literal_regex(r"^Title:\s+(.+)$"));
static SIZE: LazyLock<Regex> =
    LazyLock::new(|| literal_regex(r"^Size:\s+(\d+(?:\.\d+)?\s?[KMGTP]?i?B)\b"));
static PROGRESS: LazyLock<Regex> = LazyLock::new(|| literal_regex(r"(\d+(?:\.\d+)?)%"));
static SPEED: LazyLock<Regex> =
    LazyLock::new(|| literal_regex(r"\d+(?:\.\d+)?\s?[KMGTP]?i?B/s"));

/// annie vocabulary
#[derive(Clone, Copy, Debug, Default)]
pub struct Annie;

impl LineClassifier for Annie {
    fn classify(&self, line: &str, scratch: &ParseScratch) -> LineDelta {
        let mut delta = LineDelta {
            post_processing: line.starts_with(POST_PROCESSING_MARKER),
            ..Default::default()
        };

        if scratch.title.is_empty()
            && let Some(caps) = TITLE.captures(line)
        {
            delta.title = Some(caps[1].trim().to_string());
        }
        if scratch.size.is_empty()
            && let Some(caps) = SIZE.captures(line)
        {
            delta.size = Some(caps[1].to_string());
        }

        delta.progress = PROGRESS
            .captures(line)
            .and_then(|caps| percent_to_fraction(&caps[1]));
        delta.speed = SPEED.find(line).map(|m| m.as_str().to_string());

        delta
    }
}

impl EngineProfile for Annie {
    fn kind(&self) -> EngineKind {
        EngineKind::Annie
    }

    fn binary_name(&self) -> &'static str {
        "annie"
    }

    fn render_arg(&self, arg: &Arg) -> Vec<OsString> {
        match arg {
            Arg::Proxy {
                kind: ProxyKind::Socks5,
                address,
                port,
            } => vec!["-s".into(), format!("{address}:{port}").into()],
            Arg::Proxy { address, port, .. } => {
                vec!["-x".into(), format!("{address}:{port}").into()]
            }
            Arg::Format(id) => vec!["-f".into(), id.into()],
            Arg::Output(dir) => vec!["-o".into(), dir.into()],
            Arg::Cookies(path) => vec!["-c".into(), path.into()],
            Arg::PostProcessor(path) => {
                debug!(path = ?path, "annie locates ffmpeg on PATH, ignoring post-processor path");
                Vec::new()
            }
            Arg::Simulate => vec!["-j".into()],
            Arg::Url(url) => vec![url.into()],
        }
    }

    fn parse_metadata(&self, payload: &str) -> Result<Vec<MediaFormat>> {
        let decode = |source| Error::StreamDecode {
            engine: EngineKind::Annie,
            source,
        };
        let document = json_document(payload);
        let payload = serde_json::Deserializer::from_str(document)
            .into_iter::<AnniePayload>()
            .next()
            .unwrap_or_else(|| serde_json::from_str(document))
            .map_err(decode)?;
        let info = match payload {
            AnniePayload::One(info) => info,
            AnniePayload::Many(list) => list.into_iter().next().unwrap_or_default(),
        };
        Ok(info.into_formats())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnniePayload {
    Many(Vec<AnnieInfo>),
    One(AnnieInfo),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnnieInfo {
    title: String,
    site: String,
    streams: BTreeMap<String, AnnieStream>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnnieStream {
    quality: String,
    size: u64,
    ext: Option<String>,
    parts: Vec<AnniePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnniePart {
    ext: String,
}

impl AnnieInfo {
    fn into_formats(self) -> Vec<MediaFormat> {
        let Self {
            title,
            site,
            streams,
        } = self;
        streams
            .into_iter()
            .map(|(id, stream)| {
                let ext = stream
                    .ext
                    .filter(|e| !e.is_empty())
                    .or_else(|| stream.parts.into_iter().next().map(|p| p.ext))
                    .unwrap_or_default();
                MediaFormat {
                    title: title.clone(),
                    description: site.clone(),
                    format: format!("{id} - {}", stream.quality),
                    format_id: id,
                    format_note: stream.quality,
                    ext,
                    filesize: stream.size,
                }
            })
            .collect()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::OutputParser;
    use crate::types::Status;
    use std::path::PathBuf;

    fn render(arg: Arg) -> Vec<String> {
        Annie
            .render_arg(&arg)
            .into_iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn proxy_flag_depends_on_kind() {
        let http = render(Arg::Proxy {
            kind: ProxyKind::Http,
            address: "10.0.0.1".into(),
            port: "3128".into(),
        });
        assert_eq!(http, vec!["-x", "10.0.0.1:3128"]);

        let socks = render(Arg::Proxy {
            kind: ProxyKind::Socks5,
            address: "127.0.0.1".into(),
            port: "1080".into(),
        });
        assert_eq!(socks, vec!["-s", "127.0.0.1:1080"]);
    }

    #[test]
    fn output_is_a_plain_directory() {
        assert_eq!(render(Arg::Output(PathBuf::from("/dl"))), vec!["-o", "/dl"]);
        assert_eq!(render(Arg::Cookies(PathBuf::from("/c.txt"))), vec!["-c", "/c.txt"]);
        assert_eq!(render(Arg::Simulate), vec!["-j"]);
    }

    #[test]
    fn post_processor_is_dropped() {
        assert!(render(Arg::PostProcessor(PathBuf::from("/usr/bin/ffmpeg"))).is_empty());
    }

    #[test]
    fn header_and_progress_lines() {
        let mut parser = OutputParser::new(&Annie);

        let title = parser.feed(" Title:     My Clip ");
        assert_eq!(title.title.as_deref(), Some("My Clip"));
        assert_eq!(title.status, None);

        let size = parser.feed("     Size:            12.80 MiB (13421772 Bytes)");
        assert_eq!(size.size.as_deref(), Some("12.80 MiB"));

        let progress = parser.feed("6.40 MiB / 12.80 MiB [=====>------] 50.00% 1.21 MiB/s 5s");
        assert_eq!(progress.progress, Some(0.5));
        assert_eq!(progress.status, Some(Status::Downloading));
        assert_eq!(parser.scratch().speed, "1.21 MiB/s");
        // the progress bar repeats sizes but the header value sticks
        assert_eq!(parser.scratch().size, "12.80 MiB");
    }

    #[test]
    fn merging_after_full_progress() {
        let mut parser = OutputParser::new(&Annie);
        assert_eq!(
            parser.feed("12.80 MiB / 12.80 MiB [==========] 100.00% 1.21 MiB/s 0s").status,
            Some(Status::Completed)
        );
        assert_eq!(
            parser.feed("Merging video parts into My Clip.mp4").status,
            Some(Status::Merging)
        );
    }

    #[test]
    fn metadata_object_maps_streams() {
        let payload = r#"{
            "url": "https://www.youtube.com/watch?v=x",
            "site": "YouTube youtube.com",
            "title": "Clip",
            "type": "video",
            "streams": {
                "248": {"quality": "1080p video/webm", "size": 13421772, "parts": [{"url": "u", "size": 1, "ext": "webm"}]},
                "18": {"quality": "360p video/mp4", "size": 1048576, "ext": "mp4"}
            }
        }"#;

        let formats = Annie.parse_metadata(payload).unwrap();
        assert_eq!(formats.len(), 2);

        let hd = formats.iter().find(|f| f.format_id == "248").unwrap();
        assert_eq!(hd.title, "Clip");
        assert_eq!(hd.format_note, "1080p video/webm");
        assert_eq!(hd.ext, "webm");
        assert_eq!(hd.filesize, 13_421_772);

        let sd = formats.iter().find(|f| f.format_id == "18").unwrap();
        assert_eq!(sd.ext, "mp4");
    }

    #[test]
    fn metadata_after_bracketed_warning() {
        let payload = "[warn] cookie file ignored\n\
                       {\"title\": \"Clip\", \"streams\": {\"hd\": {\"quality\": \"1080p\", \"size\": 2048, \"ext\": \"mp4\"}}}";
        let formats = Annie.parse_metadata(payload).unwrap();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].title, "Clip");
        assert_eq!(formats[0].format_id, "hd");
    }

    #[test]
    fn metadata_array_uses_first_element() {
        let payload = r#"[
            {"title": "first", "streams": {"default": {"quality": "720p", "size": 10}}},
            {"title": "second", "streams": {}}
        ]"#;
        let formats = Annie.parse_metadata(payload).unwrap();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].title, "first");
        assert_eq!(formats[0].format_id, "default");
    }

    #[test]
    fn malformed_metadata_is_a_decode_error() {
        let err = Annie.parse_metadata("not json at all").unwrap_err();
        assert!(matches!(
            err,
            Error::StreamDecode {
                engine: EngineKind::Annie,
                ..
            }
        ));
    }
}
