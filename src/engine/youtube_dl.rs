//! youtube-dl engine profile
//!
//! Also fits forks that kept the youtube-dl command line and `[download]` output,
//! e.g. yt-dlp pointed to via [`EnginesConfig::youtube_dl_path`](crate::config::EnginesConfig).

use regex::Regex;
use serde::Deserialize;
use std::ffi::OsString;
use std::sync::LazyLock;

use super::command::Arg;
use super::parser::{LineClassifier, LineDelta, ParseScratch, literal_regex, percent_to_fraction};
use super::profile::{EngineProfile, json_document};
use crate::error::{Error, Result};
use crate::types::{EngineKind, MediaFormat, ProxyKind};

/// Filename template appended to the output directory
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Line prefixes announcing a post-processing step
const POST_PROCESSING_MARKERS: [&str; 2] = ["[ffmpeg]", "[Merger]"];

static PROGRESS: LazyLock<Regex> = LazyLock::new(|| literal_regex(r"(\d+(?:\.\d+)?)%"));
static SPEED: LazyLock<Regex> = LazyLock::new(|| literal_regex(r"\d+(?:\.\d+)?[A-Za-z]+/s"));
static SIZE: LazyLock<Regex> =
    LazyLock::new(|| literal_regex(r"(?:^|\s)(\d+(?:\.\d+)?[KMGTP]?i?B)(?:\s|$)"));
static TITLE: LazyLock<Regex> = LazyLock::new(|| literal_regex(r"[/\\][^/\\]+\.\w+"));

/// youtube-dl vocabulary
#[derive(Clone, Copy, Debug, Default)]
pub struct YoutubeDl;

impl LineClassifier for YoutubeDl {
    fn classify(&self, line: &str, scratch: &ParseScratch) -> LineDelta {
        let mut delta = LineDelta {
            post_processing: POST_PROCESSING_MARKERS
                .iter()
                .any(|marker| line.starts_with(marker)),
            ..Default::default()
        };

        // URLs look like paths; only local file names count as titles
        if scratch.title.is_empty()
            && !line.contains("://")
            && let Some(m) = TITLE.find(line)
        {
            delta.title = Some(m.as_str()[1..].to_string());
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

impl EngineProfile for YoutubeDl {
    fn kind(&self) -> EngineKind {
        EngineKind::YoutubeDl
    }

    fn binary_name(&self) -> &'static str {
        "youtube-dl"
    }

    fn render_arg(&self, arg: &Arg) -> Vec<OsString> {
        match arg {
            Arg::Proxy {
                kind: ProxyKind::Socks5,
                address,
                port,
            } => vec!["--proxy".into(), format!("socks5://{address}:{port}").into()],
            Arg::Proxy { address, port, .. } => {
                vec!["--proxy".into(), format!("{address}:{port}").into()]
            }
            Arg::Format(id) => vec!["-f".into(), id.into()],
            Arg::Output(dir) => vec!["-o".into(), dir.join(OUTPUT_TEMPLATE).into_os_string()],
            Arg::Cookies(path) => vec!["--cookies".into(), path.into()],
            Arg::PostProcessor(path) => vec!["--ffmpeg-location".into(), path.into()],
            Arg::Simulate => vec!["-j".into()],
            Arg::Url(url) => vec![url.into()],
        }
    }

    fn parse_metadata(&self, payload: &str) -> Result<Vec<MediaFormat>> {
        let document = json_document(payload);
        // `-j` prints one object per entry; the first entry describes the requested media
        let first = serde_json::Deserializer::from_str(document)
            .into_iter::<VideoInfo>()
            .next()
            .unwrap_or_else(|| serde_json::from_str(document));
        let info = first.map_err(|source| Error::StreamDecode {
            engine: EngineKind::YoutubeDl,
            source,
        })?;
        Ok(info.into_formats())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoInfo {
    title: Option<String>,
    fulltitle: Option<String>,
    description: Option<String>,
    formats: Vec<FormatInfo>,
    // single-format extractors describe the format at the top level
    #[serde(flatten)]
    top_level: FormatInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FormatInfo {
    format_id: Option<String>,
    format: Option<String>,
    format_note: Option<String>,
    ext: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
}

impl VideoInfo {
    fn into_formats(self) -> Vec<MediaFormat> {
        let title = self.title.or(self.fulltitle).unwrap_or_default();
        let description = self.description.unwrap_or_default();

        let formats = if self.formats.is_empty() && self.top_level.format_id.is_some() {
            vec![self.top_level]
        } else {
            self.formats
        };

        formats
            .into_iter()
            .map(|f| MediaFormat {
                title: title.clone(),
                description: description.clone(),
                format_id: f.format_id.unwrap_or_default(),
                format: f.format.unwrap_or_default(),
                format_note: f.format_note.unwrap_or_default(),
                ext: f.ext.unwrap_or_default(),
                filesize: f
                    .filesize
                    .or_else(|| {
                        f.filesize_approx
                            .filter(|s| s.is_finite() && *s >= 0.0)
                            .map(|s| s as u64)
                    })
                    .unwrap_or(0),
            })
            .collect()
    }
}
