//! Command builder: task options → engine argument vector
//!
//! [`CommandBuilder`] is an immutable value built with consuming `with_*` setters.
//! It records *what* was asked for, in insertion order; the engine's
//! [`EngineProfile`] decides *how* each option is spelled on the command line.

use std::ffi::{OsStr, OsString};
use std::mem;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::profile::EngineProfile;
use crate::types::{ProxyKind, TaskConfig};

/// One engine option
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    /// Route traffic through a proxy
    Proxy {
        /// HTTP or SOCKS5 (never [`ProxyKind::None`])
        kind: ProxyKind,
        /// Host name or IP address
        address: String,
        /// Port number
        port: String,
    },
    /// Format selector
    Format(String),
    /// Destination directory; the profile appends its filename template
    Output(PathBuf),
    /// Cookie file
    Cookies(PathBuf),
    /// Post-processor binary
    PostProcessor(PathBuf),
    /// Print metadata JSON instead of downloading
    Simulate,
    /// Target URL
    Url(String),
}

/// Ordered, overwrite-on-reapply collection of [`Arg`]s
///
/// Re-applying a setter replaces the earlier value in place, so the option keeps the
/// position of its first insertion.
///
/// ```
/// use vdm_engine::engine::CommandBuilder;
///
/// let builder = CommandBuilder::new()
///     .with_format("137")
///     .with_output("/tmp/x")
///     .with_url("http://e/v");
/// assert_eq!(builder.args().len(), 3);
/// ```
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandBuilder {
    args: Vec<Arg>,
}

impl CommandBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a transfer-mode run of `task`
    pub fn for_download(task: &TaskConfig) -> Self {
        let builder = Self::new()
            .with_proxy(task.proxy.kind, &task.proxy.address, &task.proxy.port)
            .with_format(task.format_id.as_deref().unwrap_or_default())
            .with_output(&task.output_dir);
        let builder = match &task.cookies {
            Some(cookies) => builder.with_cookies(cookies),
            None => builder,
        };
        let builder = match &task.ffmpeg_path {
            Some(ffmpeg) => builder.with_post_processor_path(ffmpeg),
            None => builder,
        };
        builder.with_url(&task.url)
    }

    /// Builder for a metadata-mode run of `task`
    pub fn for_metadata(task: &TaskConfig) -> Self {
        let builder = Self::new()
            .with_simulate()
            .with_proxy(task.proxy.kind, &task.proxy.address, &task.proxy.port);
        let builder = match &task.cookies {
            Some(cookies) => builder.with_cookies(cookies),
            None => builder,
        };
        builder.with_url(&task.url)
    }

    /// Route traffic through a proxy
    ///
    /// No-op if `address` or `port` is empty, or if `kind` is [`ProxyKind::None`].
    pub fn with_proxy(self, kind: ProxyKind, address: &str, port: &str) -> Self {
        if address.is_empty() || port.is_empty() {
            return self;
        }
        match kind {
            ProxyKind::Http | ProxyKind::Socks5 => self.set(Arg::Proxy {
                kind,
                address: address.to_string(),
                port: port.to_string(),
            }),
            ProxyKind::None => {
                debug!("no proxy");
                self
            }
        }
    }

    /// Select a format; no-op if `format_id` is empty
    pub fn with_format(self, format_id: &str) -> Self {
        if format_id.is_empty() {
            return self;
        }
        self.set(Arg::Format(format_id.to_string()))
    }

    /// Write into `dir`
    pub fn with_output(self, dir: impl AsRef<Path>) -> Self {
        self.set(Arg::Output(dir.as_ref().to_path_buf()))
    }

    /// Use a cookie file; no-op if the path is empty
    pub fn with_cookies(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return self;
        }
        self.set(Arg::Cookies(path.to_path_buf()))
    }

    /// Point the engine at a post-processor binary; no-op if the path is empty
    pub fn with_post_processor_path(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return self;
        }
        self.set(Arg::PostProcessor(path.to_path_buf()))
    }

    /// Target URL (not validated; a malformed URL is the engine's concern)
    pub fn with_url(self, url: &str) -> Self {
        self.set(Arg::Url(url.to_string()))
    }

    /// Ask for metadata JSON instead of a transfer
    pub fn with_simulate(self) -> Self {
        self.set(Arg::Simulate)
    }

    /// Options in insertion order
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Whether metadata mode was requested
    pub fn is_simulate(&self) -> bool {
        self.args.contains(&Arg::Simulate)
    }

    /// Target URL, if set
    pub fn url(&self) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            Arg::Url(url) => Some(url.as_str()),
            _ => None,
        })
    }

    /// Render the argument vector for `program` using `profile`'s vocabulary
    ///
    /// The program comes first, then every option in insertion order, then the URL.
    pub fn build(&self, program: &Path, profile: &dyn EngineProfile) -> CommandLine {
        let mut args = Vec::new();
        for arg in self.args.iter().filter(|arg| !matches!(arg, Arg::Url(_))) {
            args.extend(profile.render_arg(arg));
        }
        if let Some(url) = self.url() {
            args.extend(profile.render_arg(&Arg::Url(url.to_string())));
        }
        CommandLine {
            program: program.to_path_buf(),
            args,
        }
    }

    fn set(mut self, arg: Arg) -> Self {
        let slot = mem::discriminant(&arg);
        match self.args.iter_mut().find(|a| mem::discriminant(&**a) == slot) {
            Some(existing) => *existing = arg,
            None => self.args.push(arg),
        }
        self
    }
}

/// Fully rendered process invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandLine {
    /// Build a command line directly
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Executable
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments after the executable
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Full argument vector, program first
    pub fn argv(&self) -> impl Iterator<Item = &OsStr> {
        std::iter::once(self.program.as_os_str()).chain(self.args.iter().map(OsString::as_os_str))
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for part in self.argv() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}", part.to_string_lossy())?;
        }
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::youtube_dl::YoutubeDl;
    use crate::types::{EngineKind, ProxySettings};

    fn argv(command: &CommandLine) -> Vec<String> {
        command
            .argv()
            .map(|part| part.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn format_output_url_command() {
        let command = CommandBuilder::new()
            .with_format("137")
            .with_output("/tmp/x")
            .with_url("http://e/v")
            .build(Path::new("/engines/youtube-dl"), &YoutubeDl);

        let argv = argv(&command);
        let expected_output = Path::new("/tmp/x")
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();

        assert_eq!(argv[0], "/engines/youtube-dl");
        let f = argv.iter().position(|a| a == "-f").expect("-f missing");
        assert_eq!(argv[f + 1], "137");
        let o = argv.iter().position(|a| a == "-o").expect("-o missing");
        assert_eq!(argv[o + 1], expected_output);
        assert_eq!(argv.last().map(String::as_str), Some("http://e/v"));
    }

    #[test]
    fn unsupported_proxy_kind_leaves_args_unchanged() {
        let before = CommandBuilder::new().with_format("22");
        let after = before.clone().with_proxy(ProxyKind::None, "127.0.0.1", "1080");
        assert_eq!(before, after);
    }

    #[test]
    fn proxy_with_empty_address_or_port_is_ignored() {
        let builder = CommandBuilder::new()
            .with_proxy(ProxyKind::Socks5, "", "1080")
            .with_proxy(ProxyKind::Http, "127.0.0.1", "");
        assert!(builder.args().is_empty());
    }

    #[test]
    fn empty_optional_values_are_ignored() {
        let builder = CommandBuilder::new()
            .with_format("")
            .with_cookies("")
            .with_post_processor_path("");
        assert!(builder.args().is_empty());
    }

    #[test]
    fn reapplying_a_setter_overwrites_in_place() {
        let builder = CommandBuilder::new()
            .with_format("18")
            .with_output("/a")
            .with_format("22");

        assert_eq!(
            builder.args(),
            &[Arg::Format("22".into()), Arg::Output(PathBuf::from("/a"))]
        );
    }

    #[test]
    fn url_is_rendered_last_even_if_set_first() {
        let command = CommandBuilder::new()
            .with_url("http://e/v")
            .with_simulate()
            .with_proxy(ProxyKind::Http, "10.0.0.1", "3128")
            .build(Path::new("youtube-dl"), &YoutubeDl);

        assert_eq!(
            argv(&command),
            vec!["youtube-dl", "-j", "--proxy", "10.0.0.1:3128", "http://e/v"]
        );
    }

    #[test]
    fn download_builder_from_task_config() {
        let task = TaskConfig {
            format_id: Some("137+140".into()),
            proxy: ProxySettings::new(ProxyKind::Socks5, "127.0.0.1", "1080"),
            cookies: Some(PathBuf::from("/home/u/cookies.txt")),
            ffmpeg_path: Some(PathBuf::from("/usr/bin/ffmpeg")),
            ..TaskConfig::new(EngineKind::YoutubeDl, "http://e/v", "/downloads")
        };

        let builder = CommandBuilder::for_download(&task);
        assert!(!builder.is_simulate());
        assert_eq!(builder.url(), Some("http://e/v"));
        assert_eq!(
            builder.args(),
            &[
                Arg::Proxy {
                    kind: ProxyKind::Socks5,
                    address: "127.0.0.1".into(),
                    port: "1080".into()
                },
                Arg::Format("137+140".into()),
                Arg::Output(PathBuf::from("/downloads")),
                Arg::Cookies(PathBuf::from("/home/u/cookies.txt")),
                Arg::PostProcessor(PathBuf::from("/usr/bin/ffmpeg")),
                Arg::Url("http://e/v".into()),
            ]
        );
    }

    #[test]
    fn metadata_builder_requests_simulation() {
        let task = TaskConfig::new(EngineKind::YoutubeDl, "http://e/v", "/downloads");
        let builder = CommandBuilder::for_metadata(&task);

        assert!(builder.is_simulate());
        assert_eq!(
            builder.args(),
            &[Arg::Simulate, Arg::Url("http://e/v".into())]
        );
    }

    #[test]
    fn display_joins_argv_with_spaces() {
        let command = CommandLine::new("youtube-dl", vec!["-j".into(), "http://e/v".into()]);
        assert_eq!(command.to_string(), "youtube-dl -j http://e/v");
    }
}
