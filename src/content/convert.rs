use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Markup languages an entry body can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Markup {
    Markdown,
    Rst,
    /// No conversion: the body stays HTML.
    Html,
}

impl Markup {
    /// Folds case and common aliases. Unrecognized names mean "no
    /// conversion requested" and map to [`Markup::Html`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "markdown" | "mkdown" | "md" | "mkd" => Markup::Markdown,
            "rst" | "rest" | "restructuredtext" => Markup::Rst,
            _ => Markup::Html,
        }
    }

    /// Tag written to the entry's `filter` list.
    pub fn as_str(self) -> &'static str {
        match self {
            Markup::Markdown => "markdown",
            Markup::Rst => "rst",
            Markup::Html => "html",
        }
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converted entry body together with the markup it is written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedContent {
    pub text: String,
    pub format: Markup,
}

/// Failure of a single backend. Never escapes [`Converter::convert`].
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The program is not installed or cannot be executed.
    #[error("{program} is not available: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The program ran and exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    /// The program wrote something that is not UTF-8.
    #[error("{program} produced invalid UTF-8 output")]
    InvalidUtf8 { program: String },
    /// Piping data to or from the program failed.
    #[error("I/O error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// An external HTML converter: HTML goes in on stdin, markup comes out on
/// stdout.
#[derive(Debug, Clone)]
pub struct Backend {
    program: String,
    args: Vec<String>,
    available: OnceLock<bool>,
}

impl Backend {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            available: OnceLock::new(),
        }
    }

    /// Builds a backend from a command line such as `["pandoc", "-t", "rst"]`.
    /// Returns `None` for an empty command.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the program can be found. Cached after the first check.
    pub fn available(&self) -> bool {
        *self
            .available
            .get_or_init(|| resolve_program(&self.program).is_some())
    }

    /// Pipes `input` through the program and returns its standard output.
    pub async fn run(&self, input: &str) -> Result<String, ConversionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ConversionError::Unavailable {
                        program: self.program.clone(),
                        source,
                    }
                }
                _ => self.io_error(source),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.io_error(std::io::ErrorKind::BrokenPipe.into()))?;
        let input = input.as_bytes().to_vec();

        // Feed stdin while collecting stdout; a large body would otherwise
        // fill both pipes and deadlock.
        let write = async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(|e| self.io_error(e))?;

        if !output.status.success() {
            return Err(ConversionError::Exit {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(|e| self.io_error(e))?;

        String::from_utf8(output.stdout).map_err(|_| ConversionError::InvalidUtf8 {
            program: self.program.clone(),
        })
    }

    fn io_error(&self, source: std::io::Error) -> ConversionError {
        ConversionError::Io {
            program: self.program.clone(),
            source,
        }
    }
}

/// Locates `program` the way a shell would: paths are checked directly,
/// bare names are searched on `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

/// Converts HTML to a target markup through an ordered backend chain.
///
/// The first backend that succeeds wins. Unavailable backends are skipped
/// quietly, failing ones with a warning. When the chain runs dry the HTML
/// is passed through unchanged and tagged `html`.
#[derive(Debug, Clone)]
pub struct Converter {
    markdown: Vec<Backend>,
    rst: Vec<Backend>,
}

impl Default for Converter {
    fn default() -> Self {
        Self {
            markdown: vec![
                Backend::new("pandoc", ["-f", "html", "-t", "markdown_strict"]),
                Backend::new("html2text", Vec::<String>::new()),
            ],
            rst: vec![
                Backend::new("pandoc", ["-f", "html", "-t", "rst"]),
                Backend::new("html2rest", Vec::<String>::new()),
            ],
        }
    }
}

impl Converter {
    pub fn new(markdown: Vec<Backend>, rst: Vec<Backend>) -> Self {
        Self { markdown, rst }
    }

    /// Backends tried for `target`, in order.
    pub fn chain(&self, target: Markup) -> &[Backend] {
        match target {
            Markup::Markdown => &self.markdown,
            Markup::Rst => &self.rst,
            Markup::Html => &[],
        }
    }

    /// Converts `html` to `target`. Never fails.
    pub async fn convert(&self, html: &str, target: Markup) -> ConvertedContent {
        if target == Markup::Html {
            return ConvertedContent {
                text: html.to_string(),
                format: Markup::Html,
            };
        }

        // Some backends block waiting for input when given nothing.
        if html.is_empty() {
            return ConvertedContent {
                text: String::new(),
                format: target,
            };
        }

        for backend in self.chain(target) {
            if !backend.available() {
                tracing::debug!(backend = %backend.program(), "Conversion backend not installed, skipping");
                continue;
            }

            match backend.run(html).await {
                Ok(text) => {
                    tracing::debug!(backend = %backend.program(), format = %target, "Converted content");
                    return ConvertedContent {
                        text,
                        format: target,
                    };
                }
                Err(e @ ConversionError::Unavailable { .. }) => {
                    tracing::debug!(error = %e, "Conversion backend unavailable, skipping");
                }
                Err(e) => {
                    tracing::warn!(backend = %backend.program(), error = %e, "Conversion failed, trying next backend");
                }
            }
        }

        tracing::warn!(format = %target, "No conversion backend succeeded, keeping HTML");
        ConvertedContent {
            text: html.to_string(),
            format: Markup::Html,
        }
    }
}
