//! Tracing subscriber setup.
//!
//! Logs go to stderr and/or a daily-rotated file, never to stdout, which
//! carries the conversation itself.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const DEFAULT_LOG_FILTER: &str = "warn,parley=info";
const DEFAULT_LOG_FILE_PATH: &str = "logs/parley.log";
const FALLBACK_LOG_FILE_NAME: &str = "parley.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Both => "both",
        }
    }

    fn writes_file(&self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    format: LogFormat,
    output: LogOutput,
    file_path: PathBuf,
}

impl LogSettings {
    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            format: parse_log_format(get_var("LOG_FORMAT").as_deref()),
            output: parse_log_output(get_var("LOG_OUTPUT").as_deref()),
            file_path: parse_log_file_path(get_var("LOG_FILE_PATH").as_deref()),
        }
    }
}

/// Where formatted events end up, plus the guard that flushes the file
/// worker when dropped.
struct LogSink {
    writer: BoxMakeWriter,
    guard: Option<WorkerGuard>,
}

impl LogSink {
    fn stderr() -> Self {
        Self {
            writer: BoxMakeWriter::new(io::stderr),
            guard: None,
        }
    }

    fn open(settings: &LogSettings) -> Self {
        if !settings.output.writes_file() {
            return Self::stderr();
        }

        match open_rolling_file(&settings.file_path) {
            Ok((file, guard)) => {
                let writer = if settings.output == LogOutput::Both {
                    BoxMakeWriter::new(io::stderr.and(file))
                } else {
                    BoxMakeWriter::new(file)
                };
                Self {
                    writer,
                    guard: Some(guard),
                }
            }
            Err(err) => {
                let fallback = if settings.output == LogOutput::Both {
                    "using stderr only"
                } else {
                    "using stderr instead"
                };
                eprintln!(
                    "parley: failed to initialize LOG_OUTPUT={} at '{}': {err}; {fallback}",
                    settings.output.as_str(),
                    settings.file_path.display(),
                );
                Self::stderr()
            }
        }
    }
}

fn normalized(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_ascii_lowercase()
}

fn parse_log_format(raw: Option<&str>) -> LogFormat {
    match normalized(raw).as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

fn parse_log_output(raw: Option<&str>) -> LogOutput {
    match normalized(raw).as_str() {
        "file" => LogOutput::File,
        "both" => LogOutput::Both,
        _ => LogOutput::Stderr,
    }
}

fn parse_log_file_path(raw: Option<&str>) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH))
}

fn open_rolling_file(path: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(FALLBACK_LOG_FILE_NAME));

    fs::create_dir_all(dir)?;
    Ok(tracing_appender::non_blocking(
        tracing_appender::rolling::daily(dir, file_name),
    ))
}

/// Installs the global subscriber described by `LOG_FORMAT`, `LOG_OUTPUT`,
/// `LOG_FILE_PATH` and `RUST_LOG`.
///
/// The returned guard must stay alive until the process exits; dropping it
/// flushes buffered file output. `None` means nothing needs flushing.
#[must_use = "dropping the guard stops file logging"]
pub fn init() -> Option<WorkerGuard> {
    let settings = LogSettings::from_env_with(|key| env::var(key).ok());
    let LogSink { writer, guard } = LogSink::open(&settings);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let installed = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .try_init(),
    };
    // A subscriber was already installed; the new file worker has no events
    // coming its way.
    installed.ok().and(guard)
}
