use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const DEFAULT_FILTER: &str = "info,filing_ingest_worker=debug";
const DEFAULT_LOG_DIR: &str = "logs";
const FILE_PREFIX: &str = "ingest";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console output.
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logger options taken from `RUST_LOG`, `LOG_FORMAT` and `LOG_DIR`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogOptions {
    pub filter: String,
    pub format: LogFormat,
    /// Directory for the rolling file; `None` when `LOG_DIR` is set but empty.
    pub dir: Option<PathBuf>,
}

impl LogOptions {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let dir = match lookup("LOG_DIR") {
            Some(dir) if dir.trim().is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from(DEFAULT_LOG_DIR)),
        };

        Self {
            filter: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            format: LogFormat::parse(lookup("LOG_FORMAT").as_deref()),
            dir,
        }
    }
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    let layer = fmt::layer().with_writer(std::io::stdout).with_target(true);
    match format {
        LogFormat::Json => layer.json().with_thread_ids(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
    }
}

/// `<dir>/ingest.<date>.log`, rotated daily, never colored.
fn file_layer(format: LogFormat, dir: &Path) -> Result<BoxedLayer> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)?;

    let layer = fmt::layer().with_writer(appender).with_ansi(false);
    Ok(match format {
        LogFormat::Json => layer.json().with_thread_ids(true).boxed(),
        LogFormat::Pretty => layer.boxed(),
    })
}

pub fn init_logger() -> Result<()> {
    init_with(&LogOptions::from_env())
}

pub fn init_with(options: &LogOptions) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = vec![
        EnvFilter::try_new(&options.filter)?.boxed(),
        console_layer(options.format),
    ];
    if let Some(dir) = &options.dir {
        layers.push(file_layer(options.format, dir)?);
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn options(vars: &[(&str, &str)]) -> LogOptions {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogOptions::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_defaults_without_env() {
        let options = options(&[]);
        assert_eq!(options.filter, DEFAULT_FILTER);
        assert_eq!(options.format, LogFormat::Pretty);
        assert_eq!(options.dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn test_env_overrides() {
        let options = options(&[("RUST_LOG", "warn"), ("LOG_FORMAT", " JSON "), ("LOG_DIR", "")]);
        assert_eq!(options.filter, "warn");
        assert_eq!(options.format, LogFormat::Json);
        assert_eq!(options.dir, None);
    }

    #[test]
    fn test_file_layer_creates_appender() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_layer(LogFormat::Json, dir.path()).is_ok());
        assert!(file_layer(LogFormat::Pretty, dir.path()).is_ok());
    }
}
