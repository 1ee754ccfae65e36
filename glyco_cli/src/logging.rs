//! Tracing subscriber setup: a console layer on stderr and an optional
//! rolling JSON file layer.

use std::path::Path;

use eyre::{Result, WrapErr};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::cli::FILE_GUARD;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(f) => Ok(f),
        Err(_) => {
            EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level '{level}'"))
        }
    }
}

fn appender(file: &str, rotation: Option<&str>) -> Result<RollingFileAppender> {
    let path = Path::new(file);
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map_or_else(|| "glyco.log".to_string(), |n| n.to_string_lossy().into_owned());
    let rotation = match rotation.unwrap_or("never") {
        "daily" => Rotation::DAILY,
        "hourly" => Rotation::HOURLY,
        _ => Rotation::NEVER,
    };
    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(name)
        .build(dir)
        .wrap_err_with(|| format!("open log file {file:?}"))
}

/// Install the global subscriber. Console logs go to stderr so stdout stays
/// machine-readable.
pub fn init_tracing(level: &str, json: bool, logging: &glyco_config::Logging) -> Result<()> {
    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter(level)?)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(console_filter(level)?)
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(file) = logging.file.as_deref() {
        let file_level = logging.level.as_deref().unwrap_or("info");
        let file_filter = EnvFilter::try_new(file_level)
            .wrap_err_with(|| format!("invalid logging.level '{file_level}'"))?;
        let (writer, guard) =
            tracing_appender::non_blocking(appender(file, logging.rotation.as_deref())?);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
