//! Tracing setup: console layer (pretty or JSON) plus an optional rolling file.

use std::path::Path;

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::cli::FILE_GUARD;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. `RUST_LOG` wins over `--log-level`, which
/// wins over `[logging] level`.
pub fn init(json: bool, cli_level: &str, cfg: Option<&flowenc_config::Logging>) {
    let default_level = cfg
        .and_then(|l| l.level.as_deref())
        .filter(|_| cli_level == "info")
        .unwrap_or(cli_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<BoxedLayer> = vec![console_layer(json)];
    if let Some(file) = cfg.and_then(|l| l.file.as_deref()) {
        let rotation = cfg.and_then(|l| l.rotation.as_deref()).unwrap_or("never");
        layers.push(file_layer(Path::new(file), rotation));
    }

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}

fn console_layer(json: bool) -> BoxedLayer {
    if json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
    }
}

fn file_layer(path: &Path, rotation: &str) -> BoxedLayer {
    let rotation = match rotation {
        "daily" => tracing_appender::rolling::Rotation::DAILY,
        "hourly" => tracing_appender::rolling::Rotation::HOURLY,
        _ => tracing_appender::rolling::Rotation::NEVER,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map_or_else(|| "flowenc.log".into(), |n| n.to_string_lossy().into_owned());
    let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Box::new(
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true),
    )
}
