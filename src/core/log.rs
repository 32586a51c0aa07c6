use anyhow::{Context, Result};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Targets, fmt,
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Target for wallet action events (buy/sell audit trail).
pub const ACTIONS_TARGET: &str = "valutatrade::actions";

/// Target for the rate refresh service.
pub const PARSER_TARGET: &str = "valutatrade::parser";

pub const ACTIONS_LOG: &str = "actions";
pub const PARSER_LOG: &str = "parser";

/// Rotated files kept per log.
const MAX_LOG_FILES: usize = 5;

pub type FileLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Sets up console logging and, when `logs_dir` is given, the persistent
/// action and parser logs. Keep the returned guards alive until exit so the
/// file writers are flushed.
pub fn init_logging(verbose: bool, logs_dir: Option<&Path>) -> Vec<WorkerGuard> {
    let (level_filter, level) = if verbose {
        (LevelFilter::DEBUG, "debug")
    } else {
        (LevelFilter::WARN, "warn")
    };
    // Actions only go to their file
    let app_filter = Targets::new()
        .with_target("valutatrade", level_filter)
        .with_target(ACTIONS_TARGET, LevelFilter::OFF)
        .with_default(LevelFilter::WARN);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (files, guards, file_error) = match logs_dir.map(file_layers) {
        Some(Ok((layers, guards))) => (layers, guards, None),
        Some(Err(e)) => (Vec::new(), Vec::new(), Some(e)),
        None => (Vec::new(), Vec::new(), None),
    };

    let console = fmt::layer()
        .pretty()
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(app_filter)
        .with_filter(env_filter);

    // A second init (tests, shell re-entry) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(files)
        .with(console)
        .try_init();

    if let Some(e) = file_error {
        warn!("File logging disabled: {:#}", e);
    }
    guards
}

/// Daily rotated `actions.*.log` and `parser.*.log` writers under `dir`.
pub fn file_layers(dir: &Path) -> Result<(Vec<FileLayer>, Vec<WorkerGuard>)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let mut layers = Vec::with_capacity(2);
    let mut guards = Vec::with_capacity(2);
    for (prefix, target) in [(ACTIONS_LOG, ACTIONS_TARGET), (PARSER_LOG, PARSER_TARGET)] {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(dir)
            .with_context(|| format!("Failed to open {} log in {}", prefix, dir.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer)
            .with_filter(Targets::new().with_target(target, LevelFilter::INFO));
        layers.push(Box::new(layer) as FileLayer);
        guards.push(guard);
    }
    Ok((layers, guards))
}

/// Contents of every rotated file of one log, oldest first.
pub fn read_log(dir: &Path, prefix: &str) -> Result<String> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&format!("{prefix}.")))
        })
        .collect();
    files.sort();

    let mut contents = String::new();
    for path in files {
        contents.push_str(
            &std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tracing::{debug, info};

    #[test]
    fn test_file_layers_split_by_target() {
        let dir = tempdir().unwrap();
        let (layers, guards) = file_layers(dir.path()).unwrap();
        let subscriber = tracing_subscriber::registry().with(layers);

        tracing::subscriber::with_default(subscriber, || {
            info!(target: ACTIONS_TARGET, action = "BUY", user = "alice", "bought");
            info!(target: PARSER_TARGET, "Update successful, 7 rates");
            debug!(target: PARSER_TARGET, "below the file level");
            info!(target: "valutatrade::wallet", "not persisted");
        });
        drop(guards);

        let actions = read_log(dir.path(), ACTIONS_LOG).unwrap();
        assert!(actions.contains("BUY") && actions.contains("bought"), "{actions}");
        assert!(!actions.contains("Update successful"));

        let parser = read_log(dir.path(), PARSER_LOG).unwrap();
        assert!(parser.contains("Update successful, 7 rates"));
        assert!(!parser.contains("below the file level"));
        assert!(!parser.contains("not persisted"));
    }
}
