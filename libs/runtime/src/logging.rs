use crate::config::{LogSection, LoggingConfig};
use anyhow::{Context, Result};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    io::{IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{level_filters::LevelFilter, Level, Metadata};
use tracing_subscriber::{
    filter::{FilterFn, Targets},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer, Registry,
};

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Unknown names fall back to INFO; "off" and "none" disable the sink.
fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

/// `target == name` or `target` starts with `name::`
fn matches_crate_prefix(target: &str, crate_name: &str) -> bool {
    target
        .strip_prefix(crate_name)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// Everything not claimed by an explicit section, up to `max_level`.
fn unclaimed_filter(
    claimed: Arc<Vec<String>>,
    max_level: Level,
) -> FilterFn<impl Fn(&Metadata<'_>) -> bool> {
    FilterFn::new(move |meta: &Metadata<'_>| {
        !claimed.iter().any(|c| matches_crate_prefix(meta.target(), c)) && *meta.level() <= max_level
    })
}

// -------- rotating file sink --------

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

impl<'a> fmt::MakeWriter<'a> for RotWriter {
    type Writer = RotWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Absolute paths are kept; relative ones are joined onto `base_dir`.
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn file_limit(section: &LogSection) -> FileLimit {
    match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(1)),
    }
}

fn create_rotating_writer(log_path: &Path, section: &LogSection) -> Result<RotWriter> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) * 1024 * 1024;
    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(file_limit(section)),
        ContentLimit::BytesSurpassed(usize::try_from(max_bytes).unwrap_or(usize::MAX)),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(RotWriter(Arc::new(Mutex::new(rot))))
}

/// Writers keyed by resolved path, so sections sharing a file share a sink.
#[derive(Default)]
struct FileSinks {
    by_path: HashMap<PathBuf, RotWriter>,
}

impl FileSinks {
    fn open(&mut self, name: &str, section: &LogSection, base_dir: &Path) -> Option<RotWriter> {
        if section.file.trim().is_empty() {
            return None;
        }
        let path = resolve_log_path(section.file.trim(), base_dir);
        if let Some(existing) = self.by_path.get(&path) {
            return Some(existing.clone());
        }
        match create_rotating_writer(&path, section) {
            Ok(writer) => {
                self.by_path.insert(path, writer.clone());
                Some(writer)
            }
            Err(e) => {
                // The subscriber is not installed yet, so this can only go to stderr.
                eprintln!("Failed to init log file for '{name}': {e:#}");
                None
            }
        }
    }
}

// -------- layer assembly --------

fn console_layer<F>(ansi: bool, filter: F) -> BoxedLayer
where
    F: tracing_subscriber::layer::Filter<Registry> + Send + Sync + 'static,
{
    fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(filter)
        .boxed()
}

fn file_layer<F>(writer: RotWriter, filter: F) -> BoxedLayer
where
    F: tracing_subscriber::layer::Filter<Registry> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer)
        .with_filter(filter)
        .boxed()
}

/// One console layer for the explicit sections, one catch-all console layer
/// for the "default" section, and one JSON file layer per configured file.
fn build_layers(cfg: &LoggingConfig, base_dir: &Path, ansi: bool) -> Vec<BoxedLayer> {
    let explicit: Vec<(&String, &LogSection)> = cfg
        .iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_SECTION)
        .collect();
    let claimed = Arc::new(explicit.iter().map(|(n, _)| (*n).clone()).collect::<Vec<_>>());

    let mut layers = Vec::new();
    let mut sinks = FileSinks::default();

    let mut console_targets = Targets::new().with_default(LevelFilter::OFF);
    for (name, section) in &explicit {
        if let Some(level) = parse_tracing_level(&section.console_level) {
            console_targets = console_targets.with_target(name.as_str(), level);
        }
        let Some(level) = parse_tracing_level(&section.file_level) else {
            continue;
        };
        if let Some(writer) = sinks.open(name, section, base_dir) {
            let targets = Targets::new()
                .with_default(LevelFilter::OFF)
                .with_target(name.as_str(), level);
            layers.push(file_layer(writer, targets));
        }
    }
    layers.push(console_layer(ansi, console_targets));

    if let Some(section) = cfg.get(DEFAULT_SECTION) {
        if let Some(level) = parse_tracing_level(&section.console_level) {
            layers.push(console_layer(ansi, unclaimed_filter(claimed.clone(), level)));
        }
        if let Some(level) = parse_tracing_level(&section.file_level) {
            if let Some(writer) = sinks.open(DEFAULT_SECTION, section, base_dir) {
                layers.push(file_layer(writer, unclaimed_filter(claimed, level)));
            }
        }
    }

    layers
}

// -------- public init --------

/// Install the global subscriber.
///
/// `base_dir` resolves relative log file paths (usually `AppConfig::home_dir`).
/// A second call is a no-op: the first installed subscriber stays.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` before installing the subscriber
    let _ = tracing_log::LogTracer::init();

    if cfg.is_empty() {
        init_default_logging();
        return;
    }

    let layers = build_layers(cfg, base_dir, std::io::stdout().is_terminal());
    let _ = Registry::default().with(layers).try_init();
}

/// Console-only INFO logging.
pub fn init_default_logging() {
    let _ = fmt()
        .with_target(true)
        .with_max_level(Level::INFO)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .try_init();
}
