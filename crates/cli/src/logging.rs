//! Console and file logging for the CLI.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use oxide_core::config::{EngineConfig, StoreLayout};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_NAME: &str = "oxide.log";

/// Console level for a verbosity count: 0 = warn .. 3 = trace.
pub fn console_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber. Console output goes to stderr; when the
/// config names a log directory, lines at `logging_level` (or `RUST_LOG`)
/// also go to `oxide.log` there.
pub fn init_logging(config: &EngineConfig, layout: &StoreLayout, verbosity: u8) -> Result<()> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_level(verbosity.max(config.verbosity_level)));

    let file_layer = match config.logs_dir(layout) {
        Some(dir) if layout.meta_dir.exists() => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
            let path = dir.join(LOG_FILE_NAME);
            if config.logging_rotate {
                rotate_logs(&path, config.logging_max_log_size, config.logging_num_log_files)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging_level));
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)).with_filter(filter))
        }
        _ => None,
    };

    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::registry().with(console).with(file_layer).try_init();
    Ok(())
}

fn numbered(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift `oxide.log` to `oxide.log.1` (and older files up by one) once it
/// reaches `max_size` bytes, keeping at most `keep` rotated files.
pub fn rotate_logs(path: &Path, max_size: u64, keep: u32) -> Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(false),
    };
    if size < max_size {
        return Ok(false);
    }
    if keep == 0 {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        return Ok(true);
    }

    let oldest = numbered(path, keep);
    if oldest.exists() {
        fs::remove_file(&oldest).with_context(|| format!("Failed to remove {}", oldest.display()))?;
    }
    for n in (1..keep).rev() {
        let from = numbered(path, n);
        if from.exists() {
            let to = numbered(path, n + 1);
            fs::rename(&from, &to).with_context(|| format!("Failed to rotate {}", from.display()))?;
        }
    }
    fs::rename(path, numbered(path, 1))
        .with_context(|| format!("Failed to rotate {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rotation_shifts_and_caps_files() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join(LOG_FILE_NAME);

        fs::write(&log, "first").expect("write");
        assert!(rotate_logs(&log, 3, 2).expect("rotate"));
        fs::write(&log, "second").expect("write");
        assert!(rotate_logs(&log, 3, 2).expect("rotate"));
        fs::write(&log, "third").expect("write");
        assert!(rotate_logs(&log, 3, 2).expect("rotate"));

        assert!(!log.exists());
        assert_eq!(fs::read_to_string(numbered(&log, 1)).expect("read"), "third");
        assert_eq!(fs::read_to_string(numbered(&log, 2)).expect("read"), "second");
        assert!(!numbered(&log, 3).exists());
    }

    #[test]
    fn small_logs_are_left_alone() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join(LOG_FILE_NAME);
        fs::write(&log, "x").expect("write");
        assert!(!rotate_logs(&log, 1024, 5).expect("rotate"));
        assert!(log.exists());
        assert!(!rotate_logs(&dir.path().join("missing.log"), 1, 5).expect("rotate"));
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(console_level(0), LevelFilter::WARN);
        assert_eq!(console_level(2), LevelFilter::DEBUG);
        assert_eq!(console_level(9), LevelFilter::TRACE);
    }
}
