#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use tracing::Level;

use crate::config::{self, Config};

pub const LOG_FILE_NAME: &str = "taskflow.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    File(PathBuf),
}

impl LogSink {
    /// An explicit `log.file` always wins. Otherwise the TUI logs next to the
    /// task data so output never lands on the alternate screen.
    pub fn resolve(cfg: &Config, data_dir: &Path, interactive: bool) -> anyhow::Result<Self> {
        let file = cfg.log.file.trim();
        if !file.is_empty() {
            return Ok(Self::File(config::expand_path(file)?));
        }
        if interactive {
            return Ok(Self::File(data_dir.join(LOG_FILE_NAME)));
        }
        Ok(Self::Stderr)
    }
}

/// Installs the global fmt subscriber. Calling it twice is harmless; the
/// first subscriber stays in place.
pub fn init(level: &str, sink: &LogSink) -> anyhow::Result<()> {
    let level: Level = level
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level '{level}'"))?;

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    let res = match sink {
        LogSink::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogSink::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    if let Err(e) = res {
        tracing::debug!(error = %e, "log subscriber already installed");
    }
    Ok(())
}
