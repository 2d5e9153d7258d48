//! Scoped loggers on top of `tracing`.
//!
//! A [`Logger`] carries a text prefix and its own verbosity. Units receive a
//! logger derived from the application logger: same verbosity, own prefix.

use crate::config::BaseConf;
use std::fmt::Display;
use std::sync::Arc;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
pub struct Logger {
    prefix: Arc<str>,
    level: LevelFilter,
}

impl Logger {
    pub fn new(prefix: impl Into<String>, level: LevelFilter) -> Self {
        Self {
            prefix: Arc::from(prefix.into()),
            level,
        }
    }

    /// A child logger with a new prefix and this logger's verbosity.
    pub fn derive(&self, prefix: impl Into<String>) -> Self {
        Self::new(prefix, self.level)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn set_level(&mut self, level: LevelFilter) {
        self.level = level;
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn debug(&self, message: impl Display) {
        if self.enabled(Level::DEBUG) {
            tracing::debug!("{}{}", self.prefix, message);
        }
    }

    pub fn info(&self, message: impl Display) {
        if self.enabled(Level::INFO) {
            tracing::info!("{}{}", self.prefix, message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        if self.enabled(Level::WARN) {
            tracing::warn!("{}{}", self.prefix, message);
        }
    }

    pub fn error(&self, message: impl Display) {
        if self.enabled(Level::ERROR) {
            tracing::error!("{}{}", self.prefix, message);
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("", LevelFilter::INFO)
    }
}

/// Verbosity selected by the base configuration.
pub fn level_for(base: &BaseConf) -> LevelFilter {
    match base.log_level.to_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ if base.debug => LevelFilter::DEBUG,
        _ => LevelFilter::INFO,
    }
}

/// Install the global subscriber and return the application logger.
///
/// `RUST_LOG` takes precedence over the configured level. Installing twice is
/// not an error; the first subscriber stays in place.
pub fn init(base: &BaseConf, prefix: &str) -> crate::Result<Logger> {
    let level = level_for(base);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(base.log_position)
        .with_line_number(base.log_position);

    let installed = match base.log_path() {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    Ok(Logger::new(prefix, level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_logger_keeps_level_and_changes_prefix() {
        let parent = Logger::new("", LevelFilter::WARN);
        let child = parent.derive("[Module Cache] ");
        assert_eq!(child.level(), LevelFilter::WARN);
        assert_eq!(child.prefix(), "[Module Cache] ");
        assert!(child.enabled(Level::ERROR));
        assert!(!child.enabled(Level::INFO));
    }

    #[test]
    fn level_prefers_explicit_log_level() {
        let mut base = BaseConf {
            debug: true,
            ..Default::default()
        };
        assert_eq!(level_for(&base), LevelFilter::DEBUG);
        base.log_level = "warn".into();
        assert_eq!(level_for(&base), LevelFilter::WARN);
        base.log_level.clear();
        base.debug = false;
        assert_eq!(level_for(&base), LevelFilter::INFO);
    }
}
