//! Bootstrap configuration for jukebot-player
//!
//! Everything comes from one TOML file with built-in defaults for every key.
//! Settings sources, highest priority first:
//!
//! 1. Command-line arguments (`--port`, `--scratch-dir`, `--config`)
//! 2. Environment variables (`JUKEBOT_PORT`, `JUKEBOT_SCRATCH_DIR`, `JUKEBOT_CONFIG`)
//! 3. TOML configuration file
//! 4. Built-in defaults

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    /// Scratch directory for downloads (optional; OS default otherwise)
    pub scratch_dir: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub resolver: ResolverConfig,
    pub session: SessionSettings,
    pub audio: AudioConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            scratch_dir: None,
            logging: LoggingConfig::default(),
            resolver: ResolverConfig::default(),
            session: SessionSettings::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Load from a TOML file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = jukebot_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resolver.playlist_limit == 0 {
            return Err(Error::Config(
                "resolver.playlist_limit must be at least 1".to_string(),
            ));
        }
        if self.resolver.program.trim().is_empty() {
            return Err(Error::Config("resolver.program must not be empty".to_string()));
        }
        if self.session.event_capacity == 0 {
            return Err(Error::Config(
                "session.event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// External media tool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Executable name or path
    pub program: String,
    /// Maximum number of playlist items expanded per reference
    pub playlist_limit: usize,
    pub audio_format: String,
    pub audio_quality: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            playlist_limit: 25,
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
        }
    }
}

/// Per-session timing and channel sizes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub inactivity_timeout_secs: u64,
    /// Bounded wait for workers during `stop()`
    pub shutdown_grace_ms: u64,
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 300,
            shutdown_grace_ms: 5000,
            event_capacity: 256,
        }
    }
}

impl SessionSettings {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Local speaker output settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name; host default when unset or "default"
    pub device: Option<String>,
}

fn default_port() -> u16 {
    5750
}
