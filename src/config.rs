//! Application paths and persisted loader settings.
//!
//! Config directory priority:
//! 1. CLI `--config-dir`
//! 2. `THUMBLOADER_CONFIG_DIR` environment variable
//! 3. Current folder, if it already holds thumbloader files
//! 4. Platform config directory from dirs-next
//!
//! Settings live in `thumbloader.json` inside that directory.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file name
pub const SETTINGS_FILE: &str = "thumbloader.json";
/// Default log file name (inside the data dir)
pub const LOG_FILE: &str = "thumbloader.log";

const ENV_CONFIG_DIR: &str = "THUMBLOADER_CONFIG_DIR";
const APP_DIR: &str = "thumbloader";

/// Overrides for default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI arg → ENV var → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(ENV_CONFIG_DIR).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file
///
/// Platform paths:
/// - Linux: ~/.config/thumbloader/{name}
/// - macOS: ~/Library/Application Support/thumbloader/{name}
/// - Windows: %APPDATA%\thumbloader\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Path to a data file (logs)
///
/// Platform paths:
/// - Linux: ~/.local/share/thumbloader/{name}
/// - macOS: ~/Library/Application Support/thumbloader/{name}
/// - Windows: %APPDATA%\thumbloader\{name}
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create config and data directories if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

/// Shared by config and data lookup; `platform` picks the dirs-next fallback
fn resolve_dir(config: &PathConfig, platform: fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config_files(&current_dir) {
            return current_dir;
        }
    }

    if let Some(dir) = platform() {
        return dir.join(APP_DIR);
    }

    PathBuf::from(".")
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir)
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir)
}

/// Loader settings (persisted as JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    // Transport
    pub workers_override: u32, // 0 = auto (cores * 2), N = override
    pub request_timeout_secs: u64,
    pub max_image_bytes: usize,
    pub user_agent: String,

    // Cache & Memory
    pub cache_memory_percent: f32,     // Percent of available memory for decoded thumbnails
    pub reserve_system_memory_gb: f32, // Reserve for system
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            workers_override: 0,
            request_timeout_secs: 15,
            max_image_bytes: 16 * 1024 * 1024,
            user_agent: concat!("thumbloader/", env!("CARGO_PKG_VERSION")).to_string(),
            cache_memory_percent: 25.0,
            reserve_system_memory_gb: 2.0,
        }
    }
}

impl LoaderSettings {
    /// Load from `thumbloader.json` in the config dir; defaults if absent.
    pub fn load(config: &PathConfig) -> Result<Self> {
        Self::load_from(&config_file(SETTINGS_FILE, config))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;

        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, config: &PathConfig) -> Result<()> {
        ensure_dirs(config)?;
        self.save_to(&config_file(SETTINGS_FILE, config))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Effective fetch worker count. Fetches are I/O bound, so auto is 2x cores.
    pub fn worker_count(&self) -> usize {
        match self.workers_override {
            0 => (num_cpus::get() * 2).max(2),
            n => n as usize,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Cache memory fraction (0.0-1.0), clamped to 5-95%
    pub fn mem_fraction(&self) -> f64 {
        (self.cache_memory_percent.clamp(5.0, 95.0) / 100.0) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = PathConfig::from_env_and_cli(Some(dir.path().to_path_buf()));
        assert_eq!(config_file("x.json", &config), dir.path().join("x.json"));
        assert_eq!(data_file(LOG_FILE, &config), dir.path().join(LOG_FILE));
    }

    #[test]
    fn test_settings_roundtrip_via_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = PathConfig {
            config_dir: Some(dir.path().join("nested")),
        };

        let settings = LoaderSettings {
            workers_override: 3,
            request_timeout_secs: 7,
            ..LoaderSettings::default()
        };
        settings.save(&config).unwrap();

        let loaded = LoaderSettings::load(&config).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.worker_count(), 3);
        assert_eq!(loaded.request_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn test_missing_settings_are_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoaderSettings::load_from(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(loaded, LoaderSettings::default());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"request_timeout_secs": 3}"#).unwrap();

        let loaded = LoaderSettings::load_from(&path).unwrap();
        assert_eq!(loaded.request_timeout_secs, 3);
        assert_eq!(loaded.workers_override, 0);
        assert!(loaded.worker_count() >= 2);
    }

    #[test]
    fn test_corrupt_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{oops").unwrap();
        assert!(LoaderSettings::load_from(&path).is_err());
    }

    #[test]
    fn test_mem_fraction_clamped() {
        let mut settings = LoaderSettings::default();
        settings.cache_memory_percent = 200.0;
        assert!((settings.mem_fraction() - 0.95).abs() < 1e-6);
        settings.cache_memory_percent = 0.0;
        assert!((settings.mem_fraction() - 0.05).abs() < 1e-6);
    }
}
