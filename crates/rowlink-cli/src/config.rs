//! Reads `~/.rowlink/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rowlink_csafe::SessionConfig;
use rowlink_runtime::{LogFormat, ManagerConfig};

/// Persisted configuration stored in `~/.rowlink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum gap between two frames sent to the same erg.
    #[serde(default = "default_frame_gap_ms")]
    pub frame_gap_ms: u64,

    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Number of simulated ergs on the bus.
    #[serde(default = "default_sim_devices")]
    pub sim_devices: u8,

    /// `host:port` to stream JSON lines to.  Stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_addr: Option<String>,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_true")]
    pub forceplot: bool,

    #[serde(default = "default_true")]
    pub pretty: bool,

    /// Device identity → display name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
}

fn default_discovery_interval_ms() -> u64 {
    2000
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_frame_gap_ms() -> u64 {
    50
}
fn default_io_timeout_ms() -> u64 {
    2000
}
fn default_sim_devices() -> u8 {
    2
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_interval_ms: default_discovery_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            frame_gap_ms: default_frame_gap_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            sim_devices: default_sim_devices(),
            relay_addr: None,
            log_format: LogFormat::default(),
            forceplot: true,
            pretty: true,
            aliases: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            discovery_interval: Duration::from_millis(self.discovery_interval_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            session: SessionConfig {
                min_frame_gap: Duration::from_millis(self.frame_gap_ms),
                io_timeout: Duration::from_millis(self.io_timeout_ms),
            },
            forceplot: self.forceplot,
            pretty: self.pretty,
        }
    }
}

/// Return the path to `~/.rowlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rowlink").join("config.toml")
}

/// Load the config with environment overrides applied.  A missing file
/// yields the defaults.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROWLINK_*` environment variable overrides to `cfg`.  Values that
/// do not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROWLINK_DISCOVERY_INTERVAL_MS` | `discovery_interval_ms` |
/// | `ROWLINK_POLL_INTERVAL_MS` | `poll_interval_ms` |
/// | `ROWLINK_SIM_DEVICES` | `sim_devices` |
/// | `ROWLINK_RELAY_ADDR` | `relay_addr` |
/// | `ROWLINK_LOG_FORMAT` | `log_format` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROWLINK_DISCOVERY_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.discovery_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("ROWLINK_POLL_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.poll_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("ROWLINK_SIM_DEVICES")
        && let Ok(n) = v.parse::<u8>()
    {
        cfg.sim_devices = n;
    }
    if let Ok(v) = std::env::var("ROWLINK_RELAY_ADDR") {
        cfg.relay_addr = Some(v).filter(|addr| !addr.trim().is_empty());
    }
    if let Ok(v) = std::env::var("ROWLINK_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.log_format = format;
    }
}

/// Write the defaults to `~/.rowlink/config.toml` when no file exists yet.
/// Returns whether a file was written.
pub fn write_defaults_if_missing() -> Result<bool, String> {
    let path = config_path();
    if path.exists() {
        return Ok(false);
    }
    save_to(&Config::default(), &path)?;
    Ok(true)
}

/// Save the config to a specific path, creating the parent directory.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each env test owns distinct variables so they can run in parallel.

    #[test]
    fn roundtrip_config_with_aliases() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.relay_addr = Some("127.0.0.1:7000".to_string());
        cfg.aliases
            .insert("serial:430000001".to_string(), "bow".to_string());
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "sim_devices = 4\nlog_format = \"json\"\n").unwrap();

        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.sim_devices, 4);
        assert_eq!(loaded.log_format, LogFormat::Json);
        assert_eq!(loaded.poll_interval_ms, 500);
        assert!(loaded.pretty);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "sim_devices = \"many\"").unwrap();
        assert!(load_from(&path).unwrap_err().contains("parse"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_rowlink_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.rowlink/config.toml"));
    }

    #[test]
    fn manager_config_uses_millisecond_fields() {
        let cfg = Config {
            poll_interval_ms: 250,
            frame_gap_ms: 80,
            pretty: false,
            ..Config::default()
        };
        let manager = cfg.manager_config();
        assert_eq!(manager.poll_interval, Duration::from_millis(250));
        assert_eq!(manager.discovery_interval, Duration::from_secs(2));
        assert_eq!(manager.session.min_frame_gap, Duration::from_millis(80));
        assert!(!manager.pretty);
        assert_eq!(Config::default().manager_config(), ManagerConfig::default());
    }

    #[test]
    fn apply_env_overrides_changes_intervals() {
        // SAFETY: these variables are only touched by this test.
        unsafe {
            std::env::set_var("ROWLINK_DISCOVERY_INTERVAL_MS", "1000");
            std::env::set_var("ROWLINK_POLL_INTERVAL_MS", "0");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.discovery_interval_ms, 1000);
        assert_eq!(cfg.poll_interval_ms, 500);
        unsafe {
            std::env::remove_var("ROWLINK_DISCOVERY_INTERVAL_MS");
            std::env::remove_var("ROWLINK_POLL_INTERVAL_MS");
        }
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_device_count() {
        // SAFETY: this variable is only touched by this test.
        unsafe { std::env::set_var("ROWLINK_SIM_DEVICES", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.sim_devices, 2);
        unsafe { std::env::remove_var("ROWLINK_SIM_DEVICES") };
    }

    #[test]
    fn apply_env_overrides_sets_relay_and_log_format() {
        // SAFETY: these variables are only touched by this test.
        unsafe {
            std::env::set_var("ROWLINK_RELAY_ADDR", "10.0.0.5:9000");
            std::env::set_var("ROWLINK_LOG_FORMAT", "JSON");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.relay_addr.as_deref(), Some("10.0.0.5:9000"));
        assert_eq!(cfg.log_format, LogFormat::Json);
        unsafe {
            std::env::remove_var("ROWLINK_RELAY_ADDR");
            std::env::remove_var("ROWLINK_LOG_FORMAT");
        }
    }
}
