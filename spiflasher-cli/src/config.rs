//! Configuration file support for spiflasher.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SPIFLASHER_*)
//! 3. Local config file (./spiflasher.toml)
//! 4. Global config file (~/.config/spiflasher/config.toml)
//!
//! Everything left unset falls back to the bootloader's wiring and bus
//! defaults.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "spiflasher.toml";

/// SPI bus configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpiConfig {
    /// spidev node (e.g., "/dev/spidev1.0").
    pub device: Option<String>,
    /// Clock rate in Hz.
    pub speed_hz: Option<u32>,
    /// SPI mode (0-3).
    pub mode: Option<u8>,
}

/// GPIO wiring.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GpioConfig {
    /// GPIO character device (e.g., "/dev/gpiochip0").
    pub chip: Option<String>,
    /// Line driving the target's reset input.
    pub reset_line: Option<u32>,
    /// Line the target pulls low when ready.
    pub ready_line: Option<u32>,
}

/// Ready-line polling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollingConfig {
    /// Sleep between ready-line samples, in microseconds.
    pub interval_us: Option<u64>,
    /// Give up waiting for the ready line after this many milliseconds.
    pub max_wait_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// SPI bus configuration.
    #[serde(default)]
    pub spi: SpiConfig,
    /// GPIO configuration.
    #[serde(default)]
    pub gpio: GpioConfig,
    /// Polling configuration.
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "spiflasher").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        // SPI config
        if other.spi.device.is_some() {
            self.spi.device = other.spi.device;
        }
        if other.spi.speed_hz.is_some() {
            self.spi.speed_hz = other.spi.speed_hz;
        }
        if other.spi.mode.is_some() {
            self.spi.mode = other.spi.mode;
        }

        // GPIO config
        if other.gpio.chip.is_some() {
            self.gpio.chip = other.gpio.chip;
        }
        if other.gpio.reset_line.is_some() {
            self.gpio.reset_line = other.gpio.reset_line;
        }
        if other.gpio.ready_line.is_some() {
            self.gpio.ready_line = other.gpio.ready_line;
        }

        // Polling config
        if other.polling.interval_us.is_some() {
            self.polling.interval_us = other.polling.interval_us;
        }
        if other.polling.max_wait_ms.is_some() {
            self.polling.max_wait_ms = other.polling.max_wait_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.spi.device.is_none());
        assert!(config.spi.speed_hz.is_none());
        assert!(config.spi.mode.is_none());
        assert!(config.gpio.chip.is_none());
        assert!(config.gpio.reset_line.is_none());
        assert!(config.gpio.ready_line.is_none());
        assert!(config.polling.interval_us.is_none());
        assert!(config.polling.max_wait_ms.is_none());
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.spi.device = Some("/dev/spidev0.0".to_string());
        base.gpio.reset_line = Some(10);

        let mut other = Config::default();
        other.spi.device = Some("/dev/spidev1.1".to_string());
        other.gpio.reset_line = Some(35);
        other.polling.max_wait_ms = Some(5000);

        base.merge(other);

        assert_eq!(base.spi.device.as_deref(), Some("/dev/spidev1.1"));
        assert_eq!(base.gpio.reset_line, Some(35));
        assert_eq!(base.polling.max_wait_ms, Some(5000));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.spi.speed_hz = Some(500_000);
        base.gpio.chip = Some("/dev/gpiochip1".to_string());
        base.polling.interval_us = Some(250);

        let other = Config::default(); // all None
        base.merge(other);

        assert_eq!(base.spi.speed_hz, Some(500_000));
        assert_eq!(base.gpio.chip.as_deref(), Some("/dev/gpiochip1"));
        assert_eq!(base.polling.interval_us, Some(250));
    }

    // ---- TOML deserialization ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[spi]
device = "/dev/spidev1.0"
speed_hz = 1000000
mode = 1

[gpio]
chip = "/dev/gpiochip0"
reset_line = 35
ready_line = 47

[polling]
interval_us = 100
max_wait_ms = 5000
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.spi.device.as_deref(), Some("/dev/spidev1.0"));
        assert_eq!(config.spi.speed_hz, Some(1_000_000));
        assert_eq!(config.spi.mode, Some(1));
        assert_eq!(config.gpio.chip.as_deref(), Some("/dev/gpiochip0"));
        assert_eq!(config.gpio.reset_line, Some(35));
        assert_eq!(config.gpio.ready_line, Some(47));
        assert_eq!(config.polling.interval_us, Some(100));
        assert_eq!(config.polling.max_wait_ms, Some(5000));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.spi.device.is_none());
        assert!(config.gpio.reset_line.is_none());
    }

    #[test]
    fn test_config_from_partial_toml() {
        let toml_str = r"
[gpio]
ready_line = 12
";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.spi.device.is_none());
        assert_eq!(config.gpio.ready_line, Some(12));
        assert!(config.gpio.reset_line.is_none());
    }

    #[test]
    fn test_config_rejects_wrong_types() {
        let toml_str = r#"
[gpio]
reset_line = "thirty-five"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    // ---- load_from_path with tempfile ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spiflasher.toml");
        fs::write(
            &path,
            r#"
[spi]
device = "/dev/spidev2.0"
[polling]
max_wait_ms = 250
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.spi.device.as_deref(), Some("/dev/spidev2.0"));
        assert_eq!(config.polling.max_wait_ms, Some(250));
    }

    #[test]
    fn test_load_from_path_invalid_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[spi\ndevice = ").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.spi.device.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        // Should return default
        assert!(config.spi.device.is_none());
    }

    // ---- global_config_path ----

    #[test]
    fn test_global_config_path_is_some() {
        // On most systems this should return Some
        let path = Config::global_config_path();
        if let Some(p) = path {
            assert!(p.to_str().unwrap().contains("spiflasher"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
