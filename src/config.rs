use crate::bus::polling::DEFAULT_POLL_INTERVAL;
use crate::detector::{
    DEFAULT_DARK_HOLD, DEFAULT_HIGH_THRESHOLD_LUX, DEFAULT_LOW_THRESHOLD_LUX, DetectorConfig,
    DetectorConfigError,
};
use crate::sensor::iio::DEFAULT_IIO_PATH;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_I2C_BUS: u8 = 1;
// BH1750 with ADDR pulled low; 0x5c when pulled high.
pub const DEFAULT_BH1750_ADDRESS: u8 = 0x23;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub detector: Option<DetectorSection>,
    #[serde(default)]
    pub sensor: Option<SensorSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// Calibration for the light-event detector; thresholds differ per device.
#[derive(Debug, Deserialize, Clone)]
pub struct DetectorSection {
    pub low_threshold_lux: Option<f64>,
    pub high_threshold_lux: Option<f64>,
    pub dark_hold_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorDriverKind {
    #[default]
    Iio,
    Bh1750,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorSection {
    #[serde(default)]
    pub driver: SensorDriverKind,
    /// sysfs attribute holding processed illuminance (iio driver)
    pub iio_path: Option<PathBuf>,
    pub i2c_bus: Option<u8>,
    /// 7-bit I2C address (bh1750 driver)
    pub i2c_address: Option<u8>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
    /// Start counting as soon as the service is up (default: false)
    pub autostart: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid detector config: {0}")]
    Invalid(#[from] DetectorConfigError),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.detector_config()?;
    Ok(config)
}

impl Config {
    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Detector calibration with defaults for omitted keys.
    pub fn detector_config(&self) -> Result<DetectorConfig, DetectorConfigError> {
        let section = self.detector.as_ref();
        let low = section
            .and_then(|s| s.low_threshold_lux)
            .unwrap_or(DEFAULT_LOW_THRESHOLD_LUX);
        let high = section
            .and_then(|s| s.high_threshold_lux)
            .unwrap_or(DEFAULT_HIGH_THRESHOLD_LUX);
        let dark_hold = section
            .and_then(|s| s.dark_hold_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DARK_HOLD);
        DetectorConfig::new(low, high, dark_hold)
    }

    pub fn sensor_driver(&self) -> SensorDriverKind {
        self.sensor.as_ref().map(|s| s.driver).unwrap_or_default()
    }

    pub fn iio_path(&self) -> &Path {
        self.sensor
            .as_ref()
            .and_then(|s| s.iio_path.as_deref())
            .unwrap_or(Path::new(DEFAULT_IIO_PATH))
    }

    pub fn i2c_bus(&self) -> u8 {
        self.sensor
            .as_ref()
            .and_then(|s| s.i2c_bus)
            .unwrap_or(DEFAULT_I2C_BUS)
    }

    pub fn i2c_address(&self) -> u8 {
        self.sensor
            .as_ref()
            .and_then(|s| s.i2c_address)
            .unwrap_or(DEFAULT_BH1750_ADDRESS)
    }

    pub fn poll_interval(&self) -> Duration {
        self.sensor
            .as_ref()
            .and_then(|s| s.poll_interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn autostart(&self) -> bool {
        self.server
            .as_ref()
            .and_then(|s| s.autostart)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(label: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("sujood-config-{label}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn default_config_loads_detector_calibration() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        let detector = config.detector_config()?;
        assert_eq!(detector.low_threshold_lux(), 45.0);
        assert_eq!(detector.high_threshold_lux(), 80.0);
        assert_eq!(detector.dark_hold(), Duration::from_millis(600));
        Ok(())
    }

    #[test]
    fn optional_sections_fall_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "minimal",
            r#"
[app]
name = "sujood-counter"

[logging]
level = "debug"
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.detector_config()?, DetectorConfig::default());
        assert_eq!(config.sensor_driver(), SensorDriverKind::Iio);
        assert_eq!(config.iio_path(), Path::new(DEFAULT_IIO_PATH));
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert!(!config.autostart());
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        Ok(())
    }

    #[test]
    fn sensor_section_selects_bh1750() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "bh1750",
            r#"
[app]
name = "sujood-counter"

[logging]
level = "info"

[detector]
low_threshold_lux = 10.0
high_threshold_lux = 40.0
dark_hold_ms = 1200

[sensor]
driver = "bh1750"
i2c_bus = 3
i2c_address = 0x5c
poll_interval_ms = 50
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.sensor_driver(), SensorDriverKind::Bh1750);
        assert_eq!(config.i2c_bus(), 3);
        assert_eq!(config.i2c_address(), 0x5c);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(
            config.detector_config()?,
            DetectorConfig::new(10.0, 40.0, Duration::from_millis(1200))?
        );
        Ok(())
    }

    #[test]
    fn inverted_thresholds_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "inverted",
            r#"
[app]
name = "sujood-counter"

[logging]
level = "info"

[detector]
low_threshold_lux = 80.0
high_threshold_lux = 45.0
"#,
        )?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "loglevel",
            r#"
[app]
name = "sujood-counter"

[logging]
level = "chatty"
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.log_level(), tracing::Level::INFO);
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("sujood-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config("invalid", "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
