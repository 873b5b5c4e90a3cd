//src/config.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "forge";
const CONFIG_ENV_VAR: &str = "FORGE_CONFIG_DIR"; // Environment variable name

/// Rest-timer presets offered by the tracking UI, in seconds.
pub const REST_PRESETS_SECS: [u32; 5] = [30, 60, 90, 120, 180];

#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Rest duration must be greater than zero, got {0}")]
    InvalidRestDuration(u32),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Pounds,
    Kilograms,
}

impl WeightUnit {
    pub const fn abbreviation(self) -> &'static str {
        match self {
            Self::Pounds => "lbs",
            Self::Kilograms => "kg",
        }
    }

    pub fn convert(self, value: f64, to: Self) -> f64 {
        match (self, to) {
            (Self::Pounds, Self::Kilograms) => value * 0.453_592,
            (Self::Kilograms, Self::Pounds) => value * 2.204_62,
            _ => value,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
}

impl DistanceUnit {
    pub const fn abbreviation(self) -> &'static str {
        match self {
            Self::Miles => "mi",
            Self::Kilometers => "km",
        }
    }

    /// Converts a stored meter value into this display unit.
    pub fn from_meters(self, meters: f64) -> f64 {
        match self {
            Self::Miles => meters / 1_609.344,
            Self::Kilometers => meters / 1_000.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)] // Ensure defaults are used if fields are missing
pub struct Config {
    pub weight_unit: WeightUnit,
    pub distance_unit: DistanceUnit,
    /// Single source of truth for rest countdowns, including the auto-start
    /// after a completed set.
    pub default_rest_secs: u32,
    pub auto_start_rest_timer: bool,
    pub week_starts_on_monday: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weight_unit: WeightUnit::default(),
            distance_unit: DistanceUnit::default(),
            default_rest_secs: 90,
            auto_start_rest_timer: true,
            week_starts_on_monday: true,
        }
    }
}

/// Determines the path to the configuration file.
pub fn get_config_path() -> Result<PathBuf, Error> {
    let config_dir_override = std::env::var(CONFIG_ENV_VAR).ok();

    let config_dir_path = if let Some(path_str) = config_dir_override {
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
        }
        path
    } else {
        let base_config_dir = dirs::config_dir().ok_or(Error::CannotDetermineConfigDir)?;
        base_config_dir.join(APP_CONFIG_DIR)
    };

    if !config_dir_path.exists() {
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration from the TOML file at the given path, writing a
/// default file on first run.
pub fn load(config_path: &Path) -> Result<Config, Error> {
    if config_path.exists() {
        let config_content = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&config_content).map_err(Error::TomlParse)?;
        Ok(config)
    } else {
        let default_config = Config::default();
        save(config_path, &default_config)?;
        Ok(default_config)
    }
}

/// Saves the configuration to the TOML file.
pub fn save(config_path: &Path, config: &Config) -> Result<(), Error> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config).map_err(Error::TomlSerialize)?;
    fs::write(config_path, config_content)?;
    Ok(())
}
