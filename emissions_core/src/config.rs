//! Configuration file support for the emissions engine.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/emissions/config.toml`.

use crate::engine::{CalculationSettings, GwpValues};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest accepted presentation precision for co2e
const MAX_DECIMAL_PLACES: u32 = 9;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub calculation: CalculationConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub organization: OrganizationConfig,
}

/// Factor catalog location
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// IPCC assessment report the GWP values come from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GwpPreset {
    #[default]
    Ar4,
    Ar5,
    Ar6,
}

impl GwpPreset {
    pub fn values(self) -> GwpValues {
        match self {
            GwpPreset::Ar4 => GwpValues::AR4,
            GwpPreset::Ar5 => GwpValues::AR5,
            GwpPreset::Ar6 => GwpValues::AR6,
        }
    }
}

/// Calculation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalculationConfig {
    #[serde(default)]
    pub gwp_preset: GwpPreset,

    /// Overrides the preset's CH4 value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gwp_ch4: Option<f64>,

    /// Overrides the preset's N2O value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gwp_n2o: Option<f64>,

    #[serde(default = "default_co2e_decimal_places")]
    pub co2e_decimal_places: u32,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            gwp_preset: GwpPreset::default(),
            gwp_ch4: None,
            gwp_n2o: None,
            co2e_decimal_places: default_co2e_decimal_places(),
        }
    }
}

impl CalculationConfig {
    /// Effective GWP values after applying overrides
    pub fn gwp(&self) -> GwpValues {
        let preset = self.gwp_preset.values();
        GwpValues {
            ch4: self.gwp_ch4.unwrap_or(preset.ch4),
            n2o: self.gwp_n2o.unwrap_or(preset.n2o),
        }
    }

    pub fn settings(&self) -> CalculationSettings {
        CalculationSettings {
            gwp: self.gwp(),
            co2e_decimal_places: self.co2e_decimal_places,
        }
    }
}

/// Audit trail written by callers after each calculation
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Identity used when the caller does not pass one
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct OrganizationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_id: Option<String>,
}

fn default_co2e_decimal_places() -> u32 {
    3
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        match Self::default_config_path() {
            Some(config_path) if config_path.exists() => Self::load_from(&config_path),
            config_path => {
                tracing::info!(
                    "No config file found at {:?}, using defaults",
                    config_path
                );
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|base| base.join("emissions").join("config.toml"))
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let gwp = self.calculation.gwp();
        for (gas, value) in [("gwp_ch4", gwp.ch4), ("gwp_n2o", gwp.n2o)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a positive number, got {}",
                    gas, value
                )));
            }
        }

        if self.calculation.co2e_decimal_places > MAX_DECIMAL_PLACES {
            return Err(Error::Config(format!(
                "co2e_decimal_places must be at most {}, got {}",
                MAX_DECIMAL_PLACES, self.calculation.co2e_decimal_places
            )));
        }

        if let Some(id) = &self.organization.default_id {
            if id.trim().is_empty() {
                return Err(Error::Config("organization.default_id must not be empty".into()));
            }
        }

        Ok(())
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
