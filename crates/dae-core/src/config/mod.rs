//! Configuration parsing and validation.
//!
//! Engines are configured from a TOML file loaded at the composition root.
//! Every parameter that can change an assessment's output is required: a
//! section that omits one fails to parse rather than falling back to a
//! default.
//!
//! ```toml
//! [assumptions]
//! fx_source = "ecb-daily"
//!
//! [engines.claim_forensics]
//! enabled = true
//! amount_tolerance = 0.01
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::modules::claims::ClaimForensicsConfig;
use crate::modules::erp::ErpIntegrationConfig;
use crate::modules::migration::MigrationReadinessConfig;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaeConfig {
    /// Default assumptions recorded on every evidence record.
    #[serde(default)]
    pub assumptions: BTreeMap<String, Value>,

    /// Per-engine sections.
    pub engines: EnginesConfig,
}

/// Engine sections. An absent section means the engine is not registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnginesConfig {
    /// `[engines.migration_readiness]`.
    pub migration_readiness: Option<MigrationReadinessConfig>,

    /// `[engines.erp_integration]`.
    pub erp_integration: Option<ErpIntegrationConfig>,

    /// `[engines.claim_forensics]`.
    pub claim_forensics: Option<ClaimForensicsConfig>,
}

impl DaeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML is invalid, has unknown keys or misses a required parameter
    /// - No engine section is present
    /// - A section fails its own validation
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the offending section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engines = &self.engines;
        if engines.migration_readiness.is_none()
            && engines.erp_integration.is_none()
            && engines.claim_forensics.is_none()
        {
            return Err(ConfigError::Validation(
                "at least one [engines.*] section is required".to_string(),
            ));
        }
        if let Some(section) = &engines.migration_readiness {
            section.validate()?;
        }
        if let Some(section) = &engines.erp_integration {
            section.validate()?;
        }
        if let Some(section) = &engines.claim_forensics {
            section.validate()?;
        }
        Ok(())
    }

    /// Configured engines and whether each is enabled, in name order.
    #[must_use]
    pub fn engine_states(&self) -> BTreeMap<&'static str, bool> {
        let engines = &self.engines;
        let mut states = BTreeMap::new();
        if let Some(section) = &engines.migration_readiness {
            states.insert(crate::modules::migration::ENGINE_NAME, section.enabled);
        }
        if let Some(section) = &engines.erp_integration {
            states.insert(crate::modules::erp::ENGINE_NAME, section.enabled);
        }
        if let Some(section) = &engines.claim_forensics {
            states.insert(crate::modules::claims::ENGINE_NAME, section.enabled);
        }
        states
    }
}

/// Rejects a value outside `(0, 1)` (or `(0, 1]` when `inclusive_max`).
pub(crate) fn check_fraction(
    section: &str,
    field: &str,
    value: f64,
    inclusive_max: bool,
) -> Result<(), ConfigError> {
    let in_range = value > 0.0 && (value < 1.0 || (inclusive_max && value <= 1.0));
    if value.is_finite() && in_range {
        return Ok(());
    }
    let upper = if inclusive_max { "1]" } else { "1)" };
    Err(ConfigError::Validation(format!(
        "[engines.{section}] {field} must be in (0, {upper}, got {value}"
    )))
}

/// Rejects an empty list.
pub(crate) fn check_non_empty<T>(section: &str, field: &str, values: &[T]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::Validation(format!(
            "[engines.{section}] {field} must not be empty"
        )));
    }
    Ok(())
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
