//! Explicit engine registry built at the composition root.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::error::RunError;
use super::report::{RunReport, RunRequest};
use super::run::{EngineRunner, Orchestrator};
use crate::audit::{Clock, SystemClock};
use crate::config::DaeConfig;
use crate::modules::{ClaimForensics, ErpIntegration, MigrationReadiness};

struct Entry {
    enabled: bool,
    runner: Arc<dyn EngineRunner>,
}

/// Description of one registered engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    /// Engine name.
    pub name: &'static str,
    /// Engine version.
    pub version: &'static str,
    /// Whether runs are accepted.
    pub enabled: bool,
    /// Rule names in registration order.
    pub rules: Vec<String>,
}

/// Configured engines by name, each with its kill switch.
#[derive(Default)]
pub struct EngineRegistry {
    engines: BTreeMap<&'static str, Entry>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.engines.iter().map(|(name, entry)| (name, entry.enabled)))
            .finish()
    }
}

impl EngineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every engine with a configuration section, on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Config`] if the configuration is invalid or
    /// [`RunError::Rules`] if a rule set cannot be assembled.
    pub fn from_config(config: &DaeConfig) -> Result<Self, RunError> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Builds every engine with a configuration section.
    ///
    /// # Errors
    ///
    /// See [`EngineRegistry::from_config`].
    pub fn from_config_with_clock(
        config: &DaeConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let mut registry = Self::new();
        let engines = &config.engines;

        if let Some(section) = &engines.migration_readiness {
            let orchestrator = Orchestrator::new(MigrationReadiness::new(section)?)
                .with_clock(Arc::clone(&clock))
                .with_assumptions(config.assumptions.clone());
            registry.register(Arc::new(orchestrator), section.enabled);
        }
        if let Some(section) = &engines.erp_integration {
            let orchestrator = Orchestrator::new(ErpIntegration::new(section)?)
                .with_clock(Arc::clone(&clock))
                .with_assumptions(config.assumptions.clone());
            registry.register(Arc::new(orchestrator), section.enabled);
        }
        if let Some(section) = &engines.claim_forensics {
            let orchestrator = Orchestrator::new(ClaimForensics::new(section)?)
                .with_clock(Arc::clone(&clock))
                .with_assumptions(config.assumptions.clone());
            registry.register(Arc::new(orchestrator), section.enabled);
        }

        info!(engines = ?registry, "engine registry built");
        Ok(registry)
    }

    /// Registers or replaces an engine.
    pub fn register(&mut self, runner: Arc<dyn EngineRunner>, enabled: bool) {
        self.engines
            .insert(runner.engine_name(), Entry { enabled, runner });
    }

    /// Registered engines, in name order.
    #[must_use]
    pub fn engines(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|(name, entry)| EngineInfo {
                name: *name,
                version: entry.runner.engine_version(),
                enabled: entry.enabled,
                rules: entry.runner.rule_names(),
            })
            .collect()
    }

    /// Looks up an enabled engine.
    ///
    /// # Errors
    ///
    /// [`RunError::UnknownEngine`] or [`RunError::EngineDisabled`].
    pub fn runner(&self, name: &str) -> Result<Arc<dyn EngineRunner>, RunError> {
        let entry = self.engines.get(name).ok_or_else(|| RunError::UnknownEngine {
            engine: name.to_string(),
        })?;
        if !entry.enabled {
            return Err(RunError::EngineDisabled {
                engine: name.to_string(),
            });
        }
        Ok(Arc::clone(&entry.runner))
    }

    /// Runs the named engine.
    ///
    /// # Errors
    ///
    /// Lookup errors from [`EngineRegistry::runner`], then any run error.
    pub fn run(&self, name: &str, request: &RunRequest) -> Result<RunReport, RunError> {
        self.runner(name)?.run(request)
    }
}
