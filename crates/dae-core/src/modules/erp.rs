//! ERP integration readiness.
//!
//! Checks a connector profile against the integration team's support matrix
//! before a connection is provisioned.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, check_non_empty};
use crate::orchestrator::AssessmentEngine;
use crate::rules::{
    Rule, RuleContext, RuleEvaluationError, RuleSet, RuleSetError, Severity, Verdict,
    normalize_token,
};

/// Engine name.
pub const ENGINE_NAME: &str = "erp_integration";

/// One source-to-target field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field in the ERP.
    pub source: String,
    /// Field in the target model.
    pub target: String,
}

/// A connector profile for one ERP instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpProfile {
    /// ERP product, e.g. `sap`.
    pub system: String,
    /// Product release.
    pub version: String,
    /// Named connection endpoints.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    /// Authentication method the connector will use.
    #[serde(default)]
    pub auth_method: Option<String>,
    /// Field mappings into the target model.
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
}

/// `[engines.erp_integration]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErpIntegrationConfig {
    /// Kill switch.
    pub enabled: bool,
    /// Endpoint names every profile must define.
    pub required_endpoints: Vec<String>,
    /// Target fields that should be mapped.
    pub required_target_fields: Vec<String>,
    /// Accepted authentication methods.
    pub allowed_auth_methods: Vec<String>,
    /// Supported releases per ERP product.
    pub compatibility: BTreeMap<String, Vec<String>>,
}

impl ErpIntegrationConfig {
    /// Checks that every list is populated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the empty field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_empty(ENGINE_NAME, "required_endpoints", &self.required_endpoints)?;
        check_non_empty(ENGINE_NAME, "allowed_auth_methods", &self.allowed_auth_methods)?;
        if self.compatibility.is_empty() {
            return Err(ConfigError::Validation(format!(
                "[engines.{ENGINE_NAME}] compatibility must list at least one system"
            )));
        }
        for (system, versions) in &self.compatibility {
            check_non_empty(ENGINE_NAME, &format!("compatibility.{system}"), versions)?;
        }
        Ok(())
    }
}

/// The ERP integration readiness engine.
#[derive(Debug)]
pub struct ErpIntegration {
    config: ErpIntegrationConfig,
    rules: RuleSet<ErpProfile>,
}

impl ErpIntegration {
    /// Builds the rule set from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError`] if two rules share a name.
    pub fn new(config: &ErpIntegrationConfig) -> Result<Self, RuleSetError> {
        let compatibility: BTreeMap<String, BTreeSet<String>> = config
            .compatibility
            .iter()
            .map(|(system, versions)| {
                (
                    normalize_token(system),
                    versions.iter().map(|v| normalize_token(v)).collect(),
                )
            })
            .collect();
        let rules: Vec<Box<dyn Rule<ErpProfile>>> = vec![
            Box::new(VersionSupported { compatibility }),
            Box::new(EndpointsPresent {
                required: config.required_endpoints.clone(),
            }),
            Box::new(TargetsMapped {
                required: config.required_target_fields.clone(),
            }),
            Box::new(UniqueTargets),
            Box::new(AuthAllowed {
                allowed: config
                    .allowed_auth_methods
                    .iter()
                    .map(|m| normalize_token(m))
                    .collect(),
            }),
        ];
        Ok(Self {
            config: config.clone(),
            rules: RuleSet::from_rules(rules)?,
        })
    }
}

impl AssessmentEngine for ErpIntegration {
    const NAME: &'static str = ENGINE_NAME;
    const VERSION: &'static str = "1.0.0";

    type Record = ErpProfile;
    type Config = ErpIntegrationConfig;

    fn config(&self) -> &ErpIntegrationConfig {
        &self.config
    }

    fn rules(&self) -> &RuleSet<ErpProfile> {
        &self.rules
    }

    fn source_systems(&self, record: &ErpProfile) -> Vec<String> {
        vec![normalize_token(&record.system)]
    }
}

struct VersionSupported {
    compatibility: BTreeMap<String, BTreeSet<String>>,
}

impl Rule<ErpProfile> for VersionSupported {
    fn name(&self) -> &str {
        "system_version_supported"
    }

    fn category(&self) -> &str {
        "compatibility"
    }

    fn evaluate(
        &self,
        record: &ErpProfile,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let system = normalize_token(&record.system);
        let version = normalize_token(&record.version);
        let verdict = match self.compatibility.get(&system) {
            None => Verdict::fail(format!("unsupported system {}", record.system)),
            Some(versions) if versions.contains(&version) => Verdict::pass(format!(
                "{} {} is supported",
                record.system, record.version
            )),
            Some(_) => Verdict::fail(format!(
                "unsupported {} version {}",
                record.system, record.version
            )),
        };
        Ok(verdict
            .with_input("system", system)
            .with_input("version", version))
    }
}

struct EndpointsPresent {
    required: Vec<String>,
}

impl Rule<ErpProfile> for EndpointsPresent {
    fn name(&self) -> &str {
        "required_endpoints_present"
    }

    fn category(&self) -> &str {
        "connectivity"
    }

    fn evaluate(
        &self,
        record: &ErpProfile,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| {
                record
                    .endpoints
                    .get(name.as_str())
                    .is_none_or(|url| url.trim().is_empty())
            })
            .map(String::as_str)
            .collect();
        let verdict = if missing.is_empty() {
            Verdict::pass("all required endpoints configured")
        } else {
            Verdict::fail(format!("missing endpoints: {}", missing.join(", ")))
        };
        #[allow(clippy::cast_precision_loss)]
        let missing_count = missing.len() as f64;
        Ok(verdict.with_evidence("missing_endpoints", missing_count))
    }
}

struct TargetsMapped {
    required: Vec<String>,
}

impl Rule<ErpProfile> for TargetsMapped {
    fn name(&self) -> &str {
        "required_targets_mapped"
    }

    fn category(&self) -> &str {
        "mapping"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(
        &self,
        record: &ErpProfile,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let mapped: BTreeSet<&str> = record
            .field_mappings
            .iter()
            .map(|m| m.target.as_str())
            .collect();
        let unmapped: Vec<&str> = self
            .required
            .iter()
            .map(String::as_str)
            .filter(|field| !mapped.contains(field))
            .collect();
        if unmapped.is_empty() {
            Ok(Verdict::pass("all required target fields mapped"))
        } else {
            Ok(Verdict::fail(format!(
                "unmapped target fields: {}",
                unmapped.join(", ")
            )))
        }
    }
}

struct UniqueTargets;

impl Rule<ErpProfile> for UniqueTargets {
    fn name(&self) -> &str {
        "unique_mapping_targets"
    }

    fn category(&self) -> &str {
        "mapping"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(
        &self,
        record: &ErpProfile,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let mut seen = BTreeSet::new();
        let duplicated: BTreeSet<&str> = record
            .field_mappings
            .iter()
            .map(|m| m.target.as_str())
            .filter(|target| !seen.insert(*target))
            .collect();
        if duplicated.is_empty() {
            Ok(Verdict::pass("mapping targets are unique"))
        } else {
            Ok(Verdict::fail(format!(
                "target fields mapped more than once: {}",
                duplicated.into_iter().collect::<Vec<_>>().join(", ")
            )))
        }
    }
}

struct AuthAllowed {
    allowed: BTreeSet<String>,
}

impl Rule<ErpProfile> for AuthAllowed {
    fn name(&self) -> &str {
        "auth_method_allowed"
    }

    fn category(&self) -> &str {
        "auth"
    }

    fn evaluate(
        &self,
        record: &ErpProfile,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let Some(method) = record.auth_method.as_deref() else {
            return Ok(Verdict::fail("no authentication method configured"));
        };
        let method = normalize_token(method);
        let verdict = if self.allowed.contains(&method) {
            Verdict::pass(format!("auth method {method} allowed"))
        } else {
            Verdict::fail(format!("auth method {method} not allowed"))
        };
        Ok(verdict.with_input("auth_method", method))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dataset::DatasetVersionId;
    use crate::rules::RuleOutcome;

    fn config() -> ErpIntegrationConfig {
        ErpIntegrationConfig {
            enabled: true,
            required_endpoints: vec!["base_url".to_string(), "token_url".to_string()],
            required_target_fields: vec!["customer_id".to_string(), "amount".to_string()],
            allowed_auth_methods: vec!["OAuth2".to_string(), "api_key".to_string()],
            compatibility: [(
                "SAP".to_string(),
                vec!["S4HANA-2021".to_string(), "S4HANA-2022".to_string()],
            )]
            .into_iter()
            .collect(),
        }
    }

    fn ctx() -> RuleContext {
        RuleContext::new(
            DatasetVersionId::new("dv-erp").unwrap(),
            vec!["sap".to_string()],
            BTreeMap::new(),
        )
    }

    fn profile() -> serde_json::Value {
        json!({
            "system": "sap",
            "version": "s4hana-2022",
            "endpoints": {"base_url": "https://erp.example", "token_url": "https://erp.example/token"},
            "auth_method": " oauth2 ",
            "field_mappings": [
                {"source": "KUNNR", "target": "customer_id"},
                {"source": "WRBTR", "target": "amount"}
            ]
        })
    }

    fn evaluate(payload: serde_json::Value) -> crate::rules::Assessment {
        let engine = ErpIntegration::new(&config()).unwrap();
        let record: ErpProfile = serde_json::from_value(payload).unwrap();
        engine.rules().evaluate(&record, &ctx())
    }

    #[test]
    fn test_supported_profile_passes() {
        let assessment = evaluate(profile());
        assert!(assessment.is_valid, "{:?}", assessment.errors);
        assert!(assessment.warnings.is_empty(), "{:?}", assessment.warnings);
    }

    #[test]
    fn test_unsupported_version_fails_compatibility() {
        let mut payload = profile();
        payload["version"] = json!("ECC-6.0");
        let assessment = evaluate(payload);
        assert!(!assessment.is_valid);
        assert_eq!(assessment.errors.len(), 1);
        assert_eq!(assessment.errors[0].category, "compatibility");
        assert_eq!(assessment.errors[0].message, "unsupported sap version ECC-6.0");
    }

    #[test]
    fn test_mapping_gaps_are_warnings() {
        let mut payload = profile();
        payload["field_mappings"] = json!([
            {"source": "KUNNR", "target": "customer_id"},
            {"source": "KUNAG", "target": "customer_id"}
        ]);
        let assessment = evaluate(payload);
        assert!(assessment.is_valid);
        let warnings: Vec<&str> = assessment.warnings.iter().map(|w| w.rule.as_str()).collect();
        assert_eq!(warnings, ["required_targets_mapped", "unique_mapping_targets"]);
    }

    #[test]
    fn test_missing_endpoint_and_auth_fail() {
        let mut payload = profile();
        payload["endpoints"] = json!({"base_url": "https://erp.example", "token_url": "  "});
        payload["auth_method"] = json!("basic");
        let assessment = evaluate(payload);
        assert_eq!(
            assessment.rule_results["required_endpoints_present"],
            RuleOutcome::Failed
        );
        assert_eq!(
            assessment.rule_results["auth_method_allowed"],
            RuleOutcome::Failed
        );
        assert_eq!(assessment.errors.len(), 2);
    }

    #[test]
    fn test_config_validation() {
        let mut bad = config();
        bad.compatibility.insert("netsuite".to_string(), Vec::new());
        assert!(bad.validate().is_err());
        assert!(config().validate().is_ok());
    }
}
