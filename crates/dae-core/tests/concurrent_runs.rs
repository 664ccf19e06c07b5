//! Concurrent runs over shared engines and a shared store.

use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use dae_core::audit::FixedClock;
use dae_core::modules::{ErpIntegration, ErpIntegrationConfig};
use dae_core::orchestrator::{EngineService, Orchestrator, RunRequest};
use dae_core::store::MemoryStore;
use serde_json::{Value, json};

fn erp() -> Orchestrator<ErpIntegration> {
    let config = ErpIntegrationConfig {
        enabled: true,
        required_endpoints: vec!["base_url".to_string()],
        required_target_fields: vec!["customer_id".to_string()],
        allowed_auth_methods: vec!["oauth2".to_string()],
        compatibility: [("sap".to_string(), vec!["s4hana-2022".to_string()])]
            .into_iter()
            .collect(),
    };
    let clock = FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
    Orchestrator::new(ErpIntegration::new(&config).unwrap()).with_clock(Arc::new(clock))
}

fn profile(version: &str) -> Value {
    json!({
        "system": "sap",
        "version": version,
        "endpoints": {"base_url": "https://erp.example"},
        "auth_method": "basic",
        "field_mappings": []
    })
}

fn request(dv: &str, version: &str) -> RunRequest {
    RunRequest::new(dv, profile(version), Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
}

#[test]
fn same_inputs_converge_across_threads() {
    let store = MemoryStore::new();
    let service = Arc::new(EngineService::new(Arc::new(erp()), store.clone()));

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                scope.spawn(move || service.run(&request("dv-erp-1", "ECC-6.0")).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for report in &reports[1..] {
        assert_eq!(report, &reports[0]);
    }
    assert_eq!(store.finding_count().unwrap(), reports[0].findings.len());
    assert_eq!(store.report_count().unwrap(), 1);
}

#[test]
fn distinct_versions_stay_isolated() {
    let orchestrator = Arc::new(erp());

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = ["s4hana-2022", "ECC-6.0", "s4hana-2022", "R/3"]
            .into_iter()
            .enumerate()
            .map(|(i, version)| {
                let orchestrator = Arc::clone(&orchestrator);
                scope.spawn(move || {
                    orchestrator
                        .run(&request(&format!("dv-erp-{i}"), version))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.dataset_version_id.as_str(), format!("dv-erp-{i}"));
        for finding in &report.findings {
            assert_eq!(finding.dataset_version_id(), &report.dataset_version_id);
        }
    }
    let categories = |i: usize| reports[i].categories();
    assert_eq!(categories(0), ["auth", "mapping"]);
    assert!(categories(1).contains(&"compatibility"));
    assert_ne!(reports[0].finding_ids(), reports[2].finding_ids());
}
