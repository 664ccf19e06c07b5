//! Domain engines built on the assessment core.

pub mod claims;
pub mod erp;
pub mod migration;

pub use claims::{ClaimForensics, ClaimForensicsConfig, ClaimRecord};
pub use erp::{ErpIntegration, ErpIntegrationConfig, ErpProfile};
pub use migration::{MigrationDataset, MigrationReadiness, MigrationReadinessConfig};
