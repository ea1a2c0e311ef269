pub mod db;
pub mod extract;
pub mod maintenance;
pub mod payments;
pub mod scoring;
pub mod storage;

pub use db::DbAdapter;
pub use extract::DocumentExtractor;
pub use maintenance::MaintenancePoller;
pub use payments::StripePayments;
pub use scoring::OriginalityScorer;
pub use storage::{HttpObjectStorage, LocalObjectStorage};
