// ABOUTME: Library root for cdc-audit-sync
// ABOUTME: Exports audit tables to CSV incrementally and trims them safely

pub mod audit;
pub mod config;
pub mod error;
pub mod filters;
pub mod logging;
pub mod mysql;
pub mod utils;

pub use audit::{ResumePoint, SyncEngine, SyncStats};
pub use config::SyncConfig;
pub use error::SyncError;
