#![forbid(unsafe_code)]

//! Core domain model and calculation logic for the emissions engine.
//!
//! This crate provides:
//! - Unit conversion across mass, volume, energy, distance and count
//! - Emission factor catalogs (CSV/JSON) with validation
//! - Factor resolution by precedence chain with year fallback
//! - CO2e calculation with provenance
//! - Snapshot handling for catalog reloads, plus an audit trail

pub mod types;
pub mod error;
pub mod units;
pub mod catalog;
pub mod resolver;
pub mod engine;
pub mod snapshot;
pub mod config;
pub mod logging;
pub mod audit;

// Re-export commonly used types
pub use error::{Error, Result, UnitError};
pub use types::*;
pub use units::{convert, Dimension, Unit};
pub use catalog::{FactorCatalog, FactorLookup};
pub use resolver::{resolve, FactorQuery, Resolution};
pub use engine::{calculate, CalculationSettings, GwpValues};
pub use snapshot::{load_validated, CatalogHandle};
pub use config::Config;
pub use audit::{read_audit_records, AuditRecord, AuditSink, JsonlAuditSink};
