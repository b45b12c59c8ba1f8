//! Swappable catalog snapshots.
//!
//! Calculations never read a live, mutable store. A [`CatalogHandle`] hands
//! out `Arc<FactorCatalog>` snapshots; a refresh builds a new catalog and
//! swaps the pointer, so calls already in flight keep the snapshot they
//! started with.

use crate::catalog::FactorCatalog;
use crate::engine::{calculate, CalculationSettings};
use crate::types::{ActivityInput, CalculationResult};
use crate::{Error, Result};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Shared owner of the current catalog snapshot
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<FactorCatalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: FactorCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Load, validate and wrap a catalog file
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(load_validated(path)?))
    }

    /// The snapshot new calculations should use
    pub fn snapshot(&self) -> Arc<FactorCatalog> {
        // The guarded value is a plain Arc, so a poisoned lock still holds a whole snapshot
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Make `catalog` the snapshot for future calls, returning the previous one
    pub fn replace(&self, catalog: FactorCatalog) -> Arc<FactorCatalog> {
        let next = Arc::new(catalog);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *guard, next);
        tracing::info!(
            "Swapped factor catalog: {} factors from {} (was {} from {})",
            guard.len(),
            guard.origin(),
            previous.len(),
            previous.origin()
        );
        previous
    }

    /// Reload from `path`; the current snapshot stays in place if loading fails
    pub fn reload_from(&self, path: &Path) -> Result<Arc<FactorCatalog>> {
        let catalog = load_validated(path)?;
        self.replace(catalog);
        Ok(self.snapshot())
    }

    /// Run one calculation against a single consistent snapshot
    pub fn calculate(
        &self,
        input: &ActivityInput,
        organization_id: &str,
        settings: &CalculationSettings,
    ) -> Result<CalculationResult> {
        let snapshot = self.snapshot();
        calculate(snapshot.as_ref(), input, organization_id, settings)
    }
}

/// Load a catalog file and reject it if validation finds problems
pub fn load_validated(path: &Path) -> Result<FactorCatalog> {
    let catalog = FactorCatalog::load(path)?;
    let errors = catalog.validate();
    if !errors.is_empty() {
        for error in &errors {
            tracing::warn!("Catalog {:?}: {}", path, error);
        }
        return Err(Error::CatalogValidation(format!(
            "{} problem(s) in {:?}: {}",
            errors.len(),
            path,
            errors.join("; ")
        )));
    }
    Ok(catalog)
}
