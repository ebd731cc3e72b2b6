//! Per-release catalog snapshots
//!
//! Readers hold an `Arc<TaskCatalog>`; installing a release or a plugin swaps
//! in a new snapshot and never touches one that is already handed out.

use crate::loader::CatalogLoader;
use parking_lot::RwLock;
use rollout_core::{Error, Result, TaskCatalog, TaskTemplate};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct CatalogRegistry {
    snapshots: RwLock<HashMap<String, Arc<TaskCatalog>>>,
}

impl CatalogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the snapshot for a catalog's release
    pub fn install(&self, catalog: TaskCatalog) -> Arc<TaskCatalog> {
        let release = catalog.release().to_string();
        let snapshot = Arc::new(catalog);
        info!(release = %release, tasks = snapshot.len(), "installed task catalog");
        self.snapshots.write().insert(release, Arc::clone(&snapshot));
        snapshot
    }

    /// Load a release through `loader` and install it
    pub fn install_from(&self, loader: &dyn CatalogLoader, release: &str) -> Result<Arc<TaskCatalog>> {
        let catalog = loader.load(release)?;
        Ok(self.install(catalog))
    }

    /// Extend a release's catalog with plugin templates as a new snapshot
    pub fn install_plugin<I>(&self, release: &str, templates: I) -> Result<Arc<TaskCatalog>>
    where
        I: IntoIterator<Item = TaskTemplate>,
    {
        let mut snapshots = self.snapshots.write();
        let current = snapshots.get(release).ok_or_else(|| {
            Error::configuration(format!("release '{release}' has no installed catalog"))
        })?;
        let extended = Arc::new(current.extended(templates)?);
        info!(
            release = %release,
            tasks = extended.len(),
            added = extended.len() - current.len(),
            "installed plugin tasks"
        );
        snapshots.insert(release.to_string(), Arc::clone(&extended));
        Ok(extended)
    }

    pub fn snapshot(&self, release: &str) -> Option<Arc<TaskCatalog>> {
        self.snapshots.read().get(release).cloned()
    }

    pub fn releases(&self) -> Vec<String> {
        let mut releases: Vec<String> = self.snapshots.read().keys().cloned().collect();
        releases.sort();
        releases
    }
}
