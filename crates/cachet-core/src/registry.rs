//! Registry of named store backends.

use crate::backend::{BackendOptions, StoreBackend};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds an unconfigured backend.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn StoreBackend> + Send + Sync>;

/// Maps backend names to the factories that build them.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory, replacing any previous one with that name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn StoreBackend> + Send + Sync + 'static,
    {
        info!(backend = %name, "Registering store backend");
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build and configure the backend registered under `name`.
    pub async fn open(
        &self,
        name: &str,
        location: &str,
        verbose: u32,
        options: BackendOptions,
    ) -> Result<Box<dyn StoreBackend>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::InvalidConfiguration(format!("no store backend registered as '{}'", name))
        })?;

        let mut backend = factory();
        backend.configure(location, verbose, options).await?;
        debug!(backend = %name, location = %location, "Store backend configured");
        Ok(backend)
    }

    /// Build and configure the backend named by the location's URI scheme.
    pub async fn open_location(
        &self,
        location: &str,
        verbose: u32,
        options: BackendOptions,
    ) -> Result<Box<dyn StoreBackend>> {
        let scheme = scheme_of(location).ok_or_else(|| {
            Error::InvalidConfiguration(format!("location has no URI scheme: {}", location))
        })?;
        self.open(scheme, location, verbose, options).await
    }
}

/// URI scheme of a location, e.g. `s3` for `s3://bucket/prefix`.
pub fn scheme_of(location: &str) -> Option<&str> {
    location
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .filter(|scheme| !scheme.is_empty())
}
