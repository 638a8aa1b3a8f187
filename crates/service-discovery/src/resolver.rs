//! Discovery controller
//!
//! Wraps a [`Registry`] backend, tracks whether this instance is registered,
//! and load-balances resolution by picking uniformly among healthy candidates.

use crate::consul::ConsulRegistry;
use crate::error::{DiscoveryError, Result};
use crate::registry::{Registry, StaticRegistry};
use crate::types::{ConsulSettings, ServiceDefinition};
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Discovery {
    registry: Arc<dyn Registry>,
    registered: Arc<AtomicBool>,
}

impl Discovery {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            registered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Discovery with the static passthrough backend
    pub fn disabled() -> Self {
        Self::new(Arc::new(StaticRegistry::new()))
    }

    /// Advertise this instance. `ServiceDisabled` means there is nothing to register with.
    pub async fn register_service(&self) -> Result<()> {
        self.registry.register().await?;
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn deregister_service(&self) -> Result<()> {
        self.registry.deregister().await?;
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Resolve `service_name` to one `host:port`, chosen uniformly at random
    /// among the candidates the backend reports.
    pub async fn discover(&self, service_name: &str) -> Result<String> {
        let catalog = self.registry.catalog(service_name).await?;

        let address = catalog
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| DiscoveryError::ServiceNotFound(service_name.to_string()))?;

        debug!(service_name, address = %address, candidates = catalog.len(), "Discovered service");
        Ok(address)
    }
}

/// Selects the registry strategy from configuration
#[derive(Default)]
pub struct DiscoveryBuilder {
    registry: Option<Arc<dyn Registry>>,
}

impl DiscoveryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Consul when `enabled`, otherwise the static passthrough
    pub fn from_settings(
        self,
        enabled: bool,
        consul: &ConsulSettings,
        service: ServiceDefinition,
    ) -> Result<Self> {
        if enabled {
            let registry = ConsulRegistry::new(consul, service)?;
            Ok(self.with_registry(Arc::new(registry)))
        } else {
            Ok(self.with_registry(Arc::new(StaticRegistry::new())))
        }
    }

    pub fn build(self) -> Discovery {
        match self.registry {
            Some(registry) => Discovery::new(registry),
            None => Discovery::disabled(),
        }
    }
}
