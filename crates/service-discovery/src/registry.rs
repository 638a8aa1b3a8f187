//! Registry backends

use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;

/// A directory of services that this instance can register with and query.
///
/// `catalog` returns every healthy candidate address; picking one of them is
/// the resolver's job, not the backend's.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self) -> Result<()>;

    async fn deregister(&self) -> Result<()>;

    async fn catalog(&self, service_name: &str) -> Result<Vec<String>>;
}

/// Used when external discovery is disabled: addresses come straight from
/// configuration, so the "service name" is echoed back as the address.
#[derive(Debug, Default, Clone)]
pub struct StaticRegistry;

impl StaticRegistry {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn register(&self) -> Result<()> {
        Err(DiscoveryError::ServiceDisabled)
    }

    async fn deregister(&self) -> Result<()> {
        Err(DiscoveryError::ServiceDisabled)
    }

    async fn catalog(&self, address: &str) -> Result<Vec<String>> {
        Ok(vec![address.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_registration_is_disabled() {
        let registry = StaticRegistry::new();
        assert!(registry.register().await.unwrap_err().is_disabled());
        assert!(registry.deregister().await.unwrap_err().is_disabled());
    }

    #[tokio::test]
    async fn test_static_catalog_echoes_input() {
        let registry = StaticRegistry::new();
        let catalog = registry.catalog("localhost:1234").await.unwrap();
        assert_eq!(catalog, vec!["localhost:1234".to_string()]);
    }
}
