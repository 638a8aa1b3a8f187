//! Service discovery
//!
//! Registers this instance with a service registry and resolves logical
//! service names to `host:port` addresses. Two strategies share one contract:
//! a Consul agent, and a static passthrough used when discovery is disabled.

pub mod consul;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod types;

pub use consul::ConsulRegistry;
pub use error::{DiscoveryError, Result};
pub use registry::{Registry, StaticRegistry};
pub use resolver::{Discovery, DiscoveryBuilder};
pub use types::{ConsulSettings, HealthCheck, ServiceDefinition};
