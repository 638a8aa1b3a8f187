//! Registration and Consul agent types

use serde::{Deserialize, Serialize};

/// Where to reach the Consul agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulSettings {
    pub address: String,
    pub port: u16,
    pub datacenter: Option<String>,
}

impl Default for ConsulSettings {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 8500,
            datacenter: None,
        }
    }
}

/// How this instance advertises itself to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDefinition {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub check: HealthCheck,
}

impl ServiceDefinition {
    /// Build a definition whose health check polls `GET /health` on the advertised address
    pub fn with_http_health(id: &str, name: &str, address: &str, port: u16) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            port,
            check: HealthCheck {
                name: "web_alive".to_string(),
                interval: "10s".to_string(),
                timeout: "30s".to_string(),
                http: format!("http://{}:{}/health", address, port),
                deregister_critical_service_after: "1m".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    pub name: String,
    pub interval: String,
    pub timeout: String,
    #[serde(rename = "HTTP")]
    pub http: String,
    pub deregister_critical_service_after: String,
}

/// One entry of `GET /v1/health/service/{name}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthServiceEntry {
    pub node: HealthNode,
    pub service: HealthService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthNode {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthService {
    #[serde(default)]
    pub address: String,
    pub port: u16,
}

impl HealthServiceEntry {
    /// `host:port`, preferring the service address over the node address
    pub fn endpoint(&self) -> String {
        let host = if self.service.address.is_empty() {
            &self.node.address
        } else {
            &self.service.address
        };
        format!("{}:{}", host, self.service.port)
    }
}
