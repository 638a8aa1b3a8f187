//! Consul agent backend

use crate::error::{DiscoveryError, Result};
use crate::registry::Registry;
use crate::types::{ConsulSettings, HealthServiceEntry, ServiceDefinition};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Discovery calls sit on the startup path; keep them short.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Registry backed by the HTTP API of a local Consul agent
pub struct ConsulRegistry {
    client: Client,
    base_url: Url,
    datacenter: Option<String>,
    service: ServiceDefinition,
}

impl ConsulRegistry {
    /// Create a client for the agent at `settings`, advertising `service`
    pub fn new(settings: &ConsulSettings, service: ServiceDefinition) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = Url::parse(&format!("http://{}:{}/", settings.address, settings.port))?;

        Ok(Self {
            client,
            base_url,
            datacenter: settings.datacenter.clone().filter(|dc| !dc.is_empty()),
            service,
        })
    }

    pub fn service(&self) -> &ServiceDefinition {
        &self.service
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        if let Some(dc) = &self.datacenter {
            url.query_pairs_mut().append_pair("dc", dc);
        }
        Ok(url)
    }

    async fn check_status(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(DiscoveryError::Registry(format!(
            "{} returned status {}: {}",
            action,
            status,
            body.trim()
        )))
    }
}

#[async_trait]
impl Registry for ConsulRegistry {
    async fn register(&self) -> Result<()> {
        let url = self.endpoint("v1/agent/service/register")?;
        debug!(url = %url, service.id = %self.service.id, "Registering service");

        let response = self.client.put(url).json(&self.service).send().await?;
        Self::check_status(response, "service register").await?;

        info!(
            service.id = %self.service.id,
            service.name = %self.service.name,
            address = %self.service.address,
            port = self.service.port,
            "Registered with Consul"
        );
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        let path = format!(
            "v1/agent/service/deregister/{}",
            urlencoding::encode(&self.service.id)
        );
        let url = self.endpoint(&path)?;
        debug!(url = %url, "Deregistering service");

        let response = self.client.put(url).send().await?;
        Self::check_status(response, "service deregister").await?;

        info!(service.id = %self.service.id, "Deregistered from Consul");
        Ok(())
    }

    async fn catalog(&self, service_name: &str) -> Result<Vec<String>> {
        let path = format!("v1/health/service/{}", urlencoding::encode(service_name));
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut().append_pair("passing", "true");

        let response = self.client.get(url).send().await?;
        let response = Self::check_status(response, "health query").await?;
        let entries: Vec<HealthServiceEntry> = response.json().await?;

        let catalog: Vec<String> = entries.iter().map(HealthServiceEntry::endpoint).collect();
        debug!(service_name, candidates = catalog.len(), "Queried Consul catalog");
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeAgent {
        registered: Arc<Mutex<Vec<Value>>>,
        deregistered: Arc<Mutex<Vec<String>>>,
        queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    async fn register(State(agent): State<FakeAgent>, Json(body): Json<Value>) -> StatusCode {
        agent.registered.lock().unwrap().push(body);
        StatusCode::OK
    }

    async fn deregister(State(agent): State<FakeAgent>, Path(id): Path<String>) -> StatusCode {
        agent.deregistered.lock().unwrap().push(id);
        StatusCode::OK
    }

    async fn health(
        State(agent): State<FakeAgent>,
        Path(name): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        agent.queries.lock().unwrap().push(params);
        if name == "postgres" {
            Json(json!([
                {"Node": {"Address": "192.168.0.10"}, "Service": {"Address": "10.0.0.1", "Port": 5432}},
                {"Node": {"Address": "192.168.0.11"}, "Service": {"Address": "", "Port": 5432}}
            ]))
        } else {
            Json(json!([]))
        }
    }

    async fn spawn_agent() -> (FakeAgent, ConsulSettings) {
        let agent = FakeAgent::default();
        let router = Router::new()
            .route("/v1/agent/service/register", put(register))
            .route("/v1/agent/service/deregister/{id}", put(deregister))
            .route("/v1/health/service/{name}", get(health))
            .with_state(agent.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let settings = ConsulSettings {
            address: "127.0.0.1".to_string(),
            port,
            datacenter: Some("dc1".to_string()),
        };
        (agent, settings)
    }

    fn definition() -> ServiceDefinition {
        ServiceDefinition::with_http_health("x9k2", "cdn", "10.1.1.1", 3000)
    }

    #[tokio::test]
    async fn test_register_sends_service_definition() {
        let (agent, settings) = spawn_agent().await;
        let registry = ConsulRegistry::new(&settings, definition()).unwrap();

        registry.register().await.unwrap();

        let registered = agent.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0]["ID"], "x9k2");
        assert_eq!(registered[0]["Check"]["HTTP"], "http://10.1.1.1:3000/health");
    }

    #[tokio::test]
    async fn test_deregister_uses_service_id() {
        let (agent, settings) = spawn_agent().await;
        let registry = ConsulRegistry::new(&settings, definition()).unwrap();

        registry.deregister().await.unwrap();

        assert_eq!(*agent.deregistered.lock().unwrap(), vec!["x9k2".to_string()]);
    }

    #[tokio::test]
    async fn test_catalog_returns_healthy_endpoints() {
        let (agent, settings) = spawn_agent().await;
        let registry = ConsulRegistry::new(&settings, definition()).unwrap();

        let catalog = registry.catalog("postgres").await.unwrap();
        assert_eq!(
            catalog,
            vec!["10.0.0.1:5432".to_string(), "192.168.0.11:5432".to_string()]
        );

        let queries = agent.queries.lock().unwrap();
        assert_eq!(queries[0].get("passing").map(String::as_str), Some("true"));
        assert_eq!(queries[0].get("dc").map(String::as_str), Some("dc1"));
    }

    #[tokio::test]
    async fn test_catalog_unknown_service_is_empty() {
        let (_agent, settings) = spawn_agent().await;
        let registry = ConsulRegistry::new(&settings, definition()).unwrap();

        assert!(registry.catalog("redis").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_an_error() {
        let settings = ConsulSettings {
            address: "127.0.0.1".to_string(),
            port: 1,
            datacenter: None,
        };
        let registry = ConsulRegistry::new(&settings, definition()).unwrap();

        let err = registry.register().await.unwrap_err();
        assert!(!err.is_disabled());
    }
}
