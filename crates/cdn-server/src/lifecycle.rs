//! Process lifecycle: register, connect, serve, drain, deregister, close

use crate::config::{CacheBackend, Config};
use crate::error::{Result, ServerError};
use crate::server::{create_router, RouterOptions, ServerState};
use cdn_db::{
    FileRepository, MemoryCacheRepository, PostgresRepository, RedisRepository, StoreController,
};
use service_discovery::{Discovery, DiscoveryBuilder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Grace period for in-flight requests after a shutdown signal
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct App {
    config: Config,
    discovery: Discovery,
    durable: StoreController,
    cache: Option<StoreController>,
}

impl App {
    pub fn new(
        config: Config,
        discovery: Discovery,
        durable: StoreController,
        cache: Option<StoreController>,
    ) -> Self {
        Self {
            config,
            discovery,
            durable,
            cache,
        }
    }

    /// Register with discovery, then connect the durable store and the cache
    pub async fn start(config: Config) -> Result<Self> {
        let discovery = DiscoveryBuilder::new()
            .from_settings(
                config.discovery.enabled,
                &config.discovery.consul,
                config.service_definition(),
            )?
            .build();

        register(&discovery).await?;

        let stores = async {
            let durable = connect_durable(&config, &discovery).await?;
            let cache = match connect_cache(&config, &discovery).await {
                Ok(cache) => cache,
                Err(e) => {
                    close(&durable).await;
                    return Err(e);
                }
            };
            Ok((durable, cache))
        };

        match stores.await {
            Ok((durable, cache)) => Ok(Self::new(config, discovery, durable, cache)),
            Err(e) => {
                deregister(&discovery).await;
                Err(e)
            }
        }
    }

    /// Bind the configured port and serve until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.shutdown().await;
                return Err(e.into());
            }
        };
        info!("Starting HTTP server on {}", addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves or the server fails,
    /// then tear down.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let state = Arc::new(ServerState::new(
            self.durable.clone(),
            self.cache.clone(),
            self.config.discovery.service_id.clone(),
        ));
        let router = create_router(state, &RouterOptions::from_config(&self.config));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let outcome = tokio::select! {
            _ = signal => {
                info!("Shutdown signal received, draining connections");
                let _ = stop_tx.send(());
                match tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!("Requests still running after {:?}, abandoning them", DRAIN_TIMEOUT);
                        server.abort();
                        Ok(())
                    }
                }
            }
            joined = &mut server => {
                error!("HTTP server stopped unexpectedly");
                flatten(joined)
            }
        };

        self.shutdown().await;
        outcome
    }

    async fn shutdown(&self) {
        deregister(&self.discovery).await;
        close(&self.durable).await;
        if let Some(cache) = &self.cache {
            close(cache).await;
        }
        info!("Shutdown complete");
    }
}

async fn register(discovery: &Discovery) -> Result<()> {
    match discovery.register_service().await {
        Ok(()) => {
            info!("Registered with service discovery");
            Ok(())
        }
        Err(e) if e.is_disabled() => {
            info!("Service discovery disabled, skipping registration");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn deregister(discovery: &Discovery) {
    match discovery.deregister_service().await {
        Ok(()) => info!("Deregistered from service discovery"),
        Err(e) if e.is_disabled() => debug!("Service discovery disabled, nothing to deregister"),
        Err(e) => error!(error = %e, "Failed to deregister service"),
    }
}

async fn close(store: &StoreController) {
    if let Err(e) = store.close().await {
        error!(role = %store.role(), error = %e, "Failed to close store");
    }
}

async fn connect_durable(config: &Config, discovery: &Discovery) -> Result<StoreController> {
    let address = discovery.discover(&config.postgres.host).await?;
    let repo = PostgresRepository::connect(&address, &config.postgres.settings).await?;
    Ok(StoreController::durable(Arc::new(repo)))
}

async fn connect_cache(
    config: &Config,
    discovery: &Discovery,
) -> Result<Option<StoreController>> {
    if !config.cache.enabled {
        info!("Caching disabled");
        return Ok(None);
    }

    let repo: Arc<dyn FileRepository> = match config.cache.backend {
        CacheBackend::Redis => {
            let address = discovery.discover(&config.cache.host).await?;
            Arc::new(RedisRepository::connect(&address, &config.cache.settings).await?)
        }
        CacheBackend::Memory => Arc::new(MemoryCacheRepository::new()),
    };
    info!(backend = repo.backend(), "Cache enabled");
    Ok(Some(StoreController::cache(repo)))
}

fn flatten(joined: std::result::Result<std::io::Result<()>, JoinError>) -> Result<()> {
    joined
        .map_err(|e| ServerError::Io(Box::new(std::io::Error::other(e))))?
        .map_err(ServerError::from)
}

/// Resolves on SIGINT, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cdn_db::MemoryRepository;
    use service_discovery::{DiscoveryError, Registry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingRegistry {
        registrations: AtomicUsize,
        deregistrations: AtomicUsize,
    }

    #[async_trait]
    impl Registry for RecordingRegistry {
        async fn register(&self) -> service_discovery::Result<()> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn deregister(&self) -> service_discovery::Result<()> {
            self.deregistrations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn catalog(&self, service_name: &str) -> service_discovery::Result<Vec<String>> {
            Err(DiscoveryError::ServiceNotFound(service_name.to_string()))
        }
    }

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVICE_ID" => Some("test".to_string()),
            "CONSUL_SERVICE_ADDRESS" => Some("127.0.0.1".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_tolerates_disabled_discovery() {
        let discovery = Discovery::disabled();
        register(&discovery).await.unwrap();
        assert!(!discovery.is_registered());
    }

    #[tokio::test]
    async fn test_serve_until_signal_then_tear_down() {
        let registry = Arc::new(RecordingRegistry::default());
        let discovery = Discovery::new(registry.clone());
        register(&discovery).await.unwrap();
        assert!(discovery.is_registered());

        let durable_repo = Arc::new(MemoryRepository::new());
        let app = App::new(
            test_config(),
            discovery.clone(),
            StoreController::durable(durable_repo.clone()),
            Some(StoreController::cache(Arc::new(MemoryCacheRepository::new()))),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(app.serve(listener, async {
            let _ = signal_rx.await;
        }));

        let body = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");

        signal_tx.send(()).unwrap();
        serving.await.unwrap().unwrap();

        assert_eq!(registry.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(registry.deregistrations.load(Ordering::SeqCst), 1);
        assert!(!discovery.is_registered());
        assert!(durable_repo.is_closed());
    }

    #[tokio::test]
    async fn test_start_fails_when_durable_store_is_unreachable() {
        let config = Config::from_lookup(|key| match key {
            "POSTGRES_HOST" => Some("127.0.0.1:1".to_string()),
            "CONSUL_SERVICE_ADDRESS" => Some("127.0.0.1".to_string()),
            _ => None,
        })
        .unwrap();

        assert!(App::start(config).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_cache_needs_no_discovery() {
        let config = Config::from_lookup(|key| match key {
            "REDIS_ENABLE" => Some("true".to_string()),
            "CACHE_BACKEND" => Some("memory".to_string()),
            "CONSUL_SERVICE_ADDRESS" => Some("127.0.0.1".to_string()),
            _ => None,
        })
        .unwrap();
        let discovery = Discovery::new(Arc::new(RecordingRegistry::default()));

        let cache = connect_cache(&config, &discovery).await.unwrap().unwrap();
        assert_eq!(cache.backend(), "memory");
    }

    #[tokio::test]
    async fn test_disabled_cache_connects_nothing() {
        let config = test_config();
        let discovery = Discovery::disabled();
        assert!(connect_cache(&config, &discovery).await.unwrap().is_none());
    }
}
