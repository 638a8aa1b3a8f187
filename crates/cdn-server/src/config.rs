use crate::error::{Result, ServerError};
use crate::keys::{random_key, SERVICE_ID_LEN};
use cdn_db::{PostgresSettings, RedisSettings};
use service_discovery::{ConsulSettings, ServiceDefinition};
use std::env;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub rate_limit: RateLimitConfig,
    pub discovery: DiscoveryConfig,
    pub postgres: PostgresConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: u16,
    pub allow_insert: bool,
    pub allow_delete: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests per second
    pub rate: u32,
    pub slack: u32,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub consul: ConsulSettings,
    pub service_name: String,
    /// Address advertised to the registry
    pub service_address: String,
    pub service_id: String,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// `host:port`, or a service name to resolve when discovery is enabled
    pub host: String,
    pub settings: PostgresSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub host: String,
    pub settings: RedisSettings,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |key: &str, default: u32| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str| lookup(key).and_then(|v| parse_bool(&v)).unwrap_or(false);

        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let http = HttpConfig {
            port,
            allow_insert: flag("ALLOW_INSERT"),
            allow_delete: flag("ALLOW_DELETE"),
        };

        let rate_limit = RateLimitConfig {
            enabled: flag("RATE_LIMIT_ENABLE"),
            rate: number("RATE_LIMIT", 100).max(1),
            slack: number("RATE_LIMIT_SLACK", 10),
        };

        let service_address = match string("CONSUL_SERVICE_ADDRESS", "auto").as_str() {
            "auto" => local_ipv4().to_string(),
            address => address.to_string(),
        };
        let discovery = DiscoveryConfig {
            enabled: flag("CONSUL_ENABLE"),
            consul: ConsulSettings {
                address: string("CONSUL_ADDRESS", "localhost"),
                port: lookup("CONSUL_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8500),
                datacenter: lookup("CONSUL_DATACENTER").filter(|dc| !dc.is_empty()),
            },
            service_name: string("CONSUL_SERVICE_NAME", "cdn"),
            service_address,
            service_id: lookup("SERVICE_ID")
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| random_key(SERVICE_ID_LEN)),
        };

        let query_timeout = lookup("POSTGRES_QUERY_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let postgres = PostgresConfig {
            host: string("POSTGRES_HOST", "localhost:5432"),
            settings: PostgresSettings {
                username: string("POSTGRES_USERNAME", "postgres"),
                password: lookup("POSTGRES_PASSWORD").unwrap_or_default(),
                database: string("POSTGRES_DATABASE", "cdn"),
                ssl: flag("POSTGRES_SSL"),
                query_timeout,
                ..PostgresSettings::default()
            },
        };

        let backend = match string("CACHE_BACKEND", "redis").to_ascii_lowercase().as_str() {
            "redis" => CacheBackend::Redis,
            "memory" => CacheBackend::Memory,
            other => {
                return Err(ServerError::Config(format!(
                    "unknown CACHE_BACKEND: {}",
                    other
                )))
            }
        };
        let cache = CacheConfig {
            enabled: flag("REDIS_ENABLE"),
            backend,
            host: string("REDIS_HOST", "localhost:6379"),
            settings: RedisSettings {
                password: lookup("REDIS_PASSWORD").unwrap_or_default(),
                db: lookup("REDIS_DB")
                    .and_then(|db| db.parse().ok())
                    .unwrap_or(0),
            },
        };

        Ok(Self {
            http,
            rate_limit,
            discovery,
            postgres,
            cache,
        })
    }

    /// Registry entry for this instance, health-checked on `/health`
    pub fn service_definition(&self) -> ServiceDefinition {
        ServiceDefinition::with_http_health(
            &self.discovery.service_id,
            &self.discovery.service_name,
            &self.discovery.service_address,
            self.http.port,
        )
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Outbound IPv4 address of this host. Connecting a UDP socket sends nothing;
/// it only asks the kernel which interface routes to a public address.
fn local_ipv4() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
