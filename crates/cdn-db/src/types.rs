use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::time::Duration;

/// A content-addressed file. `id_hash` is the identity.
///
/// `content` is `None` in metadata-only listings; `filename` is `None` when
/// the record came from a cache, which keeps bytes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredFile {
    pub id_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[sqlx(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl StoredFile {
    pub fn new(id_hash: impl Into<String>, filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            id_hash: id_hash.into(),
            filename: Some(filename.into()),
            content: Some(content),
        }
    }

    /// Bytes-only record as held by a cache
    pub fn cached(id_hash: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            id_hash: id_hash.into(),
            filename: None,
            content: Some(content),
        }
    }

    /// True when there are bytes worth serving
    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Which side of the cache-aside pair a controller fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Durable,
    Cache,
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreRole::Durable => write!(f, "durable"),
            StoreRole::Cache => write!(f, "cache"),
        }
    }
}

/// Connection parameters for the durable store. The address itself comes
/// from discovery at connect time.
#[derive(Debug, Clone)]
pub struct PostgresSettings {
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl: bool,
    pub max_connections: u32,
    /// `None` leaves queries unbounded
    pub query_timeout: Option<Duration>,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            username: "postgres".to_string(),
            password: String::new(),
            database: "cdn".to_string(),
            ssl: false,
            max_connections: 10,
            query_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RedisSettings {
    pub password: String,
    pub db: i64,
}

/// Split `host:port`, falling back to `default_port` when the port is absent
pub fn split_address(address: &str, default_port: u16) -> Option<(String, u16)> {
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse().ok()?;
            Some((host.to_string(), port))
        }
        Some(_) => None,
        None if !address.is_empty() => Some((address.to_string(), default_port)),
        None => None,
    }
}
