//! Cache store on Redis
//!
//! Holds bytes only: entries are written without expiry and the filename is
//! not persisted.

use crate::error::RepositoryError;
use crate::repository::FileRepository;
use crate::types::{split_address, RedisSettings, StoredFile};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument};

const DEFAULT_PORT: u16 = 6379;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RedisRepository {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisRepository {
    /// Connect to `address` (`host:port`) and verify the server answers `PING`
    pub async fn connect(address: &str, settings: &RedisSettings) -> Result<Self, RepositoryError> {
        let url = connection_url(address, settings)?;
        let client = redis::Client::open(url)?;

        info!(address, db = settings.db, "Connecting to Redis...");
        let conn = within(COMMAND_TIMEOUT, client.get_connection_manager()).await?;
        let repo = Self {
            conn,
            timeout: COMMAND_TIMEOUT,
        };

        let mut conn = repo.conn.clone();
        let _: String = within(repo.timeout, redis::cmd("PING").query_async(&mut conn)).await?;
        info!("Redis connection established");

        Ok(repo)
    }
}

fn connection_url(address: &str, settings: &RedisSettings) -> Result<String, RepositoryError> {
    let (host, port) = split_address(address, DEFAULT_PORT).ok_or_else(|| {
        RepositoryError::Connection(format!("invalid cache address: {}", address))
    })?;

    let auth = if settings.password.is_empty() {
        String::new()
    } else {
        format!(":{}@", urlencoding::encode(&settings.password))
    };
    Ok(format!("redis://{}{}:{}/{}", auth, host, port, settings.db))
}

async fn within<T, F>(limit: Duration, command: F) -> Result<T, RepositoryError>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    tokio::time::timeout(limit, command)
        .await
        .map_err(|_| RepositoryError::Timeout(limit))?
        .map_err(RepositoryError::from)
}

#[async_trait]
impl FileRepository for RedisRepository {
    fn backend(&self) -> &'static str {
        "redis"
    }

    #[instrument(name = "rd.get_file", skip(self), fields(rd.hash = %id_hash))]
    async fn get_file(&self, id_hash: &str) -> Result<StoredFile, RepositoryError> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = within(self.timeout, conn.get(id_hash)).await?;

        bytes
            .map(|content| StoredFile::cached(id_hash, content))
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_file_list(&self) -> Result<Vec<StoredFile>, RepositoryError> {
        Err(RepositoryError::Unsupported("get_file_list"))
    }

    #[instrument(name = "rd.add_file", skip(self, file), fields(rd.hash = %file.id_hash))]
    async fn add_file(&self, file: &StoredFile) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        let content: &[u8] = file.content.as_deref().unwrap_or_default();
        let _: () = within(self.timeout, conn.set(&file.id_hash, content)).await?;
        Ok(())
    }

    #[instrument(name = "rd.remove_file", skip(self), fields(rd.hash = %id_hash))]
    async fn remove_file(&self, id_hash: &str) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        let _: i64 = within(self.timeout, conn.del(id_hash)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        // The connection manager closes when its last clone drops
        info!("Releasing Redis connection");
        Ok(())
    }
}
