//! Durable store on PostgreSQL

use crate::error::RepositoryError;
use crate::repository::FileRepository;
use crate::types::{split_address, PostgresSettings, StoredFile};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument};

const DEFAULT_PORT: u16 = 5432;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PostgresRepository {
    pool: PgPool,
    query_timeout: Option<Duration>,
}

impl PostgresRepository {
    /// Connect to `address` (`host:port`) and apply pending migrations
    pub async fn connect(
        address: &str,
        settings: &PostgresSettings,
    ) -> Result<Self, RepositoryError> {
        let (host, port) = split_address(address, DEFAULT_PORT).ok_or_else(|| {
            RepositoryError::Connection(format!("invalid database address: {}", address))
        })?;

        let ssl_mode = if settings.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };
        let options = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database)
            .ssl_mode(ssl_mode);

        info!(host = %host, port, database = %settings.database, "Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;
        info!("Database connection established");

        let repo = Self::from_pool(pool, settings.query_timeout);
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn from_pool(pool: PgPool, query_timeout: Option<Duration>) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Apply pending schema migrations, tracked in `_sqlx_migrations`
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        info!("Applying schema migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .map_err(|_| RepositoryError::Timeout(limit))?
                .map_err(RepositoryError::from),
            None => query.await.map_err(RepositoryError::from),
        }
    }
}

#[async_trait]
impl FileRepository for PostgresRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(name = "pg.get_file", skip(self), fields(pg.hash = %id_hash))]
    async fn get_file(&self, id_hash: &str) -> Result<StoredFile, RepositoryError> {
        let row = self
            .bounded(
                sqlx::query_as::<_, StoredFile>(
                    "SELECT id_hash, filename, content FROM fs_entities WHERE id_hash = $1",
                )
                .bind(id_hash)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.ok_or(RepositoryError::NotFound)
    }

    #[instrument(name = "pg.get_file_list", skip(self))]
    async fn get_file_list(&self) -> Result<Vec<StoredFile>, RepositoryError> {
        self.bounded(
            sqlx::query_as::<_, StoredFile>(
                "SELECT id_hash, filename FROM fs_entities ORDER BY id ASC",
            )
            .fetch_all(&self.pool),
        )
        .await
    }

    /// Plain insert; the unique index on `id_hash` rejects duplicates.
    #[instrument(
        name = "pg.add_file",
        skip(self, file),
        fields(pg.hash = %file.id_hash, pg.filename = file.filename.as_deref().unwrap_or(""))
    )]
    async fn add_file(&self, file: &StoredFile) -> Result<(), RepositoryError> {
        let content: &[u8] = file.content.as_deref().unwrap_or_default();
        self.bounded(
            sqlx::query("INSERT INTO fs_entities (id_hash, filename, content) VALUES ($1, $2, $3)")
                .bind(&file.id_hash)
                .bind(file.filename.as_deref().unwrap_or_default())
                .bind(content)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "pg.remove_file", skip(self), fields(pg.hash = %id_hash))]
    async fn remove_file(&self, id_hash: &str) -> Result<(), RepositoryError> {
        self.bounded(
            sqlx::query("DELETE FROM fs_entities WHERE id_hash = $1")
                .bind(id_hash)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        info!("Closing database pool");
        self.pool.close().await;
        Ok(())
    }
}
