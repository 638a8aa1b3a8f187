//! Resolution controller
//!
//! The only storage entry point handlers use. It forwards to its repository
//! and translates backend errors into [`StoreError`]; one instance fronts the
//! durable store, an optional second one fronts the cache.

use crate::error::{RepositoryError, Result, StoreError};
use crate::repository::FileRepository;
use crate::types::{StoreRole, StoredFile};
use std::sync::Arc;

#[derive(Clone)]
pub struct StoreController {
    repo: Arc<dyn FileRepository>,
    role: StoreRole,
}

impl StoreController {
    pub fn new(repo: Arc<dyn FileRepository>, role: StoreRole) -> Self {
        Self { repo, role }
    }

    pub fn durable(repo: Arc<dyn FileRepository>) -> Self {
        Self::new(repo, StoreRole::Durable)
    }

    pub fn cache(repo: Arc<dyn FileRepository>) -> Self {
        Self::new(repo, StoreRole::Cache)
    }

    pub fn role(&self) -> StoreRole {
        self.role
    }

    pub fn backend(&self) -> &'static str {
        self.repo.backend()
    }

    pub async fn get_file(&self, id_hash: &str) -> Result<StoredFile> {
        self.repo
            .get_file(id_hash)
            .await
            .map_err(|e| self.translate(e, id_hash))
    }

    pub async fn get_file_list(&self) -> Result<Vec<StoredFile>> {
        self.repo
            .get_file_list()
            .await
            .map_err(|e| self.translate(e, "*"))
    }

    pub async fn add_file(&self, file: &StoredFile) -> Result<()> {
        self.repo
            .add_file(file)
            .await
            .map_err(|e| self.translate(e, &file.id_hash))
    }

    pub async fn remove_file(&self, id_hash: &str) -> Result<()> {
        self.repo
            .remove_file(id_hash)
            .await
            .map_err(|e| self.translate(e, id_hash))
    }

    pub async fn close(&self) -> Result<()> {
        self.repo.close().await.map_err(|e| self.translate(e, "*"))
    }

    fn translate(&self, err: RepositoryError, key: &str) -> StoreError {
        match err {
            RepositoryError::NotFound => StoreError::KeyDoesNotExist(key.to_string()),
            RepositoryError::UniqueViolation => StoreError::KeyAlreadyExists(key.to_string()),
            RepositoryError::Unsupported(op) => StoreError::NotImplemented(op),
            other => match self.role {
                StoreRole::Durable => StoreError::DatabaseOperation(other.to_string()),
                StoreRole::Cache => {
                    StoreError::Cache(format!("{}: {}", self.repo.backend(), other))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCacheRepository, MemoryRepository};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl FileRepository for Unreachable {
        fn backend(&self) -> &'static str {
            "unreachable"
        }

        async fn get_file(&self, _id_hash: &str) -> std::result::Result<StoredFile, RepositoryError> {
            Err(RepositoryError::Timeout(Duration::from_secs(2)))
        }

        async fn get_file_list(&self) -> std::result::Result<Vec<StoredFile>, RepositoryError> {
            Err(RepositoryError::Connection("refused".to_string()))
        }

        async fn add_file(&self, _file: &StoredFile) -> std::result::Result<(), RepositoryError> {
            Err(RepositoryError::Connection("refused".to_string()))
        }

        async fn remove_file(&self, _id_hash: &str) -> std::result::Result<(), RepositoryError> {
            Err(RepositoryError::Connection("refused".to_string()))
        }

        async fn close(&self) -> std::result::Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_miss_translates_to_key_does_not_exist() {
        let durable = StoreController::durable(Arc::new(MemoryRepository::new()));
        let cache = StoreController::cache(Arc::new(MemoryCacheRepository::new()));

        assert_eq!(
            durable.get_file("0002").await.unwrap_err(),
            StoreError::KeyDoesNotExist("0002".to_string())
        );
        assert_eq!(
            cache.get_file("0002").await.unwrap_err(),
            StoreError::KeyDoesNotExist("0002".to_string())
        );
    }

    #[tokio::test]
    async fn test_duplicate_translates_to_key_already_exists() {
        let durable = StoreController::durable(Arc::new(MemoryRepository::new()));
        let file = StoredFile::new("0001", "test", vec![0, 10, 20]);
        durable.add_file(&file).await.unwrap();

        assert_eq!(
            durable.add_file(&file).await.unwrap_err(),
            StoreError::KeyAlreadyExists("0001".to_string())
        );
    }

    #[tokio::test]
    async fn test_failures_are_classified_by_role() {
        let durable = StoreController::durable(Arc::new(Unreachable));
        let cache = StoreController::cache(Arc::new(Unreachable));

        assert!(matches!(
            durable.get_file("k").await,
            Err(StoreError::DatabaseOperation(_))
        ));
        match cache.get_file("k").await {
            Err(StoreError::Cache(msg)) => assert!(msg.starts_with("unreachable:")),
            other => panic!("expected cache error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cache_listing_is_not_implemented() {
        let cache = StoreController::cache(Arc::new(MemoryCacheRepository::new()));
        assert_eq!(
            cache.get_file_list().await.unwrap_err(),
            StoreError::NotImplemented("get_file_list")
        );
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_ok() {
        let durable = StoreController::durable(Arc::new(MemoryRepository::new()));
        durable.remove_file("0001").await.unwrap();
        durable.remove_file("0001").await.unwrap();
    }
}
