//! In-process stores

use crate::error::RepositoryError;
use crate::repository::FileRepository;
use crate::types::StoredFile;
use async_trait::async_trait;
use moka::future::Cache;
use tracing::instrument;

/// Cache held in process memory.
///
/// Unbounded and without TTL: entries live until removed, matching the
/// Redis cache which sets keys without expiry.
pub struct MemoryCacheRepository {
    entries: Cache<String, Vec<u8>>,
}

impl MemoryCacheRepository {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }
}

impl Default for MemoryCacheRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileRepository for MemoryCacheRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    #[instrument(name = "mem.get_file", skip(self), fields(mem.hash = %id_hash))]
    async fn get_file(&self, id_hash: &str) -> Result<StoredFile, RepositoryError> {
        self.entries
            .get(id_hash)
            .await
            .map(|content| StoredFile::cached(id_hash, content))
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_file_list(&self) -> Result<Vec<StoredFile>, RepositoryError> {
        Err(RepositoryError::Unsupported("get_file_list"))
    }

    #[instrument(name = "mem.add_file", skip(self, file), fields(mem.hash = %file.id_hash))]
    async fn add_file(&self, file: &StoredFile) -> Result<(), RepositoryError> {
        let content = file.content.clone().unwrap_or_default();
        self.entries.insert(file.id_hash.clone(), content).await;
        Ok(())
    }

    #[instrument(name = "mem.remove_file", skip(self), fields(mem.hash = %id_hash))]
    async fn remove_file(&self, id_hash: &str) -> Result<(), RepositoryError> {
        self.entries.invalidate(id_hash).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), RepositoryError> {
        self.entries.invalidate_all();
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use durable::MemoryRepository;

#[cfg(any(test, feature = "test-util"))]
mod durable {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    /// Durable-store stand-in with the same uniqueness rule as the Postgres table
    #[derive(Default)]
    pub struct MemoryRepository {
        files: RwLock<BTreeMap<String, StoredFile>>,
        closed: AtomicBool,
    }

    impl MemoryRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn with_files(files: impl IntoIterator<Item = StoredFile>) -> Self {
            let repo = Self::new();
            {
                let mut map = repo.files.write().await;
                for file in files {
                    map.insert(file.id_hash.clone(), file);
                }
            }
            repo
        }

        pub async fn contains(&self, id_hash: &str) -> bool {
            self.files.read().await.contains_key(id_hash)
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FileRepository for MemoryRepository {
        fn backend(&self) -> &'static str {
            "memory-durable"
        }

        async fn get_file(&self, id_hash: &str) -> Result<StoredFile, RepositoryError> {
            self.files
                .read()
                .await
                .get(id_hash)
                .cloned()
                .ok_or(RepositoryError::NotFound)
        }

        async fn get_file_list(&self) -> Result<Vec<StoredFile>, RepositoryError> {
            Ok(self
                .files
                .read()
                .await
                .values()
                .map(|f| StoredFile {
                    id_hash: f.id_hash.clone(),
                    filename: f.filename.clone(),
                    content: None,
                })
                .collect())
        }

        async fn add_file(&self, file: &StoredFile) -> Result<(), RepositoryError> {
            let mut files = self.files.write().await;
            if files.contains_key(&file.id_hash) {
                return Err(RepositoryError::UniqueViolation);
            }
            files.insert(file.id_hash.clone(), file.clone());
            Ok(())
        }

        async fn remove_file(&self, id_hash: &str) -> Result<(), RepositoryError> {
            self.files.write().await.remove(id_hash);
            Ok(())
        }

        async fn close(&self) -> Result<(), RepositoryError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
