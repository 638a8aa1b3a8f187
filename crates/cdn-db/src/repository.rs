use crate::error::RepositoryError;
use crate::types::StoredFile;
use async_trait::async_trait;

/// Capability contract shared by the durable store and the caches.
///
/// Implementations report backend-level [`RepositoryError`]s; a missing key
/// must come back as [`RepositoryError::NotFound`], never as a generic error.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Short backend name used in logs and spans
    fn backend(&self) -> &'static str;

    async fn get_file(&self, id_hash: &str) -> Result<StoredFile, RepositoryError>;

    /// Every known record, content omitted
    async fn get_file_list(&self) -> Result<Vec<StoredFile>, RepositoryError>;

    async fn add_file(&self, file: &StoredFile) -> Result<(), RepositoryError>;

    /// Removing an absent key succeeds
    async fn remove_file(&self, id_hash: &str) -> Result<(), RepositoryError>;

    /// Release connections; called once at shutdown
    async fn close(&self) -> Result<(), RepositoryError>;
}
