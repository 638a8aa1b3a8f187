//! Storage layer for the content delivery service
//!
//! One [`FileRepository`] contract, implemented by a durable Postgres store
//! and by volatile caches (Redis or in-process). Handlers only talk to a
//! [`StoreController`], which folds backend errors into [`StoreError`].

pub mod controller;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod redis_cache;
pub mod repository;
pub mod types;

pub use controller::StoreController;
pub use error::{RepositoryError, StoreError};
pub use memory::MemoryCacheRepository;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;
pub use redis_cache::RedisRepository;
pub use repository::FileRepository;
pub use types::*;
