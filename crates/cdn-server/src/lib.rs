//! Content delivery server
//!
//! Serves content-addressed files from a durable store with an optional
//! cache in front, read cache-aside and populated by background write-back.

pub mod config;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod lifecycle;
pub mod limiter;
pub mod server;
pub mod sink;

pub use config::Config;
pub use error::{Result, ServerError};
pub use lifecycle::App;
