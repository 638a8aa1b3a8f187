//! Error types for the CDN server process

use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Discovery(service_discovery::DiscoveryError),
    Store(cdn_db::RepositoryError),
    Io(Box<std::io::Error>),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::Discovery(err) => write!(f, "Discovery error: {}", err),
            ServerError::Store(err) => write!(f, "Store error: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Discovery(err) => Some(err),
            ServerError::Store(err) => Some(err),
            ServerError::Io(err) => Some(err.as_ref()),
            ServerError::Config(_) => None,
        }
    }
}

impl From<service_discovery::DiscoveryError> for ServerError {
    fn from(err: service_discovery::DiscoveryError) -> Self {
        ServerError::Discovery(err)
    }
}

impl From<cdn_db::RepositoryError> for ServerError {
    fn from(err: cdn_db::RepositoryError) -> Self {
        ServerError::Store(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error_display() {
        let err = ServerError::Config("unknown CACHE_BACKEND: disk".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: unknown CACHE_BACKEND: disk"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn test_discovery_error_is_wrapped() {
        let err: ServerError =
            service_discovery::DiscoveryError::ServiceNotFound("postgres".to_string()).into();
        assert!(format!("{}", err).starts_with("Discovery error"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_io_error_is_wrapped() {
        let err: ServerError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken").into();
        assert!(format!("{}", err).contains("port taken"));
    }
}
