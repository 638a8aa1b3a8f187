//! Error types for service discovery

use std::fmt;

#[derive(Debug)]
pub enum DiscoveryError {
    /// No healthy instance is known for the requested service name
    ServiceNotFound(String),
    /// Discovery is turned off; registration calls are no-ops
    ServiceDisabled,
    Http(Box<reqwest::Error>),
    Registry(String),
    InvalidAddress(String),
}

impl DiscoveryError {
    /// Whether this is the non-fatal "discovery is disabled" outcome
    pub fn is_disabled(&self) -> bool {
        matches!(self, DiscoveryError::ServiceDisabled)
    }
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::ServiceNotFound(name) => {
                write!(f, "service not found: service_name={}", name)
            }
            DiscoveryError::ServiceDisabled => write!(f, "this discovery service is disabled"),
            DiscoveryError::Http(err) => write!(f, "HTTP error: {}", err),
            DiscoveryError::Registry(msg) => write!(f, "Registry error: {}", msg),
            DiscoveryError::InvalidAddress(addr) => write!(f, "Invalid address: {}", addr),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        DiscoveryError::Http(Box::new(err))
    }
}

impl From<url::ParseError> for DiscoveryError {
    fn from(err: url::ParseError) -> Self {
        DiscoveryError::InvalidAddress(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_not_found_display() {
        let err = DiscoveryError::ServiceNotFound("postgres".to_string());
        assert_eq!(format!("{}", err), "service not found: service_name=postgres");
    }

    #[test]
    fn test_disabled_is_distinguished() {
        assert!(DiscoveryError::ServiceDisabled.is_disabled());
        assert!(!DiscoveryError::Registry("boom".to_string()).is_disabled());
        assert!(!DiscoveryError::ServiceNotFound("x".to_string()).is_disabled());
    }

    #[test]
    fn test_registry_error_display() {
        let err = DiscoveryError::Registry("agent returned status 500".to_string());
        assert_eq!(
            format!("{}", err),
            "Registry error: agent returned status 500"
        );
    }
}
