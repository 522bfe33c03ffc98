//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Result, ServerError};

/// Default bind address (`127.0.0.1:5050`).
pub const DEFAULT_BIND_ADDRESS: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    5050,
);

/// Default lifetime of stored approval decisions (15 minutes).
pub const DEFAULT_APPROVAL_TTL: Duration = Duration::from_secs(900);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// CORS allowed origins (empty = no CORS, `*` = any origin).
    pub cors_origins: Vec<String>,

    /// How long approval decisions stay in the store after their last use.
    pub approval_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            cors_origins: Vec::new(),
            approval_ttl: DEFAULT_APPROVAL_TTL,
        }
    }
}

impl ServerConfig {
    /// Create a server config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[server]` section of the config file.
    pub fn from_section(section: &querypilot_config::ServerConfig) -> Result<Self> {
        let bind_address = section.effective_bind().parse().map_err(|e| {
            ServerError::Config(format!("invalid bind address '{}': {}", section.effective_bind(), e))
        })?;

        Ok(Self {
            bind_address,
            cors_origins: section.effective_cors_origins().to_vec(),
            approval_ttl: Duration::from_secs(section.effective_approval_ttl_secs()),
        })
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set CORS allowed origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Set the approval store TTL.
    pub fn with_approval_ttl(mut self, ttl: Duration) -> Self {
        self.approval_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:5050");
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.approval_ttl, Duration::from_secs(900));
    }

    #[test]
    fn test_from_section() {
        let section = querypilot_config::ServerConfig {
            bind: Some("0.0.0.0:9000".to_string()),
            approval_ttl_secs: Some(60),
            cors_origins: Some(vec!["http://localhost:3000".to_string()]),
        };
        let config = ServerConfig::from_section(&section).unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.approval_ttl, Duration::from_secs(60));
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_from_empty_section_uses_defaults() {
        let config = ServerConfig::from_section(&querypilot_config::ServerConfig::default()).unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.approval_ttl, DEFAULT_APPROVAL_TTL);
    }
}
