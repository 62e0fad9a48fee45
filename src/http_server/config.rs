//! Backup API listener settings
//!
//! The port defaults to 3001, the port the consent redirect URI points at.
//! CORS origins are the dashboards allowed to call the API from a browser.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

use crate::policy::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// IP address to bind, or `localhost`
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed browser origins; empty allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn parse_origin(origin: &str) -> Result<HeaderValue, ConfigError> {
    let scheme_ok = origin.starts_with("http://") || origin.starts_with("https://");
    if !scheme_ok || origin.ends_with('/') {
        return Err(ConfigError::Invalid(format!(
            "cors origin '{}' must look like http(s)://host[:port]",
            origin
        )));
    }
    HeaderValue::from_str(origin)
        .map_err(|e| ConfigError::Invalid(format!("cors origin '{}': {}", origin, e)))
}

impl HttpServerConfig {
    /// Address the listener binds to
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = if self.host == "localhost" {
            Ipv4Addr::LOCALHOST.into()
        } else {
            self.host.parse().map_err(|_| {
                ConfigError::Invalid(format!("http host '{}' is not an IP address", self.host))
            })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Origins as header values. Unusable entries are skipped; `validate`
    /// reports them.
    pub fn allowed_origins(&self) -> Vec<HeaderValue> {
        self.cors_origins
            .iter()
            .filter_map(|origin| parse_origin(origin).ok())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("http port must not be 0".to_string()));
        }
        self.bind_addr()?;
        for origin in &self.cors_origins {
            parse_origin(origin)?;
        }
        Ok(())
    }
}
