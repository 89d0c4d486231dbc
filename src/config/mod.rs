//! Configuration loading and validation.
//!
//! The proxy is configured once at start-up from a TOML file. Environment
//! variables referenced as `${VAR}` are expanded before parsing. There is
//! no live-reload path: every value here is static for the process
//! lifetime.

pub mod engine;
pub mod tenants;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::info;

pub use engine::{EngineConfig, Policy};
pub use tenants::{ServerDescriptor, TenantConfig, TenantRouter};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// Selection and dispatch engine tunables
    #[serde(default)]
    pub engine: EngineConfig,
    /// Hostname-to-backend-set mappings
    pub tenants: Vec<TenantConfig>,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:8080"
    pub bind: String,
}

impl Config {
    /// Load configuration from file with environment variable expansion
    pub async fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let expanded = expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;

        info!("Configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }

    /// Parse configuration from an in-memory TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!(
                "Invalid bind address: {}",
                self.server.bind
            ));
        }

        self.engine.validate()?;

        if self.tenants.is_empty() {
            return Err(anyhow::anyhow!("At least one tenant must be configured"));
        }
        for tenant in &self.tenants {
            tenant.validate()?;
        }

        Ok(())
    }
}

/// Expand `${VAR}` references from the process environment.
/// Unknown variables are left untouched so validation reports them in place.
fn expand_env_vars(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        match rest[start..].find('}') {
            Some(end) => {
                let var_name = &rest[start + 2..start + end];
                match env::var(var_name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => result.push_str(&rest[start..start + end + 1]),
                }
                rest = &rest[start + end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}
