use serde::{Deserialize, Serialize};

fn default_weight() -> u32 {
    50
}

/// One backend server inside a tenant's set
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerDescriptor {
    /// Identifier used for health records and logs
    pub name: String,
    /// Network target. An authority like "backend-a.internal:8443", with an
    /// optional explicit "http://" or "https://" prefix; https otherwise.
    pub host: String,
    /// Static selection weight, 0-100
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl ServerDescriptor {
    /// Validate the descriptor
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("Server name cannot be empty"));
        }

        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.weight > 100 {
            return Err(anyhow::anyhow!(
                "Server weight must be within 0-100: {} has {}",
                self.name,
                self.weight
            ));
        }

        Ok(())
    }

    /// Base URL for outbound calls: an explicit scheme on `host` is kept,
    /// everything else goes out as https.
    pub fn base_url(&self) -> String {
        if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        }
    }
}

/// One hostname and its ordered set of backend servers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenantConfig {
    /// Exact hostname or "*.domain" wildcard, matched without the port
    pub hostname: String,
    /// Ordered server set; position is the static failover order
    pub servers: Vec<ServerDescriptor>,
}

impl TenantConfig {
    /// Validate the tenant
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hostname.is_empty() {
            return Err(anyhow::anyhow!("Tenant hostname cannot be empty"));
        }

        if self.servers.is_empty() {
            return Err(anyhow::anyhow!(
                "Tenant {} must configure at least one server",
                self.hostname
            ));
        }

        for server in &self.servers {
            server.validate()?;
        }

        Ok(())
    }
}

/// Pure hostname-to-server-set lookup.
///
/// Resolution strips any port from the inbound Host header, then checks
/// tenants in configured order: exact hostnames first-match, and
/// "*.domain" patterns match the domain itself and any subdomain depth.
#[derive(Debug, Clone)]
pub struct TenantRouter {
    tenants: Vec<TenantConfig>,
}

impl TenantRouter {
    pub fn new(tenants: Vec<TenantConfig>) -> Self {
        Self { tenants }
    }

    /// Resolve the server set for an inbound Host header value
    pub fn resolve(&self, host: &str) -> Option<&[ServerDescriptor]> {
        let host = host.split(':').next().unwrap_or(host);
        self.tenants
            .iter()
            .find(|t| matches_hostname(host, &t.hostname))
            .map(|t| t.servers.as_slice())
    }
}

fn matches_hostname(host: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if suffix.is_empty() {
            return false;
        }
        host == suffix || host.ends_with(&format!(".{}", suffix))
    } else {
        host == pattern
    }
}
