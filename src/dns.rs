use std::net::IpAddr;
use std::time::Duration;

use trust_dns_resolver::TokioAsyncResolver;

use crate::error::PingError;

/// Resolves ping targets to an address. IP literals skip DNS entirely.
pub struct HostResolver {
    resolver: Option<TokioAsyncResolver>,
    timeout: Duration,
}

impl HostResolver {
    /// Uses the system resolver configuration. Without one only IP literals resolve.
    pub fn from_system_conf(timeout: Duration) -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                log::warn!("System DNS configuration unavailable, only IP targets can be pinged: {}", e);
                None
            }
        };
        Self { resolver, timeout }
    }

    pub async fn resolve(&self, host: &str) -> Result<IpAddr, PingError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(PingError::InvalidHost(host.to_string()));
        }

        let resolver = self.resolver.as_ref().ok_or_else(|| PingError::Resolve {
            host: host.to_string(),
            reason: "no DNS resolver configured".to_string(),
        })?;

        match tokio::time::timeout(self.timeout, resolver.lookup_ip(host)).await {
            Ok(Ok(lookup)) => lookup.iter().next().ok_or_else(|| PingError::Resolve {
                host: host.to_string(),
                reason: "no addresses found".to_string(),
            }),
            Ok(Err(e)) => Err(PingError::Resolve {
                host: host.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(PingError::Resolve {
                host: host.to_string(),
                reason: format!("lookup timed out after {:?}", self.timeout),
            }),
        }
    }
}
