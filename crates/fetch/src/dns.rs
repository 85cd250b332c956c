use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use tracing::debug;

use legalscout_core::MxResolver;

/// Outcome of the pre-flight resolution step. `Resolved` carries the host
/// that actually answered, which may be the `www.` label when the apex
/// does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    Resolved { host: String },
    NoSuchHost,
    TimedOut,
}

pub struct DnsChecker {
    resolver: TokioResolver,
    timeout: Duration,
}

impl DnsChecker {
    pub fn new(timeout: Duration) -> Self {
        let resolver = match TokioResolver::builder_tokio() {
            Ok(builder) => builder.build(),
            // No usable system config: fall back to the default upstreams.
            Err(_) => TokioResolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
            .build(),
        };
        Self { resolver, timeout }
    }

    /// One lookup bounded by the configured timeout. Ok(true) = records
    /// found, Ok(false) = resolution answered negatively, Err = timed out.
    async fn lookup_once(&self, host: &str) -> Result<bool, ()> {
        match tokio::time::timeout(self.timeout, self.resolver.lookup_ip(host)).await {
            Ok(Ok(lookup)) => Ok(lookup.iter().next().is_some()),
            Ok(Err(e)) => {
                debug!(host, error = %e, "dns lookup failed");
                Ok(false)
            }
            Err(_) => Err(()),
        }
    }

    /// Resolve A/AAAA with one retry, then once more with the `www.` label
    /// before classifying the domain as dead.
    pub async fn resolve_host(&self, domain: &str) -> DnsOutcome {
        for attempt in 0..2 {
            match self.lookup_once(domain).await {
                Ok(true) => return DnsOutcome::Resolved { host: domain.to_string() },
                Ok(false) if attempt == 0 => continue,
                Ok(false) => break,
                Err(()) => return DnsOutcome::TimedOut,
            }
        }

        if !domain.starts_with("www.") {
            let www = format!("www.{domain}");
            match self.lookup_once(&www).await {
                Ok(true) => return DnsOutcome::Resolved { host: www },
                Ok(false) => {}
                Err(()) => return DnsOutcome::TimedOut,
            }
        }
        DnsOutcome::NoSuchHost
    }
}

#[async_trait]
impl MxResolver for DnsChecker {
    async fn has_mx(&self, domain: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.resolver.mx_lookup(domain)).await {
            Ok(Ok(lookup)) => lookup.iter().next().is_some(),
            _ => false,
        }
    }
}
