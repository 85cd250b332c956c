use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use legalscout_core::{HostPolicy, QueueStatus};

use crate::dns::{DnsChecker, DnsOutcome};
use crate::robots::RobotsCache;
use crate::ua;

/// Blacklist with three pattern classes: exact host, label suffix, and
/// case-insensitive substring keyword.
pub struct Blacklist {
    exact: Vec<String>,
    suffix: Vec<String>,
    keyword: Vec<String>,
}

impl Blacklist {
    pub fn new(exact: Vec<String>, suffix: Vec<String>, keyword: Vec<String>) -> Self {
        let lower = |v: Vec<String>| -> Vec<String> { v.into_iter().map(|p| p.to_lowercase()).collect() };
        Self {
            exact: lower(exact),
            suffix: lower(suffix),
            keyword: lower(keyword),
        }
    }

    pub fn matches(&self, domain: &str) -> Option<&str> {
        let host = domain.to_lowercase();
        for pattern in &self.exact {
            if host == *pattern {
                return Some(pattern);
            }
        }
        for pattern in &self.suffix {
            if host == *pattern || host.ends_with(&format!(".{pattern}")) {
                return Some(pattern);
            }
        }
        for pattern in &self.keyword {
            if host.contains(pattern.as_str()) {
                return Some(pattern);
            }
        }
        None
    }
}

#[derive(Debug)]
pub enum PreflightDecision {
    Proceed { host: String, policy: HostPolicy },
    Reject { status: QueueStatus, reason: String },
}

/// Gate keeping in decision order: blacklist, DNS (with `www.` fallback),
/// robots.txt.
pub struct Preflight {
    blacklist: Blacklist,
    dns: Arc<DnsChecker>,
    robots: RobotsCache,
    respect_robots: bool,
    min_delay: Duration,
    max_delay: Duration,
}

impl Preflight {
    pub fn new(
        blacklist: Blacklist,
        dns: Arc<DnsChecker>,
        robots: RobotsCache,
        respect_robots: bool,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            blacklist,
            dns,
            robots,
            respect_robots,
            min_delay,
            max_delay,
        }
    }

    pub async fn check(&self, domain: &str) -> PreflightDecision {
        if let Some(pattern) = self.blacklist.matches(domain) {
            info!(domain, pattern, "blacklisted");
            return PreflightDecision::Reject {
                status: QueueStatus::Blacklisted,
                reason: format!("matches blacklist pattern '{pattern}'"),
            };
        }

        let host = match self.dns.resolve_host(domain).await {
            DnsOutcome::Resolved { host } => host,
            DnsOutcome::NoSuchHost => {
                return PreflightDecision::Reject {
                    status: QueueStatus::FailedDns,
                    reason: "no A/AAAA records".to_string(),
                };
            }
            DnsOutcome::TimedOut => {
                return PreflightDecision::Reject {
                    status: QueueStatus::FailedConnection,
                    reason: "dns resolution timed out".to_string(),
                };
            }
        };

        let user_agent = ua::pick();
        let verdict = self.robots.check(&host, user_agent).await;

        if !verdict.allowed && self.respect_robots {
            return PreflightDecision::Reject {
                status: QueueStatus::BlockedRobots,
                reason: verdict.reason.unwrap_or_else(|| "Disallow: /".to_string()),
            };
        }

        // A site-declared crawl delay above our floor becomes the host
        // delay, bounded by the configured cap.
        let min_delay = verdict
            .crawl_delay
            .map(|d| d.clamp(self.min_delay, self.max_delay))
            .unwrap_or(self.min_delay);

        let mut policy = HostPolicy::new(&host, min_delay, user_agent);
        policy.robots_allowed = verdict.allowed;
        policy.robots_reason = verdict.reason;
        if !verdict.allowed {
            debug!(host, "robots disallow recorded but policy is ignore");
        }

        PreflightDecision::Proceed { host, policy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklist_exact_host() {
        let list = Blacklist::new(vec!["casino.de".into()], vec![], vec![]);
        assert!(list.matches("casino.de").is_some());
        assert!(list.matches("other.de").is_none());
        assert!(list.matches("sub.casino.de").is_none());
    }

    #[test]
    fn test_blacklist_suffix() {
        let list = Blacklist::new(vec![], vec!["doubleclick.net".into()], vec![]);
        assert!(list.matches("ads.doubleclick.net").is_some());
        assert!(list.matches("doubleclick.net.example.de").is_none());
    }

    #[test]
    fn test_blacklist_keyword_case_insensitive() {
        let list = Blacklist::new(vec![], vec![], vec!["Casino".into()]);
        assert!(list.matches("grand-CASINO-berlin.de").is_some());
        assert!(list.matches("bakery.de").is_none());
    }
}
