use std::time::{Duration, Instant};

use dashmap::DashMap;
use texting_robots::Robot;
use tracing::debug;

/// Robots decision for a host, evaluated for the configured user-agent
/// against the site root.
#[derive(Debug, Clone)]
pub struct RobotsVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub crawl_delay: Option<Duration>,
}

impl RobotsVerdict {
    fn allow_all() -> Self {
        Self {
            allowed: true,
            reason: None,
            crawl_delay: None,
        }
    }
}

/// Evaluate a robots.txt body. Unparseable bodies count as "no rules".
pub fn evaluate_robots(body: &str, user_agent: &str) -> RobotsVerdict {
    let robot = match Robot::new(user_agent, body.as_bytes()) {
        Ok(robot) => robot,
        Err(e) => {
            debug!(error = %e, "robots.txt unparseable, allowing");
            return RobotsVerdict::allow_all();
        }
    };

    let allowed = robot.allowed("/");
    let reason = if allowed {
        None
    } else {
        Some(matched_disallow(body, user_agent).unwrap_or_else(|| "Disallow: /".to_string()))
    };
    RobotsVerdict {
        allowed,
        reason,
        crawl_delay: robot.delay.map(|s| Duration::from_secs_f32(s)),
    }
}

/// Recover the literal `Disallow:` rule that blocks the root path, for the
/// `robots_reason` column. The allow/deny decision itself belongs to the
/// parser above; this is only bookkeeping.
fn matched_disallow(body: &str, user_agent: &str) -> Option<String> {
    let ua_lower = user_agent.to_lowercase();
    let mut group_applies = false;
    let mut seen_rule_in_group = false;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                // A new agent line after rules starts a fresh group.
                if seen_rule_in_group {
                    group_applies = false;
                    seen_rule_in_group = false;
                }
                let agent = value.to_lowercase();
                if agent == "*" || ua_lower.contains(&agent) {
                    group_applies = true;
                }
            }
            "disallow" => {
                seen_rule_in_group = true;
                if group_applies && !value.is_empty() && "/".starts_with(value) {
                    return Some(format!("Disallow: {value}"));
                }
            }
            _ => seen_rule_in_group = true,
        }
    }
    None
}

struct CachedVerdict {
    fetched_at: Instant,
    verdict: RobotsVerdict,
}

/// Per-host robots cache with TTL. Stale entries are refreshed on access,
/// which in practice means on lease.
pub struct RobotsCache {
    client: reqwest::Client,
    cache: DashMap<String, CachedVerdict>,
    ttl: Duration,
    timeout: Duration,
}

impl RobotsCache {
    pub fn new(ttl: Duration, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .unwrap_or_default();
        Self {
            client,
            cache: DashMap::new(),
            ttl,
            timeout,
        }
    }

    pub async fn check(&self, host: &str, user_agent: &str) -> RobotsVerdict {
        if let Some(cached) = self.cache.get(host) {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.verdict.clone();
            }
        }

        let verdict = match self.fetch_robots(host, user_agent).await {
            Some(body) => evaluate_robots(&body, user_agent),
            // 4xx or unreachable: no rules, allow.
            None => RobotsVerdict::allow_all(),
        };

        self.cache.insert(
            host.to_string(),
            CachedVerdict {
                fetched_at: Instant::now(),
                verdict: verdict.clone(),
            },
        );
        verdict
    }

    async fn fetch_robots(&self, host: &str, user_agent: &str) -> Option<String> {
        for scheme in ["https", "http"] {
            let url = format!("{scheme}://{host}/robots.txt");
            let response = self
                .client
                .get(&url)
                .header(reqwest::header::USER_AGENT, user_agent)
                .timeout(self.timeout)
                .send()
                .await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().await.ok();
                }
                Ok(resp) => {
                    debug!(host, status = resp.status().as_u16(), "robots.txt not available");
                    return None;
                }
                Err(e) => {
                    debug!(host, scheme, error = %e, "robots.txt fetch failed");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) LegalScout/0.1";

    #[test]
    fn test_disallow_all_blocks_root() {
        let verdict = evaluate_robots("User-agent: *\nDisallow: /", UA);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason.as_deref(), Some("Disallow: /"));
    }

    #[test]
    fn test_empty_disallow_allows() {
        let verdict = evaluate_robots("User-agent: *\nDisallow:", UA);
        assert!(verdict.allowed);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn test_unrelated_group_does_not_block() {
        let body = "User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nDisallow: /private/";
        let verdict = evaluate_robots(body, UA);
        assert!(verdict.allowed);
    }

    #[test]
    fn test_crawl_delay_is_surfaced() {
        let verdict = evaluate_robots("User-agent: *\nCrawl-delay: 4\nDisallow: /private/", UA);
        assert!(verdict.allowed);
        assert_eq!(verdict.crawl_delay, Some(Duration::from_secs(4)));
    }
}
