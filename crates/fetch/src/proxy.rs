use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Round-robin proxy pool with failure scoring. An endpoint that fails
/// `quarantine_failures` times in a row is benched for the cooldown and
/// then given another chance.
pub struct ProxyPool {
    entries: Vec<ProxyEntry>,
    counter: AtomicUsize,
    quarantine_failures: u32,
    quarantine: Duration,
}

struct ProxyEntry {
    endpoint: String,
    client: reqwest::Client,
    failures: AtomicU32,
    quarantined_until: Mutex<Option<Instant>>,
}

impl ProxyEntry {
    fn is_quarantined(&self) -> bool {
        let mut guard = match self.quarantined_until.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match *guard {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *guard = None;
                false
            }
            None => false,
        }
    }
}

impl ProxyPool {
    pub fn new(
        endpoints: &[String],
        connect_timeout: Duration,
        request_timeout: Duration,
        redirect_policy: impl Fn() -> reqwest::redirect::Policy,
        quarantine_failures: u32,
        quarantine: Duration,
    ) -> Self {
        let mut entries = Vec::new();
        for endpoint in endpoints {
            let proxy = match reqwest::Proxy::all(endpoint.clone()) {
                Ok(proxy) => proxy,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "skipping unusable proxy endpoint");
                    continue;
                }
            };
            match reqwest::Client::builder()
                .proxy(proxy)
                .cookie_store(true)
                .connect_timeout(connect_timeout)
                .timeout(request_timeout)
                .redirect(redirect_policy())
                .build()
            {
                Ok(client) => entries.push(ProxyEntry {
                    endpoint: endpoint.clone(),
                    client,
                    failures: AtomicU32::new(0),
                    quarantined_until: Mutex::new(None),
                }),
                Err(e) => warn!(endpoint = %endpoint, error = %e, "skipping proxy endpoint"),
            }
        }
        Self {
            entries,
            counter: AtomicUsize::new(0),
            quarantine_failures,
            quarantine,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Next healthy endpoint in rotation, if any.
    pub fn next(&self) -> Option<(usize, &reqwest::Client)> {
        if self.entries.is_empty() {
            return None;
        }
        for _ in 0..self.entries.len() {
            let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.entries.len();
            let entry = &self.entries[idx];
            if !entry.is_quarantined() {
                return Some((idx, &entry.client));
            }
        }
        None
    }

    /// A specific endpoint, honoured only while it is healthy.
    pub fn get(&self, idx: usize) -> Option<&reqwest::Client> {
        let entry = self.entries.get(idx)?;
        if entry.is_quarantined() {
            None
        } else {
            Some(&entry.client)
        }
    }

    pub fn record_success(&self, idx: usize) {
        if let Some(entry) = self.entries.get(idx) {
            entry.failures.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, idx: usize) {
        let Some(entry) = self.entries.get(idx) else {
            return;
        };
        let failures = entry.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.quarantine_failures {
            debug!(endpoint = %entry.endpoint, failures, "quarantining proxy");
            let mut guard = match entry.quarantined_until.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Some(Instant::now() + self.quarantine);
            entry.failures.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(endpoints: &[&str]) -> ProxyPool {
        let endpoints: Vec<String> = endpoints.iter().map(|s| s.to_string()).collect();
        ProxyPool::new(
            &endpoints,
            Duration::from_secs(5),
            Duration::from_secs(10),
            || reqwest::redirect::Policy::limited(5),
            2,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_round_robin_rotation() {
        let pool = test_pool(&["http://proxy1:8080", "http://proxy2:8080"]);
        let (a, _) = pool.next().unwrap();
        let (b, _) = pool.next().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_quarantine_after_failures() {
        let pool = test_pool(&["http://proxy1:8080"]);
        pool.record_failure(0);
        assert!(pool.next().is_some());
        pool.record_failure(0);
        assert!(pool.next().is_none());
        assert!(pool.get(0).is_none());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let pool = test_pool(&["http://proxy1:8080"]);
        pool.record_failure(0);
        pool.record_success(0);
        pool.record_failure(0);
        // One failure since the last success: still healthy.
        assert!(pool.next().is_some());
    }
}
