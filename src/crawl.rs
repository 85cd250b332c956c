use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use rand::Rng;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;

use legalscout_core::{
    AppConfig, CrawlError, CrawlResult, Extraction, FetchError, FetchVia, QueueEntry, QueueStatus,
};
use legalscout_extract::{assemble, AssembleContext, Extractor, Validator};
use legalscout_fetch::preflight::{Blacklist, PreflightDecision};
use legalscout_fetch::{DnsChecker, Fetcher, Preflight, RobotsCache};
use legalscout_parser as parser;
use legalscout_storage::Storage;

use crate::breaker::{BreakerState, CircuitBreaker};

/// Legal-link candidates fetched per domain.
const MAX_LEGAL_CANDIDATES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlExit {
    Normal,
    StorageUnavailable,
    BreakerExhausted,
}

/// Everything a worker needs, built once and shared. Components are plain
/// values injected here; nothing global.
struct Runtime {
    config: AppConfig,
    storage: Storage,
    preflight: Preflight,
    fetcher: Fetcher,
    extractor: Extractor,
    validator: Validator,
    dns: Arc<DnsChecker>,
    breaker: CircuitBreaker,
    host_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    stop: AtomicBool,
    storage_down: AtomicBool,
    breaker_exhausted: AtomicBool,
    run_id: String,
}

fn registered_domain(domain: &str) -> String {
    let lower = domain.to_lowercase();
    lower
        .strip_prefix("www.")
        .map(str::to_string)
        .unwrap_or(lower)
}

impl Runtime {
    fn new(config: AppConfig, storage: Storage, run_id: String) -> Result<Self, CrawlError> {
        let dns = Arc::new(DnsChecker::new(Duration::from_secs(
            config.dns.timeout_seconds,
        )));
        let robots = RobotsCache::new(
            Duration::from_secs(config.robots.cache_ttl_seconds),
            Duration::from_secs(config.robots.timeout_seconds),
        );
        let blacklist = Blacklist::new(
            config.blacklist.exact.clone(),
            config.blacklist.suffix.clone(),
            config.blacklist.keyword.clone(),
        );
        let preflight = Preflight::new(
            blacklist,
            Arc::clone(&dns),
            robots,
            config.robots.respects(),
            Duration::from_millis(config.politeness.min_delay_ms),
            Duration::from_millis(config.politeness.max_delay_ms),
        );
        // No renderer wired in this build; the Fetcher degrades to raw HTTP.
        let fetcher = Fetcher::new(&config.fetch, &config.politeness, &config.proxy, None)
            .map_err(|e| CrawlError::Config(e.to_string()))?;
        let extractor = Extractor::new(config.extraction.extra_legal_forms.clone());
        let validator = Validator::new(config.validation.mx_check);
        let breaker = CircuitBreaker::new(
            Duration::from_secs(config.crawl.error_window_seconds),
            config.crawl.error_threshold,
            Duration::from_secs(config.crawl.breaker_pause_seconds),
            config.crawl.breaker_recovery_budget,
        );

        Ok(Self {
            config,
            storage,
            preflight,
            fetcher,
            extractor,
            validator,
            dns,
            breaker,
            host_locks: DashMap::new(),
            stop: AtomicBool::new(false),
            storage_down: AtomicBool::new(false),
            breaker_exhausted: AtomicBool::new(false),
            run_id,
        })
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || self.storage_down.load(Ordering::Relaxed)
    }
}

enum EntryOutcome {
    Completed(Box<CrawlResult>),
    Failed(QueueStatus),
}

fn status_for_fetch_error(error: &FetchError) -> QueueStatus {
    match error {
        FetchError::HttpClient(_) => QueueStatus::FailedHttp4xx,
        FetchError::HttpServer(_) => QueueStatus::FailedHttp5xx,
        FetchError::Unrenderable => QueueStatus::FailedExtraction,
        FetchError::ConnectionFailed(_)
        | FetchError::Timeout(_)
        | FetchError::BlockedByPolicy(_)
        | FetchError::BodyTooLarge { .. }
        | FetchError::InvalidUrl(_) => QueueStatus::FailedConnection,
    }
}

/// The per-domain pipeline: preflight, home fetch, legal-link discovery,
/// candidate fetches, three-pass extraction, validation. `observed` tracks
/// the most specific failure so the deadline handler can classify.
async fn process_entry(
    rt: &Runtime,
    entry: &QueueEntry,
    observed: &Mutex<Option<QueueStatus>>,
) -> EntryOutcome {
    let domain = entry.domain.as_str();
    let note = |status: QueueStatus| {
        if let Ok(mut slot) = observed.lock() {
            *slot = Some(status);
        }
    };

    // --- Pre-flight ---
    let (host, mut policy) = match rt.preflight.check(domain).await {
        PreflightDecision::Proceed { host, policy } => (host, policy),
        PreflightDecision::Reject { status, reason } => {
            info!(domain, status = status.as_str(), reason = %reason, "preflight rejected");
            return EntryOutcome::Failed(status);
        }
    };

    // --- Home page ---
    let home_url = match Url::parse(&format!("https://{host}/")) {
        Ok(url) => url,
        Err(_) => return EntryOutcome::Failed(QueueStatus::FailedConnection),
    };
    let home = match rt.fetcher.fetch(&home_url, &mut policy).await {
        Ok(resp) => resp,
        Err(first_err @ (FetchError::ConnectionFailed(_) | FetchError::Timeout(_))) => {
            // Some small-business sites never got TLS.
            let http_url = Url::parse(&format!("http://{host}/")).ok();
            match http_url {
                Some(url) => match rt.fetcher.fetch(&url, &mut policy).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(domain, error = %e, "home fetch failed");
                        return EntryOutcome::Failed(status_for_fetch_error(&e));
                    }
                },
                None => return EntryOutcome::Failed(status_for_fetch_error(&first_err)),
            }
        }
        Err(e) => {
            let status = status_for_fetch_error(&e);
            warn!(domain, error = %e, "home fetch failed");
            return EntryOutcome::Failed(status);
        }
    };
    note(QueueStatus::FailedExtraction);

    let home_html = home.body_text().into_owned();
    if parser::is_parked(&home_html) {
        info!(domain, "parked domain");
        return EntryOutcome::Failed(QueueStatus::Parked);
    }

    // --- Legal-page candidates ---
    let mut candidates =
        parser::discover_legal_links(&home_html, &home.final_url, MAX_LEGAL_CANDIDATES);
    if candidates.is_empty() {
        candidates.push(home.final_url.clone());
    }

    let mut last_fetch_status: Option<QueueStatus> = None;
    let mut saw_content = false;
    for candidate in candidates {
        let (page_html, via, source_url) = if candidate == home.final_url {
            (home_html.clone(), home.via, home.final_url.clone())
        } else {
            match rt.fetcher.fetch(&candidate, &mut policy).await {
                Ok(resp) => {
                    let html = resp.body_text().into_owned();
                    (html, resp.via, resp.final_url.clone())
                }
                Err(e) => {
                    debug!(domain, url = %candidate, error = %e, "candidate fetch failed");
                    let status = status_for_fetch_error(&e);
                    note(status);
                    last_fetch_status = Some(status);
                    continue;
                }
            }
        };

        let text = parser::isolate_legal_text(&page_html);
        if text.trim().is_empty() {
            continue;
        }
        saw_content = true;

        let mut passes: Vec<Extraction> = Vec::new();
        if let Some(structured) = parser::extract_structured(&page_html) {
            passes.push(structured);
        }
        let (country, pattern_passes) = rt.extractor.run_passes(&text, domain);
        passes.extend(pattern_passes);

        let ctx = AssembleContext {
            domain,
            legal_source_url: source_url.as_str(),
            run_id: &rt.run_id,
            from_archive: via == FetchVia::Archive,
            robots_allowed: policy.robots_allowed,
            robots_reason: policy.robots_reason.clone(),
        };
        let mut result = assemble(&passes, &ctx);

        let label = legalscout_extract::domain_label(domain);
        let mx = rt
            .config
            .validation
            .mx_check
            .then(|| rt.dns.as_ref() as &dyn legalscout_core::MxResolver);
        let valid = rt
            .validator
            .validate(&mut result, country, &label, mx)
            .await;

        if valid {
            info!(
                domain,
                source_url = %source_url,
                confidence = result.confidence,
                "extraction complete"
            );
            return EntryOutcome::Completed(Box::new(result));
        }
        debug!(domain, url = %source_url, "no validated legal name on candidate");
    }

    // Nothing extractable. Content with no validated legal name is an
    // extraction failure; otherwise surface the last fetch failure.
    if saw_content {
        EntryOutcome::Failed(QueueStatus::FailedExtraction)
    } else {
        EntryOutcome::Failed(last_fetch_status.unwrap_or(QueueStatus::FailedExtraction))
    }
}

async fn apply_outcome(rt: &Runtime, domain: &str, outcome: EntryOutcome) -> Result<bool, CrawlError> {
    match outcome {
        EntryOutcome::Completed(result) => {
            rt.storage
                .complete(domain, &result, QueueStatus::Completed)
                .await?;
            Ok(true)
        }
        EntryOutcome::Failed(status) => {
            rt.storage.fail(domain, status).await?;
            Ok(false)
        }
    }
}

async fn worker_loop(rt: Arc<Runtime>, worker_id: usize) {
    let lease_ttl = Duration::from_secs(rt.config.crawl.lease_ttl_seconds);
    let deadline = Duration::from_secs(rt.config.crawl.per_entry_deadline_seconds);
    let backoff = rt.config.crawl.queue_backoff_seconds;

    info!(worker_id, "worker started");
    loop {
        if rt.stopping() {
            break;
        }

        match rt.breaker.state() {
            BreakerState::Exhausted => {
                error!(worker_id, "circuit breaker beyond recovery budget");
                rt.breaker_exhausted.store(true, Ordering::Relaxed);
                rt.stop.store(true, Ordering::Relaxed);
                break;
            }
            BreakerState::Open(remaining) => {
                tokio::time::sleep(remaining.min(Duration::from_secs(2))).await;
                continue;
            }
            BreakerState::HalfOpen => {
                // Recover at half concurrency.
                if worker_id % 2 == 1 {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }
            BreakerState::Closed => {}
        }

        let entries = match rt.storage.lease(1, lease_ttl).await {
            Ok(entries) => entries,
            Err(CrawlError::StorageUnavailable(e)) => {
                error!(worker_id, error = %e, "storage unavailable, halting leases");
                rt.storage_down.store(true, Ordering::Relaxed);
                break;
            }
            Err(e) => {
                warn!(worker_id, error = %e, "lease failed");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                continue;
            }
        };

        let Some(entry) = entries.into_iter().next() else {
            // Queue dry: jittered backoff.
            let jitter = rand::thread_rng().gen_range(0..=backoff.max(1) * 500);
            tokio::time::sleep(Duration::from_secs(backoff) + Duration::from_millis(jitter)).await;
            continue;
        };

        // Per-host serialisation: defer the entry when another worker holds
        // the host.
        let host_key = registered_domain(&entry.domain);
        let lock = rt
            .host_locks
            .entry(host_key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let Ok(_guard) = lock.try_lock_owned() else {
            debug!(worker_id, domain = %entry.domain, "host busy, deferring");
            if let Err(e) = rt.storage.release(&entry.domain).await {
                warn!(domain = %entry.domain, error = %e, "release failed");
            }
            continue;
        };

        let observed = Mutex::new(None);
        let outcome = match tokio::time::timeout(deadline, process_entry(&rt, &entry, &observed)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                let status = observed
                    .lock()
                    .ok()
                    .and_then(|slot| *slot)
                    .unwrap_or(QueueStatus::FailedConnection);
                warn!(domain = %entry.domain, status = status.as_str(), "entry deadline exceeded");
                EntryOutcome::Failed(status)
            }
        };

        match apply_outcome(&rt, &entry.domain, outcome).await {
            Ok(success) => rt.breaker.record(success),
            Err(CrawlError::StorageUnavailable(e)) => {
                // The lease TTL will re-surface this entry.
                error!(domain = %entry.domain, error = %e, "storage unavailable mid-commit");
                rt.storage_down.store(true, Ordering::Relaxed);
                break;
            }
            Err(e) => {
                warn!(domain = %entry.domain, error = %e, "commit failed");
                rt.breaker.record(false);
            }
        }
    }
    info!(worker_id, "worker stopped");
}

/// Watch for the stop sentinel file and OS signals.
async fn stop_watcher(rt: Arc<Runtime>, mut shutdown: broadcast::Receiver<()>) {
    let sentinel = rt.config.crawl.stop_sentinel_path.clone();
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(Duration::from_secs(2)) => {
                if !sentinel.is_empty() && Path::new(&sentinel).exists() {
                    info!(path = %sentinel, "stop sentinel present, draining");
                    rt.stop.store(true, Ordering::Relaxed);
                    break;
                }
                if rt.stopping() {
                    break;
                }
            }
        }
    }
}

pub async fn run_crawl(config: AppConfig, workers_override: Option<usize>) -> Result<CrawlExit> {
    let workers = workers_override.unwrap_or(config.crawl.workers).max(1);
    let pool_size = (workers as u32 + 2).max(5);
    let storage = Storage::with_pool_size(&config.database.sqlite_url, pool_size).await?;
    storage.run_migrations().await?;

    let run_id = uuid::Uuid::new_v4().to_string();
    info!(run_id = %run_id, workers, "starting crawl");

    let rt = Arc::new(Runtime::new(config, storage, run_id)?);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let watcher = tokio::spawn(stop_watcher(Arc::clone(&rt), shutdown_tx.subscribe()));

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        handles.push(tokio::spawn(worker_loop(Arc::clone(&rt), worker_id)));
    }
    let mut workers_done = tokio::spawn(async move {
        for handle in handles {
            let _ = handle.await;
        }
    });

    // Workers drain on Ctrl+C; a second signal is left to the OS default.
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("shutdown signal received, finishing in-flight entries");
            rt.stop.store(true, Ordering::Relaxed);
            let _ = (&mut workers_done).await;
        }
        _ = &mut workers_done => {}
    }
    rt.stop.store(true, Ordering::Relaxed);
    let _ = shutdown_tx.send(());
    let _ = watcher.await;

    if rt.storage_down.load(Ordering::Relaxed) {
        return Ok(CrawlExit::StorageUnavailable);
    }
    if rt.breaker_exhausted.load(Ordering::Relaxed) {
        return Ok(CrawlExit::BreakerExhausted);
    }
    info!("crawl finished");
    Ok(CrawlExit::Normal)
}
