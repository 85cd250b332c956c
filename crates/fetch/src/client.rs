use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};
use url::Url;

use legalscout_core::config::{FetchSettings, PolitenessConfig, ProxyConfig};
use legalscout_core::{FetchError, FetchResponse, FetchVia, HostPolicy, Renderer};

use crate::archive::ArchiveClient;
use crate::proxy::ProxyPool;

/// Redirect policy shared by all clients: bounded hops, cycle detection by
/// URL set, and no https → http downgrades.
pub(crate) fn redirect_policy(max_hops: usize) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_hops {
            return attempt.error("too many redirect hops");
        }
        if attempt.previous().iter().any(|u| u == attempt.url()) {
            return attempt.error("redirect cycle");
        }
        let downgrade = attempt.previous().last().map(|u| u.scheme()) == Some("https")
            && attempt.url().scheme() == "http";
        if downgrade {
            return attempt.error("cross-scheme downgrade refused");
        }
        attempt.follow()
    })
}

/// Page acquisition with the direct → proxy → archive ladder.
pub struct Fetcher {
    direct: reqwest::Client,
    proxies: ProxyPool,
    archive: Option<ArchiveClient>,
    renderer: Option<Arc<dyn Renderer>>,
    settings: FetchSettings,
    jitter: Duration,
    max_host_delay: Duration,
}

impl Fetcher {
    pub fn new(
        settings: &FetchSettings,
        politeness: &PolitenessConfig,
        proxy_cfg: &ProxyConfig,
        renderer: Option<Arc<dyn Renderer>>,
    ) -> Result<Self, FetchError> {
        let request_timeout = Duration::from_secs(settings.request_timeout_seconds);
        let connect_timeout = Duration::from_secs(settings.connect_timeout_seconds);

        let direct = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .redirect(redirect_policy(settings.max_redirects))
            .build()
            .map_err(|e| FetchError::ConnectionFailed(e.to_string()))?;

        let proxies = ProxyPool::new(
            &proxy_cfg.endpoints,
            connect_timeout,
            request_timeout,
            || redirect_policy(settings.max_redirects),
            proxy_cfg.quarantine_failures,
            Duration::from_secs(proxy_cfg.quarantine_seconds),
        );

        let archive = settings
            .archive_fallback
            .then(|| ArchiveClient::new(request_timeout));

        Ok(Self {
            direct,
            proxies,
            archive,
            renderer,
            settings: settings.clone(),
            jitter: Duration::from_millis(politeness.jitter_ms),
            max_host_delay: Duration::from_millis(politeness.max_delay_ms),
        })
    }

    /// Fetch one URL under the host's politeness policy, walking the ladder
    /// until a rung succeeds or every rung is exhausted.
    pub async fn fetch(
        &self,
        url: &Url,
        policy: &mut HostPolicy,
    ) -> Result<FetchResponse, FetchError> {
        self.polite_wait(policy).await;

        // Rung 1: direct, or the host's sticky proxy binding.
        let first = match policy.proxy_binding.and_then(|idx| self.proxies.get(idx)) {
            Some(client) => {
                self.attempt(client, url, &policy.user_agent, FetchVia::Proxy)
                    .await
            }
            None => {
                self.attempt(&self.direct, url, &policy.user_agent, FetchVia::Direct)
                    .await
            }
        };

        let mut last_err = match first {
            Ok(resp) => return self.maybe_render(resp).await,
            Err(e) => {
                self.note_throttling(&e, policy);
                if !ladder_continues(&e) {
                    return Err(e);
                }
                debug!(url = %url, error = %e, "direct fetch failed, trying proxy tier");
                e
            }
        };

        // Rung 2: proxy pool with exponential backoff.
        if !self.proxies.is_empty() {
            for retry in 0..self.settings.max_retries {
                self.backoff_sleep(retry).await;
                let Some((idx, client)) = self.proxies.next() else {
                    break;
                };
                self.polite_wait(policy).await;
                match self
                    .attempt(client, url, crate::ua::pick(), FetchVia::Proxy)
                    .await
                {
                    Ok(resp) => {
                        self.proxies.record_success(idx);
                        policy.proxy_binding = Some(idx);
                        return self.maybe_render(resp).await;
                    }
                    Err(e) => {
                        self.proxies.record_failure(idx);
                        self.note_throttling(&e, policy);
                        if !ladder_continues(&e) {
                            return Err(e);
                        }
                        last_err = e;
                    }
                }
            }
        }

        // Rung 3: archive snapshot of the dead/blocked page.
        if let Some(archive) = &self.archive {
            if let Some(snapshot) = archive.latest_snapshot(url.as_str()).await {
                if let Ok(snapshot_url) = Url::parse(&snapshot) {
                    info!(url = %url, "falling back to archive snapshot");
                    match self
                        .attempt(&self.direct, &snapshot_url, &policy.user_agent, FetchVia::Archive)
                        .await
                    {
                        Ok(mut resp) => {
                            // Downstream confidence maths key off the
                            // original URL, not the archive host.
                            resp.url = url.clone();
                            return Ok(resp);
                        }
                        Err(e) => {
                            warn!(url = %url, error = %e, "archive fetch failed");
                            last_err = e;
                        }
                    }
                }
            }
        }

        Err(last_err)
    }

    /// Block until the host delay (plus jitter) has elapsed since the last
    /// outbound request to this host.
    async fn polite_wait(&self, policy: &mut HostPolicy) {
        if let Some(last) = policy.last_request_at {
            let jitter_ms = if self.jitter.as_millis() > 0 {
                rand::thread_rng().gen_range(0..self.jitter.as_millis() as u64)
            } else {
                0
            };
            let wait_until = last + policy.min_delay + Duration::from_millis(jitter_ms);
            let now = Instant::now();
            if wait_until > now {
                tokio::time::sleep(wait_until - now).await;
            }
        }
        policy.last_request_at = Some(Instant::now());
    }

    async fn backoff_sleep(&self, retry: u32) {
        let base = self.settings.backoff_base_ms as f64;
        let delay = base * self.settings.backoff_factor.powi(retry as i32);
        let delay = delay.min(self.settings.backoff_cap_ms as f64);
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }

    /// 429/503 slow the host down multiplicatively, up to the cap.
    fn note_throttling(&self, error: &FetchError, policy: &mut HostPolicy) {
        let throttled = matches!(
            error,
            FetchError::HttpClient(429) | FetchError::HttpServer(503)
        );
        if throttled {
            let doubled = policy.min_delay * 2;
            policy.min_delay = doubled.min(self.max_host_delay);
            debug!(host = %policy.host, delay_ms = policy.min_delay.as_millis() as u64, "host throttled, delay increased");
        }
    }

    async fn attempt(
        &self,
        client: &reqwest::Client,
        url: &Url,
        user_agent: &str,
        via: FetchVia,
    ) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let response = client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .header(reqwest::header::ACCEPT_LANGUAGE, "de,en;q=0.8,fr;q=0.6")
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, self.settings.request_timeout_seconds))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(FetchError::HttpClient(status.as_u16()));
        }
        if status.is_server_error() {
            return Err(FetchError::HttpServer(status.as_u16()));
        }

        let final_url = response.url().clone();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        if let Some(ct) = content_type.as_deref() {
            let allowed = self
                .settings
                .allowed_content_types
                .iter()
                .any(|a| ct.starts_with(a.as_str()));
            if !allowed && !is_document_path(final_url.path()) {
                return Err(FetchError::BlockedByPolicy(format!(
                    "content type {ct} not allowed"
                )));
            }
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.settings.max_body_bytes {
                return Err(FetchError::BodyTooLarge {
                    size: length as usize,
                    max: self.settings.max_body_bytes,
                });
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&e, self.settings.request_timeout_seconds))?;
        if body.len() > self.settings.max_body_bytes {
            return Err(FetchError::BodyTooLarge {
                size: body.len(),
                max: self.settings.max_body_bytes,
            });
        }

        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
            content_type,
            via,
            rendered: false,
            fetched_at: chrono::Utc::now(),
            response_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// First-paint render for empty or script-dominated bodies, when a
    /// renderer is wired in.
    async fn maybe_render(&self, mut resp: FetchResponse) -> Result<FetchResponse, FetchError> {
        let (empty, script_dominated) = {
            let body_str = resp.body_text();
            (body_str.trim().is_empty(), is_script_dominated(&body_str))
        };
        if !empty && !script_dominated {
            return Ok(resp);
        }
        let Some(renderer) = &self.renderer else {
            if empty {
                return Err(FetchError::Unrenderable);
            }
            return Ok(resp);
        };

        let timeout = Duration::from_secs(self.settings.request_timeout_seconds);
        match renderer.render(&resp.url, timeout).await {
            Ok(html) => {
                resp.body = html.into_bytes();
                resp.rendered = true;
                Ok(resp)
            }
            Err(e) if empty => {
                warn!(url = %resp.url, error = %e, "render failed on empty body");
                Err(FetchError::Unrenderable)
            }
            Err(e) => {
                warn!(url = %resp.url, error = %e, "render failed, keeping raw body");
                Ok(resp)
            }
        }
    }
}

/// Whether a failed rung justifies climbing to the next one. Transient
/// failures and 403s do; other 4xx are final.
fn ladder_continues(error: &FetchError) -> bool {
    error.is_transient() || matches!(error, FetchError::HttpClient(403))
}

fn map_reqwest_error(e: &reqwest::Error, timeout_secs: u64) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout_secs)
    } else if e.is_redirect() {
        FetchError::BlockedByPolicy(e.to_string())
    } else {
        FetchError::ConnectionFailed(e.to_string())
    }
}

/// Paths that are worth fetching even when the content type is not in the
/// allow list (extensionless routes and common dynamic suffixes).
fn is_document_path(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or("");
    if !last.contains('.') {
        return true;
    }
    [".html", ".htm", ".php", ".asp", ".aspx", ".jsp"]
        .iter()
        .any(|ext| last.to_lowercase().ends_with(ext))
}

/// Crude first-paint check: almost no visible text but script payloads
/// present means the page needs rendering.
fn is_script_dominated(html: &str) -> bool {
    let bytes = html.as_bytes();
    let has_script = (0..bytes.len()).any(|i| starts_with_ci(bytes, i, b"<script"));
    has_script && visible_text_len(html) < 150
}

fn starts_with_ci(haystack: &[u8], at: usize, needle: &[u8]) -> bool {
    haystack
        .get(at..at + needle.len())
        .map(|slice| slice.eq_ignore_ascii_case(needle))
        .unwrap_or(false)
}

fn visible_text_len(html: &str) -> usize {
    let bytes = html.as_bytes();
    let mut len = 0usize;
    let mut in_tag = false;
    let mut in_script = false;
    let mut idx = 0usize;

    while idx < bytes.len() {
        if in_script {
            if starts_with_ci(bytes, idx, b"</script") || starts_with_ci(bytes, idx, b"</style") {
                in_script = false;
                in_tag = true;
            }
            idx += 1;
            continue;
        }
        match bytes[idx] {
            b'<' => {
                if starts_with_ci(bytes, idx, b"<script") || starts_with_ci(bytes, idx, b"<style") {
                    in_script = true;
                } else {
                    in_tag = true;
                }
            }
            b'>' => in_tag = false,
            c if !in_tag && !c.is_ascii_whitespace() => len += 1,
            _ => {}
        }
        idx += 1;
    }
    len
}
