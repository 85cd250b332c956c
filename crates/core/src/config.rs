use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub database: DatabaseConfig,
    pub fetch: FetchSettings,
    pub politeness: PolitenessConfig,
    pub robots: RobotsConfig,
    pub dns: DnsConfig,
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    pub validation: ValidationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    pub workers: usize,
    pub lease_ttl_seconds: u64,
    pub per_entry_deadline_seconds: u64,
    /// Base of the jittered sleep when the queue runs dry.
    #[serde(default = "default_queue_backoff")]
    pub queue_backoff_seconds: u64,
    pub stop_sentinel_path: String,
    /// Sliding window for the circuit breaker's failure rate.
    #[serde(default = "default_error_window")]
    pub error_window_seconds: u64,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
    #[serde(default = "default_breaker_pause")]
    pub breaker_pause_seconds: u64,
    /// Breaker trips beyond this count abort the run (exit code 4).
    #[serde(default = "default_breaker_budget")]
    pub breaker_recovery_budget: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub sqlite_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchSettings {
    pub request_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    pub allowed_content_types: Vec<String>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub backoff_cap_ms: u64,
    pub archive_fallback: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolitenessConfig {
    pub min_delay_ms: u64,
    pub jitter_ms: u64,
    /// Hard cap for multiplicative slow-down after 429/503.
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RobotsConfig {
    /// "respect" or "ignore". Ignoring still records the disallow reason.
    pub policy: String,
    pub cache_ttl_seconds: u64,
    pub timeout_seconds: u64,
}

impl RobotsConfig {
    pub fn respects(&self) -> bool {
        self.policy != "ignore"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DnsConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Empty list disables the proxy rung of the fetch ladder.
    pub endpoints: Vec<String>,
    #[serde(default = "default_quarantine_failures")]
    pub quarantine_failures: u32,
    #[serde(default = "default_quarantine_seconds")]
    pub quarantine_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BlacklistConfig {
    /// Exact host matches.
    #[serde(default)]
    pub exact: Vec<String>,
    /// Label-suffix matches ("doubleclick.net" blocks "ads.doubleclick.net").
    #[serde(default)]
    pub suffix: Vec<String>,
    /// Case-insensitive substring keywords.
    #[serde(default)]
    pub keyword: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    pub mx_check: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractionConfig {
    /// Extra legal-form tokens for the generic pattern family.
    #[serde(default)]
    pub extra_legal_forms: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// "strict" or "permissive".
    pub profile: String,
    pub output_dir: String,
}

fn default_queue_backoff() -> u64 { 5 }
fn default_error_window() -> u64 { 60 }
fn default_error_threshold() -> f64 { 0.75 }
fn default_breaker_pause() -> u64 { 30 }
fn default_breaker_budget() -> u32 { 3 }
fn default_quarantine_failures() -> u32 { 3 }
fn default_quarantine_seconds() -> u64 { 120 }
