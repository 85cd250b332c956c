use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::country::Country;
use crate::error::FetchError;

/// Queue lifecycle. PENDING entries (and PROCESSING entries whose lease
/// expired) are lease-eligible; everything else is terminal until `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    FailedDns,
    BlockedRobots,
    Blacklisted,
    Parked,
    FailedHttp4xx,
    FailedHttp5xx,
    FailedConnection,
    FailedExtraction,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Processing => "PROCESSING",
            QueueStatus::Completed => "COMPLETED",
            QueueStatus::FailedDns => "FAILED_DNS",
            QueueStatus::BlockedRobots => "BLOCKED_ROBOTS",
            QueueStatus::Blacklisted => "BLACKLISTED",
            QueueStatus::Parked => "PARKED",
            QueueStatus::FailedHttp4xx => "FAILED_HTTP_4XX",
            QueueStatus::FailedHttp5xx => "FAILED_HTTP_5XX",
            QueueStatus::FailedConnection => "FAILED_CONNECTION",
            QueueStatus::FailedExtraction => "FAILED_EXTRACTION",
        }
    }

    pub fn parse(s: &str) -> Option<QueueStatus> {
        match s {
            "PENDING" => Some(QueueStatus::Pending),
            "PROCESSING" => Some(QueueStatus::Processing),
            "COMPLETED" => Some(QueueStatus::Completed),
            "FAILED_DNS" => Some(QueueStatus::FailedDns),
            "BLOCKED_ROBOTS" => Some(QueueStatus::BlockedRobots),
            "BLACKLISTED" => Some(QueueStatus::Blacklisted),
            "PARKED" => Some(QueueStatus::Parked),
            "FAILED_HTTP_4XX" => Some(QueueStatus::FailedHttp4xx),
            "FAILED_HTTP_5XX" => Some(QueueStatus::FailedHttp5xx),
            "FAILED_CONNECTION" => Some(QueueStatus::FailedConnection),
            "FAILED_EXTRACTION" => Some(QueueStatus::FailedExtraction),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueueStatus::Pending | QueueStatus::Processing)
    }

    /// Terminal failure statuses that `reset` moves back to PENDING.
    pub fn is_resettable(&self) -> bool {
        self.is_terminal() && *self != QueueStatus::Completed
    }
}

/// One row per known domain.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub domain: String,
    pub source: String,
    pub status: QueueStatus,
    pub attempts: i64,
    pub lease_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Which extraction pass produced a field value. Merge priority is the
/// declaration order: structured beats pattern beats generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldSource {
    Structured,
    Pattern,
    Generic,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSource::Structured => "structured",
            FieldSource::Pattern => "pattern",
            FieldSource::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<FieldSource> {
        match s {
            "structured" => Some(FieldSource::Structured),
            "pattern" => Some(FieldSource::Pattern),
            "generic" => Some(FieldSource::Generic),
            _ => None,
        }
    }

    /// Lower rank wins on merge.
    pub fn rank(&self) -> u8 {
        match self {
            FieldSource::Structured => 0,
            FieldSource::Pattern => 1,
            FieldSource::Generic => 2,
        }
    }
}

/// A validated field value with its provenance and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field<T> {
    pub value: T,
    pub source: FieldSource,
    pub confidence: f64,
}

impl<T> Field<T> {
    pub fn new(value: T, source: FieldSource, confidence: f64) -> Self {
        Self { value, source, confidence }
    }
}

pub type TextField = Field<String>;

/// The immutable extraction record, at most one per domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub domain: String,
    pub legal_source_url: String,
    pub run_id: String,
    pub crawled_at: chrono::DateTime<chrono::Utc>,

    pub legal_name: Option<TextField>,
    pub legal_form: Option<TextField>,
    pub registration_number: Option<TextField>,
    pub register_court: Option<TextField>,
    pub register_type: Option<TextField>,
    pub vat_id: Option<TextField>,

    pub street: Option<TextField>,
    pub postal_code: Option<TextField>,
    pub city: Option<TextField>,
    pub country: Option<TextField>,

    pub ceo: Option<TextField>,
    pub directors: Option<Field<Vec<String>>>,

    pub emails: Option<Field<BTreeSet<String>>>,
    pub phones: Option<Field<BTreeSet<String>>>,
    pub fax: Option<TextField>,

    pub robots_allowed: bool,
    pub robots_reason: Option<String>,

    pub confidence: f64,
}

impl CrawlResult {
    pub fn new(domain: &str, legal_source_url: &str, run_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            legal_source_url: legal_source_url.to_string(),
            run_id: run_id.to_string(),
            crawled_at: chrono::Utc::now(),
            legal_name: None,
            legal_form: None,
            registration_number: None,
            register_court: None,
            register_type: None,
            vat_id: None,
            street: None,
            postal_code: None,
            city: None,
            country: None,
            ceo: None,
            directors: None,
            emails: None,
            phones: None,
            fax: None,
            robots_allowed: true,
            robots_reason: None,
            confidence: 0.0,
        }
    }

    fn present_confidences(&self) -> Vec<f64> {
        let mut out = Vec::new();
        macro_rules! push {
            ($f:expr) => {
                if let Some(field) = &$f {
                    out.push(field.confidence);
                }
            };
        }
        push!(self.legal_name);
        push!(self.legal_form);
        push!(self.registration_number);
        push!(self.register_court);
        push!(self.register_type);
        push!(self.vat_id);
        push!(self.street);
        push!(self.postal_code);
        push!(self.city);
        push!(self.country);
        push!(self.ceo);
        push!(self.directors);
        push!(self.emails);
        push!(self.phones);
        push!(self.fax);
        out
    }

    /// Arithmetic mean over the confidences of present fields.
    pub fn recompute_confidence(&mut self) {
        let confs = self.present_confidences();
        self.confidence = if confs.is_empty() {
            0.0
        } else {
            confs.iter().sum::<f64>() / confs.len() as f64
        };
    }

    /// The strict export profile requires name plus a complete address.
    pub fn has_mandatory_fields(&self) -> bool {
        self.legal_name.is_some()
            && self.street.is_some()
            && self.postal_code.is_some()
            && self.city.is_some()
            && self.country.is_some()
    }
}

/// Unvalidated candidate values emitted by one extraction pass. All values in
/// a bag share the pass's source tag and base confidence.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub legal_name: Option<String>,
    pub legal_form: Option<String>,
    pub registration_number: Option<String>,
    pub register_court: Option<String>,
    pub register_type: Option<String>,
    pub vat_id: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<Country>,
    pub ceo: Option<String>,
    pub directors: Vec<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub fax: Option<String>,
    pub source: Option<FieldSource>,
    pub confidence: f64,
}

impl Extraction {
    pub fn with_source(source: FieldSource, confidence: f64) -> Self {
        Self {
            source: Some(source),
            confidence,
            ..Default::default()
        }
    }

    pub fn populated_count(&self) -> usize {
        let mut n = 0;
        n += self.legal_name.is_some() as usize;
        n += self.legal_form.is_some() as usize;
        n += self.registration_number.is_some() as usize;
        n += self.register_court.is_some() as usize;
        n += self.register_type.is_some() as usize;
        n += self.vat_id.is_some() as usize;
        n += self.street.is_some() as usize;
        n += self.postal_code.is_some() as usize;
        n += self.city.is_some() as usize;
        n += self.country.is_some() as usize;
        n += self.ceo.is_some() as usize;
        n += (!self.directors.is_empty()) as usize;
        n += (!self.emails.is_empty()) as usize;
        n += (!self.phones.is_empty()) as usize;
        n += self.fax.is_some() as usize;
        n
    }

    pub fn is_empty(&self) -> bool {
        self.populated_count() == 0
    }
}

/// Per-host state held only while the domain is PROCESSING. One worker owns
/// the host at a time, so this is never shared.
#[derive(Debug, Clone)]
pub struct HostPolicy {
    pub host: String,
    pub last_request_at: Option<Instant>,
    pub min_delay: Duration,
    pub user_agent: String,
    pub robots_allowed: bool,
    pub robots_reason: Option<String>,
    /// Sticky proxy index once a proxy rung succeeded for this host.
    pub proxy_binding: Option<usize>,
}

impl HostPolicy {
    pub fn new(host: &str, min_delay: Duration, user_agent: &str) -> Self {
        Self {
            host: host.to_string(),
            last_request_at: None,
            min_delay,
            user_agent: user_agent.to_string(),
            robots_allowed: true,
            robots_reason: None,
            proxy_binding: None,
        }
    }
}

/// How the winning fetch rung obtained the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchVia {
    Direct,
    Proxy,
    Archive,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub via: FetchVia,
    pub rendered: bool,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// First-paint rendering of script-heavy pages. The driver itself lives
/// outside this crate; the Fetcher degrades to raw HTTP when absent.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String, FetchError>;
}

/// MX lookup seam for email validation.
#[async_trait]
pub trait MxResolver: Send + Sync + 'static {
    async fn has_mx(&self, domain: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Completed,
            QueueStatus::FailedDns,
            QueueStatus::BlockedRobots,
            QueueStatus::Blacklisted,
            QueueStatus::Parked,
            QueueStatus::FailedHttp4xx,
            QueueStatus::FailedHttp5xx,
            QueueStatus::FailedConnection,
            QueueStatus::FailedExtraction,
        ] {
            assert_eq!(QueueStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(QueueStatus::parse("NOPE"), None);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!QueueStatus::Pending.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
        assert!(QueueStatus::Completed.is_terminal());
        assert!(!QueueStatus::Completed.is_resettable());
        assert!(QueueStatus::FailedDns.is_resettable());
    }

    #[test]
    fn test_overall_confidence_is_mean_of_present() {
        let mut result = CrawlResult::new("example.de", "https://example.de/impressum", "run-1");
        result.legal_name = Some(Field::new("Example GmbH".into(), FieldSource::Structured, 1.0));
        result.postal_code = Some(Field::new("10115".into(), FieldSource::Pattern, 0.8));
        result.recompute_confidence();
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_mandatory_fields() {
        let mut result = CrawlResult::new("example.de", "https://example.de/", "run-1");
        assert!(!result.has_mandatory_fields());
        let f = |v: &str| Field::new(v.to_string(), FieldSource::Pattern, 0.8);
        result.legal_name = Some(f("Example GmbH"));
        result.street = Some(f("Musterstr. 1"));
        result.postal_code = Some(f("10115"));
        result.city = Some(f("Berlin"));
        result.country = Some(f("Germany"));
        assert!(result.has_mandatory_fields());
    }
}
