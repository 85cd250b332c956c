use thiserror::Error;

/// Pipeline-level errors. Each variant maps onto exactly one terminal queue
/// status (or a lease release for `Cancelled`).
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("dns failure: {0}")]
    DnsFailure(String),

    #[error("blocked by robots.txt: {0}")]
    BlockedByRobots(String),

    #[error("blocked by blacklist pattern: {0}")]
    BlockedByBlacklist(String),

    #[error("parked domain: {0}")]
    ParkedDomain(String),

    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("http client error: status {0}")]
    HttpClientError(u16),

    #[error("http server error: status {0}")]
    HttpServerError(u16),

    #[error("render failure: {0}")]
    RenderFailure(String),

    #[error("no extractable legal content")]
    ExtractionEmpty,

    #[error("all extracted fields rejected by validation")]
    ValidationRejected,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors produced by a single fetch attempt. The Fetcher's retry/fallback
/// ladder is driven by `is_transient`; the Orchestrator maps exhausted
/// errors onto terminal statuses.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("http client error: status {0}")]
    HttpClient(u16),

    #[error("http server error: status {0}")]
    HttpServer(u16),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("blocked by fetch policy: {0}")]
    BlockedByPolicy(String),

    #[error("page could not be rendered")]
    Unrenderable,

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Timeouts, 5xx and 429 responses, and connection-level failures are
    /// worth another rung on the ladder. Other 4xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::ConnectionFailed(_) | FetchError::Timeout(_) => true,
            FetchError::HttpServer(_) => true,
            FetchError::HttpClient(429) => true,
            _ => false,
        }
    }
}
