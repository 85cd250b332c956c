pub mod archive;
pub mod client;
pub mod dns;
pub mod preflight;
pub mod proxy;
pub mod robots;
pub mod ua;

pub use client::Fetcher;
pub use dns::DnsChecker;
pub use preflight::{Preflight, PreflightDecision};
pub use robots::RobotsCache;
