use anyhow::Result;
use tracing::info;

use legalscout_core::AppConfig;
use legalscout_storage::Storage;

/// Feed domains into the queue, from a file (one per line) or a
/// comma-separated list. Existing rows are left untouched.
pub async fn run(config: AppConfig, domains: String, source: String) -> Result<()> {
    let storage = Storage::new(&config.database.sqlite_url).await?;
    storage.run_migrations().await?;

    let list: Vec<String> = if std::path::Path::new(&domains).exists() {
        std::fs::read_to_string(&domains)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    } else {
        domains
            .split(',')
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect()
    };

    let mut inserted = 0usize;
    for domain in &list {
        let domain = domain
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_lowercase();
        if storage.enqueue(&domain, &source).await? {
            inserted += 1;
        }
    }

    info!(inserted, total = list.len(), source = %source, "enqueue done");
    println!("{inserted} of {} domains enqueued (source: {source})", list.len());
    Ok(())
}
