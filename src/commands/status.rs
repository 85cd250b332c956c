use anyhow::Result;

use legalscout_core::AppConfig;
use legalscout_storage::Storage;

pub async fn run(config: AppConfig) -> Result<()> {
    let storage = Storage::new(&config.database.sqlite_url).await?;
    storage.run_migrations().await?;

    let stats = storage.snapshot_stats().await?;
    let results = storage.result_count().await?;

    println!("{:<20} {:>8}", "status", "count");
    let mut total = 0i64;
    for (status, count) in &stats {
        println!("{status:<20} {count:>8}");
        total += count;
    }
    println!("{:<20} {total:>8}", "total");
    println!("\nstored results: {results}");
    Ok(())
}
