use anyhow::{bail, Result};
use tracing::info;

use legalscout_core::{AppConfig, QueueStatus};
use legalscout_storage::Storage;

pub async fn run(config: AppConfig, statuses: Option<Vec<String>>) -> Result<()> {
    let filter = match &statuses {
        Some(names) => {
            let mut parsed = Vec::with_capacity(names.len());
            for name in names {
                let Some(status) = QueueStatus::parse(&name.to_uppercase()) else {
                    bail!("unknown status '{name}'");
                };
                if !status.is_resettable() {
                    bail!("status '{name}' cannot be reset");
                }
                parsed.push(status);
            }
            Some(parsed)
        }
        None => None,
    };

    let storage = Storage::new(&config.database.sqlite_url).await?;
    storage.run_migrations().await?;

    let reset = storage.reset(filter.as_deref()).await?;
    info!(reset, "queue entries reset to PENDING");
    println!("{reset} entries reset to PENDING");
    Ok(())
}
