use std::path::PathBuf;

use anyhow::{bail, Result};

use legalscout_core::AppConfig;
use legalscout_export::{ExportFormat, ExportProfile};
use legalscout_storage::Storage;

pub async fn run(
    config: AppConfig,
    profile: Option<String>,
    format: String,
    output: Option<String>,
) -> Result<()> {
    let profile_name = profile.unwrap_or_else(|| config.export.profile.clone());
    let Some(profile) = ExportProfile::parse(&profile_name) else {
        bail!("unknown export profile '{profile_name}' (expected strict or permissive)");
    };
    let Some(format) = ExportFormat::parse(&format) else {
        bail!("unknown export format '{format}' (expected csv or jsonl)");
    };
    let output_dir = PathBuf::from(output.unwrap_or_else(|| config.export.output_dir.clone()));

    let storage = Storage::new(&config.database.sqlite_url).await?;
    storage.run_migrations().await?;

    // Exports are stamped with a fresh run id of their own.
    let run_id = uuid::Uuid::new_v4().to_string();
    let path = legalscout_export::export(&storage, profile, format, &output_dir, &run_id).await?;
    println!("{}", path.display());
    Ok(())
}
