use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::info;

use legalscout_core::{CrawlError, CrawlResult, Field, TextField};
use legalscout_storage::Storage;

/// Fixed column order. Exports are a pure projection of the store, so two
/// exports of the same snapshot are byte-identical (only the filename
/// timestamp differs).
pub const COLUMNS: &[&str] = &[
    "domain",
    "legal_name",
    "legal_form",
    "street",
    "postal_code",
    "city",
    "country",
    "register_court",
    "register_type",
    "registration_number",
    "vat_id",
    "ceo",
    "directors",
    "phones",
    "emails",
    "fax",
    "robots_allowed",
    "robots_reason",
    "legal_source_url",
    "crawled_at",
    "run_id",
    "legal_name_source",
    "legal_name_confidence",
    "legal_form_source",
    "legal_form_confidence",
    "address_source",
    "address_confidence",
    "phones_source",
    "phones_confidence",
    "emails_source",
    "emails_confidence",
    "confidence",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportProfile {
    /// Only rows with the complete mandatory field set.
    Strict,
    /// All rows, missing fields left empty.
    Permissive,
}

impl ExportProfile {
    pub fn parse(s: &str) -> Option<ExportProfile> {
        match s {
            "strict" => Some(ExportProfile::Strict),
            "permissive" => Some(ExportProfile::Permissive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Jsonl,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s {
            "csv" => Some(ExportFormat::Csv),
            "jsonl" => Some(ExportFormat::Jsonl),
            _ => None,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

fn text(field: &Option<TextField>) -> String {
    field.as_ref().map(|f| f.value.clone()).unwrap_or_default()
}

fn source_of(field: &Option<TextField>) -> String {
    field
        .as_ref()
        .map(|f| f.source.as_str().to_string())
        .unwrap_or_default()
}

fn confidence_of(field: &Option<TextField>) -> String {
    field
        .as_ref()
        .map(|f| format!("{:.2}", f.confidence))
        .unwrap_or_default()
}

fn joined<I: IntoIterator<Item = String>>(values: I) -> String {
    values.into_iter().collect::<Vec<_>>().join("; ")
}

fn set_text<T: Clone + Ord + ToString>(field: &Option<Field<std::collections::BTreeSet<T>>>) -> String {
    field
        .as_ref()
        .map(|f| joined(f.value.iter().map(|v| v.to_string())))
        .unwrap_or_default()
}

fn set_source<T>(field: &Option<Field<T>>) -> String {
    field
        .as_ref()
        .map(|f| f.source.as_str().to_string())
        .unwrap_or_default()
}

fn set_confidence<T>(field: &Option<Field<T>>) -> String {
    field
        .as_ref()
        .map(|f| format!("{:.2}", f.confidence))
        .unwrap_or_default()
}

/// The combined address companion columns: provenance from the street
/// field (postal code as fallback), confidence as the minimum over the
/// present address parts.
fn address_companions(result: &CrawlResult) -> (String, String) {
    let source = result
        .street
        .as_ref()
        .or(result.postal_code.as_ref())
        .map(|f| f.source.as_str().to_string())
        .unwrap_or_default();
    let confs: Vec<f64> = [
        &result.street,
        &result.postal_code,
        &result.city,
        &result.country,
    ]
    .iter()
    .filter_map(|f| f.as_ref().map(|f| f.confidence))
    .collect();
    let confidence = if confs.is_empty() {
        String::new()
    } else {
        format!("{:.2}", confs.iter().cloned().fold(f64::INFINITY, f64::min))
    };
    (source, confidence)
}

fn row_values(result: &CrawlResult) -> Vec<String> {
    let (address_source, address_confidence) = address_companions(result);
    vec![
        result.domain.clone(),
        text(&result.legal_name),
        text(&result.legal_form),
        text(&result.street),
        text(&result.postal_code),
        text(&result.city),
        text(&result.country),
        text(&result.register_court),
        text(&result.register_type),
        text(&result.registration_number),
        text(&result.vat_id),
        text(&result.ceo),
        result
            .directors
            .as_ref()
            .map(|f| f.value.join("; "))
            .unwrap_or_default(),
        set_text(&result.phones),
        set_text(&result.emails),
        text(&result.fax),
        result.robots_allowed.to_string(),
        result.robots_reason.clone().unwrap_or_default(),
        result.legal_source_url.clone(),
        result.crawled_at.to_rfc3339(),
        result.run_id.clone(),
        source_of(&result.legal_name),
        confidence_of(&result.legal_name),
        source_of(&result.legal_form),
        confidence_of(&result.legal_form),
        address_source,
        address_confidence,
        set_source(&result.phones),
        set_confidence(&result.phones),
        set_source(&result.emails),
        set_confidence(&result.emails),
        format!("{:.2}", result.confidence),
    ]
}

fn included(result: &CrawlResult, profile: ExportProfile) -> bool {
    match profile {
        ExportProfile::Strict => result.has_mandatory_fields(),
        ExportProfile::Permissive => true,
    }
}

fn write_csv(path: &Path, rows: &[&CrawlResult]) -> Result<(), CrawlError> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| CrawlError::Storage(e.to_string()))?;
    writer
        .write_record(COLUMNS)
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
    for result in rows {
        writer
            .write_record(row_values(result))
            .map_err(|e| CrawlError::Storage(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| CrawlError::Storage(e.to_string()))?;
    Ok(())
}

fn write_jsonl(path: &Path, rows: &[&CrawlResult]) -> Result<(), CrawlError> {
    let mut out = String::new();
    for result in rows {
        let values = row_values(result);
        let record: serde_json::Map<String, serde_json::Value> = COLUMNS
            .iter()
            .zip(values)
            .map(|(col, value)| (col.to_string(), json!(value)))
            .collect();
        out.push_str(&serde_json::Value::Object(record).to_string());
        out.push('\n');
    }
    std::fs::write(path, out).map_err(|e| CrawlError::Storage(e.to_string()))?;
    Ok(())
}

/// Project stored results to a timestamped tabular file and return its
/// path.
pub async fn export(
    storage: &Storage,
    profile: ExportProfile,
    format: ExportFormat,
    output_dir: &Path,
    run_id: &str,
) -> Result<PathBuf, CrawlError> {
    let results = storage.fetch_results().await?;
    let rows: Vec<&CrawlResult> = results.iter().filter(|r| included(r, profile)).collect();

    std::fs::create_dir_all(output_dir).map_err(|e| CrawlError::Storage(e.to_string()))?;
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let filename = format!("results_{run_id}_{timestamp}.{}", format.extension());
    let path = output_dir.join(filename);

    match format {
        ExportFormat::Csv => write_csv(&path, &rows)?,
        ExportFormat::Jsonl => write_jsonl(&path, &rows)?,
    }

    info!(path = %path.display(), rows = rows.len(), total = results.len(), "export written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalscout_core::{FieldSource, QueueStatus};
    use std::collections::BTreeSet;
    use std::time::Duration;

    async fn storage_with_results() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let storage = Storage::with_pool_size(&url, 2).await.unwrap();
        storage.run_migrations().await.unwrap();

        // Complete record.
        storage.enqueue("complete.de", "t").await.unwrap();
        storage.lease(1, Duration::from_secs(60)).await.unwrap();
        let mut complete = CrawlResult::new("complete.de", "https://complete.de/impressum", "run-1");
        let f = |v: &str| Field::new(v.to_string(), FieldSource::Structured, 1.0);
        complete.legal_name = Some(f("Complete GmbH"));
        complete.street = Some(f("Musterstr. 1"));
        complete.postal_code = Some(f("10115"));
        complete.city = Some(f("Berlin"));
        complete.country = Some(f("Germany"));
        let mut phones = BTreeSet::new();
        phones.insert("+49 30 1234567".to_string());
        complete.phones = Some(Field::new(phones, FieldSource::Structured, 1.0));
        complete.recompute_confidence();
        storage
            .complete("complete.de", &complete, QueueStatus::Completed)
            .await
            .unwrap();

        // Partial record: name only.
        storage.enqueue("partial.de", "t").await.unwrap();
        storage.lease(1, Duration::from_secs(60)).await.unwrap();
        let mut partial = CrawlResult::new("partial.de", "https://partial.de/", "run-1");
        partial.legal_name = Some(Field::new(
            "Partial UG".to_string(),
            FieldSource::Pattern,
            0.8,
        ));
        partial.recompute_confidence();
        storage
            .complete("partial.de", &partial, QueueStatus::Completed)
            .await
            .unwrap();

        (storage, dir)
    }

    #[tokio::test]
    async fn test_strict_profile_filters_incomplete_rows() {
        let (storage, dir) = storage_with_results().await;
        let out = dir.path().join("exports");
        let path = export(&storage, ExportProfile::Strict, ExportFormat::Csv, &out, "run-1")
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2); // header + 1 row
        assert!(lines[0].starts_with("domain,legal_name,legal_form,street"));
        assert!(lines[1].starts_with("complete.de,"));
    }

    #[tokio::test]
    async fn test_permissive_profile_keeps_all_rows() {
        let (storage, dir) = storage_with_results().await;
        let out = dir.path().join("exports");
        let path = export(
            &storage,
            ExportProfile::Permissive,
            ExportFormat::Csv,
            &out,
            "run-1",
        )
        .await
        .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_export_is_deterministic() {
        let (storage, dir) = storage_with_results().await;
        let out_a = dir.path().join("a");
        let out_b = dir.path().join("b");
        let path_a = export(&storage, ExportProfile::Strict, ExportFormat::Csv, &out_a, "run-1")
            .await
            .unwrap();
        let path_b = export(&storage, ExportProfile::Strict, ExportFormat::Csv, &out_b, "run-1")
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(path_a).unwrap(),
            std::fs::read_to_string(path_b).unwrap()
        );
    }

    #[tokio::test]
    async fn test_jsonl_mirror_schema() {
        let (storage, dir) = storage_with_results().await;
        let out = dir.path().join("exports");
        let path = export(
            &storage,
            ExportProfile::Permissive,
            ExportFormat::Jsonl,
            &out,
            "run-1",
        )
        .await
        .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let first: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        for column in COLUMNS {
            assert!(first.get(*column).is_some(), "missing column {column}");
        }
        assert_eq!(first["domain"], "complete.de");
    }

    #[tokio::test]
    async fn test_columns_cover_row_values() {
        let result = CrawlResult::new("x.de", "https://x.de/", "run-1");
        assert_eq!(row_values(&result).len(), COLUMNS.len());
    }
}
