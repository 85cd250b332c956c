use std::collections::BTreeSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use legalscout_core::{CrawlError, CrawlResult, Field, FieldSource, QueueEntry, QueueStatus, TextField};

/// Durable queue + result store. All state transitions run as single
/// statements or transactions, so a crash mid-lease just leaves PROCESSING
/// rows that re-surface once their lease expires.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

type QueueRow = (
    String,
    String,
    String,
    i64,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn entry_from_row(row: QueueRow) -> QueueEntry {
    let (domain, source, status, attempts, lease_expires_at, created_at, updated_at) = row;
    QueueEntry {
        domain,
        source,
        status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Pending),
        attempts,
        lease_expires_at,
        created_at,
        updated_at,
    }
}

/// Pool/connection-level failures mean the backend is gone; everything else
/// is a plain storage error.
fn map_err(e: sqlx::Error) -> CrawlError {
    match e {
        sqlx::Error::Io(e) => CrawlError::StorageUnavailable(e.to_string()),
        sqlx::Error::PoolTimedOut => CrawlError::StorageUnavailable("pool timed out".into()),
        sqlx::Error::PoolClosed => CrawlError::StorageUnavailable("pool closed".into()),
        sqlx::Error::Tls(e) => CrawlError::StorageUnavailable(e.to_string()),
        other => CrawlError::Storage(other.to_string()),
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self, CrawlError> {
        Self::with_pool_size(database_url, 5).await
    }

    pub async fn with_pool_size(database_url: &str, max_connections: u32) -> Result<Self, CrawlError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_err)?;

        info!(max_connections, "connected to sqlite store");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CrawlError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        info!("migrations complete");
        Ok(())
    }

    /// Insert a domain as PENDING if absent; otherwise a no-op. The source
    /// of record is the first insert.
    pub async fn enqueue(&self, domain: &str, source: &str) -> Result<bool, CrawlError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO queue (domain, source, status, attempts, created_at, updated_at)
             VALUES (?1, ?2, 'PENDING', 0, ?3, ?3)
             ON CONFLICT (domain) DO NOTHING",
        )
        .bind(domain)
        .bind(source)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim up to `n` lease-eligible entries: PENDING rows plus
    /// PROCESSING rows whose lease already expired. One statement, so no
    /// two workers can claim the same domain.
    pub async fn lease(&self, n: usize, lease_ttl: std::time::Duration) -> Result<Vec<QueueEntry>, CrawlError> {
        let now = Utc::now();
        let expires = now
            + ChronoDuration::from_std(lease_ttl)
                .unwrap_or_else(|_| ChronoDuration::seconds(300));

        let rows: Vec<QueueRow> = sqlx::query_as(
            "UPDATE queue
             SET status = 'PROCESSING', lease_expires_at = ?1, updated_at = ?2, attempts = attempts + 1
             WHERE domain IN (
                 SELECT domain FROM queue
                 WHERE status = 'PENDING'
                    OR (status = 'PROCESSING' AND lease_expires_at < ?2)
                 ORDER BY updated_at ASC
                 LIMIT ?3
             )
             RETURNING domain, source, status, attempts, lease_expires_at, created_at, updated_at",
        )
        .bind(expires)
        .bind(now)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(rows.into_iter().map(entry_from_row).collect())
    }

    /// Upsert the result and move the row to its terminal status in one
    /// transaction. Fails if the row is not currently PROCESSING, which
    /// makes a completed domain immune to stray late writes.
    pub async fn complete(
        &self,
        domain: &str,
        result: &CrawlResult,
        terminal: QueueStatus,
    ) -> Result<(), CrawlError> {
        if !terminal.is_terminal() {
            return Err(CrawlError::Storage(format!(
                "complete() requires a terminal status, got {}",
                terminal.as_str()
            )));
        }

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let updated = sqlx::query(
            "UPDATE queue SET status = ?1, lease_expires_at = NULL, updated_at = ?2
             WHERE domain = ?3 AND status = 'PROCESSING'",
        )
        .bind(terminal.as_str())
        .bind(Utc::now())
        .bind(domain)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if updated.rows_affected() != 1 {
            return Err(CrawlError::Storage(format!(
                "domain {domain} is not PROCESSING, refusing to complete"
            )));
        }

        insert_result(&mut tx, result).await?;
        tx.commit().await.map_err(map_err)?;
        Ok(())
    }

    /// Terminal status transition without a result row.
    pub async fn fail(&self, domain: &str, terminal: QueueStatus) -> Result<(), CrawlError> {
        if !terminal.is_terminal() {
            return Err(CrawlError::Storage(format!(
                "fail() requires a terminal status, got {}",
                terminal.as_str()
            )));
        }
        let updated = sqlx::query(
            "UPDATE queue SET status = ?1, lease_expires_at = NULL, updated_at = ?2
             WHERE domain = ?3 AND status = 'PROCESSING'",
        )
        .bind(terminal.as_str())
        .bind(Utc::now())
        .bind(domain)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if updated.rows_affected() != 1 {
            return Err(CrawlError::Storage(format!(
                "domain {domain} is not PROCESSING, refusing to fail"
            )));
        }
        Ok(())
    }

    /// Hand a leased entry back to the queue (host deferral, cancellation).
    /// Attempts are preserved.
    pub async fn release(&self, domain: &str) -> Result<(), CrawlError> {
        sqlx::query(
            "UPDATE queue SET status = 'PENDING', lease_expires_at = NULL, updated_at = ?1
             WHERE domain = ?2 AND status = 'PROCESSING'",
        )
        .bind(Utc::now())
        .bind(domain)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    /// Bulk-transition terminal failures back to PENDING. Attempts are
    /// preserved. `None` resets every resettable status.
    pub async fn reset(&self, filter: Option<&[QueueStatus]>) -> Result<u64, CrawlError> {
        let statuses: Vec<&'static str> = match filter {
            Some(list) => list
                .iter()
                .filter(|s| s.is_resettable())
                .map(|s| s.as_str())
                .collect(),
            None => vec![
                QueueStatus::FailedDns.as_str(),
                QueueStatus::BlockedRobots.as_str(),
                QueueStatus::Blacklisted.as_str(),
                QueueStatus::Parked.as_str(),
                QueueStatus::FailedHttp4xx.as_str(),
                QueueStatus::FailedHttp5xx.as_str(),
                QueueStatus::FailedConnection.as_str(),
                QueueStatus::FailedExtraction.as_str(),
            ],
        };
        if statuses.is_empty() {
            return Ok(0);
        }

        let placeholders: Vec<String> = (0..statuses.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "UPDATE queue SET status = 'PENDING', lease_expires_at = NULL, updated_at = ?1
             WHERE status IN ({})",
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(Utc::now());
        for status in &statuses {
            query = query.bind(*status);
        }
        let result = query.execute(&self.pool).await.map_err(map_err)?;
        Ok(result.rows_affected())
    }

    pub async fn snapshot_stats(&self) -> Result<Vec<(String, i64)>, CrawlError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM queue GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(rows)
    }

    pub async fn get_entry(&self, domain: &str) -> Result<Option<QueueEntry>, CrawlError> {
        let row: Option<QueueRow> = sqlx::query_as(
            "SELECT domain, source, status, attempts, lease_expires_at, created_at, updated_at
             FROM queue WHERE domain = ?1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row.map(entry_from_row))
    }

    pub async fn result_count(&self) -> Result<i64, CrawlError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM results")
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.0)
    }

    pub async fn get_result(&self, domain: &str) -> Result<Option<CrawlResult>, CrawlError> {
        let row = sqlx::query("SELECT * FROM results WHERE domain = ?1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.map(|r| result_from_row(&r)).transpose()
    }

    /// All results in deterministic (domain) order, for export.
    pub async fn fetch_results(&self) -> Result<Vec<CrawlResult>, CrawlError> {
        let rows = sqlx::query("SELECT * FROM results ORDER BY domain ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.iter().map(result_from_row).collect()
    }

    pub async fn check_connectivity(&self) -> Result<(), CrawlError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn tf_parts(field: &Option<TextField>) -> (Option<&str>, Option<&str>, Option<f64>) {
    match field {
        Some(f) => (Some(f.value.as_str()), Some(f.source.as_str()), Some(f.confidence)),
        None => (None, None, None),
    }
}

fn json_parts<T: serde::Serialize>(field: &Option<Field<T>>) -> (Option<String>, Option<&str>, Option<f64>) {
    match field {
        Some(f) => (
            serde_json::to_string(&f.value).ok(),
            Some(f.source.as_str()),
            Some(f.confidence),
        ),
        None => (None, None, None),
    }
}

async fn insert_result(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    result: &CrawlResult,
) -> Result<(), CrawlError> {
    let (legal_name, legal_name_s, legal_name_c) = tf_parts(&result.legal_name);
    let (legal_form, legal_form_s, legal_form_c) = tf_parts(&result.legal_form);
    let (reg_no, reg_no_s, reg_no_c) = tf_parts(&result.registration_number);
    let (reg_court, reg_court_s, reg_court_c) = tf_parts(&result.register_court);
    let (reg_type, reg_type_s, reg_type_c) = tf_parts(&result.register_type);
    let (vat_id, vat_id_s, vat_id_c) = tf_parts(&result.vat_id);
    let (street, street_s, street_c) = tf_parts(&result.street);
    let (postal_code, postal_code_s, postal_code_c) = tf_parts(&result.postal_code);
    let (city, city_s, city_c) = tf_parts(&result.city);
    let (country, country_s, country_c) = tf_parts(&result.country);
    let (ceo, ceo_s, ceo_c) = tf_parts(&result.ceo);
    let (directors, directors_s, directors_c) = json_parts(&result.directors);
    let (emails, emails_s, emails_c) = json_parts(&result.emails);
    let (phones, phones_s, phones_c) = json_parts(&result.phones);
    let (fax, fax_s, fax_c) = tf_parts(&result.fax);

    sqlx::query(
        "INSERT OR REPLACE INTO results (
            domain, run_id, legal_source_url, crawled_at,
            legal_name, legal_name_source, legal_name_confidence,
            legal_form, legal_form_source, legal_form_confidence,
            registration_number, registration_number_source, registration_number_confidence,
            register_court, register_court_source, register_court_confidence,
            register_type, register_type_source, register_type_confidence,
            vat_id, vat_id_source, vat_id_confidence,
            street, street_source, street_confidence,
            postal_code, postal_code_source, postal_code_confidence,
            city, city_source, city_confidence,
            country, country_source, country_confidence,
            ceo, ceo_source, ceo_confidence,
            directors, directors_source, directors_confidence,
            emails, emails_source, emails_confidence,
            phones, phones_source, phones_confidence,
            fax, fax_source, fax_confidence,
            robots_allowed, robots_reason, confidence
        ) VALUES (
            ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            ?, ?, ?
        )",
    )
    .bind(&result.domain)
    .bind(&result.run_id)
    .bind(&result.legal_source_url)
    .bind(result.crawled_at)
    .bind(legal_name)
    .bind(legal_name_s)
    .bind(legal_name_c)
    .bind(legal_form)
    .bind(legal_form_s)
    .bind(legal_form_c)
    .bind(reg_no)
    .bind(reg_no_s)
    .bind(reg_no_c)
    .bind(reg_court)
    .bind(reg_court_s)
    .bind(reg_court_c)
    .bind(reg_type)
    .bind(reg_type_s)
    .bind(reg_type_c)
    .bind(vat_id)
    .bind(vat_id_s)
    .bind(vat_id_c)
    .bind(street)
    .bind(street_s)
    .bind(street_c)
    .bind(postal_code)
    .bind(postal_code_s)
    .bind(postal_code_c)
    .bind(city)
    .bind(city_s)
    .bind(city_c)
    .bind(country)
    .bind(country_s)
    .bind(country_c)
    .bind(ceo)
    .bind(ceo_s)
    .bind(ceo_c)
    .bind(directors)
    .bind(directors_s)
    .bind(directors_c)
    .bind(emails)
    .bind(emails_s)
    .bind(emails_c)
    .bind(phones)
    .bind(phones_s)
    .bind(phones_c)
    .bind(fax)
    .bind(fax_s)
    .bind(fax_c)
    .bind(result.robots_allowed)
    .bind(&result.robots_reason)
    .bind(result.confidence)
    .execute(&mut **tx)
    .await
    .map_err(map_err)?;

    Ok(())
}

fn read_text_field(row: &SqliteRow, name: &str) -> Result<Option<TextField>, CrawlError> {
    let value: Option<String> = row.try_get(name).map_err(map_err)?;
    let Some(value) = value else {
        return Ok(None);
    };
    let source: Option<String> = row
        .try_get(format!("{name}_source").as_str())
        .map_err(map_err)?;
    let confidence: Option<f64> = row
        .try_get(format!("{name}_confidence").as_str())
        .map_err(map_err)?;
    let source = source
        .as_deref()
        .and_then(FieldSource::parse)
        .unwrap_or(FieldSource::Pattern);
    Ok(Some(Field::new(value, source, confidence.unwrap_or(0.0))))
}

fn read_json_field<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<Field<T>>, CrawlError> {
    let raw: Option<String> = row.try_get(name).map_err(map_err)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let Ok(value) = serde_json::from_str::<T>(&raw) else {
        return Ok(None);
    };
    let source: Option<String> = row
        .try_get(format!("{name}_source").as_str())
        .map_err(map_err)?;
    let confidence: Option<f64> = row
        .try_get(format!("{name}_confidence").as_str())
        .map_err(map_err)?;
    let source = source
        .as_deref()
        .and_then(FieldSource::parse)
        .unwrap_or(FieldSource::Pattern);
    Ok(Some(Field::new(value, source, confidence.unwrap_or(0.0))))
}

fn result_from_row(row: &SqliteRow) -> Result<CrawlResult, CrawlError> {
    Ok(CrawlResult {
        domain: row.try_get("domain").map_err(map_err)?,
        run_id: row.try_get("run_id").map_err(map_err)?,
        legal_source_url: row.try_get("legal_source_url").map_err(map_err)?,
        crawled_at: row.try_get("crawled_at").map_err(map_err)?,
        legal_name: read_text_field(row, "legal_name")?,
        legal_form: read_text_field(row, "legal_form")?,
        registration_number: read_text_field(row, "registration_number")?,
        register_court: read_text_field(row, "register_court")?,
        register_type: read_text_field(row, "register_type")?,
        vat_id: read_text_field(row, "vat_id")?,
        street: read_text_field(row, "street")?,
        postal_code: read_text_field(row, "postal_code")?,
        city: read_text_field(row, "city")?,
        country: read_text_field(row, "country")?,
        ceo: read_text_field(row, "ceo")?,
        directors: read_json_field::<Vec<String>>(row, "directors")?,
        emails: read_json_field::<BTreeSet<String>>(row, "emails")?,
        phones: read_json_field::<BTreeSet<String>>(row, "phones")?,
        fax: read_text_field(row, "fax")?,
        robots_allowed: row.try_get("robots_allowed").map_err(map_err)?,
        robots_reason: row.try_get("robots_reason").map_err(map_err)?,
        confidence: row.try_get("confidence").map_err(map_err)?,
    })
}
