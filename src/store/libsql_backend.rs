//! libSQL backend — async `EnquiryStore` trait implementation.
//!
//! Supports local file and in-memory databases. The enquiries table carries
//! a UNIQUE index on `dedup_key`, which makes `insert_enquiry_if_new` an
//! atomic test-and-set: the first writer wins, every later writer gets the
//! existing row back.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    Enquiry, EnquirySource, EnquiryStatus, EnquiryStore, InsertOutcome, NewEnquiry,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output with and without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// True when an insert failed because a UNIQUE index rejected the row.
///
/// libsql surfaces SQLite constraint failures as a generic error whose
/// message carries the SQLite text, so string matching is the only hook.
fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

const ENQUIRY_COLUMNS: &str = "id, owner_user_id, client_name, client_email, title, raw_body, event_date, venue, phone, source, status, dedup_key, low_confidence, received_at, created_at, raw_payload";

/// Map a libsql Row to an Enquiry. Column order matches ENQUIRY_COLUMNS.
fn row_to_enquiry(row: &libsql::Row) -> Result<Enquiry, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("enquiry.id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Query(format!("enquiry.id parse: {e}")))?;

    let owner_user_id: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("enquiry.owner_user_id: {e}")))?;
    let client_name: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("enquiry.client_name: {e}")))?;
    let client_email: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("enquiry.client_email: {e}")))?;
    let title: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("enquiry.title: {e}")))?;
    let raw_body: String = row
        .get(5)
        .map_err(|e| DatabaseError::Query(format!("enquiry.raw_body: {e}")))?;

    let event_date_str: Option<String> = row.get(6).ok();
    let event_date =
        event_date_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());

    let venue: Option<String> = row.get(7).ok();
    let phone: Option<String> = row.get(8).ok();

    let source_str: String = row
        .get(9)
        .map_err(|e| DatabaseError::Query(format!("enquiry.source: {e}")))?;
    let status_str: String = row
        .get(10)
        .map_err(|e| DatabaseError::Query(format!("enquiry.status: {e}")))?;
    let dedup_key: String = row
        .get(11)
        .map_err(|e| DatabaseError::Query(format!("enquiry.dedup_key: {e}")))?;
    let low_confidence: i64 = row
        .get(12)
        .map_err(|e| DatabaseError::Query(format!("enquiry.low_confidence: {e}")))?;
    let received_str: String = row
        .get(13)
        .map_err(|e| DatabaseError::Query(format!("enquiry.received_at: {e}")))?;
    let created_str: String = row
        .get(14)
        .map_err(|e| DatabaseError::Query(format!("enquiry.created_at: {e}")))?;
    let raw_payload: Option<String> = row.get(15).ok();

    Ok(Enquiry {
        id,
        owner_user_id,
        client_name,
        client_email,
        title,
        raw_body,
        event_date,
        venue,
        phone,
        source: EnquirySource::from_db_str(&source_str),
        status: EnquiryStatus::from_db_str(&status_str),
        dedup_key,
        low_confidence: low_confidence != 0,
        raw_payload,
        received_at: parse_datetime(&received_str),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl EnquiryStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_enquiry_if_new(
        &self,
        dedup_key: &str,
        enquiry: &NewEnquiry,
    ) -> Result<InsertOutcome, DatabaseError> {
        let conn = self.conn();
        let id = Uuid::new_v4();
        let now = Utc::now();

        let result = conn
            .execute(
                "INSERT INTO enquiries (id, owner_user_id, client_name, client_email, title, raw_body, event_date, venue, phone, source, status, dedup_key, low_confidence, received_at, created_at, raw_payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    id.to_string(),
                    enquiry.owner_user_id.as_str(),
                    enquiry.client_name.as_str(),
                    enquiry.client_email.as_str(),
                    enquiry.title.as_str(),
                    enquiry.raw_body.as_str(),
                    opt_text_owned(
                        enquiry
                            .event_date
                            .map(|d| d.format("%Y-%m-%d").to_string())
                    ),
                    opt_text_owned(enquiry.venue.clone()),
                    opt_text_owned(enquiry.phone.clone()),
                    enquiry.source.as_str(),
                    EnquiryStatus::New.as_str(),
                    dedup_key,
                    enquiry.low_confidence as i64,
                    enquiry.received_at.to_rfc3339(),
                    now.to_rfc3339(),
                    opt_text_owned(enquiry.raw_payload.clone()),
                ],
            )
            .await;

        match result {
            Ok(_) => {
                debug!(enquiry_id = %id, dedup_key = %dedup_key, "Enquiry inserted into DB");
                Ok(InsertOutcome { created: true, id })
            }
            Err(e) if is_unique_violation(&e) => {
                // Another request already claimed this dedup_key. Look up the
                // winner so callers can report the existing id.
                let existing = self.get_enquiry_by_dedup_key(dedup_key).await?;
                match existing {
                    Some(row) => {
                        debug!(enquiry_id = %row.id, dedup_key = %dedup_key, "Duplicate enquiry suppressed");
                        Ok(InsertOutcome {
                            created: false,
                            id: row.id,
                        })
                    }
                    None => Err(DatabaseError::Constraint(format!(
                        "dedup_key '{dedup_key}' violated UNIQUE but no row found"
                    ))),
                }
            }
            Err(e) => Err(DatabaseError::Query(format!("insert_enquiry_if_new: {e}"))),
        }
    }

    async fn get_enquiry(&self, id: Uuid) -> Result<Option<Enquiry>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_enquiry: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_enquiry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_enquiry: {e}"))),
        }
    }

    async fn get_enquiry_by_dedup_key(
        &self,
        dedup_key: &str,
    ) -> Result<Option<Enquiry>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE dedup_key = ?1"),
                params![dedup_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_enquiry_by_dedup_key: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_enquiry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "get_enquiry_by_dedup_key: {e}"
            ))),
        }
    }

    async fn list_enquiries(
        &self,
        owner_user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Enquiry>, DatabaseError> {
        let conn = self.conn();
        let mut rows = match owner_user_id {
            Some(owner) => conn
                .query(
                    &format!(
                        "SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE owner_user_id = ?1 \
                         ORDER BY created_at DESC LIMIT ?2"
                    ),
                    params![owner, limit as i64],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("list_enquiries: {e}")))?,
            None => conn
                .query(
                    &format!(
                        "SELECT {ENQUIRY_COLUMNS} FROM enquiries \
                         ORDER BY created_at DESC LIMIT ?1"
                    ),
                    params![limit as i64],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("list_enquiries: {e}")))?,
        };

        let mut enquiries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_enquiries row: {e}")))?
        {
            enquiries.push(row_to_enquiry(&row)?);
        }
        Ok(enquiries)
    }

    async fn count_enquiries(&self) -> Result<u64, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query("SELECT COUNT(*) FROM enquiries", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_enquiries: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_enquiries: {e}")))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_enquiries: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_enquiry(dedup_suffix: &str) -> NewEnquiry {
        NewEnquiry {
            owner_user_id: "olivia".into(),
            client_name: "sarah.johnson".into(),
            client_email: "sarah.johnson@example.com".into(),
            title: format!("Wedding enquiry {dedup_suffix}"),
            raw_body: "Looking for a saxophonist at The Grand Hotel".into(),
            event_date: NaiveDate::from_ymd_opt(2026, 8, 15),
            venue: Some("The Grand Hotel".into()),
            phone: Some("07123456789".into()),
            source: EnquirySource::Email,
            low_confidence: false,
            raw_payload: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_by_id() {
        let db = test_db().await;
        let enquiry = make_enquiry("a");

        let outcome = db.insert_enquiry_if_new("olivia|msg:abc", &enquiry).await.unwrap();
        assert!(outcome.created);

        let fetched = db.get_enquiry(outcome.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, outcome.id);
        assert_eq!(fetched.client_email, "sarah.johnson@example.com");
        assert_eq!(fetched.status, EnquiryStatus::New);
        assert_eq!(fetched.event_date, NaiveDate::from_ymd_opt(2026, 8, 15));
        assert_eq!(fetched.venue.as_deref(), Some("The Grand Hotel"));
        assert_eq!(fetched.dedup_key, "olivia|msg:abc");
        assert!(!fetched.low_confidence);
    }

    #[tokio::test]
    async fn get_by_id_not_found() {
        let db = test_db().await;
        let result = db.get_enquiry(Uuid::new_v4()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn duplicate_key_returns_existing_id() {
        let db = test_db().await;
        let first = make_enquiry("a");
        let second = make_enquiry("b");

        let outcome1 = db.insert_enquiry_if_new("olivia|msg:abc", &first).await.unwrap();
        assert!(outcome1.created);

        let outcome2 = db.insert_enquiry_if_new("olivia|msg:abc", &second).await.unwrap();
        assert!(!outcome2.created);
        assert_eq!(outcome2.id, outcome1.id);

        // The first write wins; the second never touches the row
        let stored = db.get_enquiry(outcome1.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Wedding enquiry a");
        assert_eq!(db.count_enquiries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_fingerprint_different_owner_creates_both() {
        let db = test_db().await;
        let mut for_olivia = make_enquiry("a");
        for_olivia.owner_user_id = "olivia".into();
        let mut for_magnus = make_enquiry("a");
        for_magnus.owner_user_id = "magnus".into();

        let o1 = db.insert_enquiry_if_new("olivia|fp:deadbeef", &for_olivia).await.unwrap();
        let o2 = db.insert_enquiry_if_new("magnus|fp:deadbeef", &for_magnus).await.unwrap();
        assert!(o1.created);
        assert!(o2.created);
        assert_eq!(db.count_enquiries().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_inserts_one_winner() {
        let db = Arc::new(test_db().await);
        let mut handles = Vec::new();

        for i in 0..8 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                let enquiry = make_enquiry(&format!("{i}"));
                db.insert_enquiry_if_new("olivia|msg:race", &enquiry).await
            }));
        }

        let mut created = 0;
        let mut duplicates = 0;
        let mut winner_ids = std::collections::HashSet::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            winner_ids.insert(outcome.id);
            if outcome.created {
                created += 1;
            } else {
                duplicates += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(winner_ids.len(), 1, "every outcome must report the same row");
        assert_eq!(db.count_enquiries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_limits() {
        let db = test_db().await;

        for i in 0..3 {
            let mut e = make_enquiry(&format!("o{i}"));
            e.owner_user_id = "olivia".into();
            db.insert_enquiry_if_new(&format!("olivia|msg:{i}"), &e).await.unwrap();
        }
        let mut e = make_enquiry("m0");
        e.owner_user_id = "magnus".into();
        db.insert_enquiry_if_new("magnus|msg:0", &e).await.unwrap();

        let all = db.list_enquiries(None, 50).await.unwrap();
        assert_eq!(all.len(), 4);

        let olivias = db.list_enquiries(Some("olivia"), 50).await.unwrap();
        assert_eq!(olivias.len(), 3);
        assert!(olivias.iter().all(|e| e.owner_user_id == "olivia"));

        let limited = db.list_enquiries(None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn optional_fields_round_trip_as_null() {
        let db = test_db().await;
        let mut enquiry = make_enquiry("a");
        enquiry.event_date = None;
        enquiry.venue = None;
        enquiry.phone = None;
        enquiry.low_confidence = true;

        let outcome = db.insert_enquiry_if_new("olivia|fp:cafe", &enquiry).await.unwrap();
        let fetched = db.get_enquiry(outcome.id).await.unwrap().unwrap();

        assert_eq!(fetched.event_date, None);
        assert_eq!(fetched.venue, None);
        assert_eq!(fetched.phone, None);
        assert!(fetched.low_confidence);
    }

    #[tokio::test]
    async fn raw_payload_stored_when_present() {
        let db = test_db().await;
        let mut enquiry = make_enquiry("a");
        enquiry.raw_payload = Some(r#"{"sender":"x@y.com"}"#.into());

        let outcome = db.insert_enquiry_if_new("olivia|msg:p", &enquiry).await.unwrap();
        let fetched = db.get_enquiry(outcome.id).await.unwrap().unwrap();
        assert_eq!(fetched.raw_payload.as_deref(), Some(r#"{"sender":"x@y.com"}"#));
    }
}
