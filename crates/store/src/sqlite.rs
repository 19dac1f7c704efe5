//! SQLite decision store.
//!
//! A single table, `processed_posts`, holds one row per recorded decision.
//! Posts are keyed by `post_guid`; a post counts as processed once any row
//! exists for it.

use async_trait::async_trait;
use calsync_core::decision::Action;
use calsync_core::error::StoreError;
use calsync_core::storage::{DecisionRecord, DecisionStore};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite decision store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_posts (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                post_guid         TEXT NOT NULL,
                processed_at      TEXT NOT NULL,
                decision          TEXT NOT NULL,
                calendar_event_id TEXT,
                post_content      TEXT,
                reasoning         TEXT,
                confidence        REAL,
                input_tokens      INTEGER NOT NULL DEFAULT 0,
                output_tokens     INTEGER NOT NULL DEFAULT 0,
                cost_usd          REAL NOT NULL DEFAULT 0.0,
                dry_run           INTEGER NOT NULL DEFAULT 0,
                post_title        TEXT,
                post_author       TEXT,
                post_time         TEXT,
                post_link         TEXT,
                event_title       TEXT,
                event_date        TEXT,
                event_time        TEXT,
                event_location    TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("processed_posts table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_processed_posts_guid ON processed_posts(post_guid)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("guid index: {e}")))?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<DecisionRecord, StoreError> {
        let get_err = |col: &str, e: sqlx::Error| StoreError::QueryFailed(format!("column {col}: {e}"));

        let processed_at: String = row.try_get("processed_at").map_err(|e| get_err("processed_at", e))?;
        let processed_at = DateTime::parse_from_rfc3339(&processed_at)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| StoreError::QueryFailed(format!("processed_at: {e}")))?;

        let decision: String = row.try_get("decision").map_err(|e| get_err("decision", e))?;
        let action = Action::from_str(&decision).map_err(StoreError::QueryFailed)?;

        let post_time: Option<String> = row.try_get("post_time").map_err(|e| get_err("post_time", e))?;
        let event_date: Option<String> = row.try_get("event_date").map_err(|e| get_err("event_date", e))?;
        let input_tokens: i64 = row.try_get("input_tokens").map_err(|e| get_err("input_tokens", e))?;
        let output_tokens: i64 = row.try_get("output_tokens").map_err(|e| get_err("output_tokens", e))?;

        Ok(DecisionRecord {
            post_id: row.try_get("post_guid").map_err(|e| get_err("post_guid", e))?,
            processed_at,
            action,
            calendar_event_id: row.try_get("calendar_event_id").map_err(|e| get_err("calendar_event_id", e))?,
            reasoning: row.try_get("reasoning").map_err(|e| get_err("reasoning", e))?,
            confidence: row.try_get("confidence").map_err(|e| get_err("confidence", e))?,
            input_tokens: input_tokens.max(0) as u64,
            output_tokens: output_tokens.max(0) as u64,
            cost_usd: row.try_get("cost_usd").map_err(|e| get_err("cost_usd", e))?,
            dry_run: row.try_get("dry_run").map_err(|e| get_err("dry_run", e))?,
            post_title: row.try_get("post_title").map_err(|e| get_err("post_title", e))?,
            post_author: row.try_get("post_author").map_err(|e| get_err("post_author", e))?,
            post_time: post_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|d| d.with_timezone(&Utc)),
            post_link: row.try_get("post_link").map_err(|e| get_err("post_link", e))?,
            post_content: row.try_get("post_content").map_err(|e| get_err("post_content", e))?,
            event_title: row.try_get("event_title").map_err(|e| get_err("event_title", e))?,
            event_date: event_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            event_time: row.try_get("event_time").map_err(|e| get_err("event_time", e))?,
            event_location: row.try_get("event_location").map_err(|e| get_err("event_location", e))?,
        })
    }
}

/// Fixed-width UTC timestamps so `ORDER BY processed_at` sorts chronologically.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl DecisionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn record(&self, record: DecisionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO processed_posts
                (post_guid, processed_at, decision, calendar_event_id, post_content, reasoning,
                 confidence, input_tokens, output_tokens, cost_usd, dry_run, post_title,
                 post_author, post_time, post_link, event_title, event_date, event_time,
                 event_location)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
        )
        .bind(&record.post_id)
        .bind(timestamp(&record.processed_at))
        .bind(record.action.as_str())
        .bind(&record.calendar_event_id)
        .bind(&record.post_content)
        .bind(&record.reasoning)
        .bind(record.confidence)
        .bind(record.input_tokens as i64)
        .bind(record.output_tokens as i64)
        .bind(record.cost_usd)
        .bind(record.dry_run)
        .bind(&record.post_title)
        .bind(&record.post_author)
        .bind(record.post_time.as_ref().map(timestamp))
        .bind(&record.post_link)
        .bind(&record.event_title)
        .bind(record.event_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&record.event_time)
        .bind(&record.event_location)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert: {e}")))?;

        debug!(post_id = %record.post_id, action = %record.action, "Recorded decision");
        Ok(())
    }

    async fn is_processed(&self, post_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM processed_posts WHERE post_guid = ?1 LIMIT 1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn records_for_post(&self, post_id: &str) -> Result<Vec<DecisionRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM processed_posts WHERE post_guid = ?1 ORDER BY id")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn history(&self, limit: usize) -> Result<Vec<DecisionRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM processed_posts ORDER BY processed_at DESC, id DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM processed_posts WHERE post_guid = ?1")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM processed_posts")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn total_cost(&self) -> Result<f64, StoreError> {
        let row = sqlx::query("SELECT COALESCE(SUM(cost_usd), 0.0) AS total FROM processed_posts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        row.try_get("total")
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsync_core::analysis::UsageTotals;
    use calsync_core::decision::Decision;
    use calsync_core::event::EventDetails;
    use calsync_core::post::Post;
    use chrono::{Duration, NaiveTime};

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            title: "Winter Tuesday ride".into(),
            link: format!("https://example.com/p/{id}"),
            content: "Meet at 6:45 pm, roll at 7 pm".into(),
            author: Some("bonesaw".into()),
            published: Some(Utc::now()),
            image_urls: vec![],
        }
    }

    fn create_record(id: &str, cost: f64) -> DecisionRecord {
        let decision = Decision {
            is_event: true,
            confidence: 0.9,
            action: Action::Create,
            reasoning: "dated flyer".into(),
            event: Some(EventDetails {
                title: "Winter ride".into(),
                date: NaiveDate::from_ymd_opt(2026, 1, 27).unwrap(),
                time: NaiveTime::from_hms_opt(18, 45, 0),
                end_time: None,
                timezone: "America/Chicago".into(),
                location: Some("Sabo Bridge".into()),
                description: None,
            }),
            related_event_id: None,
            done: true,
        };
        let usage = UsageTotals {
            input_tokens: 1500,
            output_tokens: 200,
            cost_usd: cost,
        };
        DecisionRecord::from_decision(&post(id), &decision, Some("gcal-1".into()), usage, false)
    }

    async fn store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn record_and_read_back() {
        let store = store().await;
        assert!(!store.is_processed("p1").await.unwrap());

        store.record(create_record("p1", 0.0075)).await.unwrap();
        assert!(store.is_processed("p1").await.unwrap());

        let rows = store.records_for_post("p1").await.unwrap();
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.action, Action::Create);
        assert_eq!(r.calendar_event_id.as_deref(), Some("gcal-1"));
        assert_eq!(r.event_date, NaiveDate::from_ymd_opt(2026, 1, 27));
        assert_eq!(r.event_time.as_deref(), Some("18:45"));
        assert_eq!(r.input_tokens, 1500);
        assert_eq!(r.confidence, Some(0.9));
        assert!(!r.dry_run);
        assert!(r.post_time.is_some());
    }

    #[tokio::test]
    async fn multiple_rows_per_post_keep_order() {
        let store = store().await;
        store.record(create_record("p1", 0.01)).await.unwrap();
        let mut second = create_record("p1", 0.02);
        second.action = Action::FlagForReview;
        store.record(second).await.unwrap();

        let rows = store.records_for_post("p1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].action, Action::FlagForReview);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = store().await;
        for i in 0..3 {
            let mut rec = create_record(&format!("p{i}"), 0.01);
            rec.processed_at = Utc::now() + Duration::seconds(i);
            store.record(rec).await.unwrap();
        }
        let history = store.history(2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].post_id, "p2");
        assert_eq!(history[1].post_id, "p1");
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = store().await;
        store.record(create_record("p1", 0.01)).await.unwrap();
        store.record(create_record("p2", 0.01)).await.unwrap();

        assert!(store.delete_post("p1").await.unwrap());
        assert!(!store.delete_post("p1").await.unwrap());
        assert!(!store.is_processed("p1").await.unwrap());

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.history(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn total_cost_sums_rows() {
        let store = store().await;
        assert_eq!(store.total_cost().await.unwrap(), 0.0);
        store.record(create_record("p1", 0.25)).await.unwrap();
        store.record(create_record("p2", 0.5)).await.unwrap();
        assert!((store.total_cost().await.unwrap() - 0.75).abs() < 1e-12);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calsync.db");
        let url = format!("sqlite://{}", path.display());

        {
            let store = SqliteStore::new(&url).await.unwrap();
            store.record(create_record("p1", 0.01)).await.unwrap();
        }

        let store = SqliteStore::new(&url).await.unwrap();
        assert!(store.is_processed("p1").await.unwrap());
    }
}
