//! Local cache database.
//!
//! Holds validated, partially encrypted copies of remote records for fast
//! local querying. Every cache table is keyed by the originating Ragic
//! record ID; no independent local identity exists for cached data.

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

pub mod models;

/// Idempotent schema. Re-running is a no-op so every startup can apply it.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cached_users (
    ragic_id          INTEGER PRIMARY KEY,
    line_user_id      TEXT NOT NULL,
    line_user_id_hash TEXT NOT NULL,
    email             TEXT NOT NULL,
    email_hash        TEXT NOT NULL,
    display_name      TEXT,
    employee_ref      TEXT,
    is_active         BOOLEAN NOT NULL DEFAULT 1,
    last_login_at     DATETIME,
    synced_at         DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_cached_users_email_hash ON cached_users(email_hash);
CREATE INDEX IF NOT EXISTS idx_cached_users_line_hash ON cached_users(line_user_id_hash);
CREATE INDEX IF NOT EXISTS idx_cached_users_display_name ON cached_users(display_name);

CREATE TABLE IF NOT EXISTS accounts (
    ragic_id           INTEGER PRIMARY KEY,
    account_id         TEXT NOT NULL,
    employee_id        TEXT,
    name               TEXT NOT NULL,
    status             BOOLEAN NOT NULL DEFAULT 1,
    primary_email      TEXT,
    primary_email_hash TEXT,
    org_code           TEXT,
    org_name           TEXT,
    rank_name          TEXT,
    sales_dept_manager TEXT,
    approval_date      DATE,
    effective_date     DATE,
    resignation_date   DATE,
    synced_at          DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_accounts_name ON accounts(name);
CREATE INDEX IF NOT EXISTS idx_accounts_email_hash ON accounts(primary_email_hash);

CREATE TABLE IF NOT EXISTS leave_types (
    ragic_id        INTEGER PRIMARY KEY,
    leave_type_name TEXT NOT NULL,
    annual_quota    REAL,
    requires_proof  BOOLEAN NOT NULL DEFAULT 0,
    display_order   INTEGER,
    synced_at       DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Owns one connection pool. The request path and the sync worker each get
/// their own instance so no async engine is shared across threads.
#[derive(Clone)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // An in-memory database exists per connection; more than one in the
        // pool would each see their own empty schema.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the cache schema. Safe to run on every startup.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        info!("cache schema applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["accounts", "cached_users", "leave_types"]);
    }
}
