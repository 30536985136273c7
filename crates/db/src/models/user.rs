//! Identity cache rows.
//!
//! Sensitive columns (`line_user_id`, `email`) hold ciphertext; the `_hash`
//! columns hold blind indexes so exact-match lookups work without
//! decrypting every row.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CachedUser {
    pub ragic_id: i64,
    pub line_user_id: String,
    pub line_user_id_hash: String,
    pub email: String,
    pub email_hash: String,
    pub display_name: Option<String>,
    pub employee_ref: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertCachedUser {
    pub ragic_id: i64,
    pub line_user_id: String,
    pub line_user_id_hash: String,
    pub email: String,
    pub email_hash: String,
    pub display_name: Option<String>,
    pub employee_ref: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
}

const COLUMNS: &str = "ragic_id, line_user_id, line_user_id_hash, email, email_hash, \
     display_name, employee_ref, is_active, last_login_at, synced_at";

impl CachedUser {
    /// Insert-or-update keyed by the remote record ID. Repeated syncs of
    /// unchanged data only touch `synced_at`.
    pub async fn upsert(pool: &SqlitePool, data: &UpsertCachedUser) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r#"INSERT INTO cached_users
                   (ragic_id, line_user_id, line_user_id_hash, email, email_hash,
                    display_name, employee_ref, is_active, last_login_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT(ragic_id) DO UPDATE SET
                   line_user_id = excluded.line_user_id,
                   line_user_id_hash = excluded.line_user_id_hash,
                   email = excluded.email,
                   email_hash = excluded.email_hash,
                   display_name = excluded.display_name,
                   employee_ref = excluded.employee_ref,
                   is_active = excluded.is_active,
                   last_login_at = excluded.last_login_at,
                   synced_at = CURRENT_TIMESTAMP
               RETURNING {COLUMNS}"#
        ))
        .bind(data.ragic_id)
        .bind(&data.line_user_id)
        .bind(&data.line_user_id_hash)
        .bind(&data.email)
        .bind(&data.email_hash)
        .bind(&data.display_name)
        .bind(&data.employee_ref)
        .bind(data.is_active)
        .bind(data.last_login_at)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_ragic_id(
        pool: &SqlitePool,
        ragic_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM cached_users WHERE ragic_id = $1"
        ))
        .bind(ragic_id)
        .fetch_optional(pool)
        .await
    }

    /// Blind-index lookup by email.
    pub async fn find_by_email_hash(
        pool: &SqlitePool,
        email_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM cached_users WHERE email_hash = $1"
        ))
        .bind(email_hash)
        .fetch_optional(pool)
        .await
    }

    /// All active identities with this exact display name. Callers must
    /// treat multiple matches as ambiguous.
    pub async fn find_active_by_display_name(
        pool: &SqlitePool,
        display_name: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM cached_users WHERE display_name = $1 AND is_active = 1"
        ))
        .bind(display_name)
        .fetch_all(pool)
        .await
    }

    pub async fn delete_by_ragic_id(pool: &SqlitePool, ragic_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cached_users WHERE ragic_id = $1")
            .bind(ragic_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cached_users")
            .fetch_one(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::DBService;

    use super::*;

    fn sample(ragic_id: i64) -> UpsertCachedUser {
        UpsertCachedUser {
            ragic_id,
            line_user_id: "enc:line".into(),
            line_user_id_hash: "linehash".into(),
            email: "enc:mail".into(),
            email_hash: "mailhash".into(),
            display_name: Some("Chen Yi".into()),
            employee_ref: Some("E001".into()),
            is_active: true,
            last_login_at: None,
        }
    }

    async fn test_db() -> DBService {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_in_place() {
        let db = test_db().await;

        let created = CachedUser::upsert(&db.pool, &sample(42)).await.unwrap();
        assert_eq!(created.ragic_id, 42);

        let mut changed = sample(42);
        changed.email = "enc:new".into();
        let updated = CachedUser::upsert(&db.pool, &changed).await.unwrap();
        assert_eq!(updated.email, "enc:new");
        assert_eq!(CachedUser::count(&db.pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn display_name_lookup_only_returns_active_rows() {
        let db = test_db().await;
        CachedUser::upsert(&db.pool, &sample(1)).await.unwrap();
        let mut inactive = sample(2);
        inactive.is_active = false;
        CachedUser::upsert(&db.pool, &inactive).await.unwrap();

        let found = CachedUser::find_active_by_display_name(&db.pool, "Chen Yi")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ragic_id, 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let db = test_db().await;
        CachedUser::upsert(&db.pool, &sample(9)).await.unwrap();

        assert_eq!(CachedUser::delete_by_ragic_id(&db.pool, 9).await.unwrap(), 1);
        assert_eq!(CachedUser::delete_by_ragic_id(&db.pool, 9).await.unwrap(), 0);
    }
}
