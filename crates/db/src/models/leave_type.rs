//! Leave type catalog cache rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct LeaveType {
    pub ragic_id: i64,
    pub leave_type_name: String,
    pub annual_quota: Option<f64>,
    pub requires_proof: bool,
    pub display_order: Option<i64>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertLeaveType {
    pub ragic_id: i64,
    pub leave_type_name: String,
    pub annual_quota: Option<f64>,
    pub requires_proof: bool,
    pub display_order: Option<i64>,
}

const COLUMNS: &str =
    "ragic_id, leave_type_name, annual_quota, requires_proof, display_order, synced_at";

impl LeaveType {
    pub async fn upsert(pool: &SqlitePool, data: &UpsertLeaveType) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r#"INSERT INTO leave_types
                   (ragic_id, leave_type_name, annual_quota, requires_proof, display_order)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT(ragic_id) DO UPDATE SET
                   leave_type_name = excluded.leave_type_name,
                   annual_quota = excluded.annual_quota,
                   requires_proof = excluded.requires_proof,
                   display_order = excluded.display_order,
                   synced_at = CURRENT_TIMESTAMP
               RETURNING {COLUMNS}"#
        ))
        .bind(data.ragic_id)
        .bind(&data.leave_type_name)
        .bind(data.annual_quota)
        .bind(data.requires_proof)
        .bind(data.display_order)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_ragic_id(
        pool: &SqlitePool,
        ragic_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM leave_types WHERE ragic_id = $1"
        ))
        .bind(ragic_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all_ordered(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM leave_types ORDER BY display_order ASC, leave_type_name ASC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn delete_by_ragic_id(pool: &SqlitePool, ragic_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM leave_types WHERE ragic_id = $1")
            .bind(ragic_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM leave_types")
            .fetch_one(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::DBService;

    use super::*;

    #[tokio::test]
    async fn ordering_follows_display_order_then_name() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        for (id, name, order) in [(1, "Sick", Some(2)), (2, "Annual", Some(1)), (3, "Other", None)]
        {
            LeaveType::upsert(
                &db.pool,
                &UpsertLeaveType {
                    ragic_id: id,
                    leave_type_name: name.into(),
                    annual_quota: Some(7.0),
                    requires_proof: false,
                    display_order: order.map(i64::from),
                },
            )
            .await
            .unwrap();
        }

        let all = LeaveType::find_all_ordered(&db.pool).await.unwrap();
        let names: Vec<&str> = all.iter().map(|l| l.leave_type_name.as_str()).collect();
        // NULL display_order sorts first in SQLite ASC ordering.
        assert_eq!(names, vec!["Other", "Annual", "Sick"]);
    }
}
