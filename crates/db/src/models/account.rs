//! Employee account cache rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Account {
    pub ragic_id: i64,
    pub account_id: String,
    pub employee_id: Option<String>,
    pub name: String,
    pub status: bool,
    /// Ciphertext; `primary_email_hash` is the matching blind index.
    pub primary_email: Option<String>,
    pub primary_email_hash: Option<String>,
    pub org_code: Option<String>,
    pub org_name: Option<String>,
    pub rank_name: Option<String>,
    pub sales_dept_manager: Option<String>,
    pub approval_date: Option<NaiveDate>,
    pub effective_date: Option<NaiveDate>,
    pub resignation_date: Option<NaiveDate>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertAccount {
    pub ragic_id: i64,
    pub account_id: String,
    pub employee_id: Option<String>,
    pub name: String,
    pub status: bool,
    pub primary_email: Option<String>,
    pub primary_email_hash: Option<String>,
    pub org_code: Option<String>,
    pub org_name: Option<String>,
    pub rank_name: Option<String>,
    pub sales_dept_manager: Option<String>,
    pub approval_date: Option<NaiveDate>,
    pub effective_date: Option<NaiveDate>,
    pub resignation_date: Option<NaiveDate>,
}

const COLUMNS: &str = "ragic_id, account_id, employee_id, name, status, primary_email, \
     primary_email_hash, org_code, org_name, rank_name, sales_dept_manager, \
     approval_date, effective_date, resignation_date, synced_at";

impl Account {
    pub async fn upsert(pool: &SqlitePool, data: &UpsertAccount) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            r#"INSERT INTO accounts
                   (ragic_id, account_id, employee_id, name, status, primary_email,
                    primary_email_hash, org_code, org_name, rank_name, sales_dept_manager,
                    approval_date, effective_date, resignation_date)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
               ON CONFLICT(ragic_id) DO UPDATE SET
                   account_id = excluded.account_id,
                   employee_id = excluded.employee_id,
                   name = excluded.name,
                   status = excluded.status,
                   primary_email = excluded.primary_email,
                   primary_email_hash = excluded.primary_email_hash,
                   org_code = excluded.org_code,
                   org_name = excluded.org_name,
                   rank_name = excluded.rank_name,
                   sales_dept_manager = excluded.sales_dept_manager,
                   approval_date = excluded.approval_date,
                   effective_date = excluded.effective_date,
                   resignation_date = excluded.resignation_date,
                   synced_at = CURRENT_TIMESTAMP
               RETURNING {COLUMNS}"#
        ))
        .bind(data.ragic_id)
        .bind(&data.account_id)
        .bind(&data.employee_id)
        .bind(&data.name)
        .bind(data.status)
        .bind(&data.primary_email)
        .bind(&data.primary_email_hash)
        .bind(&data.org_code)
        .bind(&data.org_name)
        .bind(&data.rank_name)
        .bind(&data.sales_dept_manager)
        .bind(data.approval_date)
        .bind(data.effective_date)
        .bind(data.resignation_date)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_ragic_id(
        pool: &SqlitePool,
        ragic_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM accounts WHERE ragic_id = $1"
        ))
        .bind(ragic_id)
        .fetch_optional(pool)
        .await
    }

    /// Active accounts with this exact name, for manager-email lookups.
    pub async fn find_active_by_name(
        pool: &SqlitePool,
        name: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM accounts WHERE name = $1 AND status = 1"
        ))
        .bind(name)
        .fetch_all(pool)
        .await
    }

    pub async fn delete_by_ragic_id(pool: &SqlitePool, ragic_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM accounts WHERE ragic_id = $1")
            .bind(ragic_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(pool)
            .await
    }
}
