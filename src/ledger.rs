//! # Ledger Persistence
//!
//! Confirmed transactions end up in the `transactions` table. The dispatcher only
//! knows the [`Ledger`] trait; [`PgLedger`] is the Postgres implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::info;

use crate::workspace::TransactionFields;

/// Width of the `vendor` column
pub const VENDOR_MAX_CHARS: usize = 100;
/// Width of the `category` column
pub const CATEGORY_MAX_CHARS: usize = 50;

/// A persisted ledger record
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub amount: f64,
    pub vendor: String,
    pub category: String,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ledger collaborator used when a transaction is confirmed
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Persist a confirmed transaction for `user_id`
    async fn create(&self, user_id: &str, fields: &TransactionFields) -> Result<LedgerEntry>;

    /// Most recent entries for `user_id`, newest first
    async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>>;
}

/// Postgres-backed ledger
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to ledger database")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Initialize the ledger schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing ledger schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transactions (
            id BIGSERIAL PRIMARY KEY,
            user_id VARCHAR(100) NOT NULL,
            amount DOUBLE PRECISION NOT NULL,
            vendor VARCHAR(100) NOT NULL,
            category VARCHAR(50) NOT NULL,
            transaction_date DATE NOT NULL,
            description TEXT,
            image_url TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create transactions table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_user_id ON transactions (user_id)")
        .execute(pool)
        .await
        .context("Failed to create user_id index")?;

    info!("Ledger schema initialized successfully");
    Ok(())
}

#[async_trait]
impl Ledger for PgLedger {
    async fn create(&self, user_id: &str, fields: &TransactionFields) -> Result<LedgerEntry> {
        info!(user_id = %user_id, amount = fields.amount, vendor = %fields.vendor, "Creating ledger entry");

        let entry = sqlx::query_as::<_, LedgerEntry>(
            "INSERT INTO transactions (user_id, amount, vendor, category, transaction_date, description, image_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, user_id, amount, vendor, category, transaction_date, description, image_url, created_at",
        )
        .bind(user_id)
        .bind(fields.amount)
        .bind(&fields.vendor)
        .bind(&fields.category)
        .bind(fields.date)
        .bind(&fields.description)
        .bind(&fields.image_ref)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert ledger entry")?;

        info!(user_id = %user_id, entry_id = entry.id, "Ledger entry created");
        Ok(entry)
    }

    async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT id, user_id, amount, vendor, category, transaction_date, description, image_url, created_at
             FROM transactions
             WHERE user_id = $1
             ORDER BY transaction_date DESC, id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read recent ledger entries")?;

        Ok(entries)
    }
}
