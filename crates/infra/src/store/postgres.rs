//! Postgres-backed order store.
//!
//! Persists orders and their append-only status log with optimistic
//! concurrency enforced at the database level. Expected schema:
//!
//! ```sql
//! CREATE TABLE orders (
//!     id          UUID PRIMARY KEY,
//!     customer_id UUID NOT NULL,
//!     status_code TEXT NOT NULL,
//!     total       BIGINT NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     updated_at  TIMESTAMPTZ NOT NULL,
//!     version     BIGINT NOT NULL
//! );
//!
//! CREATE TABLE order_status_log (
//!     id          BIGSERIAL PRIMARY KEY,
//!     order_id    UUID NOT NULL REFERENCES orders (id),
//!     status_code TEXT NOT NULL,
//!     comment     TEXT,
//!     occurred_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE INDEX orders_status_updated_idx ON orders (status_code, updated_at);
//! CREATE INDEX order_status_log_order_idx ON order_status_log (order_id);
//! ```
//!
//! ## Concurrency
//!
//! `apply_transition` runs in a transaction that takes a row-level lock
//! (`SELECT ... FOR UPDATE`) on the order, validates the expected version,
//! and applies the update + history insert together. Concurrent writers on
//! the same order serialize on the row lock; a stale version fails with
//! `OrderStoreError::Concurrency` and rolls back.
//!
//! ## Thread Safety
//!
//! `PostgresOrderStore` is `Send + Sync`; all operations go through the
//! SQLx connection pool.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};

use storefront_core::{CustomerId, ExpectedVersion, OrderId};
use storefront_orders::{Order, Status, StatusHistoryEntry};

use super::r#trait::{OrderStore, OrderStoreError};

/// Postgres-backed order store.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Persist a new order and its seeded history.
    pub async fn insert_order(&self, order: &Order) -> Result<(), OrderStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status_code, total, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total() as i64)
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(order.version() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                OrderStoreError::AlreadyExists(order.id())
            } else {
                map_sqlx_error("insert_order", e)
            }
        })?;

        for entry in order.history() {
            insert_history_entry(&mut tx, order.id(), entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    /// Fetch an order with its full status history.
    pub async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, status_code, total, created_at, updated_at, version
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let order_row = OrderRow::from_row(&row)
            .map_err(|e| OrderStoreError::Storage(format!("failed to read order row: {e}")))?;
        let history = self.fetch_history(order_id).await?;

        Ok(Some(order_row.into_order(history)?))
    }

    /// All orders in `status` whose last status change predates `cutoff`.
    pub async fn fetch_stale(
        &self,
        status: Status,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, status_code, total, created_at, updated_at, version
            FROM orders
            WHERE status_code = $1 AND updated_at < $2
            ORDER BY updated_at ASC
            "#,
        )
        .bind(status.as_str())
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_stale", e))?;

        self.rows_into_orders(rows).await
    }

    /// All orders owned by `customer_id`, oldest first.
    pub async fn fetch_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, status_code, total, created_at, updated_at, version
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_by_customer", e))?;

        self.rows_into_orders(rows).await
    }

    /// Apply a status transition under a row-level lock.
    pub async fn transition_order(
        &self,
        order_id: OrderId,
        expected: ExpectedVersion,
        to: Status,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(OrderStoreError::NotFound(order_id));
        };

        let version: i64 = row
            .try_get("version")
            .map_err(|e| OrderStoreError::Storage(format!("failed to read version: {e}")))?;

        if !expected.matches(version as u64) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(OrderStoreError::Concurrency(format!(
                "expected {expected:?}, found {version}"
            )));
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET status_code = $2, updated_at = $3, version = version + 1
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(to.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        let entry = StatusHistoryEntry {
            status: to,
            comment,
            occurred_at: now,
        };
        insert_history_entry(&mut tx, order_id, &entry).await?;

        // Read back inside the transaction so the returned order is exactly
        // what gets committed.
        let order_row = sqlx::query(
            r#"
            SELECT id, customer_id, status_code, total, created_at, updated_at, version
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reread_order", e))?;

        let history_rows = sqlx::query(
            r#"
            SELECT status_code, comment, occurred_at
            FROM order_status_log
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reread_history", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let order_row = OrderRow::from_row(&order_row)
            .map_err(|e| OrderStoreError::Storage(format!("failed to read order row: {e}")))?;

        let mut history = Vec::with_capacity(history_rows.len());
        for row in &history_rows {
            let entry = HistoryRow::from_row(row)
                .map_err(|e| OrderStoreError::Storage(format!("failed to read history row: {e}")))?
                .into_entry()?;
            history.push(entry);
        }

        order_row.into_order(history)
    }

    async fn fetch_history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, OrderStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status_code, comment, occurred_at
            FROM order_status_log
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_history", e))?;

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = HistoryRow::from_row(&row)
                .map_err(|e| OrderStoreError::Storage(format!("failed to read history row: {e}")))?
                .into_entry()?;
            history.push(entry);
        }
        Ok(history)
    }

    async fn rows_into_orders(
        &self,
        rows: Vec<sqlx::postgres::PgRow>,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order_row = OrderRow::from_row(&row)
                .map_err(|e| OrderStoreError::Storage(format!("failed to read order row: {e}")))?;
            let history = self.fetch_history(OrderId::from_uuid(order_row.id)).await?;
            orders.push(order_row.into_order(history)?);
        }
        Ok(orders)
    }
}

async fn insert_history_entry(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    entry: &StatusHistoryEntry,
) -> Result<(), OrderStoreError> {
    sqlx::query(
        r#"
        INSERT INTO order_status_log (order_id, status_code, comment, occurred_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id.as_uuid())
    .bind(entry.status.as_str())
    .bind(entry.comment.as_deref())
    .bind(entry.occurred_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_history", e))?;
    Ok(())
}

/// Map SQLx errors to OrderStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> OrderStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation: a concurrent writer beat us to the row.
                Some("23505") => OrderStoreError::Concurrency(msg),
                _ => OrderStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            OrderStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => OrderStoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct OrderRow {
    id: uuid::Uuid,
    customer_id: uuid::Uuid,
    status_code: String,
    total: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for OrderRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            status_code: row.try_get("status_code")?,
            total: row.try_get("total")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, history: Vec<StatusHistoryEntry>) -> Result<Order, OrderStoreError> {
        let status: Status = self
            .status_code
            .parse()
            .map_err(|e| OrderStoreError::Storage(format!("corrupt status_code: {e:?}")))?;

        Ok(Order::from_parts(
            OrderId::from_uuid(self.id),
            CustomerId::from_uuid(self.customer_id),
            status,
            self.total as u64,
            self.created_at,
            self.updated_at,
            self.version as u64,
            history,
        ))
    }
}

#[derive(Debug)]
struct HistoryRow {
    status_code: String,
    comment: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for HistoryRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(HistoryRow {
            status_code: row.try_get("status_code")?,
            comment: row.try_get("comment")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl HistoryRow {
    fn into_entry(self) -> Result<StatusHistoryEntry, OrderStoreError> {
        let status: Status = self
            .status_code
            .parse()
            .map_err(|e| OrderStoreError::Storage(format!("corrupt status_code: {e:?}")))?;

        Ok(StatusHistoryEntry {
            status,
            comment: self.comment,
            occurred_at: self.occurred_at,
        })
    }
}

// Implement OrderStore

impl OrderStore for PostgresOrderStore {
    fn insert(&self, order: Order) -> Result<(), OrderStoreError> {
        // The OrderStore trait is synchronous, but Postgres operations require
        // async. We use tokio::runtime::Handle to run async code in a sync
        // context; this works when called from within a tokio runtime.
        runtime_handle()?.block_on(self.insert_order(&order))
    }

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        runtime_handle()?.block_on(self.fetch_order(order_id))
    }

    fn list_by_status_older_than(
        &self,
        status: Status,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderStoreError> {
        runtime_handle()?.block_on(self.fetch_stale(status, cutoff))
    }

    fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, OrderStoreError> {
        runtime_handle()?.block_on(self.fetch_by_customer(customer_id))
    }

    fn apply_transition(
        &self,
        order_id: OrderId,
        expected: ExpectedVersion,
        to: Status,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderStoreError> {
        runtime_handle()?.block_on(self.transition_order(order_id, expected, to, comment, now))
    }
}

fn runtime_handle() -> Result<tokio::runtime::Handle, OrderStoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        OrderStoreError::Storage(
            "PostgresOrderStore requires an async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
        )
    })
}
