//! Postgres-backed stock store.
//!
//! Stock levels and movements live in `stock_levels` / `movements` (see
//! `schema.sql`). Concurrency control is optimistic: every level write is
//! conditioned on the version the ledger read, inside one transaction that
//! also appends the movements. Level rows are written in `StockKey` order.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Two writers initialized the same triple |
//! | Database (foreign key violation) | `23503` | `Constraint` | Unknown product / warehouse / user |
//! | Database (check constraint violation) | `23514` | `Constraint` | Negative quantity, zero delta, blank reason |
//! | Database (serialization failure) | `40001` | `Conflict` | Serializable isolation retry |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Postgres aborted one of two lock waiters |
//! | Database (lock not available) | `55P03` | `Conflict` | Row lock wait timed out |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / Io / Tls / timeout | N/A | `Unavailable` | Connection failures |
//! | ColumnDecode / Decode | N/A | `Corrupt` | Unexpected row shape |

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use bodega_core::{ProductId, UserId, WarehouseId};
use bodega_inventory::{
    LedgerPlan, LevelWrite, Movement, MovementId, NewMovement, StockKey, StockLevel, Unit,
};

use super::r#trait::{CommittedPlan, LevelFilter, MovementFilter, StockStore, StoreError};

/// Idempotent DDL for the ledger tables and the master-data tables they reference.
pub const SCHEMA: &str = include_str!("schema.sql");

/// Postgres-backed stock store.
///
/// Uses the SQLx connection pool (thread-safe, cheap to clone).
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables, constraints and the append-only trigger if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn apply_write(
        tx: &mut Transaction<'_, Postgres>,
        write: &LevelWrite,
    ) -> Result<u64, StoreError> {
        let result = match write {
            LevelWrite::Initialize { key, quantity } => {
                sqlx::query(
                    r#"
                    INSERT INTO stock_levels (warehouse_id, product_id, unit, quantity, version)
                    VALUES ($1, $2, $3, $4, 1)
                    ON CONFLICT (warehouse_id, product_id, unit) DO NOTHING
                    "#,
                )
                .bind(key.warehouse_id.as_uuid())
                .bind(key.product_id.as_uuid())
                .bind(key.unit.as_str())
                .bind(*quantity)
                .execute(&mut **tx)
                .await
            }
            LevelWrite::Update {
                key,
                version,
                quantity,
            } => {
                sqlx::query(
                    r#"
                    UPDATE stock_levels
                    SET quantity = $4, version = version + 1
                    WHERE warehouse_id = $1 AND product_id = $2 AND unit = $3 AND version = $5
                    "#,
                )
                .bind(key.warehouse_id.as_uuid())
                .bind(key.product_id.as_uuid())
                .bind(key.unit.as_str())
                .bind(*quantity)
                .bind(*version as i64)
                .execute(&mut **tx)
                .await
            }
        };

        result
            .map(|r| r.rows_affected())
            .map_err(|e| map_sqlx_error("write_level", e))
    }

    async fn append_movement(
        tx: &mut Transaction<'_, Postgres>,
        draft: NewMovement,
    ) -> Result<Movement, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO movements (product_id, warehouse_id, unit, delta, reason, actor_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, created_at
            "#,
        )
        .bind(draft.key.product_id.as_uuid())
        .bind(draft.key.warehouse_id.as_uuid())
        .bind(draft.key.unit.as_str())
        .bind(draft.delta)
        .bind(&draft.reason)
        .bind(draft.actor_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("append_movement", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error("append_movement", e))?;

        Ok(Movement::committed(draft, MovementId(id), created_at))
    }
}

/// Level rows are locked in key order, so plans touching the same rows from
/// opposite directions queue up instead of deadlocking.
fn lock_order(writes: &[LevelWrite]) -> Vec<&LevelWrite> {
    let mut ordered: Vec<&LevelWrite> = writes.iter().collect();
    ordered.sort_by_key(|w| w.key());
    ordered
}

/// Roll back and hand back the error that caused it.
async fn abort(tx: Transaction<'_, Postgres>, cause: StoreError) -> StoreError {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, cause = %cause, "rollback failed, connection discards the transaction");
    }
    cause
}

#[async_trait::async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(skip(self, key), fields(key = %key), err)]
    async fn load_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT warehouse_id, product_id, unit, quantity, version
            FROM stock_levels
            WHERE warehouse_id = $1 AND product_id = $2 AND unit = $3
            "#,
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.unit.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_level", e))?;

        row.map(|r| StockLevel::try_from(LevelRow::decode(&r)?))
            .transpose()
    }

    #[instrument(
        skip(self, plan),
        fields(writes = plan.writes.len(), movements = plan.movements.len()),
        err
    )]
    async fn commit(&self, plan: LedgerPlan) -> Result<CommittedPlan, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for write in lock_order(&plan.writes) {
            let affected = match Self::apply_write(&mut tx, write).await {
                Ok(n) => n,
                Err(e) => return Err(abort(tx, e).await),
            };
            if affected == 0 {
                let conflict = StoreError::Conflict(format!(
                    "{}: expected {:?} no longer holds",
                    write.key(),
                    write.expected()
                ));
                return Err(abort(tx, conflict).await);
            }
        }
        let levels = plan.resulting_levels();

        let mut movements = Vec::with_capacity(plan.movements.len());
        for draft in plan.movements {
            match Self::append_movement(&mut tx, draft).await {
                Ok(m) => movements.push(m),
                Err(e) => return Err(abort(tx, e).await),
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommittedPlan { levels, movements })
    }

    #[instrument(skip(self), err)]
    async fn levels(&self, filter: LevelFilter) -> Result<Vec<StockLevel>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT warehouse_id, product_id, unit, quantity, version
            FROM stock_levels
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
              AND ($2::uuid IS NULL OR product_id = $2)
              AND ($3::bigint IS NULL OR quantity <= $3)
            "#,
        )
        .bind(filter.warehouse_id.map(Uuid::from))
        .bind(filter.product_id.map(Uuid::from))
        .bind(filter.max_quantity)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("levels", e))?;

        rows.iter()
            .map(|r| StockLevel::try_from(LevelRow::decode(r)?))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn movements(
        &self,
        filter: MovementFilter,
        limit: u32,
    ) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, warehouse_id, unit, delta, reason, actor_id, created_at
            FROM movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(filter.product_id.map(Uuid::from))
        .bind(filter.warehouse_id.map(Uuid::from))
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements", e))?;

        rows.iter()
            .map(|r| Movement::try_from(MovementRow::decode(r)?))
            .collect()
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            classify_sql_state(db_err.code().as_deref(), msg)
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("failed to decode row in {}: {}", operation, err))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

pub(crate) fn classify_sql_state(code: Option<&str>, msg: String) -> StoreError {
    match code {
        Some("23505") | Some("40001") | Some("40P01") | Some("55P03") => StoreError::Conflict(msg),
        Some("23503") | Some("23514") => StoreError::Constraint(msg),
        _ => StoreError::Unavailable(msg),
    }
}

fn parse_unit(raw: &str) -> Result<Unit, StoreError> {
    Unit::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

// SQLx row types

#[derive(Debug)]
struct LevelRow {
    warehouse_id: Uuid,
    product_id: Uuid,
    unit: String,
    quantity: i64,
    version: i64,
}

impl LevelRow {
    fn decode(row: &sqlx::postgres::PgRow) -> Result<Self, StoreError> {
        let get = |e| map_sqlx_error("decode_level", e);
        Ok(LevelRow {
            warehouse_id: row.try_get("warehouse_id").map_err(get)?,
            product_id: row.try_get("product_id").map_err(get)?,
            unit: row.try_get("unit").map_err(get)?,
            quantity: row.try_get("quantity").map_err(get)?,
            version: row.try_get("version").map_err(get)?,
        })
    }
}

impl TryFrom<LevelRow> for StockLevel {
    type Error = StoreError;

    fn try_from(row: LevelRow) -> Result<Self, Self::Error> {
        Ok(StockLevel {
            key: StockKey::new(
                WarehouseId::from_uuid(row.warehouse_id),
                ProductId::from_uuid(row.product_id),
                parse_unit(&row.unit)?,
            ),
            quantity: row.quantity,
            version: row.version as u64,
        })
    }
}

#[derive(Debug)]
struct MovementRow {
    id: i64,
    product_id: Uuid,
    warehouse_id: Uuid,
    unit: String,
    delta: i64,
    reason: String,
    actor_id: Uuid,
    created_at: DateTime<Utc>,
}

impl MovementRow {
    fn decode(row: &sqlx::postgres::PgRow) -> Result<Self, StoreError> {
        let get = |e| map_sqlx_error("decode_movement", e);
        Ok(MovementRow {
            id: row.try_get("id").map_err(get)?,
            product_id: row.try_get("product_id").map_err(get)?,
            warehouse_id: row.try_get("warehouse_id").map_err(get)?,
            unit: row.try_get("unit").map_err(get)?,
            delta: row.try_get("delta").map_err(get)?,
            reason: row.try_get("reason").map_err(get)?,
            actor_id: row.try_get("actor_id").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        Ok(Movement {
            id: MovementId(row.id),
            warehouse_id: WarehouseId::from_uuid(row.warehouse_id),
            product_id: ProductId::from_uuid(row.product_id),
            unit: parse_unit(&row.unit)?,
            delta: row.delta,
            reason: row.reason,
            actor_id: UserId::from_uuid(row.actor_id),
            created_at: row.created_at,
        })
    }
}
