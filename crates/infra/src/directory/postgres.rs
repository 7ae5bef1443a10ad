//! Postgres-backed directory over the `products`, `warehouses` and `users`
//! tables created by the store schema.

use std::sync::Arc;

use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use bodega_core::{ProductId, UserId, WarehouseId};

use super::{
    ActorRecord, ActorRef, Directory, DirectoryError, ProductRecord, ProductRef, WarehouseRecord,
    WarehouseRef,
};

#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, name, company), err)]
    pub async fn register_product(
        &self,
        sku: &str,
        name: &str,
        company: &str,
    ) -> Result<ProductRecord, DirectoryError> {
        let record = ProductRecord {
            id: ProductId::new(),
            sku: sku.to_string(),
            name: name.to_string(),
            company: company.to_string(),
        };
        sqlx::query("INSERT INTO products (id, sku, name, company) VALUES ($1, $2, $3, $4)")
            .bind(record.id.as_uuid())
            .bind(&record.sku)
            .bind(&record.name)
            .bind(&record.company)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product", sku, e))?;
        Ok(record)
    }

    #[instrument(skip(self, name), err)]
    pub async fn register_warehouse(
        &self,
        code: &str,
        name: &str,
    ) -> Result<WarehouseRecord, DirectoryError> {
        let record = WarehouseRecord {
            id: WarehouseId::new(),
            code: code.to_string(),
            name: name.to_string(),
        };
        sqlx::query("INSERT INTO warehouses (id, code, name) VALUES ($1, $2, $3)")
            .bind(record.id.as_uuid())
            .bind(&record.code)
            .bind(&record.name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("warehouse", code, e))?;
        Ok(record)
    }

    #[instrument(skip(self), err)]
    pub async fn register_actor(&self, email: &str) -> Result<ActorRecord, DirectoryError> {
        let record = ActorRecord {
            id: UserId::new(),
            email: email.to_string(),
        };
        sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
            .bind(record.id.as_uuid())
            .bind(&record.email)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("actor", email, e))?;
        Ok(record)
    }
}

#[async_trait::async_trait]
impl Directory for PostgresDirectory {
    #[instrument(skip(self), fields(product = %r), err)]
    async fn resolve_product(&self, r: &ProductRef) -> Result<ProductRecord, DirectoryError> {
        let query = match r {
            ProductRef::Id(id) => {
                sqlx::query("SELECT id, sku, name, company FROM products WHERE id = $1")
                    .bind(*id.as_uuid())
            }
            ProductRef::Sku(sku) => {
                sqlx::query("SELECT id, sku, name, company FROM products WHERE sku = $1")
                    .bind(sku.clone())
            }
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| DirectoryError::unknown("product", r))?;
        decode_product(&row)
    }

    #[instrument(skip(self), fields(warehouse = %r), err)]
    async fn resolve_warehouse(&self, r: &WarehouseRef) -> Result<WarehouseRecord, DirectoryError> {
        let query = match r {
            WarehouseRef::Id(id) => {
                sqlx::query("SELECT id, code, name FROM warehouses WHERE id = $1")
                    .bind(*id.as_uuid())
            }
            WarehouseRef::Code(code) => {
                sqlx::query("SELECT id, code, name FROM warehouses WHERE code = $1")
                    .bind(code.clone())
            }
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| DirectoryError::unknown("warehouse", r))?;
        decode_warehouse(&row)
    }

    #[instrument(skip(self), fields(actor = %r), err)]
    async fn resolve_actor(&self, r: &ActorRef) -> Result<ActorRecord, DirectoryError> {
        let query = match r {
            ActorRef::Id(id) => {
                sqlx::query("SELECT id, email FROM users WHERE id = $1").bind(*id.as_uuid())
            }
            ActorRef::Email(email) => {
                sqlx::query("SELECT id, email FROM users WHERE email = $1").bind(email.clone())
            }
        };
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| DirectoryError::unknown("actor", r))?;
        decode_actor(&row)
    }

    #[instrument(skip(self), err)]
    async fn warehouses(&self) -> Result<Vec<WarehouseRecord>, DirectoryError> {
        let rows = sqlx::query("SELECT id, code, name FROM warehouses ORDER BY name, code")
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(decode_warehouse).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>, DirectoryError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
        let rows = sqlx::query("SELECT id, sku, name, company FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(decode_product).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn actors_by_ids(&self, ids: &[UserId]) -> Result<Vec<ActorRecord>, DirectoryError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
        let rows = sqlx::query("SELECT id, email FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)?;
        rows.iter().map(decode_actor).collect()
    }
}

fn unavailable(err: sqlx::Error) -> DirectoryError {
    DirectoryError::Unavailable(err.to_string())
}

fn map_sqlx_error(kind: &'static str, key: &str, err: sqlx::Error) -> DirectoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            DirectoryError::Duplicate {
                kind,
                key: key.to_string(),
            }
        }
        _ => unavailable(err),
    }
}

fn decode_product(row: &PgRow) -> Result<ProductRecord, DirectoryError> {
    Ok(ProductRecord {
        id: ProductId::from_uuid(row.try_get("id").map_err(unavailable)?),
        sku: row.try_get("sku").map_err(unavailable)?,
        name: row.try_get("name").map_err(unavailable)?,
        company: row.try_get("company").map_err(unavailable)?,
    })
}

fn decode_warehouse(row: &PgRow) -> Result<WarehouseRecord, DirectoryError> {
    Ok(WarehouseRecord {
        id: WarehouseId::from_uuid(row.try_get("id").map_err(unavailable)?),
        code: row.try_get("code").map_err(unavailable)?,
        name: row.try_get("name").map_err(unavailable)?,
    })
}

fn decode_actor(row: &PgRow) -> Result<ActorRecord, DirectoryError> {
    Ok(ActorRecord {
        id: UserId::from_uuid(row.try_get("id").map_err(unavailable)?),
        email: row.try_get("email").map_err(unavailable)?,
    })
}
