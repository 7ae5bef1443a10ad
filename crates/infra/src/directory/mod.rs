//! Read-only lookup of master data (products, warehouses, actors).
//!
//! The ledger only needs identities and display names: to validate that the
//! ids of a request exist before mutating anything, and to word transfer
//! reasons and read-side views. Master-data maintenance lives elsewhere; the
//! `register_*` helpers on the concrete directories exist for seeding.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bodega_core::{ProductId, UserId, WarehouseId};

pub use in_memory::InMemoryDirectory;
pub use postgres::PostgresDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub company: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRecord {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub id: UserId,
    pub email: String,
}

/// A product by id or by sku.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductRef {
    Id(ProductId),
    Sku(String),
}

/// A warehouse by id or by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseRef {
    Id(WarehouseId),
    Code(String),
}

/// An actor by id or by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRef {
    Id(UserId),
    Email(String),
}

macro_rules! impl_ref {
    ($r:ident, $id:ty, $alt:ident, $alt_name:literal) => {
        impl From<$id> for $r {
            fn from(value: $id) -> Self {
                $r::Id(value)
            }
        }

        impl core::fmt::Display for $r {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $r::Id(id) => write!(f, "id {id}"),
                    $r::$alt(s) => write!(f, "{} '{}'", $alt_name, s),
                }
            }
        }

        impl $r {
            /// Parse a CLI-style reference: a UUID is an id, anything else the alternate key.
            pub fn parse(raw: &str) -> Self {
                match raw.trim().parse::<$id>() {
                    Ok(id) => $r::Id(id),
                    Err(_) => $r::$alt(raw.trim().to_string()),
                }
            }
        }
    };
}

impl_ref!(ProductRef, ProductId, Sku, "sku");
impl_ref!(WarehouseRef, WarehouseId, Code, "code");
impl_ref!(ActorRef, UserId, Email, "email");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The reference does not resolve to any record.
    #[error("unknown {kind}: {reference}")]
    Unknown { kind: &'static str, reference: String },

    /// A unique key (sku, code, email) is already taken.
    #[error("duplicate {kind}: {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

impl DirectoryError {
    pub fn unknown(kind: &'static str, reference: impl core::fmt::Display) -> Self {
        Self::Unknown {
            kind,
            reference: reference.to_string(),
        }
    }
}

/// Master-data lookups consumed by the ledger and the query side.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    async fn resolve_product(&self, r: &ProductRef) -> Result<ProductRecord, DirectoryError>;

    async fn resolve_warehouse(&self, r: &WarehouseRef) -> Result<WarehouseRecord, DirectoryError>;

    async fn resolve_actor(&self, r: &ActorRef) -> Result<ActorRecord, DirectoryError>;

    /// All warehouses, ordered by name.
    async fn warehouses(&self) -> Result<Vec<WarehouseRecord>, DirectoryError>;

    /// Products with the given ids; unknown ids are silently absent.
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>, DirectoryError>;

    /// Actors with the given ids; unknown ids are silently absent.
    async fn actors_by_ids(&self, ids: &[UserId]) -> Result<Vec<ActorRecord>, DirectoryError>;
}

#[async_trait::async_trait]
impl<D> Directory for Arc<D>
where
    D: Directory + ?Sized,
{
    async fn resolve_product(&self, r: &ProductRef) -> Result<ProductRecord, DirectoryError> {
        (**self).resolve_product(r).await
    }

    async fn resolve_warehouse(&self, r: &WarehouseRef) -> Result<WarehouseRecord, DirectoryError> {
        (**self).resolve_warehouse(r).await
    }

    async fn resolve_actor(&self, r: &ActorRef) -> Result<ActorRecord, DirectoryError> {
        (**self).resolve_actor(r).await
    }

    async fn warehouses(&self) -> Result<Vec<WarehouseRecord>, DirectoryError> {
        (**self).warehouses().await
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>, DirectoryError> {
        (**self).products_by_ids(ids).await
    }

    async fn actors_by_ids(&self, ids: &[UserId]) -> Result<Vec<ActorRecord>, DirectoryError> {
        (**self).actors_by_ids(ids).await
    }
}
