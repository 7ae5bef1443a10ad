use std::collections::HashMap;
use std::sync::RwLock;

use bodega_core::{ProductId, UserId, WarehouseId};

use super::{
    ActorRecord, ActorRef, Directory, DirectoryError, ProductRecord, ProductRef, WarehouseRecord,
    WarehouseRef,
};

#[derive(Debug, Default)]
struct Records {
    products: HashMap<ProductId, ProductRecord>,
    warehouses: HashMap<WarehouseId, WarehouseRecord>,
    actors: HashMap<UserId, ActorRecord>,
}

/// In-memory directory for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    records: RwLock<Records>,
}

fn poisoned() -> DirectoryError {
    DirectoryError::Unavailable("lock poisoned".to_string())
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_product(
        &self,
        sku: impl Into<String>,
        name: impl Into<String>,
        company: impl Into<String>,
    ) -> Result<ProductRecord, DirectoryError> {
        let sku = sku.into();
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.products.values().any(|p| p.sku == sku) {
            return Err(DirectoryError::Duplicate { kind: "product", key: sku });
        }
        let record = ProductRecord {
            id: ProductId::new(),
            sku,
            name: name.into(),
            company: company.into(),
        };
        records.products.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn register_warehouse(
        &self,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<WarehouseRecord, DirectoryError> {
        let code = code.into();
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.warehouses.values().any(|w| w.code == code) {
            return Err(DirectoryError::Duplicate { kind: "warehouse", key: code });
        }
        let record = WarehouseRecord {
            id: WarehouseId::new(),
            code,
            name: name.into(),
        };
        records.warehouses.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn register_actor(&self, email: impl Into<String>) -> Result<ActorRecord, DirectoryError> {
        let email = email.into();
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.actors.values().any(|a| a.email == email) {
            return Err(DirectoryError::Duplicate { kind: "actor", key: email });
        }
        let record = ActorRecord {
            id: UserId::new(),
            email,
        };
        records.actors.insert(record.id, record.clone());
        Ok(record)
    }
}

#[async_trait::async_trait]
impl Directory for InMemoryDirectory {
    async fn resolve_product(&self, r: &ProductRef) -> Result<ProductRecord, DirectoryError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let found = match r {
            ProductRef::Id(id) => records.products.get(id),
            ProductRef::Sku(sku) => records.products.values().find(|p| &p.sku == sku),
        };
        found.cloned().ok_or_else(|| DirectoryError::unknown("product", r))
    }

    async fn resolve_warehouse(&self, r: &WarehouseRef) -> Result<WarehouseRecord, DirectoryError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let found = match r {
            WarehouseRef::Id(id) => records.warehouses.get(id),
            WarehouseRef::Code(code) => records.warehouses.values().find(|w| &w.code == code),
        };
        found.cloned().ok_or_else(|| DirectoryError::unknown("warehouse", r))
    }

    async fn resolve_actor(&self, r: &ActorRef) -> Result<ActorRecord, DirectoryError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let found = match r {
            ActorRef::Id(id) => records.actors.get(id),
            ActorRef::Email(email) => records.actors.values().find(|a| &a.email == email),
        };
        found.cloned().ok_or_else(|| DirectoryError::unknown("actor", r))
    }

    async fn warehouses(&self) -> Result<Vec<WarehouseRecord>, DirectoryError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut all: Vec<_> = records.warehouses.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.code.cmp(&b.code)));
        Ok(all)
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<ProductRecord>, DirectoryError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(ids
            .iter()
            .filter_map(|id| records.products.get(id).cloned())
            .collect())
    }

    async fn actors_by_ids(&self, ids: &[UserId]) -> Result<Vec<ActorRecord>, DirectoryError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(ids
            .iter()
            .filter_map(|id| records.actors.get(id).cloned())
            .collect())
    }
}
