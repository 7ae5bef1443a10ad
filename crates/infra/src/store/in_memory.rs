use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use bodega_inventory::{LedgerPlan, Movement, MovementId, StockKey, StockLevel};

use super::r#trait::{CommittedPlan, LevelFilter, MovementFilter, StockStore, StoreError};

#[derive(Debug, Default)]
struct State {
    levels: HashMap<StockKey, StockLevel>,
    /// Append-only, in commit order.
    movements: Vec<Movement>,
    last_movement_id: i64,
}

/// In-memory stock store.
///
/// Intended for tests/dev. A commit validates the whole plan under the write
/// lock before touching any row, so a rejected plan leaves no trace.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of movements recorded so far.
    pub fn movement_count(&self) -> usize {
        self.state.read().map(|s| s.movements.len()).unwrap_or(0)
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

fn check_plan(state: &State, plan: &LedgerPlan) -> Result<(), StoreError> {
    for (idx, write) in plan.writes.iter().enumerate() {
        let key = write.key();
        if plan.writes[..idx].iter().any(|w| w.key() == key) {
            return Err(StoreError::Constraint(format!(
                "plan writes {key} more than once (index {idx})"
            )));
        }

        let actual = state.levels.get(&key).map(|l| l.version);
        write
            .expected()
            .check(actual)
            .map_err(|e| StoreError::Conflict(format!("{key}: {e}")))?;

        if write.quantity() < 0 {
            return Err(StoreError::Constraint(format!(
                "{key}: quantity cannot be negative ({})",
                write.quantity()
            )));
        }
    }

    for (idx, movement) in plan.movements.iter().enumerate() {
        if movement.delta == 0 {
            return Err(StoreError::Constraint(format!(
                "movement at index {idx} has zero delta"
            )));
        }
    }

    Ok(())
}

#[async_trait::async_trait]
impl StockStore for InMemoryStockStore {
    async fn load_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.levels.get(&key).cloned())
    }

    async fn commit(&self, plan: LedgerPlan) -> Result<CommittedPlan, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        check_plan(&state, &plan)?;

        let mut levels = Vec::with_capacity(plan.writes.len());
        for write in &plan.writes {
            let level = write.resulting_level();
            state.levels.insert(level.key, level.clone());
            levels.push(level);
        }

        let created_at = Utc::now();
        let mut movements = Vec::with_capacity(plan.movements.len());
        for draft in plan.movements {
            state.last_movement_id += 1;
            let movement = Movement::committed(draft, MovementId(state.last_movement_id), created_at);
            state.movements.push(movement.clone());
            movements.push(movement);
        }

        Ok(CommittedPlan { levels, movements })
    }

    async fn levels(&self, filter: LevelFilter) -> Result<Vec<StockLevel>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .levels
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }

    async fn movements(
        &self,
        filter: MovementFilter,
        limit: u32,
    ) -> Result<Vec<Movement>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| filter.matches(m))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
