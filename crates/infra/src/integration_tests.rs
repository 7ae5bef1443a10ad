//! Integration tests for the full ledger pipeline.
//!
//! Tests: Command → Directory → StockStore → StockQuery
//!
//! Verifies:
//! - Adjustments, transfers and imports leave levels and movements consistent
//! - Rejected operations leave no trace
//! - Lost commit races are re-planned, bounded, and never drive stock negative

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use bodega_core::{ProductId, UserId, WarehouseId};
    use bodega_inventory::{
        AdjustStock, LedgerPlan, LevelWrite, NewMovement, SetAbsoluteStock, StockKey, StockLevel,
        TransferStock, Unit,
    };

    use crate::directory::{InMemoryDirectory, ProductRecord, WarehouseRecord};
    use crate::import::{IMPORT_REASON, StockImporter};
    use crate::ledger::{LedgerError, StockLedger};
    use crate::query::StockQuery;
    use crate::store::postgres::classify_sql_state;
    use crate::store::{
        CommittedPlan, InMemoryStockStore, LevelFilter, MovementFilter, StockStore, StoreError,
    };

    struct Catalog {
        directory: Arc<InMemoryDirectory>,
        central: WarehouseRecord,
        south: WarehouseRecord,
        malbec: ProductRecord,
        cabernet: ProductRecord,
        torrontes: ProductRecord,
        actor: UserId,
    }

    fn catalog() -> Catalog {
        let directory = Arc::new(InMemoryDirectory::new());
        let central = directory.register_warehouse("DC01", "Depósito Central").unwrap();
        let south = directory.register_warehouse("DS01", "Depósito Sur").unwrap();
        let malbec = directory.register_product("MAL001", "Malbec", "Bodega Norte").unwrap();
        let cabernet = directory.register_product("CAB002", "Cabernet Sauvignon", "Bodega Norte").unwrap();
        let torrontes = directory.register_product("TOR003", "Torrontés", "Finca Alta").unwrap();
        let actor = directory.register_actor("deposito@example.com").unwrap().id;
        Catalog {
            directory,
            central,
            south,
            malbec,
            cabernet,
            torrontes,
            actor,
        }
    }

    type MemLedger = StockLedger<Arc<InMemoryStockStore>, Arc<InMemoryDirectory>>;

    fn setup() -> (MemLedger, Catalog) {
        let catalog = catalog();
        let ledger = StockLedger::new(Arc::new(InMemoryStockStore::new()), catalog.directory.clone());
        (ledger, catalog)
    }

    fn key(warehouse: &WarehouseRecord, product: &ProductRecord) -> StockKey {
        StockKey::new(warehouse.id, product.id, Unit::Bottle)
    }

    fn adjust(key: StockKey, delta: i64, actor: UserId) -> AdjustStock {
        AdjustStock {
            key,
            delta,
            reason: "Ajuste manual".to_string(),
            actor_id: actor,
        }
    }

    fn transfer(c: &Catalog, from: WarehouseId, to: WarehouseId, product: ProductId, qty: i64) -> TransferStock {
        TransferStock {
            from_warehouse_id: from,
            to_warehouse_id: to,
            product_id: product,
            unit: Unit::Bottle,
            quantity: qty,
            actor_id: c.actor,
        }
    }

    /// Σ deltas per triple must equal the stored quantity.
    async fn assert_ledger_consistent<S: StockStore>(store: &S) {
        let movements = store.movements(MovementFilter::default(), u32::MAX).await.unwrap();
        let mut sums: HashMap<StockKey, i64> = HashMap::new();
        for m in &movements {
            *sums.entry(m.key()).or_default() += m.delta;
        }
        let levels = store.levels(LevelFilter::default()).await.unwrap();
        assert_eq!(levels.len(), sums.len());
        for level in levels {
            assert!(level.quantity >= 0);
            assert_eq!(sums.get(&level.key).copied(), Some(level.quantity), "{}", level.key);
        }
    }

    #[tokio::test]
    async fn adjust_creates_level_and_movement() {
        let (ledger, c) = setup();
        let k = key(&c.central, &c.malbec);

        let receipt = ledger.adjust(adjust(k, 120, c.actor)).await.unwrap();

        assert_eq!(receipt.level.quantity, 120);
        let movement = receipt.movement.unwrap();
        assert_eq!(movement.delta, 120);
        assert_eq!(movement.reason, "Ajuste manual");
        assert_eq!(movement.key(), k);
        assert_eq!(ledger.store().movement_count(), 1);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_no_trace() {
        let (ledger, c) = setup();
        let k = key(&c.central, &c.malbec);
        ledger.adjust(adjust(k, 10, c.actor)).await.unwrap();

        let err = ledger.adjust(adjust(k, -15, c.actor)).await.unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                requested: 15,
                available: 10
            }
        );
        let level = ledger.store().load_level(k).await.unwrap().unwrap();
        assert_eq!((level.quantity, level.version), (10, 1));
        assert_eq!(ledger.store().movement_count(), 1);
    }

    #[tokio::test]
    async fn first_negative_adjustment_is_insufficient_against_zero() {
        let (ledger, c) = setup();
        let k = key(&c.south, &c.cabernet);

        let err = ledger.adjust(adjust(k, -1, c.actor)).await.unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                requested: 1,
                available: 0
            }
        );
        assert_eq!(ledger.store().load_level(k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn transfer_moves_stock_and_names_both_legs() {
        let (ledger, c) = setup();
        let src = key(&c.central, &c.cabernet);
        let dst = key(&c.south, &c.cabernet);
        ledger.adjust(adjust(src, 80, c.actor)).await.unwrap();
        ledger.adjust(adjust(dst, 50, c.actor)).await.unwrap();

        let receipt = ledger
            .transfer(transfer(&c, c.central.id, c.south.id, c.cabernet.id, 30))
            .await
            .unwrap();

        assert!(receipt.success);
        assert_eq!(receipt.source.quantity, 50);
        assert_eq!(receipt.destination.quantity, 80);
        assert_eq!(receipt.outgoing.delta, -30);
        assert_eq!(receipt.outgoing.reason, "Transferencia a Depósito Sur");
        assert_eq!(receipt.incoming.delta, 30);
        assert_eq!(receipt.incoming.reason, "Transferencia desde Depósito Central");
        assert!(receipt.outgoing.id < receipt.incoming.id);

        assert_eq!(ledger.store().load_level(src).await.unwrap().unwrap().quantity, 50);
        assert_eq!(ledger.store().load_level(dst).await.unwrap().unwrap().quantity, 80);
        assert_ledger_consistent(ledger.store()).await;
    }

    #[tokio::test]
    async fn transfer_from_empty_source_creates_nothing() {
        let (ledger, c) = setup();

        let err = ledger
            .transfer(transfer(&c, c.central.id, c.south.id, c.malbec.id, 30))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                requested: 30,
                available: 0
            }
        );
        assert_eq!(ledger.store().load_level(key(&c.south, &c.malbec)).await.unwrap(), None);
        assert_eq!(ledger.store().movement_count(), 0);
    }

    #[tokio::test]
    async fn short_transfer_leaves_both_existing_rows_untouched() {
        let (ledger, c) = setup();
        let src = key(&c.central, &c.torrontes);
        let dst = key(&c.south, &c.torrontes);
        ledger.adjust(adjust(src, 10, c.actor)).await.unwrap();
        ledger.adjust(adjust(dst, 50, c.actor)).await.unwrap();
        let before_src = ledger.store().load_level(src).await.unwrap().unwrap();
        let before_dst = ledger.store().load_level(dst).await.unwrap().unwrap();
        let movements_before = ledger.store().movement_count();

        let err = ledger
            .transfer(transfer(&c, c.central.id, c.south.id, c.torrontes.id, 30))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                requested: 30,
                available: 10
            }
        );
        assert_eq!(ledger.store().load_level(src).await.unwrap().unwrap(), before_src);
        assert_eq!(ledger.store().load_level(dst).await.unwrap().unwrap(), before_dst);
        assert_eq!((before_src.quantity, before_src.version), (10, 1));
        assert_eq!((before_dst.quantity, before_dst.version), (50, 1));
        assert_eq!(ledger.store().movement_count(), movements_before);
    }

    #[tokio::test]
    async fn transfer_rejects_same_warehouse_and_unknown_destination() {
        let (ledger, c) = setup();
        ledger
            .adjust(adjust(key(&c.central, &c.malbec), 5, c.actor))
            .await
            .unwrap();

        let same = ledger
            .transfer(transfer(&c, c.central.id, c.central.id, c.malbec.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(same, LedgerError::InvalidInput(_)));

        let unknown = ledger
            .transfer(transfer(&c, c.central.id, WarehouseId::new(), c.malbec.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(unknown, LedgerError::UnknownEntity { kind: "warehouse", .. }));
        assert_eq!(ledger.store().movement_count(), 1);
    }

    #[tokio::test]
    async fn import_sets_absolute_quantities_and_is_idempotent() {
        let (ledger, c) = setup();
        let k = key(&c.central, &c.torrontes);
        ledger.adjust(adjust(k, 80, c.actor)).await.unwrap();
        let importer = StockImporter::new(&ledger);

        let report = importer
            .import_stock("sku,warehouseCode,quantity\nTOR003,DC01,100\n", c.actor)
            .await
            .unwrap();
        assert_eq!((report.success, report.skipped), (1, 0));
        assert!(report.errors.is_empty());

        let latest = ledger
            .store()
            .movements(MovementFilter::default(), 1)
            .await
            .unwrap();
        assert_eq!(latest[0].delta, 20);
        assert_eq!(latest[0].reason, IMPORT_REASON);

        let again = importer
            .import_stock("sku,warehouseCode,quantity\nTOR003,DC01,100\n", c.actor)
            .await
            .unwrap();
        assert_eq!((again.success, again.skipped), (1, 1));
        assert_eq!(ledger.store().movement_count(), 2);
        assert_eq!(ledger.store().load_level(k).await.unwrap().unwrap().quantity, 100);
    }

    #[tokio::test]
    async fn import_reports_bad_rows_and_keeps_going() {
        let (ledger, c) = setup();
        let importer = StockImporter::new(&ledger);
        let csv = "\
sku,warehouseCode,quantity
MAL001,DC01,12
NOPE99,DC01,5
MAL001,XX99,5
CAB002,DS01,-3
CAB002,DS01,abc
CAB002,,4

 TOR003 , DS01 , 7
";

        let report = importer.import_stock(csv, c.actor).await.unwrap();

        assert_eq!(report.success, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(
            report.errors.iter().map(|e| e.row).collect::<Vec<_>>(),
            vec![3, 4, 5, 6, 7]
        );
        assert!(report.errors[0].message.contains("NOPE99"));
        assert!(report.errors[4].message.contains("warehouseCode"));

        let query = StockQuery::new(ledger.store().clone(), ledger.directory().clone());
        assert_eq!(query.total_stock(c.malbec.id).await.unwrap(), 12);
        assert_eq!(query.total_stock(c.torrontes.id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn import_without_required_header_is_refused() {
        let (ledger, c) = setup();
        let err = StockImporter::new(&ledger)
            .import_stock("sku,quantity\nMAL001,3\n", c.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::import::ImportError::MissingColumn("warehouseCode")));
    }

    #[tokio::test]
    async fn set_absolute_drives_to_target_then_no_ops() {
        let (ledger, c) = setup();
        let k = key(&c.south, &c.malbec);
        ledger.adjust(adjust(k, 30, c.actor)).await.unwrap();

        let set = |target| SetAbsoluteStock {
            key: k,
            target_quantity: target,
            reason: "Conteo físico".to_string(),
            actor_id: c.actor,
        };
        let down = ledger.set_absolute(set(12)).await.unwrap();
        assert_eq!(down.movement.map(|m| m.delta), Some(-18));

        let same = ledger.set_absolute(set(12)).await.unwrap();
        assert_eq!(same.movement, None);
        assert_eq!(same.level.quantity, 12);
        assert_ledger_consistent(ledger.store()).await;
    }

    #[tokio::test]
    async fn mixed_sequence_conserves_stock() {
        let (ledger, c) = setup();
        let products = [&c.malbec, &c.cabernet];
        for p in products {
            ledger.adjust(adjust(key(&c.central, p), 40, c.actor)).await.unwrap();
        }
        for (i, p) in products.iter().enumerate() {
            ledger
                .transfer(transfer(&c, c.central.id, c.south.id, p.id, 10 + i as i64))
                .await
                .unwrap();
            ledger
                .transfer(transfer(&c, c.south.id, c.central.id, p.id, 3))
                .await
                .unwrap();
        }
        let _ = ledger.adjust(adjust(key(&c.south, &c.malbec), -100, c.actor)).await;

        let query = StockQuery::new(ledger.store().clone(), ledger.directory().clone());
        for p in products {
            assert_eq!(query.total_stock(p.id).await.unwrap(), 40);
        }
        assert_ledger_consistent(ledger.store()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decrements_never_oversell() {
        let (ledger, c) = setup();
        let ledger = Arc::new(ledger.with_max_commit_attempts(100));
        let k = key(&c.central, &c.malbec);
        ledger.adjust(adjust(k, 10, c.actor)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            let cmd = adjust(k, -1, c.actor);
            handles.push(tokio::spawn(async move { ledger.adjust(cmd).await }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(LedgerError::InsufficientStock { available: 0, .. }) => {}
                Err(other) => panic!("unexpected failure: {other}"),
            }
        }

        assert_eq!(successes, 10);
        assert_eq!(ledger.store().load_level(k).await.unwrap().unwrap().quantity, 0);
        assert_ledger_consistent(ledger.store()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_conserve_total() {
        let (ledger, c) = setup();
        let ledger = Arc::new(ledger.with_max_commit_attempts(100));
        ledger.adjust(adjust(key(&c.central, &c.cabernet), 50, c.actor)).await.unwrap();
        ledger.adjust(adjust(key(&c.south, &c.cabernet), 50, c.actor)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..24 {
            let ledger = ledger.clone();
            let (from, to) = if i % 2 == 0 {
                (c.central.id, c.south.id)
            } else {
                (c.south.id, c.central.id)
            };
            let cmd = transfer(&c, from, to, c.cabernet.id, 7);
            handles.push(tokio::spawn(async move { ledger.transfer(cmd).await }));
        }
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => assert!(receipt.success),
                Err(LedgerError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected failure: {other}"),
            }
        }

        let query = StockQuery::new(ledger.store().clone(), ledger.directory().clone());
        assert_eq!(query.total_stock(c.cabernet.id).await.unwrap(), 100);
        assert_ledger_consistent(ledger.store()).await;
    }

    /// Store that lets a rival writer bump the first touched level right
    /// before each of the next `interferences` commits.
    struct RacingStore {
        inner: InMemoryStockStore,
        interferences: AtomicU32,
        commits: AtomicU32,
        rival: UserId,
    }

    impl RacingStore {
        fn new(interferences: u32, rival: UserId) -> Self {
            Self {
                inner: InMemoryStockStore::new(),
                interferences: AtomicU32::new(interferences),
                commits: AtomicU32::new(0),
                rival,
            }
        }

        async fn rival_write(&self, key: StockKey) -> Result<(), StoreError> {
            let current = self.inner.load_level(key).await?;
            let write = match &current {
                Some(level) => LevelWrite::Update {
                    key,
                    version: level.version,
                    quantity: level.quantity + 1,
                },
                None => LevelWrite::Initialize { key, quantity: 1 },
            };
            self.inner
                .commit(LedgerPlan {
                    writes: vec![write],
                    movements: vec![NewMovement {
                        key,
                        delta: 1,
                        reason: "rival".to_string(),
                        actor_id: self.rival,
                    }],
                })
                .await?;
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl StockStore for RacingStore {
        async fn load_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
            self.inner.load_level(key).await
        }

        async fn commit(&self, plan: LedgerPlan) -> Result<CommittedPlan, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            let interfere = self
                .interferences
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if interfere {
                if let Some(write) = plan.writes.first() {
                    self.rival_write(write.key()).await?;
                }
            }
            self.inner.commit(plan).await
        }

        async fn levels(&self, filter: LevelFilter) -> Result<Vec<StockLevel>, StoreError> {
            self.inner.levels(filter).await
        }

        async fn movements(
            &self,
            filter: MovementFilter,
            limit: u32,
        ) -> Result<Vec<bodega_inventory::Movement>, StoreError> {
            self.inner.movements(filter, limit).await
        }
    }

    #[tokio::test]
    async fn lost_races_are_replanned_against_fresh_state() {
        let c = catalog();
        let ledger = StockLedger::new(RacingStore::new(2, c.actor), c.directory.clone());
        let k = key(&c.central, &c.malbec);

        let receipt = ledger.adjust(adjust(k, 5, c.actor)).await.unwrap();

        // Two rival +1 writes landed first, then our +5 on top of them.
        assert_eq!(receipt.level.quantity, 7);
        assert_eq!(receipt.level.version, 3);
        assert_eq!(ledger.store().commits.load(Ordering::SeqCst), 3);
        assert_ledger_consistent(ledger.store()).await;
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let c = catalog();
        let ledger = StockLedger::new(RacingStore::new(10, c.actor), c.directory.clone())
            .with_max_commit_attempts(3);
        let k = key(&c.central, &c.malbec);

        let err = ledger.adjust(adjust(k, 5, c.actor)).await.unwrap_err();

        assert!(matches!(err, LedgerError::ConcurrencyConflict(_)));
        assert_eq!(ledger.store().commits.load(Ordering::SeqCst), 3);
        // Only the rival writes are visible.
        assert_eq!(ledger.store().load_level(k).await.unwrap().unwrap().quantity, 3);
        assert_ledger_consistent(ledger.store()).await;
    }

    /// Store that aborts a commit as a deadlock victim (SQLSTATE 40P01)
    /// whenever another commit is already in flight, plus the first
    /// `forced` commits unconditionally.
    struct DeadlockingStore {
        inner: InMemoryStockStore,
        in_flight: AtomicU32,
        forced: AtomicU32,
        commits: AtomicU32,
    }

    impl DeadlockingStore {
        fn new(forced: u32) -> Self {
            Self {
                inner: InMemoryStockStore::new(),
                in_flight: AtomicU32::new(0),
                forced: AtomicU32::new(forced),
                commits: AtomicU32::new(0),
            }
        }

        fn deadlock() -> StoreError {
            classify_sql_state(Some("40P01"), "deadlock detected".to_string())
        }
    }

    #[async_trait::async_trait]
    impl StockStore for DeadlockingStore {
        async fn load_level(&self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
            self.inner.load_level(key).await
        }

        async fn commit(&self, plan: LedgerPlan) -> Result<CommittedPlan, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            let forced = self
                .forced
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if forced {
                return Err(Self::deadlock());
            }
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err(Self::deadlock());
            }
            tokio::task::yield_now().await;
            let result = self.inner.commit(plan).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn levels(&self, filter: LevelFilter) -> Result<Vec<StockLevel>, StoreError> {
            self.inner.levels(filter).await
        }

        async fn movements(
            &self,
            filter: MovementFilter,
            limit: u32,
        ) -> Result<Vec<bodega_inventory::Movement>, StoreError> {
            self.inner.movements(filter, limit).await
        }
    }

    #[tokio::test]
    async fn deadlock_victims_are_retried() {
        let c = catalog();
        let ledger = StockLedger::new(DeadlockingStore::new(0), c.directory.clone());
        ledger.adjust(adjust(key(&c.central, &c.malbec), 20, c.actor)).await.unwrap();
        ledger.store().forced.store(2, Ordering::SeqCst);
        let before = ledger.store().commits.load(Ordering::SeqCst);

        let receipt = ledger
            .transfer(transfer(&c, c.central.id, c.south.id, c.malbec.id, 5))
            .await
            .unwrap();

        assert_eq!(receipt.source.quantity, 15);
        assert_eq!(receipt.destination.quantity, 5);
        assert_eq!(ledger.store().commits.load(Ordering::SeqCst) - before, 3);
        assert_ledger_consistent(ledger.store()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposite_transfers_never_fail_as_storage_errors() {
        let c = catalog();
        let ledger = Arc::new(
            StockLedger::new(Arc::new(DeadlockingStore::new(0)), c.directory.clone())
                .with_max_commit_attempts(50),
        );
        ledger.adjust(adjust(key(&c.central, &c.cabernet), 100, c.actor)).await.unwrap();
        ledger.adjust(adjust(key(&c.south, &c.cabernet), 100, c.actor)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let ledger = ledger.clone();
            let (from, to) = if i % 2 == 0 {
                (c.central.id, c.south.id)
            } else {
                (c.south.id, c.central.id)
            };
            let cmd = transfer(&c, from, to, c.cabernet.id, 1);
            handles.push(tokio::spawn(async move { ledger.transfer(cmd).await }));
        }
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => assert!(receipt.success),
                Err(LedgerError::InsufficientStock { .. })
                | Err(LedgerError::ConcurrencyConflict(_)) => {}
                Err(other) => panic!("transfer failed as {other:?}"),
            }
        }

        let query = StockQuery::new(ledger.store().clone(), ledger.directory().clone());
        assert_eq!(query.total_stock(c.cabernet.id).await.unwrap(), 200);
        assert_ledger_consistent(ledger.store()).await;
    }

    struct UnavailableStore {
        commits: AtomicU32,
    }

    #[async_trait::async_trait]
    impl StockStore for UnavailableStore {
        async fn load_level(&self, _key: StockKey) -> Result<Option<StockLevel>, StoreError> {
            Ok(None)
        }

        async fn commit(&self, _plan: LedgerPlan) -> Result<CommittedPlan, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn levels(&self, _filter: LevelFilter) -> Result<Vec<StockLevel>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn movements(
            &self,
            _filter: MovementFilter,
            _limit: u32,
        ) -> Result<Vec<bodega_inventory::Movement>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_failures_propagate_without_retry() {
        let c = catalog();
        let store = Arc::new(UnavailableStore {
            commits: AtomicU32::new(0),
        });
        let ledger = StockLedger::new(store.clone(), c.directory.clone());

        let err = ledger
            .adjust(adjust(key(&c.central, &c.malbec), 1, c.actor))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::Storage(StoreError::Unavailable("connection refused".to_string()))
        );
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);

        let query = StockQuery::new(store, c.directory.clone());
        assert!(matches!(
            query.low_stock_alerts(None).await,
            Err(LedgerError::Storage(_))
        ));
    }
}
