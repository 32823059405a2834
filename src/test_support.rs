// src/test_support.rs
// Massa de dados e stores de apoio compartilhados pelos testes.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::AppState,
    db::{
        memory::InMemoryStore,
        store::{DataStore, Filter, Query, Relation, RowFilter, StoreError, StoreResult, Subscription},
    },
    services::session::MemorySessionCache,
};

/// Estado completo sobre um store de teste. O pool nunca conecta.
pub fn app_state(store: impl DataStore + 'static) -> AppState {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/pharmacy_test")
        .unwrap();
    AppState::assemble(pool, Arc::new(store), Arc::new(MemorySessionCache::default()))
}

/// Farmácia pequena com uma linha de estoque órfã (id 7) e dois itens abaixo do ponto de pedido.
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();

    store
        .seed(
            Relation::Medications,
            vec![
                json!({"medication_id": 1, "medication_name": "Amoxicilina", "generic_name": "amoxicillin", "manufacturer": "EMS", "price_per_unit": 1.5}),
                json!({"medication_id": 2, "medication_name": "Dipirona", "generic_name": "metamizole", "manufacturer": "Medley", "price_per_unit": 0.9}),
                json!({"medication_id": 3, "medication_name": "Losartana", "generic_name": "losartan", "manufacturer": "EMS", "price_per_unit": 2.1}),
                json!({"medication_id": 4, "medication_name": "Metformina", "generic_name": "metformin", "manufacturer": "Neo Química", "price_per_unit": 1.1}),
            ],
        )
        .await;

    store
        .seed(
            Relation::Inventory,
            vec![
                json!({"inventory_id": 1, "medication_id": 1, "batch_number": "A-01", "quantity_in_stock": 5, "reorder_level": 20, "last_updated": "2025-09-10T09:00:00Z"}),
                json!({"inventory_id": 2, "medication_id": 2, "batch_number": "D-07", "quantity_in_stock": 120, "reorder_level": 30, "last_updated": "2025-09-12T09:00:00Z"}),
                json!({"inventory_id": 3, "medication_id": 3, "batch_number": "L-03", "quantity_in_stock": 8, "reorder_level": 10, "last_updated": "2025-09-14T09:00:00Z"}),
                json!({"inventory_id": 4, "medication_id": 4, "batch_number": "M-11", "quantity_in_stock": 60, "reorder_level": 15, "last_updated": "2025-09-01T09:00:00Z"}),
                json!({"inventory_id": 7, "medication_id": 99, "batch_number": "X-99", "quantity_in_stock": 40, "reorder_level": 10, "last_updated": "2025-09-15T09:00:00Z"}),
            ],
        )
        .await;

    store
        .seed(
            Relation::Prescriptions,
            vec![
                json!({"prescription_id": 1, "patient_id": 11, "physician_id": 501, "date_prescribed": "2025-09-10T10:00:00Z", "status": "Filled"}),
                json!({"prescription_id": 2, "patient_id": 12, "physician_id": 502, "date_prescribed": "2025-09-12T10:00:00Z", "status": "Filled"}),
                json!({"prescription_id": 3, "patient_id": 13, "physician_id": 501, "date_prescribed": "2025-09-15T10:00:00Z", "status": "Active"}),
            ],
        )
        .await;

    store
        .seed(
            Relation::PrescriptionItems,
            vec![
                json!({"prescription_item_id": 1, "prescription_id": 1, "medication_id": 1, "quantity_dispensed": 10, "cost": 25.50}),
                json!({"prescription_item_id": 2, "prescription_id": 2, "medication_id": 1, "quantity_dispensed": 12, "cost": 30.00}),
                json!({"prescription_item_id": 3, "prescription_id": 3, "medication_id": 2, "quantity_dispensed": 6, "cost": 12.00}),
                json!({"prescription_item_id": 4, "prescription_id": 3, "medication_id": 3, "quantity_dispensed": 30, "cost": 40.25}),
            ],
        )
        .await;

    store
        .seed(
            Relation::Suppliers,
            vec![
                json!({"supplier_id": 1, "supplier_name": "Distribuidora Sul", "contact_person": "Ana"}),
                json!({"supplier_id": 2, "supplier_name": "Farma Norte", "contact_person": "Bruno"}),
            ],
        )
        .await;

    store
        .seed(
            Relation::PurchaseOrders,
            vec![
                json!({"purchase_order_id": 1, "supplier_id": 1, "order_date": "2025-09-05T08:00:00Z", "status": "Delivered"}),
                json!({"purchase_order_id": 2, "supplier_id": 2, "order_date": "2025-09-13T08:00:00Z", "status": "Pending"}),
            ],
        )
        .await;

    store
        .seed(
            Relation::PurchaseOrderItems,
            vec![
                json!({"purchase_order_item_id": 1, "purchase_order_id": 1, "medication_id": 1, "quantity_ordered": 100, "cost_per_unit": 1.20}),
                json!({"purchase_order_item_id": 2, "purchase_order_id": 2, "medication_id": 2, "quantity_ordered": 50, "cost_per_unit": 0.80}),
            ],
        )
        .await;

    store
}

/// Envolve um `InMemoryStore` e injeta falhas por tabela.
#[derive(Clone)]
pub struct FaultyStore {
    inner: InMemoryStore,
    failing: HashSet<Relation>,
    missing_counts: bool,
    empty_inserts: bool,
    conflicting_inserts: bool,
}

impl FaultyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
            missing_counts: false,
            empty_inserts: false,
            conflicting_inserts: false,
        }
    }

    /// `select` e `count` nessa tabela passam a falhar.
    pub fn failing(mut self, relation: Relation) -> Self {
        self.failing.insert(relation);
        self
    }

    /// `count` responde sem número.
    pub fn missing_counts(mut self) -> Self {
        self.missing_counts = true;
        self
    }

    /// `insert` grava mas não devolve a linha.
    pub fn empty_inserts(mut self) -> Self {
        self.empty_inserts = true;
        self
    }

    /// `insert` falha como se a chave única já existisse.
    pub fn conflicting_inserts(mut self) -> Self {
        self.conflicting_inserts = true;
        self
    }

    fn check(&self, relation: Relation) -> StoreResult<()> {
        if self.failing.contains(&relation) {
            return Err(StoreError::Unavailable(format!("{relation} fora do ar")));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for FaultyStore {
    async fn select(&self, query: &Query) -> StoreResult<Vec<Value>> {
        self.check(query.relation)?;
        self.inner.select(query).await
    }

    async fn count(&self, relation: Relation) -> StoreResult<Option<i64>> {
        self.check(relation)?;
        if self.missing_counts {
            return Ok(None);
        }
        self.inner.count(relation).await
    }

    async fn insert(&self, relation: Relation, row: Value) -> StoreResult<Vec<Value>> {
        if self.conflicting_inserts {
            return Err(StoreError::Conflict(relation, "chave duplicada".into()));
        }
        let rows = self.inner.insert(relation, row).await?;
        if self.empty_inserts {
            return Ok(Vec::new());
        }
        Ok(rows)
    }

    async fn update(&self, relation: Relation, filters: &[Filter], patch: Value) -> StoreResult<Vec<Value>> {
        self.inner.update(relation, filters, patch).await
    }

    async fn subscribe(&self, relation: Relation, filter: Option<RowFilter>) -> StoreResult<Subscription> {
        self.inner.subscribe(relation, filter).await
    }
}
