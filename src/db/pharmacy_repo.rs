// src/db/pharmacy_repo.rs

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    db::store::{DataStore, Direction, FilterValue, Query, Relation},
    models::pharmacy::{
        InventoryItem, Medication, PrescribedMedication, Prescription, PrescriptionItem,
        PurchaseOrder, PurchaseOrderItem, Supplier,
    },
    services::analytics::is_low_stock,
};

/// Itens de estoque acompanhados no gráfico de barras (e na assinatura ao vivo).
pub const TOP_INVENTORY_IDS: [i64; 6] = [1, 2, 3, 4, 5, 6];

const RECENT_PRESCRIPTIONS: usize = 2;

// O repositório das views de leitura do painel.
// Nenhuma função aqui propaga erro: falha de store ou de formato vira lista vazia + log.
#[derive(Clone)]
pub struct PharmacyRepository {
    store: Arc<dyn DataStore>,
}

impl PharmacyRepository {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    async fn fetch_view<T: DeserializeOwned>(&self, view: &'static str, query: Query) -> Vec<T> {
        let rows = match self.store.select(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("🔥 Erro ao buscar {}: {}", view, e);
                return Vec::new();
            }
        };

        match serde_json::from_value(Value::Array(rows)) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("🔥 Linhas de {} em formato inesperado: {}", view, e);
                Vec::new()
            }
        }
    }

    fn inventory_query() -> Query {
        Query::from(Relation::Inventory).embed(
            Relation::Medications,
            &["medication_name", "generic_name", "manufacturer"],
        )
    }

    pub async fn get_medications(&self) -> Vec<Medication> {
        let query = Query::from(Relation::Medications).order_by("medication_name", Direction::Asc);
        self.fetch_view("medications", query).await
    }

    pub async fn get_inventory(&self) -> Vec<InventoryItem> {
        let query = Self::inventory_query().order_by("last_updated", Direction::Desc);
        self.fetch_view("inventory", query).await
    }

    pub async fn get_top_inventory(&self) -> Vec<InventoryItem> {
        let query = Self::inventory_query()
            .in_list("inventory_id", &TOP_INVENTORY_IDS)
            .order_by("inventory_id", Direction::Asc);
        self.fetch_view("top 6 inventory", query).await
    }

    pub async fn get_prescriptions(&self) -> Vec<Prescription> {
        let query = Query::from(Relation::Prescriptions).order_by("date_prescribed", Direction::Desc);
        self.fetch_view("prescriptions", query).await
    }

    pub async fn get_recent_prescriptions(&self) -> Vec<Prescription> {
        let query = Query::from(Relation::Prescriptions)
            .order_by("date_prescribed", Direction::Desc)
            .limit(RECENT_PRESCRIPTIONS);
        self.fetch_view("recent prescriptions", query).await
    }

    pub async fn get_prescription_items(&self) -> Vec<PrescriptionItem> {
        let query = Query::from(Relation::PrescriptionItems)
            .embed(Relation::Medications, &["medication_name", "generic_name"])
            .embed(Relation::Prescriptions, &["date_prescribed", "status"])
            .order_by("prescription_item_id", Direction::Desc);
        self.fetch_view("prescription items", query).await
    }

    /// Itens cujas receitas foram emitidas em `day` (UTC).
    pub async fn get_prescription_items_on(&self, day: NaiveDate) -> Vec<PrescribedMedication> {
        let start = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let end = start + Duration::days(1);

        let query = Query::from(Relation::PrescriptionItems)
            .columns(&["medication_id"])
            .embed(Relation::Medications, &["medication_name"])
            .embed(Relation::Prescriptions, &["date_prescribed"])
            .gte_on(Relation::Prescriptions, "date_prescribed", FilterValue::Timestamp(start))
            .lt_on(Relation::Prescriptions, "date_prescribed", FilterValue::Timestamp(end));
        self.fetch_view("trending medications", query).await
    }

    pub async fn get_suppliers(&self) -> Vec<Supplier> {
        let query = Query::from(Relation::Suppliers).order_by("supplier_name", Direction::Asc);
        self.fetch_view("suppliers", query).await
    }

    pub async fn get_purchase_orders(&self) -> Vec<PurchaseOrder> {
        let query = Query::from(Relation::PurchaseOrders)
            .embed(Relation::Suppliers, &["supplier_name", "contact_person"])
            .order_by("order_date", Direction::Desc);
        self.fetch_view("purchase orders", query).await
    }

    pub async fn get_latest_purchase_order(&self) -> Option<PurchaseOrder> {
        let query = Query::from(Relation::PurchaseOrders)
            .embed(Relation::Suppliers, &["supplier_name"])
            .order_by("order_date", Direction::Desc)
            .limit(1);
        self.fetch_view("latest purchase order", query).await.into_iter().next()
    }

    pub async fn get_purchase_order_items(&self) -> Vec<PurchaseOrderItem> {
        let query = Query::from(Relation::PurchaseOrderItems)
            .embed(Relation::Medications, &["medication_name"])
            .embed(Relation::PurchaseOrders, &["order_date", "status"])
            .order_by("purchase_order_item_id", Direction::Desc);
        self.fetch_view("purchase order items", query).await
    }

    /// Estoque abaixo do ponto de pedido, do menor saldo para o maior.
    pub async fn get_low_stock_items(&self) -> Vec<InventoryItem> {
        let query = Query::from(Relation::Inventory)
            .embed(Relation::Medications, &["medication_name"])
            .order_by("quantity_in_stock", Direction::Asc);
        let inventory: Vec<InventoryItem> = self.fetch_view("low stock items", query).await;
        inventory.into_iter().filter(is_low_stock).collect()
    }
}
