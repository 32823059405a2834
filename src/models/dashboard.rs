// src/models/dashboard.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::store::Relation;
use crate::models::pharmacy::{
    InventoryItem, Medication, Prescription, PrescriptionItem, PurchaseOrder, PurchaseOrderItem,
    Supplier,
};

// 1. Contagem por tabela (nome da tabela -> registros)
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct TableCounts(pub BTreeMap<String, i64>);

impl TableCounts {
    pub fn get(&self, relation: Relation) -> i64 {
        self.0.get(relation.table_name()).copied().unwrap_or(0)
    }

    pub fn set(&mut self, relation: Relation, count: i64) {
        self.0.insert(relation.table_name().to_string(), count);
    }
}

// 2. Distribuição de registros (gráfico de pizza)
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableShare {
    pub name: String,
    pub count: i64,
    pub color: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableDistribution {
    pub tables: Vec<TableShare>,
    pub total_records: i64,
}

// 3. Tendência mensal de receitas (gráfico de linha)
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MonthlyPrescriptionPoint {
    pub month: String,
    pub prescriptions: i64,
    pub revenue: Decimal,
}

// 4. Níveis de estoque (gráfico de barras)
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InventoryLevelPoint {
    pub name: String,
    pub current: i64,
    pub reorder: i64,
}

// 5. Mais receitados hoje
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrendingMedication {
    pub medication_id: i64,
    pub medication_name: String,
    pub prescription_count: i64,
    pub average_daily: i64,
}

// 6. Atividade recente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Prescription,
    Inventory,
    Purchase,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub message: String,
    pub time: String,
    pub timestamp: DateTime<Utc>,
}

// 7. Cards do topo e indicadores
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_medications: i64,
    pub active_medications: usize,
    pub active_prescriptions: i64,
    pub items_dispensed: usize,
    pub inventory_items: i64,
    pub low_stock_alerts: usize,
    pub active_suppliers: i64,
    pub purchase_orders: usize,
    pub total_prescription_revenue: Decimal,
    pub stock_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TableRecordCount {
    pub name: String,
    pub records: i64,
}

// Tudo o que a tela principal consome, já agregado
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub stats: DashboardStats,
    pub inventory_chart: Vec<InventoryLevelPoint>,
    pub prescription_trend: Vec<MonthlyPrescriptionPoint>,
    pub recent_activity: Vec<Activity>,
    pub schema_overview: Vec<TableRecordCount>,
}

// Resultado bruto da carga inicial (as dez consultas em paralelo).
// Não é serializado: as agregações saem daqui.
#[derive(Debug, Clone, Default)]
pub struct DashboardSnapshot {
    pub medications: Vec<Medication>,
    pub inventory: Vec<InventoryItem>,
    pub top_inventory: Vec<InventoryItem>,
    pub prescriptions: Vec<Prescription>,
    pub prescription_items: Vec<PrescriptionItem>,
    pub suppliers: Vec<Supplier>,
    pub purchase_orders: Vec<PurchaseOrder>,
    pub purchase_order_items: Vec<PurchaseOrderItem>,
    pub counts: TableCounts,
    pub recent_activity: Vec<Activity>,
}
