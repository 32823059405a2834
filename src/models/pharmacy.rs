// src/models/pharmacy.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// --- 1. Medicamentos ---
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Medication {
    pub medication_id: i64,
    pub medication_name: String,
    pub generic_name: Option<String>,
    pub manufacturer: Option<String>,
    pub dosage: Option<String>,
    pub formulation: Option<String>,
    pub description: Option<String>,
    pub price_per_unit: Option<Decimal>,
}

// Projeção parcial de Medications usada nos joins.
// Cada view pede colunas diferentes, por isso só o nome é obrigatório.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MedicationSummary {
    pub medication_name: String,
    pub generic_name: Option<String>,
    pub manufacturer: Option<String>,
}

// --- 2. Estoque ---
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryItem {
    pub inventory_id: i64,
    pub medication_id: i64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity_in_stock: i64,
    pub reorder_level: i64,
    pub last_updated: DateTime<Utc>,
    #[serde(rename = "Medications", default)]
    pub medication: Option<MedicationSummary>,
}

// --- 3. Receitas ---
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Prescription {
    pub prescription_id: i64,
    pub patient_id: i64,
    pub physician_id: Option<i64>,
    pub date_prescribed: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionSummary {
    pub date_prescribed: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionItem {
    pub prescription_item_id: i64,
    pub prescription_id: i64,
    pub medication_id: i64,
    pub quantity_dispensed: Option<i64>,
    pub dosage_instructions: Option<String>,
    pub cost: Option<Decimal>,
    #[serde(rename = "Medications", default)]
    pub medication: Option<MedicationSummary>,
    #[serde(rename = "Prescriptions", default)]
    pub prescription: Option<PrescriptionSummary>,
}

// Linha enxuta da consulta de "mais receitados do dia"
#[derive(Debug, Clone, Deserialize)]
pub struct PrescribedMedication {
    pub medication_id: i64,
    #[serde(rename = "Medications", default)]
    pub medication: Option<MedicationSummary>,
    #[serde(rename = "Prescriptions", default)]
    pub prescription: Option<PrescriptionSummary>,
}

// --- 4. Fornecedores e Compras ---
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Supplier {
    pub supplier_id: i64,
    pub supplier_name: String,
    pub contact_person: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SupplierSummary {
    pub supplier_name: String,
    pub contact_person: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrder {
    pub purchase_order_id: i64,
    pub supplier_id: i64,
    pub order_date: DateTime<Utc>,
    pub delivery_date: Option<NaiveDate>,
    pub status: String,
    #[serde(rename = "Suppliers", default)]
    pub supplier: Option<SupplierSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderSummary {
    pub order_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderItem {
    pub purchase_order_item_id: i64,
    pub purchase_order_id: i64,
    pub medication_id: i64,
    pub quantity_ordered: i64,
    pub cost_per_unit: Decimal,
    #[serde(rename = "Medications", default)]
    pub medication: Option<MedicationSummary>,
    #[serde(rename = "PurchaseOrders", default)]
    pub purchase_order: Option<PurchaseOrderSummary>,
}
