// src/handlers/pharmacy.rs
// Leituras brutas das tabelas. Falhas do store chegam aqui como lista vazia.

use axum::{extract::State, Json};

use crate::{
    config::AppState,
    models::pharmacy::{
        InventoryItem, Medication, Prescription, PrescriptionItem, PurchaseOrder,
        PurchaseOrderItem, Supplier,
    },
};

// GET /api/pharmacy/medications
#[utoipa::path(
    get,
    path = "/api/pharmacy/medications",
    tag = "Pharmacy",
    responses((status = 200, description = "Medicamentos por nome", body = Vec<Medication>))
)]
pub async fn list_medications(State(app_state): State<AppState>) -> Json<Vec<Medication>> {
    Json(app_state.pharmacy_repo.get_medications().await)
}

// GET /api/pharmacy/inventory
#[utoipa::path(
    get,
    path = "/api/pharmacy/inventory",
    tag = "Pharmacy",
    responses((status = 200, description = "Estoque, do mais recente ao mais antigo", body = Vec<InventoryItem>))
)]
pub async fn list_inventory(State(app_state): State<AppState>) -> Json<Vec<InventoryItem>> {
    Json(app_state.pharmacy_repo.get_inventory().await)
}

// GET /api/pharmacy/inventory/low-stock
#[utoipa::path(
    get,
    path = "/api/pharmacy/inventory/low-stock",
    tag = "Pharmacy",
    responses((status = 200, description = "Itens abaixo do ponto de pedido", body = Vec<InventoryItem>))
)]
pub async fn list_low_stock(State(app_state): State<AppState>) -> Json<Vec<InventoryItem>> {
    Json(app_state.pharmacy_repo.get_low_stock_items().await)
}

// GET /api/pharmacy/prescriptions
#[utoipa::path(
    get,
    path = "/api/pharmacy/prescriptions",
    tag = "Pharmacy",
    responses((status = 200, description = "Receitas, da mais recente à mais antiga", body = Vec<Prescription>))
)]
pub async fn list_prescriptions(State(app_state): State<AppState>) -> Json<Vec<Prescription>> {
    Json(app_state.pharmacy_repo.get_prescriptions().await)
}

// GET /api/pharmacy/prescription-items
#[utoipa::path(
    get,
    path = "/api/pharmacy/prescription-items",
    tag = "Pharmacy",
    responses((status = 200, description = "Itens de receita com medicamento e data", body = Vec<PrescriptionItem>))
)]
pub async fn list_prescription_items(State(app_state): State<AppState>) -> Json<Vec<PrescriptionItem>> {
    Json(app_state.pharmacy_repo.get_prescription_items().await)
}

// GET /api/pharmacy/suppliers
#[utoipa::path(
    get,
    path = "/api/pharmacy/suppliers",
    tag = "Pharmacy",
    responses((status = 200, description = "Fornecedores por nome", body = Vec<Supplier>))
)]
pub async fn list_suppliers(State(app_state): State<AppState>) -> Json<Vec<Supplier>> {
    Json(app_state.pharmacy_repo.get_suppliers().await)
}

// GET /api/pharmacy/purchase-orders
#[utoipa::path(
    get,
    path = "/api/pharmacy/purchase-orders",
    tag = "Pharmacy",
    responses((status = 200, description = "Pedidos de compra com fornecedor", body = Vec<PurchaseOrder>))
)]
pub async fn list_purchase_orders(State(app_state): State<AppState>) -> Json<Vec<PurchaseOrder>> {
    Json(app_state.pharmacy_repo.get_purchase_orders().await)
}

// GET /api/pharmacy/purchase-order-items
#[utoipa::path(
    get,
    path = "/api/pharmacy/purchase-order-items",
    tag = "Pharmacy",
    responses((status = 200, description = "Itens de pedido de compra", body = Vec<PurchaseOrderItem>))
)]
pub async fn list_purchase_order_items(State(app_state): State<AppState>) -> Json<Vec<PurchaseOrderItem>> {
    Json(app_state.pharmacy_repo.get_purchase_order_items().await)
}
