// src/docs.rs

use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    info(title = "Pharmacy Dashboard API", description = "Painel analítico da farmácia"),
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::get_me,

        // --- Dashboard ---
        handlers::dashboard::get_overview,
        handlers::dashboard::get_counts,
        handlers::dashboard::get_distribution,
        handlers::dashboard::get_activity,
        handlers::dashboard::get_trending,
        handlers::dashboard::live_inventory,
        handlers::dashboard::live_distribution,

        // --- Pharmacy ---
        handlers::pharmacy::list_medications,
        handlers::pharmacy::list_inventory,
        handlers::pharmacy::list_low_stock,
        handlers::pharmacy::list_prescriptions,
        handlers::pharmacy::list_prescription_items,
        handlers::pharmacy::list_suppliers,
        handlers::pharmacy::list_purchase_orders,
        handlers::pharmacy::list_purchase_order_items,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::PublicUser,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::AuthResponse,

            // --- Dashboard ---
            models::dashboard::TableCounts,
            models::dashboard::TableShare,
            models::dashboard::TableDistribution,
            models::dashboard::MonthlyPrescriptionPoint,
            models::dashboard::InventoryLevelPoint,
            models::dashboard::TrendingMedication,
            models::dashboard::ActivityKind,
            models::dashboard::Activity,
            models::dashboard::DashboardStats,
            models::dashboard::TableRecordCount,
            models::dashboard::DashboardOverview,

            // --- Pharmacy ---
            models::pharmacy::Medication,
            models::pharmacy::MedicationSummary,
            models::pharmacy::InventoryItem,
            models::pharmacy::Prescription,
            models::pharmacy::PrescriptionSummary,
            models::pharmacy::PrescriptionItem,
            models::pharmacy::Supplier,
            models::pharmacy::SupplierSummary,
            models::pharmacy::PurchaseOrder,
            models::pharmacy::PurchaseOrderSummary,
            models::pharmacy::PurchaseOrderItem,
        )
    ),
    tags(
        (name = "Auth", description = "Login, cadastro e sessão do operador"),
        (name = "Dashboard", description = "Indicadores, gráficos e views ao vivo"),
        (name = "Pharmacy", description = "Leituras das tabelas da farmácia")
    )
)]
pub struct ApiDoc;
