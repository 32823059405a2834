// src/services/analytics.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};

use crate::{
    db::store::Relation,
    models::{
        dashboard::{
            Activity, ActivityKind, DashboardOverview, DashboardSnapshot, DashboardStats,
            InventoryLevelPoint, MonthlyPrescriptionPoint, TableCounts, TableDistribution,
            TableRecordCount, TableShare, TrendingMedication,
        },
        pharmacy::{InventoryItem, PrescribedMedication, Prescription, PrescriptionItem, PurchaseOrder},
    },
};

pub const TREND_MONTHS: usize = 6;

/// Rótulos usados quando não há meses reais suficientes.
pub const FALLBACK_MONTHS: [&str; TREND_MONTHS] =
    ["Apr 2025", "May 2025", "Jun 2025", "Jul 2025", "Aug 2025", "Sep 2025"];

/// Ponto base (receitas, faturamento) da série sintética quando não há dado nenhum.
pub const FALLBACK_BASE: (i64, i64) = (100, 12_000);

pub const TRENDING_LIMIT: usize = 6;
pub const AVERAGE_DAILY_RATIO: f64 = 0.85;

pub const ACTIVITY_LIMIT: usize = 4;

const UNKNOWN_NAME: &str = "Desconhecido";

// Cores fixas do gráfico de pizza, na ordem de exibição
const TABLE_PALETTE: [(Relation, &str, &str); 8] = [
    (Relation::Inventory, "Inventory", "#2563eb"),
    (Relation::Medications, "Medications", "#059669"),
    (Relation::PrescriptionItems, "PrescriptionItems", "#ea580c"),
    (Relation::Prescriptions, "Prescriptions", "#7c3aed"),
    (Relation::PurchaseOrderItems, "PurchaseOrderItem", "#dc2626"),
    (Relation::PurchaseOrders, "PurchaseOrders", "#0891b2"),
    (Relation::Suppliers, "Suppliers", "#ca8a04"),
    (Relation::Users, "Users", "#db2777"),
];

// ---
// Estoque
// ---

pub fn is_low_stock(item: &InventoryItem) -> bool {
    item.quantity_in_stock < item.reorder_level
}

pub fn low_stock_count(items: &[InventoryItem]) -> usize {
    items.iter().filter(|i| is_low_stock(i)).count()
}

/// Percentual de itens acima do ponto de pedido, com uma casa decimal.
pub fn stock_efficiency(total: usize, low: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let ratio = total.saturating_sub(low) as f64 / total as f64 * 100.0;
    (ratio * 10.0).round() / 10.0
}

pub fn inventory_levels(items: &[InventoryItem]) -> Vec<InventoryLevelPoint> {
    items
        .iter()
        .map(|item| InventoryLevelPoint {
            name: item
                .medication
                .as_ref()
                .map(|m| m.medication_name.clone())
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            current: item.quantity_in_stock,
            reorder: item.reorder_level,
        })
        .collect()
}

// ---
// Receitas por mês
// ---

fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%b %Y").to_string())
        .unwrap_or_default()
}

/// Agrupa por (ano, mês) da data da receita, contando itens e somando custo.
/// Itens sem a receita no join ficam de fora. Resultado em ordem cronológica.
pub fn bucket_by_month(items: &[PrescriptionItem]) -> Vec<MonthlyPrescriptionPoint> {
    let mut buckets: BTreeMap<(i32, u32), (i64, Decimal)> = BTreeMap::new();

    for item in items {
        let Some(date) = item.prescription.as_ref().and_then(|p| p.date_prescribed) else {
            continue;
        };
        let bucket = buckets
            .entry((date.year(), date.month()))
            .or_insert((0, Decimal::ZERO));
        bucket.0 += 1;
        bucket.1 += item.cost.unwrap_or(Decimal::ZERO);
    }

    buckets
        .into_iter()
        .map(|((year, month), (prescriptions, revenue))| MonthlyPrescriptionPoint {
            month: month_label(year, month),
            prescriptions,
            revenue,
        })
        .collect()
}

pub fn trend_variation(index: usize) -> f64 {
    let progress = (index + 1) as f64 / TREND_MONTHS as f64;
    0.8 + (index as f64).sin() * 0.15 + progress * 0.4
}

/// Últimos seis meses reais; com menos de seis, a série sintética
/// construída a partir do mês mais recente (ou de `FALLBACK_BASE`).
pub fn prescription_trend(items: &[PrescriptionItem]) -> Vec<MonthlyPrescriptionPoint> {
    let buckets = bucket_by_month(items);
    if buckets.len() >= TREND_MONTHS {
        return buckets[buckets.len() - TREND_MONTHS..].to_vec();
    }

    let (base_count, base_revenue) = match buckets.last() {
        Some(point) => (
            point.prescriptions as f64,
            point.revenue.to_f64().unwrap_or_default(),
        ),
        None => (FALLBACK_BASE.0 as f64, FALLBACK_BASE.1 as f64),
    };

    FALLBACK_MONTHS
        .iter()
        .enumerate()
        .map(|(index, month)| {
            let variation = trend_variation(index);
            MonthlyPrescriptionPoint {
                month: month.to_string(),
                prescriptions: (base_count * variation).round() as i64,
                revenue: Decimal::from_f64((base_revenue * variation).round()).unwrap_or_default(),
            }
        })
        .collect()
}

// ---
// Mais receitados
// ---

pub fn average_daily(count: i64) -> i64 {
    (count as f64 * AVERAGE_DAILY_RATIO).round() as i64
}

pub fn trending_medications(rows: &[PrescribedMedication]) -> Vec<TrendingMedication> {
    let mut counts: HashMap<i64, (String, i64)> = HashMap::new();
    for row in rows {
        let name = row
            .medication
            .as_ref()
            .map(|m| m.medication_name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        let entry = counts.entry(row.medication_id).or_insert((String::new(), 0));
        entry.0 = name;
        entry.1 += 1;
    }

    let mut trending: Vec<TrendingMedication> = counts
        .into_iter()
        .map(|(medication_id, (medication_name, count))| TrendingMedication {
            medication_id,
            medication_name,
            prescription_count: count,
            average_daily: average_daily(count),
        })
        .collect();

    trending.sort_by(|a, b| {
        b.prescription_count
            .cmp(&a.prescription_count)
            .then(a.medication_id.cmp(&b.medication_id))
    });
    trending.truncate(TRENDING_LIMIT);
    trending
}

// ---
// Atividade recente
// ---

fn display_time(ts: DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y %H:%M:%S").to_string()
}

/// Junta as receitas recentes, o alerta de estoque mais recente e o último
/// pedido de compra numa lista só, do mais novo para o mais antigo.
pub fn assemble_activity(
    prescriptions: &[Prescription],
    low_stock: &[InventoryItem],
    latest_order: Option<&PurchaseOrder>,
) -> Vec<Activity> {
    let mut activities = Vec::new();

    for prescription in prescriptions {
        activities.push(Activity {
            id: format!("prescription-{}", prescription.prescription_id),
            kind: ActivityKind::Prescription,
            message: format!("Nova receita criada para o Paciente #{}", prescription.patient_id),
            time: display_time(prescription.date_prescribed),
            timestamp: prescription.date_prescribed,
        });
    }

    if let Some(item) = low_stock.iter().max_by_key(|i| i.last_updated) {
        let name = item
            .medication
            .as_ref()
            .map(|m| m.medication_name.as_str())
            .unwrap_or("medicamento desconhecido");
        activities.push(Activity {
            id: format!("low-stock-{}", item.inventory_id),
            kind: ActivityKind::Inventory,
            message: format!("Alerta de estoque baixo: {name}"),
            time: "Recentemente".to_string(),
            timestamp: item.last_updated,
        });
    }

    if let Some(order) = latest_order {
        let supplier = order
            .supplier
            .as_ref()
            .map(|s| s.supplier_name.as_str())
            .unwrap_or("fornecedor desconhecido");
        activities.push(Activity {
            id: format!("purchase-{}", order.purchase_order_id),
            kind: ActivityKind::Purchase,
            message: format!("Pedido de compra #{} de {supplier}", order.purchase_order_id),
            time: display_time(order.order_date),
            timestamp: order.order_date,
        });
    }

    activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    activities.truncate(ACTIVITY_LIMIT);
    activities
}

// ---
// Contagens e visão geral
// ---

pub fn table_distribution(counts: &TableCounts) -> TableDistribution {
    let total_records: i64 = TABLE_PALETTE.iter().map(|(r, _, _)| counts.get(*r)).sum();

    let tables = TABLE_PALETTE
        .iter()
        .map(|(relation, name, color)| {
            let count = counts.get(*relation);
            let percent = if total_records > 0 {
                count as f64 / total_records as f64 * 100.0
            } else {
                0.0
            };
            TableShare {
                name: name.to_string(),
                count,
                color: color.to_string(),
                percent,
            }
        })
        .collect();

    TableDistribution { tables, total_records }
}

pub fn dashboard_stats(snapshot: &DashboardSnapshot) -> DashboardStats {
    let low_stock_alerts = low_stock_count(&snapshot.inventory);
    let total_prescription_revenue = snapshot
        .prescription_items
        .iter()
        .filter_map(|i| i.cost)
        .sum();

    DashboardStats {
        total_medications: snapshot.counts.get(Relation::Medications),
        active_medications: snapshot.medications.len(),
        active_prescriptions: snapshot.counts.get(Relation::Prescriptions),
        items_dispensed: snapshot.prescription_items.len(),
        inventory_items: snapshot.counts.get(Relation::Inventory),
        low_stock_alerts,
        active_suppliers: snapshot.counts.get(Relation::Suppliers),
        purchase_orders: snapshot.purchase_orders.len(),
        total_prescription_revenue,
        stock_efficiency: stock_efficiency(snapshot.inventory.len(), low_stock_alerts),
    }
}

/// As sete tabelas da farmácia com o número de registros que a tela mostra:
/// contagem do banco onde existe, tamanho da lista carregada nas demais.
pub fn schema_overview(snapshot: &DashboardSnapshot) -> Vec<TableRecordCount> {
    let entry = |name: &str, records: i64| TableRecordCount {
        name: name.to_string(),
        records,
    };
    vec![
        entry("Inventory", snapshot.counts.get(Relation::Inventory)),
        entry("Medications", snapshot.counts.get(Relation::Medications)),
        entry("Prescriptions", snapshot.counts.get(Relation::Prescriptions)),
        entry("PrescriptionItems", snapshot.prescription_items.len() as i64),
        entry("PurchaseOrders", snapshot.purchase_orders.len() as i64),
        entry("PurchaseOrderItems", snapshot.purchase_order_items.len() as i64),
        entry("Suppliers", snapshot.counts.get(Relation::Suppliers)),
    ]
}

pub fn overview(snapshot: &DashboardSnapshot) -> DashboardOverview {
    DashboardOverview {
        stats: dashboard_stats(snapshot),
        inventory_chart: inventory_levels(&snapshot.top_inventory),
        prescription_trend: prescription_trend(&snapshot.prescription_items),
        recent_activity: snapshot.recent_activity.clone(),
        schema_overview: schema_overview(snapshot),
    }
}
