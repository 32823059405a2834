// src/services/dashboard_service.rs

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;

use crate::{
    common::error::AppError,
    db::{
        pharmacy_repo::TOP_INVENTORY_IDS,
        store::{DataStore, Relation, RowFilter},
        PharmacyRepository,
    },
    models::{
        dashboard::{
            Activity, DashboardOverview, DashboardSnapshot, TableCounts, TableDistribution,
            TrendingMedication,
        },
        pharmacy::InventoryItem,
    },
    services::{analytics, live::LiveView},
};

/// Tabelas contadas nos cards do painel.
pub const COUNTED_RELATIONS: [Relation; 4] = [
    Relation::Medications,
    Relation::Inventory,
    Relation::Prescriptions,
    Relation::Suppliers,
];

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn DataStore>,
    repo: PharmacyRepository,
}

impl DashboardService {
    pub fn new(store: Arc<dyn DataStore>, repo: PharmacyRepository) -> Self {
        Self { store, repo }
    }

    // Contagens em paralelo; falha ou contagem ausente vira 0
    async fn count_relations(&self, relations: &[Relation]) -> TableCounts {
        let results = join_all(relations.iter().map(|&relation| async move {
            (relation, self.store.count(relation).await)
        }))
        .await;

        let mut counts = TableCounts::default();
        for (relation, result) in results {
            let count = match result {
                Ok(Some(count)) => count,
                Ok(None) => 0,
                Err(e) => {
                    tracing::error!("🔥 Erro ao contar {}: {}", relation, e);
                    0
                }
            };
            counts.set(relation, count);
        }
        counts
    }

    pub async fn table_counts(&self) -> TableCounts {
        self.count_relations(&COUNTED_RELATIONS).await
    }

    pub async fn table_distribution(&self) -> TableDistribution {
        let counts = self.count_relations(&Relation::ALL).await;
        analytics::table_distribution(&counts)
    }

    pub async fn recent_activity(&self) -> Vec<Activity> {
        let (prescriptions, low_stock, latest_order) = tokio::join!(
            self.repo.get_recent_prescriptions(),
            self.repo.get_low_stock_items(),
            self.repo.get_latest_purchase_order(),
        );
        analytics::assemble_activity(&prescriptions, &low_stock, latest_order.as_ref())
    }

    /// Mais receitados no dia corrente (UTC).
    pub async fn trending_medications(&self) -> Vec<TrendingMedication> {
        self.trending_medications_on(Utc::now().date_naive()).await
    }

    pub async fn trending_medications_on(&self, day: NaiveDate) -> Vec<TrendingMedication> {
        let rows = self.repo.get_prescription_items_on(day).await;
        analytics::trending_medications(&rows)
    }

    /// Carga inicial do painel: as dez consultas saem juntas e
    /// uma falha só esvazia a própria parte.
    pub async fn load_snapshot(&self) -> DashboardSnapshot {
        let (
            medications,
            inventory,
            top_inventory,
            prescriptions,
            prescription_items,
            suppliers,
            purchase_orders,
            purchase_order_items,
            counts,
            recent_activity,
        ) = tokio::join!(
            self.repo.get_medications(),
            self.repo.get_inventory(),
            self.repo.get_top_inventory(),
            self.repo.get_prescriptions(),
            self.repo.get_prescription_items(),
            self.repo.get_suppliers(),
            self.repo.get_purchase_orders(),
            self.repo.get_purchase_order_items(),
            self.table_counts(),
            self.recent_activity(),
        );

        DashboardSnapshot {
            medications,
            inventory,
            top_inventory,
            prescriptions,
            prescription_items,
            suppliers,
            purchase_orders,
            purchase_order_items,
            counts,
            recent_activity,
        }
    }

    pub async fn overview(&self) -> DashboardOverview {
        analytics::overview(&self.load_snapshot().await)
    }

    /// Estoque do gráfico de barras, recarregado quando um dos seis itens muda.
    pub async fn watch_top_inventory(&self) -> Result<LiveView<Vec<InventoryItem>>, AppError> {
        let repo = self.repo.clone();
        let sources = vec![(Relation::Inventory, Some(RowFilter::In(TOP_INVENTORY_IDS.to_vec())))];

        let view = LiveView::start(self.store.as_ref(), sources, move || {
            let repo = repo.clone();
            async move { repo.get_top_inventory().await }
        })
        .await?;
        Ok(view)
    }

    /// Distribuição de registros, recarregada a cada mudança em qualquer tabela.
    pub async fn watch_table_distribution(&self) -> Result<LiveView<TableDistribution>, AppError> {
        let service = self.clone();
        let sources = Relation::ALL.iter().map(|&relation| (relation, None)).collect();

        let view = LiveView::start(self.store.as_ref(), sources, move || {
            let service = service.clone();
            async move { service.table_distribution().await }
        })
        .await?;
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::store::{Filter, FilterOp, FilterValue},
        models::dashboard::ActivityKind,
        test_support::{seeded_store, FaultyStore},
    };
    use serde_json::json;
    use std::time::Duration;

    fn service(store: impl DataStore + 'static) -> DashboardService {
        let store: Arc<dyn DataStore> = Arc::new(store);
        DashboardService::new(store.clone(), PharmacyRepository::new(store))
    }

    #[tokio::test]
    async fn counts_cover_the_four_card_tables() {
        let service = service(seeded_store().await);

        let counts = service.table_counts().await;

        assert_eq!(counts.0.len(), 4);
        assert_eq!(counts.get(Relation::Medications), 4);
        assert_eq!(counts.get(Relation::Inventory), 5);
        assert_eq!(counts.get(Relation::Prescriptions), 3);
        assert_eq!(counts.get(Relation::Suppliers), 2);
    }

    #[tokio::test]
    async fn missing_or_failed_counts_become_zero() {
        let missing = service(FaultyStore::new(seeded_store().await).missing_counts());
        let failing = service(FaultyStore::new(seeded_store().await).failing(Relation::Inventory));

        let missing = missing.table_counts().await;
        let failing = failing.table_counts().await;

        assert!(COUNTED_RELATIONS.iter().all(|r| missing.get(*r) == 0));
        assert_eq!(missing.0.len(), 4);
        assert_eq!(failing.get(Relation::Inventory), 0);
        assert_eq!(failing.get(Relation::Medications), 4);
    }

    #[tokio::test]
    async fn activity_feed_merges_the_three_sources() {
        let service = service(seeded_store().await);

        let feed = service.recent_activity().await;

        let ids: Vec<&str> = feed.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["prescription-3", "low-stock-3", "purchase-2", "prescription-2"]);
        assert_eq!(feed[1].kind, ActivityKind::Inventory);
        assert_eq!(feed[1].message, "Alerta de estoque baixo: Losartana");
        assert_eq!(feed[0].message, "Nova receita criada para o Paciente #13");
    }

    #[tokio::test]
    async fn trending_counts_only_the_given_day() {
        let service = service(seeded_store().await);

        let trending = service
            .trending_medications_on(NaiveDate::from_ymd_opt(2025, 9, 15).unwrap())
            .await;
        let nothing = service
            .trending_medications_on(NaiveDate::from_ymd_opt(2025, 9, 16).unwrap())
            .await;

        let names: Vec<&str> = trending.iter().map(|t| t.medication_name.as_str()).collect();
        assert_eq!(names, vec!["Dipirona", "Losartana"]);
        assert!(trending.iter().all(|t| t.prescription_count == 1 && t.average_daily == 1));
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn snapshot_loads_every_part() {
        let service = service(seeded_store().await);

        let snapshot = service.load_snapshot().await;

        assert_eq!(snapshot.medications.len(), 4);
        assert_eq!(snapshot.inventory.len(), 5);
        assert_eq!(snapshot.top_inventory.len(), 4);
        assert_eq!(snapshot.prescriptions.len(), 3);
        assert_eq!(snapshot.prescription_items.len(), 4);
        assert_eq!(snapshot.suppliers.len(), 2);
        assert_eq!(snapshot.purchase_orders.len(), 2);
        assert_eq!(snapshot.purchase_order_items.len(), 2);
        assert_eq!(snapshot.counts.get(Relation::Medications), 4);
        assert_eq!(snapshot.recent_activity.len(), 4);
    }

    #[tokio::test]
    async fn one_failing_query_leaves_the_other_nine_populated() {
        let service = service(FaultyStore::new(seeded_store().await).failing(Relation::Suppliers));

        let snapshot = service.load_snapshot().await;

        assert!(snapshot.suppliers.is_empty());
        assert_eq!(snapshot.counts.get(Relation::Suppliers), 0);
        assert_eq!(snapshot.medications.len(), 4);
        assert_eq!(snapshot.inventory.len(), 5);
        assert_eq!(snapshot.top_inventory.len(), 4);
        assert_eq!(snapshot.prescriptions.len(), 3);
        assert_eq!(snapshot.prescription_items.len(), 4);
        assert_eq!(snapshot.purchase_orders.len(), 2);
        assert_eq!(snapshot.purchase_order_items.len(), 2);
        assert_eq!(snapshot.recent_activity.len(), 4);
    }

    #[tokio::test]
    async fn overview_aggregates_the_snapshot() {
        let service = service(seeded_store().await);

        let overview = service.overview().await;

        assert_eq!(overview.stats.total_medications, 4);
        assert_eq!(overview.stats.low_stock_alerts, 2);
        assert_eq!(overview.stats.stock_efficiency, 60.0);
        assert_eq!(overview.stats.total_prescription_revenue.to_string(), "107.75");
        assert_eq!(overview.inventory_chart.len(), 4);
        assert_eq!(overview.prescription_trend.len(), 6);
        assert_eq!(overview.schema_overview.len(), 7);
    }

    #[tokio::test]
    async fn distribution_counts_all_tables() {
        let service = service(seeded_store().await);

        let distribution = service.table_distribution().await;

        assert_eq!(distribution.tables.len(), 8);
        assert_eq!(distribution.total_records, 4 + 5 + 3 + 4 + 2 + 2 + 2);
    }

    #[tokio::test]
    async fn live_inventory_follows_updates() {
        let store = seeded_store().await;
        let service = service(store.clone());
        let mut view = service.watch_top_inventory().await.unwrap();

        let filter = Filter { embed: None, column: "inventory_id", op: FilterOp::Eq(FilterValue::Int(4)) };
        store.update(Relation::Inventory, &[filter], json!({"quantity_in_stock": 1})).await.unwrap();

        let refreshed = tokio::time::timeout(Duration::from_secs(1), view.changed())
            .await
            .unwrap()
            .unwrap();
        let item = refreshed.iter().find(|i| i.inventory_id == 4).unwrap();
        assert_eq!(item.quantity_in_stock, 1);
    }

    #[tokio::test]
    async fn live_distribution_follows_inserts() {
        let store = seeded_store().await;
        let service = service(store.clone());
        let mut view = service.watch_table_distribution().await.unwrap();
        assert_eq!(view.current().total_records, 22);

        store
            .insert(Relation::Suppliers, json!({"supplier_name": "Nova Distribuidora"}))
            .await
            .unwrap();

        let refreshed = tokio::time::timeout(Duration::from_secs(1), view.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.total_records, 23);
    }
}
