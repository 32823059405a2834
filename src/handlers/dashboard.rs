// src/handlers/dashboard.rs

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{stream, Stream};
use serde::Serialize;

use crate::{
    common::error::AppError,
    config::AppState,
    models::{
        dashboard::{Activity, DashboardOverview, TableCounts, TableDistribution, TrendingMedication},
        pharmacy::InventoryItem,
    },
    services::live::LiveView,
};

// GET /api/dashboard/overview
#[utoipa::path(
    get,
    path = "/api/dashboard/overview",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Cards, gráficos e atividade recente", body = DashboardOverview),
        (status = 401, description = "Sem sessão")
    )
)]
pub async fn get_overview(State(app_state): State<AppState>) -> Json<DashboardOverview> {
    Json(app_state.dashboard_service.overview().await)
}

// GET /api/dashboard/counts
#[utoipa::path(
    get,
    path = "/api/dashboard/counts",
    tag = "Dashboard",
    responses((status = 200, description = "Registros por tabela", body = TableCounts))
)]
pub async fn get_counts(State(app_state): State<AppState>) -> Json<TableCounts> {
    Json(app_state.dashboard_service.table_counts().await)
}

// GET /api/dashboard/distribution
#[utoipa::path(
    get,
    path = "/api/dashboard/distribution",
    tag = "Dashboard",
    responses((status = 200, description = "Participação de cada tabela no total", body = TableDistribution))
)]
pub async fn get_distribution(State(app_state): State<AppState>) -> Json<TableDistribution> {
    Json(app_state.dashboard_service.table_distribution().await)
}

// GET /api/dashboard/activity
#[utoipa::path(
    get,
    path = "/api/dashboard/activity",
    tag = "Dashboard",
    responses((status = 200, description = "Até quatro eventos recentes", body = Vec<Activity>))
)]
pub async fn get_activity(State(app_state): State<AppState>) -> Json<Vec<Activity>> {
    Json(app_state.dashboard_service.recent_activity().await)
}

// GET /api/dashboard/trending
#[utoipa::path(
    get,
    path = "/api/dashboard/trending",
    tag = "Dashboard",
    responses((status = 200, description = "Mais receitados hoje (UTC)", body = Vec<TrendingMedication>))
)]
pub async fn get_trending(State(app_state): State<AppState>) -> Json<Vec<TrendingMedication>> {
    Json(app_state.dashboard_service.trending_medications().await)
}

// GET /api/dashboard/live/inventory
#[utoipa::path(
    get,
    path = "/api/dashboard/live/inventory",
    tag = "Dashboard",
    responses((status = 200, description = "SSE: estoque do gráfico a cada mudança", body = Vec<InventoryItem>, content_type = "text/event-stream"))
)]
pub async fn live_inventory(
    State(app_state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let view = app_state.dashboard_service.watch_top_inventory().await?;
    Ok(Sse::new(live_events("inventory", view)).keep_alive(KeepAlive::default()))
}

// GET /api/dashboard/live/distribution
#[utoipa::path(
    get,
    path = "/api/dashboard/live/distribution",
    tag = "Dashboard",
    responses((status = 200, description = "SSE: distribuição de registros a cada mudança", body = TableDistribution, content_type = "text/event-stream"))
)]
pub async fn live_distribution(
    State(app_state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let view = app_state.dashboard_service.watch_table_distribution().await?;
    Ok(Sse::new(live_events("distribution", view)).keep_alive(KeepAlive::default()))
}

// Primeiro o valor atual, depois um evento por recarga.
// Quando o cliente desconecta o stream é descartado e leva a view junto.
fn live_events<T>(name: &'static str, view: LiveView<T>) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    stream::unfold((view, true), move |(mut view, first)| async move {
        let value = if first { view.current() } else { view.changed().await? };
        let event = Event::default().event(name).json_data(&value).unwrap_or_else(|e| {
            tracing::error!("🔥 Falha ao serializar evento {}: {}", name, e);
            Event::default().comment("erro de serialização")
        });
        Some((Ok(event), (view, false)))
    })
}
