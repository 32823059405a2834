// src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

use pharmacy_dashboard::{
    config::{warn_if_exposed, AppState, Config},
    docs::ApiDoc,
    handlers,
    middleware::auth::session_guard,
};

fn router(app_state: AppState) -> Router {
    // Rotas de autenticação (públicas)
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route(
            "/me",
            get(handlers::auth::get_me).layer(axum_middleware::from_fn_with_state(
                app_state.clone(),
                session_guard,
            )),
        );

    let dashboard_routes = Router::new()
        .route("/overview", get(handlers::dashboard::get_overview))
        .route("/counts", get(handlers::dashboard::get_counts))
        .route("/distribution", get(handlers::dashboard::get_distribution))
        .route("/activity", get(handlers::dashboard::get_activity))
        .route("/trending", get(handlers::dashboard::get_trending))
        .route("/live/inventory", get(handlers::dashboard::live_inventory))
        .route("/live/distribution", get(handlers::dashboard::live_distribution))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            session_guard,
        ));

    let pharmacy_routes = Router::new()
        .route("/medications", get(handlers::pharmacy::list_medications))
        .route("/inventory", get(handlers::pharmacy::list_inventory))
        .route("/inventory/low-stock", get(handlers::pharmacy::list_low_stock))
        .route("/prescriptions", get(handlers::pharmacy::list_prescriptions))
        .route("/prescription-items", get(handlers::pharmacy::list_prescription_items))
        .route("/suppliers", get(handlers::pharmacy::list_suppliers))
        .route("/purchase-orders", get(handlers::pharmacy::list_purchase_orders))
        .route("/purchase-order-items", get(handlers::pharmacy::list_purchase_order_items))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            session_guard,
        ));

    // Combina tudo no router principal
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/auth", auth_routes)
        .nest("/api/dashboard", dashboard_routes)
        .nest("/api/pharmacy", pharmacy_routes)
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Inicializa o logger (RUST_LOG sobrescreve o nível padrão)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(&config).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Sessão anterior, se houver
    if app_state.session.restore().await.is_none() {
        tracing::info!("Nenhuma sessão salva; faça login para abrir o painel.");
    }

    let app = router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    warn_if_exposed(local_addr);
    tracing::info!("🚀 Servidor escutando em {}", local_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
