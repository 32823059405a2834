// src/config.rs

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{DataStore, PgStore, PharmacyRepository, UserRepository},
    services::{
        auth::AuthService,
        dashboard_service::DashboardService,
        session::{FileSessionCache, Session, SessionCache},
    },
};

// Configuração lida do ambiente (e do .env, se existir)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub session_file: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
        let db_max_connections = match env::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS inválido: {raw}"))?,
            Err(_) => 5,
        };
        let session_file = env::var("SESSION_FILE")
            .unwrap_or_else(|_| ".pharmacy_session.json".to_string())
            .into();

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            session_file,
        })
    }
}

/// A sessão é uma só para o processo: fora do loopback, qualquer cliente da rede
/// passa pelo guard depois que alguém fizer login. Devolve `true` quando avisou.
pub fn warn_if_exposed(addr: SocketAddr) -> bool {
    if addr.ip().is_loopback() {
        return false;
    }
    tracing::warn!(
        "⚠️ Servidor exposto em {}: a sessão do operador vale para qualquer cliente que alcançar este endereço",
        addr
    );
    true
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub pharmacy_repo: PharmacyRepository,
    pub auth_service: AuthService,
    pub dashboard_service: DashboardService,
    pub session: Session,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let store: Arc<dyn DataStore> = Arc::new(PgStore::new(db_pool.clone()));
        let session_cache = Arc::new(FileSessionCache::new(&config.session_file));

        Ok(Self::assemble(db_pool, store, session_cache))
    }

    // --- Monta o gráfico de dependências ---
    pub fn assemble(
        db_pool: PgPool,
        store: Arc<dyn DataStore>,
        session_cache: Arc<dyn SessionCache>,
    ) -> Self {
        let session = Session::new(session_cache);

        let pharmacy_repo = PharmacyRepository::new(store.clone());
        let user_repo = UserRepository::new(store.clone());
        let auth_service = AuthService::new(user_repo, session.clone());
        let dashboard_service = DashboardService::new(store, pharmacy_repo.clone());

        Self {
            db_pool,
            pharmacy_repo,
            auth_service,
            dashboard_service,
            session,
        }
    }
}
