// src/services/session.rs

use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::{common::error::AppError, models::auth::PublicUser};

/// Chave fixa sob a qual a identidade fica guardada.
pub const SESSION_KEY: &str = "pharmacy_user";

// Onde a identidade sobrevive entre reinícios
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn load(&self) -> Result<Option<PublicUser>, AppError>;
    async fn save(&self, user: &PublicUser) -> Result<(), AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}

// Arquivo JSON local: `{"pharmacy_user": {...}}`
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionCache for FileSessionCache {
    async fn load(&self) -> Result<Option<PublicUser>, AppError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut entries: Map<String, Value> = serde_json::from_str(&raw)?;
        match entries.remove(SESSION_KEY) {
            Some(Value::Null) | None => Ok(None),
            Some(user) => Ok(Some(serde_json::from_value(user)?)),
        }
    }

    async fn save(&self, user: &PublicUser) -> Result<(), AppError> {
        let mut entries = Map::new();
        entries.insert(SESSION_KEY.to_string(), serde_json::to_value(user)?);
        let raw = serde_json::to_vec_pretty(&entries)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionCache {
    slot: RwLock<Option<PublicUser>>,
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn load(&self) -> Result<Option<PublicUser>, AppError> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, user: &PublicUser) -> Result<(), AppError> {
        *self.slot.write().await = Some(user.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        *self.slot.write().await = None;
        Ok(())
    }
}

// A sessão do operador. Vive no AppState e é passada a quem precisa de identidade.
#[derive(Clone)]
pub struct Session {
    cache: Arc<dyn SessionCache>,
    current: Arc<RwLock<Option<PublicUser>>>,
}

impl Session {
    pub fn new(cache: Arc<dyn SessionCache>) -> Self {
        Self {
            cache,
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Recupera a identidade guardada na inicialização.
    /// A identidade não é revalidada contra o banco.
    pub async fn restore(&self) -> Option<PublicUser> {
        let restored = match self.cache.load().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Cache de sessão ilegível, iniciando deslogado: {}", e);
                None
            }
        };

        if let Some(user) = &restored {
            tracing::info!("🔑 Sessão restaurada para {}", user.email);
        }
        *self.current.write().await = restored.clone();
        restored
    }

    pub async fn current(&self) -> Option<PublicUser> {
        self.current.read().await.clone()
    }

    pub async fn sign_in(&self, user: PublicUser) -> Result<(), AppError> {
        self.cache.save(&user).await?;
        *self.current.write().await = Some(user);
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        *self.current.write().await = None;
        self.cache.clear().await
    }
}
