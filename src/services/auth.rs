// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::Utc;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::PublicUser,
    services::session::Session,
};

// Custo fixo do bcrypt no cadastro
const HASH_COST: u32 = 10;

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    session: Session,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, session: Session) -> Self {
        Self { user_repo, session }
    }

    /// Confere as credenciais, marca o acesso e abre a sessão.
    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, AppError> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let hash_clone = user.hashed_password.clone();

        // Executa a verificação em um thread separado
        let is_password_valid = tokio::task::spawn_blocking(move || verify(&password_clone, &hash_clone))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            return Err(AppError::InvalidCredentials);
        }

        // O registro de acesso é um efeito colateral: se falhar, seguimos com o usuário já lido
        let user = match self.user_repo.touch(user.id, Utc::now()).await {
            Ok(Some(updated)) => updated,
            Ok(None) => user,
            Err(e) => {
                tracing::warn!("Não foi possível atualizar o último acesso de {}: {}", user.email, e);
                user
            }
        };

        let public = PublicUser::from(user);
        self.session.sign_in(public.clone()).await?;
        tracing::info!("✅ Login de {}", public.email);
        Ok(public)
    }

    /// Cria a conta. Não abre sessão: o operador precisa fazer login depois.
    pub async fn register(&self, email: &str, password: &str) -> Result<PublicUser, AppError> {
        if self.user_repo.email_exists(email).await? {
            return Err(AppError::DuplicateAccount);
        }

        let password_clone = password.to_owned();
        let hashed_password = tokio::task::spawn_blocking(move || hash(&password_clone, HASH_COST))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;

        let user = self
            .user_repo
            .create_user(email, &hashed_password, Utc::now())
            .await?
            .ok_or(AppError::PersistenceError)?;

        tracing::info!("✅ Conta criada para {}", user.email);
        Ok(PublicUser::from(user))
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        self.session.sign_out().await
    }

    pub async fn current_user(&self) -> Option<PublicUser> {
        self.session.current().await
    }
}
