// src/db/user_repo.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::{DataStore, Filter, FilterOp, FilterValue, Query, Relation, StoreError},
    models::auth::User,
};

// O repositório de usuários, responsável por todas as interações com a tabela 'users'
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DataStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    // Busca um usuário pelo e-mail (comparação exata, sensível a maiúsculas)
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = Query::from(Relation::Users)
            .eq("email", FilterValue::Text(email.to_string()))
            .limit(1);
        let rows = self.store.select(&query).await?;
        first_user(rows)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let query = Query::from(Relation::Users)
            .columns(&["email"])
            .eq("email", FilterValue::Text(email.to_string()))
            .limit(1);
        Ok(!self.store.select(&query).await?.is_empty())
    }

    // Cria um novo usuário. `None` quando o store não devolve a linha criada.
    pub async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let row = json!({
            "email": email,
            "hashed_password": hashed_password,
            "created_at": now,
            "updated_at": now,
        });
        // Outro cadastro com o mesmo e-mail pode ter chegado depois da checagem
        let rows = match self.store.insert(Relation::Users, row).await {
            Err(StoreError::Conflict(..)) => return Err(AppError::DuplicateAccount),
            result => result?,
        };
        first_user(rows)
    }

    // Marca o último acesso. Devolve o usuário atualizado, se o store o retornar.
    pub async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<User>, AppError> {
        let filter = Filter {
            embed: None,
            column: "id",
            op: FilterOp::Eq(FilterValue::Uuid(id)),
        };
        let rows = self
            .store
            .update(Relation::Users, &[filter], json!({ "updated_at": now }))
            .await?;
        first_user(rows)
    }
}

fn first_user(rows: Vec<Value>) -> Result<Option<User>, AppError> {
    rows.into_iter()
        .next()
        .map(serde_json::from_value::<User>)
        .transpose()
        .map_err(AppError::from)
}
