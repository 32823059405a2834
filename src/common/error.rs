// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::store::StoreError;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// As leituras do painel nunca chegam aqui: degradam para lista vazia no repositório.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Conta já existe")]
    DuplicateAccount,

    #[error("Falha ao persistir a conta")]
    PersistenceError,

    #[error("Sessão não iniciada")]
    Unauthenticated,

    #[error("Erro no store: {0}")]
    StoreError(#[from] StoreError),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de E/S: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Erro de serialização: {0}")]
    SerializationError(#[from] serde_json::Error),

    // Variante genérica para qualquer outro erro inesperado
    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro inesperado")]
    UnexpectedError(#[from] anyhow::Error),
}

impl AppError {
    /// A mensagem que o operador vê.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "Um ou mais campos são inválidos.",
            AppError::InvalidCredentials => "E-mail ou senha inválidos.",
            AppError::DuplicateAccount => "Já existe uma conta com este e-mail.",
            AppError::PersistenceError => "Falha ao criar a conta.",
            AppError::Unauthenticated => "Faça login para continuar.",
            AppError::StoreError(_) => "Ocorreu um erro no banco de dados.",
            _ => "Ocorreu um erro inesperado.",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::DuplicateAccount => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let AppError::ValidationError(errors) = &self {
            let mut details = std::collections::HashMap::new();
            for (field, field_errors) in errors.field_errors() {
                let messages: Vec<String> = field_errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .collect();
                details.insert(field.to_string(), messages);
            }
            let body = Json(json!({
                "success": false,
                "error": self.user_message(),
                "details": details,
            }));
            return (status, body).into_response();
        }

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu.
            tracing::error!("Erro Interno do Servidor: {}", self);
        }

        let body = Json(json!({ "success": false, "error": self.user_message() }));
        (status, body).into_response()
    }
}
