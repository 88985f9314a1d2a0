use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("O corpo da requisição não pode ser vazio")]
    EmptyPayload,

    #[error("Campo obrigatório ausente: {0}")]
    MissingField(&'static str),

    #[error("Informe o código do cliente ou telefone")]
    IdentifierRequired,

    #[error("Cliente não encontrado")]
    MemberNotFound,

    #[error("Configuração ausente: {0}")]
    MissingConfiguration(&'static str),

    // O CRM respondeu, mas com status HTTP ou código de negócio de erro.
    #[error("Erro do CRM em {path}: {detail}")]
    Upstream { path: String, detail: String },

    #[error("Token de acesso recusado: {0}")]
    TokenRejected(String),

    // Falha de rede/transporte ao falar com o CRM.
    #[error("Falha ao chamar o CRM")]
    Http(#[from] reqwest::Error),

    // Variante genérica para qualquer outro erro inesperado.
    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::MissingField(field) => {
                let body =
                    Json(json!({ "error": format!("Campo obrigatório ausente: {}", field) }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::EmptyPayload => (
                StatusCode::BAD_REQUEST,
                "O corpo da requisição não pode ser vazio.",
            ),
            AppError::IdentifierRequired => (
                StatusCode::BAD_REQUEST,
                "Informe o código do cliente ou telefone.",
            ),
            AppError::MemberNotFound => (StatusCode::NOT_FOUND, "Cliente não encontrado."),

            // Todos os outros (Upstream, Http, configuração, inesperados) viram 500.
            // O `tracing` vai logar a mensagem detalhada que `thiserror` nos deu.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.")
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
