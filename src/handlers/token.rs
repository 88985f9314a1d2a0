// src/handlers/token.rs

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use crate::{common::error::AppError, config::AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct TokenQuery {
    /// "1" força a renovação do token, ignorando o cache.
    pub refresh: Option<String>,
}

// GET /api/token — endpoint de diagnóstico
#[utoipa::path(
    get,
    path = "/api/token",
    tag = "Token",
    params(TokenQuery),
    responses(
        (status = 200, description = "Token de acesso vigente"),
        (status = 500, description = "Falha ao obter o token")
    )
)]
pub async fn get_token(
    State(app_state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    let force_refresh = query.refresh.as_deref() == Some("1");
    let token = app_state.token_service.get_token(force_refresh).await?;
    Ok(Json(json!({ "access_token": token })))
}
