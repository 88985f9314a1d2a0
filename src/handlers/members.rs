// src/handlers/members.rs

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

use crate::{common::error::AppError, config::AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MemberProfilePayload {
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "C3770")]
    pub identifier: String,
}

// POST /api/members/profile
#[utoipa::path(
    post,
    path = "/api/members/profile",
    tag = "Members",
    request_body = MemberProfilePayload,
    responses(
        (status = 200, description = "Perfil do membro"),
        (status = 400, description = "Identificador ausente"),
        (status = 404, description = "Cliente não encontrado"),
        (status = 500, description = "Falha ao consultar o CRM")
    )
)]
pub async fn member_profile(
    State(app_state): State<AppState>,
    Json(payload): Json<MemberProfilePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let identifier = payload.identifier.trim();
    if identifier.is_empty() {
        return Err(AppError::IdentifierRequired);
    }

    let profile = app_state.profile_service.build(identifier).await?;

    Ok(Json(json!({ "code": "OK", "profile": profile })))
}
