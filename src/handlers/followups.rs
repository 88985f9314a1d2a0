// src/handlers/followups.rs

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::IntoParams;

use crate::{common::error::AppError, config::AppState};

/// Campos que o CRM exige para criar um acompanhamento.
const REQUIRED_SAVE_FIELDS: [&str; 5] = ["followContext", "code", "followTime", "org", "_status"];

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpListQuery {
    /// Página (1-based)
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

// GET /api/customers/{identifier}/followups
#[utoipa::path(
    get,
    path = "/api/customers/{identifier}/followups",
    tag = "Followups",
    params(
        ("identifier" = String, Path, description = "Código do cliente, código parcial ou telefone"),
        FollowUpListQuery,
    ),
    responses(
        (status = 200, description = "Registros filtrados + cronograma de manutenção"),
        (status = 500, description = "Falha ao consultar o CRM")
    )
)]
pub async fn customer_followups(
    State(app_state): State<AppState>,
    Path(identifier): Path<String>,
    Query(query): Query<FollowUpListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page.unwrap_or(1);
    let page_size = query
        .page_size
        .unwrap_or(app_state.settings.default_page_size);

    let resolution = app_state
        .identity_service
        .resolve(&identifier, page, page_size)
        .await?;

    let target_code = resolution
        .resolved_code
        .clone()
        .unwrap_or_else(|| identifier.clone());

    // A consulta de tarefas é opcional e nunca derruba a resposta.
    let mut tasks = Vec::new();
    if app_state.settings.task_list_path.is_some() {
        match app_state
            .crm_gateway
            .search_tasks(&target_code, 1, app_state.settings.default_task_page_size)
            .await
        {
            Ok(found) => tasks = found,
            Err(err) => {
                tracing::warn!("consulta de tarefas falhou para {}: {}", identifier, err);
            }
        }
    }

    let mut records = app_state.record_service.build_records(&resolution.records).await?;

    let today = Local::now().date_naive();
    let mut summary = app_state
        .schedule_service
        .summarize(&target_code, &resolution.records, &tasks, today);
    if let Some(code) = &resolution.resolved_code {
        if &summary.customer_code != code {
            summary.customer_code = code.clone();
        }
    }

    // Registro sem data própria herda a próxima data do resumo.
    if let Some(upcoming) = summary.next_service_date.clone() {
        for record in &mut records {
            if record.next_service_date.is_null() {
                record.next_service_date = Value::String(upcoming.clone());
            }
        }
    }

    Ok(Json(json!({
        "code": "OK",
        "customerCode": identifier,
        "resolvedCustomerCode": resolution.resolved_code,
        "suggestedCodes": resolution.suggestions,
        "records": records,
        "tasks": tasks,
        "summary": summary,
        "filterInfo": resolution.filter_info,
    })))
}

// POST /api/followups
#[utoipa::path(
    post,
    path = "/api/followups",
    tag = "Followups",
    responses(
        (status = 200, description = "Resultado do save repassado do CRM"),
        (status = 400, description = "Campo obrigatório ausente"),
        (status = 500, description = "Falha ao salvar no CRM")
    )
)]
pub async fn save_followup(
    State(app_state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let body = payload.as_object().ok_or(AppError::EmptyPayload)?;
    if body.is_empty() {
        return Err(AppError::EmptyPayload);
    }
    for field in REQUIRED_SAVE_FIELDS {
        if !body.contains_key(field) {
            return Err(AppError::MissingField(field));
        }
    }

    let result = app_state.crm_gateway.save_follow_up(&payload).await?;
    Ok(Json(result))
}
