// src/models/profile.rs

use serde::Serialize;
use utoipa::ToSchema;

/// Perfil de membro montado a partir do último acompanhamento + cadastro.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    #[schema(example = "C3770")]
    pub keyword: String,
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    #[schema(example = "2024-05-01")]
    pub latest_service_date: Option<String>,
    pub previous_service_date: Option<String>,
    pub address: Option<String>,
    pub contact: ContactInfo,
    // Reservado para o programa de pontos; ainda não integrado.
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
}
