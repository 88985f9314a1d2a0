// src/models/schedule.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Tarefa agendada do CRM, usada apenas como sinal para inferir a próxima
/// data de manutenção. Assim como os acompanhamentos, o payload é
/// semi-estruturado, então guardamos o `Value` cru.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskRecord(pub Value);

impl TaskRecord {
    pub fn owner_name(&self) -> String {
        self.0
            .get("ower_name")
            .map(crate::models::followup::scalar_to_string)
            .unwrap_or_default()
    }

    pub fn start_date(&self) -> Option<&Value> {
        self.0.get("startDate")
    }

    pub fn plan_date(&self) -> Option<&Value> {
        self.0.get("planDate")
    }

    pub fn end_date(&self) -> Option<&Value> {
        self.0.get("endDate")
    }
}

/// Resumo do cronograma de manutenção de um cliente.
/// Derivado e recalculado a cada requisição, nunca cacheado.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceSummary {
    #[schema(example = "C3770")]
    pub customer_code: String,
    pub customer_name: Option<String>,
    #[schema(example = "2024-05-01")]
    pub latest_service_date: Option<String>,
    pub previous_service_date: Option<String>,
    pub next_service_date: Option<String>,
}
