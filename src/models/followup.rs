// src/models/followup.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::models::files::AttachmentFile;

/// Visão somente-leitura sobre um registro de acompanhamento cru do CRM.
///
/// O payload do YonBIP é semi-estruturado (os campos variam por tenant e por
/// formulário), então guardamos o `Value` inteiro e expomos acessores tipados
/// para os campos que o backend realmente consome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FollowUpRecord(pub Value);

impl FollowUpRecord {
    /// Acesso por caminho pontilhado (ex: `"customer.code"`).
    /// Ausente em qualquer nível (ou `null`) retorna `None`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_nested(&self.0, path)
    }

    /// Identificador do registro, como string (o CRM ora manda número, ora string).
    pub fn id(&self, id_field: &str) -> String {
        self.0
            .get(id_field)
            .map(scalar_to_string)
            .unwrap_or_default()
    }

    // O campo vem assim mesmo do CRM: "ower_name", não "owner_name".
    pub fn owner_name(&self) -> String {
        self.0
            .get("ower_name")
            .map(scalar_to_string)
            .unwrap_or_default()
    }

    /// Referência interna do cliente (`customer`), normalizada para string.
    pub fn customer_ref(&self) -> Option<String> {
        scalar_ref(self.0.get("customer"))
    }

    /// Referência da organização (`org`), normalizada para string.
    pub fn org_ref(&self) -> Option<String> {
        scalar_ref(self.0.get("org"))
    }

    pub fn customer_raw(&self) -> Option<&Value> {
        self.0.get("customer")
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.0.get("customer_name").and_then(Value::as_str)
    }

    /// Data do acompanhamento: `followTime`, com fallback para `followUpTime`.
    pub fn follow_time(&self) -> Option<&Value> {
        non_null(self.0.get("followTime")).or_else(|| non_null(self.0.get("followUpTime")))
    }

    pub fn next_follow_time(&self) -> Option<&Value> {
        non_null(self.0.get("nextFollowUpTime"))
    }

    /// Valores dos cinco slots de foto (`picture1`..`picture5`), na ordem.
    pub fn picture_slots(&self) -> impl Iterator<Item = &Value> {
        ["picture1", "picture2", "picture3", "picture4", "picture5"]
            .into_iter()
            .filter_map(|key| self.0.get(key))
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn scalar_ref(value: Option<&Value>) -> Option<String> {
    let text = scalar_to_string(value?);
    if text.is_empty() { None } else { Some(text) }
}

/// Converte um escalar JSON para string (números viram sua forma decimal).
/// Listas, objetos e `null` viram string vazia.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Navega um `Value` por uma lista ordenada de campos separados por ponto.
/// Semântica: faltando em qualquer nível, retorna `None` em vez de errar.
pub fn get_nested<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = source;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Registro de serviço já filtrado e enriquecido, como sai na API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    #[schema(example = "1853970101881337867")]
    pub followup_id: String,

    // ISO `YYYY-MM-DD` quando a data parseia; senão o valor cru do CRM.
    #[schema(value_type = Object)]
    pub service_date: Value,
    #[schema(value_type = Object)]
    pub next_service_date: Value,

    // O registro original completo, para o frontend inspecionar.
    #[schema(value_type = Object)]
    pub raw: Value,

    pub files: Vec<AttachmentFile>,
    pub photos: Vec<AttachmentFile>,
    pub documents: Vec<AttachmentFile>,
}
