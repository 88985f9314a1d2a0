// src/crm/gateway.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::{
    common::AppError,
    config::Settings,
    crm::token::TokenService,
    models::{FollowUpRecord, TaskRecord},
};

/// Resultado de uma busca de acompanhamentos, anotado com o campo de
/// consulta que produziu registros (ou o último tentado).
#[derive(Debug, Clone)]
pub struct FollowUpSearch {
    pub records: Vec<FollowUpRecord>,
    pub search_field: Option<String>,
}

/// Contrato com o backend CRM. Os serviços dependem deste trait, nunca do
/// cliente HTTP concreto — os testes injetam uma implementação falsa.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Busca acompanhamentos. Sem `field`, percorre a cadeia de campos
    /// configurada e devolve o primeiro resultado não-vazio.
    async fn search_follow_ups(
        &self,
        identifier: &str,
        page: u32,
        page_size: u32,
        field: Option<&str>,
        operator: Option<&str>,
    ) -> Result<FollowUpSearch, AppError>;

    async fn search_tasks(
        &self,
        customer_code: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TaskRecord>, AppError>;

    /// Cadastro do cliente (o objeto `data` da resposta).
    async fn customer_detail(&self, customer_id: &str, org_id: &str) -> Result<Value, AppError>;

    async fn addresses_by_codes(&self, codes: &[String]) -> Result<Vec<Value>, AppError>;

    /// Consulta em lote de anexos. Devolve o `data` cru: pode ser uma lista
    /// plana ou um mapa chaveado pelos ids pedidos.
    async fn query_files(&self, file_ids: &[String]) -> Result<Value, AppError>;

    /// Fallback opcional quando a resposta de arquivos não embute URL.
    async fn file_download_url(&self, file_id: &str) -> Result<String, AppError>;

    async fn save_follow_up(&self, payload: &Value) -> Result<Value, AppError>;
}

/// Adaptador HTTP real, autenticado via token em query string.
pub struct HttpCrmGateway {
    client: reqwest::Client,
    settings: Arc<Settings>,
    tokens: Arc<TokenService>,
}

impl HttpCrmGateway {
    pub fn new(settings: Arc<Settings>, tokens: Arc<TokenService>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            settings,
            tokens,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        let url = format!("{}{}", self.settings.gateway_url.trim_end_matches('/'), path);
        let token = self.tokens.get_token(false).await?;

        let mut request = self
            .client
            .request(method, &url)
            .query(&[("access_token", token.as_str())]);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                path: path.to_string(),
                detail: format!("HTTP {status}: {detail}"),
            });
        }

        let data: Value = response.json().await?;
        if !is_success_code(data.get("code")) {
            return Err(AppError::Upstream {
                path: path.to_string(),
                detail: data.to_string(),
            });
        }
        Ok(data)
    }
}

/// O gateway YonBIP mistura convenções de código de sucesso entre APIs.
fn is_success_code(code: Option<&Value>) -> bool {
    match code {
        Some(Value::String(s)) => matches!(s.as_str(), "00000" | "200" | "200000"),
        Some(Value::Number(n)) => n.as_i64() == Some(200),
        _ => false,
    }
}

/// Extrai `data.recordList` de uma resposta de listagem.
fn record_list(response: &Value) -> Vec<Value> {
    response
        .get("data")
        .and_then(|data| data.get("recordList"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Filtro `simpleVOs` de uma consulta; o operador `between` exige `value2`.
fn simple_filter(field: &str, operator: &str, value: &str) -> Value {
    let mut filter = json!({
        "field": field,
        "op": operator,
        "value1": value,
    });
    if operator == "between" {
        filter["value2"] = Value::String(value.to_string());
    }
    filter
}

#[async_trait]
impl CrmGateway for HttpCrmGateway {
    async fn search_follow_ups(
        &self,
        identifier: &str,
        page: u32,
        page_size: u32,
        field: Option<&str>,
        operator: Option<&str>,
    ) -> Result<FollowUpSearch, AppError> {
        let base_payload = json!({
            "pageIndex": page,
            "pageSize": page_size,
        });

        if identifier.is_empty() {
            let response = self
                .request(Method::POST, &self.settings.followup_list_path, &[], Some(&base_payload))
                .await?;
            return Ok(FollowUpSearch {
                records: record_list(&response).into_iter().map(FollowUpRecord).collect(),
                search_field: None,
            });
        }

        let primary = field.unwrap_or(self.settings.followup_customer_field.as_str());
        let operator = operator.unwrap_or(self.settings.followup_customer_operator.as_str());

        let mut candidates = vec![primary.to_string()];
        for fallback in &self.settings.followup_customer_field_fallbacks {
            if !candidates.contains(fallback) {
                candidates.push(fallback.clone());
            }
        }

        // Tenta cada campo na ordem; o primeiro com registros vence.
        let mut last: Option<(Value, String)> = None;
        for candidate in candidates {
            let mut payload = base_payload.clone();
            payload["simpleVOs"] = json!([{
                "field": candidate,
                "op": operator,
                "value1": identifier,
            }]);

            let response = self
                .request(Method::POST, &self.settings.followup_list_path, &[], Some(&payload))
                .await?;
            let records = record_list(&response);
            if !records.is_empty() {
                return Ok(FollowUpSearch {
                    records: records.into_iter().map(FollowUpRecord).collect(),
                    search_field: Some(candidate),
                });
            }
            last = Some((response, candidate));
        }

        // Todas vazias: devolve a última resposta, anotada com o último campo.
        let (response, candidate) = last.expect("a cadeia de campos nunca é vazia");
        Ok(FollowUpSearch {
            records: record_list(&response).into_iter().map(FollowUpRecord).collect(),
            search_field: Some(candidate),
        })
    }

    async fn search_tasks(
        &self,
        customer_code: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TaskRecord>, AppError> {
        let path = self
            .settings
            .task_list_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(AppError::MissingConfiguration("TASK_LIST_PATH"))?;

        let mut payload = json!({
            "pageIndex": page,
            "pageSize": page_size,
        });
        if !customer_code.is_empty() {
            payload["simpleVOs"] = json!([simple_filter(
                &self.settings.task_customer_field,
                &self.settings.task_customer_operator,
                customer_code,
            )]);
        }

        let response = self.request(Method::POST, path, &[], Some(&payload)).await?;
        Ok(record_list(&response).into_iter().map(TaskRecord).collect())
    }

    async fn customer_detail(&self, customer_id: &str, org_id: &str) -> Result<Value, AppError> {
        let response = self
            .request(
                Method::GET,
                &self.settings.customer_detail_path,
                &[("id", customer_id), ("orgId", org_id)],
                None,
            )
            .await?;
        Ok(response.get("data").cloned().unwrap_or_else(|| json!({})))
    }

    async fn addresses_by_codes(&self, codes: &[String]) -> Result<Vec<Value>, AppError> {
        let payload = json!({
            "codeList": codes,
            "pageIndex": 1,
            "pageSize": codes.len().max(1),
        });
        let response = self
            .request(
                Method::POST,
                &self.settings.customer_address_list_path,
                &[],
                Some(&payload),
            )
            .await?;
        Ok(response
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_files(&self, file_ids: &[String]) -> Result<Value, AppError> {
        let payload = json!({ "businessIds": file_ids });
        let response = self
            .request(
                Method::POST,
                &self.settings.followup_query_files_path,
                &[],
                Some(&payload),
            )
            .await?;
        Ok(response.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn file_download_url(&self, file_id: &str) -> Result<String, AppError> {
        let path = self
            .settings
            .file_download_path
            .as_deref()
            .ok_or(AppError::MissingConfiguration("FILE_DOWNLOAD_PATH"))?;

        let response = self
            .request(Method::GET, path, &[("fileId", file_id)], None)
            .await?;

        // Algumas instalações devolvem a URL direto em `data`, outras em
        // `data.url`/`data.downloadUrl`.
        let url = match response.get("data") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Object(obj)) => obj
                .get("url")
                .or_else(|| obj.get("downloadUrl"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        };
        url.ok_or_else(|| AppError::Upstream {
            path: path.to_string(),
            detail: "URL de download ausente na resposta".to_string(),
        })
    }

    async fn save_follow_up(&self, payload: &Value) -> Result<Value, AppError> {
        let body = json!({
            "data": payload,
            "systemSource": "followupOpenAPIAdd",
        });
        self.request(Method::POST, &self.settings.followup_save_path, &[], Some(&body))
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codigos_de_sucesso_das_varias_apis() {
        assert!(is_success_code(Some(&json!("00000"))));
        assert!(is_success_code(Some(&json!("200"))));
        assert!(is_success_code(Some(&json!("200000"))));
        assert!(is_success_code(Some(&json!(200))));
        assert!(!is_success_code(Some(&json!("500"))));
        assert!(!is_success_code(Some(&json!(null))));
        assert!(!is_success_code(None));
    }

    #[test]
    fn record_list_tolera_respostas_sem_lista() {
        assert!(record_list(&json!({})).is_empty());
        assert!(record_list(&json!({"data": {}})).is_empty());
        let resp = json!({"data": {"recordList": [{"id": 1}]}});
        assert_eq!(record_list(&resp).len(), 1);
    }

    #[test]
    fn operador_between_duplica_o_valor() {
        let filter = simple_filter("customer.name", "between", "C3770");
        assert_eq!(filter["value1"], json!("C3770"));
        assert_eq!(filter["value2"], json!("C3770"));

        let filter = simple_filter("customer.name", "like", "C3770");
        assert!(filter.get("value2").is_none());
    }
}
