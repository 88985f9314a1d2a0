// src/services/identity.rs

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::{
    common::AppError,
    config::Settings,
    crm::CrmGateway,
    models::{
        followup::{get_nested, scalar_to_string, FollowUpRecord},
        FilterInfo, MatchStrategy, Resolution, SearchMode,
    },
};

/// Campo usado na busca por telefone e no retry quando ela volta vazia.
const PHONE_SEARCH_FIELD: &str = "customer.name";
const PHONE_SEARCH_OPERATOR: &str = "like";

/// Códigos de cliente aparecem embutidos em nomes, ex: "C4021 偉業行".
static CODE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bC\d{2,}\b").expect("regex de código de cliente"));

/// Cache por requisição de (customer, org) -> código autoritativo.
/// Preserva a ordem de inserção para o diagnóstico; falhas cacheiam string
/// vazia para não repetir a consulta dentro da mesma requisição.
#[derive(Default)]
struct DetailCache {
    map: HashMap<(String, String), String>,
    order: Vec<(String, String)>,
}

impl DetailCache {
    fn get(&self, key: &(String, String)) -> Option<&String> {
        self.map.get(key)
    }

    fn insert(&mut self, key: (String, String), code: String) {
        if self.map.insert(key.clone(), code).is_none() {
            self.order.push(key);
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    /// Códigos não-vazios, únicos e ordenados.
    fn unique_codes(&self) -> Vec<String> {
        self.map
            .values()
            .filter(|code| !code.is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn examples(&self, limit: usize) -> Vec<Value> {
        self.order
            .iter()
            .take(limit)
            .map(|key| {
                json!({
                    "customer": key.0,
                    "org": key.1,
                    "code": self.map.get(key).cloned().unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Resolve um identificador ambíguo (código, código parcial ou telefone)
/// para o código autoritativo do cliente, filtrando o resultado de busca
/// difusa do CRM para registros de exatamente um cliente.
#[derive(Clone)]
pub struct IdentityService {
    gateway: Arc<dyn CrmGateway>,
    settings: Arc<Settings>,
}

impl IdentityService {
    pub fn new(gateway: Arc<dyn CrmGateway>, settings: Arc<Settings>) -> Self {
        Self { gateway, settings }
    }

    pub async fn resolve(
        &self,
        identifier: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Resolution, AppError> {
        let identifier = identifier.trim();
        let mode = SearchMode::classify(identifier);

        let (field, operator) = match mode {
            SearchMode::Phone => (Some(PHONE_SEARCH_FIELD), Some(PHONE_SEARCH_OPERATOR)),
            SearchMode::Code => (None, None),
        };
        let mut search = self
            .gateway
            .search_follow_ups(identifier, page, page_size, field, operator)
            .await?;

        let mut search_field = search.search_field.clone().or_else(|| match mode {
            SearchMode::Phone => Some(PHONE_SEARCH_FIELD.to_string()),
            SearchMode::Code => Some(self.settings.followup_customer_field.clone()),
        });
        let mut search_fallback = None;

        // Busca por telefone vazia: tenta uma única vez o campo reserva.
        if mode == SearchMode::Phone && search.records.is_empty() {
            let retry = self
                .gateway
                .search_follow_ups(
                    identifier,
                    page,
                    page_size,
                    Some(PHONE_SEARCH_FIELD),
                    Some(PHONE_SEARCH_OPERATOR),
                )
                .await?;
            if !retry.records.is_empty() {
                search = retry;
                search_field = Some(PHONE_SEARCH_FIELD.to_string());
                search_fallback = Some(PHONE_SEARCH_FIELD.to_string());
            }
        }

        let records = search.records;
        let expected = identifier.to_uppercase();

        let mut filter_info = FilterInfo::new(identifier, mode, search_field.clone());
        filter_info.search_fallback = search_fallback;
        filter_info.raw_count = records.len();

        // Códigos candidatos crus, só para diagnóstico.
        let mut raw_codes: BTreeSet<String> = BTreeSet::new();
        for record in &records {
            if let Some(candidate) = raw_candidate_code(record) {
                raw_codes.insert(candidate);
            }
            if filter_info.raw_examples.len() < 10 {
                filter_info.raw_examples.push(raw_example(record));
            }
        }
        filter_info.raw_unique_codes = raw_codes.into_iter().collect();

        let mut detail_cache = DetailCache::default();
        let mut detail_hits = 0usize;

        let mut resolved_code: Option<String> = None;
        let mut suggestions: Vec<String> = Vec::new();
        let mut strategy = MatchStrategy::Unresolved;
        let mut kept_records = records.clone();

        if !expected.is_empty() && !records.is_empty() {
            let mut exact_list: Vec<FollowUpRecord> = Vec::new();
            for record in &records {
                if self
                    .record_matches(record, &expected, &mut detail_cache, &mut detail_hits)
                    .await
                {
                    exact_list.push(record.clone());
                }
            }

            let detail_unique = detail_cache.unique_codes();

            if exact_list.is_empty() {
                let prefix_candidates: Vec<String> = detail_unique
                    .iter()
                    .filter(|code| code.starts_with(&expected))
                    .cloned()
                    .collect();

                if mode == SearchMode::Phone && !detail_unique.is_empty() {
                    // Telefone sem match exato: o primeiro código vindo do
                    // cadastro vence; os demais viram sugestões.
                    let chosen = detail_unique[0].clone();
                    exact_list = filter_by_detail_code(&records, &detail_cache, &chosen);
                    suggestions = detail_unique.clone();
                    resolved_code = Some(chosen);
                    strategy = MatchStrategy::PhoneDetailMatch;
                } else if !prefix_candidates.is_empty() {
                    let chosen = prefix_candidates[0].clone();
                    exact_list = filter_by_detail_code(&records, &detail_cache, &chosen);
                    suggestions = prefix_candidates;
                    resolved_code = Some(chosen);
                    strategy = MatchStrategy::DetailPrefixMatch;
                } else {
                    suggestions = detail_unique.clone();
                }
            }

            if !exact_list.is_empty() && resolved_code.is_none() {
                resolved_code = Some(expected.clone());
                strategy = MatchStrategy::ExactMatch;
            }

            tracing::debug!(
                "filtro exato manteve {} de {} registros para {}",
                exact_list.len(),
                records.len(),
                expected
            );

            // Mesmo vazio, o conjunto filtrado substitui o cru: melhor nenhum
            // registro do que registros de outro cliente.
            kept_records = exact_list;
        }

        filter_info.kept = kept_records.len();
        filter_info.detail_lookup_count = detail_cache.len();
        filter_info.detail_matches = detail_hits;
        filter_info.detail_unique_codes = detail_cache.unique_codes();
        filter_info.detail_examples = detail_cache.examples(10);
        filter_info.resolved_code = resolved_code.clone();
        filter_info.suggested_codes = suggestions.clone();
        filter_info.strategy = strategy;

        Ok(Resolution {
            resolved_code,
            search_mode: mode,
            search_field,
            suggestions,
            strategy,
            records: kept_records,
            filter_info,
        })
    }

    /// O registro pertence ao código esperado? Tenta os campos baratos na
    /// ordem e só consulta o cadastro (rede) como último recurso.
    async fn record_matches(
        &self,
        record: &FollowUpRecord,
        expected: &str,
        cache: &mut DetailCache,
        detail_hits: &mut usize,
    ) -> bool {
        // Campos planos mais comuns
        for key in ["customer_code", "customerCode"] {
            if let Some(value) = record.0.get(key) {
                let value = scalar_to_string(value).to_uppercase();
                if !value.is_empty() && value == expected {
                    return true;
                }
            }
        }

        // Alguns payloads põem o código direto em `customer` (os ids são
        // normalmente numéricos, então exigimos pelo menos uma letra).
        if let Some(Value::String(customer)) = record.customer_raw() {
            let value = customer.trim().to_uppercase();
            if !value.is_empty() && is_code_like(&value) && value == expected {
                return true;
            }
        }

        // Estrutura aninhada (raro)
        if let Some(Value::String(nested)) = record.get("customer.code") {
            if nested.trim().to_uppercase() == expected {
                return true;
            }
        }

        // Código embutido no nome, ex: "C4021 偉業行貿易公司"
        for key in ["customer_name", "customer.name", "customerName"] {
            let name = if key.contains('.') {
                get_nested(&record.0, key)
            } else {
                record.0.get(key)
            };
            if let Some(Value::String(name)) = name {
                if !name.is_empty() {
                    let upper = name.to_uppercase();
                    if let Some(token) = CODE_TOKEN_RE.find(&upper) {
                        if token.as_str() == expected {
                            return true;
                        }
                    }
                }
            }
        }

        // Último recurso: cadastro do cliente pela referência interna.
        if let Some(code) = self.detail_code(record, cache).await {
            if !code.is_empty() && code == expected {
                *detail_hits += 1;
                return true;
            }
        }
        false
    }

    /// Código autoritativo do cadastro, memoizado por requisição.
    async fn detail_code(&self, record: &FollowUpRecord, cache: &mut DetailCache) -> Option<String> {
        let customer_id = record.customer_ref()?;
        let org_id = record.org_ref().unwrap_or_default();
        let key = (customer_id, org_id);

        if let Some(code) = cache.get(&key) {
            return Some(code.clone());
        }

        let code = if key.1.is_empty() {
            // Sem org não há consulta de cadastro.
            String::new()
        } else {
            match self.gateway.customer_detail(&key.0, &key.1).await {
                Ok(detail) => detail
                    .get("code")
                    .map(scalar_to_string)
                    .unwrap_or_default()
                    .to_uppercase(),
                Err(err) => {
                    tracing::debug!(
                        "consulta de cadastro falhou para {}/{}: {}",
                        key.0,
                        key.1,
                        err
                    );
                    String::new()
                }
            }
        };
        cache.insert(key, code.clone());
        Some(code)
    }
}

fn is_code_like(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

/// Código candidato de um registro cru: campos planos, depois o caminho
/// aninhado, depois a referência — esta só quando parece um código (tem
/// letra), nunca uma referência puramente numérica.
fn raw_candidate_code(record: &FollowUpRecord) -> Option<String> {
    for key in ["customer_code", "customerCode"] {
        if let Some(value) = record.0.get(key) {
            let value = scalar_to_string(value).to_uppercase();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    if let Some(Value::String(nested)) = record.get("customer.code") {
        let value = nested.trim().to_uppercase();
        if !value.is_empty() {
            return Some(value);
        }
    }
    if let Some(Value::String(customer)) = record.customer_raw() {
        let value = customer.trim().to_uppercase();
        if !value.is_empty() && is_code_like(&value) {
            return Some(value);
        }
    }
    None
}

fn raw_example(record: &FollowUpRecord) -> Value {
    json!({
        "customer_code": raw_candidate_code(record),
        "customer": record.customer_raw(),
        "customer_name": record.customer_name(),
        "ower_name": record.0.get("ower_name"),
        "followTime": record.follow_time(),
    })
}

/// Mantém só os registros cujo código derivado do cadastro é o escolhido.
fn filter_by_detail_code(
    records: &[FollowUpRecord],
    cache: &DetailCache,
    chosen: &str,
) -> Vec<FollowUpRecord> {
    records
        .iter()
        .filter(|record| {
            let Some(customer_id) = record.customer_ref() else {
                return false;
            };
            let org_id = record.org_ref().unwrap_or_default();
            cache
                .get(&(customer_id, org_id))
                .is_some_and(|code| code == chosen)
        })
        .cloned()
        .collect()
}
