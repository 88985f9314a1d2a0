// src/services/profile.rs

use std::sync::Arc;

use serde_json::Value;

use crate::{
    common::AppError,
    config::Settings,
    crm::CrmGateway,
    models::{followup::FollowUpRecord, ContactInfo, MemberProfile},
};

/// Monta o perfil de membro: último serviço, anterior, endereço e contato,
/// tudo derivado do acompanhamento mais recente + cadastro do cliente.
#[derive(Clone)]
pub struct ProfileService {
    gateway: Arc<dyn CrmGateway>,
    settings: Arc<Settings>,
}

impl ProfileService {
    pub fn new(gateway: Arc<dyn CrmGateway>, settings: Arc<Settings>) -> Self {
        Self { gateway, settings }
    }

    pub async fn build(&self, identifier: &str) -> Result<MemberProfile, AppError> {
        let search = self
            .gateway
            .search_follow_ups(identifier, 1, self.settings.default_page_size, None, None)
            .await?;

        let maintenance: Vec<&FollowUpRecord> = search
            .records
            .iter()
            .filter(|record| {
                record
                    .owner_name()
                    .contains(&self.settings.maintenance_marker)
            })
            .collect();

        // Preferimos o histórico da manutenção; sem ele, qualquer registro.
        let mut candidates: Vec<&FollowUpRecord> = if maintenance.is_empty() {
            search.records.iter().collect()
        } else {
            maintenance
        };
        if candidates.is_empty() {
            return Err(AppError::MemberNotFound);
        }

        // Ordena pela string de followTime mesmo: o formato do CRM
        // (YYYY-MM-DD HH:MM:SS) ordena lexicograficamente.
        candidates.sort_by(|a, b| follow_time_key(b).cmp(&follow_time_key(a)));

        let latest = candidates[0];
        let previous = candidates.get(1).copied();

        let customer_id = latest.customer_ref().unwrap_or_default();
        let org_id = latest.org_ref().unwrap_or_default();

        let mut detail_data = Value::Null;
        let mut addresses: Vec<Value> = Vec::new();
        if !customer_id.is_empty() && !org_id.is_empty() {
            detail_data = self.gateway.customer_detail(&customer_id, &org_id).await?;
            addresses = detail_data
                .get("merchantAddressInfos")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if addresses.is_empty() {
                if let Some(code) = detail_data.get("code").and_then(Value::as_str) {
                    if !code.is_empty() {
                        match self.gateway.addresses_by_codes(&[code.to_string()]).await {
                            Ok(found) => addresses = found,
                            Err(err) => {
                                tracing::warn!(
                                    "consulta de endereços falhou para {}: {}",
                                    code,
                                    err
                                );
                            }
                        }
                    }
                }
            }
        }

        let selected_address = addresses
            .iter()
            .find(|address| address.get("isDefault").is_some_and(is_truthy))
            .or_else(|| addresses.first());

        let (address_text, contact_name, contact_phone) = match selected_address {
            Some(address) => (
                text_field(address, &["mergerName", "address", "addressInfo"]),
                text_field(address, &["receiver"]),
                text_field(address, &["mobile", "telePhone"]),
            ),
            None => (None, None, None),
        };

        let customer_name = detail_data
            .get("name")
            .and_then(|name| name.get("zh_CN"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| {
                detail_data
                    .get("enterpriseName")
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
            .or_else(|| latest.customer_name().map(str::to_string));

        Ok(MemberProfile {
            keyword: identifier.to_string(),
            customer_code: detail_data
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string),
            customer_name,
            latest_service_date: format_follow_date(Some(latest)),
            previous_service_date: format_follow_date(previous),
            address: address_text,
            contact: ContactInfo {
                name: contact_name,
                phone: contact_phone,
            },
            points: None,
        })
    }
}

fn follow_time_key(record: &FollowUpRecord) -> String {
    record
        .0
        .get("followTime")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Data do serviço como o frontend espera: o prefixo de `followTime` antes
/// do primeiro espaço.
fn format_follow_date(record: Option<&FollowUpRecord>) -> Option<String> {
    let value = follow_time_key(record?);
    if value.is_empty() {
        return None;
    }
    Some(value.split(' ').next().unwrap_or(&value).to_string())
}

fn text_field(source: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(text) = source.get(key).and_then(Value::as_str) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Verdade "pythonica" do CRM: true, número diferente de zero ou string
/// não-vazia (o campo isDefault vem em qualquer um desses formatos).
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && s.to_lowercase() != "false",
        _ => false,
    }
}
