// src/config.rs

use std::{env, sync::Arc};

use crate::{
    crm::{CrmGateway, HttpCrmGateway, HttpTokenFetcher, TokenService},
    services::{
        identity::IdentityService, profile::ProfileService, records::RecordService,
        schedule::ScheduleService,
    },
};

/// Configuração da integração com o CRM, carregada do ambiente.
/// Os defaults seguem a instalação YonBIP padrão; só as credenciais são
/// obrigatórias.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    // Credenciais e endereços do OpenAPI
    pub app_key: String,
    pub app_secret: String,
    pub token_url: String,
    pub gateway_url: String,

    // Caminhos relativos das APIs
    pub self_app_token_path: String,
    pub followup_list_path: String,
    pub followup_save_path: String,
    pub followup_query_files_path: String,
    pub customer_detail_path: String,
    pub customer_address_list_path: String,
    pub file_download_path: Option<String>,
    pub task_list_path: Option<String>,

    // Mapeamento de campos dos registros de acompanhamento
    pub followup_id_field: String,
    pub followup_service_date_field: String,
    pub followup_next_service_date_field: String,
    pub followup_customer_field: String,
    pub followup_customer_operator: String,
    pub followup_customer_field_fallbacks: Vec<String>,

    // Busca de tarefas
    pub task_customer_field: String,
    pub task_customer_operator: String,

    // Inferência do cronograma de manutenção
    pub maintenance_marker: String,
    pub maintenance_task_owner_keyword: Option<String>,
    pub maintenance_next_date_offset_days: i64,
    pub maintenance_task_max_gap_days: Option<i64>,

    // Paginação padrão
    pub default_page_size: u32,
    pub default_task_page_size: u32,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 5000),

            app_key: env::var("APP_KEY").expect("APP_KEY deve ser definida"),
            app_secret: env::var("APP_SECRET").expect("APP_SECRET deve ser definida"),
            token_url: env_or("TOKEN_URL", "https://c2.yonyoucloud.com/iuap-api-auth"),
            gateway_url: env_or("GATEWAY_URL", "https://c2.yonyoucloud.com/iuap-api-gateway"),

            self_app_token_path: env_or(
                "SELF_APP_TOKEN_PATH",
                "/open-auth/selfAppAuth/base/v1/getAccessToken",
            ),
            followup_list_path: env_or("FOLLOWUP_LIST_PATH", "/yonbip/crm/followup/list"),
            followup_save_path: env_or("FOLLOWUP_SAVE_PATH", "/yonbip/crm/bill/followupsave"),
            followup_query_files_path: env_or(
                "FOLLOWUP_QUERY_FILES_PATH",
                "/yonbip/crm/rest/v1/openapi/queryBusinessFiles_followrecord",
            ),
            customer_detail_path: env_or("CUSTOMER_DETAIL_PATH", "/yonbip/crm/customer/getbyid"),
            customer_address_list_path: env_or(
                "CUSTOMER_ADDRESS_LIST_PATH",
                "/yonbip/digitalModel/merchant/listaddressbycodelist",
            ),
            file_download_path: env_opt("FILE_DOWNLOAD_PATH"),
            task_list_path: env_opt("TASK_LIST_PATH")
                .or_else(|| Some("/yonbip/crm/task/list".to_string())),

            followup_id_field: env_or("FOLLOWUP_ID_FIELD", "id"),
            followup_service_date_field: env_or("FOLLOWUP_SERVICE_DATE_FIELD", "followUpTime"),
            followup_next_service_date_field: env_or(
                "FOLLOWUP_NEXT_SERVICE_DATE_FIELD",
                "nextFollowUpTime",
            ),
            // A API de listagem exige consulta por xxx.name ou xxx.code
            followup_customer_field: env_or("FOLLOWUP_CUSTOMER_FIELD", "customer.name"),
            followup_customer_operator: env_or("FOLLOWUP_CUSTOMER_OPERATOR", "like"),
            followup_customer_field_fallbacks: env_list("FOLLOWUP_CUSTOMER_FIELD_FALLBACKS"),

            task_customer_field: env_or("TASK_CUSTOMER_FIELD", "customer.name"),
            task_customer_operator: env_or("TASK_CUSTOMER_OPERATOR", "like"),

            maintenance_marker: env_or("MAINTENANCE_MARKER", "維修幫"),
            maintenance_task_owner_keyword: env_opt("MAINTENANCE_TASK_OWNER_KEYWORD"),
            maintenance_next_date_offset_days: env_parse("MAINTENANCE_NEXT_DATE_OFFSET_DAYS", 0),
            maintenance_task_max_gap_days: env_opt("MAINTENANCE_TASK_MAX_GAP_DAYS")
                .and_then(|v| v.parse().ok()),

            default_page_size: env_parse("DEFAULT_PAGE_SIZE", 20),
            default_task_page_size: env_parse("DEFAULT_TASK_PAGE_SIZE", 50),
        }
    }

    #[cfg(test)]
    pub(crate) fn test_defaults() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            app_key: "chave".to_string(),
            app_secret: "segredo".to_string(),
            token_url: "https://crm.example/iuap-api-auth".to_string(),
            gateway_url: "https://crm.example/iuap-api-gateway".to_string(),
            self_app_token_path: "/open-auth/selfAppAuth/base/v1/getAccessToken".to_string(),
            followup_list_path: "/yonbip/crm/followup/list".to_string(),
            followup_save_path: "/yonbip/crm/bill/followupsave".to_string(),
            followup_query_files_path:
                "/yonbip/crm/rest/v1/openapi/queryBusinessFiles_followrecord".to_string(),
            customer_detail_path: "/yonbip/crm/customer/getbyid".to_string(),
            customer_address_list_path: "/yonbip/digitalModel/merchant/listaddressbycodelist"
                .to_string(),
            file_download_path: None,
            task_list_path: Some("/yonbip/crm/task/list".to_string()),
            followup_id_field: "id".to_string(),
            followup_service_date_field: "followUpTime".to_string(),
            followup_next_service_date_field: "nextFollowUpTime".to_string(),
            followup_customer_field: "customer.name".to_string(),
            followup_customer_operator: "like".to_string(),
            followup_customer_field_fallbacks: Vec::new(),
            task_customer_field: "customer.name".to_string(),
            task_customer_operator: "like".to_string(),
            maintenance_marker: "維修幫".to_string(),
            maintenance_task_owner_keyword: Some("維修幫".to_string()),
            maintenance_next_date_offset_days: 0,
            maintenance_task_max_gap_days: None,
            default_page_size: 20,
            default_task_page_size: 50,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_list(key: &str) -> Vec<String> {
    env_opt(key)
        .map(|v| {
            v.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub token_service: Arc<TokenService>,
    pub crm_gateway: Arc<dyn CrmGateway>,
    pub identity_service: IdentityService,
    pub record_service: RecordService,
    pub schedule_service: ScheduleService,
    pub profile_service: ProfileService,
}

impl AppState {
    pub fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Arc::new(Settings::from_env());

        let fetcher = Arc::new(HttpTokenFetcher::new(settings.clone())?);
        let token_service = Arc::new(TokenService::new(fetcher));
        let gateway: Arc<dyn CrmGateway> =
            Arc::new(HttpCrmGateway::new(settings.clone(), token_service.clone())?);

        tracing::info!("✅ Gateway CRM configurado para {}", settings.gateway_url);

        Ok(Self::with_gateway(settings, gateway, token_service))
    }

    /// Monta o gráfico de dependências a partir de um gateway já construído.
    /// Os testes usam este construtor com um gateway falso.
    pub fn with_gateway(
        settings: Arc<Settings>,
        gateway: Arc<dyn CrmGateway>,
        token_service: Arc<TokenService>,
    ) -> Self {
        let identity_service = IdentityService::new(gateway.clone(), settings.clone());
        let record_service = RecordService::new(gateway.clone(), settings.clone());
        let schedule_service = ScheduleService::new(settings.clone());
        let profile_service = ProfileService::new(gateway.clone(), settings.clone());

        Self {
            settings,
            token_service,
            crm_gateway: gateway,
            identity_service,
            record_service,
            schedule_service,
            profile_service,
        }
    }
}
