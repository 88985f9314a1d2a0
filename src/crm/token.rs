// src/crm/token.rs

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::Mutex;

use crate::{common::AppError, config::Settings};

type HmacSha256 = Hmac<Sha256>;

/// Validade declarada pelo servidor quando o campo `expire` não vem.
const DEFAULT_EXPIRE_SECONDS: u64 = 7200;
/// Margem de segurança descontada da validade, e também o piso mínimo.
const EXPIRY_MARGIN_SECONDS: u64 = 60;

/// Assinatura exigida pelo endpoint de token:
/// base64(HMAC-SHA256(secret, "appKey" + appKey + "timestamp" + timestamp)).
pub fn build_signature(app_key: &str, timestamp: &str, secret: &str) -> String {
    let to_sign = format!("appKey{app_key}timestamp{timestamp}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC aceita chave de qualquer tamanho");
    mac.update(to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Token já emitido pelo CRM, com a validade declarada em segundos.
#[derive(Debug, Clone)]
pub struct FetchedToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// Quem sabe buscar um token novo. Separado em trait para que o cache
/// possa ser exercitado sem rede.
#[async_trait]
pub trait AccessTokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<FetchedToken, AppError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Cache de token compartilhado entre requisições.
///
/// Um único mutex cobre tanto a leitura rápida quanto o refresh: enquanto um
/// caller busca um token novo, os demais aguardam e recebem o mesmo valor —
/// nunca um cache pela metade, nunca duas buscas simultâneas.
pub struct TokenService {
    fetcher: Arc<dyn AccessTokenFetcher>,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenService {
    pub fn new(fetcher: Arc<dyn AccessTokenFetcher>) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(None),
        }
    }

    pub async fn get_token(&self, force_refresh: bool) -> Result<String, AppError> {
        let mut cache = self.cache.lock().await;

        if !force_refresh {
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let fetched = self.fetcher.fetch().await?;
        let ttl = fetched
            .expires_in
            .saturating_sub(EXPIRY_MARGIN_SECONDS)
            .max(EXPIRY_MARGIN_SECONDS);
        *cache = Some(CachedToken {
            token: fetched.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });

        Ok(fetched.access_token)
    }
}

/// Busca real contra o endpoint de autenticação do YonBIP.
pub struct HttpTokenFetcher {
    client: reqwest::Client,
    settings: Arc<Settings>,
}

impl HttpTokenFetcher {
    pub fn new(settings: Arc<Settings>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl AccessTokenFetcher for HttpTokenFetcher {
    async fn fetch(&self) -> Result<FetchedToken, AppError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = build_signature(&self.settings.app_key, &timestamp, &self.settings.app_secret);

        let url = format!(
            "{}{}",
            self.settings.token_url.trim_end_matches('/'),
            self.settings.self_app_token_path
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("appKey", self.settings.app_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::TokenRejected(format!("HTTP {status}: {detail}")));
        }

        let data: Value = response.json().await?;
        if data.get("code").and_then(Value::as_str) != Some("00000") {
            return Err(AppError::TokenRejected(data.to_string()));
        }

        let token_data = data.get("data").cloned().unwrap_or_default();
        let access_token = token_data
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::TokenRejected("access_token ausente na resposta".to_string()))?;

        let expires_in = match token_data.get("expire") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_EXPIRE_SECONDS),
            Some(Value::String(s)) => s.parse().unwrap_or(DEFAULT_EXPIRE_SECONDS),
            _ => DEFAULT_EXPIRE_SECONDS,
        };

        Ok(FetchedToken {
            access_token,
            expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        expires_in: u64,
    }

    impl CountingFetcher {
        fn new(expires_in: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in,
            }
        }
    }

    #[async_trait]
    impl AccessTokenFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<FetchedToken, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Simula a latência da rede para dar chance de corrida.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(FetchedToken {
                access_token: format!("token-{call}"),
                expires_in: self.expires_in,
            })
        }
    }

    #[test]
    fn assinatura_bate_com_o_vetor_de_referencia() {
        // Vetor gerado com a implementação oficial (hmac/sha256 + base64).
        assert_eq!(
            build_signature("chave", "123", "segredo"),
            "hVTQBtEeL9RD4k9Y+jB/TBu3eg4vMSn+36ykNC1iB0s="
        );
    }

    #[test]
    fn assinatura_muda_com_o_timestamp() {
        let a = build_signature("chave", "123", "segredo");
        let b = build_signature("chave", "124", "segredo");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn chamadas_concorrentes_disparam_uma_unica_busca() {
        let fetcher = Arc::new(CountingFetcher::new(7200));
        let service = Arc::new(TokenService::new(fetcher.clone()));

        let (a, b) = tokio::join!(
            {
                let service = service.clone();
                async move { service.get_token(false).await }
            },
            {
                let service = service.clone();
                async move { service.get_token(false).await }
            }
        );

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), "token-1");
        assert_eq!(b.unwrap(), "token-1");
    }

    #[tokio::test]
    async fn validade_curta_ainda_garante_piso_de_60_segundos() {
        // expire = 0 viraria expiração imediata sem o piso; com ele, a
        // segunda chamada ainda encontra o cache válido.
        let fetcher = Arc::new(CountingFetcher::new(0));
        let service = TokenService::new(fetcher.clone());

        let first = service.get_token(false).await.unwrap();
        let second = service.get_token(false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_ignora_o_cache() {
        let fetcher = Arc::new(CountingFetcher::new(7200));
        let service = TokenService::new(fetcher.clone());

        let first = service.get_token(false).await.unwrap();
        let second = service.get_token(true).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_ne!(first, second);
    }
}
