// src/services/records.rs

use std::sync::Arc;

use serde_json::Value;

use crate::{
    common::AppError,
    config::Settings,
    crm::CrmGateway,
    models::{followup::FollowUpRecord, AttachmentFile, ServiceRecord},
    services::dates::{parse_follow_field, shift_date, to_iso},
};

/// Tokens que o CRM usa como "vazio" em slots de foto.
const EMPTY_TOKENS: [&str; 2] = ["none", "null"];

/// Transforma os registros já resolvidos em registros de serviço: filtra
/// pela equipe de manutenção, deriva as datas, resolve os anexos e separa
/// fotos de documentos.
#[derive(Clone)]
pub struct RecordService {
    gateway: Arc<dyn CrmGateway>,
    settings: Arc<Settings>,
}

impl RecordService {
    pub fn new(gateway: Arc<dyn CrmGateway>, settings: Arc<Settings>) -> Self {
        Self { gateway, settings }
    }

    pub async fn build_records(
        &self,
        records: &[FollowUpRecord],
    ) -> Result<Vec<ServiceRecord>, AppError> {
        let offset_days = self.settings.maintenance_next_date_offset_days;
        let mut output: Vec<ServiceRecord> = Vec::new();

        for record in records {
            // Só interessam os registros da equipe de manutenção.
            if !record
                .owner_name()
                .contains(&self.settings.maintenance_marker)
            {
                continue;
            }

            let followup_id = record.id(&self.settings.followup_id_field);

            let service_value = record
                .get(&self.settings.followup_service_date_field)
                .or_else(|| record.follow_time());
            let next_value = record
                .get(&self.settings.followup_next_service_date_field)
                .or_else(|| record.next_follow_time());

            let service_date = parse_follow_field(service_value)
                .or_else(|| parse_follow_field(record.follow_time()));
            let mut next_date = parse_follow_field(next_value);
            if offset_days != 0 {
                next_date = next_date.map(|date| shift_date(date, offset_days));
            }

            let photo_ids = collect_photo_ids(record);
            tracing::debug!(
                "acompanhamento {} tem {} candidatos a foto",
                followup_id,
                photo_ids.len()
            );

            let files = if photo_ids.is_empty() {
                Vec::new()
            } else {
                let data = match self.gateway.query_files(&photo_ids).await {
                    Ok(data) => data,
                    Err(err) => {
                        tracing::warn!(
                            "consulta de anexos falhou para o acompanhamento {}: {}",
                            followup_id,
                            err
                        );
                        Value::Null
                    }
                };
                self.extract_query_files(&data, &photo_ids).await
            };

            let (photos, documents): (Vec<_>, Vec<_>) =
                files.iter().cloned().partition(AttachmentFile::is_image);

            // Acompanhamento sem foto é considerado incompleto aqui.
            if photos.is_empty() {
                continue;
            }

            output.push(ServiceRecord {
                followup_id,
                service_date: iso_or_raw(service_date.map(to_iso), service_value),
                next_service_date: iso_or_raw(next_date.map(to_iso), next_value),
                raw: record.0.clone(),
                files,
                photos,
                documents,
            });
        }

        // A API devolve um único registro representativo, não o histórico
        // inteiro: fica o primeiro (na ordem de entrada) que tem fotos.
        output.truncate(1);
        Ok(output)
    }

    /// Achata a resposta da consulta em lote: lista plana ou mapa chaveado
    /// pelos ids pedidos. Sem URL embutida, tenta o endpoint de download
    /// quando ele está configurado.
    async fn extract_query_files(&self, data: &Value, requested: &[String]) -> Vec<AttachmentFile> {
        let mut entries: Vec<&Value> = Vec::new();
        match data {
            Value::Array(items) => entries.extend(items.iter().filter(|v| v.is_object())),
            Value::Object(map) => {
                for id in requested {
                    if let Some(Value::Array(items)) = map.get(id) {
                        entries.extend(items.iter().filter(|v| v.is_object()));
                    }
                }
            }
            _ => {}
        }

        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut file_url = embedded_url(entry);
            if file_url.is_none() && self.settings.file_download_path.is_some() {
                if let Some(file_id) = entry
                    .get("fileId")
                    .or_else(|| entry.get("id"))
                    .map(crate::models::followup::scalar_to_string)
                    .filter(|id| !id.is_empty())
                {
                    match self.gateway.file_download_url(&file_id).await {
                        Ok(url) => file_url = Some(url),
                        Err(err) => {
                            tracing::debug!("fallback de URL falhou para {}: {}", file_id, err);
                        }
                    }
                }
            }
            files.push(AttachmentFile::from_entry(entry, file_url));
        }
        files
    }
}

fn embedded_url(entry: &Value) -> Option<String> {
    for key in ["signedUrl", "fileUrl", "url", "filePath"] {
        if let Some(url) = entry.get(key).and_then(Value::as_str) {
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }
    }
    None
}

fn iso_or_raw(iso: Option<String>, raw: Option<&Value>) -> Value {
    match iso {
        Some(text) => Value::String(text),
        None => raw.cloned().unwrap_or(Value::Null),
    }
}

/// Ids de anexo dos slots `picture1`..`picture5`, deduplicados na ordem.
pub(crate) fn collect_photo_ids(record: &FollowUpRecord) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for value in record.picture_slots() {
        // Só escalares: lista/objeto no slot é lixo de formulário.
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if text.is_empty() || EMPTY_TOKENS.contains(&text.to_lowercase().as_str()) {
            continue;
        }
        if !looks_like_attachment_id(&text) {
            continue;
        }
        if !seen.contains(&text) {
            seen.push(text);
        }
    }
    seen
}

/// Id de anexo plausível: pelo menos 8 caracteres, só hex e hífen.
pub(crate) fn looks_like_attachment_id(text: &str) -> bool {
    text.len() >= 8 && text.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::gateway::testing::MockGateway;
    use serde_json::json;

    fn service(gateway: MockGateway) -> RecordService {
        RecordService::new(Arc::new(gateway), Arc::new(Settings::test_defaults()))
    }

    fn maintenance_record(id: u64, picture: &str) -> Value {
        json!({
            "id": id,
            "ower_name": "維修幫阿明",
            "followTime": "2024-05-01 10:00:00",
            "picture1": picture,
        })
    }

    #[test]
    fn aceitacao_de_id_de_anexo() {
        assert!(looks_like_attachment_id("6565cf9f-1aaa-4b52-490a-995d"));
        assert!(looks_like_attachment_id("deadbeef"));
        assert!(!looks_like_attachment_id("short"));
        assert!(!looks_like_attachment_id("nao-hexa-zzzz"));
        assert!(!looks_like_attachment_id(""));
    }

    #[test]
    fn coleta_ignora_tokens_vazios_e_nao_escalares() {
        let record = FollowUpRecord(json!({
            "picture1": "6565cf9f-1aaa-4b52-490a-995d",
            "picture2": "none",
            "picture3": [1, 2],
            "picture4": "",
            "picture5": "6565cf9f-1aaa-4b52-490a-995d",
        }));
        assert_eq!(
            collect_photo_ids(&record),
            vec!["6565cf9f-1aaa-4b52-490a-995d".to_string()]
        );
    }

    #[test]
    fn coleta_preserva_ordem_de_primeira_ocorrencia() {
        let record = FollowUpRecord(json!({
            "picture1": "bbbbbbbb",
            "picture2": "aaaaaaaa",
            "picture3": "bbbbbbbb",
        }));
        assert_eq!(
            collect_photo_ids(&record),
            vec!["bbbbbbbb".to_string(), "aaaaaaaa".to_string()]
        );
    }

    #[tokio::test]
    async fn descarta_registro_de_outra_equipe() {
        let records = vec![FollowUpRecord(json!({
            "id": 1,
            "ower_name": "銷售部小陳",
            "followTime": "2024-05-01",
            "picture1": "6565cf9f-1aaa-4b52-490a-995d",
        }))];
        let gateway = MockGateway {
            files: json!([{"fileId": "6565cf9f-1aaa-4b52-490a-995d", "fileName": "a.jpg", "url": "http://x/a.jpg"}]),
            ..Default::default()
        };

        let out = service(gateway).build_records(&records).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn descarta_registro_sem_foto_e_mantem_so_o_primeiro() {
        let records = vec![
            FollowUpRecord(maintenance_record(1, "not-an-id!")),
            FollowUpRecord(maintenance_record(2, "6565cf9f-1aaa-4b52-490a-995d")),
            FollowUpRecord(maintenance_record(3, "6565cf9f-1aaa-4b52-490a-995d")),
        ];
        let gateway = MockGateway {
            files: json!([{
                "fileId": "6565cf9f-1aaa-4b52-490a-995d",
                "fileName": "antes.jpg",
                "signedUrl": "http://x/antes.jpg",
            }]),
            ..Default::default()
        };

        let out = service(gateway).build_records(&records).await.unwrap();

        // O registro 1 não tem id de anexo válido; dos restantes fica só o
        // primeiro.
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].followup_id, "2");
        assert_eq!(out[0].photos.len(), 1);
        assert_eq!(
            out[0].photos[0].file_url.as_deref(),
            Some("http://x/antes.jpg")
        );
    }

    #[tokio::test]
    async fn resposta_em_mapa_segue_a_ordem_dos_ids_pedidos() {
        let records = vec![FollowUpRecord(json!({
            "id": 5,
            "ower_name": "維修幫",
            "followTime": "2024-05-01",
            "picture1": "bbbbbbbb",
            "picture2": "aaaaaaaa",
        }))];
        let gateway = MockGateway {
            files: json!({
                "aaaaaaaa": [{"fileId": "aaaaaaaa", "fileName": "2.png", "url": "http://x/2.png"}],
                "bbbbbbbb": [{"fileId": "bbbbbbbb", "fileName": "1.png", "url": "http://x/1.png"}],
            }),
            ..Default::default()
        };

        let out = service(gateway).build_records(&records).await.unwrap();

        assert_eq!(out.len(), 1);
        let names: Vec<_> = out[0]
            .files
            .iter()
            .filter_map(|f| f.file_name.as_deref())
            .collect();
        assert_eq!(names, vec!["1.png", "2.png"]);
    }

    #[tokio::test]
    async fn falha_na_consulta_de_anexos_degrada_para_sem_arquivos() {
        // query_files devolve Null (o serviço trata erro como Null);
        // sem fotos, o registro é descartado, sem abortar a requisição.
        let records = vec![FollowUpRecord(maintenance_record(
            1,
            "6565cf9f-1aaa-4b52-490a-995d",
        ))];
        let gateway = MockGateway {
            files: Value::Null,
            ..Default::default()
        };

        let out = service(gateway).build_records(&records).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn sem_url_embutida_usa_o_endpoint_de_download() {
        let mut settings = Settings::test_defaults();
        settings.file_download_path = Some("/yonbip/file/download".to_string());
        let mut download_urls = std::collections::HashMap::new();
        download_urls.insert(
            "6565cf9f-1aaa-4b52-490a-995d".to_string(),
            "http://files/assinada.jpg".to_string(),
        );
        let gateway = MockGateway {
            files: json!([{
                "fileId": "6565cf9f-1aaa-4b52-490a-995d",
                "fileName": "assinada.jpg",
            }]),
            download_urls,
            ..Default::default()
        };
        let service = RecordService::new(Arc::new(gateway), Arc::new(settings));

        let records = vec![FollowUpRecord(maintenance_record(
            1,
            "6565cf9f-1aaa-4b52-490a-995d",
        ))];
        let out = service.build_records(&records).await.unwrap();

        assert_eq!(
            out[0].photos[0].file_url.as_deref(),
            Some("http://files/assinada.jpg")
        );
    }

    #[tokio::test]
    async fn datas_derivadas_preferem_o_campo_configurado() {
        let records = vec![FollowUpRecord(json!({
            "id": 7,
            "ower_name": "維修幫",
            "followUpTime": "2024/04/30 09:00",
            "followTime": "2024-05-02",
            "nextFollowUpTime": "2024-06-01T08:00:00",
            "picture1": "6565cf9f-1aaa-4b52-490a-995d",
        }))];
        let gateway = MockGateway {
            files: json!([{"fileId": "x", "fileName": "f.jpg", "url": "u"}]),
            ..Default::default()
        };

        let out = service(gateway).build_records(&records).await.unwrap();

        // O campo configurado é followUpTime; a hora e as barras são toleradas.
        assert_eq!(out[0].service_date, json!("2024-04-30"));
        assert_eq!(out[0].next_service_date, json!("2024-06-01"));
    }

    #[tokio::test]
    async fn offset_desloca_a_proxima_data_uma_unica_vez() {
        let mut settings = Settings::test_defaults();
        settings.maintenance_next_date_offset_days = 14;
        let gateway = MockGateway {
            files: json!([{"fileId": "x", "fileName": "f.jpg", "url": "u"}]),
            ..Default::default()
        };
        let service = RecordService::new(Arc::new(gateway), Arc::new(settings));

        let records = vec![FollowUpRecord(json!({
            "id": 8,
            "ower_name": "維修幫",
            "followTime": "2024-05-01",
            "nextFollowUpTime": "2024-06-01",
            "picture1": "6565cf9f-1aaa-4b52-490a-995d",
        }))];

        let out = service.build_records(&records).await.unwrap();
        assert_eq!(out[0].next_service_date, json!("2024-06-15"));
    }
}
