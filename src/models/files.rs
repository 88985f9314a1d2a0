// src/models/files.rs

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Sufixos que classificam um anexo como foto.
const IMAGE_SUFFIXES: [&str; 7] = [
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".heic",
];

/// Anexo resolvido via consulta em lote de arquivos do CRM.
/// Efêmero: recalculado a cada requisição.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentFile {
    // O CRM ora devolve o id como string, ora como número.
    #[schema(value_type = Option<Object>)]
    pub file_id: Option<Value>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub file_size: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub upload_time: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub file_type: Option<Value>,
    #[schema(example = ".jpg")]
    pub file_extension: String,
    #[schema(value_type = Object)]
    pub raw: Value,
}

impl AttachmentFile {
    /// Monta a entrada a partir de um item da resposta de `queryFiles`.
    pub fn from_entry(entry: &Value, file_url: Option<String>) -> Self {
        Self {
            file_id: entry
                .get("fileId")
                .or_else(|| entry.get("id"))
                .filter(|v| !v.is_null())
                .cloned(),
            file_name: file_name(entry).map(str::to_string),
            file_url,
            file_size: entry.get("fileSize").filter(|v| !v.is_null()).cloned(),
            upload_time: entry.get("uploadTime").filter(|v| !v.is_null()).cloned(),
            file_type: entry.get("fileType").filter(|v| !v.is_null()).cloned(),
            file_extension: guess_extension(entry),
            raw: entry.clone(),
        }
    }

    /// Foto se a extensão OU o nome terminam em um dos sufixos de imagem.
    pub fn is_image(&self) -> bool {
        let extension = self.file_extension.to_lowercase();
        let name = self
            .file_name
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        [extension.as_str(), name.as_str()]
            .iter()
            .any(|candidate| IMAGE_SUFFIXES.iter().any(|suffix| candidate.ends_with(suffix)))
    }
}

fn file_name(entry: &Value) -> Option<&str> {
    entry
        .get("fileName")
        .and_then(Value::as_str)
        .or_else(|| entry.get("name").and_then(Value::as_str))
}

/// Extensão declarada pelo CRM, senão o sufixo do nome (com o ponto).
fn guess_extension(entry: &Value) -> String {
    for key in ["fileExtension", "extension"] {
        if let Some(value) = entry.get(key).and_then(Value::as_str) {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    if let Some(name) = file_name(entry) {
        if let Some(dot) = name.rfind('.') {
            return name[dot..].to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifica_por_extensao_e_por_nome() {
        let photo = AttachmentFile::from_entry(
            &json!({"fileId": "abc", "fileName": "antes.JPG"}),
            None,
        );
        assert!(photo.is_image());

        let doc = AttachmentFile::from_entry(
            &json!({"fileId": "def", "fileName": "laudo.pdf"}),
            None,
        );
        assert!(!doc.is_image());

        // Extensão declarada sem ponto não conta, mas o nome salva.
        let heic = AttachmentFile::from_entry(
            &json!({"fileExtension": "heic", "fileName": "foto.heic"}),
            None,
        );
        assert!(heic.is_image());
    }

    #[test]
    fn extensao_vem_do_nome_quando_nao_declarada() {
        let file = AttachmentFile::from_entry(&json!({"name": "relatorio.v2.webp"}), None);
        assert_eq!(file.file_extension, ".webp");
        assert!(file.is_image());
    }

    #[test]
    fn sem_nome_e_sem_extensao_vira_documento() {
        let file = AttachmentFile::from_entry(&json!({"fileId": 9}), None);
        assert_eq!(file.file_extension, "");
        assert!(!file.is_image());
    }
}
