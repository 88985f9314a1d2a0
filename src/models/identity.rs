// src/models/identity.rs

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::models::followup::FollowUpRecord;

// --- CLASSIFICAÇÃO DO IDENTIFICADOR ---

/// Como o identificador digitado pelo usuário foi interpretado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Code,
    Phone,
}

impl SearchMode {
    /// Telefone: pelo menos 6 dígitos E no máximo 3 caracteres que não sejam
    /// dígito nem um de `+`, `-`, espaço, `#`. Qualquer outra coisa é código.
    pub fn classify(identifier: &str) -> Self {
        let digits = identifier.chars().filter(char::is_ascii_digit).count();
        if digits < 6 {
            return SearchMode::Code;
        }
        let strays = identifier
            .chars()
            .filter(|c| !c.is_ascii_digit() && !matches!(c, '+' | '-' | ' ' | '#'))
            .count();
        if strays <= 3 {
            SearchMode::Phone
        } else {
            SearchMode::Code
        }
    }
}

/// Qual estratégia de resolução venceu, em ordem fixa de prioridade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum MatchStrategy {
    ExactMatch,
    PhoneDetailMatch,
    DetailPrefixMatch,
    Unresolved,
}

// --- RESULTADO DA RESOLUÇÃO ---

/// Saída da resolução de identidade: código autoritativo (quando houver),
/// sugestões para desambiguar e o conjunto de registros já filtrado.
/// Criado por requisição, nunca persistido.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub resolved_code: Option<String>,
    pub search_mode: SearchMode,
    pub search_field: Option<String>,
    pub suggestions: Vec<String>,
    pub strategy: MatchStrategy,
    pub records: Vec<FollowUpRecord>,
    pub filter_info: FilterInfo,
}

/// Diagnóstico do filtro exato, devolvido no campo `filterInfo` da API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterInfo {
    #[schema(example = "C3770")]
    pub expected: String,
    pub search_mode: SearchMode,
    pub search_field: Option<String>,

    // Presente só quando a busca por telefone precisou do campo reserva.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_fallback: Option<String>,

    pub raw_count: usize,
    pub kept: usize,
    pub raw_unique_codes: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub raw_examples: Vec<Value>,

    pub detail_lookup_count: usize,
    pub detail_matches: usize,
    pub detail_unique_codes: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub detail_examples: Vec<Value>,

    pub resolved_code: Option<String>,
    pub suggested_codes: Vec<String>,
    pub strategy: MatchStrategy,
}

impl FilterInfo {
    pub fn new(expected: &str, search_mode: SearchMode, search_field: Option<String>) -> Self {
        Self {
            expected: expected.to_string(),
            search_mode,
            search_field,
            search_fallback: None,
            raw_count: 0,
            kept: 0,
            raw_unique_codes: Vec::new(),
            raw_examples: Vec::new(),
            detail_lookup_count: 0,
            detail_matches: 0,
            detail_unique_codes: Vec::new(),
            detail_examples: Vec::new(),
            resolved_code: None,
            suggested_codes: Vec::new(),
            strategy: MatchStrategy::Unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telefone_com_separadores_eh_phone() {
        assert_eq!(SearchMode::classify("+852 9123 4567"), SearchMode::Phone);
        assert_eq!(SearchMode::classify("13800001111"), SearchMode::Phone);
        assert_eq!(SearchMode::classify("2896-0123#2"), SearchMode::Phone);
    }

    #[test]
    fn codigo_de_cliente_eh_code() {
        assert_eq!(SearchMode::classify("C3770"), SearchMode::Code);
        assert_eq!(SearchMode::classify("C402"), SearchMode::Code);
    }

    #[test]
    fn poucos_digitos_eh_code() {
        // 5 dígitos não bastam, mesmo sem letras.
        assert_eq!(SearchMode::classify("12345"), SearchMode::Code);
    }

    #[test]
    fn excesso_de_caracteres_estranhos_vira_code() {
        // 6 dígitos mas 4 letras de "ruído" ultrapassam o limite de 3.
        assert_eq!(SearchMode::classify("tel:x123456z"), SearchMode::Code);
        // Com até 3 estranhos ainda é telefone.
        assert_eq!(SearchMode::classify("tel123456"), SearchMode::Phone);
    }
}
