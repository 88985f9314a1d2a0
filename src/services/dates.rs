// src/services/dates.rs

//! Datas do CRM chegam em formatos variados ("2024-05-01", "2024/05/01",
//! "2024-05-01 10:30:00", "2024-05-01T10:30:00"). O parser é tolerante:
//! qualquer outra forma vira `None`, nunca erro.

use chrono::{Days, NaiveDate};
use serde_json::Value;

/// Normaliza e parseia o prefixo de data de um texto.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let base = text
        .split('T')
        .next()
        .and_then(|part| part.split(' ').next())
        .map(|part| part.replace('/', "-"))?;
    NaiveDate::parse_from_str(base.trim(), "%Y-%m-%d").ok()
}

/// Parseia um valor JSON vindo do CRM (string ou escalar convertível).
pub fn parse_follow_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_text(s),
        Value::Null => None,
        other => parse_date_text(&other.to_string()),
    }
}

pub fn parse_follow_field(value: Option<&Value>) -> Option<NaiveDate> {
    value.and_then(parse_follow_value)
}

pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Soma simples de calendário; dias negativos subtraem.
pub fn shift_date(date: NaiveDate, days: i64) -> NaiveDate {
    if days >= 0 {
        date.checked_add_days(Days::new(days as u64)).unwrap_or(date)
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
            .unwrap_or(date)
    }
}
