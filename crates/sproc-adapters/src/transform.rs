//! Value extraction from raw rows and the per-field value transforms.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use sproc_core::{FieldValue, Scalar};

use crate::codes::CodeMapper;

/// Walk `path` through nested objects. When an array is crossed, the first
/// element for which the rest of the path resolves wins.
pub fn resolve_path<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((head, rest)) = path.split_first() else {
        return Some(value);
    };
    match value {
        JsonValue::Object(map) => resolve_path(map.get(*head)?, rest),
        JsonValue::Array(items) => items.iter().find_map(|item| resolve_path(item, path)),
        _ => None,
    }
}

pub fn json_scalar(value: &JsonValue) -> Option<Scalar> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Scalar::text(b.to_string())),
        JsonValue::Number(n) => n.as_f64().map(Scalar::Number),
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| Scalar::text(trimmed))
        }
        other => Some(Scalar::text(other.to_string())),
    }
}

pub fn json_to_field(value: &JsonValue) -> FieldValue {
    match value {
        JsonValue::Array(items) => FieldValue::Sequence(items.iter().map(json_scalar).collect()),
        other => FieldValue::from_option(json_scalar(other)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransform {
    Keep,
    /// Calendar date rendered `YYYY-MM-DD`.
    Date,
    /// RFC 3339 UTC timestamp; unparseable values become absent.
    Timestamp,
    /// Spanish-formatted euro amount (`1.234,56 €`).
    EuroAmount,
    /// Number that may use a decimal comma.
    Decimal,
    /// `SI`/`NO` small-business flag.
    SmeFlag,
    /// Free-text duration converted to days.
    DurationDays,
    /// URL pulled out of a pointer cell.
    Link,
    Code(&'static str),
}

impl ValueTransform {
    pub fn apply(self, value: FieldValue, codes: &CodeMapper) -> FieldValue {
        match self {
            ValueTransform::Keep => value,
            ValueTransform::Code(table) => codes.map(table, &value),
            ValueTransform::SmeFlag if value.is_absent() => FieldValue::text("undefined"),
            other => map_scalars(value, |scalar| other.apply_scalar(scalar)),
        }
    }

    fn apply_scalar(self, scalar: Scalar) -> Option<Scalar> {
        match (self, scalar) {
            (ValueTransform::Date, Scalar::Text(text)) => Some(Scalar::Text(
                normalize_date(&text).unwrap_or(text),
            )),
            (ValueTransform::Timestamp, Scalar::Text(text)) => {
                normalize_timestamp(&text).map(Scalar::Text)
            }
            (ValueTransform::EuroAmount, Scalar::Text(text)) => {
                parse_euro_amount(&text).map(Scalar::Number)
            }
            (ValueTransform::Decimal, Scalar::Text(text)) => {
                parse_decimal(&text).map(Scalar::Number)
            }
            (ValueTransform::SmeFlag, scalar) => Some(Scalar::text(sme_flag(&scalar))),
            (ValueTransform::DurationDays, Scalar::Text(text)) => {
                duration_in_days(&text).map(|days| Scalar::Number(days as f64))
            }
            (ValueTransform::Link, Scalar::Text(text)) => match parse_pointer(&text) {
                Pointer::Url(url) => Some(Scalar::Text(url)),
                _ => Some(Scalar::Text(text)),
            },
            (_, scalar) => Some(scalar),
        }
    }
}

fn map_scalars(value: FieldValue, f: impl Fn(Scalar) -> Option<Scalar>) -> FieldValue {
    match value {
        FieldValue::Absent => FieldValue::Absent,
        FieldValue::Scalar(s) => FieldValue::from_option(f(s)),
        FieldValue::Sequence(items) => {
            FieldValue::Sequence(items.into_iter().map(|item| item.and_then(&f)).collect())
        }
    }
}

pub fn normalize_date(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.contains('/') {
        let year_len = text.rsplit('/').next().map_or(0, str::len);
        let format = if year_len == 2 { "%d/%m/%y" } else { "%d/%m/%Y" };
        return NaiveDate::parse_from_str(text, format)
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.format("%Y-%m-%d").to_string());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let text = raw.trim();
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        dt.with_timezone(&Utc)
    } else if let Some(naive) = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        naive.and_utc()
    } else {
        let date = ["%Y-%m-%d", "%d/%m/%Y"]
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok())?;
        date.and_hms_opt(0, 0, 0)?.and_utc()
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::Secs, false))
}

/// `"1.234,56 €"` -> `1234.56`. Dots are thousands separators.
pub fn parse_euro_amount(raw: &str) -> Option<f64> {
    let cleaned = raw
        .replace('€', "")
        .replace('.', "")
        .replace(',', ".");
    cleaned.trim().parse().ok()
}

pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse().ok()
}

fn sme_flag(value: &Scalar) -> &'static str {
    match value.as_text().map(str::trim) {
        Some("SI") => "true",
        Some("NO") => "false",
        _ => "undefined",
    }
}

/// Days covered by a Catalan duration description: `"1 anys 2 mesos 3 dies"`,
/// a `dd/mm/YYYY a dd/mm/YYYY` range, or a bare timestamp (zero days).
pub fn duration_in_days(raw: &str) -> Option<i64> {
    let text = raw.trim();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let unit_days = |token: &str| match token {
        "anys" | "any" => Some(365),
        "mesos" | "mes" => Some(30),
        "dies" | "dia" => Some(1),
        _ => None,
    };

    if tokens.iter().any(|t| unit_days(t).is_some()) {
        let mut total = 0i64;
        for pair in tokens.windows(2) {
            if let (Ok(amount), Some(days)) = (pair[0].parse::<i64>(), unit_days(pair[1])) {
                total = amount.checked_mul(days).and_then(|d| total.checked_add(d))?;
            }
        }
        return Some(total);
    }

    if let Some((start, end)) = text.split_once(" a ") {
        let start = NaiveDate::parse_from_str(start.trim(), "%d/%m/%Y").ok()?;
        let end = NaiveDate::parse_from_str(end.trim(), "%d/%m/%Y").ok()?;
        return Some((end - start).num_days());
    }

    if text.contains('-') && text.contains(':') {
        return NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|_| 0);
    }
    None
}

/// Parsed form of a secondary-document pointer cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointer {
    Url(String),
    /// Well-formed object without a `url` entry.
    MissingUrl,
    Malformed,
}

/// Pointer cells come as JSON objects, single-quoted dict literals or bare URLs.
pub fn parse_pointer(raw: &str) -> Pointer {
    let text = raw.trim();
    if text.starts_with("http://") || text.starts_with("https://") {
        return Pointer::Url(text.to_string());
    }
    if !text.starts_with('{') {
        return Pointer::Malformed;
    }
    let parsed = serde_json::from_str::<JsonValue>(text)
        .or_else(|_| serde_json::from_str::<JsonValue>(&text.replace('\'', "\"")));
    match parsed {
        Ok(JsonValue::Object(map)) => match map.get("url").and_then(JsonValue::as_str) {
            Some(url) if !url.trim().is_empty() => Pointer::Url(url.trim().to_string()),
            _ => Pointer::MissingUrl,
        },
        _ => Pointer::Malformed,
    }
}
