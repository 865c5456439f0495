//! Canonical contract record model shared by every stage of the integration pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod fields;

pub const CRATE_NAME: &str = "sproc-core";

/// Origin of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceTag {
    #[serde(rename = "place")]
    Place,
    #[serde(rename = "zaragoza-opendata")]
    ZaragozaOpenData,
    #[serde(rename = "madrid-opendata")]
    MadridOpenData,
    #[serde(rename = "catalonia-opendata-minor")]
    CataloniaMinor,
    #[serde(rename = "catalonia-opendata-outsider")]
    CataloniaOutsider,
}

impl SourceTag {
    pub const ALL: [SourceTag; 5] = [
        SourceTag::Place,
        SourceTag::ZaragozaOpenData,
        SourceTag::MadridOpenData,
        SourceTag::CataloniaMinor,
        SourceTag::CataloniaOutsider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::Place => "place",
            SourceTag::ZaragozaOpenData => "zaragoza-opendata",
            SourceTag::MadridOpenData => "madrid-opendata",
            SourceTag::CataloniaMinor => "catalonia-opendata-minor",
            SourceTag::CataloniaOutsider => "catalonia-opendata-outsider",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == input.trim())
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single source value: free text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s.as_str()),
            Scalar::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Text(s) => s.trim().is_empty(),
            Scalar::Number(n) => n.is_nan(),
        }
    }

    /// Key used for table lookups: integral numbers drop their fractional part so
    /// that `3`, `3.0` and `"3"` all resolve to the same entry.
    pub fn lookup_key(&self) -> String {
        match self {
            Scalar::Number(n) if is_integral(*n) => format!("{}", *n as i64),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Number(n) if is_integral(*n) => write!(f, "{n:.1}"),
            Scalar::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

/// Shape-tagged field value. Sequences keep `None` slots so that per-row
/// alignment survives grouping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Absent,
    Scalar(Scalar),
    Sequence(Vec<Option<Scalar>>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Scalar(Scalar::Text(value.into()))
    }

    pub fn number(value: f64) -> Self {
        if value.is_nan() {
            FieldValue::Absent
        } else {
            FieldValue::Scalar(Scalar::Number(value))
        }
    }

    /// Trimmed text cell; blank cells are absent.
    pub fn from_cell(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            FieldValue::Absent
        } else {
            FieldValue::text(trimmed)
        }
    }

    pub fn from_option<T: Into<Scalar>>(value: Option<T>) -> Self {
        value.map_or(FieldValue::Absent, |v| FieldValue::Scalar(v.into()))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// Null, blank text, NaN, or a sequence without a single usable element.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::Scalar(s) => s.is_blank(),
            FieldValue::Sequence(items) => items
                .iter()
                .all(|item| item.as_ref().map_or(true, Scalar::is_blank)),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// First usable scalar, looking inside sequences.
    pub fn first_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Absent => None,
            FieldValue::Scalar(s) => Some(s),
            FieldValue::Sequence(items) => items.iter().flatten().find(|s| !s.is_blank()),
        }
    }

    /// Flat string form. Sequences are comma-joined over their present elements.
    pub fn render(&self) -> Option<String> {
        match self {
            FieldValue::Absent => None,
            FieldValue::Scalar(s) if s.is_blank() => None,
            FieldValue::Scalar(s) => Some(s.to_string()),
            FieldValue::Sequence(items) => {
                let parts = items
                    .iter()
                    .flatten()
                    .filter(|s| !s.is_blank())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(value: Scalar) -> Self {
        FieldValue::Scalar(value)
    }
}

static ABSENT: FieldValue = FieldValue::Absent;

/// One contract row keyed by canonical dot-qualified field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub source: SourceTag,
    fields: BTreeMap<String, FieldValue>,
}

impl ContractRecord {
    pub fn new(source: SourceTag) -> Self {
        Self {
            source,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&ABSENT)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_empty_field(&self, name: &str) -> bool {
        self.get(name).is_empty()
    }

    pub fn render(&self, name: &str) -> Option<String> {
        self.get(name).render()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::from_cell(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::number(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_render_with_one_decimal() {
        assert_eq!(Scalar::Number(2.0).to_string(), "2.0");
        assert_eq!(Scalar::Number(12.5).to_string(), "12.5");
        assert_eq!(Scalar::Number(2.0).lookup_key(), "2");
    }

    #[test]
    fn emptiness_covers_blank_text_and_hollow_sequences() {
        assert!(FieldValue::Absent.is_empty());
        assert!(FieldValue::text("   ").is_empty());
        assert!(FieldValue::Sequence(vec![None, Some(Scalar::text(""))]).is_empty());
        assert!(!FieldValue::Sequence(vec![None, Some(Scalar::text("B1"))]).is_empty());
        assert!(FieldValue::number(f64::NAN).is_absent());
    }

    #[test]
    fn sequences_render_comma_joined() {
        let value = FieldValue::Sequence(vec![
            Some(Scalar::text("A")),
            None,
            Some(Scalar::Number(3.0)),
        ]);
        assert_eq!(value.render().as_deref(), Some("A, 3.0"));
    }

    #[test]
    fn missing_fields_read_as_absent() {
        let record = ContractRecord::new(SourceTag::Place).with_field(fields::TITLE, "Obra");
        assert_eq!(record.render(fields::TITLE).as_deref(), Some("Obra"));
        assert!(record.get(fields::CONTRACT_FOLDER_ID).is_absent());
    }

    #[test]
    fn source_tags_round_trip_through_names() {
        for tag in SourceTag::ALL {
            assert_eq!(SourceTag::parse(tag.as_str()), Some(tag));
        }
        let json = serde_json::to_string(&SourceTag::CataloniaOutsider).unwrap();
        assert_eq!(json, "\"catalonia-opendata-outsider\"");
    }

    #[test]
    fn project_awarding_criteria_share_one_parent() {
        let parent = "ContractFolderStatus.TenderingTerms.AwardingTerms.AwardingCriteria.";
        for field in [
            fields::AWARDING_CRITERIA_TYPE,
            fields::AWARDING_CRITERIA_DESCRIPTION,
            fields::AWARDING_CRITERIA_WEIGHT,
        ] {
            assert!(field.starts_with(parent), "{field}");
        }
    }
}
