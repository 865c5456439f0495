//! Source normalizers: flatten each open-data portal's row shape into canonical
//! contract records.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use sproc_core::{ContractRecord, SourceTag};
use thiserror::Error;

pub mod catalonia;
pub mod codes;
pub mod madrid;
pub mod transform;
pub mod zaragoza;

pub use catalonia::CataloniaNormalizer;
pub use codes::{CodeMapper, CodeTable, CodeTableError, CodeTables};
pub use madrid::{MadridLayout, MadridNormalizer, MadridWorkbook};
pub use transform::{parse_pointer, Pointer, ValueTransform};
pub use zaragoza::ZaragozaNormalizer;

pub const CRATE_NAME: &str = "sproc-adapters";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("{source_id}: required field `{field}` missing from row")]
    MissingRequiredField {
        source_id: &'static str,
        field: String,
    },
    #[error("{source_id}: row is not an object")]
    NotAnObject { source_id: &'static str },
}

/// One raw-to-canonical field rule. Paths walk nested objects; flat rows use a
/// single segment holding the column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub path: &'static [&'static str],
    pub target: &'static str,
    pub transform: ValueTransform,
}

impl FieldRule {
    pub const fn new(
        path: &'static [&'static str],
        target: &'static str,
        transform: ValueTransform,
    ) -> Self {
        Self {
            path,
            target,
            transform,
        }
    }

    pub const fn keep(path: &'static [&'static str], target: &'static str) -> Self {
        Self::new(path, target, ValueTransform::Keep)
    }
}

/// Static rename table for one source layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapping {
    pub rules: &'static [FieldRule],
    pub required: &'static [&'static str],
}

impl SourceMapping {
    /// Apply every rule to `raw`. Every target field is present on the output,
    /// absent when nothing resolved. When several rules feed one target, the
    /// first non-empty value wins.
    pub fn apply(
        &self,
        source_id: &'static str,
        source: SourceTag,
        raw: &JsonValue,
        codes: &CodeMapper,
    ) -> Result<ContractRecord, NormalizeError> {
        if !raw.is_object() {
            return Err(NormalizeError::NotAnObject { source_id });
        }
        if transform::resolve_path(raw, self.required).is_none() {
            return Err(NormalizeError::MissingRequiredField {
                source_id,
                field: self.required.join("."),
            });
        }

        let mut record = ContractRecord::new(source);
        for rule in self.rules {
            let value = transform::resolve_path(raw, rule.path)
                .map(transform::json_to_field)
                .unwrap_or_default();
            let value = rule.transform.apply(value, codes);
            if record.is_empty_field(rule.target) {
                record.set(rule.target, value);
            }
        }
        Ok(record)
    }
}

/// Turns one raw row of a portal export into a canonical record.
pub trait SourceNormalizer: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn normalize(&self, raw: &JsonValue) -> Result<ContractRecord, NormalizeError>;

    /// Normalize a whole export, keeping rejected rows (with their index) for
    /// the caller to report.
    fn normalize_all(&self, rows: &[JsonValue]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for (index, row) in rows.iter().enumerate() {
            match self.normalize(row) {
                Ok(record) => batch.records.push(record),
                Err(err) => batch.rejected.push((index, err)),
            }
        }
        batch
    }
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<ContractRecord>,
    pub rejected: Vec<(usize, NormalizeError)>,
}

/// Normalizer for single-layout sources. Madrid rows need a workbook layout,
/// see [`MadridNormalizer::new`].
pub fn normalizer_for_source(
    source_id: &str,
    codes: Arc<CodeMapper>,
) -> Option<Box<dyn SourceNormalizer>> {
    match source_id {
        zaragoza::SOURCE_ID => Some(Box::new(ZaragozaNormalizer::new(codes))),
        catalonia::SOURCE_ID => Some(Box::new(CataloniaNormalizer::new(codes))),
        _ => None,
    }
}

/// Join the values selected by `value_path` from `items`, bucketed by the value
/// at `discriminant_path`. Buckets keep first-seen order of their values.
pub fn partition_by_discriminant(
    items: &JsonValue,
    discriminant_path: &[&str],
    value_path: &[&str],
    separator: &str,
) -> Vec<(String, String)> {
    let Some(items) = items.as_array() else {
        return Vec::new();
    };
    let mut buckets: Vec<(String, Vec<String>)> = Vec::new();
    for item in items {
        let Some(kind) = transform::resolve_path(item, discriminant_path)
            .and_then(transform::json_scalar)
            .map(|s| s.lookup_key())
        else {
            continue;
        };
        let Some(value) = transform::resolve_path(item, value_path)
            .and_then(transform::json_scalar)
            .map(|s| s.to_string())
        else {
            continue;
        };
        match buckets.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, values)) => values.push(value),
            None => buckets.push((kind, vec![value])),
        }
    }
    buckets
        .into_iter()
        .map(|(kind, values)| (kind, values.join(separator)))
        .collect()
}
