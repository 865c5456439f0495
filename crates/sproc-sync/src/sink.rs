//! Parquet persistence: unified tables out, baseline snapshots in, plus the
//! lookup audit CSV and the checksum manifest.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Float64Type, Int32Type, Int64Type};
use arrow_array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sproc_core::{fields, ContractRecord, FieldValue, Scalar, SourceTag};
use tracing::{debug, warn};

use crate::augment::FailedLookup;
use crate::unify::{ColumnData, UnifiedTable};

/// Destination for unified tables.
pub trait ContractSink: Send + Sync {
    /// Persist `table` as `name`, returning where it landed.
    fn write_table(&self, name: &str, table: &UnifiedTable) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct ParquetSink {
    dir: PathBuf,
}

impl ParquetSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ContractSink for ParquetSink {
    fn write_table(&self, name: &str, table: &UnifiedTable) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(format!("{name}.parquet"));
        let batch = to_record_batch(table)?;
        write_parquet(&path, batch)?;
        debug!(path = %path.display(), rows = table.rows, "wrote parquet table");
        Ok(path)
    }
}

pub fn to_record_batch(table: &UnifiedTable) -> Result<RecordBatch> {
    let mut schema_fields = Vec::with_capacity(table.columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        let array: ArrayRef = match &column.data {
            ColumnData::Text(rows) => Arc::new(StringArray::from(rows.clone())),
            ColumnData::Sequence(rows) => {
                let mut builder = ListBuilder::new(StringBuilder::new());
                for cell in rows {
                    match cell {
                        Some(items) => {
                            for item in items {
                                builder.values().append_option(item.as_deref());
                            }
                            builder.append(true);
                        }
                        None => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
        };
        schema_fields.push(ArrowField::new(
            column.name.as_str(),
            array.data_type().clone(),
            true,
        ));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(schema_fields)), arrays)
        .context("assembling unified record batch")
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

/// Column names written from tuple-indexed frames look like
/// `('ContractFolderStatus', 'ContractFolderID', '')`; these flatten to the
/// dotted canonical name.
pub fn flatten_column_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) else {
        return trimmed.to_string();
    };
    inner
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Read a baseline parquet snapshot into records tagged `source`. Columns of
/// unsupported types are skipped with a warning.
pub fn read_contracts(path: &Path, source: SourceTag) -> Result<Vec<ContractRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata {}", path.display()))?
        .build()
        .with_context(|| format!("building parquet reader {}", path.display()))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.with_context(|| format!("reading record batch {}", path.display()))?;
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let name = flatten_column_name(field.name());
            if name == fields::SOURCE {
                continue;
            }
            if !supported(field.data_type()) {
                warn!(path = %path.display(), column = %name, data_type = %field.data_type(), "skipping unsupported column");
                continue;
            }
            columns.push((name, array.clone()));
        }

        for row in 0..batch.num_rows() {
            let mut record = ContractRecord::new(source);
            for (name, array) in &columns {
                record.set(name.as_str(), field_value(array.as_ref(), row));
            }
            records.push(record);
        }
    }
    Ok(records)
}

fn supported_leaf(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
    )
}

fn supported(data_type: &DataType) -> bool {
    match data_type {
        DataType::List(item) | DataType::LargeList(item) => supported_leaf(item.data_type()),
        other => supported_leaf(other),
    }
}

fn field_value(array: &dyn Array, row: usize) -> FieldValue {
    if array.is_null(row) {
        return FieldValue::Absent;
    }
    let items = match array.data_type() {
        DataType::List(_) => Some(array.as_list::<i32>().value(row)),
        DataType::LargeList(_) => Some(array.as_list::<i64>().value(row)),
        _ => None,
    };
    if let Some(items) = items {
        return FieldValue::Sequence(
            (0..items.len())
                .map(|i| scalar_at(items.as_ref(), i))
                .collect(),
        );
    }
    match scalar_at(array, row) {
        Some(Scalar::Text(text)) => FieldValue::from_cell(&text),
        Some(Scalar::Number(n)) => FieldValue::number(n),
        None => FieldValue::Absent,
    }
}

fn scalar_at(array: &dyn Array, row: usize) -> Option<Scalar> {
    if array.is_null(row) {
        return None;
    }
    let scalar = match array.data_type() {
        DataType::Utf8 => Scalar::text(array.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => Scalar::text(array.as_string::<i64>().value(row)),
        DataType::Int32 => Scalar::Number(f64::from(array.as_primitive::<Int32Type>().value(row))),
        DataType::Int64 => Scalar::Number(array.as_primitive::<Int64Type>().value(row) as f64),
        DataType::Float32 => Scalar::Number(f64::from(array.as_primitive::<Float32Type>().value(row))),
        DataType::Float64 => Scalar::Number(array.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => Scalar::text(array.as_boolean().value(row).to_string()),
        _ => return None,
    };
    Some(scalar)
}

/// Audit CSV with a `url,error` header, written even when empty.
pub fn write_failed_lookups(path: &Path, failed: &[FailedLookup]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer
        .write_record(["url", "error"])
        .with_context(|| format!("writing header {}", path.display()))?;
    for lookup in failed {
        writer
            .write_record([lookup.url.as_str(), lookup.error.as_str()])
            .with_context(|| format!("writing row {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub fn manifest_entry(name: &str, output_dir: &Path, path: &Path) -> Result<ManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(output_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}
