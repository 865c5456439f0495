//! Versioned categorical code tables and the total mapper built on them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sproc_core::{FieldValue, Scalar};
use thiserror::Error;

pub const CONTRACT_TYPE_CA: &str = "contract_type_ca";
pub const CONTRACT_TYPE_ES: &str = "contract_type_es";
pub const PROCEDURE_CA: &str = "procedure_ca";
pub const URGENCY_CA: &str = "urgency_ca";
pub const STATUS_ID: &str = "status_id";
pub const STATUS_TITLE: &str = "status_title";

/// Canonical procedure code for minor contracts.
pub const MINOR_PROCEDURE_CODE: f64 = 6.0;

#[derive(Debug, Error)]
pub enum CodeTableError {
    #[error("reading code tables {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing code tables {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("code tables {path} are missing required table `{table}`")]
    MissingTable { path: PathBuf, table: String },
}

/// One table: source term -> canonical code. A `None` entry means the term is
/// known but has no canonical code.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct CodeTable {
    entries: BTreeMap<String, Option<Scalar>>,
}

impl CodeTable {
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<Scalar>)>,
        K: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&Option<Scalar>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeTables {
    pub version: u32,
    #[serde(default)]
    pub tables: BTreeMap<String, CodeTable>,
}

impl CodeTables {
    pub fn from_yaml_str(raw: &str, origin: &Path) -> Result<Self, CodeTableError> {
        serde_yaml::from_str(raw).map_err(|source| CodeTableError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, CodeTableError> {
        let raw = fs::read_to_string(path).map_err(|source| CodeTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tables = Self::from_yaml_str(&raw, path)?;
        for required in [
            CONTRACT_TYPE_CA,
            CONTRACT_TYPE_ES,
            PROCEDURE_CA,
            URGENCY_CA,
            STATUS_ID,
            STATUS_TITLE,
        ] {
            if !tables.tables.contains_key(required) {
                return Err(CodeTableError::MissingTable {
                    path: path.to_path_buf(),
                    table: required.to_string(),
                });
            }
        }
        Ok(tables)
    }

    pub fn table(&self, name: &str) -> Option<&CodeTable> {
        self.tables.get(name)
    }
}

/// Translates categorical values through a named table. Unknown tables and
/// unknown terms pass the value through unchanged.
#[derive(Debug, Clone, Default)]
pub struct CodeMapper {
    tables: CodeTables,
}

impl CodeMapper {
    pub fn new(tables: CodeTables) -> Self {
        Self { tables }
    }

    pub fn version(&self) -> u32 {
        self.tables.version
    }

    pub fn map_scalar(&self, table: &str, value: &Scalar) -> Option<Scalar> {
        let Some(table) = self.tables.table(table) else {
            return Some(value.clone());
        };
        match table.lookup(&value.lookup_key()) {
            Some(mapped) => mapped.clone(),
            None => Some(value.clone()),
        }
    }

    pub fn map(&self, table: &str, value: &FieldValue) -> FieldValue {
        match value {
            FieldValue::Absent => FieldValue::Absent,
            FieldValue::Scalar(s) => FieldValue::from_option(self.map_scalar(table, s)),
            FieldValue::Sequence(items) => FieldValue::Sequence(
                items
                    .iter()
                    .map(|item| item.as_ref().and_then(|s| self.map_scalar(table, s)))
                    .collect(),
            ),
        }
    }
}
