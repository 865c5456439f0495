//! Secondary lookup of Catalonia tender publication documents.
//!
//! Each record carrying a document pointer is fetched with retries and the
//! document's administrative clauses, lot solvency criteria, execution
//! conditions and award criteria are copied onto the record. Failures never
//! abort the batch; they leave a marker on the record and a row in the audit
//! list.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use sproc_adapters::transform::resolve_path;
use sproc_adapters::{parse_pointer, Pointer};
use sproc_core::{fields, ContractRecord, FieldValue};
use sproc_storage::{fetch_with_retry, DocumentSource, RetryPolicy};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

/// Written over the pointer when every fetch attempt failed.
pub const EXHAUSTED_MARKER: &str = "fetch-error: retries exhausted";
/// Written over the pointer when it could not be parsed.
pub const INVALID_POINTER_MARKER: &str = "fetch-error: invalid pointer";

const MISSING_ITEM_VALUE: &str = "None";

/// One failed secondary lookup, persisted to the audit CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedLookup {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentOutcome {
    /// No pointer, or a pointer without a URL.
    Skipped,
    Augmented,
    /// Fetched, but the document was unreadable or lacked a required key.
    Partial,
    Exhausted,
    InvalidPointer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AugmentStats {
    pub augmented: usize,
    pub partial: usize,
    pub exhausted: usize,
    pub invalid: usize,
    pub skipped: usize,
}

impl AugmentStats {
    fn count(&mut self, outcome: AugmentOutcome) {
        match outcome {
            AugmentOutcome::Skipped => self.skipped += 1,
            AugmentOutcome::Augmented => self.augmented += 1,
            AugmentOutcome::Partial => self.partial += 1,
            AugmentOutcome::Exhausted => self.exhausted += 1,
            AugmentOutcome::InvalidPointer => self.invalid += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct AugmentedBatch {
    pub records: Vec<ContractRecord>,
    pub failed: Vec<FailedLookup>,
    pub stats: AugmentStats,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("missing key `{0}`")]
    MissingKey(&'static str),
    #[error("unreadable document: {0}")]
    Unreadable(String),
}

pub struct RemoteAugmenter {
    source: Arc<dyn DocumentSource>,
    policy: RetryPolicy,
}

impl RemoteAugmenter {
    pub fn new(source: Arc<dyn DocumentSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Records are processed one at a time, in order.
    pub async fn augment_all(&self, records: Vec<ContractRecord>) -> AugmentedBatch {
        let mut batch = AugmentedBatch {
            records: Vec::with_capacity(records.len()),
            ..AugmentedBatch::default()
        };
        for record in records {
            let (record, outcome, failure) = self.augment_record(record).await;
            batch.stats.count(outcome);
            batch.failed.extend(failure);
            batch.records.push(record);
        }
        info!(
            augmented = batch.stats.augmented,
            partial = batch.stats.partial,
            exhausted = batch.stats.exhausted,
            invalid = batch.stats.invalid,
            skipped = batch.stats.skipped,
            "tender document augmentation finished"
        );
        batch
    }

    pub async fn augment_record(
        &self,
        mut record: ContractRecord,
    ) -> (ContractRecord, AugmentOutcome, Option<FailedLookup>) {
        let Some(raw) = record.render(fields::TENDER_DOCUMENT_POINTER) else {
            return (record, AugmentOutcome::Skipped, None);
        };

        let url = match parse_pointer(&raw) {
            Pointer::Url(url) => url,
            Pointer::MissingUrl => {
                debug!(pointer = %raw, "pointer has no url, skipping");
                return (record, AugmentOutcome::Skipped, None);
            }
            Pointer::Malformed => {
                warn!(pointer = %raw, "unparseable document pointer");
                record.set(fields::TENDER_DOCUMENT_POINTER, INVALID_POINTER_MARKER);
                let failure = FailedLookup {
                    url: raw,
                    error: "invalid document pointer".to_string(),
                };
                return (record, AugmentOutcome::InvalidPointer, Some(failure));
            }
        };

        let span = info_span!("secondary_fetch", url = %url);
        let fetched = match fetch_with_retry(self.source.as_ref(), &self.policy, &url)
            .instrument(span)
            .await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(%url, attempts = err.attempts(), error = %err, "tender document fetch exhausted");
                record.set(fields::TENDER_DOCUMENT_POINTER, EXHAUSTED_MARKER);
                let failure = FailedLookup {
                    url,
                    error: err.to_string(),
                };
                return (record, AugmentOutcome::Exhausted, Some(failure));
            }
        };

        let applied = serde_json::from_slice::<JsonValue>(&fetched.body)
            .map_err(|err| DocumentError::Unreadable(err.to_string()))
            .and_then(|document| apply_document(&mut record, &document));
        match applied {
            Ok(()) => {
                debug!(%url, attempts = fetched.attempts, "tender document applied");
                (record, AugmentOutcome::Augmented, None)
            }
            Err(err) => {
                warn!(%url, error = %err, "tender document incomplete");
                record.set(fields::ERROR, err.to_string().as_str());
                let failure = FailedLookup {
                    url,
                    error: err.to_string(),
                };
                (record, AugmentOutcome::Partial, Some(failure))
            }
        }
    }
}

struct ItemColumn {
    path: &'static [&'static str],
    target: &'static str,
}

/// A per-lot list in the publication document and the columns read from each
/// of its items. Values accumulate across all lots.
struct LotFamily {
    collection: &'static str,
    columns: &'static [ItemColumn],
}

const LOT_FAMILIES: &[LotFamily] = &[
    LotFamily {
        collection: "solvenciesEconomiques",
        columns: &[
            ItemColumn { path: &["criteriSolvencia", "ca"], target: fields::FINANCIAL_CRITERIA_TYPE },
            ItemColumn { path: &["descripcioCriteriSolvencia", "ca"], target: fields::FINANCIAL_CRITERIA_DESCRIPTION },
            ItemColumn { path: &["valorMinimExigit", "ca"], target: fields::FINANCIAL_CRITERIA_THRESHOLD },
        ],
    },
    LotFamily {
        collection: "solvenciesTecniques",
        columns: &[
            ItemColumn { path: &["criteriSolvencia", "ca"], target: fields::TECHNICAL_CRITERIA_TYPE },
            ItemColumn { path: &["descripcioCriteriSolvencia", "ca"], target: fields::TECHNICAL_CRITERIA_DESCRIPTION },
            ItemColumn { path: &["valorMinimExigit", "ca"], target: fields::TECHNICAL_CRITERIA_THRESHOLD },
        ],
    },
    LotFamily {
        collection: "condicionsExecucio",
        columns: &[
            ItemColumn { path: &["tipusCondicioExecucio", "id"], target: fields::EXECUTION_REQUIREMENT_CODE },
            ItemColumn { path: &["tipusCondicioExecucio", "ca"], target: fields::EXECUTION_REQUIREMENT_NAME },
            ItemColumn { path: &["descripcio", "ca"], target: fields::EXECUTION_REQUIREMENT_DESCRIPTION },
        ],
    },
    LotFamily {
        collection: "criterisAdjudicacio",
        columns: &[
            ItemColumn { path: &["tipusCriteri", "ca"], target: fields::LOT_AWARDING_CRITERIA_TYPE },
            ItemColumn { path: &["tipusAvaluacio", "ca"], target: fields::LOT_AWARDING_CRITERIA_SUBTYPE },
            ItemColumn { path: &["descripcioCriteri", "ca"], target: fields::LOT_AWARDING_CRITERIA_DESCRIPTION },
            ItemColumn { path: &["ponderacio"], target: fields::LOT_AWARDING_CRITERIA_WEIGHT },
        ],
    },
];

/// Copy the publication document's fields onto `record`. Fields already set
/// before a missing required key is hit stay set.
pub fn apply_document(record: &mut ContractRecord, document: &JsonValue) -> Result<(), DocumentError> {
    let publication = required(document, "publicacio")?;
    let details = required(publication, "dadesPublicacio")?;

    let legal = required(required(details, "plecsDeClausulesAdministratives")?, "ca")?;
    set_document_refs(record, legal, fields::LEGAL_DOCUMENT_ID, fields::LEGAL_DOCUMENT_URI);
    let technical = required(required(details, "plecsDePrescripcionsTecniques")?, "ca")?;
    set_document_refs(
        record,
        technical,
        fields::TECHNICAL_DOCUMENT_ID,
        fields::TECHNICAL_DOCUMENT_URI,
    );

    if record.is_empty_field(fields::PARTY_ID) {
        let organ_id = required(required(document, "organ")?, "organContractacioId")?;
        record.set(fields::PARTY_ID, FieldValue::from_option(json_text(organ_id)));
    }

    let extensions = details
        .get("preveuenProrroguesAlsPlecs")
        .and_then(json_text)
        .unwrap_or_default();
    record.set(fields::OPTIONS_DESCRIPTION, FieldValue::text(extensions));

    let lots = required(publication, "dadesPublicacioLot")?;
    let lots = lots.as_array().map(Vec::as_slice).unwrap_or_default();
    for family in LOT_FAMILIES {
        let mut columns = vec![Vec::new(); family.columns.len()];
        for item in lots.iter().flat_map(|lot| items(lot, family.collection)) {
            for (column, values) in family.columns.iter().zip(columns.iter_mut()) {
                let value = resolve_path(item, column.path)
                    .and_then(json_text)
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| MISSING_ITEM_VALUE.to_string());
                values.push(value);
            }
        }
        for (column, values) in family.columns.iter().zip(columns) {
            if !values.is_empty() {
                record.set(column.target, FieldValue::text(values.join(", ")));
            }
        }
    }
    Ok(())
}

fn required<'a>(value: &'a JsonValue, key: &'static str) -> Result<&'a JsonValue, DocumentError> {
    value.get(key).ok_or(DocumentError::MissingKey(key))
}

fn items<'a>(lot: &'a JsonValue, collection: &str) -> &'a [JsonValue] {
    lot.get(collection)
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Clause documents: titles and paths comma-joined, both absent when the list
/// is empty.
fn set_document_refs(record: &mut ContractRecord, docs: &JsonValue, id_field: &str, uri_field: &str) {
    let docs = docs.as_array().map(Vec::as_slice).unwrap_or_default();
    if docs.is_empty() {
        record.set(id_field, FieldValue::Absent);
        record.set(uri_field, FieldValue::Absent);
        return;
    }
    let join = |key: &str| {
        docs.iter()
            .map(|doc| doc.get(key).and_then(json_text).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ")
    };
    record.set(id_field, FieldValue::text(join("titol")));
    record.set(uri_field, FieldValue::text(join("path")));
}

/// Text form of a JSON leaf. Integers keep their integer spelling.
fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
