//! Gap-filling of baseline outsider records from their matched open-data rows.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sproc_core::{fields, ContractRecord, FieldValue};

use crate::matching::MatchedPair;

pub const RULES_FILE: &str = "enrichment.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrichmentRule {
    /// Field read from the matched open-data record.
    pub from: String,
    /// Baseline field written when empty.
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EnrichmentRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<EnrichmentRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentMapping {
    rules: Vec<EnrichmentRule>,
}

impl EnrichmentMapping {
    pub fn new(rules: Vec<EnrichmentRule>) -> Self {
        Self { rules }
    }

    /// Loads `rules/enrichment.yaml` under the workspace root.
    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let path = root.join("rules").join(RULES_FILE);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: EnrichmentRulesFile =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(file.rules))
    }

    pub fn rules(&self) -> &[EnrichmentRule] {
        &self.rules
    }
}

const DEFAULT_FIELDS: &[&str] = &[
    fields::LINK,
    fields::CONTRACT_FOLDER_ID,
    fields::TITLE,
    fields::CPV_CODE,
    fields::BUDGET_TAX_EXCLUSIVE,
    fields::PARTY_ID,
    fields::PARTY_NAME,
    fields::SUBMISSION_DEADLINE,
    fields::DURATION,
    fields::TYPE_CODE,
    fields::PROCEDURE_CODE,
    fields::URGENCY_CODE,
    fields::FUNDING_PROGRAM_CODE,
    fields::LOT_ID,
    fields::LOT_NAME,
    fields::AWARDED_LOT_ID,
    fields::RECEIVED_TENDER_QUANTITY,
    fields::WINNER_ID,
    fields::WINNER_ID_SCHEME,
    fields::WINNER_NAME,
    fields::AWARDED_TAX_EXCLUSIVE,
    // written by the tender document lookup
    fields::ERROR,
    fields::OPTIONS_DESCRIPTION,
    fields::LEGAL_DOCUMENT_ID,
    fields::LEGAL_DOCUMENT_URI,
    fields::TECHNICAL_DOCUMENT_ID,
    fields::TECHNICAL_DOCUMENT_URI,
    fields::FINANCIAL_CRITERIA_TYPE,
    fields::FINANCIAL_CRITERIA_DESCRIPTION,
    fields::FINANCIAL_CRITERIA_THRESHOLD,
    fields::TECHNICAL_CRITERIA_TYPE,
    fields::TECHNICAL_CRITERIA_DESCRIPTION,
    fields::TECHNICAL_CRITERIA_THRESHOLD,
    fields::EXECUTION_REQUIREMENT_CODE,
    fields::EXECUTION_REQUIREMENT_NAME,
    fields::EXECUTION_REQUIREMENT_DESCRIPTION,
    fields::LOT_AWARDING_CRITERIA_TYPE,
    fields::LOT_AWARDING_CRITERIA_SUBTYPE,
    fields::LOT_AWARDING_CRITERIA_DESCRIPTION,
    fields::LOT_AWARDING_CRITERIA_WEIGHT,
];

impl Default for EnrichmentMapping {
    /// Catalonia outsiders are already canonical, so each field fills its namesake.
    fn default() -> Self {
        Self::new(
            DEFAULT_FIELDS
                .iter()
                .map(|field| EnrichmentRule {
                    from: field.to_string(),
                    to: field.to_string(),
                })
                .collect(),
        )
    }
}

/// Count of values written per destination field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubstitutionLedger {
    counts: BTreeMap<String, usize>,
}

impl SubstitutionLedger {
    pub fn record(&mut self, field: &str) {
        *self.counts.entry(field.to_string()).or_default() += 1;
    }

    pub fn count(&self, field: &str) -> usize {
        self.counts.get(field).copied().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Fields with at least one substitution, by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, n)| (k.as_str(), *n))
    }

    pub fn merge(&mut self, other: &SubstitutionLedger) {
        for (field, n) in other.entries() {
            *self.counts.entry(field.to_string()).or_default() += n;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub baseline_index: usize,
    pub record: ContractRecord,
}

#[derive(Debug, Clone)]
pub struct FieldEnricher {
    mapping: EnrichmentMapping,
}

impl FieldEnricher {
    pub fn new(mapping: EnrichmentMapping) -> Self {
        Self { mapping }
    }

    /// Copy of `pair.baseline` with empty destinations filled from the candidate.
    /// Populated baseline values are never replaced.
    pub fn enrich_pair(&self, pair: &MatchedPair, ledger: &mut SubstitutionLedger) -> ContractRecord {
        let mut record = pair.baseline.clone();
        for rule in self.mapping.rules() {
            let Some(value) = coalesce(pair.candidate.get(&rule.from)) else {
                continue;
            };
            if record.is_empty_field(&rule.to) {
                record.set(rule.to.as_str(), value);
                ledger.record(&rule.to);
            }
        }
        record
    }

    pub fn enrich(&self, matched: &[MatchedPair]) -> (Vec<EnrichedRecord>, SubstitutionLedger) {
        let mut ledger = SubstitutionLedger::default();
        let records = matched
            .iter()
            .map(|pair| EnrichedRecord {
                baseline_index: pair.baseline_index,
                record: self.enrich_pair(pair, &mut ledger),
            })
            .collect();
        (records, ledger)
    }
}

/// Multi-valued sources collapse to one comma-joined string; empty sources
/// contribute nothing.
fn coalesce(value: &FieldValue) -> Option<FieldValue> {
    match value {
        FieldValue::Absent => None,
        FieldValue::Scalar(s) if s.is_blank() => None,
        FieldValue::Scalar(_) => Some(value.clone()),
        FieldValue::Sequence(_) => value.render().map(FieldValue::text),
    }
}
