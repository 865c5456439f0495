//! Catalonia public procurement CSV export. One row per contract lot; rows for
//! the same tender share descriptive columns.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value as JsonValue};
use sproc_core::{fields, ContractRecord, SourceTag};

use crate::codes::{CodeMapper, CONTRACT_TYPE_CA, MINOR_PROCEDURE_CODE, PROCEDURE_CA, URGENCY_CA};
use crate::transform::ValueTransform::{Code, Decimal, DurationDays, Link};
use crate::{FieldRule, NormalizeError, SourceMapping, SourceNormalizer};

pub const SOURCE_ID: &str = "catalonia-opendata";
pub const DEFAULT_FILE_FRAGMENT: &str = "catalunya";

pub const RULES: &[FieldRule] = &[
    FieldRule::new(&["enllac_publicacio"], fields::LINK, Link),
    FieldRule::keep(&["codi_expedient"], fields::CONTRACT_FOLDER_ID),
    FieldRule::keep(&["objecte_contracte"], fields::TITLE),
    FieldRule::keep(&["codi_cpv"], fields::CPV_CODE),
    FieldRule::keep(&["codi_cpv"], fields::LOT_CPV_CODE),
    FieldRule::new(&["pressupost_licitacio_sense"], fields::BUDGET_TAX_EXCLUSIVE, Decimal),
    FieldRule::new(&["pressupost_licitacio_sense"], fields::LOT_BUDGET_TAX_EXCLUSIVE, Decimal),
    FieldRule::keep(&["codi_dir3"], fields::PARTY_ID),
    FieldRule::keep(&["nom_organ"], fields::PARTY_NAME),
    FieldRule::keep(&["codi_nuts"], fields::COUNTRY_SUBENTITY_CODE),
    FieldRule::keep(&["termini_presentacio_ofertes"], fields::SUBMISSION_DEADLINE),
    FieldRule::new(&["durada_contracte"], fields::DURATION, DurationDays),
    FieldRule::new(&["tipus_contracte"], fields::TYPE_CODE, Code(CONTRACT_TYPE_CA)),
    FieldRule::new(&["procediment"], fields::PROCEDURE_CODE, Code(PROCEDURE_CA)),
    FieldRule::new(&["tipus_tramitacio"], fields::URGENCY_CODE, Code(URGENCY_CA)),
    FieldRule::keep(&["tipus_financament"], fields::FUNDING_PROGRAM_CODE),
    FieldRule::keep(&["numero_lot"], fields::LOT_ID),
    FieldRule::keep(&["descripcio_lot"], fields::LOT_NAME),
    FieldRule::keep(&["resultat"], fields::AWARDED_LOT_ID),
    FieldRule::new(&["ofertes_rebudes"], fields::RECEIVED_TENDER_QUANTITY, Decimal),
    FieldRule::keep(&["identificacio_adjudicatari"], fields::WINNER_ID),
    FieldRule::keep(&["tipus_identificacio"], fields::WINNER_ID_SCHEME),
    FieldRule::keep(&["denominacio_adjudicatari"], fields::WINNER_NAME),
    FieldRule::new(&["import_adjudicacio_sense"], fields::AWARDED_TAX_EXCLUSIVE, Decimal),
    FieldRule::keep(&["tipus_empresa"], fields::SME_AWARDED),
    FieldRule::keep(&["url_json_licitacio"], fields::TENDER_DOCUMENT_POINTER),
];

pub const MAPPING: SourceMapping = SourceMapping {
    rules: RULES,
    required: &["codi_expedient"],
};

/// First `*.csv` in `dir` whose name contains `fragment`, by file name order.
pub fn find_export(dir: &Path, fragment: &str) -> Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.contains(fragment) && name.ends_with(".csv") {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// One JSON object per CSV record, keyed by header. Empty cells are null.
pub fn load_rows(path: &Path) -> Result<Vec<JsonValue>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening Catalonia export {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{}: record {}", path.display(), line + 1))?;
        let mut object = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            let value = if cell.trim().is_empty() {
                JsonValue::Null
            } else {
                JsonValue::String(cell.to_string())
            };
            object.insert(header.clone(), value);
        }
        rows.push(JsonValue::Object(object));
    }
    Ok(rows)
}

pub fn is_minor_contract(record: &ContractRecord) -> bool {
    record
        .get(fields::PROCEDURE_CODE)
        .first_scalar()
        .and_then(|s| s.as_number())
        .is_some_and(|code| code == MINOR_PROCEDURE_CODE)
}

/// Normalizes Catalonia rows and splits them into minors and outsiders by the
/// mapped procedure code.
#[derive(Debug, Clone)]
pub struct CataloniaNormalizer {
    mapping: SourceMapping,
    codes: Arc<CodeMapper>,
}

impl CataloniaNormalizer {
    pub fn new(codes: Arc<CodeMapper>) -> Self {
        Self {
            mapping: MAPPING,
            codes,
        }
    }
}

impl SourceNormalizer for CataloniaNormalizer {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn normalize(&self, raw: &JsonValue) -> Result<ContractRecord, NormalizeError> {
        let mut record =
            self.mapping
                .apply(SOURCE_ID, SourceTag::CataloniaOutsider, raw, &self.codes)?;
        if is_minor_contract(&record) {
            record.source = SourceTag::CataloniaMinor;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeTables;
    use serde_json::json;

    fn codes() -> Arc<CodeMapper> {
        let yaml = r#"
version: 1
tables:
  contract_type_ca:
    "Serveis": 2
  procedure_ca:
    "Contracte menor": 6
    "Restringit": 2
  urgency_ca:
    "Ordinària": 1
    "Urgent": 2
"#;
        Arc::new(CodeMapper::new(
            CodeTables::from_yaml_str(yaml, Path::new("inline")).unwrap(),
        ))
    }

    fn row(procediment: &str) -> JsonValue {
        json!({
            "codi_expedient": "CTTI-2021-77",
            "objecte_contracte": "Servei de manteniment",
            "enllac_publicacio": "{'url': 'https://contractaciopublica.cat/ca/detall-publicacio/123'}",
            "codi_cpv": "50000000",
            "pressupost_licitacio_sense": "12000,50",
            "nom_organ": "Centre de Telecomunicacions",
            "codi_nuts": "ES511",
            "durada_contracte": "1 anys 0 mesos 0 dies",
            "tipus_contracte": "Serveis",
            "procediment": procediment,
            "tipus_tramitacio": "Urgent",
            "numero_lot": "1",
            "url_json_licitacio": "{'url': 'https://contractaciopublica.cat/api/123.json'}"
        })
    }

    #[test]
    fn rows_map_codes_links_and_durations() {
        let record = CataloniaNormalizer::new(codes()).normalize(&row("Restringit")).unwrap();

        assert_eq!(record.source, SourceTag::CataloniaOutsider);
        assert_eq!(
            record.render(fields::LINK).as_deref(),
            Some("https://contractaciopublica.cat/ca/detall-publicacio/123")
        );
        assert_eq!(record.render(fields::TYPE_CODE).as_deref(), Some("2.0"));
        assert_eq!(record.render(fields::PROCEDURE_CODE).as_deref(), Some("2.0"));
        assert_eq!(record.render(fields::URGENCY_CODE).as_deref(), Some("2.0"));
        assert_eq!(record.render(fields::DURATION).as_deref(), Some("365.0"));
        assert_eq!(record.render(fields::COUNTRY_SUBENTITY_CODE).as_deref(), Some("ES511"));
        assert!(record.contains(fields::TENDER_DOCUMENT_POINTER));
    }

    #[test]
    fn one_column_feeds_project_and_lot_fields() {
        let record = CataloniaNormalizer::new(codes()).normalize(&row("Restringit")).unwrap();
        assert_eq!(record.render(fields::CPV_CODE), record.render(fields::LOT_CPV_CODE));
        assert_eq!(record.render(fields::BUDGET_TAX_EXCLUSIVE).as_deref(), Some("12000.5"));
        assert_eq!(
            record.render(fields::LOT_BUDGET_TAX_EXCLUSIVE).as_deref(),
            Some("12000.5")
        );
    }

    #[test]
    fn minor_procedure_tags_the_record_as_minor() {
        let record = CataloniaNormalizer::new(codes())
            .normalize(&row("Contracte menor"))
            .unwrap();
        assert_eq!(record.source, SourceTag::CataloniaMinor);
        assert!(is_minor_contract(&record));
    }

    #[test]
    fn csv_export_is_found_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let path = dir.path().join("contractacio_publica_catalunya.csv");
        fs::write(
            &path,
            "codi_expedient,objecte_contracte,numero_lot\nE-1,Obres de reforma,\nE-2,\"Neteja, edificis\",2\n",
        )
        .unwrap();

        let found = find_export(dir.path(), DEFAULT_FILE_FRAGMENT).unwrap();
        assert_eq!(found.as_deref(), Some(path.as_path()));

        let rows = load_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["numero_lot"], JsonValue::Null);
        assert_eq!(rows[1]["objecte_contracte"], json!("Neteja, edificis"));
    }
}
