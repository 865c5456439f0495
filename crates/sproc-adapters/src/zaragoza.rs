//! Zaragoza open-data contracts: a JSON array of nested contract objects.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sproc_core::{fields, ContractRecord, FieldValue, SourceTag};

use crate::codes::{CodeMapper, STATUS_ID, STATUS_TITLE};
use crate::transform::ValueTransform::{Code, Date, Decimal, Timestamp};
use crate::{partition_by_discriminant, FieldRule, NormalizeError, SourceMapping, SourceNormalizer};

pub const SOURCE_ID: &str = "zaragoza-opendata";
pub const DEFAULT_INPUT_FILE: &str = "contratos_menores_zaragoza.json";

const TECHNICAL_ANNOUNCEMENT_TYPE: &str = "3";
const LEGAL_ANNOUNCEMENT_TYPE: &str = "4";

pub const RULES: &[FieldRule] = &[
    FieldRule::keep(&["url"], fields::LINK),
    FieldRule::keep(&["title"], fields::TITLE),
    FieldRule::keep(&["expediente"], fields::CONTRACT_FOLDER_ID),
    FieldRule::keep(&["organoContratante", "dir3"], fields::PARTY_ID),
    FieldRule::keep(&["organoContratante", "title"], fields::PARTY_NAME),
    FieldRule::keep(&["organoContratante", "address", "locality"], fields::CITY_NAME),
    FieldRule::keep(&["organoContratante", "postal_code"], fields::POSTAL_ZONE),
    FieldRule::new(&["cpv", "id"], fields::CPV_CODE, Decimal),
    FieldRule::keep(&["type", "id"], fields::TYPE_CODE),
    FieldRule::keep(&["importeConIVA"], fields::BUDGET_TOTAL),
    FieldRule::keep(&["importeSinIVA"], fields::BUDGET_TAX_EXCLUSIVE),
    FieldRule::keep(&["servicio", "address", "locality"], fields::COUNTRY_SUBENTITY),
    FieldRule::keep(&["servicio", "address", "countryName"], fields::COUNTRY_NAME),
    FieldRule::keep(&["duracion"], fields::DURATION),
    FieldRule::new(&["status", "title"], fields::STATUS_CODE, Code(STATUS_TITLE)),
    FieldRule::new(&["status", "id"], fields::RESULT_CODE, Code(STATUS_ID)),
    FieldRule::new(&["fechaContrato"], fields::CONTRACT_ISSUE_DATE, Date),
    FieldRule::new(&["numLicitadores"], fields::RECEIVED_TENDER_QUANTITY, Decimal),
    FieldRule::keep(&["ofertas", "empresa", "nif"], fields::WINNER_ID),
    FieldRule::keep(&["ofertas", "empresa", "nombre"], fields::WINNER_NAME),
    FieldRule::new(&["ofertas", "importeSinIVA"], fields::AWARDED_TAX_EXCLUSIVE, Decimal),
    FieldRule::new(&["ofertas", "importeConIVA"], fields::AWARDED_PAYABLE, Decimal),
    FieldRule::new(&["pubDate"], fields::NOTICE_ISSUE_DATE, Date),
    FieldRule::new(&["procedimiento", "id"], fields::PROCEDURE_CODE, Decimal),
    FieldRule::keep(&["criterios", "tipo", "title"], fields::AWARDING_CRITERIA_TYPE),
    FieldRule::keep(&["criterios", "title"], fields::AWARDING_CRITERIA_DESCRIPTION),
    FieldRule::keep(&["criterios", "peso"], fields::AWARDING_CRITERIA_WEIGHT),
    FieldRule::keep(&["valorEstimado"], fields::BUDGET_ESTIMATED),
    FieldRule::keep(&["entity", "title"], fields::PARENT_PARTY_NAME),
    FieldRule::new(&["fechaPresentacion"], fields::SUBMISSION_DEADLINE, Timestamp),
    FieldRule::new(&["lastUpdated"], fields::UPDATED, Date),
];

pub const MAPPING: SourceMapping = SourceMapping {
    rules: RULES,
    required: &["expediente"],
};

pub fn load_contracts(path: &Path) -> Result<Vec<JsonValue>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading Zaragoza export {}", path.display()))?;
    let rows: Vec<JsonValue> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing Zaragoza export {}", path.display()))?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct ZaragozaNormalizer {
    mapping: SourceMapping,
    codes: Arc<CodeMapper>,
}

impl ZaragozaNormalizer {
    pub fn new(codes: Arc<CodeMapper>) -> Self {
        Self::with_mapping(MAPPING, codes)
    }

    pub fn with_mapping(mapping: SourceMapping, codes: Arc<CodeMapper>) -> Self {
        Self { mapping, codes }
    }
}

impl SourceNormalizer for ZaragozaNormalizer {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn normalize(&self, raw: &JsonValue) -> Result<ContractRecord, NormalizeError> {
        let mut record =
            self.mapping
                .apply(SOURCE_ID, SourceTag::ZaragozaOpenData, raw, &self.codes)?;

        let announcements = raw.get("anuncios").unwrap_or(&JsonValue::Null);
        let mut technical = FieldValue::Absent;
        let mut legal = FieldValue::Absent;
        for (kind, uris) in partition_by_discriminant(announcements, &["type", "id"], &["uri"], ", ")
        {
            match kind.as_str() {
                TECHNICAL_ANNOUNCEMENT_TYPE => technical = FieldValue::text(uris),
                LEGAL_ANNOUNCEMENT_TYPE => legal = FieldValue::text(uris),
                _ => {}
            }
        }
        record.set(fields::TECHNICAL_DOCUMENT_URI, technical);
        record.set(fields::LEGAL_DOCUMENT_URI, legal);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeTables;
    use serde_json::json;
    use sproc_core::Scalar;

    fn normalizer() -> ZaragozaNormalizer {
        let tables = CodeTables {
            version: 1,
            tables: [
                (
                    STATUS_ID.to_string(),
                    crate::CodeTable::from_entries([("1", None), ("7", Some(Scalar::Number(3.0)))]),
                ),
                (
                    STATUS_TITLE.to_string(),
                    crate::CodeTable::from_entries([("Contrato Formalizado", Some(Scalar::text("RES")))]),
                ),
            ]
            .into_iter()
            .collect(),
        };
        ZaragozaNormalizer::new(Arc::new(CodeMapper::new(tables)))
    }

    fn contract() -> JsonValue {
        json!({
            "id": 9001,
            "url": "https://www.zaragoza.es/sede/servicio/contratacion-publica/9001",
            "title": "Suministro de vestuario",
            "expediente": "0001234-21",
            "organoContratante": {
                "dir3": "L01502973",
                "title": "Ayuntamiento de Zaragoza",
                "postal_code": "50001",
                "address": {"locality": "Zaragoza"}
            },
            "servicio": {"address": {"locality": "Aragón", "countryName": "España"}},
            "cpv": [{"id": "18100000", "titulo": "Ropa"}],
            "type": {"id": 1, "title": "Suministros"},
            "status": {"id": 7, "title": "Contrato Formalizado"},
            "procedimiento": {"id": 6, "nombre": "Menor"},
            "fechaContrato": "12/03/2021",
            "pubDate": "2021-03-01T09:00:00",
            "fechaPresentacion": "2021-02-20T14:00:00",
            "lastUpdated": "2021-03-15T08:30:00",
            "numLicitadores": 3,
            "ofertas": [{"importeSinIVA": 1000, "importeConIVA": 1210, "empresa": {"nif": "B50000000", "nombre": "Textil SL"}}],
            "anuncios": [
                {"type": {"id": 3}, "uri": "https://z/pliego-tecnico.pdf"},
                {"type": {"id": 4}, "uri": "https://z/pliego-admin.pdf"},
                {"type": {"id": 4}, "uri": "https://z/anexo.pdf"}
            ]
        })
    }

    #[test]
    fn nested_contract_flattens_into_canonical_fields() {
        let record = normalizer().normalize(&contract()).unwrap();

        assert_eq!(record.source, SourceTag::ZaragozaOpenData);
        assert_eq!(record.render(fields::CONTRACT_FOLDER_ID).as_deref(), Some("0001234-21"));
        assert_eq!(record.render(fields::PARTY_ID).as_deref(), Some("L01502973"));
        assert_eq!(record.render(fields::CITY_NAME).as_deref(), Some("Zaragoza"));
        assert_eq!(record.render(fields::CPV_CODE).as_deref(), Some("18100000.0"));
        assert_eq!(record.render(fields::WINNER_NAME).as_deref(), Some("Textil SL"));
        assert_eq!(record.render(fields::RECEIVED_TENDER_QUANTITY).as_deref(), Some("3.0"));
        assert_eq!(record.render(fields::PROCEDURE_CODE).as_deref(), Some("6.0"));
        assert_eq!(record.render(fields::CONTRACT_ISSUE_DATE).as_deref(), Some("2021-03-12"));
        assert_eq!(record.render(fields::NOTICE_ISSUE_DATE).as_deref(), Some("2021-03-01"));
        assert_eq!(record.render(fields::UPDATED).as_deref(), Some("2021-03-15"));
        assert_eq!(
            record.render(fields::SUBMISSION_DEADLINE).as_deref(),
            Some("2021-02-20T14:00:00+00:00")
        );
    }

    #[test]
    fn status_vocabularies_translate_through_code_tables() {
        let record = normalizer().normalize(&contract()).unwrap();
        assert_eq!(record.render(fields::STATUS_CODE).as_deref(), Some("RES"));
        assert_eq!(record.render(fields::RESULT_CODE).as_deref(), Some("3.0"));

        let mut raw = contract();
        raw["status"] = json!({"id": 1, "title": "Estado nuevo"});
        let record = normalizer().normalize(&raw).unwrap();
        assert!(record.get(fields::RESULT_CODE).is_absent());
        assert_eq!(record.render(fields::STATUS_CODE).as_deref(), Some("Estado nuevo"));
    }

    #[test]
    fn announcements_split_into_document_uris() {
        let record = normalizer().normalize(&contract()).unwrap();
        assert_eq!(
            record.render(fields::TECHNICAL_DOCUMENT_URI).as_deref(),
            Some("https://z/pliego-tecnico.pdf")
        );
        assert_eq!(
            record.render(fields::LEGAL_DOCUMENT_URI).as_deref(),
            Some("https://z/pliego-admin.pdf, https://z/anexo.pdf")
        );
    }

    #[test]
    fn sparse_contract_is_not_an_error_but_missing_expediente_is() {
        let record = normalizer()
            .normalize(&json!({"expediente": "X-1", "title": "Obra"}))
            .unwrap();
        assert!(record.get(fields::WINNER_ID).is_absent());
        assert!(record.get(fields::LEGAL_DOCUMENT_URI).is_absent());

        let err = normalizer().normalize(&json!({"title": "Obra"})).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingRequiredField { .. }));
    }
}
