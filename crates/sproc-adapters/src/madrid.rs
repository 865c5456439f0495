//! Madrid minor-contract activity workbooks. Three header layouts are in use
//! depending on the year of the export, selected by file name.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Map, Number, Value as JsonValue};
use sproc_core::{fields, ContractRecord, SourceTag};

use crate::codes::{CodeMapper, CONTRACT_TYPE_ES};
use crate::transform::ValueTransform::{Code, Date, Decimal, EuroAmount, SmeFlag};
use crate::{FieldRule, NormalizeError, SourceMapping, SourceNormalizer};

pub const SOURCE_ID: &str = "madrid-opendata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MadridLayout {
    /// 2021 onwards (`300253-21`, `-19`, `-17`, `-15`).
    Current,
    /// `300253-13`.
    Transitional,
    /// 2018 to 2020 (`300253-11`, `-9`, `-1`).
    Legacy,
}

const CURRENT_RULES: &[FieldRule] = &[
    FieldRule::keep(&["N. DE EXPEDIENTE"], fields::CONTRACT_FOLDER_ID),
    FieldRule::keep(&["ORGANO DE CONTRATACION"], fields::PARTY_NAME),
    FieldRule::keep(&["OBJETO DEL CONTRATO"], fields::PROJECT_NAME),
    FieldRule::new(&["TIPO DE CONTRATO"], fields::TYPE_CODE, Code(CONTRACT_TYPE_ES)),
    FieldRule::new(&["IMPORTE LICITACION IVA INC."], fields::BUDGET_TOTAL, EuroAmount),
    FieldRule::new(&["N. LICITADORES PARTICIPANTES"], fields::RECEIVED_TENDER_QUANTITY, Decimal),
    FieldRule::keep(&["NIF ADJUDICATARIO"], fields::WINNER_ID),
    FieldRule::keep(&["RAZON SOCIAL ADJUDICATARIO"], fields::WINNER_NAME),
    FieldRule::new(&["PYME"], fields::SME_AWARDED, SmeFlag),
    FieldRule::new(&["IMPORTE ADJUDICACION IVA INC."], fields::AWARDED_PAYABLE, EuroAmount),
    FieldRule::new(&["FECHA DE ADJUDICACION"], fields::AWARD_DATE, Date),
    FieldRule::new(&["PLAZO"], fields::DURATION, Decimal),
];

const TRANSITIONAL_RULES: &[FieldRule] = &[
    FieldRule::keep(&["EXPEDIENTE"], fields::CONTRACT_FOLDER_ID),
    FieldRule::keep(&["ORG_CONTRATACIÓN"], fields::PARTY_NAME),
    FieldRule::keep(&["OBJETO"], fields::PROJECT_NAME),
    FieldRule::new(&["TIPO_CONTRATO"], fields::TYPE_CODE, Code(CONTRACT_TYPE_ES)),
    FieldRule::keep(&["CIF"], fields::WINNER_ID),
    FieldRule::keep(&["RAZÓN_SOCIAL"], fields::WINNER_NAME),
    FieldRule::new(&["IMPORTE"], fields::AWARDED_PAYABLE, Decimal),
    FieldRule::new(&["F_APROBACIÓN"], fields::AWARD_DATE, Date),
    FieldRule::new(&["PLAZO"], fields::DURATION, Decimal),
];

const LEGACY_RULES: &[FieldRule] = &[
    FieldRule::keep(&["NUMERO EXPEDIENTE"], fields::CONTRACT_FOLDER_ID),
    FieldRule::keep(&["ORG.CONTRATACION"], fields::PARTY_NAME),
    FieldRule::keep(&["OBJETO DEL CONTRATO"], fields::PROJECT_NAME),
    FieldRule::new(&["TIPO DE CONTRATO"], fields::TYPE_CODE, Code(CONTRACT_TYPE_ES)),
    FieldRule::keep(&["CONTRATISTA"], fields::WINNER_NAME),
    FieldRule::keep(&["RAZON SOCIAL ADJUDICATARIO"], fields::WINNER_NAME),
    FieldRule::keep(&["N.I.F"], fields::WINNER_ID),
    FieldRule::new(&["IMPORTE"], fields::AWARDED_PAYABLE, Decimal),
    FieldRule::new(&["FECHA APROBACION"], fields::AWARD_DATE, Date),
    FieldRule::new(&["PLAZO"], fields::DURATION, Decimal),
];

impl MadridLayout {
    pub fn mapping(self) -> SourceMapping {
        match self {
            MadridLayout::Current => SourceMapping {
                rules: CURRENT_RULES,
                required: &["N. DE EXPEDIENTE"],
            },
            MadridLayout::Transitional => SourceMapping {
                rules: TRANSITIONAL_RULES,
                required: &["EXPEDIENTE"],
            },
            MadridLayout::Legacy => SourceMapping {
                rules: LEGACY_RULES,
                required: &["NUMERO EXPEDIENTE"],
            },
        }
    }
}

/// One expected workbook and where its header row sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MadridWorkbook {
    pub file_name: &'static str,
    pub layout: MadridLayout,
    /// Leading sheet rows before the header.
    pub skip_rows: usize,
    /// Zero-based column where the table starts.
    pub first_column: usize,
}

impl MadridWorkbook {
    const fn new(file_name: &'static str, layout: MadridLayout) -> Self {
        Self {
            file_name,
            layout,
            skip_rows: 0,
            first_column: 0,
        }
    }
}

pub const WORKBOOKS: &[MadridWorkbook] = &[
    MadridWorkbook::new("300253-21-contratos-actividad-menores.xlsx", MadridLayout::Current),
    MadridWorkbook {
        skip_rows: 5,
        first_column: 1,
        ..MadridWorkbook::new("300253-19-contratos-actividad-menores.xlsx", MadridLayout::Current)
    },
    MadridWorkbook::new("300253-17-contratos-actividad-menores.xlsx", MadridLayout::Current),
    MadridWorkbook::new("300253-15-contratos-actividad-menores.xlsx", MadridLayout::Current),
    MadridWorkbook::new("300253-13-contratos-actividad-menores.xlsx", MadridLayout::Transitional),
    MadridWorkbook::new("300253-11-contratos-actividad-menores.xlsx", MadridLayout::Legacy),
    MadridWorkbook::new("300253-9-contratos-actividad-menores.xlsx", MadridLayout::Legacy),
    MadridWorkbook::new("300253-1-contratos-actividad-menores.xlsx", MadridLayout::Legacy),
];

pub fn workbook_for_file(file_name: &str) -> Option<&'static MadridWorkbook> {
    WORKBOOKS.iter().find(|w| w.file_name == file_name)
}

fn cell_to_json(cell: &Data) -> JsonValue {
    match cell {
        Data::Empty | Data::Error(_) => JsonValue::Null,
        Data::String(s) => JsonValue::String(s.clone()),
        Data::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        Data::Int(i) => JsonValue::Number((*i).into()),
        Data::Bool(b) => JsonValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => JsonValue::String(naive.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => Number::from_f64(dt.as_f64()).map_or(JsonValue::Null, JsonValue::Number),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => JsonValue::String(s.clone()),
    }
}

fn header_name(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Read the first sheet of a workbook into one JSON object per data row, keyed
/// by the trimmed header names. Fully empty rows are skipped.
pub fn load_workbook(path: &Path, workbook: &MadridWorkbook) -> Result<Vec<JsonValue>> {
    let mut sheets = open_workbook_auto(path)
        .with_context(|| format!("opening Madrid workbook {}", path.display()))?;
    let range = sheets
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook {} has no sheets", path.display()))?
        .with_context(|| format!("reading first sheet of {}", path.display()))?;

    let (row_origin, col_origin) = range
        .start()
        .map_or((0usize, 0usize), |(r, c)| (r as usize, c as usize));
    let column_skip = workbook.first_column.saturating_sub(col_origin);
    let row_skip = workbook.skip_rows.saturating_sub(row_origin);

    let mut rows = range.rows().skip(row_skip);
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row.iter().skip(column_skip).map(header_name).collect();

    let mut out = Vec::new();
    for row in rows {
        let mut object = Map::new();
        for (header, cell) in headers.iter().zip(row.iter().skip(column_skip)) {
            if header.is_empty() {
                continue;
            }
            object.insert(header.clone(), cell_to_json(cell));
        }
        if object.values().all(JsonValue::is_null) {
            continue;
        }
        out.push(JsonValue::Object(object));
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct MadridNormalizer {
    mapping: SourceMapping,
    codes: Arc<CodeMapper>,
}

impl MadridNormalizer {
    pub fn new(layout: MadridLayout, codes: Arc<CodeMapper>) -> Self {
        Self {
            mapping: layout.mapping(),
            codes,
        }
    }
}

impl SourceNormalizer for MadridNormalizer {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn normalize(&self, raw: &JsonValue) -> Result<ContractRecord, NormalizeError> {
        self.mapping
            .apply(SOURCE_ID, SourceTag::MadridOpenData, raw, &self.codes)
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
  contract_type_es:
    "Suministros": 1
    "SERVICIOS": 2
    "Otros": 999
"#;
        Arc::new(CodeMapper::new(
            CodeTables::from_yaml_str(yaml, Path::new("inline")).unwrap(),
        ))
    }

    #[test]
    fn current_layout_parses_amounts_flags_and_dates() {
        let row = json!({
            "N. DE EXPEDIENTE": "300/2023/00012",
            "ORGANO DE CONTRATACION": "Área de Gobierno de Hacienda",
            "OBJETO DEL CONTRATO": "Suministro de tóner",
            "TIPO DE CONTRATO": "Suministros",
            "IMPORTE LICITACION IVA INC.": "1.234,56 €",
            "N. LICITADORES PARTICIPANTES": 2,
            "NIF ADJUDICATARIO": "B28000000",
            "RAZON SOCIAL ADJUDICATARIO": "Oficina SA",
            "PYME": "SI",
            "IMPORTE ADJUDICACION IVA INC.": 1100.5,
            "FECHA DE ADJUDICACION": "2023-04-05T00:00:00",
            "PLAZO": "3,5"
        });
        let record = MadridNormalizer::new(MadridLayout::Current, codes())
            .normalize(&row)
            .unwrap();

        assert_eq!(record.source, SourceTag::MadridOpenData);
        assert_eq!(record.render(fields::TYPE_CODE).as_deref(), Some("1.0"));
        assert_eq!(record.render(fields::BUDGET_TOTAL).as_deref(), Some("1234.56"));
        assert_eq!(record.render(fields::RECEIVED_TENDER_QUANTITY).as_deref(), Some("2.0"));
        assert_eq!(record.render(fields::SME_AWARDED).as_deref(), Some("true"));
        assert_eq!(record.render(fields::AWARDED_PAYABLE).as_deref(), Some("1100.5"));
        assert_eq!(record.render(fields::AWARD_DATE).as_deref(), Some("2023-04-05"));
        assert_eq!(record.render(fields::DURATION).as_deref(), Some("3.5"));
    }

    #[test]
    fn legacy_layout_accepts_either_winner_column() {
        let row = json!({
            "NUMERO EXPEDIENTE": "135/2019/0001",
            "ORG.CONTRATACION": "Distrito Centro",
            "TIPO DE CONTRATO": "SERVICIOS",
            "CONTRATISTA": null,
            "RAZON SOCIAL ADJUDICATARIO": "Limpiezas SL",
            "FECHA APROBACION": "2019-06-01T00:00:00"
        });
        let record = MadridNormalizer::new(MadridLayout::Legacy, codes())
            .normalize(&row)
            .unwrap();
        assert_eq!(record.render(fields::WINNER_NAME).as_deref(), Some("Limpiezas SL"));
        assert_eq!(record.render(fields::AWARD_DATE).as_deref(), Some("2019-06-01"));
        assert_eq!(record.render(fields::TYPE_CODE).as_deref(), Some("2.0"));
        assert!(record.get(fields::SME_AWARDED).is_absent());
    }

    #[test]
    fn unknown_contract_type_passes_through() {
        let row = json!({"EXPEDIENTE": "1", "TIPO_CONTRATO": "Mixto"});
        let record = MadridNormalizer::new(MadridLayout::Transitional, codes())
            .normalize(&row)
            .unwrap();
        assert_eq!(record.render(fields::TYPE_CODE).as_deref(), Some("Mixto"));
    }

    #[test]
    fn workbooks_resolve_by_file_name() {
        let offset = workbook_for_file("300253-19-contratos-actividad-menores.xlsx").unwrap();
        assert_eq!(offset.layout, MadridLayout::Current);
        assert_eq!((offset.skip_rows, offset.first_column), (5, 1));
        assert_eq!(
            workbook_for_file("300253-13-contratos-actividad-menores.xlsx").map(|w| w.layout),
            Some(MadridLayout::Transitional)
        );
        assert!(workbook_for_file("other.xlsx").is_none());
    }

    #[test]
    fn missing_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_workbook(&dir.path().join("absent.xlsx"), &WORKBOOKS[0]).unwrap_err();
        assert!(err.to_string().contains("opening Madrid workbook"));
    }
}
