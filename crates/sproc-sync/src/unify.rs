//! Column-shape unification ahead of columnar export.
//!
//! Records from different sources disagree on which fields hold lists. Before
//! writing, every column gets one shape: free-text columns become nullable
//! strings, everything else a nullable list of nullable strings.

use std::collections::BTreeSet;

use sproc_core::{fields, ContractRecord, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Sequence,
    Text,
}

/// Free-text columns; every other column is stored as a list.
pub const TEXT_FIELDS: &[&str] = &[
    fields::TITLE,
    fields::LINK,
    fields::SOURCE,
    fields::ERROR,
    fields::SUBMISSION_DEADLINE,
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

/// Never persisted.
pub const DROPPED_FIELDS: &[&str] = &[fields::TENDER_DOCUMENT_POINTER];

#[derive(Debug, Clone)]
pub struct SchemaPolicy {
    text_fields: BTreeSet<String>,
    dropped: BTreeSet<String>,
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self::new(TEXT_FIELDS, DROPPED_FIELDS)
    }
}

impl SchemaPolicy {
    pub fn new(text_fields: &[&str], dropped: &[&str]) -> Self {
        Self {
            text_fields: text_fields.iter().map(|f| f.to_string()).collect(),
            dropped: dropped.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn shape_for(&self, field: &str) -> FieldShape {
        if self.text_fields.contains(field) {
            FieldShape::Text
        } else {
            FieldShape::Sequence
        }
    }

    pub fn keeps(&self, field: &str) -> bool {
        !self.dropped.contains(field)
    }
}

/// Applies a [`SchemaPolicy`] to whole record sets.
#[derive(Debug, Clone, Default)]
pub struct SchemaUnifier {
    policy: SchemaPolicy,
}

impl SchemaUnifier {
    pub fn new(policy: SchemaPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SchemaPolicy {
        &self.policy
    }

    pub fn unify(&self, records: &[ContractRecord]) -> UnifiedTable {
        unify(records, &self.policy)
    }
}

pub type ListCell = Option<Vec<Option<String>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Sequence(Vec<ListCell>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(rows) => rows.len(),
            ColumnData::Sequence(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedColumn {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnifiedTable {
    pub columns: Vec<UnifiedColumn>,
    pub rows: usize,
}

impl UnifiedTable {
    pub fn column(&self, name: &str) -> Option<&UnifiedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Union of all record fields, `source` first, the rest by name. Null cells
/// stay null in both shapes.
pub fn unify(records: &[ContractRecord], policy: &SchemaPolicy) -> UnifiedTable {
    let names: BTreeSet<&str> = records
        .iter()
        .flat_map(ContractRecord::field_names)
        .filter(|name| *name != fields::SOURCE && policy.keeps(name))
        .collect();

    let mut columns = Vec::with_capacity(names.len() + 1);
    columns.push(UnifiedColumn {
        name: fields::SOURCE.to_string(),
        data: ColumnData::Text(
            records
                .iter()
                .map(|r| Some(r.source.as_str().to_string()))
                .collect(),
        ),
    });

    for name in names {
        let data = match policy.shape_for(name) {
            FieldShape::Text => {
                ColumnData::Text(records.iter().map(|r| text_cell(r.get(name))).collect())
            }
            FieldShape::Sequence => {
                ColumnData::Sequence(records.iter().map(|r| list_cell(r.get(name))).collect())
            }
        };
        columns.push(UnifiedColumn {
            name: name.to_string(),
            data,
        });
    }

    UnifiedTable {
        columns,
        rows: records.len(),
    }
}

fn text_cell(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Absent => None,
        FieldValue::Scalar(s) => Some(s.to_string()),
        FieldValue::Sequence(_) => value.render(),
    }
}

fn list_cell(value: &FieldValue) -> ListCell {
    match value {
        FieldValue::Absent => None,
        FieldValue::Scalar(s) => Some(vec![Some(s.to_string())]),
        FieldValue::Sequence(items) => Some(
            items
                .iter()
                .map(|item| item.as_ref().map(ToString::to_string))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sproc_core::{Scalar, SourceTag};

    #[test]
    fn scalars_are_wrapped_and_text_columns_flattened() {
        let place = ContractRecord::new(SourceTag::Place)
            .with_field(fields::TITLE, "Obra")
            .with_field(fields::WINNER_NAME, "ACME")
            .with_field(fields::BUDGET_TAX_EXCLUSIVE, 1500.0);
        let open = ContractRecord::new(SourceTag::CataloniaOutsider)
            .with_field(
                fields::WINNER_NAME,
                FieldValue::Sequence(vec![Some(Scalar::text("A")), None]),
            )
            .with_field(
                fields::LOT_AWARDING_CRITERIA_TYPE,
                FieldValue::Sequence(vec![Some(Scalar::text("Preu")), Some(Scalar::text("Qualitat"))]),
            )
            .with_field(fields::TENDER_DOCUMENT_POINTER, "{'url': 'https://x'}");

        let table = unify(&[place, open], &SchemaPolicy::default());

        assert_eq!(table.rows, 2);
        assert_eq!(table.columns[0].name, fields::SOURCE);
        assert!(table.column(fields::TENDER_DOCUMENT_POINTER).is_none());
        assert_eq!(
            table.column(fields::WINNER_NAME).unwrap().data,
            ColumnData::Sequence(vec![
                Some(vec![Some("ACME".to_string())]),
                Some(vec![Some("A".to_string()), None]),
            ])
        );
        assert_eq!(
            table.column(fields::BUDGET_TAX_EXCLUSIVE).unwrap().data,
            ColumnData::Sequence(vec![Some(vec![Some("1500.0".to_string())]), None])
        );
        assert_eq!(
            table.column(fields::TITLE).unwrap().data,
            ColumnData::Text(vec![Some("Obra".to_string()), None])
        );
        assert_eq!(
            table.column(fields::LOT_AWARDING_CRITERIA_TYPE).unwrap().data,
            ColumnData::Text(vec![None, Some("Preu, Qualitat".to_string())])
        );
    }

    #[test]
    fn every_column_has_one_cell_per_record() {
        let records = vec![
            ContractRecord::new(SourceTag::ZaragozaOpenData).with_field(fields::LINK, "https://z/1"),
            ContractRecord::new(SourceTag::MadridOpenData).with_field(fields::PARTY_NAME, "Ayto"),
            ContractRecord::new(SourceTag::Place),
        ];
        let table = SchemaUnifier::default().unify(&records);
        assert_eq!(table.columns.len(), 3);
        assert!(table.columns.iter().all(|c| c.data.len() == 3));
    }
}
