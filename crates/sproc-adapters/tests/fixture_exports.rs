use std::path::{Path, PathBuf};
use std::sync::Arc;

use sproc_adapters::codes::{CodeTables, CONTRACT_TYPE_CA, STATUS_ID, STATUS_TITLE};
use sproc_adapters::{catalonia, zaragoza, CataloniaNormalizer, CodeMapper, NormalizeError, SourceNormalizer, ZaragozaNormalizer};
use sproc_core::{fields, SourceTag};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn codes() -> Arc<CodeMapper> {
    let tables = CodeTables::load(&workspace_root().join("rules/code_tables.yaml")).unwrap();
    Arc::new(CodeMapper::new(tables))
}

#[test]
fn shipped_code_tables_cover_every_vocabulary() {
    let tables = CodeTables::load(&workspace_root().join("rules/code_tables.yaml")).unwrap();
    assert_eq!(tables.version, 1);
    assert_eq!(tables.table(STATUS_TITLE).map(|t| t.len()), Some(15));
    assert_eq!(tables.table(STATUS_ID).map(|t| t.len()), Some(15));
    assert!(tables.table(CONTRACT_TYPE_CA).is_some_and(|t| !t.is_empty()));
}

#[test]
fn zaragoza_fixture_normalizes_and_rejects_rows_without_expediente() {
    let rows = zaragoza::load_contracts(
        &workspace_root().join("fixtures/input").join(zaragoza::DEFAULT_INPUT_FILE),
    )
    .unwrap();
    assert_eq!(rows.len(), 3);

    let batch = ZaragozaNormalizer::new(codes()).normalize_all(&rows);
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.rejected.len(), 1);
    assert_eq!(batch.rejected[0].0, 2);
    assert!(matches!(batch.rejected[0].1, NormalizeError::MissingRequiredField { .. }));

    let first = &batch.records[0];
    assert_eq!(first.source, SourceTag::ZaragozaOpenData);
    assert_eq!(first.render(fields::STATUS_CODE).as_deref(), Some("RES"));
    assert_eq!(first.render(fields::RESULT_CODE).as_deref(), Some("3.0"));
    assert_eq!(first.render(fields::WINNER_ID).as_deref(), Some("B50000001"));
    assert_eq!(
        first.render(fields::LEGAL_DOCUMENT_URI).as_deref(),
        Some("https://www.zaragoza.es/pliego-admin-9001.pdf")
    );

    let second = &batch.records[1];
    assert_eq!(second.render(fields::STATUS_CODE).as_deref(), Some("PUB"));
    assert_eq!(second.render(fields::RESULT_CODE).as_deref(), Some("1.0"));
    assert!(second.get(fields::WINNER_ID).is_absent());
}

#[test]
fn catalonia_fixture_splits_minors_from_outsiders_and_keeps_blank_ids() {
    let input = workspace_root().join("fixtures/input");
    let path = catalonia::find_export(&input, catalonia::DEFAULT_FILE_FRAGMENT)
        .unwrap()
        .expect("fixture export present");
    let rows = catalonia::load_rows(&path).unwrap();
    assert_eq!(rows.len(), 5);

    let batch = CataloniaNormalizer::new(codes()).normalize_all(&rows);
    assert_eq!(batch.records.len(), 5);
    assert!(batch.rejected.is_empty());

    // blank case number: kept, with the folder id left absent
    let unnumbered = &batch.records[4];
    assert_eq!(unnumbered.source, SourceTag::CataloniaOutsider);
    assert!(unnumbered.get(fields::CONTRACT_FOLDER_ID).is_absent());
    assert_eq!(unnumbered.render(fields::TITLE).as_deref(), Some("Fila sense expedient"));

    let minors: Vec<_> = batch
        .records
        .iter()
        .filter(|r| catalonia::is_minor_contract(r))
        .collect();
    assert_eq!(minors.len(), 1);
    assert_eq!(minors[0].source, SourceTag::CataloniaMinor);
    assert_eq!(minors[0].render(fields::TYPE_CODE).as_deref(), Some("1.0"));
    assert_eq!(minors[0].render(fields::DURATION).as_deref(), Some("60.0"));

    let lot = &batch.records[0];
    assert_eq!(lot.source, SourceTag::CataloniaOutsider);
    assert_eq!(lot.render(fields::URGENCY_CODE).as_deref(), Some("1.0"));
    assert_eq!(lot.render(fields::AWARDED_TAX_EXCLUSIVE).as_deref(), Some("10000.0"));
    assert_eq!(
        lot.render(fields::LINK).as_deref(),
        Some("https://contractaciopublica.cat/ca/detall-publicacio/77")
    );
}
