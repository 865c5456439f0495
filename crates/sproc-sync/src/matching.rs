//! Composite match keys, per-key grouping of lot rows, and the baseline join.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use sproc_core::{fields, ContractRecord, FieldValue, Scalar};

pub const KEY_DELIMITER: char = '&';
pub const KEY_PREFIX_CHARS: usize = 50;

/// Fields that differ between the lot rows of one tender.
pub const GROUPED_FIELDS: &[&str] = &[
    fields::WINNER_ID,
    fields::WINNER_NAME,
    fields::AWARDED_TAX_EXCLUSIVE,
    fields::LOT_ID,
    fields::AWARDED_LOT_ID,
    fields::BUDGET_TAX_EXCLUSIVE,
    fields::LOT_BUDGET_TAX_EXCLUSIVE,
    fields::LOT_NAME,
    fields::RECEIVED_TENDER_QUANTITY,
];

/// Lower-cased `title[..50] & folder id & subentity code & party[..50]`.
/// Not unique: distinct contracts with colliding descriptive fields share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn from_parts(title: &str, folder_id: &str, subentity_code: &str, party_name: &str) -> Self {
        MatchIndexBuilder::default().key_from_parts(title, folder_id, subentity_code, party_name)
    }

    pub fn for_record(record: &ContractRecord) -> Self {
        MatchIndexBuilder::default().key(record)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives match keys. Missing key parts count as empty strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchIndexBuilder {
    prefix_chars: usize,
}

impl Default for MatchIndexBuilder {
    fn default() -> Self {
        Self {
            prefix_chars: KEY_PREFIX_CHARS,
        }
    }
}

impl MatchIndexBuilder {
    pub fn key_from_parts(
        &self,
        title: &str,
        folder_id: &str,
        subentity_code: &str,
        party_name: &str,
    ) -> MatchKey {
        let key = format!(
            "{}{d}{}{d}{}{d}{}",
            self.prefix(title),
            folder_id,
            subentity_code,
            self.prefix(party_name),
            d = KEY_DELIMITER
        );
        MatchKey(key.to_lowercase())
    }

    pub fn key(&self, record: &ContractRecord) -> MatchKey {
        self.key_from_parts(
            &component(record.get(fields::TITLE)),
            &component(record.get(fields::CONTRACT_FOLDER_ID)),
            &component(record.get(fields::COUNTRY_SUBENTITY_CODE)),
            &component(record.get(fields::PARTY_NAME)),
        )
    }

    pub fn index(&self, records: Vec<ContractRecord>) -> Vec<KeyedRecord> {
        records
            .into_iter()
            .map(|record| KeyedRecord {
                key: self.key(&record),
                record,
            })
            .collect()
    }

    fn prefix(&self, text: &str) -> String {
        text.chars().take(self.prefix_chars).collect()
    }
}

fn component(value: &FieldValue) -> String {
    value
        .first_scalar()
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub key: MatchKey,
    pub record: ContractRecord,
}

pub fn key_records(records: Vec<ContractRecord>) -> Vec<KeyedRecord> {
    MatchIndexBuilder::default().index(records)
}

/// For every key, give each row the ordered sequence of all values the key's
/// rows hold in `grouped`. Row count and order are unchanged.
pub fn group_by_key(mut rows: Vec<KeyedRecord>, grouped: &[&str]) -> Vec<KeyedRecord> {
    let mut members: HashMap<MatchKey, Vec<usize>> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        members.entry(row.key.clone()).or_default().push(index);
    }

    for indices in members.values() {
        for field in grouped {
            let sequence = indices
                .iter()
                .map(|&i| sequence_slot(rows[i].record.get(field)))
                .collect::<Vec<_>>();
            for &i in indices {
                rows[i]
                    .record
                    .set(*field, FieldValue::Sequence(sequence.clone()));
            }
        }
    }
    rows
}

fn sequence_slot(value: &FieldValue) -> Option<Scalar> {
    match value {
        FieldValue::Absent => None,
        FieldValue::Scalar(s) => Some(s.clone()),
        FieldValue::Sequence(_) => value.render().map(Scalar::Text),
    }
}

/// Keep the first row for each key.
pub fn dedup_by_key(rows: Vec<KeyedRecord>) -> Vec<KeyedRecord> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.key.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    /// Position of the baseline row in the baseline slice passed to [`link`].
    pub baseline_index: usize,
    pub baseline: ContractRecord,
    pub candidate: ContractRecord,
    pub key: MatchKey,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkOutcome {
    pub matched: Vec<MatchedPair>,
    pub unmatched: Vec<KeyedRecord>,
}

/// Prepares open-data batches and joins them against the baseline.
#[derive(Debug, Clone)]
pub struct RecordLinker {
    grouped_fields: Vec<&'static str>,
}

impl Default for RecordLinker {
    fn default() -> Self {
        Self::new(GROUPED_FIELDS.to_vec())
    }
}

impl RecordLinker {
    pub fn new(grouped_fields: Vec<&'static str>) -> Self {
        Self { grouped_fields }
    }

    /// Collapse lot rows: group the per-lot fields, then keep the first row per key.
    pub fn prepare(&self, rows: Vec<KeyedRecord>) -> Vec<KeyedRecord> {
        dedup_by_key(group_by_key(rows, &self.grouped_fields))
    }

    pub fn link(&self, baseline: &[KeyedRecord], candidates: Vec<KeyedRecord>) -> LinkOutcome {
        link(baseline, candidates)
    }
}

/// Inner join on the match key, enumerating every baseline/candidate pair that
/// shares a key, in baseline order. Candidates whose key no baseline row has
/// are returned as unmatched, in input order.
pub fn link(baseline: &[KeyedRecord], candidates: Vec<KeyedRecord>) -> LinkOutcome {
    let mut by_key: HashMap<&MatchKey, Vec<usize>> = HashMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        by_key.entry(&candidate.key).or_default().push(index);
    }

    let mut matched = Vec::new();
    let mut baseline_keys = HashSet::new();
    for (baseline_index, base) in baseline.iter().enumerate() {
        baseline_keys.insert(&base.key);
        if let Some(indices) = by_key.get(&base.key) {
            for &i in indices {
                matched.push(MatchedPair {
                    baseline_index,
                    baseline: base.record.clone(),
                    candidate: candidates[i].record.clone(),
                    key: base.key.clone(),
                });
            }
        }
    }

    let unmatched_mask = candidates
        .iter()
        .map(|c| !baseline_keys.contains(&c.key))
        .collect::<Vec<_>>();

    let unmatched = candidates
        .into_iter()
        .zip(unmatched_mask)
        .filter_map(|(candidate, keep)| keep.then_some(candidate))
        .collect();

    LinkOutcome { matched, unmatched }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sproc_core::SourceTag;

    fn contract(source: SourceTag, title: &str, folder: &str, nuts: &str, party: &str) -> ContractRecord {
        ContractRecord::new(source)
            .with_field(fields::TITLE, title)
            .with_field(fields::CONTRACT_FOLDER_ID, folder)
            .with_field(fields::COUNTRY_SUBENTITY_CODE, nuts)
            .with_field(fields::PARTY_NAME, party)
    }

    #[test]
    fn long_title_and_party_are_truncated_and_joined() {
        let title = format!("Suministro de material{}", "x".repeat(29));
        let party = format!("Ayuntamiento de Prueba{}", "y".repeat(29));
        assert_eq!(title.chars().count(), 51);
        assert_eq!(party.chars().count(), 51);

        let place = contract(SourceTag::Place, &title, "EXP-2021-004", "ES300", &party);
        let open = contract(SourceTag::CataloniaOutsider, &title, "EXP-2021-004", "ES300", &party);

        let expected = format!(
            "{}&exp-2021-004&es300&{}",
            title[..50].to_lowercase(),
            party[..50].to_lowercase()
        );
        assert_eq!(MatchKey::for_record(&open).as_str(), expected);
        assert_eq!(MatchKey::for_record(&open), MatchKey::for_record(&open));

        let outcome = link(&key_records(vec![place]), key_records(vec![open]));
        assert_eq!(outcome.matched.len(), 1);
        assert!(outcome.unmatched.is_empty());
        assert_eq!(outcome.matched[0].key.as_str(), expected);
    }

    #[test]
    fn keys_ignore_case_and_tolerate_missing_parts() {
        let a = contract(SourceTag::Place, "Obra Civil", "E1", "ES511", "Ajuntament");
        let b = contract(SourceTag::Place, "obra civil", "E1", "ES511", "AJUNTAMENT");
        assert_eq!(MatchKey::for_record(&a), MatchKey::for_record(&b));

        let sparse = ContractRecord::new(SourceTag::Place).with_field(fields::CONTRACT_FOLDER_ID, "E9");
        assert_eq!(MatchKey::for_record(&sparse).as_str(), "&e9&&");
    }

    #[test]
    fn grouping_collects_every_row_value_in_order() {
        let lot = |n: &str, winner: Option<&str>| {
            let mut record = contract(SourceTag::CataloniaOutsider, "Neteja", "E1", "ES511", "Ajuntament")
                .with_field(fields::LOT_ID, n);
            if let Some(w) = winner {
                record.set(fields::WINNER_NAME, w);
            }
            record
        };
        let other = contract(SourceTag::CataloniaOutsider, "Altre", "E2", "ES511", "Ajuntament")
            .with_field(fields::LOT_ID, "1");

        let rows = key_records(vec![lot("1", Some("A SL")), other, lot("2", None), lot("3", Some("C SA"))]);
        let grouped = group_by_key(rows, GROUPED_FIELDS);

        assert_eq!(grouped.len(), 4);
        let expected_lots = FieldValue::Sequence(vec![
            Some(Scalar::text("1")),
            Some(Scalar::text("2")),
            Some(Scalar::text("3")),
        ]);
        let expected_winners = FieldValue::Sequence(vec![
            Some(Scalar::text("A SL")),
            None,
            Some(Scalar::text("C SA")),
        ]);
        for i in [0, 2, 3] {
            assert_eq!(grouped[i].record.get(fields::LOT_ID), &expected_lots);
            assert_eq!(grouped[i].record.get(fields::WINNER_NAME), &expected_winners);
        }
        assert_eq!(
            grouped[1].record.get(fields::LOT_ID),
            &FieldValue::Sequence(vec![Some(Scalar::text("1"))])
        );

        let collapsed = dedup_by_key(grouped);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].record.get(fields::LOT_ID), &expected_lots);
    }

    #[test]
    fn linker_prepare_collapses_lots_to_one_row_per_key() {
        let rows = (1..=3)
            .map(|n| {
                contract(SourceTag::CataloniaOutsider, "Neteja", "E1", "ES511", "Ajuntament")
                    .with_field(fields::AWARDED_TAX_EXCLUSIVE, f64::from(n) * 100.0)
            })
            .collect::<Vec<_>>();
        let prepared = RecordLinker::default().prepare(key_records(rows));
        assert_eq!(prepared.len(), 1);
        assert_eq!(
            prepared[0].record.render(fields::AWARDED_TAX_EXCLUSIVE).as_deref(),
            Some("100.0, 200.0, 300.0")
        );
    }

    #[test]
    fn link_partitions_candidates_and_enumerates_all_pairs() {
        let base = key_records(vec![
            contract(SourceTag::Place, "A", "1", "ES5", "P"),
            contract(SourceTag::Place, "B", "2", "ES5", "P"),
            contract(SourceTag::Place, "A", "1", "ES5", "P"),
        ]);
        let candidates = key_records(vec![
            contract(SourceTag::CataloniaOutsider, "A", "1", "ES5", "P"),
            contract(SourceTag::CataloniaOutsider, "C", "3", "ES5", "P"),
            contract(SourceTag::CataloniaOutsider, "D", "4", "ES5", "P"),
        ]);
        let candidate_keys: HashSet<MatchKey> = candidates.iter().map(|c| c.key.clone()).collect();

        let outcome = link(&base, candidates);

        assert_eq!(outcome.matched.len(), 2);
        assert_eq!(
            outcome.matched.iter().map(|m| m.baseline_index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        let matched_keys: HashSet<MatchKey> = outcome.matched.iter().map(|m| m.key.clone()).collect();
        let unmatched_keys: HashSet<MatchKey> = outcome.unmatched.iter().map(|u| u.key.clone()).collect();
        assert!(matched_keys.is_disjoint(&unmatched_keys));
        assert_eq!(
            matched_keys.union(&unmatched_keys).cloned().collect::<HashSet<_>>(),
            candidate_keys
        );
        assert_eq!(outcome.unmatched.len(), 2);
    }
}
