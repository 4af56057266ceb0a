use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::ledger::{SCORE_FILE_NAME, ScoreEntry, ScoreLedger};
use crate::schema::{ExtractionRecord, NormalizedTable, SchemaTag, normalize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewRow {
    pub record: ExtractionRecord,
    pub scores: ScoreEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewTable {
    pub file_name: String,
    pub schema: SchemaTag,
    pub rows: Vec<ReviewRow>,
}

/// Row selection by pattern and sentence type. An empty list admits every value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    pub patterns: Vec<String>,
    pub sentence_types: Vec<String>,
}

impl ReviewFilter {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.sentence_types.is_empty()
    }

    pub fn admits(&self, record: &ExtractionRecord) -> bool {
        let allowed = |wanted: &[String], value: &str| {
            wanted.is_empty() || wanted.iter().any(|candidate| candidate == value)
        };
        allowed(&self.patterns, record.pattern())
            && allowed(&self.sentence_types, record.sentence_type())
    }
}

impl ReviewTable {
    pub fn build(file_name: &str, table: &NormalizedTable, ledger: &ScoreLedger) -> Self {
        let rows = table
            .records
            .iter()
            .map(|record| ReviewRow {
                record: record.clone(),
                scores: ledger.entry(file_name, record.unique_id),
            })
            .collect();

        Self {
            file_name: file_name.to_string(),
            schema: table.schema,
            rows,
        }
    }

    /// Reads and normalizes an output file, then joins the ledger's scores.
    pub fn load(source: &Path, ledger: &ScoreLedger) -> Result<Self, CoreError> {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| CoreError::load(source, "not a file path"))?;
        let table = read_output_file(source)?;
        Ok(Self::build(&file_name, &table, ledger))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Indices into `rows` admitted by the filter, in file order.
    pub fn view(&self, filter: &ReviewFilter) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| filter.admits(&row.record))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn row(&self, unique_id: usize) -> Option<&ReviewRow> {
        self.rows.get(unique_id)
    }

    pub fn patterns(&self) -> Vec<&str> {
        distinct(self.rows.iter().map(|row| row.record.pattern()))
    }

    pub fn sentence_types(&self) -> Vec<&str> {
        distinct(self.rows.iter().map(|row| row.record.sentence_type()))
    }

    pub fn scored_count(&self) -> usize {
        self.rows.iter().filter(|row| row.scores.is_scored()).count()
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out = Vec::<&str>::new();
    for value in values {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

pub fn read_output_file(source: &Path) -> Result<NormalizedTable, CoreError> {
    let raw = fs::read(source).map_err(|err| CoreError::load(source, err))?;
    let parsed: Value = serde_json::from_slice(&raw).map_err(|err| CoreError::load(source, err))?;
    normalize(&parsed)
}

/// Sorted `.json` file names in the output directory, without the ledger.
pub fn list_output_files(output_dir: &Path) -> Result<Vec<String>, CoreError> {
    if !output_dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let entries = fs::read_dir(output_dir).map_err(|err| CoreError::load(output_dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| CoreError::load(output_dir, err))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name != SCORE_FILE_NAME {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ledger::RubricScore;

    fn v4_table() -> NormalizedTable {
        normalize(&json!([
            {"pattern_type": "Explicit", "sentence_type": "Single", "relationship": "rain -> flood", "source_text": "Rain caused floods."},
            {"pattern_type": "Implicit", "sentence_type": "Single", "relationship": "heat -> drought", "source_text": "Heat dried the land."},
            {"pattern_type": "Explicit", "sentence_type": "Multiple", "relationship": "wind -> damage", "source_text": "Wind damaged roofs."}
        ]))
        .unwrap()
    }

    #[test]
    fn build_joins_scores_by_position() {
        let mut ledger = ScoreLedger::default();
        ledger.upsert(
            "response_1.json",
            1,
            ScoreEntry {
                semantic_fidelity: RubricScore::new(4),
                ..ScoreEntry::default()
            },
        );
        ledger.upsert(
            "other.json",
            0,
            ScoreEntry {
                semantic_fidelity: RubricScore::new(1),
                ..ScoreEntry::default()
            },
        );

        let review = ReviewTable::build("response_1.json", &v4_table(), &ledger);
        assert_eq!(review.len(), 3);
        assert!(!review.rows[0].scores.is_scored());
        assert_eq!(review.rows[1].scores.semantic_fidelity, RubricScore::new(4));
        assert_eq!(review.scored_count(), 1);
    }

    #[test]
    fn filter_combines_pattern_and_sentence_type() {
        let review = ReviewTable::build("f.json", &v4_table(), &ScoreLedger::default());

        assert_eq!(review.view(&ReviewFilter::default()), vec![0, 1, 2]);

        let explicit = ReviewFilter {
            patterns: vec!["Explicit".to_string()],
            sentence_types: Vec::new(),
        };
        assert_eq!(review.view(&explicit), vec![0, 2]);

        let explicit_single = ReviewFilter {
            patterns: vec!["Explicit".to_string()],
            sentence_types: vec!["Single".to_string()],
        };
        assert_eq!(review.view(&explicit_single), vec![0]);
    }

    #[test]
    fn v3_rows_filter_on_pattern_and_causal_type() {
        let table = normalize(&json!([
            ["Explicit", "Intra", "a -> b", "", "a", "A causes b."],
            ["Implicit", "Inter", "c -> d", "", "c", "C then d."]
        ]))
        .unwrap();
        let review = ReviewTable::build("v3.json", &table, &ScoreLedger::default());

        let filter = ReviewFilter {
            patterns: Vec::new(),
            sentence_types: vec!["Inter".to_string()],
        };
        assert_eq!(review.view(&filter), vec![1]);
        assert_eq!(review.patterns(), vec!["Explicit", "Implicit"]);
    }

    #[test]
    fn listing_skips_ledger_and_non_json_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("response_b.json"), "[]").unwrap();
        fs::write(dir.path().join("response_a.json"), "[]").unwrap();
        fs::write(dir.path().join(SCORE_FILE_NAME), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("clusters")).unwrap();

        assert_eq!(
            list_output_files(dir.path()).unwrap(),
            vec!["response_a.json", "response_b.json"]
        );
        assert!(list_output_files(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn load_reports_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"not": "a list"}"#).unwrap();

        assert!(matches!(
            ReviewTable::load(&path, &ScoreLedger::default()),
            Err(CoreError::UnsupportedShape(_))
        ));
    }
}
