use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::util::write_json_pretty;

pub const SCORE_FILE_NAME: &str = "validation_scores.json";

/// An ordinal rubric rating in `1..=5`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct RubricScore(u8);

impl RubricScore {
    pub fn new(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(Self(value))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u8>().ok().and_then(Self::new)
    }

    #[cfg(test)]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RubricScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rubric {
    SemanticFidelity,
    SchemaAccuracy,
    ExplicitAccuracy,
    StructuralIntegrity,
}

impl Rubric {
    pub const ALL: [Rubric; 4] = [
        Rubric::SemanticFidelity,
        Rubric::SchemaAccuracy,
        Rubric::ExplicitAccuracy,
        Rubric::StructuralIntegrity,
    ];

    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::SemanticFidelity => "SF",
            Self::SchemaAccuracy => "SA",
            Self::ExplicitAccuracy => "EA",
            Self::StructuralIntegrity => "SI",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SemanticFidelity => "Semantic Fidelity",
            Self::SchemaAccuracy => "Schema Accuracy",
            Self::ExplicitAccuracy => "Explicit Type Accuracy",
            Self::StructuralIntegrity => "Structural Integrity",
        }
    }

    pub fn from_abbreviation(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|rubric| rubric.abbreviation().eq_ignore_ascii_case(raw.trim()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreEntry {
    pub semantic_fidelity: Option<RubricScore>,
    pub schema_accuracy: Option<RubricScore>,
    pub explicit_accuracy: Option<RubricScore>,
    pub structural_integrity: Option<RubricScore>,
    pub notes: String,
}

impl ScoreEntry {
    pub fn score(&self, rubric: Rubric) -> Option<RubricScore> {
        match rubric {
            Rubric::SemanticFidelity => self.semantic_fidelity,
            Rubric::SchemaAccuracy => self.schema_accuracy,
            Rubric::ExplicitAccuracy => self.explicit_accuracy,
            Rubric::StructuralIntegrity => self.structural_integrity,
        }
    }

    pub fn set_score(&mut self, rubric: Rubric, score: Option<RubricScore>) {
        let slot = match rubric {
            Rubric::SemanticFidelity => &mut self.semantic_fidelity,
            Rubric::SchemaAccuracy => &mut self.schema_accuracy,
            Rubric::ExplicitAccuracy => &mut self.explicit_accuracy,
            Rubric::StructuralIntegrity => &mut self.structural_integrity,
        };
        *slot = score;
    }

    pub fn is_scored(&self) -> bool {
        Rubric::ALL.iter().any(|rubric| self.score(*rubric).is_some())
    }

    /// `SF: 5 | SA: - | EA: 3 | SI: -`
    pub fn summary(&self) -> String {
        Rubric::ALL
            .iter()
            .map(|rubric| {
                let value = self
                    .score(*rubric)
                    .map(|score| score.to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!("{}: {}", rubric.abbreviation(), value)
            })
            .collect::<Vec<String>>()
            .join(" | ")
    }
}

/// On-disk form of the current entry shape; scores are kept as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredRubricEntry {
    #[serde(default)]
    semantic_fidelity: Value,
    #[serde(default)]
    schema_accuracy: Value,
    #[serde(default)]
    explicit_accuracy: Value,
    #[serde(default)]
    structural_integrity: Value,
    #[serde(default)]
    notes: Value,
}

/// Every entry shape the ledger has ever written.
#[derive(Debug, Clone)]
enum StoredScoreEntry {
    /// Oldest format: the semantic fidelity score alone.
    Bare(Value),
    /// `{"score": ..., "notes": ...}`
    SingleScore { score: Value, notes: Value },
    Rubric(StoredRubricEntry),
}

impl<'de> Deserialize<'de> for StoredScoreEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Object(mut map) => {
                if map.contains_key("score") && !map.contains_key("semantic_fidelity") {
                    let score = map.remove("score").unwrap_or(Value::Null);
                    let notes = map.remove("notes").unwrap_or(Value::Null);
                    return Ok(Self::SingleScore { score, notes });
                }
                serde_json::from_value(Value::Object(map))
                    .map(Self::Rubric)
                    .map_err(de::Error::custom)
            }
            Value::Array(_) => Err(de::Error::custom("score entry cannot be a list")),
            scalar => Ok(Self::Bare(scalar)),
        }
    }
}

impl From<StoredScoreEntry> for ScoreEntry {
    fn from(stored: StoredScoreEntry) -> Self {
        match stored {
            StoredScoreEntry::Bare(score) => ScoreEntry {
                semantic_fidelity: score_from_value(&score),
                ..ScoreEntry::default()
            },
            StoredScoreEntry::SingleScore { score, notes } => ScoreEntry {
                semantic_fidelity: score_from_value(&score),
                notes: text_from_value(&notes),
                ..ScoreEntry::default()
            },
            StoredScoreEntry::Rubric(entry) => ScoreEntry {
                semantic_fidelity: score_from_value(&entry.semantic_fidelity),
                schema_accuracy: score_from_value(&entry.schema_accuracy),
                explicit_accuracy: score_from_value(&entry.explicit_accuracy),
                structural_integrity: score_from_value(&entry.structural_integrity),
                notes: text_from_value(&entry.notes),
            },
        }
    }
}

impl From<&ScoreEntry> for StoredRubricEntry {
    fn from(entry: &ScoreEntry) -> Self {
        let score_text = |score: Option<RubricScore>| {
            Value::String(score.map(|value| value.to_string()).unwrap_or_default())
        };
        StoredRubricEntry {
            semantic_fidelity: score_text(entry.semantic_fidelity),
            schema_accuracy: score_text(entry.schema_accuracy),
            explicit_accuracy: score_text(entry.explicit_accuracy),
            structural_integrity: score_text(entry.structural_integrity),
            notes: Value::String(entry.notes.clone()),
        }
    }
}

fn score_from_value(value: &Value) -> Option<RubricScore> {
    match value {
        Value::String(text) => RubricScore::parse(text),
        Value::Number(number) => number
            .as_u64()
            .and_then(|raw| u8::try_from(raw).ok())
            .and_then(RubricScore::new),
        _ => None,
    }
}

fn text_from_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// On disk: `{file_name: {"unique_id": entry}}`. Older entry shapes are
/// upgraded on read and rewritten in the current shape on the next save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreLedger {
    files: BTreeMap<String, BTreeMap<String, ScoreEntry>>,
}

impl ScoreLedger {
    /// Reads the ledger; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "score ledger missing, starting empty");
            return Ok(Self::default());
        }

        let raw = fs::read(path).map_err(|err| CoreError::load(path, err))?;
        let stored: BTreeMap<String, BTreeMap<String, StoredScoreEntry>> =
            serde_json::from_slice(&raw).map_err(|err| CoreError::load(path, err))?;

        let files = stored
            .into_iter()
            .map(|(file_name, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|(unique_id, entry)| (unique_id, ScoreEntry::from(entry)))
                    .collect();
                (file_name, entries)
            })
            .collect();

        Ok(Self { files })
    }

    /// Load for interactive use: any failure degrades to an empty ledger.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(ledger) => ledger,
            Err(err) => {
                warn!(error = %err, "score ledger unreadable, continuing without prior scores");
                Self::default()
            }
        }
    }

    /// Overwrites the whole ledger file with the current in-memory state.
    pub fn save(&self, path: &Path) -> Result<()> {
        let stored = self
            .files
            .iter()
            .map(|(file_name, entries)| {
                let entries = entries
                    .iter()
                    .map(|(unique_id, entry)| (unique_id.clone(), StoredRubricEntry::from(entry)))
                    .collect::<BTreeMap<String, StoredRubricEntry>>();
                (file_name.clone(), entries)
            })
            .collect::<BTreeMap<String, BTreeMap<String, StoredRubricEntry>>>();

        write_json_pretty(path, &stored)?;
        debug!(path = %path.display(), files = stored.len(), "saved score ledger");
        Ok(())
    }

    pub fn entry(&self, file_name: &str, unique_id: usize) -> ScoreEntry {
        self.files
            .get(file_name)
            .and_then(|entries| entries.get(&unique_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces the whole entry for the key; fields are never merged.
    pub fn upsert(&mut self, file_name: &str, unique_id: usize, entry: ScoreEntry) {
        self.files
            .entry(file_name.to_string())
            .or_default()
            .insert(unique_id.to_string(), entry);
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(value: u8) -> Option<RubricScore> {
        RubricScore::new(value)
    }

    #[test]
    fn missing_ledger_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ScoreLedger::load(&dir.path().join(SCORE_FILE_NAME)).unwrap();
        assert_eq!(ledger, ScoreLedger::default());
    }

    #[test]
    fn corrupt_ledger_is_a_load_error_but_degrades_softly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SCORE_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ScoreLedger::load(&path),
            Err(CoreError::LoadError { .. })
        ));
        assert_eq!(ScoreLedger::load_or_empty(&path), ScoreLedger::default());
    }

    #[test]
    fn all_historical_entry_shapes_upgrade_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SCORE_FILE_NAME);
        let raw = r#"{
            "response_1.json": {
                "0": "4",
                "1": {"score": "2", "notes": "off by one"},
                "2": {
                    "semantic_fidelity": "5",
                    "schema_accuracy": "3",
                    "explicit_accuracy": "",
                    "structural_integrity": "1",
                    "notes": "ok"
                },
                "3": 5,
                "4": "excellent"
            }
        }"#;
        fs::write(&path, raw).unwrap();

        let ledger = ScoreLedger::load(&path).unwrap();

        let bare = ledger.entry("response_1.json", 0);
        assert_eq!(bare.semantic_fidelity, score(4));
        assert_eq!(bare.schema_accuracy, None);
        assert!(bare.notes.is_empty());

        let single = ledger.entry("response_1.json", 1);
        assert_eq!(single.semantic_fidelity, score(2));
        assert_eq!(single.notes, "off by one");

        let current = ledger.entry("response_1.json", 2);
        assert_eq!(current.semantic_fidelity, score(5));
        assert_eq!(current.schema_accuracy, score(3));
        assert_eq!(current.explicit_accuracy, None);
        assert_eq!(current.structural_integrity, score(1));

        assert_eq!(ledger.entry("response_1.json", 3).semantic_fidelity, score(5));
        assert_eq!(ledger.entry("response_1.json", 4).semantic_fidelity, None);

        // Loading must not rewrite the file.
        assert_eq!(fs::read_to_string(&path).unwrap(), raw);
    }

    #[test]
    fn upsert_replaces_the_full_entry() {
        let mut ledger = ScoreLedger::default();
        ledger.upsert(
            "out.json",
            7,
            ScoreEntry {
                semantic_fidelity: score(3),
                notes: "x".to_string(),
                ..ScoreEntry::default()
            },
        );

        ledger.upsert(
            "out.json",
            7,
            ScoreEntry {
                semantic_fidelity: score(5),
                ..ScoreEntry::default()
            },
        );

        let entry = ledger.entry("out.json", 7);
        assert_eq!(entry.semantic_fidelity, score(5));
        assert_eq!(entry.notes, "");
    }

    #[test]
    fn save_creates_parent_and_round_trips_in_current_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join(SCORE_FILE_NAME);

        let mut ledger = ScoreLedger::default();
        ledger.upsert(
            "a.json",
            0,
            ScoreEntry {
                semantic_fidelity: score(5),
                structural_integrity: score(2),
                notes: "swapped roles".to_string(),
                ..ScoreEntry::default()
            },
        );
        ledger.save(&path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["a.json"]["0"]["semantic_fidelity"], "5");
        assert_eq!(written["a.json"]["0"]["schema_accuracy"], "");
        assert_eq!(written["a.json"]["0"]["notes"], "swapped roles");

        assert_eq!(ScoreLedger::load(&path).unwrap(), ledger);
    }

    #[test]
    fn unknown_keys_have_default_entries() {
        let ledger = ScoreLedger::default();
        assert_eq!(ledger.entry("a.json", 0), ScoreEntry::default());
        assert_eq!(ledger.file_count(), 0);
    }

    #[test]
    fn rubric_scores_reject_out_of_range_values() {
        assert!(RubricScore::parse("0").is_none());
        assert!(RubricScore::parse("6").is_none());
        assert_eq!(RubricScore::parse(" 4 ").map(RubricScore::get), Some(4));
        assert_eq!(Rubric::from_abbreviation("si"), Some(Rubric::StructuralIntegrity));
    }

    #[test]
    fn summary_marks_unset_scores() {
        let entry = ScoreEntry {
            semantic_fidelity: score(5),
            explicit_accuracy: score(3),
            ..ScoreEntry::default()
        };
        assert_eq!(entry.summary(), "SF: 5 | SA: - | EA: 3 | SI: -");
    }
}
