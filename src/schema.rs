use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::CoreError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaTag {
    V3,
    V4,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Column {
    pub key: &'static str,
    pub display: &'static str,
}

const fn column(key: &'static str, display: &'static str) -> Column {
    Column { key, display }
}

pub const V4_COLUMNS: [Column; 10] = [
    column("pattern_type", "Pattern Type"),
    column("sentence_type", "Sentence Type"),
    column("marked_type", "Marked Type"),
    column("explicit_type", "Explicit Type"),
    column("relationship", "Relationship"),
    column("marker", "Marker"),
    column("subject", "Subject"),
    column("object", "Object"),
    column("source_text", "Source Text"),
    column("reasoning", "Reasoning"),
];

pub const V3_COLUMNS: [Column; 6] = [
    column("pattern", "Pattern"),
    column("causal_type", "Causal Type"),
    column("causal", "Causal Statement"),
    column("note", "Note"),
    column("named_entity", "Named Entity/Object"),
    column("original_reference", "Original Reference"),
];

/// Keys whose presence in the first object marks a v4 file.
const V4_MARKER_KEYS: [&str; 6] = [
    "pattern_type",
    "sentence_type",
    "marked_type",
    "explicit_type",
    "relationship",
    "source_text",
];

/// Producer key variants for each v3 column, in lookup order.
const V3_KEY_ALIASES: [&[&str]; 6] = [
    &["pattern", "pattern_type"],
    &["causal type", "causal_type", "sentence_type"],
    &["causal", "causal_statement", "relationship"],
    &["note", "notes", "reasoning"],
    &["Named entity/Object in causal", "named_entity", "object"],
    &["original reference", "original_reference", "source_text"],
];

impl SchemaTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V3 => "v3",
            Self::V4 => "v4",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::V3 => &V3_COLUMNS,
            Self::V4 => &V4_COLUMNS,
        }
    }

    pub fn column_index(self, key: &str) -> Option<usize> {
        self.columns().iter().position(|column| column.key == key)
    }

    pub fn pattern_key(self) -> &'static str {
        match self {
            Self::V3 => "pattern",
            Self::V4 => "pattern_type",
        }
    }

    pub fn sentence_type_key(self) -> &'static str {
        match self {
            Self::V3 => "causal_type",
            Self::V4 => "sentence_type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRecord {
    pub unique_id: usize,
    pub schema: SchemaTag,
    values: Vec<String>,
}

/// Schema-independent view of a record used for review display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordDetail {
    pub relationship: String,
    pub source_text: String,
    pub pattern_type: String,
    pub sentence_type: String,
    pub marked_type: String,
    pub explicit_type: String,
    pub marker: String,
    pub subject: String,
    pub object: String,
    pub reasoning: String,
}

impl ExtractionRecord {
    pub fn value(&self, key: &str) -> &str {
        self.schema
            .column_index(key)
            .and_then(|index| self.values.get(index))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn pattern(&self) -> &str {
        self.value(self.schema.pattern_key())
    }

    pub fn sentence_type(&self) -> &str {
        self.value(self.schema.sentence_type_key())
    }

    pub fn source_text(&self) -> &str {
        match self.schema {
            SchemaTag::V3 => self.value("original_reference"),
            SchemaTag::V4 => self.value("source_text"),
        }
    }

    pub fn detail(&self) -> RecordDetail {
        match self.schema {
            SchemaTag::V4 => RecordDetail {
                relationship: self.value("relationship").to_string(),
                source_text: self.value("source_text").trim().to_string(),
                pattern_type: self.value("pattern_type").to_string(),
                sentence_type: self.value("sentence_type").to_string(),
                marked_type: self.value("marked_type").to_string(),
                explicit_type: self.value("explicit_type").to_string(),
                marker: self.value("marker").to_string(),
                subject: self.value("subject").to_string(),
                object: self.value("object").to_string(),
                reasoning: self.value("reasoning").to_string(),
            },
            SchemaTag::V3 => RecordDetail {
                relationship: self.value("causal").to_string(),
                source_text: self.value("original_reference").trim().to_string(),
                pattern_type: self.value("pattern").to_string(),
                sentence_type: self.value("causal_type").to_string(),
                object: self.value("named_entity").to_string(),
                reasoning: self.value("note").to_string(),
                ..RecordDetail::default()
            },
        }
    }
}

impl Serialize for ExtractionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let columns = self.schema.columns();
        let mut map = serializer.serialize_map(Some(columns.len() + 1))?;
        map.serialize_entry("unique_id", &self.unique_id)?;
        for (column, value) in columns.iter().zip(&self.values) {
            map.serialize_entry(column.key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTable {
    pub schema: SchemaTag,
    pub records: Vec<ExtractionRecord>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// v3 rows are positional lists or keyed objects remapped onto six columns;
/// v4 rows are keyed objects with ten fields. The version is chosen from the
/// first element and applied to the whole file.
pub fn normalize(parsed: &Value) -> Result<NormalizedTable, CoreError> {
    let Value::Array(items) = parsed else {
        return Err(CoreError::UnsupportedShape(format!(
            "expected a top-level array, found {}",
            value_kind(parsed)
        )));
    };

    let Some(first) = items.first() else {
        return Ok(NormalizedTable {
            schema: SchemaTag::V4,
            records: Vec::new(),
        });
    };

    match first {
        Value::Array(_) => normalize_positional(items),
        Value::Object(first_row) => {
            if V4_MARKER_KEYS.iter().any(|key| first_row.contains_key(*key)) {
                normalize_keyed_v4(items)
            } else {
                normalize_keyed_v3(items)
            }
        }
        other => Err(CoreError::UnsupportedShape(format!(
            "first element must be a list or an object, found {}",
            value_kind(other)
        ))),
    }
}

fn normalize_positional(items: &[Value]) -> Result<NormalizedTable, CoreError> {
    let expected = V3_COLUMNS.len();
    let mut records = Vec::with_capacity(items.len());

    for (unique_id, item) in items.iter().enumerate() {
        let Value::Array(cells) = item else {
            return Err(CoreError::UnsupportedShape(format!(
                "row {unique_id} is {} in a list-of-lists file",
                value_kind(item)
            )));
        };
        if cells.len() != expected {
            return Err(CoreError::ColumnMismatch {
                row: unique_id,
                expected,
                found: cells.len(),
            });
        }
        if let Some(nested) = cells.iter().find(|cell| cell.is_array() || cell.is_object()) {
            return Err(CoreError::UnsupportedShape(format!(
                "row {unique_id} contains a nested {} cell",
                value_kind(nested)
            )));
        }

        records.push(ExtractionRecord {
            unique_id,
            schema: SchemaTag::V3,
            values: cells.iter().map(|cell| cell_text(Some(cell))).collect(),
        });
    }

    Ok(NormalizedTable {
        schema: SchemaTag::V3,
        records,
    })
}

fn normalize_keyed_v4(items: &[Value]) -> Result<NormalizedTable, CoreError> {
    let mut records = Vec::with_capacity(items.len());

    for (unique_id, item) in items.iter().enumerate() {
        let row = expect_object(item, unique_id)?;
        records.push(ExtractionRecord {
            unique_id,
            schema: SchemaTag::V4,
            values: V4_COLUMNS
                .iter()
                .map(|column| cell_text(row.get(column.key)))
                .collect(),
        });
    }

    Ok(NormalizedTable {
        schema: SchemaTag::V4,
        records,
    })
}

fn normalize_keyed_v3(items: &[Value]) -> Result<NormalizedTable, CoreError> {
    let mut records = Vec::with_capacity(items.len());

    for (unique_id, item) in items.iter().enumerate() {
        let row = expect_object(item, unique_id)?;
        records.push(ExtractionRecord {
            unique_id,
            schema: SchemaTag::V3,
            values: V3_KEY_ALIASES
                .iter()
                .map(|aliases| {
                    let found = aliases.iter().find_map(|alias| row.get(*alias));
                    cell_text(found)
                })
                .collect(),
        });
    }

    Ok(NormalizedTable {
        schema: SchemaTag::V3,
        records,
    })
}

fn expect_object(item: &Value, row: usize) -> Result<&Map<String, Value>, CoreError> {
    item.as_object().ok_or_else(|| {
        CoreError::UnsupportedShape(format!(
            "row {row} is {} in a list-of-objects file",
            value_kind(item)
        ))
    })
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
