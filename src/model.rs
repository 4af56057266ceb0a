use serde::Serialize;

use crate::ledger::ScoreEntry;
use crate::matcher::MatchResult;
use crate::schema::{ExtractionRecord, RecordDetail, SchemaTag};

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file_name: String,
    pub schema: Option<SchemaTag>,
    pub rows: usize,
    pub scored_rows: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableFilter {
    pub patterns: Vec<String>,
    pub sentence_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow<'a> {
    pub record: &'a ExtractionRecord,
    pub scores: &'a ScoreEntry,
    pub cites_reference: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableResponse<'a> {
    pub file_name: String,
    pub schema: SchemaTag,
    pub total_rows: usize,
    pub returned: usize,
    pub filter: TableFilter,
    pub reference_input: Option<String>,
    pub rows: Vec<TableRow<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub file_name: String,
    pub unique_id: usize,
    pub schema: SchemaTag,
    pub detail: RecordDetail,
    pub scores: ScoreEntry,
    pub corpus_size: usize,
    pub provenance: MatchResult,
}
