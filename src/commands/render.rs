use std::collections::HashSet;
use std::io::{self, Write};

use crate::corpus::ReferenceCorpus;
use crate::ledger::Rubric;
use crate::matcher::{match_snippet, render_highlighted};
use crate::model::RecordResponse;
use crate::review::ReviewTable;
use crate::util::condense_whitespace;

pub const HIGHLIGHT_OPEN: &str = "«";
pub const HIGHLIGHT_CLOSE: &str = "»";

pub fn record_response(
    table: &ReviewTable,
    unique_id: usize,
    corpus: &ReferenceCorpus,
) -> Option<RecordResponse> {
    let row = table.row(unique_id)?;
    let detail = row.record.detail();
    let provenance = match_snippet(&detail.source_text, corpus.entries());

    Some(RecordResponse {
        file_name: table.file_name.clone(),
        unique_id,
        schema: table.schema,
        detail,
        scores: row.scores.clone(),
        corpus_size: corpus.len(),
        provenance,
    })
}

pub fn write_record<W: Write>(output: &mut W, response: &RecordResponse) -> io::Result<()> {
    let detail = &response.detail;
    writeln!(
        output,
        "File: {}\tRow: {}\tSchema: {}",
        response.file_name,
        response.unique_id,
        response.schema.as_str()
    )?;

    for (label, value) in [
        ("Relationship", &detail.relationship),
        ("Pattern Type", &detail.pattern_type),
        ("Sentence Type", &detail.sentence_type),
        ("Marked Type", &detail.marked_type),
        ("Explicit Type", &detail.explicit_type),
        ("Marker", &detail.marker),
        ("Subject", &detail.subject),
        ("Object", &detail.object),
        ("Reasoning", &detail.reasoning),
        ("Source Text", &detail.source_text),
    ] {
        if !value.is_empty() {
            writeln!(output, "{label}: {value}")?;
        }
    }

    writeln!(output, "Scores: {}", response.scores.summary())?;
    if !response.scores.notes.is_empty() {
        writeln!(output, "Notes: {}", response.scores.notes)?;
    }

    let provenance = &response.provenance;
    match (&provenance.reference, provenance.reference_index) {
        (Some(reference), Some(index)) => {
            writeln!(
                output,
                "Reference #{} of {}:",
                index + 1,
                response.corpus_size
            )?;
            writeln!(
                output,
                "{}",
                render_highlighted(reference, &provenance.spans, HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE)
            )?;
            writeln!(output, "Matched: {}", provenance.highlighted_texts().join(" | "))?;
        }
        _ => writeln!(
            output,
            "Reference: no match among {} reference inputs",
            response.corpus_size
        )?,
    }
    Ok(())
}

/// One line per row in `view`. `>` marks the cursor, `*` rows citing the
/// selected reference.
pub fn write_table<W: Write>(
    output: &mut W,
    table: &ReviewTable,
    view: &[usize],
    cursor: Option<usize>,
    citing: &HashSet<usize>,
) -> io::Result<()> {
    let pattern_label = table.schema.columns()[0].display;
    let sentence_label = table.schema.columns()[1].display;
    writeln!(
        output,
        "  pos\tid\t{pattern_label}\t{sentence_label}\tRelationship\t{}",
        Rubric::ALL
            .iter()
            .map(|rubric| rubric.abbreviation())
            .collect::<Vec<&str>>()
            .join("/")
    )?;

    for (position, unique_id) in view.iter().enumerate() {
        let Some(row) = table.row(*unique_id) else {
            continue;
        };
        let marker = match (cursor == Some(position), citing.contains(unique_id)) {
            (true, _) => '>',
            (false, true) => '*',
            (false, false) => ' ',
        };
        let scores = Rubric::ALL
            .iter()
            .map(|rubric| {
                row.scores
                    .score(*rubric)
                    .map(|score| score.to_string())
                    .unwrap_or_else(|| "-".to_string())
            })
            .collect::<Vec<String>>()
            .join("/");
        writeln!(
            output,
            "{marker}{:>4}\t{}\t{}\t{}\t{}\t{}",
            position + 1,
            unique_id,
            row.record.pattern(),
            row.record.sentence_type(),
            condense_whitespace(&row.record.detail().relationship),
            scores
        )?;
    }
    writeln!(output, "{} of {} rows", view.len(), table.len())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ledger::{RubricScore, ScoreEntry, ScoreLedger};
    use crate::schema::normalize;

    fn review_table() -> ReviewTable {
        let table = normalize(&json!([
            {"pattern_type": "Explicit", "sentence_type": "Single", "relationship": "cat -> bird", "source_text": "the cat ... the bird"},
            {"pattern_type": "Implicit", "sentence_type": "Single", "relationship": "dog -> noise", "source_text": "A dog barked."}
        ]))
        .unwrap();
        let mut ledger = ScoreLedger::default();
        ledger.upsert(
            "response_1.json",
            0,
            ScoreEntry {
                semantic_fidelity: RubricScore::new(5),
                notes: "clear".to_string(),
                ..ScoreEntry::default()
            },
        );
        ReviewTable::build("response_1.json", &table, &ledger)
    }

    #[test]
    fn record_text_highlights_matched_reference() {
        let corpus = ReferenceCorpus::from_entries(["The dog slept.", "The Cat chased the Bird."]);
        let response = record_response(&review_table(), 0, &corpus).unwrap();

        let mut out = Vec::new();
        write_record(&mut out, &response).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Relationship: cat -> bird"));
        assert!(text.contains("Scores: SF: 5 | SA: - | EA: - | SI: -"));
        assert!(text.contains("Notes: clear"));
        assert!(text.contains("Reference #2 of 2:"));
        assert!(text.contains("«The Cat» chased «the Bird»."));
        assert!(text.contains("Matched: The Cat | the Bird"));
    }

    #[test]
    fn record_text_reports_missing_reference() {
        let corpus = ReferenceCorpus::default();
        let response = record_response(&review_table(), 1, &corpus).unwrap();

        let mut out = Vec::new();
        write_record(&mut out, &response).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Reference: no match among 0 reference inputs"));
        assert!(record_response(&review_table(), 9, &corpus).is_none());
    }

    #[test]
    fn table_marks_cursor_and_citing_rows() {
        let table = review_table();
        let citing = HashSet::from([1_usize]);

        let mut out = Vec::new();
        write_table(&mut out, &table, &[0, 1], Some(0), &citing).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines = text.lines().collect::<Vec<&str>>();

        assert!(lines[0].contains("Pattern Type\tSentence Type"));
        assert!(lines[1].starts_with(">   1\t0\tExplicit"));
        assert!(lines[1].ends_with("5/-/-/-"));
        assert!(lines[2].starts_with("*   2\t1\tImplicit"));
        assert_eq!(lines[3], "2 of 2 rows");
    }
}
