use std::collections::HashSet;
use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::TableArgs;
use crate::commands::render::write_table;
use crate::commands::workspace::Workspace;
use crate::ledger::ScoreLedger;
use crate::matcher::rows_citing;
use crate::model::{TableFilter, TableResponse, TableRow};
use crate::review::{ReviewFilter, ReviewTable};

pub fn run(args: TableArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let ledger = ScoreLedger::load_or_empty(&workspace.score_path());
    let table = workspace.load_review_table(&args.file, &ledger)?;

    let filter = ReviewFilter {
        patterns: args.patterns.clone(),
        sentence_types: args.sentence_types.clone(),
    };
    let view = table.view(&filter);
    let citing = citing_ids(&table, args.reference_input.as_deref());

    info!(
        file = %table.file_name,
        schema = table.schema.as_str(),
        rows = table.len(),
        shown = view.len(),
        citing = citing.len(),
        "review table loaded"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        let response = TableResponse {
            file_name: table.file_name.clone(),
            schema: table.schema,
            total_rows: table.len(),
            returned: view.len(),
            filter: TableFilter {
                patterns: filter.patterns,
                sentence_types: filter.sentence_types,
            },
            reference_input: args.reference_input,
            rows: view
                .iter()
                .filter_map(|unique_id| table.row(*unique_id))
                .map(|row| TableRow {
                    record: &row.record,
                    scores: &row.scores,
                    cites_reference: citing.contains(&row.record.unique_id),
                })
                .collect(),
        };
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize review table")?;
        writeln!(output)?;
    } else {
        write_table(&mut output, &table, &view, None, &citing)?;
    }
    output.flush()?;
    Ok(())
}

/// Ids of rows whose source text is exactly the selected reference input.
pub fn citing_ids(table: &ReviewTable, reference: Option<&str>) -> HashSet<usize> {
    let Some(reference) = reference else {
        return HashSet::new();
    };
    rows_citing(table.rows.iter().map(|row| &row.record), reference)
        .into_iter()
        .map(|record| record.unique_id)
        .collect()
}
