use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ShowArgs;
use crate::commands::render::{record_response, write_record};
use crate::commands::workspace::Workspace;
use crate::ledger::ScoreLedger;

pub fn run(args: ShowArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let ledger = ScoreLedger::load_or_empty(&workspace.score_path());
    let table = workspace.load_review_table(&args.file, &ledger)?;
    let corpus = workspace.reference_corpus(&args.references);

    let response = record_response(&table, args.id, &corpus).with_context(|| {
        format!(
            "row {} not found in {} ({} rows)",
            args.id,
            table.file_name,
            table.len()
        )
    })?;

    info!(
        file = %response.file_name,
        unique_id = response.unique_id,
        corpus = response.corpus_size,
        matched = response.provenance.is_match(),
        "record loaded"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize record")?;
        writeln!(output)?;
    } else {
        write_record(&mut output, &response)?;
    }
    output.flush()?;
    Ok(())
}
