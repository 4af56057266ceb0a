use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::FilesArgs;
use crate::commands::workspace::Workspace;
use crate::ledger::ScoreLedger;
use crate::model::FileSummary;
use crate::review::{ReviewTable, list_output_files};

pub fn run(args: FilesArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let summaries = summarize_files(&workspace)?;
    info!(
        output_dir = %workspace.output_dir().display(),
        files = summaries.len(),
        "listed output files"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &summaries)
            .context("failed to serialize file listing")?;
        writeln!(output)?;
    } else {
        for summary in &summaries {
            match (&summary.error, summary.schema) {
                (Some(error), _) => writeln!(output, "{}\tunsupported\t{}", summary.file_name, error)?,
                (None, Some(schema)) => writeln!(
                    output,
                    "{}\t{}\trows={}\tscored={}",
                    summary.file_name,
                    schema.as_str(),
                    summary.rows,
                    summary.scored_rows
                )?,
                (None, None) => writeln!(output, "{}", summary.file_name)?,
            }
        }
    }
    output.flush()?;
    Ok(())
}

/// One summary per output file; files that fail to load are listed with the reason.
pub fn summarize_files(workspace: &Workspace) -> Result<Vec<FileSummary>> {
    let output_dir = workspace.output_dir();
    let names = list_output_files(&output_dir)
        .with_context(|| format!("failed to list {}", output_dir.display()))?;
    let ledger = ScoreLedger::load_or_empty(&workspace.score_path());

    let summaries = names
        .into_iter()
        .map(|file_name| {
            match ReviewTable::load(&output_dir.join(&file_name), &ledger) {
                Ok(table) => FileSummary {
                    schema: Some(table.schema),
                    rows: table.len(),
                    scored_rows: table.scored_count(),
                    error: None,
                    file_name,
                },
                Err(err) => FileSummary {
                    schema: None,
                    rows: 0,
                    scored_rows: 0,
                    error: Some(err.to_string()),
                    file_name,
                },
            }
        })
        .collect();
    Ok(summaries)
}
