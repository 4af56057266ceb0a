use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::files::summarize_files;
use crate::commands::workspace::Workspace;
use crate::genlog::GenerationLog;
use crate::ledger::ScoreLedger;

pub fn run(args: StatusArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let output_dir = workspace.output_dir();
    let score_path = workspace.score_path();
    let log_path = workspace.log_path();
    let template_path = workspace.extraction_template_path();

    info!(data_root = %workspace.root().display(), "status requested");

    if output_dir.exists() {
        let summaries = summarize_files(&workspace)?;
        let unsupported = summaries.iter().filter(|summary| summary.error.is_some()).count();
        let rows = summaries.iter().map(|summary| summary.rows).sum::<usize>();
        let scored_rows = summaries.iter().map(|summary| summary.scored_rows).sum::<usize>();
        info!(
            path = %output_dir.display(),
            files = summaries.len(),
            unsupported,
            rows,
            scored_rows,
            "output files"
        );
    } else {
        warn!(path = %output_dir.display(), "output directory missing");
    }

    if score_path.exists() {
        match ScoreLedger::load(&score_path) {
            Ok(ledger) => info!(
                path = %score_path.display(),
                files = ledger.file_count(),
                "score ledger"
            ),
            Err(err) => warn!(error = %err, "score ledger unreadable"),
        }
    } else {
        warn!(path = %score_path.display(), "score ledger missing");
    }

    if log_path.exists() {
        let log = GenerationLog::open(&log_path)?;
        let last = log.recent(1)?.pop();
        info!(
            path = %log_path.display(),
            generations = log.count()?,
            last_output = %last.as_ref().map(|entry| entry.output_filename.as_str()).unwrap_or(""),
            last_at = %last.as_ref().map(|entry| entry.created_at.as_str()).unwrap_or(""),
            "generation log"
        );
    } else {
        warn!(path = %log_path.display(), "generation log missing");
    }

    if template_path.exists() {
        info!(path = %template_path.display(), "default extraction template present");
    } else {
        warn!(path = %template_path.display(), "default extraction template missing, built-in fallback in use");
    }

    Ok(())
}
