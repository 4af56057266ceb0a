use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::HistoryArgs;
use crate::commands::workspace::Workspace;
use crate::genlog::GenerationLog;
use crate::util::condense_whitespace;

const INPUT_PREVIEW_CHARS: usize = 80;

pub fn run(args: HistoryArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let log_path = workspace.log_path();
    if !log_path.exists() {
        warn!(path = %log_path.display(), "generation log missing");
        return Ok(());
    }

    let log = GenerationLog::open(&log_path)?;
    let entries = log.recent(args.limit)?;
    info!(
        path = %log_path.display(),
        total = log.count()?,
        returned = entries.len(),
        "loaded generation history"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &entries)
            .context("failed to serialize generation history")?;
        writeln!(output)?;
    } else {
        for entry in &entries {
            let input = condense_whitespace(&entry.input);
            let preview = if input.chars().count() > INPUT_PREVIEW_CHARS {
                let mut clipped = input.chars().take(INPUT_PREVIEW_CHARS).collect::<String>();
                clipped.push_str("...");
                clipped
            } else {
                input
            };
            writeln!(
                output,
                "{}\t{}\t{}\t{}\t{}",
                entry.id, entry.created_at, entry.model_name, entry.output_filename, preview
            )?;
        }
    }
    output.flush()?;
    Ok(())
}
