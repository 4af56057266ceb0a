use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ScoreArgs;
use crate::commands::workspace::Workspace;
use crate::ledger::{RubricScore, ScoreEntry, ScoreLedger};

pub fn run(args: ScoreArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let entry = ScoreEntry {
        semantic_fidelity: args.sf.and_then(RubricScore::new),
        schema_accuracy: args.sa.and_then(RubricScore::new),
        explicit_accuracy: args.ea.and_then(RubricScore::new),
        structural_integrity: args.si.and_then(RubricScore::new),
        notes: args.notes,
    };
    save_score(&workspace, &args.file, args.id, entry)
}

/// Replaces the stored entry for one record with `entry`.
///
/// The ledger is loaded strictly so an unreadable file is never overwritten
/// with a ledger holding only this entry.
pub fn save_score(
    workspace: &Workspace,
    file_name: &str,
    unique_id: usize,
    entry: ScoreEntry,
) -> Result<()> {
    let table = workspace.read_table(file_name)?;
    if unique_id >= table.len() {
        bail!(
            "row {unique_id} not found in {file_name} ({} rows)",
            table.len()
        );
    }

    let score_path = workspace.score_path();
    let mut ledger = ScoreLedger::load(&score_path)
        .context("score ledger is unreadable; fix or move it before saving")?;

    let summary = entry.summary();
    ledger.upsert(file_name, unique_id, entry);
    ledger.save(&score_path)?;

    info!(
        file = %file_name,
        unique_id,
        scores = %summary,
        path = %score_path.display(),
        "saved scores"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{Value, json};

    use super::*;
    use crate::util::write_json_pretty;

    fn workspace_with_output(dir: &std::path::Path) -> Workspace {
        let workspace = Workspace::new(dir);
        write_json_pretty(
            &workspace.output_dir().join("response_1.json"),
            &json!([{"relationship": "a"}, {"relationship": "b"}]),
        )
        .unwrap();
        workspace
    }

    #[test]
    fn saving_replaces_the_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace_with_output(dir.path());

        save_score(
            &workspace,
            "response_1.json",
            1,
            ScoreEntry {
                semantic_fidelity: RubricScore::new(3),
                schema_accuracy: RubricScore::new(4),
                notes: "first pass".to_string(),
                ..ScoreEntry::default()
            },
        )
        .unwrap();
        save_score(
            &workspace,
            "response_1.json",
            1,
            ScoreEntry {
                semantic_fidelity: RubricScore::new(5),
                ..ScoreEntry::default()
            },
        )
        .unwrap();

        let stored: Value =
            serde_json::from_slice(&fs::read(workspace.score_path()).unwrap()).unwrap();
        assert_eq!(
            stored["response_1.json"]["1"],
            json!({
                "semantic_fidelity": "5",
                "schema_accuracy": "",
                "explicit_accuracy": "",
                "structural_integrity": "",
                "notes": ""
            })
        );
    }

    #[test]
    fn unknown_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace_with_output(dir.path());

        assert!(save_score(&workspace, "response_1.json", 2, ScoreEntry::default()).is_err());
        assert!(!workspace.score_path().exists());
    }

    #[test]
    fn corrupt_ledger_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace_with_output(dir.path());
        fs::write(workspace.score_path(), "{ not json").unwrap();

        assert!(save_score(&workspace, "response_1.json", 0, ScoreEntry::default()).is_err());
        assert_eq!(fs::read_to_string(workspace.score_path()).unwrap(), "{ not json");
    }
}
