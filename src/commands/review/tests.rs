use std::fs;
use std::io::Cursor;

use serde_json::{Value, json};

use super::*;
use crate::util::write_json_pretty;

fn workspace(dir: &Path) -> Workspace {
    let workspace = Workspace::new(dir);
    write_json_pretty(
        &workspace.output_dir().join("response_1.json"),
        &json!([
            {"pattern_type": "Explicit", "sentence_type": "Single", "relationship": "rain -> flood", "source_text": "Heavy rain ... flooding"},
            {"pattern_type": "Implicit", "sentence_type": "Single", "relationship": "heat -> drought", "source_text": "Heat dried the land."},
            {"pattern_type": "Explicit", "sentence_type": "Multiple", "relationship": "wind -> damage", "source_text": "Wind damaged roofs."}
        ]),
    )
    .unwrap();
    workspace
}

fn run_script(context: &mut ReviewContext, script: &str) -> (ReviewSession, String) {
    let mut output = Vec::new();
    let session = run_loop(
        context,
        Cursor::new(script.to_string()),
        &mut output,
        ReviewSession::default(),
    )
    .unwrap();
    (session, String::from_utf8(output).unwrap())
}

#[test]
fn parses_navigation_and_filters() {
    assert_eq!(parse_command("   ").unwrap(), None);
    assert_eq!(parse_command("n").unwrap(), Some(ReviewCommand::Next));
    assert_eq!(parse_command("goto 3").unwrap(), Some(ReviewCommand::Goto(2)));
    assert!(parse_command("goto 0").is_err());
    assert_eq!(
        parse_command("open response_1.json").unwrap(),
        Some(ReviewCommand::Open("response_1.json".to_string()))
    );
    assert_eq!(
        parse_command("ref none").unwrap(),
        Some(ReviewCommand::Reference(None))
    );
    assert!(parse_command("dance").is_err());

    let Some(ReviewCommand::Filter(filter)) =
        parse_command("filter pattern=Explicit, Implicit type=Single sentence").unwrap()
    else {
        panic!("expected a filter command");
    };
    assert_eq!(filter.patterns, vec!["Explicit", "Implicit"]);
    assert_eq!(filter.sentence_types, vec!["Single sentence"]);
    assert_eq!(
        parse_command("filter clear").unwrap(),
        Some(ReviewCommand::Filter(ReviewFilter::default()))
    );
}

#[test]
fn parses_scores_and_notes() {
    let Some(ReviewCommand::Score(entry)) =
        parse_command("score SF=5 sa=- ea=2 notes=marker is implicit, sf=1").unwrap()
    else {
        panic!("expected a score command");
    };
    assert_eq!(entry.semantic_fidelity, RubricScore::new(5));
    assert_eq!(entry.schema_accuracy, None);
    assert_eq!(entry.explicit_accuracy, RubricScore::new(2));
    assert_eq!(entry.structural_integrity, None);
    assert_eq!(entry.notes, "marker is implicit, sf=1");

    assert!(parse_command("score sf=6").is_err());
    assert!(parse_command("score xx=1").is_err());
}

#[test]
fn scoring_saves_and_advances() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = workspace(dir.path());
    let score_path = workspace.score_path();
    let mut context = ReviewContext::new(workspace, Vec::new());

    let (session, output) = run_script(
        &mut context,
        "open response_1.json\nnext\nscore sf=4 si=3 notes=ok\nshow\nquit\nnext\n",
    );

    assert_eq!(session.cursor, Some(1));
    assert!(output.contains("saved row 0: SF: 4 | SA: - | EA: - | SI: 3"));
    assert!(output.contains("[2 / 3]"));
    assert!(output.contains("Relationship: heat -> drought"));

    let stored: Value = serde_json::from_slice(&fs::read(score_path).unwrap()).unwrap();
    assert_eq!(stored["response_1.json"]["0"]["semantic_fidelity"], "4");
    assert_eq!(stored["response_1.json"]["0"]["notes"], "ok");
}

#[test]
fn filter_limits_navigation_to_the_view() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = ReviewContext::new(workspace(dir.path()), Vec::new());

    let (session, output) = run_script(
        &mut context,
        "open response_1.json\nfilter pattern=Explicit\ngoto 2\nnext\n",
    );

    assert_eq!(session.filter.patterns, vec!["Explicit"]);
    assert_eq!(session.cursor, Some(1));
    assert!(output.contains("2 of 3 rows"));
    assert!(output.contains("Relationship: wind -> damage"));
}

#[test]
fn failures_keep_the_loop_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = ReviewContext::new(workspace(dir.path()), Vec::new());

    let (session, output) = run_script(
        &mut context,
        "score sf=1\nopen missing.json\nbogus\nopen response_1.json\n",
    );

    assert_eq!(session.file_name.as_deref(), Some("response_1.json"));
    assert!(output.contains("error: no file open"));
    assert!(output.contains("error: output file not found"));
    assert!(output.contains("error: unknown command `bogus`"));
    assert!(output.contains("opened response_1.json: 3 rows, schema v4"));
}

#[test]
fn quit_leaves_session_untouched_and_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = ReviewContext::new(workspace(dir.path()), Vec::new());
    let session = ReviewSession::default();

    let mut output = Vec::new();
    let next = handle_command(&mut context, session.clone(), ReviewCommand::Quit, &mut output)
        .unwrap();
    assert_eq!(next, session);
    assert!(output.is_empty());

    let (_, transcript) = run_script(&mut context, "quit
help
");
    assert!(!transcript.contains("commands:"));
}

#[test]
fn reference_selection_marks_citing_rows_and_highlights() {
    let dir = tempfile::tempdir().unwrap();
    let refs = dir.path().join("refs.csv");
    fs::write(
        &refs,
        "input\n\"Heat dried the land.\"\n\"Heavy rain fell overnight, causing flooding downstream.\"\n",
    )
    .unwrap();
    let mut context = ReviewContext::new(workspace(dir.path()), vec![refs]);

    let (session, output) = run_script(
        &mut context,
        "open response_1.json\nrefs\nref 1\ngoto 1\n",
    );

    assert_eq!(session.reference, Some(0));
    assert!(output.contains("*   2\t1\tImplicit"));
    assert!(output.contains("Reference #2 of 2:"));
    assert!(output.contains("«Heavy rain» fell overnight, causing «flooding» downstream."));
}
