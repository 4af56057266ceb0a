use std::convert::Infallible;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::cache::{Freshness, MtimeCache};
use crate::cli::ReviewArgs;
use crate::commands::files::summarize_files;
use crate::commands::render::{record_response, write_record, write_table};
use crate::commands::score::save_score;
use crate::commands::table::citing_ids;
use crate::commands::workspace::Workspace;
use crate::corpus::ReferenceCorpus;
use crate::ledger::{Rubric, RubricScore, ScoreEntry, ScoreLedger};
use crate::review::{ReviewFilter, ReviewTable};
use crate::session::{ReviewSession, SessionAction};
use crate::util::condense_whitespace;

const HELP: &str = "\
commands:
  files                         list output files
  open <file>                   open an output file
  list                          show the filtered table
  filter pattern=<a,b> type=<c> keep rows by pattern and sentence type
  filter clear                  drop the filter
  next | prev | goto <n>        move the cursor (n is the table position)
  back                          clear the cursor
  show                          show the row under the cursor
  refs                          list reference inputs
  ref <n> | ref none            mark rows citing reference input n
  score sf=<1-5|-> sa=.. ea=.. si=.. [notes=<text>]
                                save scores for the row under the cursor
  help | quit";

const REFERENCE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewCommand {
    Help,
    Files,
    Open(String),
    List,
    Filter(ReviewFilter),
    Next,
    Prev,
    Goto(usize),
    Back,
    Show,
    Refs,
    Reference(Option<usize>),
    Score(ScoreEntry),
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ReviewCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "help" | "h" | "?" => ReviewCommand::Help,
        "files" => ReviewCommand::Files,
        "open" if !rest.is_empty() => ReviewCommand::Open(rest.to_string()),
        "open" => bail!("usage: open <file>"),
        "list" | "ls" => ReviewCommand::List,
        "filter" => ReviewCommand::Filter(parse_filter(rest)?),
        "next" | "n" => ReviewCommand::Next,
        "prev" | "p" => ReviewCommand::Prev,
        "goto" | "g" => ReviewCommand::Goto(parse_position(rest)?),
        "back" => ReviewCommand::Back,
        "show" | "s" => ReviewCommand::Show,
        "refs" => ReviewCommand::Refs,
        "ref" if rest.eq_ignore_ascii_case("none") => ReviewCommand::Reference(None),
        "ref" => ReviewCommand::Reference(Some(parse_position(rest)?)),
        "score" => ReviewCommand::Score(parse_score(rest)?),
        "quit" | "exit" | "q" => ReviewCommand::Quit,
        other => bail!("unknown command `{other}`; type `help`"),
    };
    Ok(Some(command))
}

/// 1-based position as typed; returned 0-based.
fn parse_position(raw: &str) -> Result<usize> {
    let position = raw
        .trim()
        .parse::<usize>()
        .with_context(|| format!("expected a position, got {raw:?}"))?;
    if position == 0 {
        bail!("positions start at 1");
    }
    Ok(position - 1)
}

fn parse_filter(raw: &str) -> Result<ReviewFilter> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("clear") {
        return Ok(ReviewFilter::default());
    }

    let key_pattern =
        Regex::new(r"(?i)\b(pattern|type)=").context("failed to compile filter regex")?;
    let keys = key_pattern.captures_iter(raw).collect::<Vec<_>>();
    if keys.is_empty() {
        bail!("usage: filter pattern=<a,b> type=<c> | filter clear");
    }

    let mut filter = ReviewFilter::default();
    for (index, captures) in keys.iter().enumerate() {
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let end = keys
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|next| next.start())
            .unwrap_or(raw.len());
        let values = raw[whole.end()..end]
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        if key.as_str().eq_ignore_ascii_case("pattern") {
            filter.patterns.extend(values);
        } else {
            filter.sentence_types.extend(values);
        }
    }
    Ok(filter)
}

/// `sf=5 sa=- ea=3 si=4 notes=free text`; rubrics not named are left unset.
fn parse_score(raw: &str) -> Result<ScoreEntry> {
    let (scores, notes) = match raw.find("notes=") {
        Some(index) => (&raw[..index], raw[index + "notes=".len()..].trim()),
        None => (raw, ""),
    };

    let token_pattern = Regex::new(r"^(?i)(sf|sa|ea|si)=(\S+)$")
        .context("failed to compile score regex")?;
    let mut entry = ScoreEntry {
        notes: notes.to_string(),
        ..ScoreEntry::default()
    };

    for token in scores.split_whitespace() {
        let Some(captures) = token_pattern.captures(token) else {
            bail!("unrecognized score `{token}`; expected e.g. sf=5");
        };
        let rubric = Rubric::from_abbreviation(&captures[1])
            .with_context(|| format!("unknown rubric in `{token}`"))?;
        let value = &captures[2];
        let score = if value == "-" {
            None
        } else {
            Some(RubricScore::parse(value).with_context(|| {
                format!("{} must be between 1 and 5, got {value}", rubric.label())
            })?)
        };
        entry.set_score(rubric, score);
    }
    Ok(entry)
}

pub struct ReviewContext {
    workspace: Workspace,
    references: Vec<PathBuf>,
    tables: MtimeCache<String, ReviewTable>,
    corpora: MtimeCache<(), ReferenceCorpus>,
}

impl ReviewContext {
    pub fn new(workspace: Workspace, references: Vec<PathBuf>) -> Self {
        Self {
            workspace,
            references,
            tables: MtimeCache::default(),
            corpora: MtimeCache::default(),
        }
    }
}

fn load_table<'a>(
    tables: &'a mut MtimeCache<String, ReviewTable>,
    workspace: &Workspace,
    file_name: &str,
) -> Result<&'a ReviewTable> {
    let source = workspace.output_file(file_name)?;
    let score_path = workspace.score_path();
    let freshness = Freshness::observe(&[source.as_path(), score_path.as_path()]);
    let tables_len = tables.len();
    tables.get_or_try_insert_with(&file_name.to_string(), freshness, || {
        debug!(file = %file_name, cached_tables = tables_len, "loading review table");
        let ledger = ScoreLedger::load_or_empty(&score_path);
        workspace.load_review_table(file_name, &ledger)
    })
}

fn load_corpus<'a>(
    corpora: &'a mut MtimeCache<(), ReferenceCorpus>,
    workspace: &Workspace,
    references: &[PathBuf],
) -> &'a ReferenceCorpus {
    let mut watched = references.to_vec();
    if watched.is_empty() {
        let log_path = workspace.log_path();
        let mut wal = log_path.clone().into_os_string();
        wal.push("-wal");
        watched.push(log_path);
        watched.push(PathBuf::from(wal));
    }
    let paths = watched.iter().map(PathBuf::as_path).collect::<Vec<&Path>>();

    let loaded = corpora.get_or_try_insert_with(&(), Freshness::observe(&paths), || {
        Ok::<ReferenceCorpus, Infallible>(workspace.reference_corpus(references))
    });
    match loaded {
        Ok(corpus) => corpus,
        Err(never) => match never {},
    }
}

fn view_len(context: &mut ReviewContext, session: &ReviewSession) -> Result<usize> {
    let Some(file_name) = session.file_name.as_deref() else {
        return Ok(0);
    };
    let table = load_table(&mut context.tables, &context.workspace, file_name)?;
    Ok(table.view(&session.filter).len())
}

fn write_current<W: Write>(
    context: &mut ReviewContext,
    session: &ReviewSession,
    output: &mut W,
) -> Result<()> {
    let Some(file_name) = session.file_name.as_deref() else {
        writeln!(output, "no file open; use `open <file>`")?;
        return Ok(());
    };
    let table = load_table(&mut context.tables, &context.workspace, file_name)?;
    let view = table.view(&session.filter);
    let Some((position, unique_id)) = session
        .cursor
        .and_then(|position| view.get(position).map(|unique_id| (position, *unique_id)))
    else {
        writeln!(output, "no row selected")?;
        return Ok(());
    };

    let corpus = load_corpus(&mut context.corpora, &context.workspace, &context.references);
    if let Some(response) = record_response(table, unique_id, corpus) {
        writeln!(output, "[{} / {}]", position + 1, view.len())?;
        write_record(output, &response)?;
    }
    Ok(())
}

fn write_list<W: Write>(
    context: &mut ReviewContext,
    session: &ReviewSession,
    output: &mut W,
) -> Result<()> {
    let Some(file_name) = session.file_name.as_deref() else {
        writeln!(output, "no file open; use `open <file>`")?;
        return Ok(());
    };
    let table = load_table(&mut context.tables, &context.workspace, file_name)?;
    let corpus = load_corpus(&mut context.corpora, &context.workspace, &context.references);
    let reference = session
        .reference
        .and_then(|index| corpus.entries().get(index))
        .map(String::as_str);

    let view = table.view(&session.filter);
    let citing = citing_ids(table, reference);
    write_table(output, table, &view, session.cursor, &citing)?;
    if !session.filter.is_empty() {
        writeln!(
            output,
            "filter: patterns [{}] types [{}]",
            session.filter.patterns.join(", "),
            session.filter.sentence_types.join(", ")
        )?;
    }
    Ok(())
}

fn navigate<W: Write>(
    context: &mut ReviewContext,
    session: ReviewSession,
    action: SessionAction,
    output: &mut W,
) -> Result<ReviewSession> {
    if session.file_name.is_none() {
        bail!("no file open; use `open <file>`");
    }
    let len = view_len(context, &session)?;
    let next = session.apply(action, len);
    write_current(context, &next, output)?;
    Ok(next)
}

/// Executes one command and returns the session for the next line.
pub fn handle_command<W: Write>(
    context: &mut ReviewContext,
    session: ReviewSession,
    command: ReviewCommand,
    output: &mut W,
) -> Result<ReviewSession> {
    match command {
        ReviewCommand::Help => {
            writeln!(output, "{HELP}")?;
            Ok(session)
        }
        ReviewCommand::Quit => Ok(session),
        ReviewCommand::Files => {
            for summary in summarize_files(&context.workspace)? {
                let marker = if session.file_name.as_deref() == Some(summary.file_name.as_str()) {
                    '>'
                } else {
                    ' '
                };
                match summary.schema {
                    Some(schema) => writeln!(
                        output,
                        "{marker} {}\t{}\trows={}\tscored={}",
                        summary.file_name,
                        schema.as_str(),
                        summary.rows,
                        summary.scored_rows
                    )?,
                    None => writeln!(
                        output,
                        "{marker} {}\tunsupported\t{}",
                        summary.file_name,
                        summary.error.unwrap_or_default()
                    )?,
                }
            }
            Ok(session)
        }
        ReviewCommand::Open(file_name) => {
            let table = load_table(&mut context.tables, &context.workspace, &file_name)?;
            let rows = table.len();
            let patterns = table.patterns().join(", ");
            let sentence_types = table.sentence_types().join(", ");
            writeln!(
                output,
                "opened {file_name}: {rows} rows, schema {}",
                table.schema.as_str()
            )?;
            writeln!(output, "patterns: {patterns}")?;
            writeln!(output, "sentence types: {sentence_types}")?;

            let next = session.apply(SessionAction::SelectFile(file_name), rows);
            write_list(context, &next, output)?;
            Ok(next)
        }
        ReviewCommand::List => {
            write_list(context, &session, output)?;
            Ok(session)
        }
        ReviewCommand::Filter(filter) => {
            if session.file_name.is_none() {
                bail!("no file open; use `open <file>`");
            }
            let next = session.apply(SessionAction::SetFilter(filter), 0);
            write_list(context, &next, output)?;
            Ok(next)
        }
        ReviewCommand::Next => navigate(context, session, SessionAction::Next, output),
        ReviewCommand::Prev => navigate(context, session, SessionAction::Prev, output),
        ReviewCommand::Goto(position) => {
            navigate(context, session, SessionAction::Select(position), output)
        }
        ReviewCommand::Back => navigate(context, session, SessionAction::Deselect, output),
        ReviewCommand::Show => {
            write_current(context, &session, output)?;
            Ok(session)
        }
        ReviewCommand::Refs => {
            let corpus = load_corpus(&mut context.corpora, &context.workspace, &context.references);
            if corpus.is_empty() {
                writeln!(output, "no reference inputs")?;
            }
            for (index, entry) in corpus.entries().iter().enumerate() {
                let marker = if session.reference == Some(index) { '>' } else { ' ' };
                let preview = condense_whitespace(entry)
                    .chars()
                    .take(REFERENCE_PREVIEW_CHARS)
                    .collect::<String>();
                writeln!(output, "{marker}{:>4}\t{preview}", index + 1)?;
            }
            Ok(session)
        }
        ReviewCommand::Reference(index) => {
            let corpus = load_corpus(&mut context.corpora, &context.workspace, &context.references);
            if let Some(index) = index
                && index >= corpus.len()
            {
                bail!(
                    "reference {} out of range ({} reference inputs)",
                    index + 1,
                    corpus.len()
                );
            }
            let next = session.apply(SessionAction::SelectReference(index), 0);
            if next.file_name.is_some() {
                write_list(context, &next, output)?;
            }
            Ok(next)
        }
        ReviewCommand::Score(entry) => {
            let Some(file_name) = session.file_name.clone() else {
                bail!("no file open; use `open <file>`");
            };
            let table = load_table(&mut context.tables, &context.workspace, &file_name)?;
            let view = table.view(&session.filter);
            let Some(unique_id) = session.cursor.and_then(|position| view.get(position).copied())
            else {
                bail!("no row selected; use `next` or `goto <n>`");
            };

            let summary = entry.summary();
            save_score(&context.workspace, &file_name, unique_id, entry)?;
            context.tables.invalidate(&file_name);
            writeln!(output, "saved row {unique_id}: {summary}")?;

            let next = session.apply(SessionAction::Saved, view.len());
            write_current(context, &next, output)?;
            Ok(next)
        }
    }
}

/// Reads commands until `quit` or end of input. Failures are reported and
/// the previous session is kept.
pub fn run_loop<R: BufRead, W: Write>(
    context: &mut ReviewContext,
    input: R,
    output: &mut W,
    initial: ReviewSession,
) -> Result<ReviewSession> {
    let mut session = initial;
    write!(output, "review> ")?;
    output.flush()?;

    for line in input.lines() {
        let line = line.context("failed to read review command")?;
        match parse_command(&line) {
            Ok(Some(ReviewCommand::Quit)) => break,
            Ok(Some(command)) => {
                match handle_command(context, session.clone(), command, output) {
                    Ok(next) => session = next,
                    Err(err) => {
                        warn!(error = %err, "review command failed");
                        writeln!(output, "error: {err:#}")?;
                    }
                }
            }
            Ok(None) => {}
            Err(err) => writeln!(output, "error: {err:#}")?,
        }
        write!(output, "review> ")?;
        output.flush()?;
    }
    writeln!(output)?;
    output.flush()?;
    Ok(session)
}

pub fn run(args: ReviewArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    info!(data_root = %workspace.root().display(), "starting review session");

    let mut context = ReviewContext::new(workspace, args.references);
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "{HELP}")?;

    let mut session = ReviewSession::default();
    if let Some(file_name) = args.file {
        session = handle_command(
            &mut context,
            session,
            ReviewCommand::Open(file_name),
            &mut output,
        )?;
    }

    let stdin = io::stdin();
    let session = run_loop(&mut context, stdin.lock(), &mut output, session)?;
    info!(
        file = session.file_name.as_deref().unwrap_or(""),
        "review session finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests;
