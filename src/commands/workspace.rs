use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::corpus::ReferenceCorpus;
use crate::genlog::GenerationLog;
use crate::ledger::{SCORE_FILE_NAME, ScoreLedger};
use crate::review::{ReviewTable, read_output_file};
use crate::schema::NormalizedTable;

/// Paths under a data root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn clusters_dir(&self) -> PathBuf {
        self.output_dir().join("clusters")
    }

    pub fn score_path(&self) -> PathBuf {
        self.output_dir().join(SCORE_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("generation_log.sqlite")
    }

    pub fn extraction_template_path(&self) -> PathBuf {
        self.root.join("prompt").join("causal_extract").join("v4.txt")
    }

    pub fn cluster_template_path(&self) -> PathBuf {
        self.root.join("prompt").join("listwise_clustering.txt")
    }

    /// Resolves a bare output file name; paths are rejected.
    pub fn output_file(&self, file_name: &str) -> Result<PathBuf> {
        let trimmed = file_name.trim();
        if trimmed.is_empty()
            || trimmed.contains(['/', '\\'])
            || trimmed == "."
            || trimmed == ".."
        {
            bail!("expected an output file name, got {file_name:?}");
        }
        if trimmed == SCORE_FILE_NAME {
            bail!("{SCORE_FILE_NAME} is the score ledger, not an output file");
        }
        Ok(self.output_dir().join(trimmed))
    }

    pub fn read_table(&self, file_name: &str) -> Result<NormalizedTable> {
        let path = self.output_file(file_name)?;
        if !path.exists() {
            bail!("output file not found: {}", path.display());
        }
        read_output_file(&path).with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn load_review_table(&self, file_name: &str, ledger: &ScoreLedger) -> Result<ReviewTable> {
        let path = self.output_file(file_name)?;
        if !path.exists() {
            bail!("output file not found: {}", path.display());
        }
        ReviewTable::load(&path, ledger).with_context(|| format!("failed to load {}", path.display()))
    }

    /// CSV references when given, otherwise every input the generation log has seen.
    pub fn reference_corpus(&self, references: &[PathBuf]) -> ReferenceCorpus {
        if !references.is_empty() {
            let paths = references.iter().map(PathBuf::as_path).collect::<Vec<&Path>>();
            return ReferenceCorpus::load_or_empty(&paths);
        }

        let log_path = self.log_path();
        if !log_path.exists() {
            debug!(path = %log_path.display(), "generation log missing, reference corpus empty");
            return ReferenceCorpus::default();
        }

        match GenerationLog::open(&log_path).and_then(|log| log.inputs()) {
            Ok(inputs) => ReferenceCorpus::from_entries(inputs),
            Err(err) => {
                warn!(error = %err, "generation log unreadable, reference corpus empty");
                ReferenceCorpus::default()
            }
        }
    }
}

/// Picks the template from an inline value, an explicit file, the data-root
/// default file, or the built-in fallback, in that order.
pub fn resolve_template(
    inline: Option<&str>,
    file: Option<&Path>,
    default_path: &Path,
    fallback: &str,
) -> Result<String> {
    if let Some(inline) = inline {
        return Ok(inline.to_string());
    }
    if let Some(file) = file {
        return fs::read_to_string(file)
            .with_context(|| format!("failed to read template {}", file.display()));
    }
    if default_path.exists() {
        debug!(path = %default_path.display(), "using default template file");
        return fs::read_to_string(default_path)
            .with_context(|| format!("failed to read template {}", default_path.display()));
    }
    Ok(fallback.to_string())
}

/// `<stem>.json` in `dir`, or `<stem>_<n>.json` when that name is taken.
pub fn available_json_path(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.json"));
    if !first.exists() {
        return first;
    }
    let mut counter = 1_usize;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}.json"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
