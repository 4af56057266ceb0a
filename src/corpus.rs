use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::error::CoreError;

pub const INPUT_COLUMN: &str = "input";

/// Original texts that extracted snippets are traced back to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceCorpus {
    entries: Vec<String>,
}

impl ReferenceCorpus {
    /// Builds a corpus keeping the first occurrence of each distinct text.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut corpus = Self::default();
        corpus.extend(entries);
        corpus
    }

    pub fn extend<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = self.entries.iter().cloned().collect::<HashSet<String>>();
        for entry in entries {
            let entry = entry.into();
            if entry.trim().is_empty() || !seen.insert(entry.clone()) {
                continue;
            }
            self.entries.push(entry);
        }
    }

    /// Reads the `input` column of a CSV file. A missing file is an empty corpus.
    pub fn from_csv(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|err| CoreError::load(path, err))?;
        let headers = reader
            .headers()
            .map_err(|err| CoreError::load(path, err))?
            .clone();
        let Some(column) = headers.iter().position(|header| header.trim() == INPUT_COLUMN) else {
            return Err(CoreError::load(path, "missing column 'input'"));
        };

        let mut values = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| CoreError::load(path, err))?;
            if let Some(value) = record.get(column) {
                values.push(value.to_string());
            }
        }

        let corpus = Self::from_entries(values);
        info!(path = %path.display(), entries = corpus.len(), "loaded reference corpus");
        Ok(corpus)
    }

    /// Concatenates several CSV corpora, skipping any that fail to load.
    pub fn load_or_empty(paths: &[&Path]) -> Self {
        let mut corpus = Self::default();
        for path in paths {
            match Self::from_csv(path) {
                Ok(loaded) => corpus.extend(loaded.entries),
                Err(err) => {
                    warn!(error = %err, "reference corpus unavailable, continuing without it")
                }
            }
        }
        corpus
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
