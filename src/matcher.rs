use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::warn;

use crate::schema::ExtractionRecord;

pub const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightSpan {
    pub segment: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub reference: Option<String>,
    pub reference_index: Option<usize>,
    pub spans: Vec<HighlightSpan>,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.reference.is_some()
    }

    /// Text of each span as it appears in the reference, original casing kept.
    pub fn highlighted_texts(&self) -> Vec<&str> {
        let Some(reference) = self.reference.as_deref() else {
            return Vec::new();
        };
        self.spans
            .iter()
            .filter_map(|span| reference.get(span.start..span.end))
            .collect()
    }
}

/// Splits a snippet into trimmed, non-empty segments.
pub fn snippet_segments(snippet: &str) -> Vec<String> {
    if snippet.contains(ELLIPSIS) {
        snippet
            .split(ELLIPSIS)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    } else {
        let trimmed = snippet.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        }
    }
}

/// Every `...` segment has to be found in the same reference. The first
/// reference in corpus order containing all of them wins.
pub fn match_snippet<S: AsRef<str>>(snippet: &str, corpus: &[S]) -> MatchResult {
    let segments = snippet_segments(snippet);
    if segments.is_empty() {
        return MatchResult::default();
    }

    let Some(patterns) = segment_patterns(&segments) else {
        return MatchResult::default();
    };

    for (index, entry) in corpus.iter().enumerate() {
        let entry = entry.as_ref();
        if !patterns.iter().all(|pattern| pattern.is_match(entry)) {
            continue;
        }

        let spans = segments
            .iter()
            .zip(&patterns)
            .filter_map(|(segment, pattern)| {
                pattern.find(entry).map(|found| HighlightSpan {
                    segment: segment.clone(),
                    start: found.start(),
                    end: found.end(),
                })
            })
            .collect();

        return MatchResult {
            reference: Some(entry.to_string()),
            reference_index: Some(index),
            spans,
        };
    }

    MatchResult::default()
}

fn segment_patterns(segments: &[String]) -> Option<Vec<Regex>> {
    let mut patterns = Vec::with_capacity(segments.len());
    for segment in segments {
        match RegexBuilder::new(&regex::escape(segment))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => patterns.push(pattern),
            Err(err) => {
                warn!(error = %err, segment_len = segment.len(), "snippet segment cannot be searched");
                return None;
            }
        }
    }
    Some(patterns)
}

/// Wraps every highlighted region of `text` in `open`/`close` markers.
///
/// Spans are byte offsets into the un-annotated text; overlapping or touching
/// spans are merged into one region.
pub fn render_highlighted(text: &str, spans: &[HighlightSpan], open: &str, close: &str) -> String {
    let mut regions = spans
        .iter()
        .filter(|span| {
            span.start < span.end
                && text.is_char_boundary(span.start)
                && text.is_char_boundary(span.end)
                && span.end <= text.len()
        })
        .map(|span| (span.start, span.end))
        .collect::<Vec<(usize, usize)>>();
    regions.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(regions.len());
    for (start, end) in regions {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = String::with_capacity(text.len() + merged.len() * (open.len() + close.len()));
    let mut cursor = 0;
    for (start, end) in merged {
        out.push_str(&text[cursor..start]);
        out.push_str(open);
        out.push_str(&text[start..end]);
        out.push_str(close);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Records whose source text is exactly `reference`, ignoring outer whitespace.
pub fn rows_citing<'a, I>(records: I, reference: &str) -> Vec<&'a ExtractionRecord>
where
    I: IntoIterator<Item = &'a ExtractionRecord>,
{
    let wanted = reference.trim();
    if wanted.is_empty() {
        return Vec::new();
    }
    records
        .into_iter()
        .filter(|record| record.source_text().trim() == wanted)
        .collect()
}
