use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecoveryStrategy {
    Direct,
    Repaired,
}

impl RecoveryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Repaired => "repaired",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recovered {
    pub value: Value,
    pub strategy: RecoveryStrategy,
}

/// Strips fences and tries a direct parse, then narrows to the likely JSON
/// span and repairs comments and trailing commas before parsing again.
/// Failure carries the raw text in [`CoreError::UnparsableOutput`].
pub fn recover_json(raw_text: &str) -> Result<Recovered, CoreError> {
    let cleaned = strip_code_fence(raw_text);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(Recovered {
            value,
            strategy: RecoveryStrategy::Direct,
        });
    }

    let candidate = candidate_span(cleaned);
    let repaired = strip_trailing_commas(&strip_comments(candidate));
    debug!(
        cleaned_len = cleaned.len(),
        candidate_len = candidate.len(),
        repaired_len = repaired.len(),
        "direct parse failed, trying repaired candidate"
    );

    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => Ok(Recovered {
            value,
            strategy: RecoveryStrategy::Repaired,
        }),
        Err(err) => {
            debug!(error = %err, "repaired candidate did not parse");
            Err(CoreError::UnparsableOutput {
                raw: raw_text.to_string(),
            })
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    for opener in ["```json", "```JSON", "```"] {
        if let Some(rest) = text.strip_prefix(opener) {
            text = rest;
            break;
        }
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

/// Array span first, then object span, then the whole text.
fn candidate_span(text: &str) -> &str {
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close))
            && end > start
        {
            return &text[start..=end];
        }
    }

    text
}

/// Removes `//` and `/* */` comments that sit outside string literals.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(current) = chars.next() {
        if in_string {
            out.push(current);
            if escaped {
                escaped = false;
            } else if current == '\\' {
                escaped = true;
            } else if current == '"' {
                in_string = false;
            }
            continue;
        }

        match (current, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                out.push(current);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
            }
            _ => out.push(current),
        }
    }

    out
}

/// Drops commas whose next non-whitespace character closes an object or array.
fn strip_trailing_commas(text: &str) -> String {
    let chars = text.chars().collect::<Vec<char>>();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (index, &current) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if current == '\\' {
                escaped = true;
            } else if current == '"' {
                in_string = false;
            }
            out.push(current);
            continue;
        }

        if current == '"' {
            in_string = true;
        } else if current == ',' {
            let next = chars[index + 1..]
                .iter()
                .find(|character| !character.is_whitespace())
                .copied();
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(current);
    }

    out
}
