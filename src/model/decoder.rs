//! Tokenizer and value simplification for counterexample models.
//!
//! Decoding runs as a fixed pipeline:
//!
//! | Step | Action                                                         |
//! |------|----------------------------------------------------------------|
//! | 1    | Check the surrounding quotes and strip them                    |
//! | 2    | Split on whitespace (collapsing runs to one separator)         |
//! | 3    | Elide function bindings `name -> { ... }`                      |
//! | 4    | Consume `(name, ->, value)` triples, re-assembling `(` values  |
//! | 5    | Simplify each value: snapshot, then `!val!`, then identity     |

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::{AppError, Result};

/// Substring identifying solver snapshot values.
pub const SNAPSHOT_MARKER: &str = "$Snap.";

/// Placeholder stored for snapshot values.
pub const SNAPSHOT_PLACEHOLDER: &str = "_";

#[allow(clippy::expect_used)] // Literal pattern, checked by the unit tests.
static VAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$?([^\s!$()\[\]{}]+)!val!(\d+)").expect("val pattern compiles")
});

/// Running nesting depth over `(`, `[`, `{` and their closers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BracketCounter {
    depth: i64,
}

impl BracketCounter {
    /// Start at depth zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for every bracket in `token`.
    pub fn feed(&mut self, token: &str) {
        for ch in token.chars() {
            match ch {
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth -= 1,
                _ => {}
            }
        }
    }

    /// Current depth; negative when closers outnumber openers.
    #[must_use]
    pub fn depth(&self) -> i64 {
        self.depth
    }

    /// Whether every opener seen so far has been closed.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.depth == 0
    }
}

/// Strip the surrounding quotes from a model dump.
///
/// # Errors
///
/// Returns `AppError::MalformedModel` if either quote is missing.
pub fn strip_quotes(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('"') || !trimmed.ends_with('"') {
        return Err(AppError::MalformedModel(
            "model is expected to be in quotes".into(),
        ));
    }
    Ok(&trimmed[1..trimmed.len() - 1])
}

/// Split the model body into tokens and drop function-valued bindings.
#[must_use]
pub fn tokenize(body: &str) -> Vec<&str> {
    let raw: Vec<&str> = body.split_whitespace().collect();
    let mut tokens = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let is_function = raw.get(i + 1) == Some(&"->")
            && raw.get(i + 2).is_some_and(|t| t.starts_with('{'));
        if is_function {
            // Skip the name and arrow, then the body through its first closer.
            let mut j = i + 2;
            while j < raw.len() && !raw[j].contains('}') {
                j += 1;
            }
            i = j + 1;
            continue;
        }
        tokens.push(raw[i]);
        i += 1;
    }

    tokens
}

/// Reduce a raw value to its displayable form.
#[must_use]
pub fn simplify_value(value: &str) -> String {
    if value.contains(SNAPSHOT_MARKER) {
        return SNAPSHOT_PLACEHOLDER.to_owned();
    }
    if let Some(caps) = VAL_PATTERN.captures(value) {
        return format!("{}_{}", &caps[1], &caps[2]);
    }
    value.to_owned()
}

/// Re-assemble the value starting at `start`.
///
/// Returns the value and the index of the last token it consumed.
fn assemble_value(tokens: &[&str], start: usize) -> (String, usize) {
    let mut value = tokens[start].to_owned();
    let mut end = start;

    if value.starts_with('(') {
        let mut brackets = BracketCounter::new();
        brackets.feed(&value);
        while !(value.ends_with(')') && brackets.is_balanced()) && end + 1 < tokens.len() {
            end += 1;
            brackets.feed(tokens[end]);
            value.push(' ');
            value.push_str(tokens[end]);
        }
    }

    (value, end)
}

/// Decode `raw` and insert its bindings into `values`.
///
/// A truncated trailing binding stops decoding with a warning; bindings
/// stored before it are kept.
///
/// # Errors
///
/// Returns `AppError::MalformedModel` if the quoting precondition fails.
pub fn decode_into(raw: &str, values: &mut HashMap<String, String>) -> Result<()> {
    let body = strip_quotes(raw)?;
    let tokens = tokenize(body);

    let mut i = 0;
    while i < tokens.len() {
        let name = tokens[i];
        if i + 2 >= tokens.len() {
            let err = AppError::MalformedModel(format!("binding for {name} has no value"));
            warn!(%err, decoded = values.len(), "stopping model decoding");
            break;
        }

        let (value, end) = assemble_value(&tokens, i + 2);
        values.insert(name.to_owned(), simplify_value(&value));
        i = end + 1;
    }

    Ok(())
}
