//! Splicing model values back into symbolic trace lines.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::ModelMap;

/// Marker appended after a variable whose value has been filled in.
const FILLED_MARKER: &str = "(=";

#[allow(clippy::expect_used)] // Literal pattern, checked by the unit tests.
static VARIABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?[\w.]+@\d+\b").expect("variable pattern compiles"));

/// Annotate every variable reference in `line` with its model value.
///
/// A reference is `<optional $><word or dot characters>@<digits>`. Each
/// reference bound in `model` becomes `reference(=value)`. References that
/// already carry a value, and references inside such a value, are left
/// untouched, so the rewrite is idempotent.
#[must_use]
pub fn fill_in_values(line: &str, model: &ModelMap) -> String {
    if model.is_empty() {
        return line.to_owned();
    }

    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    let mut annotated_until = 0;

    for found in VARIABLE_PATTERN.find_iter(line) {
        if found.start() < annotated_until {
            continue;
        }
        let variable = found.as_str();
        if line[found.end()..].starts_with(FILLED_MARKER) {
            annotated_until = annotation_end(line, found.end());
            continue;
        }
        let Some(value) = model.get(variable) else {
            continue;
        };
        out.push_str(&line[cursor..found.end()]);
        out.push_str(FILLED_MARKER);
        out.push_str(value);
        out.push(')');
        cursor = found.end();
    }

    out.push_str(&line[cursor..]);
    out
}

/// Byte index just past the `(=...)` annotation opening at `start`.
fn annotation_end(line: &str, start: usize) -> usize {
    let mut depth = 0_usize;
    for (offset, ch) in line[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return start + offset + 1;
                }
            }
            _ => {}
        }
    }
    line.len()
}

/// Distinct variable references in `line`, in order of first occurrence.
#[must_use]
pub fn variable_references(line: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    VARIABLE_PATTERN
        .find_iter(line)
        .map(|m| m.as_str())
        .filter(|v| seen.insert(*v))
        .collect()
}
