//! Flow key extraction and value normalization shared by the index builder
//! and both labeling modes.

use std::{fmt, sync::OnceLock};

use regex::Regex;

const KEY_SEPARATOR: &str = "\u{1f}";
const ABSENT_MARKERS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

fn float_artifact() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([+-]?\d+)\.0+$").expect("valid float artifact regex"))
}

/// Normalizes one key component.
///
/// Surrounding whitespace and single/double quotes are removed, and integral
/// values serialized as floats (`80.0`) lose their fractional suffix. Dotted
/// quads such as `10.0.0.0` are left untouched. Returns `None` when the value
/// is empty or a missing-value marker.
pub fn normalize_component(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim();
    if trimmed.is_empty() || ABSENT_MARKERS.contains(&trimmed) {
        return None;
    }
    if let Some(captures) = float_artifact().captures(trimmed) {
        return Some(captures[1].to_string());
    }
    Some(trimmed.to_string())
}

/// Whether a label value counts as "no value" when coalescing.
pub fn is_absent(raw: &str) -> bool {
    normalize_component(raw).is_none()
}

/// Ordered tuple of normalized key components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey(Vec<String>);

impl FlowKey {
    /// Builds a key from the values at `positions`; `None` when any component
    /// is absent so a row never contributes a partial key.
    pub fn from_row(row: &[String], positions: &[usize]) -> Option<Self> {
        positions
            .iter()
            .map(|idx| row.get(*idx).and_then(|v| normalize_component(v)))
            .collect::<Option<Vec<_>>>()
            .map(FlowKey)
    }

    pub fn from_parts<I, S>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        parts
            .into_iter()
            .map(|part| normalize_component(part.as_ref()))
            .collect::<Option<Vec<_>>>()
            .map(FlowKey)
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(KEY_SEPARATOR))
    }
}

/// Positions of `columns` within `headers`, or the list of names not found.
pub fn column_positions(
    headers: &[String],
    columns: &[String],
) -> std::result::Result<Vec<usize>, Vec<String>> {
    let mut positions = Vec::with_capacity(columns.len());
    let mut missing = Vec::new();
    for name in columns {
        match headers.iter().position(|h| h.trim() == name.as_str()) {
            Some(idx) => positions.push(idx),
            None => missing.push(name.clone()),
        }
    }
    if missing.is_empty() {
        Ok(positions)
    } else {
        Err(missing)
    }
}
