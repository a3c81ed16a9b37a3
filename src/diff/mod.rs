//! Diff support for resource reconciliation.
//!
//! - [`structural`]: mapping-level comparison used to decide whether a command
//!   is needed (`remove_empties`, `dict_diff`, `dict_merge`, `is_subset`).
//! - [`render_json_diff`]: a unified text diff of before/after facts, shown to
//!   the operator when diff mode is on.
//!
//! # Example
//!
//! ```rust
//! use opengear_om::diff::render_json_diff;
//! use serde_json::json;
//!
//! let before = json!({"hostname": "om1"});
//! let after = json!({"hostname": "om2"});
//! let text = render_json_diff(&before, &after, 3).unwrap();
//! assert!(text.contains("-  \"hostname\": \"om1\""));
//! assert!(text.contains("+  \"hostname\": \"om2\""));
//! ```

pub mod structural;

pub use structural::{
    dict_diff, dict_merge, is_empty_value, is_subset, normalized_eq, remove_empties,
    remove_empties_value, values_equal,
};

use serde_json::Value;
use similar::{ChangeTag, TextDiff};

/// Line counts of a rendered diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffStats {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.insertions > 0 || self.deletions > 0
    }
}

/// Count inserted and deleted lines between two texts.
pub fn diff_stats(old: &str, new: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    for change in TextDiff::from_lines(old, new).iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.insertions += 1,
            ChangeTag::Delete => stats.deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    stats
}

/// Unified diff of the pretty-printed JSON of `before` and `after`.
///
/// Returns `None` when both render identically.
pub fn render_json_diff(before: &Value, after: &Value, context_lines: usize) -> Option<String> {
    let old = pretty(before);
    let new = pretty(after);

    if old == new {
        return None;
    }

    let text_diff = TextDiff::from_lines(&old, &new);
    let unified = text_diff
        .unified_diff()
        .context_radius(context_lines)
        .header("before", "after")
        .to_string();

    Some(unified)
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}
