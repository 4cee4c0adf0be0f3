use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub lines_added: u64,
    pub lines_removed: u64,
}

impl DiffStats {
    pub fn is_unchanged(&self) -> bool {
        self.lines_added == 0 && self.lines_removed == 0
    }
}

pub fn diff_stats(previous: &str, current: &str) -> DiffStats {
    let diff = TextDiff::from_lines(previous, current);
    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.lines_added += 1,
            ChangeTag::Delete => stats.lines_removed += 1,
            ChangeTag::Equal => {}
        }
    }
    stats
}

pub fn unified_diff(name: &str, previous: &str, current: &str) -> String {
    TextDiff::from_lines(previous, current)
        .unified_diff()
        .header(&format!("a/{name}"), &format!("b/{name}"))
        .to_string()
}
