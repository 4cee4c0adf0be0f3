mod diff;
mod file;
mod store;

use std::path::Path;

use anyhow::Context;

pub use diff::{diff_stats, unified_diff, DiffStats};
pub use file::{content_digest, Language, ProjectFile};
pub use store::{DocumentStore, StoreError};

/// Reads the regular, non-hidden files directly under `dir`, sorted by name.
/// Files that are not valid UTF-8 are skipped.
pub fn read_project_dir(dir: &Path) -> anyhow::Result<Vec<ProjectFile>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed reading {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        files.push(ProjectFile::new(name, content));
    }
    files.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(files)
}
