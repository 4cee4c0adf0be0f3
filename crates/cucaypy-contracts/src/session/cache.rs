use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::project::{content_digest, DocumentStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub content: String,
    /// Digest of the file content the analysis was computed against.
    pub content_digest: String,
}

/// Analysis text keyed by file name.
///
/// Entries are removed whenever their file's content changes, so a hit is
/// never stale relative to the document it describes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisCache {
    entries: BTreeMap<String, CachedAnalysis>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, CachedAnalysis>) -> Self {
        Self { entries }
    }

    pub fn get(&self, file_name: &str) -> Option<&str> {
        self.entries
            .get(file_name)
            .map(|entry| entry.content.as_str())
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains_key(file_name)
    }

    pub fn insert(&mut self, file_name: &str, analysis: impl Into<String>, source_content: &str) {
        self.entries.insert(
            file_name.to_string(),
            CachedAnalysis {
                content: analysis.into(),
                content_digest: content_digest(source_content),
            },
        );
    }

    /// Returns whether an entry was removed; missing entries are a no-op.
    pub fn invalidate(&mut self, file_name: &str) -> bool {
        self.entries.remove(file_name).is_some()
    }

    /// Drops entries whose file is gone or whose content has changed since
    /// the analysis ran. Returns the dropped names.
    pub fn retain_fresh(&mut self, documents: &DocumentStore) -> Vec<String> {
        let mut dropped = Vec::new();
        self.entries.retain(|name, entry| {
            let fresh = documents
                .get(name)
                .map(|file| file.digest() == entry.content_digest)
                .unwrap_or(false);
            if !fresh {
                dropped.push(name.clone());
            }
            fresh
        });
        dropped
    }

    pub fn entries(&self) -> &BTreeMap<String, CachedAnalysis> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::AnalysisCache;
    use crate::project::{DocumentStore, ProjectFile};

    #[test]
    fn insert_get_and_invalidate() {
        let mut cache = AnalysisCache::new();
        cache.insert("index.html", "## Summary", "<body></body>");
        assert_eq!(cache.get("index.html"), Some("## Summary"));
        assert!(cache.invalidate("index.html"));
        assert_eq!(cache.get("index.html"), None);
    }

    #[test]
    fn invalidate_missing_entry_is_noop() {
        let mut cache = AnalysisCache::new();
        cache.insert("style.css", "css notes", "body {}");
        assert!(!cache.invalidate("index.html"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn retain_fresh_drops_changed_and_unknown_files() {
        let documents = DocumentStore::new(vec![
            ProjectFile::new("index.html", "<body></body>"),
            ProjectFile::new("style.css", "body { color: red }"),
        ])
        .unwrap();
        let mut cache = AnalysisCache::new();
        cache.insert("index.html", "fresh", "<body></body>");
        cache.insert("style.css", "stale", "body {}");
        cache.insert("gone.js", "orphan", "");

        let mut dropped = cache.retain_fresh(&documents);
        dropped.sort();
        assert_eq!(dropped, vec!["gone.js", "style.css"]);
        assert_eq!(cache.get("index.html"), Some("fresh"));
        assert_eq!(cache.len(), 1);
    }
}
