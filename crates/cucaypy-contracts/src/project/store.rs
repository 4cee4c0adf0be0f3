use indexmap::IndexMap;

use super::file::ProjectFile;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("a project needs at least one file")]
    Empty,

    #[error("duplicate file name '{0}'")]
    DuplicateName(String),

    #[error("file '{0}' is not part of the project")]
    InvalidSelection(String),
}

/// Named project files with exactly one active file.
///
/// Files are never removed, so the active index stays valid for the
/// lifetime of the store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    files: IndexMap<String, ProjectFile>,
    active: usize,
}

impl DocumentStore {
    /// The first file becomes active.
    pub fn new(files: Vec<ProjectFile>) -> Result<Self, StoreError> {
        if files.is_empty() {
            return Err(StoreError::Empty);
        }
        let mut map = IndexMap::with_capacity(files.len());
        for file in files {
            if map.contains_key(&file.name) {
                return Err(StoreError::DuplicateName(file.name));
            }
            map.insert(file.name.clone(), file);
        }
        Ok(Self {
            files: map,
            active: 0,
        })
    }

    pub fn list_files(&self) -> impl Iterator<Item = &ProjectFile> {
        self.files.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ProjectFile> {
        self.files.get(name)
    }

    pub fn active(&self) -> &ProjectFile {
        &self.files[self.active]
    }

    pub fn active_name(&self) -> &str {
        self.active().name.as_str()
    }

    pub fn set_active(&mut self, name: &str) -> Result<(), StoreError> {
        let index = self
            .files
            .get_index_of(name)
            .ok_or_else(|| StoreError::InvalidSelection(name.to_string()))?;
        self.active = index;
        Ok(())
    }

    /// Returns the previous content.
    pub fn replace_content(
        &mut self,
        name: &str,
        content: impl Into<String>,
    ) -> Result<String, StoreError> {
        let file = self
            .files
            .get_mut(name)
            .ok_or_else(|| StoreError::InvalidSelection(name.to_string()))?;
        Ok(std::mem::replace(&mut file.content, content.into()))
    }
}
