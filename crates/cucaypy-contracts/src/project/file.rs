use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Html,
    Css,
    Javascript,
    Json,
    Markdown,
    Plaintext,
}

impl Language {
    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "js" | "mjs" | "cjs" | "jsx" => Self::Javascript,
            "json" => Self::Json,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Plaintext,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Javascript => "javascript",
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Plaintext => "plaintext",
        }
    }

    /// Tag used after an opening code fence.
    pub fn fence_tag(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Javascript => "javascript",
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Plaintext => "",
        }
    }

    /// Wraps `text` in this language's comment syntax. JSON has none.
    pub fn comment(self, text: &str) -> Option<String> {
        let flat = text.replace(['\r', '\n'], " ");
        match self {
            Self::Html | Self::Markdown => Some(format!("<!-- {} -->", flat.replace("--", "- -"))),
            Self::Css | Self::Javascript => Some(format!("/* {} */", flat.replace("*/", "* /"))),
            Self::Plaintext => Some(format!("# {flat}")),
            Self::Json => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    pub language: Language,
    pub content: String,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            language: Language::from_file_name(&name),
            name,
            content: content.into(),
        }
    }

    pub fn digest(&self) -> String {
        content_digest(&self.content)
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
