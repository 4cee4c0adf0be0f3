//! Outbound request construction for the analyze, modify and generate flows.
//!
//! Builders are pure: they read a file snapshot plus user input and never
//! touch the document store.

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use crate::project::{Language, ProjectFile};

/// MIME type declared when neither a data-URL header nor the bytes identify one.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

const IMAGE_DESIGN_CLAUSE: &str = "IMPORTANT: The user has provided an image. Analyze the visual design, layout, colors, and structure of the image and apply it to the code.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&bytes).unwrap_or(DEFAULT_IMAGE_MIME).to_string();
        Self { mime_type, bytes }
    }

    /// Accepts `data:<mime>;base64,<data>` or bare base64.
    pub fn from_data_url(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        let (header, data) = match raw.split_once(',') {
            Some((header, data)) => (Some(header), data),
            None => (None, raw),
        };
        if data.trim().is_empty() {
            bail!("image payload is empty");
        }
        let bytes = BASE64
            .decode(data.trim().as_bytes())
            .context("image base64 decode failed")?;
        let declared = header
            .and_then(|value| value.strip_prefix("data:"))
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let mime_type = declared
            .or_else(|| sniff_mime(&bytes).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
        Ok(Self { mime_type, bytes })
    }

    pub fn base64_data(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data())
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    TextOnly(String),
    TextWithImage {
        text: String,
        image: ImageAttachment,
    },
}

impl RequestPayload {
    pub fn text(&self) -> &str {
        match self {
            Self::TextOnly(text) | Self::TextWithImage { text, .. } => text,
        }
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        match self {
            Self::TextOnly(_) => None,
            Self::TextWithImage { image, .. } => Some(image),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Analyze,
    Modify,
    Generate,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Modify => "modify",
            Self::Generate => "generate",
        }
    }
}

/// The file snapshot and user input a request was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSubject {
    pub file_name: String,
    pub language: Language,
    pub content: String,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub kind: RequestKind,
    pub payload: RequestPayload,
    pub subject: Option<RequestSubject>,
}

impl InferenceRequest {
    pub fn text(&self) -> &str {
        self.payload.text()
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.payload.image()
    }
}

pub fn build_analysis_request(file: &ProjectFile) -> InferenceRequest {
    InferenceRequest {
        kind: RequestKind::Analyze,
        payload: RequestPayload::TextOnly(analysis_instruction(&file.name, &file.content)),
        subject: Some(RequestSubject {
            file_name: file.name.clone(),
            language: file.language,
            content: file.content.clone(),
            instructions: None,
        }),
    }
}

pub fn build_modify_request(
    file: &ProjectFile,
    instructions: &str,
    image: Option<&ImageAttachment>,
) -> InferenceRequest {
    let text = modify_instruction(&file.name, &file.content, instructions, image.is_some());
    let payload = match image {
        Some(image) => RequestPayload::TextWithImage {
            text,
            image: image.clone(),
        },
        None => RequestPayload::TextOnly(text),
    };
    InferenceRequest {
        kind: RequestKind::Modify,
        payload,
        subject: Some(RequestSubject {
            file_name: file.name.clone(),
            language: file.language,
            content: file.content.clone(),
            instructions: Some(instructions.to_string()),
        }),
    }
}

pub fn build_generate_request(prompt: &str) -> InferenceRequest {
    InferenceRequest {
        kind: RequestKind::Generate,
        payload: RequestPayload::TextOnly(prompt.to_string()),
        subject: None,
    }
}

fn analysis_instruction(file_name: &str, content: &str) -> String {
    format!(
        "Please analyze the following source code file named \"{file_name}\".

Provide a response in Markdown format with the following sections:
1. **Summary**: A brief explanation of what the code does.
2. **Key Features**: Bullet points of important logic or styles.
3. **Suggestions**: Potential improvements, best practices, or security considerations.

Code Content:
```
{content}
```
"
    )
}

fn modify_instruction(file_name: &str, content: &str, instructions: &str, has_image: bool) -> String {
    let image_clause = if has_image { IMAGE_DESIGN_CLAUSE } else { "" };
    format!(
        "You are an expert web developer and builder assisting a user in real-time.
The user wants to modify the file \"{file_name}\".

Current Code:
```
{content}
```

User Instructions:
\"{instructions}\"

{image_clause}

Goal: Implement the user's request into the code.

IMPORTANT RULES:
1. **Images**: If the user asks to add an image or photo, use a high-quality random placeholder URL.
   - For specific topics: \"https://source.unsplash.com/random/800x600/?nature\" (replace 'nature' with context).
   - Or use \"https://picsum.photos/800/600\".
2. **No Markdown**: Return ONLY the full, updated content of the file. Do NOT include markdown code fences (like ```html).
3. **No Chat**: Do NOT include any conversational text.
4. **Valid Code**: The output must be valid code for the file type.
"
    )
}
