//! Text models the Gemini gateway can target, and request-time selection.

use std::fmt;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Text,
    /// Accepts an inline image alongside the prompt.
    Vision,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Vision => "vision",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub capabilities: &'static [Capability],
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

const TEXT_AND_VISION: &[Capability] = &[Capability::Text, Capability::Vision];

/// First entry supporting a capability is its default.
pub const KNOWN_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: DEFAULT_TEXT_MODEL,
        capabilities: TEXT_AND_VISION,
    },
    ModelSpec {
        name: "gemini-2.5-pro",
        capabilities: TEXT_AND_VISION,
    },
    ModelSpec {
        name: "gemini-2.5-flash-lite",
        capabilities: TEXT_AND_VISION,
    },
    ModelSpec {
        name: "gemini-2.0-flash",
        capabilities: TEXT_AND_VISION,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no model available for capability '{0}'")]
pub struct NoModelAvailable(pub Capability);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: &'static ModelSpec,
    /// Why the requested model was not used, if it wasn't.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    models: &'static [ModelSpec],
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self {
            models: KNOWN_MODELS,
        }
    }
}

impl ModelSelector {
    pub fn new(models: &'static [ModelSpec]) -> Self {
        Self { models }
    }

    pub fn get(&self, name: &str) -> Option<&'static ModelSpec> {
        let name = name.trim();
        let name = name.strip_prefix("models/").unwrap_or(name);
        self.models.iter().find(|model| model.name == name)
    }

    /// Uses `requested` when it is known and has `capability`, otherwise the
    /// first model that does.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, NoModelAvailable> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = match requested.map(|name| (name, self.get(name))) {
            Some((_, Some(model))) if model.supports(capability) => {
                return Ok(ModelSelection {
                    model,
                    fallback_reason: None,
                });
            }
            Some((name, Some(_))) => format!("model '{name}' does not support {capability}"),
            Some((name, None)) => format!("unknown model '{name}'"),
            None => "no model requested".to_string(),
        };
        let model = self
            .models
            .iter()
            .find(|model| model.supports(capability))
            .ok_or(NoModelAvailable(capability))?;
        Ok(ModelSelection {
            model,
            fallback_reason: Some(fallback_reason),
        })
    }
}
