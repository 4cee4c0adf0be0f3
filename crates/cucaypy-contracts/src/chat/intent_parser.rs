use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{command_spec, quick_action, ArgKind};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    /// Modify instruction, for `modify` intents.
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn modify(raw: &str, prompt: &str) -> Self {
        let mut intent = Self::new("modify", raw);
        intent.prompt = Some(prompt.to_string());
        intent
    }

    fn with_arg(mut self, key: &str, value: impl Into<String>) -> Self {
        self.command_args
            .insert(key.to_string(), Value::String(value.into()));
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// `/name rest` split into the lowercased name and the trimmed rest. A slash
/// not followed by a word character does not start a command.
fn split_command(text: &str) -> Option<(String, &str)> {
    let tail = text.strip_prefix('/')?;
    let end = tail
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .unwrap_or(tail.len());
    if end == 0 {
        return None;
    }
    Some((tail[..end].to_ascii_lowercase(), tail[end..].trim()))
}

fn unquote_path(arg: &str) -> String {
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<String>>()
            .join(" "),
        Err(_) => arg.to_string(),
    }
}

/// Slash commands map to actions; any other non-empty line is a modify
/// instruction for the active file.
pub fn parse_intent(text: &str) -> Intent {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Intent::new("noop", text);
    }
    let Some((command, arg)) = split_command(trimmed) else {
        return Intent::modify(text, trimmed);
    };

    if let Some(spec) = command_spec(&command) {
        let intent = Intent::new(spec.action, text);
        return match spec.arg {
            ArgKind::None => intent,
            ArgKind::Path(key) => intent.with_arg(key, unquote_path(arg)),
            ArgKind::Raw(key) => intent.with_arg(key, arg),
        };
    }
    if let Some(quick) = quick_action(&command) {
        return Intent::modify(text, quick.prompt).with_arg("quick_action", command);
    }
    Intent::new("unknown", text)
        .with_arg("command", command)
        .with_arg("arg", arg)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;
    use crate::chat::QUICK_ACTIONS;

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn plain_text_is_a_modify_instruction() {
        let intent = parse_intent("  add a footer ");
        assert_eq!(intent.action, "modify");
        assert_eq!(intent.prompt.as_deref(), Some("add a footer"));
    }

    #[test]
    fn parse_open_and_image_paths() {
        let open = parse_intent("/open style.css");
        assert_eq!(open.action, "select_file");
        assert_eq!(open.arg_str("path"), Some("style.css"));

        let image = parse_intent("/image \"/tmp/my mock.png\"");
        assert_eq!(image.action, "attach_image");
        assert_eq!(image.command_args["path"], json!("/tmp/my mock.png"));
    }

    #[test]
    fn parse_model_command() {
        let intent = parse_intent("/model gemini-2.5-pro");
        assert_eq!(intent.action, "set_model");
        assert_eq!(intent.arg_str("model"), Some("gemini-2.5-pro"));
        assert_eq!(parse_intent("/model").arg_str("model"), None);
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/files").action, "list_files");
        assert_eq!(parse_intent("/ANALYZE").action, "analyze");
        assert_eq!(parse_intent("/clear_image").action, "clear_image");
        assert_eq!(parse_intent("/save").action, "save");
        assert_eq!(parse_intent("/help").action, "help");
    }

    #[test]
    fn quick_actions_expand_to_their_prompt() {
        for quick in QUICK_ACTIONS {
            let intent = parse_intent(&format!("/{}", quick.command));
            assert_eq!(intent.action, "modify");
            assert_eq!(intent.prompt.as_deref(), Some(quick.prompt));
            assert_eq!(intent.command_args["quick_action"], json!(quick.command));
        }
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }

    #[test]
    fn lone_slash_is_treated_as_text() {
        let intent = parse_intent("/ make it blue");
        assert_eq!(intent.action, "modify");
        assert_eq!(intent.prompt.as_deref(), Some("/ make it blue"));
    }
}
