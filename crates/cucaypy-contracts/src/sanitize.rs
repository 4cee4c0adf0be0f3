//! Turns a raw modify reply into source text.
//!
//! Models are told not to fence their output but often do anyway, sometimes
//! only on one side. Analysis replies are Markdown and skip this step.

const FENCE: &str = "```";

pub fn clean(raw: &str) -> String {
    let text = raw.trim();
    if let Some(inner) = unwrap_fenced_block(text) {
        return inner.trim().to_string();
    }
    strip_trailing_fence(strip_leading_fence(text))
        .trim()
        .to_string()
}

/// Inner content when `text` is a single block fenced at both ends.
fn unwrap_fenced_block(text: &str) -> Option<&str> {
    if text.len() < FENCE.len() * 2 || !text.starts_with(FENCE) || !text.ends_with(FENCE) {
        return None;
    }
    let body = &text[FENCE.len()..text.len() - FENCE.len()];
    Some(skip_language_tag(body).trim_end())
}

fn strip_leading_fence(text: &str) -> &str {
    match text.strip_prefix(FENCE) {
        Some(rest) => skip_language_tag(rest),
        None => text,
    }
}

fn strip_trailing_fence(text: &str) -> &str {
    match text.strip_suffix(FENCE) {
        Some(rest) => rest.trim_end(),
        None => text,
    }
}

fn skip_language_tag(text: &str) -> &str {
    text.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric() || ch == '_')
        .trim_start()
}
