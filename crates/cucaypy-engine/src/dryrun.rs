use anyhow::{bail, Result};
use cucaypy_contracts::project::Language;
use cucaypy_contracts::prompts::{InferenceRequest, RequestKind, RequestSubject};

use crate::InferenceGateway;

/// Offline gateway with deterministic replies for each request kind.
pub struct DryrunGateway;

impl InferenceGateway for DryrunGateway {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn send(&self, request: &InferenceRequest) -> Result<String> {
        if request.kind == RequestKind::Generate {
            return Ok(format!("dryrun: {}", request.text()));
        }
        let Some(subject) = request.subject.as_ref() else {
            bail!("dryrun {} request is missing its file", request.kind.as_str());
        };
        if request.kind == RequestKind::Analyze {
            return Ok(analysis_stub(subject));
        }

        let instructions = subject.instructions.as_deref().unwrap_or("").trim();
        let note = if request.image().is_some() {
            format!("dryrun (with image): {instructions}")
        } else {
            format!("dryrun: {instructions}")
        };
        let mut body = subject.content.trim_end().to_string();
        if let Some(comment) = subject.language.comment(&note) {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(&comment);
        }
        // Fenced on purpose so the reply goes through the sanitizer like a real one.
        Ok(format!("```{}\n{}\n```", subject.language.fence_tag(), body))
    }
}

fn analysis_stub(subject: &RequestSubject) -> String {
    format!(
        "## Summary\n`{}` is a {} file with {} line(s).\n\n\
         ## Key Features\n- {} characters of source.\n\n\
         ## Suggestions\n- Configure a Gemini API key for a real analysis.\n",
        subject.file_name,
        language_label(subject.language),
        subject.content.lines().count(),
        subject.content.chars().count(),
    )
}

fn language_label(language: Language) -> &'static str {
    match language {
        Language::Html => "HTML",
        Language::Css => "CSS",
        Language::Javascript => "JavaScript",
        Language::Json => "JSON",
        Language::Markdown => "Markdown",
        Language::Plaintext => "plain text",
    }
}
