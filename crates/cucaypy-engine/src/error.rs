use cucaypy_contracts::project::StoreError;
use cucaypy_contracts::prompts::RequestKind;

/// User-facing inference failure. The underlying error is logged where the
/// failure is classified and never carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.message())]
pub struct InferenceFailure {
    pub kind: RequestKind,
}

impl InferenceFailure {
    pub fn new(kind: RequestKind) -> Self {
        Self { kind }
    }

    pub fn message(&self) -> &'static str {
        match self.kind {
            RequestKind::Analyze => {
                "Failed to analyze code. Please check your API key and try again."
            }
            RequestKind::Modify => "Failed to modify code. Please try again.",
            RequestKind::Generate => {
                "Failed to generate content. Check your API key and the server logs."
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Inference(#[from] InferenceFailure),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("another request is already in flight")]
    Busy,

    #[error("{0}")]
    EmptyRequest(&'static str),

    #[error("session state lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use cucaypy_contracts::project::StoreError;
    use cucaypy_contracts::prompts::RequestKind;

    use super::{InferenceFailure, SessionError};

    #[test]
    fn failure_messages_are_fixed_per_call_site() {
        assert_eq!(
            InferenceFailure::new(RequestKind::Analyze).to_string(),
            "Failed to analyze code. Please check your API key and try again."
        );
        assert_eq!(
            SessionError::from(InferenceFailure::new(RequestKind::Modify)).to_string(),
            "Failed to modify code. Please try again."
        );
    }

    #[test]
    fn invalid_selection_is_reported() {
        let err = SessionError::from(StoreError::InvalidSelection("nope.html".to_string()));
        assert_eq!(err.to_string(), "file 'nope.html' is not part of the project");
    }
}
