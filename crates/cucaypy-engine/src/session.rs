//! Session controller for the analyze and modify flows.
//!
//! State lives behind one mutex that is never held across an inference call.
//! A [`FlightGate`] permit keeps at most one call outstanding, and every
//! response is applied to the file captured when its request started.

use std::sync::{Arc, Mutex, MutexGuard};

use cucaypy_contracts::chat::{ChatMessage, ChatTranscript, Role};
use cucaypy_contracts::events::EventWriter;
use cucaypy_contracts::project::{
    content_digest, diff_stats, DiffStats, DocumentStore, ProjectFile,
};
use cucaypy_contracts::prompts::{
    build_analysis_request, build_modify_request, ImageAttachment, RequestKind,
};
use cucaypy_contracts::sanitize::clean;
use cucaypy_contracts::session::{
    AnalysisCache, BlobStore, Flow, FlowStates, FlowStatus, ProjectSnapshot, RestoredSession,
};
use serde_json::json;

use crate::error::{InferenceFailure, SessionError};
use crate::flight::FlightGate;
use crate::gemini::error_chain_text;
use crate::{emit_event, InferenceGateway};

const EMPTY_ANALYSIS: &str = "No analysis could be generated.";
const IMAGE_ONLY_REQUEST: &str = "Generated code from image";
const MODIFY_FAILED_REPLY: &str =
    "I encountered an error while trying to update the code. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub file_name: String,
    pub content: String,
    /// True when served from the cache without a gateway call.
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyReport {
    pub file_name: String,
    pub previous: String,
    pub current: String,
    pub stats: DiffStats,
}

/// Everything a front end shows for the active file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFileView {
    pub file: ProjectFile,
    pub analysis: Option<String>,
    pub analysis_status: FlowStatus,
    pub builder_status: FlowStatus,
}

#[derive(Debug)]
struct SessionState {
    documents: DocumentStore,
    analyses: AnalysisCache,
    transcript: ChatTranscript,
    statuses: FlowStates,
}

pub struct SessionController {
    gateway: Arc<dyn InferenceGateway>,
    state: Mutex<SessionState>,
    flight: FlightGate,
    events: Option<EventWriter>,
}

impl SessionController {
    pub fn new(documents: DocumentStore, gateway: Arc<dyn InferenceGateway>) -> Self {
        Self::from_parts(
            documents,
            AnalysisCache::new(),
            ChatTranscript::new(),
            gateway,
        )
    }

    pub fn restore(restored: RestoredSession, gateway: Arc<dyn InferenceGateway>) -> Self {
        if !restored.dropped_analyses.is_empty() {
            log::info!(
                "dropped stale cached analyses: {}",
                restored.dropped_analyses.join(", ")
            );
        }
        Self::from_parts(
            restored.documents,
            restored.analyses,
            restored.transcript,
            gateway,
        )
    }

    /// Restores the last saved session from `store`, if there is one.
    pub fn load(
        store: &dyn BlobStore,
        gateway: Arc<dyn InferenceGateway>,
    ) -> anyhow::Result<Option<Self>> {
        let Some(snapshot) = ProjectSnapshot::from_blob(&store.load()?)? else {
            return Ok(None);
        };
        let restored = snapshot.restore()?;
        Ok(Some(Self::restore(restored, gateway)))
    }

    fn from_parts(
        documents: DocumentStore,
        analyses: AnalysisCache,
        transcript: ChatTranscript,
        gateway: Arc<dyn InferenceGateway>,
    ) -> Self {
        let mut statuses = FlowStates::new();
        for name in analyses.entries().keys() {
            statuses.set(Flow::Analysis, name, FlowStatus::Success);
        }
        Self {
            gateway,
            state: Mutex::new(SessionState {
                documents,
                analyses,
                transcript,
                statuses,
            }),
            flight: FlightGate::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        let started = self.lock_state().map(|state| {
            json!({
                "gateway": self.gateway.name(),
                "files": state.documents.names(),
                "active_file": state.documents.active_name(),
                "messages": state.transcript.len(),
            })
        });
        if let Ok(payload) = started {
            self.emit("session_started", payload);
        }
        self
    }

    pub fn set_gateway(&mut self, gateway: Arc<dyn InferenceGateway>) {
        log::info!("switching gateway to {}", gateway.name());
        self.gateway = gateway;
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Analyzes the active file, serving a cached analysis when one exists.
    pub fn analyze(&self) -> Result<AnalysisReport, SessionError> {
        let (file, _permit) = {
            let mut state = self.lock_state()?;
            let file = state.documents.active().clone();
            if let Some(cached) = state.analyses.get(&file.name).map(str::to_string) {
                state.statuses.set(Flow::Analysis, &file.name, FlowStatus::Success);
                drop(state);
                self.emit("analysis_cached", json!({ "file": file.name }));
                return Ok(AnalysisReport {
                    file_name: file.name,
                    content: cached,
                    cached: true,
                });
            }
            let permit = self.flight.try_acquire().ok_or(SessionError::Busy)?;
            state.statuses.set(Flow::Analysis, &file.name, FlowStatus::Loading);
            (file, permit)
        };
        self.emit(
            "analysis_started",
            json!({ "file": file.name, "gateway": self.gateway.name() }),
        );

        let result = self.gateway.send(&build_analysis_request(&file));
        let mut state = self.lock_state()?;
        match result {
            Ok(reply) => {
                let content = if reply.trim().is_empty() {
                    EMPTY_ANALYSIS.to_string()
                } else {
                    reply
                };
                state.analyses.insert(&file.name, content.clone(), &file.content);
                state.statuses.set(Flow::Analysis, &file.name, FlowStatus::Success);
                drop(state);
                self.emit(
                    "analysis_finished",
                    json!({ "file": file.name, "chars": content.chars().count() }),
                );
                Ok(AnalysisReport {
                    file_name: file.name,
                    content,
                    cached: false,
                })
            }
            Err(err) => {
                log::error!("analysis of {} failed: {err:#}", file.name);
                state.statuses.set(Flow::Analysis, &file.name, FlowStatus::Error);
                drop(state);
                self.emit(
                    "analysis_failed",
                    json!({ "file": file.name, "error": error_chain_text(&err, 400) }),
                );
                Err(InferenceFailure::new(RequestKind::Analyze).into())
            }
        }
    }

    /// Rewrites the active file from `instructions` and an optional image.
    pub fn modify(
        &self,
        instructions: &str,
        image: Option<ImageAttachment>,
    ) -> Result<ModifyReport, SessionError> {
        let instructions = instructions.trim();
        if instructions.is_empty() && image.is_none() {
            return Err(SessionError::EmptyRequest(
                "instructions or an image are required",
            ));
        }
        let _permit = self.flight.try_acquire().ok_or(SessionError::Busy)?;

        let file = {
            let mut state = self.lock_state()?;
            let file = state.documents.active().clone();
            let content = if instructions.is_empty() {
                IMAGE_ONLY_REQUEST
            } else {
                instructions
            };
            state.transcript.push(
                ChatMessage::new(Role::User, content)
                    .with_image(image.as_ref().map(ImageAttachment::to_data_url)),
            );
            state.statuses.set(Flow::Builder, &file.name, FlowStatus::Loading);
            file
        };
        self.emit(
            "modify_started",
            json!({
                "file": file.name,
                "gateway": self.gateway.name(),
                "has_image": image.is_some(),
            }),
        );

        let request = build_modify_request(&file, instructions, image.as_ref());
        let result = self.gateway.send(&request);
        let mut state = self.lock_state()?;
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("modify of {} failed: {err:#}", file.name);
                state
                    .transcript
                    .push(ChatMessage::new(Role::Assistant, MODIFY_FAILED_REPLY));
                state.statuses.set(Flow::Builder, &file.name, FlowStatus::Error);
                drop(state);
                self.emit(
                    "modify_failed",
                    json!({ "file": file.name, "error": error_chain_text(&err, 400) }),
                );
                return Err(InferenceFailure::new(RequestKind::Modify).into());
            }
        };

        let current = clean(&reply);
        let previous = match state.documents.replace_content(&file.name, current.clone()) {
            Ok(previous) => previous,
            Err(err) => {
                state.statuses.set(Flow::Builder, &file.name, FlowStatus::Error);
                return Err(err.into());
            }
        };
        if state.analyses.invalidate(&file.name) {
            state.statuses.set(Flow::Analysis, &file.name, FlowStatus::Idle);
        }
        state.transcript.push(ChatMessage::new(
            Role::Assistant,
            format!("I've updated {} based on your request.", file.name),
        ));
        state.statuses.set(Flow::Builder, &file.name, FlowStatus::Idle);
        drop(state);

        let stats = diff_stats(&previous, &current);
        self.emit(
            "file_updated",
            json!({
                "file": file.name,
                "previous_digest": content_digest(&previous),
                "digest": content_digest(&current),
                "lines_added": stats.lines_added,
                "lines_removed": stats.lines_removed,
            }),
        );
        Ok(ModifyReport {
            file_name: file.name,
            previous,
            current,
            stats,
        })
    }

    /// Makes `name` the active file. Never calls the gateway.
    pub fn select_file(&self, name: &str) -> Result<ActiveFileView, SessionError> {
        let mut state = self.lock_state()?;
        state.documents.set_active(name)?;
        if state.statuses.get(Flow::Analysis, name) != FlowStatus::Loading {
            let status = if state.analyses.contains(name) {
                FlowStatus::Success
            } else {
                FlowStatus::Idle
            };
            state.statuses.set(Flow::Analysis, name, status);
        }
        let view = active_view(&state);
        drop(state);
        self.emit("file_selected", json!({ "file": view.file.name }));
        Ok(view)
    }

    pub fn active_file(&self) -> Result<ProjectFile, SessionError> {
        Ok(self.lock_state()?.documents.active().clone())
    }

    pub fn active_view(&self) -> Result<ActiveFileView, SessionError> {
        let state = self.lock_state()?;
        Ok(active_view(&state))
    }

    pub fn files(&self) -> Result<Vec<ProjectFile>, SessionError> {
        Ok(self.lock_state()?.documents.list_files().cloned().collect())
    }

    pub fn file(&self, name: &str) -> Result<Option<ProjectFile>, SessionError> {
        Ok(self.lock_state()?.documents.get(name).cloned())
    }

    pub fn analysis(&self, name: &str) -> Result<Option<String>, SessionError> {
        Ok(self.lock_state()?.analyses.get(name).map(str::to_string))
    }

    pub fn transcript(&self) -> Result<Vec<ChatMessage>, SessionError> {
        Ok(self.lock_state()?.transcript.messages().to_vec())
    }

    pub fn status(&self, flow: Flow, name: &str) -> Result<FlowStatus, SessionError> {
        Ok(self.lock_state()?.statuses.get(flow, name))
    }

    pub fn analysis_status(&self, name: &str) -> Result<FlowStatus, SessionError> {
        self.status(Flow::Analysis, name)
    }

    pub fn builder_status(&self, name: &str) -> Result<FlowStatus, SessionError> {
        self.status(Flow::Builder, name)
    }

    pub fn snapshot(&self) -> Result<ProjectSnapshot, SessionError> {
        let state = self.lock_state()?;
        Ok(ProjectSnapshot::capture(
            &state.documents,
            &state.analyses,
            &state.transcript,
        ))
    }

    pub fn save(&self, store: &dyn BlobStore) -> anyhow::Result<()> {
        let snapshot = self.snapshot()?;
        store.save(&snapshot.to_blob()?)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        self.state.lock().map_err(|_| SessionError::Poisoned)
    }

    fn emit(&self, event_type: &str, payload: serde_json::Value) {
        emit_event(self.events.as_ref(), event_type, payload);
    }
}

fn active_view(state: &SessionState) -> ActiveFileView {
    let file = state.documents.active().clone();
    ActiveFileView {
        analysis: state.analyses.get(&file.name).map(str::to_string),
        analysis_status: state.statuses.get(Flow::Analysis, &file.name),
        builder_status: state.statuses.get(Flow::Builder, &file.name),
        file,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use anyhow::bail;
    use cucaypy_contracts::chat::Role;
    use cucaypy_contracts::events::EventWriter;
    use cucaypy_contracts::project::{DocumentStore, ProjectFile, StoreError};
    use cucaypy_contracts::prompts::{ImageAttachment, InferenceRequest, RequestKind};
    use cucaypy_contracts::session::{Flow, FlowStatus, JsonFileBlobStore};
    use serde_json::Value;

    use super::{SessionController, MODIFY_FAILED_REPLY};
    use crate::config::GatewayConfig;
    use crate::error::SessionError;
    use crate::gemini::GeminiGateway;
    use crate::InferenceGateway;

    struct ScriptedGateway {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().map(|requests| requests.len()).unwrap_or(0)
        }

        fn last_request(&self) -> Option<InferenceRequest> {
            self.requests
                .lock()
                .ok()
                .and_then(|requests| requests.last().cloned())
        }
    }

    impl InferenceGateway for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        fn send(&self, request: &InferenceRequest) -> anyhow::Result<String> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let next = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
            match next {
                Some(reply) => reply,
                None => bail!("script exhausted"),
            }
        }
    }

    /// Blocks inside `send` until the test releases it.
    struct GatedGateway {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl InferenceGateway for GatedGateway {
        fn name(&self) -> &str {
            "gated"
        }

        fn send(&self, _request: &InferenceRequest) -> anyhow::Result<String> {
            if let Ok(entered) = self.entered.lock() {
                let _ = entered.send(());
            }
            if let Ok(release) = self.release.lock() {
                let _ = release.recv();
            }
            Ok("## Summary\nok".to_string())
        }
    }

    fn project() -> DocumentStore {
        match DocumentStore::new(vec![
            ProjectFile::new("index.html", "<body></body>"),
            ProjectFile::new("style.css", "body {}"),
            ProjectFile::new("script.js", "console.log(1);"),
        ]) {
            Ok(store) => store,
            Err(err) => panic!("fixture store: {err}"),
        }
    }

    #[test]
    fn cache_hit_skips_gateway() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok("## Summary\nA page.".to_string())]);
        let session = SessionController::new(project(), gateway.clone());

        let first = session.analyze()?;
        assert!(!first.cached);
        assert_eq!(gateway.calls(), 1);

        let second = session.analyze()?;
        assert!(second.cached);
        assert_eq!(second.content, "## Summary\nA page.");
        assert_eq!(gateway.calls(), 1);
        assert_eq!(session.analysis_status("index.html")?, FlowStatus::Success);
        Ok(())
    }

    #[test]
    fn empty_analysis_reply_gets_placeholder() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok("  ".to_string())]);
        let session = SessionController::new(project(), gateway);
        assert_eq!(session.analyze()?.content, "No analysis could be generated.");
        Ok(())
    }

    #[test]
    fn failed_analysis_leaves_cache_empty_and_retry_repeats_request() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![
            Err(anyhow::anyhow!("401 unauthorized")),
            Ok("## Summary\nRetried.".to_string()),
        ]);
        let session = SessionController::new(project(), gateway.clone());

        let err = session.analyze();
        assert!(matches!(err, Err(SessionError::Inference(_))));
        if let Err(err) = err {
            assert_eq!(
                err.to_string(),
                "Failed to analyze code. Please check your API key and try again."
            );
        }
        assert_eq!(session.analysis_status("index.html")?, FlowStatus::Error);
        assert_eq!(session.analysis("index.html")?, None);
        let first_request = gateway.last_request();

        session.analyze()?;
        assert_eq!(gateway.calls(), 2);
        assert_eq!(gateway.last_request(), first_request);
        assert_eq!(session.analysis_status("index.html")?, FlowStatus::Success);
        Ok(())
    }

    #[test]
    fn modify_updates_file_and_invalidates_analysis() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![
            Ok("## Summary\nOld page.".to_string()),
            Ok("```html\n<body><footer>Hi</footer></body>\n```".to_string()),
            Ok("## Summary\nPage with a footer.".to_string()),
        ]);
        let session = SessionController::new(project(), gateway.clone());
        session.analyze()?;
        assert!(session.analysis("index.html")?.is_some());

        let report = session.modify("add a footer", None)?;
        assert_eq!(report.file_name, "index.html");
        assert_eq!(report.previous, "<body></body>");
        assert_eq!(report.current, "<body><footer>Hi</footer></body>");
        assert_eq!(session.analysis("index.html")?, None);
        assert_eq!(session.analysis_status("index.html")?, FlowStatus::Idle);

        let fresh = session.analyze()?;
        assert!(!fresh.cached);
        assert_eq!(fresh.content, "## Summary\nPage with a footer.");
        assert_eq!(gateway.calls(), 3);
        let reanalyzed = gateway.last_request().map(|request| request.text().to_string());
        assert!(reanalyzed.is_some_and(|text| text.contains("<footer>Hi</footer>")));
        assert_eq!(session.status(Flow::Analysis, "index.html")?, FlowStatus::Success);
        Ok(())
    }

    #[test]
    fn end_to_end_footer_scenario() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok(
            "```html\n<body><footer>Hi</footer></body>\n```".to_string(),
        )]);
        let session = SessionController::new(project(), gateway);
        let before = session.transcript()?.len();

        session.modify("add a footer", None)?;

        let file = session.file("index.html")?;
        assert_eq!(
            file.map(|file| file.content),
            Some("<body><footer>Hi</footer></body>".to_string())
        );
        assert_eq!(session.analysis("index.html")?, None);
        let transcript = session.transcript()?;
        assert_eq!(transcript.len(), before + 2);
        assert_eq!(transcript[before].role, Role::User);
        assert_eq!(transcript[before].content, "add a footer");
        assert_eq!(transcript[before + 1].role, Role::Assistant);
        assert_eq!(
            transcript[before + 1].content,
            "I've updated index.html based on your request."
        );
        assert_eq!(session.builder_status("index.html")?, FlowStatus::Idle);
        Ok(())
    }

    #[test]
    fn failed_modify_keeps_content_and_adds_one_error_reply() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Err(anyhow::anyhow!("connection reset"))]);
        let session = SessionController::new(project(), gateway);

        let err = session.modify("make it blue", None);
        let Err(err) = err else {
            panic!("modify should fail");
        };
        assert_eq!(err.to_string(), "Failed to modify code. Please try again.");

        assert_eq!(session.active_file()?.content, "<body></body>");
        let transcript = session.transcript()?;
        assert_eq!(transcript.len(), 2);
        let assistant: Vec<_> = transcript
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .collect();
        assert_eq!(assistant.len(), 1);
        assert_eq!(assistant[0].content, MODIFY_FAILED_REPLY);
        assert_eq!(session.builder_status("index.html")?, FlowStatus::Error);
        Ok(())
    }

    #[test]
    fn image_only_request_uses_placeholder_message() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok("<body>mock</body>".to_string())]);
        let session = SessionController::new(project(), gateway.clone());
        let image = ImageAttachment {
            mime_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };

        session.modify("  ", Some(image))?;

        let transcript = session.transcript()?;
        assert_eq!(transcript[0].content, "Generated code from image");
        assert_eq!(transcript[0].image.as_deref(), Some("data:image/png;base64,AQID"));
        let request = gateway.last_request();
        assert_eq!(request.as_ref().map(|request| request.kind), Some(RequestKind::Modify));
        assert!(request.and_then(|request| request.image().cloned()).is_some());
        Ok(())
    }

    #[test]
    fn blank_request_is_rejected_without_side_effects() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(Vec::new());
        let session = SessionController::new(project(), gateway.clone());
        assert!(matches!(
            session.modify(" \n", None),
            Err(SessionError::EmptyRequest(_))
        ));
        assert!(session.transcript()?.is_empty());
        assert_eq!(gateway.calls(), 0);
        Ok(())
    }

    #[test]
    fn switching_files_never_calls_gateway_or_mutates() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![Ok("## Summary\nPage.".to_string())]);
        let session = SessionController::new(project(), gateway.clone());
        session.analyze()?;
        let files_before = session.files()?;

        let view = session.select_file("style.css")?;
        assert_eq!(view.file.name, "style.css");
        assert_eq!(view.analysis, None);
        assert_eq!(view.analysis_status, FlowStatus::Idle);

        let view = session.select_file("index.html")?;
        assert_eq!(view.analysis_status, FlowStatus::Success);
        assert_eq!(view.analysis.as_deref(), Some("## Summary\nPage."));

        assert_eq!(gateway.calls(), 1);
        assert_eq!(session.files()?, files_before);
        Ok(())
    }

    #[test]
    fn invalid_selection_keeps_active_file() -> anyhow::Result<()> {
        let session = SessionController::new(project(), ScriptedGateway::new(Vec::new()));
        session.select_file("style.css")?;

        let err = session.select_file("missing.html");
        assert!(matches!(
            err,
            Err(SessionError::Store(StoreError::InvalidSelection(ref name))) if name == "missing.html"
        ));
        assert_eq!(session.active_file()?.name, "style.css");
        Ok(())
    }

    #[test]
    fn statuses_are_scoped_per_file_and_flow() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new(vec![
            Err(anyhow::anyhow!("boom")),
            Ok("body { color: red; }".to_string()),
        ]);
        let session = SessionController::new(project(), gateway);

        assert!(session.analyze().is_err());
        session.select_file("style.css")?;
        session.modify("make text red", None)?;

        assert_eq!(session.analysis_status("index.html")?, FlowStatus::Error);
        assert_eq!(session.builder_status("index.html")?, FlowStatus::Idle);
        assert_eq!(session.analysis_status("style.css")?, FlowStatus::Idle);
        assert_eq!(session.builder_status("style.css")?, FlowStatus::Idle);
        assert_eq!(session.active_file()?.content, "body { color: red; }");
        Ok(())
    }

    #[test]
    fn concurrent_request_is_busy_and_has_no_side_effects() -> anyhow::Result<()> {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gateway = Arc::new(GatedGateway {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let session = Arc::new(SessionController::new(project(), gateway));

        let worker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.analyze())
        };
        entered_rx.recv()?;
        assert!(session.is_busy());
        assert_eq!(session.analysis_status("index.html")?, FlowStatus::Loading);

        assert!(matches!(session.modify("add a footer", None), Err(SessionError::Busy)));
        assert!(session.transcript()?.is_empty());
        assert_eq!(session.builder_status("index.html")?, FlowStatus::Idle);

        // Switching away and back keeps the in-flight analysis visible.
        session.select_file("style.css")?;
        assert_eq!(session.select_file("index.html")?.analysis_status, FlowStatus::Loading);

        release_tx.send(())?;
        let report = match worker.join() {
            Ok(result) => result?,
            Err(_) => panic!("analysis thread panicked"),
        };
        assert_eq!(report.file_name, "index.html");
        assert!(!session.is_busy());
        assert_eq!(session.analysis_status("index.html")?, FlowStatus::Success);
        Ok(())
    }

    #[test]
    fn snapshot_round_trip_through_blob_store() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFileBlobStore::new(temp.path().join(".cucaypy").join("project_data.json"));
        let gateway = ScriptedGateway::new(vec![Ok("## Summary\nStyles.".to_string())]);

        assert!(SessionController::load(&store, gateway.clone())?.is_none());

        let session = SessionController::new(project(), gateway.clone());
        session.select_file("style.css")?;
        session.analyze()?;
        session.save(&store)?;

        let Some(restored) = SessionController::load(&store, gateway.clone())? else {
            panic!("snapshot should load");
        };
        let view = restored.active_view()?;
        assert_eq!(view.file.name, "style.css");
        assert_eq!(view.analysis.as_deref(), Some("## Summary\nStyles."));
        assert_eq!(view.analysis_status, FlowStatus::Success);
        assert!(restored.analyze()?.cached);
        assert_eq!(gateway.calls(), 1);
        Ok(())
    }

    #[test]
    fn flows_write_structured_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let gateway = ScriptedGateway::new(vec![
            Ok("## Summary\nPage.".to_string()),
            Ok("<body><main></main></body>".to_string()),
        ]);
        let session = SessionController::new(project(), gateway)
            .with_events(EventWriter::new(&events_path, "session-test"));

        session.analyze()?;
        session.analyze()?;
        session.modify("add main", None)?;
        session.select_file("script.js")?;

        let content = fs::read_to_string(&events_path)?;
        let events: Vec<Value> = content
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<_, _>>()?;
        let types: Vec<&str> = events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "analysis_started",
                "analysis_finished",
                "analysis_cached",
                "modify_started",
                "file_updated",
                "file_selected",
            ]
        );
        let updated = &events[5];
        assert_eq!(updated["file"], Value::String("index.html".to_string()));
        assert_eq!(updated["lines_added"], Value::Number(1.into()));
        assert_eq!(updated["lines_removed"], Value::Number(1.into()));
        Ok(())
    }

    #[test]
    fn transport_failure_keeps_api_key_out_of_event_log() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let gateway = Arc::new(GeminiGateway::new(GatewayConfig {
            api_base: "http://127.0.0.1:1/v1beta".to_string(),
            api_key: Some("SECRET-KEY-123".to_string()),
            request_timeout: std::time::Duration::from_secs(5),
            transport_retries: 0,
            ..GatewayConfig::default()
        }));
        let session = SessionController::new(project(), gateway)
            .with_events(EventWriter::new(&events_path, "session-test"));

        let err = session.modify("add a footer", None);
        assert!(matches!(err, Err(SessionError::Inference(_))));

        let log = fs::read_to_string(&events_path)?;
        assert!(log.contains("modify_failed"));
        assert!(log.contains("127.0.0.1:1"));
        assert!(!log.contains("SECRET-KEY-123"));
        Ok(())
    }
}
