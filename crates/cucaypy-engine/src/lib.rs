use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use cucaypy_contracts::events::EventWriter;
use cucaypy_contracts::prompts::{build_generate_request, InferenceRequest, RequestKind};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub mod config;
pub mod dryrun;
pub mod error;
pub mod flight;
pub mod gemini;
pub mod session;

pub use config::GatewayConfig;
pub use dryrun::DryrunGateway;
pub use error::{InferenceFailure, SessionError};
pub use flight::{FlightGate, FlightPermit};
pub use gemini::GeminiGateway;
pub use session::{ActiveFileView, AnalysisReport, ModifyReport, SessionController};

/// Sends one built request to a model and returns its text output.
pub trait InferenceGateway: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, request: &InferenceRequest) -> Result<String>;
}

#[derive(Default)]
pub struct GatewayRegistry {
    gateways: BTreeMap<String, Arc<dyn InferenceGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<G: InferenceGateway + 'static>(&mut self, gateway: G) {
        self.gateways
            .insert(gateway.name().to_string(), Arc::new(gateway));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn InferenceGateway>> {
        self.gateways.get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.gateways.keys().cloned().collect()
    }
}

pub fn default_gateway_registry(config: &GatewayConfig) -> GatewayRegistry {
    let mut gateways = GatewayRegistry::new();
    gateways.register(DryrunGateway);
    gateways.register(GeminiGateway::new(config.clone()));
    gateways
}

/// Picks a gateway by name. `gemini` without an API key falls back to
/// `dryrun`.
pub fn resolve_gateway(
    registry: &GatewayRegistry,
    requested: &str,
    config: &GatewayConfig,
) -> Result<Arc<dyn InferenceGateway>> {
    let requested = requested.trim();
    let name = if requested == "gemini" && !config.has_api_key() {
        log::warn!("no Gemini API key configured; falling back to the dryrun gateway");
        "dryrun"
    } else {
        requested
    };
    registry.get(name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown provider '{requested}' (available: {})",
            registry.names().join(", ")
        )
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedContent {
    pub content: String,
}

/// Stateless relay: no chat history and no file context.
pub fn generate_content(
    gateway: &dyn InferenceGateway,
    prompt: &str,
    events: Option<&EventWriter>,
) -> std::result::Result<GeneratedContent, SessionError> {
    if prompt.trim().is_empty() {
        return Err(SessionError::EmptyRequest("prompt is required"));
    }
    match gateway.send(&build_generate_request(prompt)) {
        Ok(content) => {
            emit_event(
                events,
                "generate_finished",
                json!({ "gateway": gateway.name(), "chars": content.chars().count() }),
            );
            Ok(GeneratedContent { content })
        }
        Err(err) => {
            log::error!("generate via {} failed: {err:#}", gateway.name());
            emit_event(
                events,
                "generate_failed",
                json!({ "gateway": gateway.name(), "error": gemini::error_chain_text(&err, 400) }),
            );
            Err(InferenceFailure::new(RequestKind::Generate).into())
        }
    }
}

/// Event writes are best effort; a failed write is logged and never aborts a flow.
pub(crate) fn emit_event(events: Option<&EventWriter>, event_type: &str, payload: Value) {
    let Some(events) = events else {
        return;
    };
    if let Err(err) = events.emit(event_type, map_object(payload)) {
        log::warn!("failed writing {event_type} event: {err:#}");
    }
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
