use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl FlowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Analysis,
    Builder,
}

/// Status of each flow, tracked per file. Pairs never set are `Idle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowStates {
    entries: BTreeMap<(Flow, String), FlowStatus>,
}

impl FlowStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, flow: Flow, file_name: &str) -> FlowStatus {
        self.entries
            .get(&(flow, file_name.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Returns the previous status.
    pub fn set(&mut self, flow: Flow, file_name: &str, status: FlowStatus) -> FlowStatus {
        self.entries
            .insert((flow, file_name.to_string()), status)
            .unwrap_or_default()
    }
}
