use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log of session events, shared by clones.
///
/// Every line carries `type`, `session_id`, `seq` and `ts` unless the payload
/// sets those keys itself. `seq` counts lines written by this writer and is
/// assigned under the same lock as the write, so it follows file order.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    session_id: String,
    log: Mutex<LogState>,
}

#[derive(Debug, Default)]
struct LogState {
    file: Option<File>,
    next_seq: u64,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                session_id: session_id.into(),
                log: Mutex::new(LogState::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut log = self
            .inner
            .log
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;

        let mut event = payload;
        event
            .entry("type")
            .or_insert_with(|| Value::String(event_type.to_string()));
        event
            .entry("session_id")
            .or_insert_with(|| Value::String(self.inner.session_id.clone()));
        event
            .entry("seq")
            .or_insert_with(|| Value::Number(log.next_seq.into()));
        event.entry("ts").or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false))
        });

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        if log.file.is_none() {
            log.file = Some(self.open()?);
        }
        if let Some(file) = log.file.as_mut() {
            file.write_all(line.as_bytes())
                .with_context(|| format!("failed appending to {}", self.inner.path.display()))?;
        }
        log.next_seq += 1;

        Ok(Value::Object(event))
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed opening {}", self.inner.path.display()))
    }
}
