use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Where a dispatched turn broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Dispatch,
    Stream,
}

/// Everything a chat session records, one line per event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    SessionStarted {
        provider: String,
        model: String,
    },
    /// A turn ended before anything was sent.
    TurnRejected {
        reason: String,
        detail: String,
    },
    RequestDispatched {
        provider: String,
        model: String,
        history_messages: usize,
        temperature: f32,
        max_tokens: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        attachment: Option<String>,
    },
    StreamCompleted {
        fragments: usize,
        chars: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    StreamTruncated {
        fragments: usize,
        max_chars: usize,
    },
    StreamFailed {
        stage: FailureStage,
        reason: String,
        detail: String,
    },
    TranscriptExported {
        path: PathBuf,
        format: String,
        messages: usize,
    },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::SessionStarted { .. } => "session_started",
            ChatEvent::TurnRejected { .. } => "turn_rejected",
            ChatEvent::RequestDispatched { .. } => "request_dispatched",
            ChatEvent::StreamCompleted { .. } => "stream_completed",
            ChatEvent::StreamTruncated { .. } => "stream_truncated",
            ChatEvent::StreamFailed { .. } => "stream_failed",
            ChatEvent::TranscriptExported { .. } => "transcript_exported",
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    session_id: &'a str,
    ts: String,
    #[serde(flatten)]
    event: &'a ChatEvent,
}

/// Append-only `events.jsonl` for one chat session.
///
/// The file is opened on the first write and kept open; clones share the
/// handle, so lines from different clones never interleave.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventLog>,
}

#[derive(Debug)]
struct EventLog {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLog {
                path: path.into(),
                session_id: session_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Writes `event` tagged with the session id and a UTC timestamp.
    pub fn record(&self, event: &ChatEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(&EventLine {
            session_id: &self.inner.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            event,
        })?;

        let mut file = self
            .inner
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if file.is_none() {
            *file = Some(open_log(&self.inner.path)?);
        }
        if let Some(handle) = file.as_mut() {
            writeln!(handle, "{line}")
                .with_context(|| format!("failed to append to {}", self.inner.path.display()))?;
        }
        Ok(())
    }
}

fn open_log(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

pub fn new_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4().simple())
}
