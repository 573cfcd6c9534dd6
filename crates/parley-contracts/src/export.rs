//! Explicit, user-requested transcript exports.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone};

use crate::chat::{messages_to_value, strip_stamp, strip_stamp_markup, Message, Role};

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "txt" | "text" => Some(ExportFormat::Text),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Json => "json",
        }
    }
}

/// Renders the plain-text export: a header, then one `## <role>` section per
/// message with timestamp markup reduced to `[HH:MM:SS] You:`.
pub fn render_text_export<Tz: TimeZone>(messages: &[Message], exported_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = format!(
        "# Conversation export\nExported at: {}\n\n",
        exported_at.format("%Y-%m-%d %H:%M:%S")
    );
    for message in messages {
        out.push_str(&format!(
            "## {}\n{}\n\n",
            message.role.export_label(),
            strip_stamp_markup(&message.content)
        ));
    }
    out
}

pub fn export_file_name<Tz: TimeZone>(exported_at: &DateTime<Tz>, format: ExportFormat) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "conversation_export_{}.{}",
        exported_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Writes the transcript into `dir` and returns the created file's path.
pub fn write_export<Tz: TimeZone>(
    dir: &Path,
    messages: &[Message],
    format: ExportFormat,
    exported_at: &DateTime<Tz>,
) -> Result<PathBuf>
where
    Tz::Offset: std::fmt::Display,
{
    if messages.is_empty() {
        bail!("no conversation to export");
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(export_file_name(exported_at, format));
    let body = match format {
        ExportFormat::Text => render_text_export(messages, exported_at),
        ExportFormat::Json => serde_json::to_string_pretty(&messages_to_value(messages))?,
    };
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Body of the most recent non-blank assistant message, without its timestamp.
pub fn last_assistant_reply(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter(|message| message.role == Role::Assistant)
        .find(|message| !message.content.trim().is_empty())
        .map(|message| strip_stamp(message.content.trim()).trim().to_string())
}

/// Short single-line preview used when confirming a copy.
pub fn reply_preview(reply: &str) -> String {
    let head: String = reply.chars().take(PREVIEW_CHARS).collect();
    if reply.chars().count() > PREVIEW_CHARS {
        format!("{head}...")
    } else {
        head
    }
}
