use thiserror::Error;

/// Longest failure description surfaced inside a transcript turn.
pub const MAX_ERROR_DETAIL_CHARS: usize = 100;

/// Failures recovered at the orchestration boundary.
///
/// None of these end the process: each one is rendered into a synthetic
/// assistant turn via [`ChatError::turn_text`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    #[error("the completion client is not initialized; check the API key and network")]
    ClientUnavailable,
    #[error("requests are too frequent, please try again shortly")]
    RateLimited,
    #[error("file not found: {path}")]
    AttachmentMissing { path: String },
    #[error("file too large ({size_mb:.1}MB), the limit is {limit_mb:.1}MB")]
    AttachmentTooLarge {
        size_bytes: u64,
        size_mb: f64,
        limit_mb: f64,
    },
    #[error("unsupported file type: {extension}")]
    AttachmentUnsupportedType { extension: String },
    #[error("file processing failed: {detail}")]
    AttachmentDecodeFailure { detail: String },
    #[error("please enter a message or attach a file")]
    EmptyInput,
    #[error("{detail}")]
    DispatchFailure { detail: String },
    #[error("{detail}")]
    StreamFailure { detail: String },
}

impl ChatError {
    pub fn too_large(size_bytes: u64, limit_bytes: u64) -> Self {
        ChatError::AttachmentTooLarge {
            size_bytes,
            size_mb: size_bytes as f64 / 1024.0 / 1024.0,
            limit_mb: limit_bytes as f64 / 1024.0 / 1024.0,
        }
    }

    pub fn decode_failure(detail: impl AsRef<str>) -> Self {
        ChatError::AttachmentDecodeFailure {
            detail: truncate_detail(detail.as_ref()),
        }
    }

    pub fn dispatch_failure(detail: impl AsRef<str>) -> Self {
        ChatError::DispatchFailure {
            detail: truncate_detail(detail.as_ref()),
        }
    }

    pub fn stream_failure(detail: impl AsRef<str>) -> Self {
        ChatError::StreamFailure {
            detail: truncate_detail(detail.as_ref()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::ClientUnavailable => "client_unavailable",
            ChatError::RateLimited => "rate_limited",
            ChatError::AttachmentMissing { .. } => "attachment_missing",
            ChatError::AttachmentTooLarge { .. } => "attachment_too_large",
            ChatError::AttachmentUnsupportedType { .. } => "attachment_unsupported_type",
            ChatError::AttachmentDecodeFailure { .. } => "attachment_decode_failure",
            ChatError::EmptyInput => "empty_input",
            ChatError::DispatchFailure { .. } => "dispatch_failure",
            ChatError::StreamFailure { .. } => "stream_failure",
        }
    }

    /// Text of the synthetic assistant turn that reports this failure.
    pub fn turn_text(&self) -> String {
        match self {
            ChatError::ClientUnavailable => format!("Error: {self}."),
            ChatError::RateLimited => "Requests are too frequent, please try again shortly.".to_string(),
            ChatError::EmptyInput => "Please enter a message or attach a file.".to_string(),
            ChatError::DispatchFailure { detail } => format!("API call failed: {detail}..."),
            ChatError::StreamFailure { detail } => {
                format!("Streaming response failed: {detail}...")
            }
            other => format!("Attachment error: {}", truncate_detail(&other.to_string())),
        }
    }
}

/// Problems with environment-supplied configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "missing API credential: set {primary} (or {fallback}) in the environment or a .env file"
    )]
    MissingCredential {
        primary: &'static str,
        fallback: &'static str,
    },
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: String, value: String },
    #[error("{key} is out of range: {reason}")]
    OutOfRange { key: String, reason: String },
}

/// Clamps a failure description to [`MAX_ERROR_DETAIL_CHARS`] characters.
pub fn truncate_detail(detail: &str) -> String {
    detail.trim().chars().take(MAX_ERROR_DETAIL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::{truncate_detail, ChatError, MAX_ERROR_DETAIL_CHARS};

    #[test]
    fn dispatch_failure_detail_is_truncated() {
        let long = "x".repeat(400);
        let err = ChatError::dispatch_failure(&long);
        let ChatError::DispatchFailure { detail } = &err else {
            panic!("unexpected variant: {err:?}");
        };
        assert_eq!(detail.chars().count(), MAX_ERROR_DETAIL_CHARS);
        assert!(err.turn_text().starts_with("API call failed: xxx"));
        assert!(err.turn_text().ends_with("..."));
    }

    #[test]
    fn too_large_message_contains_size() {
        let err = ChatError::too_large(12 * 1024 * 1024 + 300_000, 10 * 1024 * 1024);
        let text = err.turn_text();
        assert!(text.contains("12.3MB"), "unexpected text: {text}");
        assert!(text.contains("10.0MB"), "unexpected text: {text}");
    }

    #[test]
    fn long_paths_and_extensions_are_clamped_in_turn_text() {
        let missing = ChatError::AttachmentMissing {
            path: format!("/tmp/{}", "p".repeat(300)),
        };
        let unsupported = ChatError::AttachmentUnsupportedType {
            extension: format!(".{}", "z".repeat(300)),
        };
        for err in [missing, unsupported] {
            let text = err.turn_text();
            let description = text.strip_prefix("Attachment error: ").unwrap_or_default();
            assert_eq!(description.chars().count(), MAX_ERROR_DETAIL_CHARS, "{text}");
        }
    }

    #[test]
    fn truncate_detail_counts_characters() {
        let text = "é".repeat(150);
        assert_eq!(truncate_detail(&text).chars().count(), 100);
        assert_eq!(truncate_detail("  short  "), "short");
    }
}
