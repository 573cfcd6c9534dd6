use std::mem;
use std::path::PathBuf;

use parley_contracts::chat::{stamp_content, Message, Role};
use parley_contracts::config::{ChatConfig, DEFAULT_TEMPERATURE};
use parley_contracts::error::{ChatError, MAX_ERROR_DETAIL_CHARS};
use parley_contracts::events::{ChatEvent, FailureStage};

use crate::attachments::{process_attachment, Attachment, AttachmentPayload};
use crate::history::prepare_history;
use crate::providers::{CompletionRequest, Fragment, FragmentStream};
use crate::sanitize::{sanitize_input, truncate_with_marker};
use crate::{error_chain_text, ChatEngine};

const EMPTY_RESPONSE_NOTICE: &str = "The model returned an empty response.";
const LENGTH_FINISH_REASON: &str = "length";

/// One user action: text, an optional file and sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub message: String,
    pub attachment: Option<PathBuf>,
    pub temperature: f32,
    /// Falls back to the configured default when unset.
    pub max_tokens: Option<u32>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachment: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed,
    /// The reply hit the message length ceiling and was cut.
    Truncated,
    Failed(ChatError),
}

enum State {
    Pending(Box<PendingTurn>),
    Streaming(Box<StreamingTurn>),
    Finished,
}

struct PendingTurn {
    request: TurnRequest,
    history: Vec<Message>,
}

struct StreamingTurn {
    transcript: Vec<Message>,
    fragments: FragmentStream,
    reply: String,
    reply_chars: usize,
    fragment_count: usize,
    finish_reason: Option<String>,
}

/// Lazy sequence of transcript snapshots for a single turn.
///
/// Each item is the whole transcript as it should be rendered at that point.
/// Nothing is validated or sent until the first call to `next`; dropping the
/// stream abandons the remaining fragments.
pub struct TurnStream<'a> {
    engine: &'a ChatEngine,
    state: State,
    outcome: Option<TurnOutcome>,
}

impl<'a> TurnStream<'a> {
    pub(crate) fn new(engine: &'a ChatEngine, request: TurnRequest, history: Vec<Message>) -> Self {
        Self {
            engine,
            state: State::Pending(Box::new(PendingTurn { request, history })),
            outcome: None,
        }
    }

    /// How the turn ended, once it has.
    pub fn outcome(&self) -> Option<&TurnOutcome> {
        self.outcome.as_ref()
    }

    fn start(&mut self, pending: PendingTurn) -> Option<Vec<Message>> {
        let PendingTurn { request, history } = pending;
        let engine = self.engine;
        let config = engine.config();
        let text = sanitize_input(&request.message, config.max_message_length);

        let Some(provider) = engine.provider.clone() else {
            return Some(self.reject(history, &text, ChatError::ClientUnavailable));
        };
        if text.is_empty() && request.attachment.is_none() {
            return Some(self.reject(history, "", ChatError::EmptyInput));
        }
        if !engine.rate_limiter().try_acquire() {
            return Some(self.reject(history, &text, ChatError::RateLimited));
        }

        let attachment = match request.attachment.as_deref() {
            Some(path) => match process_attachment(path, config.max_file_size) {
                Ok(attachment) => Some(attachment),
                Err(err) => return Some(self.reject(history, &text, err)),
            },
            None => None,
        };
        let attachment_empty = attachment
            .as_ref()
            .map(|attachment| attachment.content().is_empty())
            .unwrap_or(true);
        if text.is_empty() && attachment_empty {
            return Some(self.reject(history, "", ChatError::EmptyInput));
        }
        let composed = compose_user_message(&text, attachment.as_ref());

        let cleaned = prepare_history(
            &history,
            config.max_history_length,
            config.max_message_length,
        );
        let mut messages = Vec::with_capacity(cleaned.len() + 2);
        messages.push(Message::system(config.system_prompt.clone()));
        messages.extend(cleaned.iter().cloned());
        messages.push(Message::user(composed.clone()));
        let completion = CompletionRequest {
            model: config.model.clone(),
            messages,
            temperature: ChatConfig::clamp_temperature(request.temperature),
            max_tokens: config
                .clamp_output_tokens(request.max_tokens.unwrap_or(config.default_output_tokens)),
        };

        tracing::info!(
            provider = provider.name(),
            model = %completion.model,
            history = cleaned.len(),
            "dispatching completion request"
        );
        engine.emit(ChatEvent::RequestDispatched {
            provider: provider.name().to_string(),
            model: completion.model.clone(),
            history_messages: cleaned.len(),
            temperature: completion.temperature,
            max_tokens: completion.max_tokens,
            attachment: attachment.map(|attachment| attachment.info),
        });

        let fragments = match provider.stream_chat(&completion) {
            Ok(fragments) => fragments,
            Err(err) => {
                let err = ChatError::dispatch_failure(error_chain_text(&err, MAX_ERROR_DETAIL_CHARS));
                tracing::warn!("completion dispatch failed: {err}");
                let mut transcript = cleaned;
                transcript.push(Message::user(composed));
                transcript.push(Message::assistant(err.turn_text()));
                return Some(self.fail(transcript, FailureStage::Dispatch, err));
            }
        };

        let mut transcript = cleaned;
        transcript.push(Message::user(self.stamp(&composed, Role::User)));
        transcript.push(Message::assistant(String::new()));
        self.advance(Box::new(StreamingTurn {
            transcript,
            fragments,
            reply: String::new(),
            reply_chars: 0,
            fragment_count: 0,
            finish_reason: None,
        }))
    }

    fn advance(&mut self, mut turn: Box<StreamingTurn>) -> Option<Vec<Message>> {
        let max_chars = self.engine.config().max_message_length;
        loop {
            match turn.fragments.next() {
                None => {
                    if turn.finish_reason.as_deref() == Some(LENGTH_FINISH_REASON) {
                        tracing::info!("reply stopped at the output token limit");
                    }
                    self.outcome = Some(TurnOutcome::Completed);
                    self.engine.emit(ChatEvent::StreamCompleted {
                        fragments: turn.fragment_count,
                        chars: turn.reply_chars,
                        finish_reason: turn.finish_reason.take(),
                    });
                    if turn.fragment_count > 0 {
                        return None;
                    }
                    tracing::warn!("completion stream ended without any text");
                    let notice = self.stamp(EMPTY_RESPONSE_NOTICE, Role::Assistant);
                    set_reply(&mut turn.transcript, notice);
                    return Some(turn.transcript);
                }
                Some(Err(err)) => {
                    let err =
                        ChatError::stream_failure(error_chain_text(&err, MAX_ERROR_DETAIL_CHARS));
                    tracing::warn!("completion stream failed: {err}");
                    let text = self.stamp(&err.turn_text(), Role::Assistant);
                    set_reply(&mut turn.transcript, text);
                    return Some(self.fail(turn.transcript, FailureStage::Stream, err));
                }
                Some(Ok(Fragment {
                    delta,
                    finish_reason,
                })) => {
                    if finish_reason.is_some() {
                        turn.finish_reason = finish_reason;
                    }
                    let Some(delta) = delta.filter(|delta| !delta.is_empty()) else {
                        continue;
                    };
                    turn.fragment_count += 1;
                    turn.reply_chars += delta.chars().count();
                    turn.reply.push_str(&delta);

                    if turn.reply_chars > max_chars {
                        let cut = truncate_with_marker(&turn.reply, max_chars);
                        let text = self.stamp(&cut, Role::Assistant);
                        set_reply(&mut turn.transcript, text);
                        tracing::info!(max_chars, "reply truncated at the message length ceiling");
                        self.outcome = Some(TurnOutcome::Truncated);
                        self.engine.emit(ChatEvent::StreamTruncated {
                            fragments: turn.fragment_count,
                            max_chars,
                        });
                        return Some(turn.transcript);
                    }

                    let text = self.stamp(&turn.reply, Role::Assistant);
                    set_reply(&mut turn.transcript, text);
                    let snapshot = turn.transcript.clone();
                    self.state = State::Streaming(turn);
                    return Some(snapshot);
                }
            }
        }
    }

    /// Terminal turn for failures caught before anything is sent.
    fn reject(&mut self, history: Vec<Message>, text: &str, err: ChatError) -> Vec<Message> {
        tracing::debug!(reason = err.kind(), "turn rejected");
        self.engine.emit(ChatEvent::TurnRejected {
            reason: err.kind().to_string(),
            detail: err.to_string(),
        });
        let mut transcript = history;
        if !text.is_empty() {
            transcript.push(Message::user(text));
        }
        transcript.push(Message::assistant(err.turn_text()));
        self.outcome = Some(TurnOutcome::Failed(err));
        transcript
    }

    fn fail(&mut self, transcript: Vec<Message>, stage: FailureStage, err: ChatError) -> Vec<Message> {
        self.engine.emit(ChatEvent::StreamFailed {
            stage,
            reason: err.kind().to_string(),
            detail: err.to_string(),
        });
        self.outcome = Some(TurnOutcome::Failed(err));
        transcript
    }

    fn stamp(&self, content: &str, role: Role) -> String {
        stamp_content(content, role, &self.engine.clock.wall_time())
    }
}

impl Iterator for TurnStream<'_> {
    type Item = Vec<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        match mem::replace(&mut self.state, State::Finished) {
            State::Pending(pending) => self.start(*pending),
            State::Streaming(turn) => self.advance(turn),
            State::Finished => None,
        }
    }
}

fn set_reply(transcript: &mut [Message], content: String) {
    if let Some(last) = transcript.last_mut() {
        last.content = content;
    }
}

/// Folds an attachment into the user's text. Images are described, never sent;
/// an empty text file adds nothing.
fn compose_user_message(text: &str, attachment: Option<&Attachment>) -> String {
    let Some(attachment) = attachment else {
        return text.to_string();
    };
    match &attachment.payload {
        AttachmentPayload::Image { .. } if text.is_empty() => format!(
            "I uploaded an image: {}, please tell me how to handle image files.",
            attachment.info
        ),
        AttachmentPayload::Image { .. } => {
            format!("{text}\n\n[Image attached: {}]", attachment.info)
        }
        AttachmentPayload::Text(body) if body.is_empty() => text.to_string(),
        AttachmentPayload::Text(body) if text.is_empty() => {
            format!("Please analyze this file:\n\n{body}")
        }
        AttachmentPayload::Text(body) => format!("{text}\n\n[File content]\n{body}"),
    }
}
