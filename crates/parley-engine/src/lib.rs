use std::sync::Arc;

use parley_contracts::chat::Message;
use parley_contracts::config::ChatConfig;
use parley_contracts::events::{ChatEvent, EventWriter};

pub mod attachments;
pub mod clock;
pub mod history;
pub mod providers;
pub mod rate_limit;
pub mod sanitize;
mod turn;

pub use attachments::{process_attachment, Attachment, AttachmentPayload};
pub use clock::{Clock, ManualClock, SystemClock};
pub use history::{prepare_history, prepare_history_values};
pub use providers::{
    default_provider_registry, CompletionProvider, CompletionRequest, DryrunProvider, Fragment,
    FragmentStream, OpenAiCompatibleProvider, ProviderRegistry,
};
pub use rate_limit::RateLimiter;
pub use sanitize::{sanitize_input, TRUNCATION_MARKER};
pub use turn::{TurnOutcome, TurnRequest, TurnStream};

/// Orchestrates chat turns against one completion provider.
///
/// The engine owns no transcript: callers pass the current history into
/// [`ChatEngine::submit`] and render the snapshots it yields.
pub struct ChatEngine {
    config: ChatConfig,
    provider: Option<Arc<dyn CompletionProvider>>,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    events: Option<EventWriter>,
}

impl ChatEngine {
    /// `provider` is `None` when no client could be set up; every turn then
    /// reports the client as unavailable.
    pub fn new(config: ChatConfig, provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let rate_limiter = Arc::new(RateLimiter::with_clock(
            config.rate_limit_delay,
            Arc::clone(&clock),
        ));
        Self {
            config,
            provider,
            rate_limiter,
            clock,
            events: None,
        }
    }

    /// Replaces the clock, rebuilding the rate limiter on top of it.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::with_clock(
            self.config.rate_limit_delay,
            Arc::clone(&clock),
        ));
        self.clock = clock;
        self
    }

    /// Shares a throttle with other engines.
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|provider| provider.name())
    }

    /// Starts a turn. Nothing runs until the returned stream is first polled.
    pub fn submit(&self, request: TurnRequest, history: Vec<Message>) -> TurnStream<'_> {
        TurnStream::new(self, request, history)
    }

    /// Runs a turn to completion and returns the final transcript.
    pub fn run_turn(
        &self,
        request: TurnRequest,
        history: Vec<Message>,
    ) -> (Vec<Message>, TurnOutcome) {
        let fallback = history.clone();
        let mut stream = self.submit(request, history);
        let mut last = None;
        for snapshot in stream.by_ref() {
            last = Some(snapshot);
        }
        let outcome = stream.outcome().cloned().unwrap_or(TurnOutcome::Completed);
        (last.unwrap_or(fallback), outcome)
    }

    /// Appends to the session event log, if one is attached. Write failures
    /// are logged and otherwise ignored.
    pub fn emit(&self, event: ChatEvent) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.record(&event) {
            tracing::warn!(event = event.name(), "failed to write event: {err:#}");
        }
    }
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(": "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
