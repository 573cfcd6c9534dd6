use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use parley_contracts::chat::{messages_to_value, Message};
use parley_contracts::config::ChatConfig;
use serde_json::{json, Value};

mod dryrun;
mod openai;
mod sse;

pub use dryrun::DryrunProvider;
pub use openai::OpenAiCompatibleProvider;
pub use sse::SseFragments;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Body of a streaming `/chat/completions` call.
    pub fn to_payload(&self) -> Value {
        json!({
            "model": self.model,
            "messages": messages_to_value(&self.messages),
            "stream": true,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub delta: Option<String>,
    pub finish_reason: Option<String>,
}

impl Fragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            finish_reason: None,
        }
    }
}

pub type FragmentStream = Box<dyn Iterator<Item = Result<Fragment>> + Send>;

/// A remote (or simulated) chat model reachable through a streaming call.
///
/// `stream_chat` fails for dispatch-time problems (connection, auth, HTTP
/// status); problems after the stream is open arrive as `Err` items.
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn stream_chat(&self, request: &CompletionRequest) -> Result<FragmentStream>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: CompletionProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CompletionProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// Registers the offline `dryrun` provider, plus `openai` when a credential
/// is configured and the HTTP client can be built.
pub fn default_provider_registry(config: &ChatConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(DryrunProvider::new());
    if let Some(api_key) = config.api_key.as_deref() {
        match OpenAiCompatibleProvider::new(&config.base_url, api_key, config.request_timeout) {
            Ok(provider) => registry.register(provider),
            Err(err) => tracing::warn!("completion client unavailable: {err:#}"),
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use parley_contracts::chat::Message;
    use parley_contracts::config::ChatConfig;
    use serde_json::json;

    use super::{default_provider_registry, CompletionRequest};

    #[test]
    fn payload_requests_streaming() {
        let request = CompletionRequest {
            model: "qwen".to_string(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            temperature: 0.5,
            max_tokens: 256,
        };
        let payload = request.to_payload();
        assert_eq!(payload["stream"], json!(true));
        assert_eq!(payload["model"], json!("qwen"));
        assert_eq!(payload["max_tokens"], json!(256));
        assert_eq!(payload["temperature"], json!(0.5));
        assert_eq!(payload["messages"][1], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn registry_only_offers_openai_with_a_credential() {
        let without_key = default_provider_registry(&ChatConfig::default());
        assert_eq!(without_key.names(), vec!["dryrun"]);

        let config = ChatConfig {
            api_key: Some("sk-test".to_string()),
            ..ChatConfig::default()
        };
        let with_key = default_provider_registry(&config);
        assert_eq!(with_key.names(), vec!["dryrun", "openai"]);
        assert!(with_key.get("openai").is_some());
        assert!(with_key.get("missing").is_none());
    }
}
