use anyhow::Result;
use parley_contracts::chat::Role;

use super::{CompletionProvider, CompletionRequest, Fragment, FragmentStream};

/// Offline provider that streams the last user message back word by word.
#[derive(Debug, Default, Clone)]
pub struct DryrunProvider;

impl DryrunProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CompletionProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn stream_chat(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let reply = format!("[dryrun:{}] You said: {prompt}", request.model);
        let fragments: Vec<Result<Fragment>> = reply
            .split_inclusive(' ')
            .map(|word| Ok(Fragment::text(word)))
            .collect();
        Ok(Box::new(fragments.into_iter()))
    }
}
