use std::io::BufReader;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::{CompletionProvider, CompletionRequest, FragmentStream, SseFragments};
use crate::truncate_text;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Streaming client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl OpenAiCompatibleProvider {
    pub fn new(api_base: &str, api_key: &str, request_timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: normalize_api_base(api_base),
            api_key: api_key.trim().to_string(),
            http,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn stream_chat(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let endpoint = self.endpoint();
        tracing::debug!(
            %endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "dispatching streaming completion"
        );
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&request.to_payload())
            .send()
            .with_context(|| format!("request to {endpoint} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "completion request failed ({}): {}",
                status.as_u16(),
                truncate_text(body.trim(), 512)
            );
        }
        Ok(Box::new(SseFragments::new(BufReader::new(response))))
    }
}

fn normalize_api_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let trimmed = trimmed
        .strip_suffix("/chat/completions")
        .unwrap_or(trimmed);
    trimmed.to_string()
}
