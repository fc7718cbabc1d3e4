use anyhow::{bail, Result};
use std::sync::Arc;

use super::client::{LlmClient, MockLlmClient};
use super::client_impl::{OpenAIChatClient, OpenAIResponsesClient};
use crate::config::Config;

/// Create the shared LLM client based on configuration. Both model roles use
/// the same client; they differ only in the model name sent per request.
pub fn create_client(config: &Config, dry_run: bool) -> Result<Arc<dyn LlmClient>> {
    if dry_run || config.api.provider == "mock" {
        return Ok(Arc::new(MockLlmClient::new()));
    }

    let api_key = config.get_api_key()?;
    let base_url = config.api.base_url.clone();
    let timeout = config.api.timeout_secs;

    match config.api.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIResponsesClient::new(
            api_key, base_url, timeout,
        )?)),
        "openai-chat" => Ok(Arc::new(OpenAIChatClient::new(
            api_key, base_url, timeout,
        )?)),
        unknown => bail!("Unknown API provider: {}", unknown),
    }
}
