use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::client::{LlmClient, LlmRequest, LlmResponse};
use crate::schema::SchemaDescriptor;
use crate::util::SecretString;

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

// ============================================================================
// OpenAI Responses API
// ============================================================================

pub struct OpenAIResponsesClient {
    api_key: SecretString,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<ResponsesText>,
}

#[derive(Debug, Serialize)]
struct ResponsesText {
    format: JsonSchemaFormat,
}

/// `{"type": "json_schema", "name": .., "schema": .., "strict": true}`
#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    schema: Value,
    strict: bool,
}

impl JsonSchemaFormat {
    fn from_descriptor(descriptor: &SchemaDescriptor) -> Self {
        Self {
            kind: "json_schema",
            name: descriptor.name().as_str(),
            schema: descriptor.to_json_schema(),
            strict: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<Vec<ResponsesContent>>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl ResponsesResponse {
    /// Concatenated `output_text` parts of all message items. Reasoning and
    /// tool items are skipped. May be empty.
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter().flatten())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

impl OpenAIResponsesClient {
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url,
            client: build_http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAIResponsesClient {
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = ResponsesRequest {
            model: &request.model,
            instructions: &request.instructions,
            input: &request.user_content,
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            text: request.schema.as_ref().map(|schema| ResponsesText {
                format: JsonSchemaFormat::from_descriptor(schema),
            }),
        };

        debug!("Calling Responses API with model: {}", request.model);

        let mut req = self
            .client
            .post(endpoint(&self.base_url, "responses"))
            .header("content-type", "application/json");
        if self.api_key.is_usable() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key.expose()));
        }

        let response = req
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Responses API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Responses API error {}: {}", status, error_text);
        }

        let api_response: ResponsesResponse = response
            .json()
            .await
            .context("Failed to parse Responses API response")?;

        let (input_tokens, output_tokens) = api_response
            .usage
            .as_ref()
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        Ok(LlmResponse {
            text: api_response.output_text(),
            input_tokens,
            output_tokens,
        })
    }
}

// ============================================================================
// OpenAI-compatible Chat Completions
// ============================================================================

pub struct OpenAIChatClient {
    api_key: SecretString,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ChatResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: ChatJsonSchema,
}

#[derive(Debug, Serialize)]
struct ChatJsonSchema {
    name: &'static str,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAIChatClient {
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url,
            client: build_http_client(timeout_secs)?,
        })
    }
}

fn chat_request(request: &LlmRequest) -> ChatRequest<'_> {
    // GPT-5+ models use max_completion_tokens instead of max_tokens
    let (max_tokens, max_completion_tokens) = if request.model.starts_with("gpt-5") {
        (None, request.max_output_tokens)
    } else {
        (request.max_output_tokens, None)
    };

    ChatRequest {
        model: &request.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &request.instructions,
            },
            ChatMessage {
                role: "user",
                content: &request.user_content,
            },
        ],
        temperature: request.temperature,
        max_tokens,
        max_completion_tokens,
        response_format: request.schema.as_ref().map(|schema| ChatResponseFormat {
            kind: "json_schema",
            json_schema: ChatJsonSchema {
                name: schema.name().as_str(),
                schema: schema.to_json_schema(),
                strict: true,
            },
        }),
    }
}

#[async_trait]
impl LlmClient for OpenAIChatClient {
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = chat_request(request);

        debug!(
            "Calling chat completions at {} with model: {}",
            self.base_url, request.model
        );

        let mut req = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .header("content-type", "application/json");
        if self.api_key.is_usable() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key.expose()));
        }

        let response = req
            .json(&body)
            .send()
            .await
            .context("Failed to send request to chat completions API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Chat completions API error {}: {}", status, error_text);
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let (input_tokens, output_tokens) = api_response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }
}
