//! Single entry point for model calls: one instructions string, one user
//! string, an optional output schema, and back comes the raw response text.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::client::{LlmClient, LlmRequest};
use crate::config::Config;
use crate::error::PipelineError;
use crate::schema::SchemaDescriptor;

/// Which configured model a gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Classifier,
    Writer,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Classifier => "classifier",
            ModelRole::Writer => "writer",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retries apply to transport failures only. Zero retries is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-based), doubling each time.
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Clone)]
pub struct ModelGateway {
    client: Arc<dyn LlmClient>,
    model: String,
    role: ModelRole,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, role: ModelRole) -> Self {
        Self {
            client,
            model: model.into(),
            role,
            temperature: None,
            max_output_tokens: None,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Gateway for `role` with the model and request settings from `config`.
    pub fn from_config(client: Arc<dyn LlmClient>, config: &Config, role: ModelRole) -> Self {
        let model = match role {
            ModelRole::Classifier => &config.models.classifier,
            ModelRole::Writer => &config.models.writer,
        };
        let mut gateway = Self::new(client, model.clone(), role).with_retry(RetryPolicy {
            max_retries: config.api.max_retries,
            backoff: Duration::from_millis(config.api.retry_backoff_ms),
        });
        gateway.temperature = config.api.temperature;
        gateway.max_output_tokens = config.api.max_output_tokens;
        gateway
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Calls in flight when `cancel` fires fail with a transport error.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    /// Send one request and return the model's text unchanged. The text may
    /// be empty. Only transport failures are reported here; parsing the text
    /// is the caller's job.
    pub async fn send(
        &self,
        instructions: &str,
        user_content: &str,
        schema: Option<&SchemaDescriptor>,
    ) -> Result<String, PipelineError> {
        let request = LlmRequest {
            model: self.model.clone(),
            instructions: instructions.to_string(),
            user_content: user_content.to_string(),
            schema: schema.cloned(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };
        let schema_name = schema.map(|s| s.name().as_str()).unwrap_or("text");

        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(anyhow::anyhow!("request cancelled")),
                response = self.client.send(&request) => response,
            };
            let duration_s = start.elapsed().as_secs_f64();

            match result {
                Ok(response) => {
                    info!(
                        model = %self.model,
                        role = %self.role,
                        schema = schema_name,
                        input_tokens = response.input_tokens,
                        output_tokens = response.output_tokens,
                        duration_s,
                        "Model response received"
                    );
                    return Ok(response.text);
                }
                Err(e) if attempt < self.retry.max_retries && !self.cancel.is_cancelled() => {
                    let delay = self.retry.delay(attempt);
                    attempt += 1;
                    warn!(
                        model = %self.model,
                        role = %self.role,
                        schema = schema_name,
                        attempt,
                        max_retries = self.retry.max_retries,
                        "Model call failed, retrying in {:?}: {:#}",
                        delay,
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return Err(PipelineError::transport(anyhow::anyhow!("request cancelled")));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(
                        model = %self.model,
                        role = %self.role,
                        schema = schema_name,
                        duration_s,
                        "Model call failed: {:#}",
                        e
                    );
                    return Err(PipelineError::Transport(e));
                }
            }
        }
    }
}
