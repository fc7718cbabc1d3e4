//! Error types surfaced by the generation pipeline.
//!
//! Every stage and the orchestrator report failures through [`PipelineError`].
//! None of them retry or swallow an error; the first failure aborts the
//! operation and reaches the caller unchanged.

use crate::prompts::template::TemplateError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Network, auth, rate-limit or cancellation failure talking to the model.
    /// Opaque: the pipeline never inspects the inner error.
    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),

    /// The response text is not syntactically valid JSON.
    #[error("malformed output for {schema}: {reason}")]
    MalformedOutput { schema: String, reason: String },

    /// The response parsed but does not match the declared schema.
    #[error("schema violation in {schema} at `{field}`: {reason}")]
    SchemaViolation {
        schema: String,
        field: String,
        reason: String,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl PipelineError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        Self::Transport(err.into())
    }

    /// Stable label used in logs and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Template(TemplateError::Syntax { .. }) => "template_syntax",
            Self::Template(TemplateError::Render { .. }) => "template_render",
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
