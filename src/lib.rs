//! evidencer - Turn skill notes and review text into competency evidence
//!
//! A multi-stage LLM pipeline: every stage renders a prompt template, asks the
//! model for JSON of a fixed schema, and validates the reply strictly before
//! the next stage sees it. Works against the OpenAI Responses API or any
//! Chat Completions compatible server.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod schema;
pub mod skills;
pub mod util;
