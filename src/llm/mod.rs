pub mod client;
pub mod client_impl;
pub mod factory;
pub mod gateway;

pub use client::{LlmClient, LlmRequest, LlmResponse, MockLlmClient};
pub use gateway::{ModelGateway, ModelRole, RetryPolicy};
