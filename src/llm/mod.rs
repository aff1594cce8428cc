//! Language model adapter

mod client;

pub use client::{ChatClient, ParsedResponse, DEFAULT_BASE_URL};

use crate::Result;
use async_trait::async_trait;

/// One chat completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    /// Ask the backend for a JSON object response
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(user: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature,
            json_response: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Anything that can answer a completion request with text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
