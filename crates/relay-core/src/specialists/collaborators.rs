//! Narrow interfaces to external collaborators.
//!
//! Specialists only ever see these traits. HTTP implementations live in
//! `specialists::http`; tests use scripted implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::handoff::{AssetDescriptor, PriceSummary};

/// A generation request for the language model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentRequest {
    pub system: String,
    pub prompt: String,
    /// Error feedback from the previous attempt, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl ContentRequest {
    /// Prompt with the feedback block appended.
    pub fn full_prompt(&self) -> String {
        match &self.feedback {
            Some(feedback) => format!("{}\n\n{}", self.prompt, feedback),
            None => self.prompt.clone(),
        }
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Return the model's text reply.
    async fn generate(&self, request: &ContentRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetQuery {
    pub tags: Vec<String>,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[async_trait]
pub trait AssetLookup: Send + Sync {
    async fn search(&self, query: &AssetQuery) -> Result<Vec<AssetDescriptor>, GenerationError>;
}

#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn lowest_price(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<PriceSummary, GenerationError>;
}
