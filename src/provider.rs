//! Text-generation collaborator boundary.
//!
//! The pipeline treats the provider as an opaque request/response function
//! with usage accounting. The production adapter lives in [`crate::llm`];
//! tests inject scripted implementations.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// One message in a provider request.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Requested response shape. Structured phases (plan, draft, repair,
/// semantic verdict) ask for a single JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    pub total_tokens: u32,
}

/// A provider response. `usage` is `None` when the provider does not report
/// token counts; the budget ledger then keeps its pre-flight estimate.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// An opaque text-generation provider.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        format: ResponseFormat,
    ) -> Result<Completion>;
}
