//! LLM provider setup via rig-core.
//!
//! [`anthropic_client`] builds an Anthropic [`Client`] from a
//! [`SecretString`]-wrapped API key; [`RigGenerator`] adapts it to the
//! pipeline's [`TextGenerator`] boundary.
//!
//! Anthropic has no dedicated structured-output mode through this path, so
//! JSON-object requests are enforced by instruction and the callers strip
//! code fences before parsing. The prompt path does not surface token
//! usage either — the adapter reports `usage: None` and the budget ledger
//! keeps its conservative pre-flight estimate.
//!
//! [`Client`]: rig::providers::anthropic::Client
//! [`SecretString`]: secrecy::SecretString

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};
use crate::provider::{ChatMessage, Completion, ResponseFormat, Role, TextGenerator};

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> std::result::Result<rig::providers::anthropic::Client, rig::http_client::Error> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
}

/// [`TextGenerator`] backed by a rig-core Anthropic model.
pub struct RigGenerator {
    client: rig::providers::anthropic::Client,
    model: String,
}

impl RigGenerator {
    pub fn new(client: rig::providers::anthropic::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for RigGenerator {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        format: ResponseFormat,
    ) -> Result<Completion> {
        let mut preamble = String::new();
        let mut user_parts: Vec<&str> = Vec::new();
        for message in messages {
            match message.role {
                Role::System => {
                    if !preamble.is_empty() {
                        preamble.push_str("\n\n");
                    }
                    preamble.push_str(&message.content);
                }
                Role::User => user_parts.push(&message.content),
            }
        }
        if format == ResponseFormat::JsonObject {
            if !preamble.is_empty() {
                preamble.push_str("\n\n");
            }
            preamble.push_str("Respond with a single JSON object and nothing else.");
        }

        let agent = self.client.agent(&self.model).preamble(&preamble).build();
        let content = agent
            .prompt(user_parts.join("\n\n"))
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        Ok(Completion {
            content,
            usage: None,
        })
    }
}
