//! Retrieval collaborator boundary.
//!
//! The pipeline consumes retrieval exactly once, at job creation, to freeze
//! the source snapshot — it never re-queries mid-job, which pins input
//! consistency across phases.

use async_trait::async_trait;

use crate::error::Result;

/// Assembles source context for a generation request.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Return source text relevant to `query` from the user's notebook,
    /// optionally restricted to `source_ids`.
    async fn get_context(
        &self,
        user_id: &str,
        notebook_id: &str,
        source_ids: Option<&[String]>,
        query: &str,
    ) -> Result<String>;
}

/// Retriever that returns a fixed context regardless of the query. Used in
/// tests, and by the CLI's standalone mode where the submitted content is
/// the whole corpus.
pub struct StaticRetriever {
    context: Option<String>,
}

impl StaticRetriever {
    /// Always return the given context.
    pub fn fixed(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
        }
    }

    /// Echo the query back as the context.
    pub fn passthrough() -> Self {
        Self { context: None }
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn get_context(
        &self,
        _user_id: &str,
        _notebook_id: &str,
        _source_ids: Option<&[String]>,
        query: &str,
    ) -> Result<String> {
        Ok(self
            .context
            .clone()
            .unwrap_or_else(|| query.to_string()))
    }
}
