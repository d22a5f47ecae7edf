//! Background-context retrieval seam
//!
//! Retrieval is an opaque collaborator that hands the dialogue engine a
//! text blob to ground the reply. The default implementation returns a
//! fixed string; a real deployment plugs in its own retriever.

use async_trait::async_trait;

use crate::Result;

/// Supplies background context for a user utterance
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Retrieve context relevant to `query`; empty string means none
    async fn retrieve(&self, query: &str) -> Result<String>;
}

/// Retriever that always returns the same context blob
#[derive(Debug, Clone, Default)]
pub struct StaticContextRetriever {
    context: String,
}

impl StaticContextRetriever {
    /// Create a retriever returning `context` for every query
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

#[async_trait]
impl ContextRetriever for StaticContextRetriever {
    async fn retrieve(&self, _query: &str) -> Result<String> {
        Ok(self.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_retriever_returns_fixed_blob() {
        let retriever = StaticContextRetriever::new("the sky is blue");
        assert_eq!(retriever.retrieve("anything").await.unwrap(), "the sky is blue");
    }

    #[tokio::test]
    async fn default_retriever_is_empty() {
        let retriever = StaticContextRetriever::default();
        assert!(retriever.retrieve("q").await.unwrap().is_empty());
    }
}
