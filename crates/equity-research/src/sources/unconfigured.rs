//! Stand-in for a capability without credentials

use super::{DataSource, FetchQuery};
use crate::error::CollaboratorError;
use async_trait::async_trait;

/// Data source that fails every fetch with [`CollaboratorError::NotConfigured`]
///
/// Nodes depending on it degrade to `unavailable`; the rest of the request
/// proceeds.
#[derive(Debug, Clone)]
pub struct UnconfiguredSource {
    capability: String,
}

impl UnconfiguredSource {
    /// `capability` names what is missing, e.g. `"news (FINNHUB_API_KEY)"`
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
        }
    }
}

#[async_trait]
impl DataSource for UnconfiguredSource {
    async fn fetch(&self, _query: &FetchQuery) -> Result<serde_json::Value, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.capability.clone()))
    }

    fn name(&self) -> &str {
        &self.capability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_not_configured() {
        let source = UnconfiguredSource::new("macro data (FRED_API_KEY)");
        let err = source.fetch(&FetchQuery::MacroIndicators).await.unwrap_err();
        assert_eq!(err.to_string(), "macro data (FRED_API_KEY) is not configured");
        assert!(!err.is_retryable());
    }
}
