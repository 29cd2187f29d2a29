//! Mock completion provider for testing
//!
//! Returns a configurable answer or error without touching the network and
//! records what it was asked.

use std::sync::{Arc, Mutex};

use crate::providers::{CompletionMeta, CompletionProvider, ProviderError};

pub struct MockCompletionProvider {
    /// Answer returned from complete_chat()
    response: Arc<Mutex<Option<String>>>,
    /// Optional error to return instead of the answer
    error: Arc<Mutex<Option<ProviderError>>>,
    call_count: Arc<Mutex<usize>>,
    last_prompt: Arc<Mutex<Option<String>>>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self {
            response: Arc::new(Mutex::new(Some("Mock response".to_string()))),
            error: Arc::new(Mutex::new(None)),
            call_count: Arc::new(Mutex::new(0)),
            last_prompt: Arc::new(Mutex::new(None)),
        }
    }

    /// A mock that answers every prompt with `content`
    pub fn answering(content: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.set_response(Some(content.into()));
        mock
    }

    /// A mock that fails every call with `error`
    pub fn failing(error: ProviderError) -> Self {
        let mock = Self::new();
        mock.set_error(error);
        mock
    }

    pub fn set_response(&self, content: Option<String>) {
        *self.response.lock().unwrap() = content;
    }

    pub fn set_error(&self, error: ProviderError) {
        *self.error.lock().unwrap() = Some(error);
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete_chat(
        &self,
        prompt: &str,
        _meta: &CompletionMeta,
    ) -> Result<Option<String>, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }

        Ok(self.response.lock().unwrap().clone())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockCompletionProvider::answering("Salut");
        let meta = CompletionMeta::new("whatsapp:+1");

        let reply = mock.complete_chat("Bonjour", &meta).await.unwrap();
        assert_eq!(reply, Some("Salut".to_string()));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.last_prompt(), Some("Bonjour".to_string()));
    }

    #[tokio::test]
    async fn test_mock_error() {
        let mock = MockCompletionProvider::failing(ProviderError::network("down"));
        let result = mock
            .complete_chat("Bonjour", &CompletionMeta::new("whatsapp:+1"))
            .await;
        assert!(result.is_err());
    }
}
