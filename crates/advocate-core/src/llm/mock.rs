//! Scripted completion backend for tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{CompletionBackend, CompletionError, CompletionRequest};

/// What a scripted call should produce.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Reply(String),
    Error(String),
}

/// Completion backend that replays a scripted sequence of outcomes.
///
/// Outcomes are consumed in order; once the sequence is exhausted every
/// further call yields the fallback outcome. Prompts are recorded so tests
/// can assert on what was sent.
pub struct MockCompletion {
    // Stored reversed so pop() yields outcomes in submission order.
    responses: Mutex<Vec<MockOutcome>>,
    fallback: MockOutcome,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletion {
    pub fn new(fallback: MockOutcome) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallback,
            delay: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Backend that answers every call with the same text.
    pub fn replying(text: &str) -> Self {
        Self::new(MockOutcome::Reply(text.to_string()))
    }

    /// Backend that fails every call.
    pub fn failing(message: &str) -> Self {
        Self::new(MockOutcome::Error(message.to_string()))
    }

    pub fn with_sequence(mut self, mut outcomes: Vec<MockOutcome>) -> Self {
        outcomes.reverse();
        self.responses = Mutex::new(outcomes);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl CompletionBackend for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let outcome = self.next_outcome();
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                MockOutcome::Reply(text) => Ok(text),
                MockOutcome::Error(message) => Err(CompletionError::InvalidResponse(message)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_sequence_then_fallback() {
        let backend = MockCompletion::replying("fallback").with_sequence(vec![
            MockOutcome::Reply("first".into()),
            MockOutcome::Error("boom".into()),
        ]);
        let request = CompletionRequest::deterministic("p".into(), 16);

        assert_eq!(backend.complete(&request).await.unwrap(), "first");
        assert!(backend.complete(&request).await.is_err());
        assert_eq!(backend.complete(&request).await.unwrap(), "fallback");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn records_prompts_in_call_order() {
        let backend = MockCompletion::replying("ok");
        let first = CompletionRequest::deterministic("first prompt".into(), 16);
        let second = CompletionRequest::deterministic("second prompt".into(), 16);

        backend.complete(&first).await.unwrap();
        backend.complete(&second).await.unwrap();

        assert_eq!(backend.prompts(), vec!["first prompt", "second prompt"]);
    }
}
