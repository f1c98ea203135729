//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::*;
use swe_core::{Result, SweError, ToolCall, Usage};

/// A mock LLM provider that returns pre-configured responses in order.
///
/// # Example
/// ```
/// use swe_llm::mock::MockProvider;
/// let provider = MockProvider::new("mock")
///     .with_tool_call("ls", serde_json::json!({"path": "."}))
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Served once the queue is empty. Without it the provider answers with
    /// a fixed "no more responses" text.
    repeat: Option<MockResponse>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub text: String,
    /// Calls with an empty id get a fresh unique id each time they are served.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
    /// Sleep before answering; lets tests interrupt an in-flight model call.
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            usage: Usage { input_tokens: 100, output_tokens: 50 },
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            usage: Usage { input_tokens: 100, output_tokens: 20 },
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            repeat: None,
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a final text response.
    pub fn with_response(self, text: &str) -> Self {
        self.with_mock_response(MockResponse::text(text))
    }

    /// Queue a response requesting a single tool call.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.with_mock_response(MockResponse::tool_calls(vec![ToolCall::new("", name, args)]))
    }

    /// Queue a response requesting several tool calls in one batch.
    pub fn with_tool_calls(self, calls: Vec<(&str, serde_json::Value)>) -> Self {
        let calls = calls
            .into_iter()
            .map(|(name, args)| ToolCall::new("", name, args))
            .collect();
        self.with_mock_response(MockResponse::tool_calls(calls))
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.with_mock_response(MockResponse::error(error))
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push_back(resp);
        self
    }

    /// Serve `resp` forever once the queue runs dry.
    pub fn repeating(mut self, resp: MockResponse) -> Self {
        self.repeat = Some(resp);
        self
    }

    /// All requests made to this provider so far.
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next_response(&self) -> MockResponse {
        let mut resp = self
            .responses
            .lock()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| MockResponse::text("(mock: no more queued responses)"));
        for call in &mut resp.tool_calls {
            if call.id.is_empty() {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
        }
        resp
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["test-model".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(delay) = mock.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = mock.error {
            return Err(SweError::LlmProvider(error));
        }

        let output = ModelOutput::from_parts(mock.text, mock.tool_calls);
        let stop_reason = if output.has_tool_calls() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        Ok(LlmResponse {
            output,
            usage: mock.usage,
            stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swe_core::Turn;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "test-model".into(),
            system: None,
            turns: vec![],
            tools: vec![],
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_mock_text_response() {
        let provider = MockProvider::new("mock").with_response("Hello!");
        let resp = provider.complete(&request()).await.unwrap();
        assert_eq!(resp.output, ModelOutput::Final("Hello!".into()));
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn test_mock_tool_call_gets_unique_ids() {
        let provider = MockProvider::new("mock")
            .with_tool_calls(vec![("ls", serde_json::json!({})), ("ls", serde_json::json!({}))]);
        let resp = provider.complete(&request()).await.unwrap();
        let ModelOutput::ToolCalls { calls, .. } = resp.output else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].id.is_empty());
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let provider = MockProvider::new("mock").with_error("HTTP 400: bad request");
        assert!(provider.complete(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let provider = MockProvider::new("mock").with_response("ok");
        let mut req = request();
        req.system = Some("be nice".into());
        req.turns.push(Turn::user("hello"));
        provider.complete(&req).await.unwrap();

        let recorded = provider.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].system.as_deref(), Some("be nice"));
        assert_eq!(recorded[0].turns.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_repeating_after_queue() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .repeating(MockResponse::tool_calls(vec![ToolCall::new("", "ls", serde_json::json!({}))]));
        let r1 = provider.complete(&request()).await.unwrap();
        let r2 = provider.complete(&request()).await.unwrap();
        let r3 = provider.complete(&request()).await.unwrap();
        assert_eq!(r1.output, ModelOutput::Final("first".into()));
        assert!(r2.output.has_tool_calls());
        assert!(r3.output.has_tool_calls());
        assert_ne!(r2.output, r3.output);
    }
}
