use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse};
use swe_core::{AgentEvent, EventBus, Result, SweError};

/// Default retry budget for transient errors.
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Base delay for exponential backoff (doubles each retry).
const BASE_DELAY_MS: u64 = 1000;
/// Provider-supplied retry-after hints are capped at this many seconds.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Routes model requests to the right provider and retries transient failures.
#[derive(Clone)]
pub struct ModelRouter {
    providers: Vec<Arc<dyn LlmProvider>>,
    max_retries: u32,
    base_delay: Duration,
    events: Option<EventBus>,
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRouter")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// Check if an error is transient and worth retrying.
pub fn is_retryable(err: &SweError) -> bool {
    match err {
        SweError::RateLimited { .. } => true,
        SweError::LlmProvider(msg) => {
            msg.starts_with("HTTP 429")
                || msg.starts_with("HTTP 500")
                || msg.starts_with("HTTP 502")
                || msg.starts_with("HTTP 503")
                || msg.starts_with("HTTP 529")
                || msg.contains("timed out")
                || msg.contains("connection reset")
                || msg.contains("connection closed")
                || msg.contains("overloaded")
        }
        _ => false,
    }
}

fn retry_after_hint(err: &SweError) -> Option<u64> {
    if let SweError::RateLimited { retry_after_secs } = err {
        Some((*retry_after_secs).min(MAX_RETRY_AFTER_SECS))
    } else {
        None
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRouter {
    pub fn new() -> Self {
        Self {
            providers: vec![],
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            events: None,
        }
    }

    /// Register a provider.
    pub fn add_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        info!(provider = provider.name(), "registered LLM provider");
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.add_provider(provider);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Override the backoff base; retry-after hints are scaled by the same
    /// factor relative to one second.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Find the provider for a model string like "anthropic/claude-sonnet-4".
    pub fn resolve(&self, model: &str) -> Option<(Arc<dyn LlmProvider>, String)> {
        if let Some((prefix, model_name)) = model.split_once('/') {
            for p in &self.providers {
                if p.name().eq_ignore_ascii_case(prefix) {
                    return Some((Arc::clone(p), model_name.to_string()));
                }
            }
        }
        for p in &self.providers {
            if p.models().iter().any(|m| m == model) {
                return Some((Arc::clone(p), model.to_string()));
            }
        }
        // A lone provider serves everything.
        match self.providers.as_slice() {
            [only] => Some((Arc::clone(only), model.to_string())),
            _ => None,
        }
    }

    /// Complete a request, retrying transient errors with exponential backoff.
    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let (provider, model_name) = self
            .resolve(&request.model)
            .ok_or_else(|| SweError::ModelNotFound(request.model.clone()))?;
        let mut req = request.clone();
        req.model = model_name;

        let mut attempt = 0;
        loop {
            match provider.complete(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    let delay = match retry_after_hint(&e) {
                        Some(secs) => self.base_delay * secs as u32,
                        None => self.base_delay * 2u32.pow(attempt),
                    };
                    attempt += 1;
                    warn!(
                        provider = provider.name(),
                        attempt,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    if let Some(events) = &self.events {
                        events.publish(AgentEvent::ModelRetry {
                            attempt,
                            error: e.to_string(),
                        });
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
