use async_trait::async_trait;
use serde_json::{Value, json};
use swe_core::{Result, SweError, ToolCall, Turn, Usage};
use tracing::{debug, info};

use crate::provider::*;

/// OpenAI-compatible chat completions provider (OpenAI, OpenRouter, Ollama,
/// vLLM, ...).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            provider_name: "openai".into(),
        }
    }

    /// Point at another compatible endpoint, registered under `name`.
    pub fn with_base_url(mut self, url: String, name: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self.provider_name = name;
        self
    }

    fn build_request_body(&self, request: &LlmRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(messages_from_turns(&request.turns));

        let mut body = json!({
            "model": &request.model,
            "temperature": request.temperature,
            "messages": messages,
        });

        // Reasoning models only accept max_completion_tokens.
        if uses_max_completion_tokens(&request.model) {
            body["max_completion_tokens"] = json!(request.max_tokens);
        } else {
            body["max_tokens"] = json!(request.max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        body
    }
}

/// Requests attach to the preceding assistant message as `tool_calls`;
/// results become `tool` role messages.
pub(crate) fn messages_from_turns(turns: &[Turn]) -> Vec<Value> {
    let mut messages: Vec<Value> = Vec::new();
    for turn in turns {
        match turn {
            Turn::User { text } => messages.push(json!({"role": "user", "content": text})),
            Turn::AssistantText { text } => {
                messages.push(json!({"role": "assistant", "content": text}))
            }
            Turn::ToolCallRequest { call } => {
                let entry = json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.tool_name,
                        "arguments": call.arguments.to_string(),
                    }
                });
                match messages.last_mut() {
                    Some(last) if last["role"] == "assistant" => {
                        match last["tool_calls"].as_array_mut() {
                            Some(calls) => calls.push(entry),
                            None => last["tool_calls"] = json!([entry]),
                        }
                    }
                    _ => messages.push(json!({
                        "role": "assistant",
                        "content": Value::Null,
                        "tool_calls": [entry],
                    })),
                }
            }
            Turn::ToolCallResult { result } => messages.push(json!({
                "role": "tool",
                "tool_call_id": result.tool_call_id,
                "content": result.content,
            })),
        }
    }
    messages
}

fn parse_response(data: &Value) -> LlmResponse {
    let choice = &data["choices"][0];
    let text = choice["message"]["content"].as_str().unwrap_or("").to_string();

    let calls: Vec<ToolCall> = choice["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let raw = c["function"]["arguments"].as_str().unwrap_or("{}");
                    // Unparseable arguments are kept verbatim so schema
                    // validation reports them to the model.
                    let arguments = serde_json::from_str(raw)
                        .unwrap_or_else(|_| Value::String(raw.to_string()));
                    Some(ToolCall::new(
                        c["id"].as_str().unwrap_or_default(),
                        c["function"]["name"].as_str()?,
                        arguments,
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    let output = ModelOutput::from_parts(text, calls);
    let stop_reason = match choice["finish_reason"].as_str().unwrap_or("") {
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ if output.has_tool_calls() => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    LlmResponse {
        output,
        usage: Usage {
            input_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        },
        stop_reason,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn models(&self) -> Vec<String> {
        vec![
            "gpt-4o".into(),
            "gpt-4o-mini".into(),
            "gpt-4.1".into(),
            "o3".into(),
            "o4-mini".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        debug!(provider = %self.provider_name, model = %request.model, "sending chat completion request");

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| SweError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(SweError::RateLimited { retry_after_secs: 20 });
            }
            let text = resp.text().await.unwrap_or_default();
            return Err(SweError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| SweError::LlmProvider(e.to_string()))?;

        Ok(parse_response(&data))
    }

    async fn health_check(&self) -> Result<()> {
        info!(provider = self.provider_name, "checking API health");
        if self.api_key.is_empty() && self.base_url.contains("api.openai.com") {
            return Err(SweError::LlmProvider(format!(
                "{} API key not set",
                self.provider_name
            )));
        }
        Ok(())
    }
}

/// Returns true for models that require `max_completion_tokens` instead of `max_tokens`.
fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
        || m.contains("gpt-5")
}
