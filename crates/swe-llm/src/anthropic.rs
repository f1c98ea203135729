use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use swe_core::{Result, SweError, ToolCall, Turn, Usage};
use tracing::{debug, info};

use crate::provider::*;

const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".into(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request_body(&self, request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": &request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages_from_turns(&request.turns),
        });

        if let Some(ref system) = request.system {
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        body
    }
}

/// Map transcript turns onto alternating user/assistant messages. Requests
/// become `tool_use` blocks on the assistant side, results become
/// `tool_result` blocks on the user side, and consecutive blocks of the same
/// role share one message.
pub(crate) fn messages_from_turns(turns: &[Turn]) -> Vec<Value> {
    let mut messages: Vec<Value> = Vec::new();
    for turn in turns {
        let (role, block) = match turn {
            Turn::User { text } => ("user", json!({"type": "text", "text": text})),
            Turn::AssistantText { text } => ("assistant", json!({"type": "text", "text": text})),
            Turn::ToolCallRequest { call } => (
                "assistant",
                json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.tool_name,
                    "input": call.arguments,
                }),
            ),
            Turn::ToolCallResult { result } => (
                "user",
                json!({
                    "type": "tool_result",
                    "tool_use_id": result.tool_call_id,
                    "content": result.content,
                    "is_error": result.is_error,
                }),
            ),
        };

        match messages.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(blocks) = last["content"].as_array_mut() {
                    blocks.push(block);
                }
            }
            _ => messages.push(json!({"role": role, "content": [block]})),
        }
    }
    messages
}

fn parse_response(data: &Value) -> LlmResponse {
    let blocks = data["content"].as_array().cloned().unwrap_or_default();

    let text = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    let calls: Vec<ToolCall> = blocks
        .iter()
        .filter(|b| b["type"] == "tool_use")
        .map(|b| {
            ToolCall::new(
                b["id"].as_str().unwrap_or_default(),
                b["name"].as_str().unwrap_or_default(),
                b["input"].clone(),
            )
        })
        .collect();

    let stop_reason = match data["stop_reason"].as_str() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    };

    let usage = Usage {
        input_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
    };

    LlmResponse {
        output: ModelOutput::from_parts(text, calls),
        usage,
        stop_reason,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-opus-4-20250514".into(),
            "claude-sonnet-4-20250514".into(),
            "claude-3-5-haiku-latest".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        debug!(model = %request.model, turns = request.turns.len(), "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SweError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            if status.as_u16() == 429 {
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30);
                return Err(SweError::RateLimited { retry_after_secs });
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
        info!("checking Anthropic API health");
        if self.api_key.is_empty() {
            return Err(SweError::LlmProvider("ANTHROPIC_API_KEY not set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swe_core::{ToolOutput, ToolResult};

    #[test]
    fn test_tool_round_merges_into_alternating_messages() {
        let turns = vec![
            Turn::user("list the repo"),
            Turn::assistant("Looking."),
            Turn::ToolCallRequest { call: ToolCall::new("a", "ls", json!({})) },
            Turn::ToolCallRequest { call: ToolCall::new("b", "glob", json!({"pattern": "*.rs"})) },
            Turn::ToolCallResult { result: ToolResult::success("a", ToolOutput::text("src")) },
            Turn::ToolCallResult { result: ToolResult::success("b", ToolOutput::text("main.rs")) },
        ];
        let messages = messages_from_turns(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"].as_array().unwrap().len(), 3);
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "b");
    }

    #[test]
    fn test_parse_tool_use_response() {
        let data = json!({
            "content": [
                {"type": "text", "text": "I'll read it."},
                {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"file_path": "/a"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 4}
        });
        let resp = parse_response(&data);
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.usage.total(), 16);
        match resp.output {
            ModelOutput::ToolCalls { preamble, calls } => {
                assert_eq!(preamble.as_deref(), Some("I'll read it."));
                assert_eq!(calls[0].tool_name, "read_file");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_final_text() {
        let data = json!({"content": [{"type": "text", "text": "Done."}], "stop_reason": "end_turn"});
        assert_eq!(parse_response(&data).output, ModelOutput::Final("Done.".into()));
    }
}
