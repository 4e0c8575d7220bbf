use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

use crate::errors::{CycleError, CycleResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> CycleResult<LlmResponse> {
        let body = request_body(&messages, cfg);

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            "sending LLM request"
        );
        tracing::debug!(
            body = %serde_json::to_string(&sanitized_for_log(&body)).unwrap_or_default(),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CycleError::LlmProvider(format!("{}: request failed: {e}", self.id)))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(CycleError::LlmProvider(format!("{}: {}: {}", self.id, status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Handle SSE streaming response, accumulating the full text.
    async fn handle_stream(&self, response: reqwest::Response) -> CycleResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut line_buf = String::new();

        let mut resp_content = String::new();
        let mut resp_reasoning = String::new();

        'stream: while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            let text = String::from_utf8_lossy(&bytes);

            for ch in text.chars() {
                if ch != '\n' {
                    line_buf.push(ch);
                    continue;
                }
                let line = line_buf.trim().to_string();
                line_buf.clear();
                if line.is_empty() {
                    continue;
                }

                match sse_parser::parse_sse_line(&line) {
                    Ok(Some(chunk)) => match chunk.kind {
                        StreamChunkKind::Reasoning => resp_reasoning.push_str(&chunk.content),
                        StreamChunkKind::Content => {
                            tracing::trace!(provider = %self.id, delta = %chunk.content, "stream chunk");
                            resp_content.push_str(&chunk.content);
                        }
                        StreamChunkKind::Error => {
                            return Err(CycleError::LlmProvider(format!(
                                "{}: stream error: {}",
                                self.id, chunk.content
                            )));
                        }
                        StreamChunkKind::Done => break 'stream,
                    },
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!("SSE parse skipped: {e}");
                    }
                }
            }
        }

        tracing::info!(
            provider = %self.id,
            content_len = resp_content.len(),
            reasoning_len = resp_reasoning.len(),
            "LLM stream complete"
        );

        Ok(LlmResponse {
            content: resp_content,
            reasoning: resp_reasoning,
        })
    }

    /// Handle a non-streaming JSON response.
    async fn handle_json(&self, response: reqwest::Response) -> CycleResult<LlmResponse> {
        let json: Value = response.json().await?;
        let response = parse_completion(&json);
        tracing::info!(
            provider = %self.id,
            content_len = response.content.len(),
            "LLM JSON response received"
        );
        Ok(response)
    }
}

fn request_body(messages: &[ChatMessage], cfg: &CallConfig) -> Value {
    let mut body = serde_json::json!({
        "model": cfg.model,
        "messages": messages,
        "stream": cfg.stream,
        "temperature": cfg.temperature,
    });
    if cfg.json_mode {
        body["response_format"] = serde_json::json!({ "type": "json_object" });
    }
    body
}

fn parse_completion(json: &Value) -> LlmResponse {
    let message = &json["choices"][0]["message"];
    LlmResponse {
        content: message["content"].as_str().unwrap_or("").to_string(),
        reasoning: message["reasoning_content"].as_str().unwrap_or("").to_string(),
    }
}

/// Copy of a request body with image payloads replaced, for logging only.
fn sanitized_for_log(body: &Value) -> Value {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            // content can be string or array of parts; we only touch the array case.
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.get_mut("image_url").and_then(|i| i.get_mut("url")) {
                        *url = Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    log_body
}
