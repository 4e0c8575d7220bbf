use std::sync::Arc;

use base64::Engine as _;
use serde_json::Value;

use crate::errors::{CycleError, CycleResult};
use crate::llm::json_output::extract_json;
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, MessageContent};
use crate::perception::types::ScreenshotRef;

pub const MAX_IMAGES_PER_CALL: usize = 2;

/// One reasoning role bound to a provider, a model and a system prompt.
pub struct ReasoningClient {
    role: &'static str,
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    system_prompt: Option<String>,
    max_format_attempts: u32,
}

impl ReasoningClient {
    pub fn new(
        role: &'static str,
        provider: Arc<dyn LlmProvider>,
        call: CallConfig,
        system_prompt: Option<String>,
        max_format_attempts: u32,
    ) -> Self {
        Self {
            role,
            provider,
            call,
            system_prompt,
            max_format_attempts: max_format_attempts.max(1),
        }
    }

    pub fn for_role(
        registry: &ProviderRegistry,
        role: &'static str,
        system_prompt: Option<String>,
        max_format_attempts: u32,
    ) -> CycleResult<Self> {
        let (provider, call) = registry.call_config_for_role(role)?;
        Ok(Self::new(role, provider, call, system_prompt, max_format_attempts))
    }

    /// Send one prompt and parse the reply with `parse`.
    ///
    /// A reply that is not JSON, or that `parse` rejects, is re-asked up to the
    /// configured number of attempts before it becomes a `ReasoningFormat` error.
    /// Provider failures are returned immediately.
    pub async fn call<T, F>(
        &self,
        default_system: &str,
        user_text: String,
        screenshots: &[ScreenshotRef],
        parse: F,
    ) -> CycleResult<T>
    where
        F: Fn(Value) -> Result<T, String> + Send + Sync,
        T: Send,
    {
        if screenshots.len() > MAX_IMAGES_PER_CALL {
            return Err(CycleError::reasoning_format(
                self.role,
                format!("{} images given, at most {MAX_IMAGES_PER_CALL} per call", screenshots.len()),
            ));
        }

        let system = self.system_prompt.as_deref().unwrap_or(default_system);
        let mut messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(user_content(user_text, screenshots).await?),
        ];

        let mut last_problem = String::new();
        for attempt in 1..=self.max_format_attempts {
            let response = self.provider.chat(messages.clone(), &self.call).await?;
            match extract_json(&response.content).and_then(&parse) {
                Ok(value) => {
                    tracing::debug!(role = self.role, attempt, "reasoning output accepted");
                    return Ok(value);
                }
                Err(problem) => {
                    tracing::warn!(
                        role = self.role,
                        attempt,
                        problem = %problem,
                        "malformed reasoning output"
                    );
                    messages.push(ChatMessage::assistant(response.content));
                    messages.push(ChatMessage::user(MessageContent::Text(format!(
                        "Your previous reply was rejected: {problem}. Answer again with only the JSON."
                    ))));
                    last_problem = problem;
                }
            }
        }
        Err(CycleError::reasoning_format(self.role, last_problem))
    }
}

async fn user_content(text: String, screenshots: &[ScreenshotRef]) -> CycleResult<MessageContent> {
    if screenshots.is_empty() {
        return Ok(MessageContent::Text(text));
    }
    let mut parts = Vec::with_capacity(screenshots.len() + 1);
    for shot in screenshots {
        let bytes = shot.read_bytes().await.map_err(|e| {
            CycleError::Perception(format!("cannot read screenshot {shot}: {e}"))
        })?;
        parts.push(ContentPart::png_base64(
            &base64::engine::general_purpose::STANDARD.encode(bytes),
        ));
    }
    parts.push(ContentPart::Text { text });
    Ok(MessageContent::Parts(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    fn client(provider: Arc<ScriptedProvider>, attempts: u32) -> ReasoningClient {
        ReasoningClient::new("planner", provider, ScriptedProvider::call_config(), None, attempts)
    }

    fn as_object(value: Value) -> Result<Value, String> {
        if value.is_object() {
            Ok(value)
        } else {
            Err("expected an object".into())
        }
    }

    #[tokio::test]
    async fn malformed_reply_is_reasked_once() {
        let provider = ScriptedProvider::new(["sure thing!", "```json\n{\"ok\": true}\n```"]);
        let value = client(provider.clone(), 2)
            .call("system", "go".into(), &[], as_object)
            .await
            .unwrap();
        assert_eq!(value["ok"], true);

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        // the retry carries the rejected reply and a correction
        assert_eq!(calls[1].len(), 4);
        assert_eq!(calls[1][2].role, "assistant");
    }

    #[tokio::test]
    async fn exhausted_attempts_become_format_error() {
        let provider = ScriptedProvider::new(["[1, 2]", "[3]"]);
        let err = client(provider, 2)
            .call("system", "go".into(), &[], as_object)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CycleError::ReasoningFormat { ref role, ref detail } if role == "planner" && detail == "expected an object"
        ));
    }

    #[tokio::test]
    async fn more_than_two_images_are_rejected_before_calling() {
        let provider = ScriptedProvider::new(["{}"]);
        let shots = vec![ScreenshotRef::new("a.png"); 3];
        let err = client(provider.clone(), 1)
            .call("system", "go".into(), &shots, as_object)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "reasoning_format_error");
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn screenshots_are_sent_as_data_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("before.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let provider = ScriptedProvider::new(["{}"]);
        client(provider.clone(), 1)
            .call("system", "go".into(), &[ScreenshotRef::new(&path)], as_object)
            .await
            .unwrap();

        let calls = provider.calls();
        let MessageContent::Parts(parts) = &calls[0][1].content else {
            panic!("expected multimodal content");
        };
        assert!(matches!(&parts[0], ContentPart::ImageUrl { image_url } if image_url.url == "data:image/png;base64,AQID"));
        assert!(matches!(&parts[1], ContentPart::Text { text } if text == "go"));
    }

    #[tokio::test]
    async fn configured_system_prompt_wins() {
        let provider = ScriptedProvider::new(["{}"]);
        let client = ReasoningClient::new(
            "actor",
            provider.clone(),
            ScriptedProvider::call_config(),
            Some("custom".into()),
            1,
        );
        client.call("default", "go".into(), &[], as_object).await.unwrap();
        assert!(matches!(&provider.calls()[0][0].content, MessageContent::Text(t) if t == "custom"));
    }
}
