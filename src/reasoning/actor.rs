use async_trait::async_trait;
use serde_json::Value;

use crate::agent_engine::state::{Action, ActionKind, Step};
use crate::errors::CycleResult;
use crate::perception::types::{ScreenshotRef, UIElement};
use crate::reasoning::client::ReasoningClient;
use crate::reasoning::prompts;
use crate::reasoning::traits::Actor;

pub struct LlmActor {
    client: ReasoningClient,
}

impl LlmActor {
    pub fn new(client: ReasoningClient) -> Self {
        Self { client }
    }

    async fn request(
        &self,
        system: &str,
        user_text: String,
        screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Option<Action>> {
        let shots: Vec<ScreenshotRef> = screenshot.cloned().into_iter().collect();
        let action = self.client.call(system, user_text, &shots, parse_action).await?;
        match &action {
            Some(a) => tracing::info!(kind = a.kind.as_str(), id = a.id, content = %a.content, "action proposed"),
            None => tracing::warn!("actor found no suitable element"),
        }
        Ok(action)
    }
}

#[async_trait]
impl Actor for LlmActor {
    async fn decide(
        &self,
        step: &Step,
        ui_before: &[UIElement],
        screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Option<Action>> {
        self.request(prompts::ACTOR_SYSTEM, prompts::decide(step, ui_before), screenshot)
            .await
    }

    async fn repair_action(
        &self,
        step: &Step,
        explanation: &str,
        fix: &str,
        ui_before: &[UIElement],
        screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Option<Action>> {
        self.request(
            prompts::ACTOR_REPAIR_SYSTEM,
            prompts::repair_action(step, explanation, fix, ui_before),
            screenshot,
        )
        .await
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `null` or an object without an action means "no action".
fn parse_action(value: Value) -> Result<Option<Action>, String> {
    match &value {
        Value::Null => return Ok(None),
        Value::Object(map) if map.get("action").map_or(true, Value::is_null) => return Ok(None),
        Value::Object(_) => {}
        other => return Err(format!("expected one action object, got {other}")),
    }

    let mut action: Action =
        serde_json::from_value(value).map_err(|e| format!("action does not match the schema: {e}"))?;
    // The element's box is bound later from the UI snapshot.
    action.bbox = None;
    action.text = non_empty(action.text);
    action.key = non_empty(action.key);

    match action.kind {
        ActionKind::Type if action.text.is_none() => {
            return Err("action \"type\" needs a non-empty \"text\"".into());
        }
        ActionKind::Type => {}
        _ => action.text = None,
    }
    if action.kind == ActionKind::Key && action.key.is_none() {
        return Err("action \"key\" needs a \"key\"".into());
    }
    Ok(Some(action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{element, plan, ScriptedProvider};

    fn actor(replies: &[&str]) -> LlmActor {
        LlmActor::new(ReasoningClient::new(
            "actor",
            ScriptedProvider::new(replies.iter().copied()),
            ScriptedProvider::call_config(),
            None,
            2,
        ))
    }

    #[test]
    fn text_only_survives_on_type() {
        let click = parse_action(serde_json::json!({
            "id": 2, "content": "Trending", "action": "click", "text": "ignored", "bbox": [0, 0, 1, 1]
        }))
        .unwrap()
        .unwrap();
        assert_eq!(click.text, None);
        assert_eq!(click.bbox, None);

        let typing = parse_action(serde_json::json!({
            "id": "4", "content": "Search", "action": "type", "text": "lofi"
        }))
        .unwrap()
        .unwrap();
        assert_eq!(typing.id, 4);
        assert_eq!(typing.text.as_deref(), Some("lofi"));
    }

    #[test]
    fn missing_payloads_are_rejected() {
        let err = parse_action(serde_json::json!({"id": 4, "content": "Search", "action": "type", "text": " "}));
        assert!(err.is_err());
        let err = parse_action(serde_json::json!({"id": 4, "content": "Search", "action": "key"}));
        assert!(err.is_err());
        let err = parse_action(serde_json::json!({"id": 4, "content": "Search", "action": "teleport"}));
        assert!(err.is_err());
    }

    #[test]
    fn null_means_no_action() {
        assert_eq!(parse_action(Value::Null).unwrap(), None);
        assert_eq!(parse_action(serde_json::json!({"reason": "nothing fits"})).unwrap(), None);
    }

    #[tokio::test]
    async fn decide_returns_the_proposed_action() {
        let steps = plan(1);
        let step = &steps[0];
        let action = actor(&["{\"id\": 0, \"content\": \"Home\", \"action\": \"hover\", \"reason\": \"peek\"}"])
            .decide(step, &[element(0, "Home")], None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action.kind, ActionKind::Hover);
        assert_eq!(action.rationale, "peek");
    }

    #[tokio::test]
    async fn bad_type_action_is_reasked() {
        let steps = plan(1);
        let step = &steps[0];
        let action = actor(&[
            "{\"id\": 1, \"content\": \"Search\", \"action\": \"type\"}",
            "{\"id\": 1, \"content\": \"Search\", \"action\": \"type\", \"text\": \"trending\"}",
        ])
        .repair_action(step, "field empty", "type the query", &[element(1, "Search")], None)
        .await
        .unwrap()
        .unwrap();
        assert_eq!(action.text.as_deref(), Some("trending"));
    }
}
