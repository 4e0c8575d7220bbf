use async_trait::async_trait;
use serde_json::Value;

use crate::agent_engine::state::Step;
use crate::errors::{CycleError, CycleResult};
use crate::perception::types::{ScreenshotRef, UIElement};
use crate::reasoning::client::ReasoningClient;
use crate::reasoning::prompts;
use crate::reasoning::traits::{PlanRepair, Planner};

pub struct LlmPlanner {
    client: ReasoningClient,
}

impl LlmPlanner {
    pub fn new(client: ReasoningClient) -> Self {
        Self { client }
    }

    async fn request(
        &self,
        system: &str,
        user_text: String,
        screenshots: &[ScreenshotRef],
    ) -> CycleResult<Vec<Step>> {
        let steps = self
            .client
            .call(system, user_text, screenshots, parse_steps)
            .await?;
        if steps.is_empty() {
            return Err(CycleError::Planning("planner returned an empty plan".into()));
        }
        tracing::info!(steps = steps.len(), "plan received");
        Ok(steps)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        app_name: &str,
        task: &str,
        ui_before: &[UIElement],
        screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Vec<Step>> {
        let shots: Vec<ScreenshotRef> = screenshot.cloned().into_iter().collect();
        self.request(
            prompts::PLANNER_SYSTEM,
            prompts::plan(app_name, task, ui_before),
            &shots,
        )
        .await
    }

    async fn repair_plan(&self, request: PlanRepair<'_>) -> CycleResult<Vec<Step>> {
        self.request(
            prompts::PLANNER_REPAIR_SYSTEM,
            prompts::repair_plan(
                request.app_name,
                request.task,
                request.step_idx,
                request.explanation,
                request.fix,
                request.current_plan,
                request.ui_before,
            ),
            request.screenshots,
        )
        .await
    }
}

/// Accepts a step array, `{"steps": [...]}`, or one bare step object.
fn parse_steps(value: Value) -> Result<Vec<Step>, String> {
    let raw = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("steps") {
            Some(Value::Array(items)) => items,
            Some(other) => return Err(format!("\"steps\" is not an array: {other}")),
            None if map.contains_key("step") => vec![Value::Object(map)],
            None => return Err("expected a list of steps".into()),
        },
        other => return Err(format!("expected a list of steps, got {other}")),
    };

    let mut steps: Vec<Step> = serde_json::from_value(Value::Array(raw))
        .map_err(|e| format!("step does not match the schema: {e}"))?;
    for (i, step) in steps.iter_mut().enumerate() {
        if step.index == 0 {
            step.index = i as u32 + 1;
        }
    }
    Ok(steps)
}
