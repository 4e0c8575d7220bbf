use async_trait::async_trait;
use serde_json::Value;

use crate::agent_engine::state::{Action, Evaluation, Step};
use crate::errors::CycleResult;
use crate::perception::types::{ScreenshotRef, UIElement};
use crate::reasoning::client::ReasoningClient;
use crate::reasoning::prompts;
use crate::reasoning::traits::Evaluator;

pub struct LlmEvaluator {
    client: ReasoningClient,
}

impl LlmEvaluator {
    pub fn new(client: ReasoningClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        plan: &[Step],
        step_idx: usize,
        action: &Action,
        ui_before: &[UIElement],
        ui_after: &[UIElement],
        screenshots: &[ScreenshotRef],
    ) -> CycleResult<Evaluation> {
        let evaluation = self
            .client
            .call(
                prompts::EVALUATOR_SYSTEM,
                prompts::evaluate(plan, step_idx, action, ui_before, ui_after),
                screenshots,
                parse_evaluation,
            )
            .await?;
        tracing::info!(
            step_idx,
            result = ?evaluation.result,
            explanation = %evaluation.explanation,
            "action evaluated"
        );
        Ok(evaluation)
    }
}

fn parse_evaluation(value: Value) -> Result<Evaluation, String> {
    serde_json::from_value::<Evaluation>(value)
        .map(Evaluation::normalized)
        .map_err(|e| format!("evaluation does not match the schema: {e}"))
}
