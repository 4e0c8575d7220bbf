use async_trait::async_trait;

use crate::agent_engine::state::{Action, Evaluation, Step};
use crate::errors::CycleResult;
use crate::perception::types::{ScreenshotRef, UIElement};

/// Context for repairing a plan that stopped making progress.
#[derive(Debug, Clone, Copy)]
pub struct PlanRepair<'a> {
    pub app_name: &'a str,
    pub task: &'a str,
    pub step_idx: usize,
    pub explanation: &'a str,
    pub fix: &'a str,
    pub current_plan: &'a [Step],
    pub ui_before: &'a [UIElement],
    /// Before then after, at most two.
    pub screenshots: &'a [ScreenshotRef],
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Fresh plan for `task`. Never returns an empty list.
    async fn plan(
        &self,
        app_name: &str,
        task: &str,
        ui_before: &[UIElement],
        screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Vec<Step>>;

    /// Replacement plan. Never returns an empty list.
    async fn repair_plan(&self, request: PlanRepair<'_>) -> CycleResult<Vec<Step>>;
}

#[async_trait]
pub trait Actor: Send + Sync {
    /// `None` when no element fits the step.
    async fn decide(
        &self,
        step: &Step,
        ui_before: &[UIElement],
        screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Option<Action>>;

    async fn repair_action(
        &self,
        step: &Step,
        explanation: &str,
        fix: &str,
        ui_before: &[UIElement],
        screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Option<Action>>;
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        plan: &[Step],
        step_idx: usize,
        action: &Action,
        ui_before: &[UIElement],
        ui_after: &[UIElement],
        screenshots: &[ScreenshotRef],
    ) -> CycleResult<Evaluation>;
}
