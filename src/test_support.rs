//! Scripted in-memory collaborators for driving the engine in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent_engine::recorder::{RunRecord, RunRecorder};
use crate::agent_engine::state::{
    Action, ActionKind, CycleState, Evaluation, EvaluationResult, RewindRequest, Status, Step,
};
use crate::errors::{CycleError, CycleResult};
use crate::executor::environment::Environment;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};
use crate::perception::traits::Perception;
use crate::perception::types::{ScreenshotRef, UIElement, UiDelta};
use crate::reasoning::traits::{Actor, Evaluator, PlanRepair, Planner};

/// Element with a box derived from its id, so equal ids give equal boxes.
pub fn element(id: u32, content: &str) -> UIElement {
    let top = (id % 10) as f32 * 0.08;
    UIElement {
        id,
        content: content.to_string(),
        bbox: [0.1, top, 0.5, top + 0.05],
        kind: None,
        interactivity: None,
    }
}

pub fn plan(n: usize) -> Vec<Step> {
    (1..=n)
        .map(|i| Step {
            index: i as u32,
            instruction: format!("step {i}"),
            expected: format!("result {i}"),
            rationale: format!("reason {i}"),
            status: Status::Todo,
        })
        .collect()
}

/// Action with a whole-screen box and no payloads.
pub fn action(id: u32, content: &str, kind: ActionKind) -> Action {
    Action {
        id,
        content: content.to_string(),
        bbox: Some([0.0, 0.0, 1.0, 1.0]),
        kind,
        text: None,
        key: None,
        dx: None,
        dy: None,
        seconds: None,
        rationale: "test".into(),
    }
}

pub fn evaluation(result: EvaluationResult) -> Evaluation {
    let explanation = match result {
        EvaluationResult::Fail => "it did not work",
        _ => "looks right",
    };
    Evaluation {
        criteria: "expected screen".into(),
        result,
        explanation: explanation.into(),
        fix: None,
        request: None,
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

// ── LLM ──────────────────────────────────────────────────────────────────

/// Replies with canned texts in order and keeps every request.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new<'a>(replies: impl IntoIterator<Item = &'a str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_config() -> CallConfig {
        CallConfig {
            model: "scripted".into(),
            stream: false,
            temperature: 0.0,
            json_mode: true,
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> CycleResult<LlmResponse> {
        lock(&self.calls).push(messages);
        let content = lock(&self.replies)
            .pop_front()
            .ok_or_else(|| CycleError::LlmProvider("script exhausted".into()))?;
        Ok(LlmResponse {
            content,
            reasoning: String::new(),
        })
    }
}

// ── Environment & perception ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockEnvironment {
    opened: Mutex<Vec<String>>,
    executed: Mutex<Vec<Action>>,
    rewinds: Mutex<Vec<RewindRequest>>,
    failures: Mutex<VecDeque<String>>,
    shots: Mutex<u32>,
    closed: Mutex<bool>,
}

impl MockEnvironment {
    /// The next `execute` fails with this cause.
    pub fn fail_next_execute(&self, cause: &str) {
        lock(&self.failures).push_back(cause.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }

    /// Actions that reached the driver, failed ones included.
    pub fn executed(&self) -> Vec<Action> {
        lock(&self.executed).clone()
    }

    pub fn rewinds(&self) -> Vec<RewindRequest> {
        lock(&self.rewinds).clone()
    }

    pub fn closed(&self) -> bool {
        *lock(&self.closed)
    }
}

#[async_trait]
impl Environment for MockEnvironment {
    async fn open(&self, location: &str) -> CycleResult<()> {
        lock(&self.opened).push(location.to_string());
        Ok(())
    }

    async fn screenshot(&self) -> CycleResult<ScreenshotRef> {
        let mut n = lock(&self.shots);
        *n += 1;
        Ok(ScreenshotRef::new(format!("screen_{n}.png")))
    }

    async fn execute(&self, action: &Action) -> CycleResult<()> {
        lock(&self.executed).push(action.clone());
        match lock(&self.failures).pop_front() {
            Some(cause) => Err(CycleError::Execution(cause)),
            None => Ok(()),
        }
    }

    async fn rewind(&self, request: RewindRequest) -> CycleResult<()> {
        if request != RewindRequest::None {
            lock(&self.rewinds).push(request);
        }
        Ok(())
    }

    async fn close(&self) -> CycleResult<()> {
        *lock(&self.closed) = true;
        Ok(())
    }
}

/// Returns the same elements for every screenshot.
pub struct MockPerception {
    ui: Vec<UIElement>,
    calls: Mutex<usize>,
    fail_at: Mutex<Option<usize>>,
}

impl MockPerception {
    pub fn repeating(ui: Vec<UIElement>) -> Self {
        Self {
            ui,
            calls: Mutex::new(0),
            fail_at: Mutex::new(None),
        }
    }

    /// Fail the detect call with this 0-based index.
    pub fn fail_at(&self, call: usize) {
        *lock(&self.fail_at) = Some(call);
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl Perception for MockPerception {
    async fn detect(&self, screenshot: &ScreenshotRef) -> CycleResult<Vec<UIElement>> {
        let mut calls = lock(&self.calls);
        let index = *calls;
        *calls += 1;
        if *lock(&self.fail_at) == Some(index) {
            return Err(CycleError::Perception(format!("detector crashed on {screenshot}")));
        }
        Ok(self.ui.clone())
    }
}

// ── Reasoning ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedPlanner {
    plans: Mutex<VecDeque<Vec<Step>>>,
    plan_calls: Mutex<usize>,
    repair_explanations: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    /// Queue a plan for the next `plan` or `repair_plan` call.
    pub fn push_plan(&self, steps: Vec<Step>) {
        lock(&self.plans).push_back(steps);
    }

    pub fn plan_calls(&self) -> usize {
        *lock(&self.plan_calls)
    }

    pub fn repair_calls(&self) -> usize {
        lock(&self.repair_explanations).len()
    }

    pub fn last_repair_explanation(&self) -> Option<String> {
        lock(&self.repair_explanations).last().cloned()
    }

    fn next(&self) -> CycleResult<Vec<Step>> {
        lock(&self.plans)
            .pop_front()
            .ok_or_else(|| CycleError::Planning("planner script exhausted".into()))
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        _app_name: &str,
        _task: &str,
        _ui_before: &[UIElement],
        _screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Vec<Step>> {
        *lock(&self.plan_calls) += 1;
        self.next()
    }

    async fn repair_plan(&self, request: PlanRepair<'_>) -> CycleResult<Vec<Step>> {
        lock(&self.repair_explanations).push(request.explanation.to_string());
        self.next()
    }
}

#[derive(Default)]
pub struct ScriptedActor {
    actions: Mutex<VecDeque<Option<Action>>>,
    decide_calls: Mutex<usize>,
    repair_explanations: Mutex<Vec<String>>,
}

impl ScriptedActor {
    pub fn push(&self, action: Option<Action>) {
        lock(&self.actions).push_back(action);
    }

    pub fn decide_calls(&self) -> usize {
        *lock(&self.decide_calls)
    }

    pub fn repair_calls(&self) -> usize {
        lock(&self.repair_explanations).len()
    }

    pub fn last_repair_explanation(&self) -> Option<String> {
        lock(&self.repair_explanations).last().cloned()
    }

    fn next(&self) -> CycleResult<Option<Action>> {
        lock(&self.actions)
            .pop_front()
            .ok_or_else(|| CycleError::reasoning_format("actor", "script exhausted"))
    }
}

#[async_trait]
impl Actor for ScriptedActor {
    async fn decide(
        &self,
        _step: &Step,
        _ui_before: &[UIElement],
        _screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Option<Action>> {
        *lock(&self.decide_calls) += 1;
        self.next()
    }

    async fn repair_action(
        &self,
        _step: &Step,
        explanation: &str,
        _fix: &str,
        _ui_before: &[UIElement],
        _screenshot: Option<&ScreenshotRef>,
    ) -> CycleResult<Option<Action>> {
        lock(&self.repair_explanations).push(explanation.to_string());
        self.next()
    }
}

#[derive(Default)]
pub struct ScriptedEvaluator {
    results: Mutex<VecDeque<Evaluation>>,
    deltas: Mutex<Vec<UiDelta>>,
}

impl ScriptedEvaluator {
    pub fn push(&self, evaluation: Evaluation) {
        lock(&self.results).push_back(evaluation);
    }

    pub fn calls(&self) -> usize {
        lock(&self.deltas).len()
    }

    /// UI changes the evaluator was shown, one per call.
    pub fn seen_deltas(&self) -> Vec<UiDelta> {
        lock(&self.deltas).clone()
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _plan: &[Step],
        _step_idx: usize,
        _action: &Action,
        ui_before: &[UIElement],
        ui_after: &[UIElement],
        _screenshots: &[ScreenshotRef],
    ) -> CycleResult<Evaluation> {
        lock(&self.deltas).push(UiDelta::between(ui_before, ui_after));
        lock(&self.results)
            .pop_front()
            .map(Evaluation::normalized)
            .ok_or_else(|| CycleError::reasoning_format("evaluator", "script exhausted"))
    }
}

// ── Recorder ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<RunRecord>>,
    snapshots: Mutex<Vec<CycleState>>,
    snapshot_calls: Mutex<usize>,
    fail_snapshot_at: Mutex<Option<usize>>,
}

impl MemoryRecorder {
    /// Fail the snapshot call with this 0-based index.
    pub fn fail_snapshot_at(&self, call: usize) {
        *lock(&self.fail_snapshot_at) = Some(call);
    }

    pub fn records(&self) -> Vec<RunRecord> {
        lock(&self.records).clone()
    }

    pub fn last_snapshot(&self) -> Option<CycleState> {
        lock(&self.snapshots).last().cloned()
    }
}

impl RunRecorder for MemoryRecorder {
    fn record(&self, record: &RunRecord) -> CycleResult<()> {
        lock(&self.records).push(record.clone());
        Ok(())
    }

    fn snapshot(&self, state: &CycleState) -> CycleResult<()> {
        let mut calls = lock(&self.snapshot_calls);
        let index = *calls;
        *calls += 1;
        if *lock(&self.fail_snapshot_at) == Some(index) {
            return Err(CycleError::Recorder("disk full".into()));
        }
        lock(&self.snapshots).push(state.clone());
        Ok(())
    }
}
