use std::sync::Arc;

use serde_json::{json, Value};

use crate::agent_engine::bookkeeping::update_state;
use crate::agent_engine::event_bus::{CycleMessage, EventBus};
use crate::agent_engine::graph::{next_node, NodeId, Transition};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::recorder::{RunRecord, RunRecorder};
use crate::agent_engine::state::{CycleState, EvaluationResult, RewindRequest, Status};
use crate::errors::{CycleError, CycleResult};
use crate::executor::environment::Environment;
use crate::perception::traits::Perception;
use crate::perception::types::{ScreenshotRef, UIElement};
use crate::reasoning::traits::{Actor, Evaluator, PlanRepair, Planner};
use crate::reasoning::Reasoners;

/// External services the cycle consults.
#[derive(Clone)]
pub struct Collaborators {
    pub environment: Arc<dyn Environment>,
    pub perception: Arc<dyn Perception>,
    pub planner: Arc<dyn Planner>,
    pub actor: Arc<dyn Actor>,
    pub evaluator: Arc<dyn Evaluator>,
}

impl Collaborators {
    pub fn new(
        environment: Arc<dyn Environment>,
        perception: Arc<dyn Perception>,
        reasoners: Reasoners,
    ) -> Self {
        Self {
            environment,
            perception,
            planner: reasoners.planner,
            actor: reasoners.actor,
            evaluator: reasoners.evaluator,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub location: String,
    pub app_name: String,
    pub task: String,
}

/// Final committed state of a run that reached a terminal status.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub state: CycleState,
}

impl RunOutcome {
    pub fn status(&self) -> Status {
        self.state.status
    }
}

pub struct CycleEngine {
    services: Collaborators,
    recorder: Arc<dyn RunRecorder>,
    event_bus: EventBus,
    loop_ctrl: LoopController,
    max_action_retries: u32,
}

impl CycleEngine {
    pub fn new(
        services: Collaborators,
        recorder: Arc<dyn RunRecorder>,
        event_bus: EventBus,
        loop_ctrl: LoopController,
        max_action_retries: u32,
    ) -> Self {
        Self {
            services,
            recorder,
            event_bus,
            loop_ctrl,
            max_action_retries,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Drive one run from `open` to a terminal status.
    ///
    /// Each node works on a copy of the state that is committed only when the
    /// node succeeds. On any propagated error, or on a stop command, the last
    /// committed state is persisted before the error is returned.
    pub async fn run(&mut self, request: RunRequest) -> CycleResult<RunOutcome> {
        let RunRequest {
            run_id,
            location,
            app_name,
            task,
        } = request;
        tracing::info!(run_id = %run_id, location = %location, task = %task, "run started");
        self.event_bus.publish(CycleMessage::RunStarted {
            run_id: run_id.clone(),
            location: location.clone(),
        });
        self.loop_ctrl.reset();

        let mut state = CycleState::new(run_id.clone(), app_name, task);
        let result = match self.services.environment.open(&location).await {
            Ok(()) => self.drive(&mut state).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.services.environment.close().await {
            tracing::warn!(error = %e, "environment close failed");
        }

        // The closing snapshot belongs to the last committed update_state.
        let result = result.and_then(|()| {
            self.recorder
                .snapshot(&state)
                .map_err(|e| CycleError::NodeFailed {
                    node: NodeId::UpdateState,
                    source: Box::new(e),
                })
        });

        match result {
            Ok(()) => {
                tracing::info!(run_id = %run_id, status = %state.status, steps = state.plan.len(), "run finished");
                self.event_bus.publish(CycleMessage::RunFinished {
                    run_id: run_id.clone(),
                    status: state.status,
                });
                Ok(RunOutcome { run_id, state })
            }
            Err(e) => {
                if let Err(persist) = self.recorder.snapshot(&state) {
                    tracing::error!(error = %persist, "could not persist last committed state");
                }
                tracing::error!(
                    run_id = %run_id,
                    node = ?e.failed_node(),
                    kind = e.kind(),
                    error = %e,
                    "run aborted"
                );
                self.event_bus.publish(CycleMessage::RunAborted {
                    run_id,
                    node: e.failed_node(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&mut self, state: &mut CycleState) -> CycleResult<()> {
        let mut node = NodeId::ENTRY;
        loop {
            if self.event_bus.stop_requested() {
                tracing::info!(next = %node, "stop requested");
                return Err(CycleError::Cancelled);
            }

            let mut working = state.clone();
            let payload = self
                .run_node(node, &mut working)
                .await
                .map_err(|e| CycleError::NodeFailed {
                    node,
                    source: Box::new(e),
                })?;
            *state = working;
            self.commit(node, state, payload)?;

            if node == NodeId::UpdateState {
                self.recorder.snapshot(state).map_err(|e| CycleError::NodeFailed {
                    node,
                    source: Box::new(e),
                })?;
                self.loop_ctrl.record_cycle();
                if !state.status.is_terminal() && self.loop_ctrl.should_stop() {
                    tracing::warn!(
                        cycles = self.loop_ctrl.cycles(),
                        failures = self.loop_ctrl.failures(),
                        "loop limit reached, abandoning run"
                    );
                    state.status = Status::Fail;
                    return Ok(());
                }
            }

            match next_node(node, state.status) {
                Transition::Node(next) => node = next,
                Transition::Terminate => return Ok(()),
            }
        }
    }

    fn commit(&self, node: NodeId, state: &CycleState, payload: Value) -> CycleResult<()> {
        tracing::info!(
            run_id = %state.run_id,
            node = %node,
            step_idx = state.step_idx,
            status = %state.status,
            retries = state.retries,
            "node finished"
        );
        self.recorder
            .record(&RunRecord::new(node, state, payload))
            .map_err(|e| CycleError::NodeFailed {
                node,
                source: Box::new(e),
            })?;
        self.event_bus.publish(CycleMessage::NodeFinished {
            run_id: state.run_id.clone(),
            node,
            step_idx: state.step_idx,
            status: state.status,
            retries: state.retries,
        });
        Ok(())
    }

    async fn run_node(&mut self, node: NodeId, state: &mut CycleState) -> CycleResult<Value> {
        match node {
            NodeId::PerceiveBefore => {
                let (shot, elements) = self.perceive().await?;
                let payload = perception_payload(&shot, &elements);
                state.img_before = Some(shot);
                state.ui_before = elements;
                Ok(payload)
            }
            NodeId::PerceiveAfter => {
                let (shot, elements) = self.perceive().await?;
                let payload = perception_payload(&shot, &elements);
                state.img_after = Some(shot);
                state.ui_after = elements;
                Ok(payload)
            }
            NodeId::PlanTask => self.plan_task(state).await,
            NodeId::DecideAction => self.decide_action(state).await,
            NodeId::ExecuteAction => Ok(self.execute_action(state).await),
            NodeId::EvaluateAction => self.evaluate_action(state).await,
            NodeId::UpdateState => {
                update_state(state, self.max_action_retries);
                Ok(json!({
                    "status": state.status,
                    "step_idx": state.step_idx,
                    "retries": state.retries,
                }))
            }
        }
    }

    // ── Perceive ──────────────────────────────────────────────────────────

    async fn perceive(&self) -> CycleResult<(ScreenshotRef, Vec<UIElement>)> {
        let shot = self
            .services
            .environment
            .screenshot()
            .await
            .map_err(|e| match e {
                CycleError::Perception(_) => e,
                other => CycleError::Perception(format!("screenshot failed: {other}")),
            })?;
        let elements = self.services.perception.detect(&shot).await?;
        tracing::debug!(screenshot = %shot, elements = elements.len(), "screen perceived");
        Ok((shot, elements))
    }

    // ── Plan ──────────────────────────────────────────────────────────────

    async fn plan_task(&self, state: &mut CycleState) -> CycleResult<Value> {
        if state.plan.is_empty() {
            state.plan = self
                .services
                .planner
                .plan(&state.app_name, &state.task, &state.ui_before, state.img_before.as_ref())
                .await?;
            state.step_idx = 0;
        } else if state.status == Status::PlanProblem {
            self.rewind(state.request).await?;
            let screenshots = state.screenshots();
            let repaired = self
                .services
                .planner
                .repair_plan(PlanRepair {
                    app_name: &state.app_name,
                    task: &state.task,
                    step_idx: state.step_idx,
                    explanation: &state.explanation,
                    fix: &state.fix,
                    current_plan: &state.plan,
                    ui_before: &state.ui_before,
                    screenshots: &screenshots,
                })
                .await?;
            tracing::info!(
                step_idx = state.step_idx,
                old_steps = state.plan.len(),
                new_steps = repaired.len(),
                "plan repaired"
            );
            state.plan = repaired;
            state.retries = 0;
        }

        if state.plan.is_empty() {
            return Err(CycleError::Planning("planner returned an empty plan".into()));
        }
        if state.step_idx >= state.plan.len() {
            return Err(CycleError::Planning(format!(
                "plan has {} steps but the current step index is {}",
                state.plan.len(),
                state.step_idx
            )));
        }
        state.status = Status::Acting;
        Ok(serde_json::to_value(&state.plan)?)
    }

    // ── Decide ────────────────────────────────────────────────────────────

    async fn decide_action(&self, state: &mut CycleState) -> CycleResult<Value> {
        let step = state
            .current_step()
            .cloned()
            .ok_or_else(|| CycleError::Planning(format!("no step at index {}", state.step_idx)))?;

        let proposed = if state.status == Status::ActionProblem {
            self.rewind(state.request).await?;
            self.services
                .actor
                .repair_action(
                    &step,
                    &state.explanation,
                    &state.fix,
                    &state.ui_before,
                    state.img_before.as_ref(),
                )
                .await?
        } else {
            self.services
                .actor
                .decide(&step, &state.ui_before, state.img_before.as_ref())
                .await?
        };

        state.action = match proposed {
            Some(mut action) => {
                let element = state
                    .ui_before
                    .iter()
                    .find(|e| e.matches(action.id, &action.content))
                    .ok_or_else(|| CycleError::ActionBinding {
                        id: action.id,
                        content: action.content.clone(),
                    })?;
                action.bbox = Some(element.bbox);
                state.status = Status::Acting;
                Some(action)
            }
            None => {
                state.status = Status::ActionProblem;
                None
            }
        };
        Ok(serde_json::to_value(&state.action)?)
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Never fails: driver errors become `action_problem`.
    async fn execute_action(&mut self, state: &mut CycleState) -> Value {
        let Some(action) = &state.action else {
            tracing::warn!(step_idx = state.step_idx, "no action was proposed, skipping execution");
            self.loop_ctrl.record_failure();
            state.status = Status::ActionProblem;
            // The last evaluation still describes the screen; only the rewind is spent.
            if state.explanation.is_empty() {
                state.store_failure("no action was proposed for this step", "", RewindRequest::None);
            } else {
                state.request = RewindRequest::None;
            }
            return json!({ "action": null, "executed": false });
        };
        match self.services.environment.execute(action).await {
            Ok(()) => json!({ "action": state.action, "executed": true }),
            Err(e) => {
                tracing::warn!(step_idx = state.step_idx, error = %e, "action execution failed");
                self.loop_ctrl.record_failure();
                state.status = Status::ActionProblem;
                state.store_failure(e.to_string(), "", RewindRequest::None);
                json!({ "action": state.action, "executed": false, "error": e.to_string() })
            }
        }
    }

    // ── Evaluate ──────────────────────────────────────────────────────────

    async fn evaluate_action(&mut self, state: &mut CycleState) -> CycleResult<Value> {
        let action = state
            .action
            .as_ref()
            .ok_or_else(|| CycleError::Execution("no executed action to evaluate".into()))?;
        let evaluation = self
            .services
            .evaluator
            .evaluate(
                &state.plan,
                state.step_idx,
                action,
                &state.ui_before,
                &state.ui_after,
                &state.screenshots(),
            )
            .await?;

        match evaluation.result {
            EvaluationResult::Success => state.status = Status::Success,
            EvaluationResult::TaskCompletion => state.status = Status::Done,
            EvaluationResult::Fail => {
                self.loop_ctrl.record_failure();
                state.status = Status::ActionProblem;
                state.store_failure(
                    evaluation.explanation.clone(),
                    evaluation.fix.clone().unwrap_or_default(),
                    evaluation.request.unwrap_or_default(),
                );
            }
        }
        Ok(serde_json::to_value(&evaluation)?)
    }

    async fn rewind(&self, request: RewindRequest) -> CycleResult<()> {
        if request != RewindRequest::None {
            tracing::info!(?request, "rewinding environment before repair");
        }
        self.services.environment.rewind(request).await
    }
}

fn perception_payload(shot: &ScreenshotRef, elements: &[UIElement]) -> Value {
    json!({ "screenshot": shot, "elements": elements })
}
