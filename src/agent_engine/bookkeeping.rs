use crate::agent_engine::state::{CycleState, Status};

/// End-of-cycle bookkeeping: step advancement and the retry/escalation policy.
///
/// An action may be repaired `max_action_retries` times; the failure after
/// that escalates to `plan_problem`. The retry counter is reset by the plan
/// node when it repairs, not here.
pub fn update_state(state: &mut CycleState, max_action_retries: u32) {
    if !state.status.is_terminal() && state.step_idx >= state.plan.len() {
        tracing::debug!(step_idx = state.step_idx, plan_len = state.plan.len(), "step index past plan end");
        state.status = Status::Done;
    }

    match state.status {
        Status::Success => {
            if let Some(step) = state.plan.get_mut(state.step_idx) {
                step.status = Status::Success;
            }
            state.step_idx += 1;
            state.retries = 0;
            state.ui_before = std::mem::take(&mut state.ui_after);
            state.img_before = state.img_after.take();
            state.clear_failure();

            if state.step_idx >= state.plan.len() {
                tracing::info!(steps = state.plan.len(), "every planned step succeeded");
                state.status = Status::Done;
            }
        }
        Status::ActionProblem => {
            state.retries += 1;
            if state.retries > max_action_retries {
                tracing::warn!(
                    step_idx = state.step_idx,
                    retries = state.retries,
                    "action retries exhausted, escalating to plan_problem"
                );
                state.status = Status::PlanProblem;
            }
            // `after` described a void attempt; `before` still holds.
            state.ui_after.clear();
            state.img_after = None;
        }
        Status::PlanProblem => {
            state.retries = 0;
        }
        Status::Done => {
            if let Some(step) = state.plan.get_mut(state.step_idx) {
                step.status = Status::Success;
            }
        }
        Status::Todo | Status::Acting | Status::Fail => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::RewindRequest;
    use crate::perception::types::ScreenshotRef;
    use crate::test_support::{element, plan};

    fn acting_state(steps: usize) -> CycleState {
        let mut state = CycleState::new("run", "Shop", "buy a book");
        state.plan = plan(steps);
        state.status = Status::Acting;
        state.ui_before = vec![element(0, "Search")];
        state.img_before = Some(ScreenshotRef::new("before.png"));
        state.ui_after = vec![element(0, "Results")];
        state.img_after = Some(ScreenshotRef::new("after.png"));
        state
    }

    #[test]
    fn success_advances_and_rolls_after_into_before() {
        let mut state = acting_state(2);
        state.status = Status::Success;
        state.retries = 2;
        state.store_failure("missed", "click lower", RewindRequest::Back);

        update_state(&mut state, 3);

        assert_eq!(state.plan[0].status, Status::Success);
        assert_eq!(state.step_idx, 1);
        assert_eq!(state.retries, 0);
        assert_eq!(state.ui_before, vec![element(0, "Results")]);
        assert_eq!(state.img_before, Some(ScreenshotRef::new("after.png")));
        assert!(state.ui_after.is_empty());
        assert_eq!(state.img_after, None);
        assert_eq!(state.request, RewindRequest::None);
        assert_eq!(state.status, Status::Success);
    }

    #[test]
    fn success_on_last_step_finishes() {
        let mut state = acting_state(1);
        state.status = Status::Success;
        update_state(&mut state, 3);
        assert_eq!(state.status, Status::Done);
    }

    #[test]
    fn retries_increase_by_one_and_escalate_only_past_the_budget() {
        let mut state = acting_state(1);
        for expected in 1..=3 {
            state.status = Status::ActionProblem;
            update_state(&mut state, 3);
            assert_eq!(state.retries, expected);
            assert_eq!(state.status, Status::ActionProblem, "retries == {expected} must not escalate");
        }

        state.status = Status::ActionProblem;
        update_state(&mut state, 3);
        assert_eq!(state.retries, 4);
        assert_eq!(state.status, Status::PlanProblem);
    }

    #[test]
    fn action_problem_discards_after_but_keeps_before() {
        let mut state = acting_state(1);
        state.status = Status::ActionProblem;
        update_state(&mut state, 3);
        assert!(state.ui_after.is_empty());
        assert_eq!(state.img_after, None);
        assert_eq!(state.ui_before, vec![element(0, "Search")]);
        assert_eq!(state.img_before, Some(ScreenshotRef::new("before.png")));
    }

    #[test]
    fn plan_problem_resets_retries() {
        let mut state = acting_state(1);
        state.status = Status::PlanProblem;
        state.retries = 4;
        update_state(&mut state, 3);
        assert_eq!(state.retries, 0);
        assert_eq!(state.status, Status::PlanProblem);
    }

    #[test]
    fn index_past_plan_end_forces_done() {
        let mut state = acting_state(1);
        state.step_idx = 1;
        update_state(&mut state, 3);
        assert_eq!(state.status, Status::Done);
    }

    #[test]
    fn terminal_statuses_are_idempotent() {
        for terminal in [Status::Done, Status::Fail] {
            let mut state = acting_state(2);
            state.status = terminal;
            state.step_idx = if terminal == Status::Fail { 5 } else { 0 };
            update_state(&mut state, 3);
            let once = state.clone();
            update_state(&mut state, 3);
            assert_eq!(state, once, "{terminal} changed on second update");
            assert_eq!(state.status, terminal);
        }
    }
}
