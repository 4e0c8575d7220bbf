use serde::Serialize;

use crate::agent_engine::state::{Action, Step};
use crate::perception::types::{UIElement, UiDelta};

pub const PLANNER_SYSTEM: &str = "You are a task-planner agent. Analyze the screenshot and the \
interactive elements of the current screen and decide the plan that accomplishes the user's task. \
Return ONLY JSON.";

pub const PLANNER_REPAIR_SYSTEM: &str =
    "You are a task-planner agent repairing an existing plan. Return ONLY JSON.";

pub const ACTOR_SYSTEM: &str = "You are an action agent. Plan exactly one action that executes the \
given step. Return ONE JSON OBJECT only, no extra text.";

pub const ACTOR_REPAIR_SYSTEM: &str = "You are an action agent repairing a failed action. Use the \
explanation of the failure and the suggested fix. Return ONE JSON OBJECT only, no extra text.";

pub const EVALUATOR_SYSTEM: &str = "You are an evaluation agent. You get the screen before and after \
an action, with its elements, the plan and the executed action. Decide whether the action moved the \
task forward.\n\
Checklist:\n\
1. Understand the whole tentative plan.\n\
2. Identify the current step and its action.\n\
3. Locate the affected element(s) in ui_before.\n\
4. Locate the same or new element(s) in ui_after.\n\
5. Compare the outcome to the expected result, including titles, images and content.\n\
6. Decide the result: success | fail | task_completion.\n\
Heuristics:\n\
- click: the element becomes focused, the page navigates or the element disappears.\n\
- type: the text field now contains the expected text.\n\
- scroll: the viewport offset changed or new elements are visible.";

const STEP_SCHEMA: &str = r#"{
  "step_idx": int,     // 1-based index of the step
  "step": string,      // what the agent should do
  "result": string,    // what is expected to happen after the step
  "reason": string,    // why the step is needed to reach the goal
  "status": "todo"
}"#;

const ACTION_SCHEMA: &str = r#"{
  "id": int,           // id of the element to interact with
  "content": string,   // content of that element, copied verbatim
  "action": string,    // click | double_click | right_click | hover | type | key | scroll | wait
  "text": string,      // only for type, otherwise empty
  "key": string,       // only for key, e.g. "Enter"
  "dx": int, "dy": int,  // only for scroll, in pixels
  "seconds": number,   // only for wait
  "reason": string     // why this action achieves the step
}"#;

const EVALUATION_SCHEMA: &str = r#"{
  "evaluation_criteria": string,  // the criteria used
  "result": string,               // success | fail | task_completion (task done and no steps left)
  "explanation": string,          // why this conclusion was reached
  "fix": string,                  // how to fix the action when it failed, else empty
  "request": string               // refresh | back | none, only when it failed
}"#;

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

pub fn plan(app_name: &str, task: &str, ui: &[UIElement]) -> String {
    format!(
        "You are using the **{app_name}** app. Your goal is: {task}\n\n\
         Screen elements extracted from the current UI:\n{}\n\n\
         Produce a JSON array of steps. Each element must follow this schema:\n{STEP_SCHEMA}\n\n\
         Return only the JSON, no commentary and no markdown fences.",
        to_json(ui)
    )
}

pub fn repair_plan(
    app_name: &str,
    task: &str,
    step_idx: usize,
    explanation: &str,
    fix: &str,
    current_plan: &[Step],
    ui: &[UIElement],
) -> String {
    format!(
        "You are using the **{app_name}** app. Your goal is: {task}\n\
         The current plan is not working and must be repaired.\n\
         Explanation of the problem: {explanation}\n\
         Suggested fix: {fix}\n\
         Step index to repair from (0-based): {step_idx}\n\
         Current plan:\n{}\n\n\
         Current UI elements:\n{}\n\n\
         Return the full repaired plan as a JSON array of steps with this schema:\n{STEP_SCHEMA}",
        to_json(current_plan),
        to_json(ui)
    )
}

pub fn decide(step: &Step, ui: &[UIElement]) -> String {
    format!(
        "Your goal is: {}. Execute the step \"{}\" so that: {}.\n\n\
         UI elements (each has id, content, bbox):\n{}\n\n\
         The screenshot of the current screen is attached.\n\
         Select exactly one element by id and copy its content verbatim. \
         Answer with this JSON object:\n{ACTION_SCHEMA}\n\n\
         Return only the JSON object, no markdown fences.",
        step.rationale,
        step.instruction,
        step.expected,
        to_json(ui)
    )
}

pub fn repair_action(step: &Step, explanation: &str, fix: &str, ui: &[UIElement]) -> String {
    format!(
        "You were given the step \"{}\" to achieve: {}.\n\
         The action you took failed.\n\
         Explanation of the failure: {explanation}\n\
         Suggested fix: {fix}\n\n\
         UI elements (each has id, content, bbox):\n{}\n\n\
         The screenshot of the current screen is attached.\n\
         Select exactly one element by id and copy its content verbatim. \
         Answer with this JSON object:\n{ACTION_SCHEMA}\n\n\
         Return only the JSON object, no markdown fences.",
        step.instruction,
        step.rationale,
        to_json(ui)
    )
}

pub fn evaluate(
    plan: &[Step],
    step_idx: usize,
    action: &Action,
    ui_before: &[UIElement],
    ui_after: &[UIElement],
) -> String {
    let expected = plan.get(step_idx).map(|s| s.expected.as_str()).unwrap_or_default();
    let delta = UiDelta::between(ui_before, ui_after);
    format!(
        "Hints:\n\
         - If the action was a scroll but the screen did not change, the action likely failed.\n\
         - If the action was a click, check whether the expected element is present afterwards.\n\
         - If a text field was clicked and shows a text cursor, the click likely succeeded.\n\
         - If the action typed text, check whether the field contains the expected text.\n\n\
         Tentative plan: {}\n\
         Current step index (0-based): {step_idx}\n\
         Executed action: {}\n\
         Expected result of this step: {}\n\
         UI before the action: {}\n\
         UI after the action: {}\n\
         Difference between the two UIs{}: {}\n\n\
         When the result is fail, explain why and how to fix it.\n\
         Answer with this JSON object and nothing else:\n{EVALUATION_SCHEMA}",
        to_json(plan),
        to_json(action),
        to_json(expected),
        to_json(ui_before),
        to_json(ui_after),
        if delta.is_empty() { " (none, the screen did not change)" } else { "" },
        to_json(&delta)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::ActionKind;
    use crate::test_support::{action, element, plan as steps};

    #[test]
    fn evaluation_prompt_flags_unchanged_screen() {
        let ui = vec![element(0, "Home"), element(1, "Trending")];
        let mut scroll = action(0, "Home", ActionKind::Scroll);
        scroll.dy = Some(300);
        let text = evaluate(&steps(2), 0, &scroll, &ui, &ui);
        assert!(text.contains("none, the screen did not change"));
        assert!(text.contains("\"action\":\"scroll\""));
    }

    #[test]
    fn evaluation_prompt_lists_added_elements() {
        let before = vec![element(0, "Home")];
        let after = vec![element(0, "Home"), element(1, "Now playing")];
        let text = evaluate(&steps(1), 0, &action(0, "Home", ActionKind::Click), &before, &after);
        assert!(text.contains("\"added\":[{\"id\":1,\"content\":\"Now playing\""));
        assert!(!text.contains("screen did not change"));
    }

    #[test]
    fn plan_prompt_carries_task_and_elements() {
        let text = plan("Youtube", "play a trending video", &[element(3, "Trending")]);
        assert!(text.contains("**Youtube**"));
        assert!(text.contains("play a trending video"));
        assert!(text.contains("\"content\":\"Trending\""));
    }
}
