use serde::{Deserialize, Deserializer, Serialize};

use crate::perception::types::{ScreenshotRef, UIElement};

/// Control status of one run. Exactly one value is held at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Todo,
    Acting,
    Success,
    ActionProblem,
    PlanProblem,
    /// Goal achieved.
    Done,
    /// Run abandoned.
    Fail,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Todo,
        Status::Acting,
        Status::Success,
        Status::ActionProblem,
        Status::PlanProblem,
        Status::Done,
        Status::Fail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::Acting => "acting",
            Status::Success => "success",
            Status::ActionProblem => "action_problem",
            Status::PlanProblem => "plan_problem",
            Status::Done => "done",
            Status::Fail => "fail",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Fail)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planners sometimes echo the whole status menu ("todo/ acting/ ...");
/// anything unrecognised starts out as `todo`.
fn lenient_status<'de, D>(deserializer: D) -> Result<Status, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|v| serde_json::from_value::<Status>(v).ok())
        .unwrap_or_default())
}

/// One planned unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based.
    #[serde(rename = "step_idx", alias = "order", alias = "number", default)]
    pub index: u32,
    #[serde(rename = "step")]
    pub instruction: String,
    #[serde(rename = "result", default)]
    pub expected: String,
    #[serde(rename = "reason", default)]
    pub rationale: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    DoubleClick,
    RightClick,
    Hover,
    Type,
    Key,
    Scroll,
    Wait,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::RightClick => "right_click",
            ActionKind::Hover => "hover",
            ActionKind::Type => "type",
            ActionKind::Key => "key",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
        }
    }

    /// Kinds that resolve a pointer target from the bound bounding box.
    pub fn needs_target(self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::DoubleClick
                | ActionKind::RightClick
                | ActionKind::Hover
                | ActionKind::Type
        )
    }
}

/// Accepts `3` as well as `"3"` for element ids.
fn lenient_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u32),
        Text(String),
    }
    match RawId::deserialize(deserializer)? {
        RawId::Num(n) => Ok(n),
        RawId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// One concrete operation bound to a UI element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(deserialize_with = "lenient_id")]
    pub id: u32,
    pub content: String,
    /// Copied from the matching element by `decide_action`, never taken from the Actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    #[serde(rename = "action")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dx: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<f64>,
    #[serde(rename = "reason", default)]
    pub rationale: String,
}

impl Action {
    pub fn scroll_offsets(&self) -> (i64, i64) {
        (self.dx.unwrap_or(0), self.dy.unwrap_or(0))
    }

    pub fn wait_seconds(&self) -> f64 {
        self.seconds.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewindRequest {
    Refresh,
    Back,
    #[default]
    None,
}

impl<'de> Deserialize<'de> for RewindRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "refresh" => RewindRequest::Refresh,
            Some(s) if s == "back" => RewindRequest::Back,
            _ => RewindRequest::None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationResult {
    Success,
    Fail,
    TaskCompletion,
}

/// Judgment of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(rename = "evaluation_criteria", default)]
    pub criteria: String,
    pub result: EvaluationResult,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RewindRequest>,
}

impl Evaluation {
    /// Fix and rewind request only exist on failures.
    pub fn normalized(mut self) -> Self {
        if self.result == EvaluationResult::Fail {
            self.fix = self.fix.filter(|f| !f.trim().is_empty());
            self.request = Some(self.request.unwrap_or_default());
        } else {
            self.fix = None;
            self.request = None;
        }
        self
    }
}

/// The single mutable record of a run. Only the cycle engine mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    #[serde(default)]
    pub run_id: String,
    pub task: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub plan: Vec<Step>,
    #[serde(default)]
    pub step_idx: usize,
    #[serde(default)]
    pub img_before: Option<ScreenshotRef>,
    #[serde(default)]
    pub img_after: Option<ScreenshotRef>,
    #[serde(default)]
    pub ui_before: Vec<UIElement>,
    #[serde(default)]
    pub ui_after: Vec<UIElement>,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub fix: String,
    #[serde(default)]
    pub request: RewindRequest,
}

impl CycleState {
    pub fn new(run_id: impl Into<String>, app_name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            task: task.into(),
            app_name: app_name.into(),
            plan: Vec::new(),
            step_idx: 0,
            img_before: None,
            img_after: None,
            ui_before: Vec::new(),
            ui_after: Vec::new(),
            action: None,
            retries: 0,
            status: Status::Todo,
            explanation: String::new(),
            fix: String::new(),
            request: RewindRequest::None,
        }
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.plan.get(self.step_idx)
    }

    /// Screenshots available for a before/after comparison, oldest first.
    pub fn screenshots(&self) -> Vec<ScreenshotRef> {
        self.img_before
            .iter()
            .chain(self.img_after.iter())
            .cloned()
            .collect()
    }

    pub fn store_failure(&mut self, explanation: impl Into<String>, fix: impl Into<String>, request: RewindRequest) {
        self.explanation = explanation.into();
        self.fix = fix.into();
        self.request = request;
    }

    pub fn clear_failure(&mut self) {
        self.explanation.clear();
        self.fix.clear();
        self.request = RewindRequest::None;
    }
}
