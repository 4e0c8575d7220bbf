//! Node identifiers, the fixed backbone between nodes and the status router.

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    PerceiveBefore,
    PlanTask,
    DecideAction,
    ExecuteAction,
    PerceiveAfter,
    EvaluateAction,
    UpdateState,
}

impl NodeId {
    pub const ENTRY: NodeId = NodeId::PerceiveBefore;

    pub fn as_str(self) -> &'static str {
        match self {
            NodeId::PerceiveBefore => "perceive_before",
            NodeId::PlanTask => "plan_task",
            NodeId::DecideAction => "decide_action",
            NodeId::ExecuteAction => "execute_action",
            NodeId::PerceiveAfter => "perceive_after",
            NodeId::EvaluateAction => "evaluate_action",
            NodeId::UpdateState => "update_state",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the run goes after a node has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Node(NodeId),
    Terminate,
}

/// Router consulted after `update_state`.
///
/// A bare `fail` reaching the router retries the current step, the same as
/// `action_problem`.
pub fn route(status: Status) -> Transition {
    match status {
        Status::Success | Status::Fail | Status::Acting | Status::ActionProblem => {
            Transition::Node(NodeId::DecideAction)
        }
        Status::PlanProblem | Status::Todo => Transition::Node(NodeId::PlanTask),
        Status::Done => Transition::Terminate,
    }
}

/// Successor of `node` given the status it committed.
///
/// The backbone is straight-line; the one branch skips observation and
/// evaluation when the action never reached the environment, and
/// `update_state` defers to [`route`].
pub fn next_node(node: NodeId, status: Status) -> Transition {
    match node {
        NodeId::PerceiveBefore => Transition::Node(NodeId::PlanTask),
        NodeId::PlanTask => Transition::Node(NodeId::DecideAction),
        NodeId::DecideAction => Transition::Node(NodeId::ExecuteAction),
        NodeId::ExecuteAction if status == Status::ActionProblem => {
            Transition::Node(NodeId::UpdateState)
        }
        NodeId::ExecuteAction => Transition::Node(NodeId::PerceiveAfter),
        NodeId::PerceiveAfter => Transition::Node(NodeId::EvaluateAction),
        NodeId::EvaluateAction => Transition::Node(NodeId::UpdateState),
        NodeId::UpdateState => route(status),
    }
}
