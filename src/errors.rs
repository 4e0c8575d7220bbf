use thiserror::Error;

use crate::agent_engine::graph::NodeId;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Planning error: {0}")]
    Planning(String),

    /// The Actor referenced an element that is not in the current UI snapshot.
    #[error("Action binding error: no element with id {id} and content {content:?} in the current UI")]
    ActionBinding { id: u32, content: String },

    #[error("Malformed {role} output: {detail}")]
    ReasoningFormat { role: String, detail: String },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{node} failed ({}): {source}", .source.kind())]
    NodeFailed {
        node: NodeId,
        #[source]
        source: Box<CycleError>,
    },

    #[error("Run cancelled")]
    Cancelled,
}

impl CycleError {
    pub fn reasoning_format(role: &str, detail: impl Into<String>) -> Self {
        Self::ReasoningFormat {
            role: role.to_string(),
            detail: detail.into(),
        }
    }

    /// Stable tag for logs and abort reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Perception(_) => "perception_error",
            Self::Planning(_) => "planning_error",
            Self::ActionBinding { .. } => "action_binding_error",
            Self::ReasoningFormat { .. } => "reasoning_format_error",
            Self::Execution(_) => "execution_error",
            Self::Browser(_) => "browser_error",
            Self::LlmProvider(_) => "llm_provider_error",
            Self::SseParsing(_) => "sse_parsing_error",
            Self::Recorder(_) => "recorder_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Http(_) => "http_error",
            Self::Toml(_) => "toml_error",
            Self::Image(_) => "image_error",
            Self::NodeFailed { source, .. } => source.kind(),
            Self::Cancelled => "cancelled",
        }
    }

    /// The node that aborted the run, if this error was raised inside one.
    pub fn failed_node(&self) -> Option<NodeId> {
        match self {
            Self::NodeFailed { node, .. } => Some(*node),
            _ => None,
        }
    }
}

pub type CycleResult<T> = Result<T, CycleError>;
