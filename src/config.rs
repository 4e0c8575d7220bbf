use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{CycleError, CycleResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var CYCLEPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps reasoning roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Produces and repairs step plans.
    pub planner: Option<RoleEntry>,
    /// Turns one step into one concrete UI action.
    pub actor: Option<RoleEntry>,
    /// Judges the before/after screens of an executed action.
    pub evaluator: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    /// Use SSE streaming.
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// Base URL of the OmniParser-compatible detection service.
    #[serde(default = "default_perception_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_box_threshold")]
    pub box_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_imgsz")]
    pub imgsz: u32,
    #[serde(default)]
    pub use_paddleocr: bool,
    #[serde(default = "default_perception_timeout")]
    pub timeout_secs: u64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_perception_endpoint(),
            box_threshold: default_box_threshold(),
            iou_threshold: default_iou_threshold(),
            imgsz: default_imgsz(),
            use_paddleocr: false,
            timeout_secs: default_perception_timeout(),
        }
    }
}

fn default_perception_endpoint() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_box_threshold() -> f32 {
    0.05
}

fn default_iou_threshold() -> f32 {
    0.1
}

fn default_imgsz() -> u32 {
    640
}

fn default_perception_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chromium binary; found on PATH when absent.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub headless: bool,
    /// `[width, height]` of the browser window when set.
    #[serde(default)]
    pub window_size: Option<[u32; 2]>,
    #[serde(default = "default_true")]
    pub maximize: bool,
    /// Extra command-line flags passed to Chromium.
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    #[serde(default = "default_open_settle")]
    pub open_settle_ms: u64,
    #[serde(default = "default_click_settle")]
    pub click_settle_ms: u64,
    #[serde(default = "default_rewind_settle")]
    pub rewind_settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: false,
            window_size: None,
            maximize: true,
            extra_args: Vec::new(),
            screenshot_dir: default_screenshot_dir(),
            open_settle_ms: default_open_settle(),
            click_settle_ms: default_click_settle(),
            rewind_settle_ms: default_rewind_settle(),
        }
    }
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_open_settle() -> u64 {
    2000
}

fn default_click_settle() -> u64 {
    5000
}

fn default_rewind_settle() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    /// Repairs allowed on one action before the planner is asked to rethink the step.
    #[serde(default = "default_max_action_retries")]
    pub max_action_retries: u32,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
    #[serde(default)]
    pub max_failures: Option<u32>,
    #[serde(default)]
    pub max_cycles: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
            max_action_retries: default_max_action_retries(),
            loop_mode: LoopMode::default(),
            max_duration_minutes: None,
            max_failures: None,
            max_cycles: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    UntilDone,
    Timed,
    FailureLimit,
    CycleLimit,
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_max_action_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Attempts per call before malformed output becomes a hard failure.
    #[serde(default = "default_max_format_attempts")]
    pub max_format_attempts: u32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_format_attempts: default_max_format_attempts(),
        }
    }
}

fn default_max_format_attempts() -> u32 {
    2
}

/// Optional replacements for the built-in system prompts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    pub planner_system: Option<String>,
    pub actor_system: Option<String>,
    pub evaluator_system: Option<String>,
}

fn default_true() -> bool {
    true
}

fn resolve_config_path(explicit: Option<&Path>) -> CycleResult<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(CycleError::Config(format!(
            "config file {} does not exist",
            path.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("cyclepilot").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(CycleError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn load_config(explicit: Option<&Path>) -> CycleResult<AppConfig> {
    let path = resolve_config_path(explicit)?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn parse_config(content: &str) -> CycleResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if config.run.max_action_retries == 0 {
        return Err(CycleError::Config("run.max_action_retries must be at least 1".into()));
    }
    if config.reasoning.max_format_attempts == 0 {
        return Err(CycleError::Config(
            "reasoning.max_format_attempts must be at least 1".into(),
        ));
    }
    Ok(config)
}
