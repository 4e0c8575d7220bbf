pub mod actor;
pub mod client;
pub mod evaluator;
pub mod planner;
pub mod prompts;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::CycleResult;
use crate::llm::registry::ProviderRegistry;

use actor::LlmActor;
use client::ReasoningClient;
use evaluator::LlmEvaluator;
use planner::LlmPlanner;
use traits::{Actor, Evaluator, Planner};

/// The three reasoning roles consulted by the cycle engine.
pub struct Reasoners {
    pub planner: Arc<dyn Planner>,
    pub actor: Arc<dyn Actor>,
    pub evaluator: Arc<dyn Evaluator>,
}

impl Reasoners {
    pub fn from_config(registry: &ProviderRegistry, config: &AppConfig) -> CycleResult<Self> {
        let attempts = config.reasoning.max_format_attempts;
        let prompts = &config.prompts;
        Ok(Self {
            planner: Arc::new(LlmPlanner::new(ReasoningClient::for_role(
                registry,
                "planner",
                prompts.planner_system.clone(),
                attempts,
            )?)),
            actor: Arc::new(LlmActor::new(ReasoningClient::for_role(
                registry,
                "actor",
                prompts.actor_system.clone(),
                attempts,
            )?)),
            evaluator: Arc::new(LlmEvaluator::new(ReasoningClient::for_role(
                registry,
                "evaluator",
                prompts.evaluator_system.clone(),
                attempts,
            )?)),
        })
    }
}
