pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod reasoning;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent_engine::engine::{Collaborators, CycleEngine, RunOutcome, RunRequest};
use crate::agent_engine::event_bus::{CycleCommand, EventBus};
use crate::agent_engine::loop_control::{LoopConfig, LoopController};
use crate::agent_engine::recorder::{new_run_id, FileRecorder};
use crate::errors::CycleResult;
use crate::executor::dispatcher::BrowserEnvironment;
use crate::llm::registry::ProviderRegistry;
use crate::perception::omniparser::OmniParserClient;
use crate::reasoning::Reasoners;

/// What to run, as given on the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub app_name: String,
    pub task: String,
    pub location: String,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub snapshot_path: PathBuf,
    pub log_path: PathBuf,
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Build every collaborator from config and drive one run to its end.
///
/// Ctrl-C asks the engine to stop after the node in progress.
pub async fn run(options: RunOptions) -> CycleResult<RunReport> {
    let config = config::load_config(options.config_path.as_deref())?;

    let registry = ProviderRegistry::from_config(&config);
    tracing::info!(providers = ?registry.list_names(), "LLM providers registered");
    let reasoners = Reasoners::from_config(&registry, &config)?;

    let environment = Arc::new(BrowserEnvironment::new(config.browser.clone())?);
    let perception = Arc::new(OmniParserClient::new(config.perception.clone())?);

    let run_id = new_run_id();
    let recorder = Arc::new(FileRecorder::new(&config.run.runs_dir, &run_id)?);
    let snapshot_path = recorder.snapshot_path().to_path_buf();
    let log_path = recorder.log_path().to_path_buf();

    let event_bus = EventBus::new();
    let stop_tx = event_bus.command_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping after the current node");
            let _ = stop_tx.send(CycleCommand::Stop).await;
        }
    });

    let mut engine = CycleEngine::new(
        Collaborators::new(environment, perception, reasoners),
        recorder,
        event_bus,
        LoopController::new(LoopConfig::from(&config.run)),
        config.run.max_action_retries,
    );

    let outcome = engine
        .run(RunRequest {
            run_id,
            location: options.location,
            app_name: options.app_name,
            task: options.task,
        })
        .await
        .map_err(|e| {
            tracing::error!(snapshot = %snapshot_path.display(), "last committed state saved");
            e
        })?;

    Ok(RunReport {
        outcome,
        snapshot_path,
        log_path,
    })
}
