use async_trait::async_trait;

use crate::agent_engine::state::{Action, RewindRequest};
use crate::errors::CycleResult;
use crate::perception::types::ScreenshotRef;

/// The live application under control.
///
/// One session per run. Every method either completes or fails; `execute`
/// fails with `CycleError::Execution` carrying a human-readable cause.
#[async_trait]
pub trait Environment: Send + Sync {
    async fn open(&self, location: &str) -> CycleResult<()>;

    /// Capture the viewport and store it as an artifact.
    async fn screenshot(&self) -> CycleResult<ScreenshotRef>;

    async fn execute(&self, action: &Action) -> CycleResult<()>;

    /// `RewindRequest::None` is a no-op.
    async fn rewind(&self, request: RewindRequest) -> CycleResult<()>;

    /// Release the session. Called once at the end of a run.
    async fn close(&self) -> CycleResult<()> {
        Ok(())
    }
}
