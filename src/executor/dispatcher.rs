// Action dispatcher: maps each action kind onto browser input.
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::MouseButton;

use crate::agent_engine::state::{Action, ActionKind, RewindRequest};
use crate::config::BrowserConfig;
use crate::errors::{CycleError, CycleResult};
use crate::executor::browser::{BrowserSession, Gesture};
use crate::executor::coordinator::resolve_target;
use crate::executor::environment::Environment;
use crate::executor::validate::check_fields;
use crate::perception::types::ScreenshotRef;

fn left_click(count: i64) -> Gesture {
    Gesture::Click {
        button: MouseButton::Left,
        count,
    }
}

/// Duration of a `wait` action; values `Duration` cannot hold are rejected.
fn wait_duration(action: &Action) -> CycleResult<Duration> {
    let seconds = action.wait_seconds();
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| CycleError::Execution(format!("wait of {seconds} seconds is invalid: {e}")))
}

pub struct BrowserEnvironment {
    session: BrowserSession,
    config: BrowserConfig,
}

impl BrowserEnvironment {
    pub fn new(config: BrowserConfig) -> CycleResult<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;
        Ok(Self {
            session: BrowserSession::new(config.clone()),
            config,
        })
    }

    async fn target(&self, action: &Action) -> CycleResult<(f64, f64)> {
        let bbox = action
            .bbox
            .as_ref()
            .ok_or_else(|| CycleError::Execution("action has no bounding box".into()))?;
        let viewport = self.session.viewport().await?;
        let (x, y) = resolve_target(bbox, viewport)?;
        // Keep the far edge on the last pixel row/column.
        Ok((
            x.min(viewport.width.saturating_sub(1) as i64) as f64,
            y.min(viewport.height.saturating_sub(1) as i64) as f64,
        ))
    }

    async fn dispatch(&self, action: &Action) -> CycleResult<()> {
        match action.kind {
            ActionKind::Click => {
                let (x, y) = self.target(action).await?;
                self.session.pointer(x, y, left_click(1)).await?;
                tokio::time::sleep(Duration::from_millis(self.config.click_settle_ms)).await;
            }
            ActionKind::DoubleClick => {
                let (x, y) = self.target(action).await?;
                self.session.pointer(x, y, left_click(2)).await?;
            }
            ActionKind::RightClick => {
                let (x, y) = self.target(action).await?;
                self.session
                    .pointer(
                        x,
                        y,
                        Gesture::Click {
                            button: MouseButton::Right,
                            count: 1,
                        },
                    )
                    .await?;
            }
            ActionKind::Hover => {
                let (x, y) = self.target(action).await?;
                self.session.pointer(x, y, Gesture::Move).await?;
            }
            ActionKind::Type => {
                let (x, y) = self.target(action).await?;
                self.session.pointer(x, y, left_click(1)).await?;
                self.session.clear_focused().await?;
                self.session
                    .insert_text(action.text.as_deref().unwrap_or_default())
                    .await?;
            }
            ActionKind::Key => {
                self.session
                    .press_key(action.key.as_deref().unwrap_or_default())
                    .await?;
            }
            ActionKind::Scroll => {
                let (dx, dy) = action.scroll_offsets();
                self.session.scroll(dx, dy).await?;
            }
            ActionKind::Wait => {
                tokio::time::sleep(wait_duration(action)?).await;
            }
        }
        Ok(())
    }

    fn screenshot_path(&self) -> PathBuf {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let tag = uuid::Uuid::new_v4().simple().to_string();
        self.config
            .screenshot_dir
            .join(format!("screen_{ts}_{}.png", &tag[..8]))
    }
}

#[async_trait]
impl Environment for BrowserEnvironment {
    async fn open(&self, location: &str) -> CycleResult<()> {
        self.session.navigate(location).await?;
        tokio::time::sleep(Duration::from_millis(self.config.open_settle_ms)).await;
        tracing::info!(location = %location, "location opened");
        Ok(())
    }

    async fn screenshot(&self) -> CycleResult<ScreenshotRef> {
        let bytes = self
            .session
            .screenshot_png()
            .await
            .map_err(|e| CycleError::Perception(format!("screenshot failed: {e}")))?;

        let path = self.screenshot_path();
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "screenshot saved");
        Ok(ScreenshotRef::new(path))
    }

    async fn execute(&self, action: &Action) -> CycleResult<()> {
        check_fields(action).map_err(CycleError::Execution)?;
        tracing::info!(
            kind = action.kind.as_str(),
            id = action.id,
            content = %action.content,
            "executing action"
        );
        self.dispatch(action).await.map_err(|e| match e {
            CycleError::Execution(_) => e,
            other => CycleError::Execution(other.to_string()),
        })
    }

    async fn rewind(&self, request: RewindRequest) -> CycleResult<()> {
        match request {
            RewindRequest::Refresh => self.session.reload().await?,
            RewindRequest::Back => self.session.back().await?,
            RewindRequest::None => return Ok(()),
        }
        tracing::info!(?request, "environment rewound");
        tokio::time::sleep(Duration::from_millis(self.config.rewind_settle_ms)).await;
        Ok(())
    }

    async fn close(&self) -> CycleResult<()> {
        self.session.close().await
    }
}
