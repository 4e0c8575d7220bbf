// Chromium session driven over the DevTools protocol.
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, GetLayoutMetricsParams,
};
use chromiumoxide::{Browser, Page};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::BrowserConfig;
use crate::errors::{CycleError, CycleResult};
use crate::executor::coordinator::Viewport;
use crate::executor::keys::{classify, KeyInput};

const CLEAR_FOCUSED: &str = r#"(() => {
    const el = document.activeElement;
    if (!el) return false;
    if (typeof el.select === "function") el.select();
    if ("value" in el) {
        el.value = "";
        el.dispatchEvent(new Event("input", { bubbles: true }));
        return true;
    }
    if (el.isContentEditable) {
        el.textContent = "";
        return true;
    }
    return false;
})()"#;

/// What the pointer does once it reaches its target.
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Move,
    Click { button: MouseButton, count: i64 },
}

/// Mouse events for one gesture at viewport point `(x, y)`.
///
/// A double click is two press/release pairs with rising click counts, the
/// way Chromium reports real ones.
pub fn pointer_events(x: f64, y: f64, gesture: &Gesture) -> CycleResult<Vec<DispatchMouseEventParams>> {
    let mut events = vec![DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseMoved)
        .x(x)
        .y(y)
        .build()
        .map_err(CycleError::Browser)?];

    if let Gesture::Click { button, count } = gesture {
        for click in 1..=*count {
            for kind in [DispatchMouseEventType::MousePressed, DispatchMouseEventType::MouseReleased] {
                events.push(
                    DispatchMouseEventParams::builder()
                        .r#type(kind)
                        .button(button.clone())
                        .x(x)
                        .y(y)
                        .click_count(click)
                        .build()
                        .map_err(CycleError::Browser)?,
                );
            }
        }
    }
    Ok(events)
}

fn cdp_err(context: &str) -> impl Fn(chromiumoxide::error::CdpError) -> CycleError + '_ {
    move |e| CycleError::Browser(format!("{context}: {e}"))
}

struct Live {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// One Chromium instance with a single page, launched on first `open`.
pub struct BrowserSession {
    config: BrowserConfig,
    live: Mutex<Option<Live>>,
}

impl BrowserSession {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            live: Mutex::new(None),
        }
    }

    async fn launch(&self) -> CycleResult<Live> {
        let mut builder = chromiumoxide::BrowserConfig::builder();
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(bin) = &self.config.executable {
            builder = builder.chrome_executable(bin);
        }
        if let Some([width, height]) = self.config.window_size {
            builder = builder.window_size(width, height);
        }
        let mut args = self.config.extra_args.clone();
        if self.config.maximize {
            args.push("--start-maximized".to_string());
        }
        let launch_config = builder
            .args(args)
            .build()
            .map_err(|e| CycleError::Browser(format!("browser config: {e}")))?;

        tracing::info!(
            headless = self.config.headless,
            executable = ?self.config.executable,
            "launching chromium"
        );
        let (browser, mut handler) = Browser::launch(launch_config)
            .await
            .map_err(cdp_err("launch failed"))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "chromium handler event error");
                }
            }
            tracing::debug!("chromium event loop exited");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(cdp_err("failed to create page"))?;
        Ok(Live {
            browser,
            page,
            handler,
        })
    }

    /// Launch the browser if needed and navigate to `url`.
    pub async fn navigate(&self, url: &str) -> CycleResult<()> {
        let page = {
            let mut live = self.live.lock().await;
            if live.is_none() {
                *live = Some(self.launch().await?);
            }
            live.as_ref()
                .map(|l| l.page.clone())
                .ok_or_else(|| CycleError::Browser("browser did not start".into()))?
        };
        page.bring_to_front().await.map_err(cdp_err("bring to front"))?;
        page.goto(url)
            .await
            .map_err(cdp_err("navigation failed"))?
            .wait_for_navigation()
            .await
            .map_err(cdp_err("navigation failed"))?;
        Ok(())
    }

    async fn page(&self) -> CycleResult<Page> {
        self.live
            .lock()
            .await
            .as_ref()
            .map(|l| l.page.clone())
            .ok_or_else(|| CycleError::Browser("browser is not open".into()))
    }

    pub async fn viewport(&self) -> CycleResult<Viewport> {
        let page = self.page().await?;
        let metrics = page
            .execute(GetLayoutMetricsParams::default())
            .await
            .map_err(cdp_err("layout metrics"))?;
        let layout = &metrics.css_layout_viewport;
        Ok(Viewport {
            width: layout.client_width.max(0) as u32,
            height: layout.client_height.max(0) as u32,
        })
    }

    pub async fn screenshot_png(&self) -> CycleResult<Vec<u8>> {
        let page = self.page().await?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        page.screenshot(params).await.map_err(cdp_err("screenshot failed"))
    }

    pub async fn pointer(&self, x: f64, y: f64, gesture: Gesture) -> CycleResult<()> {
        let page = self.page().await?;
        for event in pointer_events(x, y, &gesture)? {
            page.execute(event).await.map_err(cdp_err("mouse event"))?;
        }
        Ok(())
    }

    /// Empty the focused field.
    pub async fn clear_focused(&self) -> CycleResult<()> {
        let page = self.page().await?;
        let cleared: bool = page
            .evaluate(CLEAR_FOCUSED)
            .await
            .map_err(cdp_err("clear failed"))?
            .into_value()
            .unwrap_or(false);
        if !cleared {
            tracing::debug!("focused element has no editable value to clear");
        }
        Ok(())
    }

    pub async fn insert_text(&self, text: &str) -> CycleResult<()> {
        let page = self.page().await?;
        page.execute(InsertTextParams::new(text))
            .await
            .map_err(cdp_err("type failed"))?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    /// Send one key to the focused control; unknown names are typed as text.
    pub async fn press_key(&self, key: &str) -> CycleResult<()> {
        let definition = match classify(key) {
            KeyInput::Press(definition) => definition,
            KeyInput::Text(text) => return self.insert_text(&text).await,
        };
        let page = self.page().await?;

        let mut cmd = DispatchKeyEventParams::builder()
            .key(definition.key)
            .code(definition.code)
            .windows_virtual_key_code(definition.key_code)
            .native_virtual_key_code(definition.key_code);
        let key_down = if let Some(text) = definition.text {
            cmd = cmd.text(text);
            DispatchKeyEventType::KeyDown
        } else if definition.key.len() == 1 {
            cmd = cmd.text(definition.key);
            DispatchKeyEventType::KeyDown
        } else {
            DispatchKeyEventType::RawKeyDown
        };

        let down = cmd.clone().r#type(key_down).build().map_err(CycleError::Browser)?;
        page.execute(down).await.map_err(cdp_err("key down"))?;
        let up = cmd
            .r#type(DispatchKeyEventType::KeyUp)
            .build()
            .map_err(CycleError::Browser)?;
        page.execute(up).await.map_err(cdp_err("key up"))?;

        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok(())
    }

    /// Wheel scroll from the viewport center.
    pub async fn scroll(&self, dx: i64, dy: i64) -> CycleResult<()> {
        let viewport = self.viewport().await?;
        let page = self.page().await?;
        let wheel = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(viewport.width as f64 / 2.0)
            .y(viewport.height as f64 / 2.0)
            .delta_x(dx as f64)
            .delta_y(dy as f64)
            .build()
            .map_err(CycleError::Browser)?;
        page.execute(wheel).await.map_err(cdp_err("scroll failed"))?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    pub async fn reload(&self) -> CycleResult<()> {
        let page = self.page().await?;
        page.reload().await.map_err(cdp_err("reload failed"))?;
        Ok(())
    }

    pub async fn back(&self) -> CycleResult<()> {
        let page = self.page().await?;
        page.evaluate("window.history.back()")
            .await
            .map_err(cdp_err("history back failed"))?;
        Ok(())
    }

    /// Close the browser. A session that never launched closes trivially.
    pub async fn close(&self) -> CycleResult<()> {
        let Some(mut live) = self.live.lock().await.take() else {
            return Ok(());
        };
        let closed = live.browser.close().await.map(|_| ());
        live.handler.abort();
        closed.map_err(cdp_err("close failed"))
    }
}
