//! Chromium session driven over CDP
//!
//! Every DOM operation runs as a small script inside the page. Selectors are
//! embedded as JSON string literals so quoting in site selectors is safe.

use crate::config::BrowserConfig;
use crate::driver::traits::{
    BoundingBox, BrowserDriver, DriverError, DriverResult, ElementInfo, ElementSnapshot, Locator,
};
use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use chromiumoxide::{Browser, BrowserConfig as LaunchConfig};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Common Chrome executable paths to check
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

/// A single Chromium page
pub struct ChromiumDriver {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launches a browser and opens a blank page
    ///
    /// # Arguments
    ///
    /// * `config` - Headless flag, extra arguments and optional executable path
    ///
    /// # Returns
    ///
    /// * `Ok(ChromiumDriver)` - A session ready for `open_page`
    /// * `Err(DriverError::Navigation)` - The browser could not be found or started
    pub async fn launch(config: &BrowserConfig) -> DriverResult<Self> {
        let chrome = match &config.chrome_path {
            Some(path) => PathBuf::from(path),
            None => find_chrome()?,
        };
        info!(
            "Launching browser {} (headless={})",
            chrome.display(),
            config.headless
        );

        let mut builder = LaunchConfig::builder().chrome_executable(chrome);
        if !config.headless {
            builder = builder.with_head();
        }
        for arg in &config.chrome_args {
            builder = builder.arg(arg.as_str());
        }
        let launch = builder
            .build()
            .map_err(|e| DriverError::Navigation(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(launch)
            .await
            .map_err(|e| DriverError::Navigation(format!("failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Navigation(format!("failed to open page: {}", e)))?;

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler,
        })
    }

    fn page(&self) -> DriverResult<&Page> {
        if self.handler.is_finished() {
            return Err(DriverError::SessionClosed);
        }
        self.page.as_ref().ok_or(DriverError::SessionClosed)
    }

    fn fail(&self, err: CdpError, wrap: impl FnOnce(String) -> DriverError) -> DriverError {
        cdp_error(err, self.handler.is_finished(), wrap)
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> DriverResult<T> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| self.fail(e, DriverError::Script))?;
        result
            .into_value()
            .map_err(|e| DriverError::Script(format!("unexpected script result: {}", e)))
    }

    /// Runs an action script that reports `ok`, `missing`, `invalid:<msg>`
    /// or `blocked:<reason>`
    async fn act(&self, script: String, selector: &str) -> DriverResult<()> {
        let status: String = self.eval(script).await?;
        match status.split_once(':') {
            _ if status == "ok" => Ok(()),
            _ if status == "missing" => Err(DriverError::NotFound {
                selector: selector.to_string(),
            }),
            Some(("invalid", message)) => Err(DriverError::InvalidSelector {
                selector: selector.to_string(),
                message: message.to_string(),
            }),
            Some(("blocked", reason)) => Err(DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: reason.to_string(),
            }),
            _ => Err(DriverError::Script(status)),
        }
    }
}

/// Maps a CDP failure to a driver error
///
/// A dead connection or a finished event handler means the browser is gone,
/// which always ends the session. Anything else is wrapped with `wrap`.
fn cdp_error(
    err: CdpError,
    handler_finished: bool,
    wrap: impl FnOnce(String) -> DriverError,
) -> DriverError {
    let transport = matches!(
        err,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    );
    if transport || handler_finished {
        warn!("Browser connection lost: {}", err);
        DriverError::SessionClosed
    } else {
        wrap(err.to_string())
    }
}

/// Finds a Chrome executable in well-known locations or on the PATH
fn find_chrome() -> DriverResult<PathBuf> {
    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            debug!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    debug!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(DriverError::Navigation(
        "Chrome/Chromium not found; install it or set browser.chrome-path".to_string(),
    ))
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Script fragment resolving a locator into `el`, returning early on failure
fn resolve_locator(locator: &Locator) -> String {
    let child = locator
        .child
        .as_deref()
        .map(js_string)
        .unwrap_or_else(|| "null".to_string());
    format!(
        r#"let matches;
        try {{ matches = document.querySelectorAll({selector}); }}
        catch (e) {{ return 'invalid:' + e.message; }}
        let el = matches[{index}];
        if (!el) return 'missing';
        const child = {child};
        if (child !== null) {{
            try {{ el = el.querySelector(child); }}
            catch (e) {{ return 'invalid:' + e.message; }}
            if (!el) return 'missing';
        }}"#,
        selector = js_string(&locator.selector),
        index = locator.index,
        child = child,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawElement {
    text: String,
    inner_html: String,
    value: Option<String>,
    attributes: HashMap<String, String>,
    visible: bool,
    enabled: bool,
}

impl From<RawElement> for ElementInfo {
    fn from(raw: RawElement) -> Self {
        Self {
            text: raw.text.trim().to_string(),
            inner_html: raw.inner_html,
            value: raw.value,
            attributes: raw.attributes,
            visible: raw.visible,
            enabled: raw.enabled,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuery {
    error: Option<String>,
    #[serde(default)]
    elements: Vec<RawElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    outer_html: String,
    rect: BoundingBox,
    display: String,
    visibility: String,
    opacity: String,
}

#[derive(Deserialize)]
struct RawInspection {
    snapshot: Option<RawSnapshot>,
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open_page(&mut self, url: &str) -> DriverResult<()> {
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|e| {
                self.fail(e, |msg| DriverError::Navigation(format!("{}: {}", url, msg)))
            })?;
        if let Err(e) = page.wait_for_navigation().await {
            warn!("Waiting for {} to load failed: {}", url, e);
        }
        Ok(())
    }

    async fn query_all(&mut self, selector: &str) -> DriverResult<Vec<ElementInfo>> {
        let script = format!(
            r#"(() => {{
                let nodes;
                try {{ nodes = document.querySelectorAll({selector}); }}
                catch (e) {{ return {{ error: e.message }}; }}
                const elements = Array.from(nodes).map((el) => {{
                    const style = window.getComputedStyle(el);
                    const attributes = {{}};
                    for (const attr of el.attributes) attributes[attr.name] = attr.value;
                    return {{
                        text: el.innerText ?? el.textContent ?? '',
                        innerHtml: el.innerHTML,
                        value: 'value' in el && typeof el.value === 'string' ? el.value : null,
                        attributes,
                        visible: style.display !== 'none' && style.visibility !== 'hidden'
                            && el.getClientRects().length > 0,
                        enabled: !el.disabled,
                    }};
                }});
                return {{ error: null, elements }};
            }})()"#,
            selector = js_string(selector),
        );

        let raw: RawQuery = self.eval(script).await?;
        if let Some(message) = raw.error {
            return Err(DriverError::InvalidSelector {
                selector: selector.to_string(),
                message,
            });
        }
        Ok(raw.elements.into_iter().map(ElementInfo::from).collect())
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                {resolve}
                const style = window.getComputedStyle(el);
                if (style.display === 'none' || style.visibility === 'hidden') return 'blocked:hidden';
                if (el.disabled) return 'blocked:disabled';
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return 'ok';
            }})()"#,
            resolve = resolve_locator(locator),
        );
        self.act(script, &locator.to_string()).await
    }

    async fn select(&mut self, selector: &str, value: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
                let el;
                try {{ el = document.querySelector({selector}); }}
                catch (e) {{ return 'invalid:' + e.message; }}
                if (!el) return 'missing';
                if (el.disabled) return 'blocked:disabled';
                const wanted = {value};
                if (!Array.from(el.options || []).some((o) => o.value === wanted)) {{
                    return 'blocked:no option ' + wanted;
                }}
                el.value = wanted;
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return 'ok';
            }})()"#,
            selector = js_string(selector),
            value = js_string(value),
        );
        self.act(script, selector).await
    }

    async fn body_text(&mut self) -> DriverResult<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn inspect(&mut self, locator: &Locator) -> DriverResult<Option<ElementSnapshot>> {
        let script = format!(
            r#"(() => {{
                const found = (() => {{
                    {resolve}
                    return el;
                }})();
                if (typeof found === 'string') return {{ snapshot: null }};
                const style = window.getComputedStyle(found);
                const r = found.getBoundingClientRect();
                return {{ snapshot: {{
                    outerHtml: found.outerHTML,
                    rect: {{ x: r.x, y: r.y, width: r.width, height: r.height,
                             top: r.top, left: r.left, bottom: r.bottom, right: r.right }},
                    display: style.display,
                    visibility: style.visibility,
                    opacity: style.opacity,
                }} }};
            }})()"#,
            resolve = resolve_locator(locator),
        );

        let raw: RawInspection = self.eval(script).await?;
        Ok(raw.snapshot.map(|raw| {
            ElementSnapshot {
                selector: locator.to_string(),
                outer_html: Some(raw.outer_html),
                bounding_box: Some(raw.rect),
                display: Some(raw.display),
                visibility: Some(raw.visibility),
                opacity: Some(raw.opacity),
            }
            .truncated()
        }))
    }

    async fn go_back(&mut self) -> DriverResult<()> {
        let _: String = self
            .eval("(() => { history.back(); return 'ok'; })()".to_string())
            .await?;
        Ok(())
    }

    async fn reload(&mut self) -> DriverResult<()> {
        self.page()?
            .reload()
            .await
            .map_err(|e| self.fail(e, DriverError::Navigation))?;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Closing page failed: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Closing browser failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
        Ok(())
    }
}
