//! Browser-session abstraction for the collector.
//!
//! The collector drives the site exclusively through `execute_js` — clicks,
//! scrolls, and field fills are JS-driven because native clicks on the
//! facet UI are unreliable. That keeps this trait minimal and lets tests
//! script a fake session instead of launching a real browser.

pub mod chromium;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Poll interval for `wait_for_js`.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A live browser session on a single page.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to a URL with a bounded wait for the load to settle.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Execute JavaScript in the page and return the JSON-coerced result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;

    /// Current page URL.
    async fn current_url(&self) -> Result<String>;

    /// Release the session. Must be called on every exit path of a run.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Repeatedly evaluate `script` until it returns a truthy value, with a
/// bounded overall wait. A timeout is a local, catchable failure.
pub async fn wait_for_js(
    session: &dyn BrowserSession,
    script: &str,
    timeout_ms: u64,
) -> Result<serde_json::Value> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if let Ok(value) = session.execute_js(script).await {
            if is_truthy(&value) {
                return Ok(value);
            }
        }
        if Instant::now() >= deadline {
            bail!("condition not met within {timeout_ms}ms");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// JS truthiness over the JSON-coerced evaluation result.
fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}
