//! W3C WebDriver renderer
//!
//! Speaks the WebDriver HTTP protocol to a running chromedriver or
//! geckodriver. A context is a logical group of WebDriver sessions; each
//! `RenderSession` is its own WebDriver session (its own browser window and
//! cookie jar), so pages never share state.

use crate::render::traits::{RenderContext, RenderError, RenderResult, RenderSession, Renderer};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Default delay between element lookups while waiting
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browsers with known capability shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
}

impl Browser {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Some(Self::Chrome),
            "firefox" | "gecko" => Some(Self::Firefox),
            _ => None,
        }
    }

    /// Capabilities for `POST /session`
    pub fn capabilities(&self, headless: bool) -> Value {
        match self {
            Self::Chrome => {
                let mut args = vec!["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"];
                if headless {
                    args.push("--headless=new");
                }
                json!({
                    "capabilities": {
                        "alwaysMatch": {
                            "browserName": "chrome",
                            "goog:chromeOptions": { "args": args }
                        }
                    }
                })
            }
            Self::Firefox => {
                let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
                json!({
                    "capabilities": {
                        "alwaysMatch": {
                            "browserName": "firefox",
                            "moz:firefoxOptions": { "args": args }
                        }
                    }
                })
            }
        }
    }
}

/// Thin JSON client for one WebDriver endpoint
struct WebDriverClient {
    http: Client,
    base_url: String,
    capabilities: Value,
    poll_interval: Duration,
}

impl WebDriverClient {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> RenderResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed = serde_json::from_str::<Value>(&text);

        if !status.is_success() {
            let body = parsed.unwrap_or(Value::Null);
            return Err(protocol_error(status.as_u16(), &body, &text));
        }

        let body = parsed.map_err(|e| RenderError::InvalidResponse(e.to_string()))?;
        Ok(body.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn create_session(&self) -> RenderResult<String> {
        let value = self
            .send(Method::POST, "/session", Some(self.capabilities.clone()))
            .await?;

        value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| RenderError::InvalidResponse("missing sessionId".to_string()))
    }

    async fn delete_session(&self, session_id: &str) -> RenderResult<()> {
        self.send(Method::DELETE, &format!("/session/{}", session_id), None)
            .await?;
        Ok(())
    }
}

/// Maps a WebDriver error body onto `RenderError`
fn protocol_error(status: u16, body: &Value, raw: &str) -> RenderError {
    let value = body.get("value");
    let error = value
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(raw);

    match error {
        "no such element" => RenderError::ElementNotFound(message.to_string()),
        "invalid session id" => RenderError::SessionClosed,
        _ => RenderError::Protocol {
            status,
            error: error.to_string(),
            message: message.to_string(),
        },
    }
}

/// Renderer backed by a WebDriver server
pub struct WebDriverRenderer {
    client: Arc<WebDriverClient>,
}

impl WebDriverRenderer {
    /// Creates a renderer for the WebDriver server at `base_url`
    pub fn new(
        base_url: &str,
        browser: Browser,
        headless: bool,
        request_timeout: Duration,
    ) -> RenderResult<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client: Arc::new(WebDriverClient {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                capabilities: browser.capabilities(headless),
                poll_interval: DEFAULT_POLL_INTERVAL,
            }),
        })
    }

    /// Overrides how often `wait_for` re-checks the page
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        if let Some(client) = Arc::get_mut(&mut self.client) {
            client.poll_interval = poll_interval;
        }
        self
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn new_context(&self) -> RenderResult<Arc<dyn RenderContext>> {
        Ok(Arc::new(WebDriverContext {
            client: self.client.clone(),
            sessions: Arc::new(Mutex::new(HashSet::new())),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Group of WebDriver sessions that can be torn down together
pub struct WebDriverContext {
    client: Arc<WebDriverClient>,
    sessions: Arc<Mutex<HashSet<String>>>,
    closed: AtomicBool,
}

impl WebDriverContext {
    /// Number of sessions opened through this context and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RenderContext for WebDriverContext {
    async fn new_session(&self) -> RenderResult<Box<dyn RenderSession>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RenderError::SessionClosed);
        }

        let id = self.client.create_session().await?;
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id.clone());
        }
        tracing::debug!("WebDriver session opened: {}", id);

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            id,
            registry: self.sessions.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> RenderResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let leftover: Vec<String> = match self.sessions.lock() {
            Ok(mut sessions) => sessions.drain().collect(),
            Err(_) => Vec::new(),
        };

        for id in leftover {
            if let Err(e) = self.client.delete_session(&id).await {
                tracing::warn!("Failed to delete WebDriver session {}: {}", id, e);
            }
        }
        Ok(())
    }
}

/// One WebDriver session
pub struct WebDriverSession {
    client: Arc<WebDriverClient>,
    id: String,
    registry: Arc<Mutex<HashSet<String>>>,
    closed: AtomicBool,
}

impl WebDriverSession {
    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.id, suffix)
    }

    fn ensure_open(&self) -> RenderResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RenderError::SessionClosed)
        } else {
            Ok(())
        }
    }

    async fn find_element(&self, selector: &str) -> RenderResult<String> {
        self.ensure_open()?;
        let value = self
            .client
            .send(
                Method::POST,
                &self.path("/element"),
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await
            .map_err(|e| match e {
                RenderError::ElementNotFound(_) => RenderError::ElementNotFound(selector.to_string()),
                other => other,
            })?;

        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| RenderError::InvalidResponse(format!("no element reference for {}", selector)))
    }

    async fn click_element(&self, element_id: &str) -> RenderResult<()> {
        self.client
            .send(
                Method::POST,
                &self.path(&format!("/element/{}/click", element_id)),
                Some(json!({})),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RenderSession for WebDriverSession {
    async fn goto(&self, url: &str) -> RenderResult<()> {
        self.ensure_open()?;
        self.client
            .send(Method::POST, &self.path("/url"), Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> RenderResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(RenderError::ElementNotFound(_)) => {}
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(RenderError::Timeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.client.poll_interval).await;
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> RenderResult<()> {
        let option = format!("{} option[value='{}']", selector, value);
        let element = self.find_element(&option).await?;
        self.click_element(&element).await
    }

    async fn click(&self, selector: &str) -> RenderResult<()> {
        let element = self.find_element(selector).await?;
        self.click_element(&element).await
    }

    async fn exists(&self, selector: &str) -> RenderResult<bool> {
        self.ensure_open()?;
        let value = self
            .client
            .send(
                Method::POST,
                &self.path("/elements"),
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(value.as_array().map(|a| !a.is_empty()).unwrap_or(false))
    }

    async fn content(&self) -> RenderResult<String> {
        self.ensure_open()?;
        let value = self.client.send(Method::GET, &self.path("/source"), None).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| RenderError::InvalidResponse("page source is not a string".to_string()))
    }

    async fn close(&self) -> RenderResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let still_registered = match self.registry.lock() {
            Ok(mut sessions) => sessions.remove(&self.id),
            Err(_) => true,
        };

        // The owning context may already have deleted it
        if still_registered {
            self.client.delete_session(&self.id).await?;
            tracing::debug!("WebDriver session closed: {}", self.id);
        }
        Ok(())
    }
}
