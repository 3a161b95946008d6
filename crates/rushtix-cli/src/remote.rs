//! Appium WebDriver transport implementing the core session trait.
//!
//! This is the "external collaborator" behind [`AutomationSession`]: a thin
//! W3C WebDriver client over HTTP, speaking to an Appium server driving a
//! UiAutomator2 session. The engine never sees any of this — it only sees
//! the trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info};

use rushtix_core::element::{ElementHandle, ElementRect};
use rushtix_core::locator::Locator;
use rushtix_core::session::{
    AutomationSession, GestureKind, GestureTarget, SessionConfig, SessionError, SessionFactory,
};

/// W3C element-id key in find-element responses.
const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Interval between find-element polls while waiting out a locator timeout.
const FIND_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn transport_err(e: reqwest::Error) -> SessionError {
    if e.is_connect() || e.is_timeout() {
        SessionError::ConnectionLost(e.to_string())
    } else {
        SessionError::CommandFailed(e.to_string())
    }
}

/// Maps a locator variant to its WebDriver `using` strategy.
///
/// Coordinates have no wire representation; the resolver resolves them
/// locally and never sends them here.
fn wire_strategy(locator: &Locator) -> Option<(&'static str, String)> {
    match locator {
        Locator::StructuralId(v) => Some(("id", v.clone())),
        Locator::Path(v) => Some(("xpath", v.clone())),
        Locator::Descriptor(v) => Some(("accessibility id", v.clone())),
        Locator::Query(v) => Some(("-android uiautomator", v.clone())),
        Locator::Coordinate { .. } => None,
    }
}

/// One live WebDriver session on an Appium server.
pub struct AppiumSession {
    client: reqwest::Client,
    /// `{server}/session/{id}`
    session_url: String,
}

impl AppiumSession {
    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SessionError> {
        let url = format!("{}{path}", self.session_url);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(transport_err)?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            // WebDriver "no such element" and friends come back as 404.
            return Err(SessionError::CommandFailed(
                payload["value"]["message"]
                    .as_str()
                    .unwrap_or("not found")
                    .to_string(),
            ));
        }
        if !status.is_success() {
            return Err(SessionError::CommandFailed(
                payload["value"]["message"]
                    .as_str()
                    .unwrap_or_else(|| status.as_str())
                    .to_string(),
            ));
        }
        Ok(payload["value"].clone())
    }

    async fn find_once(&self, using: &str, value: &str) -> Result<Option<ElementHandle>, SessionError> {
        let result = self
            .command(
                reqwest::Method::POST,
                "/elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        let handle = result
            .as_array()
            .and_then(|list| list.first())
            .and_then(|e| e[W3C_ELEMENT_KEY].as_str())
            .map(|id| ElementHandle(id.to_string()));
        Ok(handle)
    }

    async fn execute_mobile(&self, script: &str, args: Value) -> Result<(), SessionError> {
        self.command(
            reqwest::Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [args] })),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl AutomationSession for AppiumSession {
    async fn resolve_element(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError> {
        let Some((using, value)) = wire_strategy(locator) else {
            return Ok(None);
        };
        let deadline = Instant::now() + timeout;
        loop {
            // "No such element" is a miss, not a fault; real transport
            // errors propagate.
            match self.find_once(using, &value).await {
                Ok(Some(handle)) => return Ok(Some(handle)),
                Ok(None) => {}
                Err(SessionError::CommandFailed(_)) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(FIND_POLL_INTERVAL).await;
        }
    }

    async fn resolve_elements(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        let Some((using, value)) = wire_strategy(locator) else {
            return Ok(Vec::new());
        };
        let deadline = Instant::now() + timeout;
        loop {
            let result = self
                .command(
                    reqwest::Method::POST,
                    "/elements",
                    Some(json!({ "using": using, "value": value })),
                )
                .await;
            match result {
                Ok(list) => {
                    let handles: Vec<ElementHandle> = list
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|e| e[W3C_ELEMENT_KEY].as_str())
                                .map(|id| ElementHandle(id.to_string()))
                                .collect()
                        })
                        .unwrap_or_default();
                    if !handles.is_empty() {
                        return Ok(handles);
                    }
                }
                Err(SessionError::CommandFailed(_)) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(FIND_POLL_INTERVAL).await;
        }
    }

    async fn element_rect(&self, handle: &ElementHandle) -> Result<ElementRect, SessionError> {
        let value = self
            .command(
                reqwest::Method::GET,
                &format!("/element/{}/rect", handle.id()),
                None,
            )
            .await?;
        serde_json::from_value(value).map_err(|e| SessionError::Protocol(e.to_string()))
    }

    async fn element_text(
        &self,
        handle: &ElementHandle,
    ) -> Result<Option<String>, SessionError> {
        let value = self
            .command(
                reqwest::Method::GET,
                &format!("/element/{}/text", handle.id()),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn perform_gesture(
        &self,
        target: GestureTarget,
        kind: GestureKind,
        duration_hint: Option<Duration>,
    ) -> Result<(), SessionError> {
        let duration_ms = duration_hint.map(|d| d.as_millis() as u64);
        match (kind, target) {
            (GestureKind::FastTap, GestureTarget::Element(handle)) => {
                self.execute_mobile("mobile: clickGesture", json!({ "elementId": handle.id() }))
                    .await
            }
            (GestureKind::Activate, GestureTarget::Element(handle)) => self
                .command(
                    reqwest::Method::POST,
                    &format!("/element/{}/click", handle.id()),
                    Some(json!({})),
                )
                .await
                .map(|_| ()),
            (GestureKind::ScriptedTap, GestureTarget::Element(handle)) => {
                self.execute_mobile(
                    "mobile: clickGesture",
                    json!({ "elementId": handle.id(), "duration": duration_ms.unwrap_or(30) }),
                )
                .await
            }
            (_, GestureTarget::Point { x, y }) => {
                self.execute_mobile(
                    "mobile: clickGesture",
                    json!({ "x": x, "y": y, "duration": duration_ms.unwrap_or(30) }),
                )
                .await
            }
            (kind, GestureTarget::Element(_)) => Err(SessionError::CommandFailed(format!(
                "{} requires a coordinate target",
                kind.name()
            ))),
        }
    }

    async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        // Type into whatever holds input focus, matching how the search box
        // behaves after it is tapped.
        let active = self
            .command(reqwest::Method::GET, "/element/active", None)
            .await?;
        let id = active[W3C_ELEMENT_KEY]
            .as_str()
            .ok_or_else(|| SessionError::Protocol("no active element id".to_string()))?;
        self.command(
            reqwest::Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn current_foreground_app(&self) -> Result<String, SessionError> {
        let value = self
            .command(reqwest::Method::GET, "/appium/device/current_package", None)
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SessionError::Protocol("current package is not a string".to_string()))
    }

    async fn activate_app(&self, identifier: &str) -> Result<(), SessionError> {
        self.command(
            reqwest::Method::POST,
            "/appium/device/activate_app",
            Some(json!({ "appId": identifier })),
        )
        .await
        .map(|_| ())
    }

    async fn window_size(&self) -> Result<(i32, i32), SessionError> {
        let value = self
            .command(reqwest::Method::GET, "/window/rect", None)
            .await?;
        let width = value["width"].as_i64().unwrap_or(0) as i32;
        let height = value["height"].as_i64().unwrap_or(0) as i32;
        if width == 0 || height == 0 {
            return Err(SessionError::Protocol("window rect missing dimensions".to_string()));
        }
        Ok((width, height))
    }

    async fn page_snapshot(&self) -> Result<String, SessionError> {
        let value = self.command(reqwest::Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<(), SessionError> {
        let response = self
            .client
            .delete(&self.session_url)
            .send()
            .await
            .map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(SessionError::CommandFailed(format!(
                "session delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Opens UiAutomator2 sessions on an Appium server.
pub struct AppiumFactory {
    client: reqwest::Client,
}

impl AppiumFactory {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn capabilities(config: &SessionConfig) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "platformName": "Android",
                    "appium:automationName": "UiAutomator2",
                    "appium:appPackage": config.app_package,
                    "appium:appActivity": config.app_activity,
                    "appium:noReset": true,
                    "appium:unicodeKeyboard": true,
                    "appium:resetKeyboard": true,
                    "appium:disableWindowAnimation": true,
                    "appium:shouldTerminateApp": false,
                    "appium:newCommandTimeout": 6000,
                    // Grab runs race the clock: never wait for UI idle.
                    "appium:settings[waitForIdleTimeout]": 0,
                    "appium:settings[actionAcknowledgmentTimeout]": 0,
                    "appium:settings[keyInjectionDelay]": 0,
                    "appium:settings[allowInvisibleElements]": true
                }
            }
        })
    }
}

impl Default for AppiumFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFactory for AppiumFactory {
    async fn open(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn AutomationSession>, SessionError> {
        let url = format!("{}/session", config.server_url.trim_end_matches('/'));
        debug!(%url, "opening WebDriver session");

        let response = self
            .client
            .post(&url)
            .json(&Self::capabilities(config))
            .send()
            .await
            .map_err(transport_err)?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        if !status.is_success() {
            return Err(SessionError::CommandFailed(
                payload["value"]["message"]
                    .as_str()
                    .unwrap_or("session creation failed")
                    .to_string(),
            ));
        }

        let session_id = payload["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| SessionError::Protocol("response carries no sessionId".to_string()))?;
        info!(session_id, "WebDriver session established");

        Ok(Box::new(AppiumSession {
            client: self.client.clone(),
            session_url: format!(
                "{}/session/{session_id}",
                config.server_url.trim_end_matches('/')
            ),
        }))
    }
}
