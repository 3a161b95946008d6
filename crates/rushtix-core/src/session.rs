//! Session trait for backend-agnostic remote UI automation.
//!
//! The engine never talks to a device directly. Everything goes through
//! [`AutomationSession`], a narrow capability surface that a transport crate
//! implements (in this workspace, the Appium WebDriver client in the binary).
//! [`SessionFactory`] constructs fresh sessions for the retry controller,
//! which owns at most one live session at a time.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{ElementHandle, ElementRect};
use crate::locator::Locator;

/// Transport-level session failures.
///
/// Any of these crossing out of the workflow triggers a full session
/// teardown and retry cycle.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A remote command failed with the given message.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The session is gone or was never established.
    #[error("Not connected to automation surface")]
    NotConnected,

    /// The remote surface stopped responding mid-session.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A remote command exceeded its transport deadline.
    #[error("Operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote returned a payload the client could not parse.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Where a gesture lands: on a resolved element or at raw coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureTarget {
    /// A previously resolved element.
    Element(ElementHandle),
    /// A screen point in pixels.
    Point { x: i32, y: i32 },
}

/// The interaction technique a gesture uses on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    /// Fast click gesture addressed by element id (`mobile: clickGesture`).
    FastTap,
    /// Direct element activation (WebDriver element click).
    Activate,
    /// Scripted gesture by element id, a slower but more forgiving path.
    ScriptedTap,
    /// Plain tap at coordinates.
    Tap,
}

impl GestureKind {
    /// Short name for tracing fields.
    pub fn name(&self) -> &'static str {
        match self {
            GestureKind::FastTap => "fast_tap",
            GestureKind::Activate => "activate",
            GestureKind::ScriptedTap => "scripted_tap",
            GestureKind::Tap => "tap",
        }
    }
}

/// Connection parameters handed to a [`SessionFactory`].
///
/// Capability details (platform version, device name, UiAutomator tuning)
/// stay inside the transport implementation; the engine only decides where
/// to connect and which app to drive.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Automation server endpoint, e.g. `http://127.0.0.1:4723`.
    pub server_url: String,
    /// Package identifier of the app under automation.
    pub app_package: String,
    /// Launch activity of the app under automation.
    pub app_activity: String,
}

/// Capability surface of one live automation session.
///
/// All methods are fallible with [`SessionError`]; all calls are issued
/// strictly sequentially — the remote surface is not safe for concurrent
/// mutation.
#[async_trait]
pub trait AutomationSession: Send + Sync {
    /// Look for an element matching `locator`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when nothing matched within the window; errors are
    /// reserved for transport faults.
    async fn resolve_element(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError>;

    /// Look for every element matching `locator`, waiting up to `timeout`.
    ///
    /// Returns an empty list when nothing matched.
    async fn resolve_elements(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, SessionError>;

    /// The element's current on-screen rectangle.
    async fn element_rect(&self, handle: &ElementHandle) -> Result<ElementRect, SessionError>;

    /// The element's visible text, if it has any.
    async fn element_text(&self, handle: &ElementHandle)
        -> Result<Option<String>, SessionError>;

    /// Perform one gesture against an element or a point.
    ///
    /// `duration_hint` is how long the touch should be held, where the
    /// technique supports it.
    async fn perform_gesture(
        &self,
        target: GestureTarget,
        kind: GestureKind,
        duration_hint: Option<Duration>,
    ) -> Result<(), SessionError>;

    /// Type text into the currently focused input.
    async fn type_text(&self, text: &str) -> Result<(), SessionError>;

    /// Package identifier of the app currently in the foreground.
    async fn current_foreground_app(&self) -> Result<String, SessionError>;

    /// Bring the app with `identifier` to the foreground.
    async fn activate_app(&self, identifier: &str) -> Result<(), SessionError>;

    /// Screen dimensions in pixels, `(width, height)`.
    async fn window_size(&self) -> Result<(i32, i32), SessionError>;

    /// Raw page source of the current screen. Diagnostic only.
    async fn page_snapshot(&self) -> Result<String, SessionError>;

    /// Tear the session down on the remote side.
    ///
    /// Called exactly once per session by the retry controller; errors are
    /// logged there and never block a fresh session from opening.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Constructs fresh automation sessions.
///
/// The retry controller opens one session per attempt and guarantees the
/// previous one is closed before calling this again.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn AutomationSession>, SessionError>;
}
