//! Shared test helpers for rushtix-core integration tests.
//!
//! Provides a scripted in-memory [`MockSession`] standing in for the remote
//! automation surface, plus a queue-backed [`QueueFactory`] for exercising
//! the session retry controller.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rushtix_core::config::RunConfig;
use rushtix_core::element::{ElementHandle, ElementRect};
use rushtix_core::locator::Locator;
use rushtix_core::session::{
    AutomationSession, GestureKind, GestureTarget, SessionConfig, SessionError, SessionFactory,
};

/// One scripted element on the fake screen.
///
/// A locator matches the element when the locator's value string contains
/// `pattern`.
#[derive(Debug, Clone)]
pub struct MockElement {
    pub id: String,
    pub pattern: String,
    pub rect: ElementRect,
    pub text: String,
}

/// A recorded gesture.
#[derive(Debug, Clone)]
pub struct GestureRecord {
    pub target: GestureTarget,
    pub kind: GestureKind,
}

/// Scripted automation surface.
#[derive(Default)]
pub struct MockSession {
    elements: Mutex<Vec<MockElement>>,
    /// Locator-value substrings that produce a transport error on resolve.
    fault_patterns: Mutex<HashSet<String>>,
    /// Gesture kinds that fail when attempted.
    failing_kinds: Mutex<HashSet<GestureKind>>,
    pub gestures: Mutex<Vec<GestureRecord>>,
    pub resolve_log: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<String>>,
    foreground: Mutex<String>,
    pub close_count: AtomicUsize,
}

impl MockSession {
    pub fn new() -> Self {
        let session = Self::default();
        *session.foreground.lock().unwrap() = "cn.damai".to_string();
        session
    }

    pub fn add_element(&self, pattern: &str, id: &str, rect: ElementRect, text: &str) {
        self.elements.lock().unwrap().push(MockElement {
            id: id.to_string(),
            pattern: pattern.to_string(),
            rect,
            text: text.to_string(),
        });
    }

    /// Make any locator whose value contains `pattern` error at transport
    /// level instead of resolving.
    pub fn fault_on(&self, pattern: &str) {
        self.fault_patterns
            .lock()
            .unwrap()
            .insert(pattern.to_string());
    }

    pub fn fail_gesture_kind(&self, kind: GestureKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    /// Gestures recorded against a given element id.
    pub fn gestures_on(&self, id: &str) -> usize {
        self.gestures
            .lock()
            .unwrap()
            .iter()
            .filter(|g| matches!(&g.target, GestureTarget::Element(h) if h.id() == id))
            .count()
    }

    /// Coordinate taps recorded, in order.
    pub fn point_taps(&self) -> Vec<(i32, i32)> {
        self.gestures
            .lock()
            .unwrap()
            .iter()
            .filter_map(|g| match g.target {
                GestureTarget::Point { x, y } if g.kind == GestureKind::Tap => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    pub fn resolve_attempts(&self) -> Vec<String> {
        self.resolve_log.lock().unwrap().clone()
    }

    fn find_all(&self, locator: &Locator) -> Vec<MockElement> {
        let value = locator.value();
        self.elements
            .lock()
            .unwrap()
            .iter()
            .filter(|e| value.contains(&e.pattern))
            .cloned()
            .collect()
    }

    fn check_fault(&self, locator: &Locator) -> Result<(), SessionError> {
        let value = locator.value();
        let faults = self.fault_patterns.lock().unwrap();
        if faults.iter().any(|p| value.contains(p)) {
            return Err(SessionError::CommandFailed(format!(
                "scripted fault for {value}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationSession for MockSession {
    async fn resolve_element(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError> {
        self.resolve_log.lock().unwrap().push(locator.value());
        self.check_fault(locator)?;
        Ok(self
            .find_all(locator)
            .first()
            .map(|e| ElementHandle(e.id.clone())))
    }

    async fn resolve_elements(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        self.resolve_log.lock().unwrap().push(locator.value());
        self.check_fault(locator)?;
        Ok(self
            .find_all(locator)
            .into_iter()
            .map(|e| ElementHandle(e.id))
            .collect())
    }

    async fn element_rect(&self, handle: &ElementHandle) -> Result<ElementRect, SessionError> {
        self.elements
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == handle.id())
            .map(|e| e.rect)
            .ok_or_else(|| SessionError::CommandFailed("stale element".to_string()))
    }

    async fn element_text(
        &self,
        handle: &ElementHandle,
    ) -> Result<Option<String>, SessionError> {
        Ok(self
            .elements
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == handle.id())
            .map(|e| e.text.clone()))
    }

    async fn perform_gesture(
        &self,
        target: GestureTarget,
        kind: GestureKind,
        _duration_hint: Option<Duration>,
    ) -> Result<(), SessionError> {
        let fails = self.failing_kinds.lock().unwrap().contains(&kind);
        self.gestures.lock().unwrap().push(GestureRecord {
            target,
            kind,
        });
        if fails {
            return Err(SessionError::CommandFailed(format!(
                "scripted failure for {}",
                kind.name()
            )));
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn current_foreground_app(&self) -> Result<String, SessionError> {
        Ok(self.foreground.lock().unwrap().clone())
    }

    async fn activate_app(&self, identifier: &str) -> Result<(), SessionError> {
        *self.foreground.lock().unwrap() = identifier.to_string();
        Ok(())
    }

    async fn window_size(&self) -> Result<(i32, i32), SessionError> {
        Ok((1080, 2400))
    }

    async fn page_snapshot(&self) -> Result<String, SessionError> {
        Ok("<hierarchy/>".to_string())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Delegating wrapper so a test can keep an `Arc` to a session it handed to
/// the retry controller.
pub struct SharedSession(pub Arc<MockSession>);

#[async_trait]
impl AutomationSession for SharedSession {
    async fn resolve_element(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError> {
        self.0.resolve_element(locator, timeout).await
    }

    async fn resolve_elements(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        self.0.resolve_elements(locator, timeout).await
    }

    async fn element_rect(&self, handle: &ElementHandle) -> Result<ElementRect, SessionError> {
        self.0.element_rect(handle).await
    }

    async fn element_text(
        &self,
        handle: &ElementHandle,
    ) -> Result<Option<String>, SessionError> {
        self.0.element_text(handle).await
    }

    async fn perform_gesture(
        &self,
        target: GestureTarget,
        kind: GestureKind,
        duration_hint: Option<Duration>,
    ) -> Result<(), SessionError> {
        self.0.perform_gesture(target, kind, duration_hint).await
    }

    async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        self.0.type_text(text).await
    }

    async fn current_foreground_app(&self) -> Result<String, SessionError> {
        self.0.current_foreground_app().await
    }

    async fn activate_app(&self, identifier: &str) -> Result<(), SessionError> {
        self.0.activate_app(identifier).await
    }

    async fn window_size(&self) -> Result<(i32, i32), SessionError> {
        self.0.window_size().await
    }

    async fn page_snapshot(&self) -> Result<String, SessionError> {
        self.0.page_snapshot().await
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.0.close().await
    }
}

/// Hands out pre-scripted sessions in order; records how many were opened.
pub struct QueueFactory {
    sessions: Mutex<VecDeque<Arc<MockSession>>>,
    pub opens: AtomicUsize,
}

impl QueueFactory {
    pub fn new(sessions: Vec<Arc<MockSession>>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            opens: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionFactory for QueueFactory {
    async fn open(
        &self,
        _config: &SessionConfig,
    ) -> Result<Box<dyn AutomationSession>, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(session) => Ok(Box::new(SharedSession(session))),
            None => Err(SessionError::NotConnected),
        }
    }
}

/// A clock pinned to a fixed instant, for runs where the deadline already
/// passed and the wait must release immediately.
pub struct FixedClock(pub chrono::NaiveDateTime);

impl rushtix_core::deadline::Clock for FixedClock {
    fn now(&self) -> chrono::NaiveDateTime {
        self.0
    }
}

/// A clock reading one hour past the sample config's deadline.
pub fn past_deadline_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        chrono::NaiveDateTime::parse_from_str("2025-11-01 13:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
    ))
}

/// A standard rect for scripted elements.
pub fn rect(x: i32, y: i32) -> ElementRect {
    ElementRect {
        x,
        y,
        width: 100,
        height: 60,
    }
}

/// A config matching the scripted screens built by [`grab_screen`].
pub fn sample_config(users: &[&str], commit: bool) -> RunConfig {
    RunConfig {
        server_url: "http://127.0.0.1:4723".to_string(),
        keyword: "刘若英".to_string(),
        users: users.iter().map(|u| u.to_string()).collect(),
        city: "上海".to_string(),
        date: "2025-11-01".to_string(),
        time: "12:00:00".to_string(),
        price: "699".to_string(),
        price_index: 0,
        if_commit_order: commit,
    }
}

/// The session-factory config used by retry tests.
pub fn sample_session_config() -> SessionConfig {
    SessionConfig {
        server_url: "http://127.0.0.1:4723".to_string(),
        app_package: "cn.damai".to_string(),
        app_activity: ".launcher.splash.SplashMainActivity".to_string(),
    }
}

/// Script a full happy-path screen onto `session`: search surface, a result
/// for the sample keyword, detail indicators, city, date, two price tiers
/// (one sold out), an increment control, confirm, attendees, and submit.
pub fn grab_screen(session: &MockSession, users: &[&str]) {
    session.add_element("搜索", "search-box", rect(100, 80), "搜索");
    session.add_element("刘若英", "first-result", rect(100, 400), "刘若英 2025巡回演唱会");
    session.add_element("detail_title", "detail-title", rect(100, 120), "演出详情");
    session.add_element("上海", "city-shanghai", rect(200, 700), "上海 热卖中");
    session.add_element("2025-11-01", "date-item", rect(120, 900), "2025-11-01 周六 19:00");
    session.add_element("元", "tier-sold-out", rect(120, 1100), "899元 缺货登记");
    session.add_element("元", "tier-available", rect(120, 1200), "699元 看台");
    session.add_element("+", "plus-button", rect(900, 1400), "+");
    session.add_element("确定", "confirm-button", rect(540, 2200), "确定");
    for (i, user) in users.iter().enumerate() {
        session.add_element(
            user,
            &format!("attendee-{i}"),
            rect(80, 1500 + 100 * i as i32),
            user,
        );
    }
    session.add_element("提交", "submit-button", rect(540, 2300), "立即提交");
}
