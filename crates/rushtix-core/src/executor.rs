//! Action execution through a cascade of interaction techniques.
//!
//! Any single click technique may silently fail against a laggy remote
//! surface, so the executor tries a fixed priority order — fast element
//! gesture, direct activation, scripted gesture, coordinate tap at the rect
//! center — and stops at the first one that sticks. A technique's failure is
//! logged and swallowed; only exhausting the whole cascade counts as failure.

use std::time::Duration;

use tracing::{debug, info_span, Instrument};

use crate::config::Timings;
use crate::element::ResolvedTarget;
use crate::session::{AutomationSession, GestureKind, GestureTarget, SessionError};

/// One interaction technique, in cascade priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Technique {
    /// Fast click gesture addressed by element id.
    ElementGesture,
    /// Direct activation on the element itself.
    DirectActivation,
    /// Scripted gesture by element id.
    ScriptedGesture,
    /// Tap at the center of the target's rectangle.
    CoordinateTap,
}

impl Technique {
    /// The default cascade, highest priority first.
    pub const CASCADE: [Technique; 4] = [
        Technique::ElementGesture,
        Technique::DirectActivation,
        Technique::ScriptedGesture,
        Technique::CoordinateTap,
    ];

    /// Short name for tracing fields.
    pub fn name(&self) -> &'static str {
        match self {
            Technique::ElementGesture => "element_gesture",
            Technique::DirectActivation => "direct_activation",
            Technique::ScriptedGesture => "scripted_gesture",
            Technique::CoordinateTap => "coordinate_tap",
        }
    }

    fn gesture_kind(&self) -> GestureKind {
        match self {
            Technique::ElementGesture => GestureKind::FastTap,
            Technique::DirectActivation => GestureKind::Activate,
            Technique::ScriptedGesture => GestureKind::ScriptedTap,
            Technique::CoordinateTap => GestureKind::Tap,
        }
    }
}

/// Result of one cascade run: which technique succeeded, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    technique: Option<Technique>,
}

impl ActionOutcome {
    pub fn succeeded_via(technique: Technique) -> Self {
        Self {
            technique: Some(technique),
        }
    }

    pub fn exhausted() -> Self {
        Self { technique: None }
    }

    pub fn succeeded(&self) -> bool {
        self.technique.is_some()
    }

    /// The technique that landed the action.
    pub fn technique(&self) -> Option<Technique> {
        self.technique
    }
}

/// Drives the technique cascade against one live session.
pub struct ActionExecutor<'a> {
    session: &'a dyn AutomationSession,
    timings: Timings,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(session: &'a dyn AutomationSession, timings: Timings) -> Self {
        Self { session, timings }
    }

    /// Run the default cascade against a resolved target.
    pub async fn tap(&self, target: &ResolvedTarget) -> ActionOutcome {
        self.tap_with(target, &Technique::CASCADE).await
    }

    /// Run a custom cascade against a resolved target.
    ///
    /// Element-addressed techniques are skipped when the target carries no
    /// handle (raw-coordinate resolutions). Each attempt is independently
    /// time-boxed by [`Timings::technique_timeout`].
    pub async fn tap_with(&self, target: &ResolvedTarget, cascade: &[Technique]) -> ActionOutcome {
        let span = info_span!("tap_cascade", candidate = target.candidate_index);
        async {
            for &technique in cascade {
                let gesture_target = match (technique, &target.handle) {
                    (Technique::CoordinateTap, _) => {
                        let (x, y) = target.rect.center();
                        GestureTarget::Point { x, y }
                    }
                    (_, Some(handle)) => GestureTarget::Element(handle.clone()),
                    // No handle to address; only the coordinate tap applies.
                    (_, None) => continue,
                };

                match self.attempt(gesture_target, technique).await {
                    Ok(()) => {
                        debug!(technique = technique.name(), "technique succeeded");
                        return ActionOutcome::succeeded_via(technique);
                    }
                    Err(e) => {
                        debug!(technique = technique.name(), error = %e, "technique failed, cascading");
                    }
                }
            }
            ActionOutcome::exhausted()
        }
        .instrument(span)
        .await
    }

    /// Bare coordinate tap, bypassing element resolution entirely.
    ///
    /// Used for screen-relative positions where no stable locator exists.
    pub async fn tap_point(&self, x: i32, y: i32) -> Result<(), SessionError> {
        self.time_boxed(self.session.perform_gesture(
            GestureTarget::Point { x, y },
            GestureKind::Tap,
            Some(self.timings.tap_duration),
        ))
        .await
    }

    async fn attempt(
        &self,
        target: GestureTarget,
        technique: Technique,
    ) -> Result<(), SessionError> {
        let duration_hint = match technique {
            Technique::CoordinateTap => Some(self.timings.tap_duration),
            _ => None,
        };
        self.time_boxed(
            self.session
                .perform_gesture(target, technique.gesture_kind(), duration_hint),
        )
        .await
    }

    async fn time_boxed<F>(&self, fut: F) -> Result<(), SessionError>
    where
        F: std::future::Future<Output = Result<(), SessionError>>,
    {
        match tokio::time::timeout(self.timings.technique_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        }
    }

    /// The technique budget, exposed for stage-level accounting.
    pub fn technique_timeout(&self) -> Duration {
        self.timings.technique_timeout
    }
}
