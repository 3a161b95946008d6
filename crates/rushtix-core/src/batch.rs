//! Two-phase batch tapping for sets of same-shaped targets.
//!
//! Used where several independent targets (the attendee checkboxes) must all
//! be activated quickly: phase one resolves geometry for every target up
//! front, phase two fires coordinate taps in rapid succession. Splitting the
//! phases keeps the expensive resolution work out of the time-critical tap
//! burst, and a target that fails to resolve is simply dropped rather than
//! holding up the rest.

use tracing::{debug, info, warn};

use crate::config::Timings;
use crate::executor::ActionExecutor;
use crate::locator::LocatorList;
use crate::resolver::{LocatorResolver, Resolution};
use crate::session::AutomationSession;

/// A batch entry: a human-readable label plus how to find the target.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub label: String,
    pub locators: LocatorList,
}

impl BatchItem {
    pub fn new(label: impl Into<String>, locators: impl Into<LocatorList>) -> Self {
        Self {
            label: label.into(),
            locators: locators.into(),
        }
    }
}

/// Resolves a set of targets, then taps the resolved subset in order.
pub struct BatchCoordinator<'a> {
    session: &'a dyn AutomationSession,
    timings: Timings,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(session: &'a dyn AutomationSession, timings: Timings) -> Self {
        Self { session, timings }
    }

    /// Run both phases and return the labels actually tapped.
    ///
    /// Taps happen in the original input order, separated by
    /// [`Timings::inter_action_delay`] (no trailing delay). A tap that fails
    /// at the transport level is logged and does not stop the burst.
    pub async fn tap_all(&self, items: &[BatchItem]) -> Vec<String> {
        let resolver = LocatorResolver::new(self.session, self.timings);
        let executor = ActionExecutor::new(self.session, self.timings);

        // Phase 1: collect geometry; misses are isolated, not fatal.
        let mut resolved = Vec::new();
        for item in items {
            match resolver.resolve(&item.locators).await {
                Resolution::Found(target) => {
                    let (x, y) = target.rect.center();
                    debug!(label = %item.label, x, y, "batch target resolved");
                    resolved.push((item.label.clone(), x, y));
                }
                Resolution::NotFound => {
                    warn!(label = %item.label, "batch target not found, dropping");
                }
            }
        }
        info!(
            requested = items.len(),
            resolved = resolved.len(),
            "batch resolution complete"
        );

        // Phase 2: rapid ordered taps against the resolved subset.
        let mut tapped = Vec::new();
        for (i, (label, x, y)) in resolved.iter().enumerate() {
            match executor.tap_point(*x, *y).await {
                Ok(()) => {
                    debug!(%label, "batch tap issued");
                    tapped.push(label.clone());
                }
                Err(e) => {
                    warn!(%label, error = %e, "batch tap failed");
                }
            }
            if i < resolved.len() - 1 {
                tokio::time::sleep(self.timings.inter_action_delay).await;
            }
        }
        tapped
    }
}
