//! Ordered locator resolution with first-match-wins semantics.
//!
//! The resolver walks a [`LocatorList`] strictly in order, giving each
//! candidate its own time budget, and stops at the first match. A candidate
//! that times out or fails at the transport level is a non-match, never a
//! fatal error; exhaustion yields [`Resolution::NotFound`].

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Timings;
use crate::element::ResolvedTarget;
use crate::locator::{Locator, LocatorList};
use crate::session::AutomationSession;

/// Outcome of one resolution pass over a candidate list.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The first matching candidate, annotated with its index.
    Found(ResolvedTarget),
    /// Every candidate missed within budget.
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    /// The target, if one was found.
    pub fn target(self) -> Option<ResolvedTarget> {
        match self {
            Resolution::Found(target) => Some(target),
            Resolution::NotFound => None,
        }
    }
}

/// Resolves locator candidate lists against one live session.
pub struct LocatorResolver<'a> {
    session: &'a dyn AutomationSession,
    timings: Timings,
}

impl<'a> LocatorResolver<'a> {
    pub fn new(session: &'a dyn AutomationSession, timings: Timings) -> Self {
        Self { session, timings }
    }

    /// Attempt each candidate in order with the default per-candidate budget.
    pub async fn resolve(&self, candidates: &LocatorList) -> Resolution {
        self.resolve_within(candidates, self.timings.locate_timeout, None)
            .await
    }

    /// Attempt each candidate in order.
    ///
    /// Each candidate gets up to `per_candidate`; when `overall` is set the
    /// whole pass additionally stops once that budget is spent, whichever is
    /// smaller. Returns the first hit with the matching candidate's index.
    pub async fn resolve_within(
        &self,
        candidates: &LocatorList,
        per_candidate: Duration,
        overall: Option<Duration>,
    ) -> Resolution {
        let started = Instant::now();

        for (index, locator) in candidates.iter().enumerate() {
            // Raw coordinates need no remote lookup.
            if let Locator::Coordinate { x, y } = *locator {
                debug!(candidate = index, %locator, "coordinate candidate, resolved synthetically");
                return Resolution::Found(ResolvedTarget::at_point(x, y, index));
            }

            let budget = match overall {
                Some(total) => {
                    let remaining = total.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        debug!(candidate = index, "overall resolution budget exhausted");
                        return Resolution::NotFound;
                    }
                    per_candidate.min(remaining)
                }
                None => per_candidate,
            };

            match self.session.resolve_element(locator, budget).await {
                Ok(Some(handle)) => match self.session.element_rect(&handle).await {
                    Ok(rect) => {
                        debug!(candidate = index, %locator, ?rect, "candidate matched");
                        return Resolution::Found(ResolvedTarget {
                            handle: Some(handle),
                            rect,
                            candidate_index: index,
                        });
                    }
                    // The element vanished between lookup and geometry; treat
                    // as a miss and keep going.
                    Err(e) => {
                        warn!(candidate = index, %locator, error = %e, "rect lookup failed, skipping candidate");
                    }
                },
                Ok(None) => {
                    debug!(candidate = index, %locator, "candidate missed");
                }
                Err(e) => {
                    warn!(candidate = index, %locator, error = %e, "transport fault, treated as non-match");
                }
            }
        }

        Resolution::NotFound
    }

    /// Resolve every element matching a single locator.
    ///
    /// Used where a stage needs the full set of same-shaped matches (ticket
    /// tiers). Transport faults yield an empty list, same as a miss.
    pub async fn resolve_all(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Vec<crate::element::ElementHandle> {
        match self.session.resolve_elements(locator, timeout).await {
            Ok(handles) => handles,
            Err(e) => {
                warn!(%locator, error = %e, "transport fault while listing matches");
                Vec::new()
            }
        }
    }

    /// Convenience: resolve, swallowing the distinction into an `Option`.
    pub async fn first_match(&self, candidates: &LocatorList) -> Option<ResolvedTarget> {
        self.resolve(candidates).await.target()
    }
}
