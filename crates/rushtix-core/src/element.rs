//! Resolved UI element types.
//!
//! A [`ResolvedTarget`] is what the locator resolver hands to the action
//! executor: an optional remote element reference plus the element's on-screen
//! rectangle captured at resolution time. Targets are snapshots — any
//! navigation action invalidates them, and callers must re-resolve afterwards.

use serde::{Deserialize, Serialize};

/// Opaque reference to an element on the remote UI surface.
///
/// The inner id is only meaningful to the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    /// The remote element id, as issued by the automation surface.
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// An element's frame (position and size) in screen coordinates.
///
/// Origin is the top-left corner of the screen, units are pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    /// The x-coordinate of the element's top-left corner.
    pub x: i32,
    /// The y-coordinate of the element's top-left corner.
    pub y: i32,
    /// The width of the element in pixels.
    pub width: i32,
    /// The height of the element in pixels.
    pub height: i32,
}

impl ElementRect {
    /// A zero-size rect anchored at a point, used for coordinate locators.
    pub fn at_point(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            width: 0,
            height: 0,
        }
    }

    /// The midpoint of the rect — the coordinate a tap should land on.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// A UI target located by the resolver.
///
/// Owned by the resolution that produced it; not valid across any navigation
/// action.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Remote element reference. `None` when the matching candidate was a raw
    /// coordinate, in which case only coordinate techniques apply.
    pub handle: Option<ElementHandle>,
    /// The element's rectangle at resolution time.
    pub rect: ElementRect,
    /// Index of the locator candidate that matched, within its list.
    pub candidate_index: usize,
}

impl ResolvedTarget {
    /// Builds a synthetic target for a raw-coordinate candidate.
    pub fn at_point(x: i32, y: i32, candidate_index: usize) -> Self {
        Self {
            handle: None,
            rect: ElementRect::at_point(x, y),
            candidate_index,
        }
    }
}
