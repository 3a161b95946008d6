//! Typed locator strategies for finding UI targets.
//!
//! A [`Locator`] is a tagged description of how to find an element on the
//! remote surface: by Android resource id, XPath expression, accessibility
//! description, UiAutomator query expression, or a raw screen coordinate.
//! Callers construct the variant they mean directly — there is no runtime
//! string-prefix sniffing.
//!
//! A [`LocatorList`] is an ordered candidate sequence. Order encodes priority:
//! the resolver takes the first structural match and never looks for a "best"
//! one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One strategy for locating a UI target.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value")]
pub enum Locator {
    /// Android resource id, e.g. `cn.damai:id/search_bar`.
    StructuralId(String),
    /// XPath expression over the view hierarchy.
    Path(String),
    /// Accessibility / content description.
    Descriptor(String),
    /// UiAutomator query expression, e.g. `new UiSelector().text("…")`.
    Query(String),
    /// Raw screen coordinate; resolves without touching the remote surface.
    Coordinate { x: i32, y: i32 },
}

impl Locator {
    /// Shorthand for a [`Locator::StructuralId`].
    pub fn id(value: impl Into<String>) -> Self {
        Locator::StructuralId(value.into())
    }

    /// Shorthand for a [`Locator::Path`].
    pub fn xpath(value: impl Into<String>) -> Self {
        Locator::Path(value.into())
    }

    /// Shorthand for a [`Locator::Descriptor`].
    pub fn description(value: impl Into<String>) -> Self {
        Locator::Descriptor(value.into())
    }

    /// A UiAutomator `text("…")` exact-match query.
    pub fn text(value: &str) -> Self {
        Locator::Query(format!("new UiSelector().text(\"{value}\")"))
    }

    /// A UiAutomator `textContains("…")` query.
    pub fn text_contains(value: &str) -> Self {
        Locator::Query(format!("new UiSelector().textContains(\"{value}\")"))
    }

    /// Shorthand for a [`Locator::Coordinate`].
    pub fn point(x: i32, y: i32) -> Self {
        Locator::Coordinate { x, y }
    }

    /// The strategy's value string; coordinates render as `x,y`.
    ///
    /// Used for log lines and for matching in tests; the resolver dispatches
    /// on the variant, never on this string.
    pub fn value(&self) -> String {
        match self {
            Locator::StructuralId(v)
            | Locator::Path(v)
            | Locator::Descriptor(v)
            | Locator::Query(v) => v.clone(),
            Locator::Coordinate { x, y } => format!("{x},{y}"),
        }
    }

    /// Short strategy name for tracing fields.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::StructuralId(_) => "id",
            Locator::Path(_) => "xpath",
            Locator::Descriptor(_) => "description",
            Locator::Query(_) => "query",
            Locator::Coordinate { .. } => "coordinate",
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

/// Ordered locator candidates; first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorList(pub Vec<Locator>);

impl LocatorList {
    pub fn new(candidates: Vec<Locator>) -> Self {
        Self(candidates)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Locator> {
        self.0.iter()
    }
}

impl From<Vec<Locator>> for LocatorList {
    fn from(candidates: Vec<Locator>) -> Self {
        Self(candidates)
    }
}

impl<'a> IntoIterator for &'a LocatorList {
    type Item = &'a Locator;
    type IntoIter = std::slice::Iter<'a, Locator>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
