//! # rushtix-core
//!
//! Core engine for time-critical ticket-grabbing automation against a remote
//! Android UI surface (Appium/UiAutomator2-style).
//!
//! The engine assumes the remote surface is unreliable and slow: any single
//! locator strategy or click technique may silently fail, yet one step of the
//! run must land on a millisecond-sensitive wall-clock deadline. Everything
//! here is built around ordered fallback and bounded retry.
//!
//! ## Modules
//!
//! - [`locator`] - Typed locator strategies and prioritized candidate lists
//! - [`element`] - Resolved targets and screen geometry
//! - [`session`] - The [`AutomationSession`](session::AutomationSession)
//!   capability trait implemented by transport crates
//! - [`resolver`] - First-match-wins resolution over candidate lists
//! - [`executor`] - The four-technique action cascade
//! - [`batch`] - Two-phase resolve-then-tap batches
//! - [`deadline`] - Wall-clock deadline synchronization
//! - [`flow`] - The end-to-end workflow stage pipeline
//! - [`retry`] - Bounded whole-session retry with guaranteed release
//! - [`config`] - Run configuration and timing knobs
//!
//! All remote interaction is strictly sequential; the engine never issues
//! concurrent actions against a session.

pub mod batch;
pub mod config;
pub mod deadline;
pub mod element;
pub mod executor;
pub mod flow;
pub mod locator;
pub mod resolver;
pub mod retry;
pub mod session;
