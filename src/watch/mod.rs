// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Deciding which paths may be watched at all (`filter`).
//! - Debouncing bursts of raw notifications (`aggregator`).
//! - Keeping the set of subscribed paths equal to the last good build's
//!   dependency graph (`watch_set`).
//! - Wiring up the cross-platform filesystem watcher (`backend`, via `notify`).
//!
//! It does **not** know about builds or lifecycle events; the engine drives
//! it from the outside.

pub mod aggregator;
pub mod backend;
pub mod filter;
pub mod path_utils;
pub mod watch_set;

pub use aggregator::{ChangeAggregator, ChangeKind, PendingChange, RawChange, DEFAULT_DEBOUNCE};
pub use backend::{FsNotifier, NotifyBackend, SubscriptionHandle};
pub use filter::PathFilter;
pub use watch_set::{ReconcileReport, ReconcileRequest, WatchSet, WatchSetManager};
