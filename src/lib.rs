//! Statistical alert detection and governance for student behaviour tracking.
//!
//! Tracking entries are aggregated by [`ingest`], scored by the [`detectors`], turned into
//! alerts by [`alerts`] and filtered by [`policy`] before anything is shown to staff.

pub mod alerts;
pub mod config;
pub mod detectors;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod statistics;
pub mod tuning;
pub mod validate;
