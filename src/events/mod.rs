//! Converts evaluation results into analytics events: one emitter for the
//! current exposure-tracking event, one for the deprecated per-flag
//! assignment event, both gated by a [`crate::dedup::DedupFilter`] and
//! forwarded to an [`AnalyticsSink`].

mod assignment;
mod canonical;
mod event;
mod exposure;
mod sink;

pub use assignment::{Assignment as AssignmentEvent, AssignmentService};
pub use event::{Event, UserProperties};
pub use exposure::{Exposure, ExposureService};
pub use sink::AnalyticsSink;
