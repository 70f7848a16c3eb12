//! `flagcore`: the server-side feature-flag and experiment evaluation engine
//! of an A/B testing SDK.
//!
//! This crate answers "which variant of which flag applies to this
//! user/group right now?" without a network call on the hot path, by
//! continuously synchronizing flag configurations and cohort memberships
//! from a remote control plane into local memory.
//!
//! # Overview
//!
//! - [`eval`] is the pure evaluator: flag configuration set + evaluation
//!   context -> variant assignments.
//! - [`flags`] and [`cohort`] hold the background synchronization
//!   subsystem: pollers, an SSE streamer, a fallback/retry state machine,
//!   and a deduplicating bulk cohort downloader.
//! - [`events`] and [`dedup`] convert evaluation results into analytics
//!   events, suppressing duplicates with a TTL-expiring LRU.
//! - [`runner::DeploymentRunner`] starts and stops the synchronization
//!   subsystem; [`client::LocalEvaluationClient`] is the public façade
//!   wiring all of the above together behind a single `evaluate` call.
//! - [`remote::RemoteEvaluationClient`] is a minimal alternative for
//!   callers who want one-shot server-side evaluation instead of
//!   synchronizing flags locally.
//!
//! Most callers only need [`client::LocalEvaluationClient`], [`config`],
//! and [`context::EvaluationContext`].

pub mod client;
pub mod cohort;
pub mod config;
pub mod context;
pub mod cookie;
pub mod dedup;
pub mod error;
pub mod eval;
pub mod events;
pub mod flags;
pub mod hashing;
pub mod model;
pub mod remote;
pub mod runner;
pub mod selector;
pub mod semver;
pub mod value;

pub use client::{EvaluateOptions, LocalEvaluationClient};
pub use config::{LocalEvaluationConfig, ServerZone};
pub use context::EvaluationContext;
pub use error::{Error, Result};
pub use remote::{FetchOptions, RemoteEvaluationClient, RemoteEvaluationConfig};
