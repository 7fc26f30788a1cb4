//! # parcelq-rs
//!
//! Postgres-backed dispatch queue for parcel analysis report generation.
//!
//! One durable store, stateless logic over it: a work item store, an atomic
//! lease protocol (`FOR UPDATE SKIP LOCKED`), priority dispatch, bounded
//! retries with backoff, and a janitor that reclaims leases from crashed
//! workers. Report generation itself is an external worker's job.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod janitor;
pub mod model;
pub mod recorder;
pub mod retry;
pub mod telemetry;
