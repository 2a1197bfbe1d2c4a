//! `chime-scheduler`: cron-driven HTTP job engine.
//!
//! # Overview
//!
//! The [`engine::Scheduler`] owns one Tokio trigger task per active job.
//! Each trigger sleeps until the job's next cron instant, then spawns an
//! execution: re-read the job, record a `pending` execution, POST to the
//! job's target through the [`dispatch::HttpDispatcher`] (with bounded
//! retries), and drive the record to `success` or `failed`. Failures are
//! pushed to the in-memory [`alerts::AlertLog`].
//!
//! Executions are deliberately not serialised per job: a slow target never
//! delays the next fire, so overlapping runs of the same job can coexist
//! as independent records.

pub mod alerts;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod schedule;

pub use alerts::{Alert, AlertLog};
pub use dispatch::{DispatchOutcome, HttpDispatcher};
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
