pub mod db;
pub mod error;
pub mod executions;
pub mod jobs;

pub use error::{Result, StoreError};
pub use executions::{ExecutionStats, ExecutionStore};
pub use jobs::{JobCounts, JobStore};
