pub mod config;
pub mod error;
pub mod types;

pub use config::ChimeConfig;
pub use error::{ChimeError, Result};
pub use types::{DeliveryMode, Execution, ExecutionId, ExecutionStatus, Job, JobId};
