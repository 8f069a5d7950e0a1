//! Execution queue
//!
//! [`ExecutionQueue`] bounds how many async jobs run at once.
//! [`JobQueue`] layers typed, recorded jobs on top of it.

pub mod executor;
pub mod job;
pub mod store;
pub mod typed;

pub use executor::{ExecutionQueue, QueueStatus};
pub use job::{JobFilter, JobStatus, JobTransition, QueueJob};
pub use store::{InMemoryJobStore, JobStore, SqliteJobStore};
pub use typed::{handler_fn, FnHandler, JobHandler, JobQueue, QueueEvent};
