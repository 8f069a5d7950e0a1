//! Switchboard - specialist routing core
//!
//! A capacity-bounded registry of specialists, a plan builder that turns a
//! routing decision into ordered levels, a delegation resolver that narrows
//! delegators down to leaves, and a bounded job queue that runs the result.

pub mod config;
pub mod delegation;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod planning;
pub mod queue;
pub mod registry;

pub use config::HeapConfig;
pub use error::{HeapError, Result};
