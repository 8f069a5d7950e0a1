//! Choosers
//!
//! The decision maker at each routing or delegation step lives outside the
//! core: an LLM call, a human, or a deterministic stub. A chooser returns
//! one of the offered ids, or `None` (or anything not offered) to stop.

use async_trait::async_trait;

use crate::error::Result;

/// Synchronous chooser used by path search
pub trait Chooser {
    fn choose(&self, options: &[String], depth: usize) -> Result<Option<String>>;
}

impl<F> Chooser for F
where
    F: Fn(&[String], usize) -> Option<String>,
{
    fn choose(&self, options: &[String], depth: usize) -> Result<Option<String>> {
        Ok(self(options, depth))
    }
}

/// Asynchronous chooser used when expanding delegators in a plan
#[async_trait]
pub trait AsyncChooser: Send + Sync {
    /// Pick one of `options` for `task`, on behalf of delegator `parent_id`
    async fn choose(&self, options: &[String], task: &str, parent_id: &str)
        -> Result<Option<String>>;
}

/// Always picks the first option. Deterministic stand-in for a real chooser.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstOption;

#[async_trait]
impl AsyncChooser for FirstOption {
    async fn choose(
        &self,
        options: &[String],
        _task: &str,
        _parent_id: &str,
    ) -> Result<Option<String>> {
        Ok(options.first().cloned())
    }
}
