//! Delegation resolver
//!
//! Narrows delegators down to leaf specialists by asking a chooser to pick
//! among a capped set of children, one level at a time. The depth limit is
//! the only circuit breaker: it fires even when the chooser never stops.
//!
//! The resolver does no I/O of its own. Chooser errors propagate unchanged;
//! an invalid or missing choice simply ends the descent.

use std::sync::Arc;

use super::chooser::{AsyncChooser, Chooser};
use crate::config::HeapConfig;
use crate::error::Result;
use crate::planning::HeapStep;
use crate::registry::SpecialistRegistry;

/// Walks a registry snapshot on behalf of a chooser
#[derive(Debug, Clone)]
pub struct DelegationResolver {
    registry: Arc<SpecialistRegistry>,
    depth_limit: usize,
    options_cap: usize,
}

impl DelegationResolver {
    pub fn new(registry: Arc<SpecialistRegistry>, config: &HeapConfig) -> Self {
        Self::with_limits(registry, config.depth_limit, config.options_cap)
    }

    pub fn with_limits(
        registry: Arc<SpecialistRegistry>,
        depth_limit: usize,
        options_cap: usize,
    ) -> Self {
        Self {
            registry,
            depth_limit,
            options_cap: options_cap.max(1),
        }
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    pub fn depth_limit(&self) -> usize {
        self.depth_limit
    }

    /// Children of `node` offered to a chooser, capped
    pub fn options(&self, node: Option<&str>) -> Vec<String> {
        let mut options = self.registry.children(node);
        options.truncate(self.options_cap);
        options
    }

    /// Descend from the root (the primary top-level ids). Returns the ids
    /// chosen, at most `depth_limit + 1` of them.
    pub fn search_path<C>(&self, chooser: &C) -> Result<Vec<String>>
    where
        C: Chooser + ?Sized,
    {
        self.walk(None, chooser, false)
    }

    /// Descend from `start`; with `stop_at_leaf` the walk ends as soon as a
    /// leaf is chosen.
    pub fn search_path_from<C>(
        &self,
        start: &str,
        chooser: &C,
        stop_at_leaf: bool,
    ) -> Result<Vec<String>>
    where
        C: Chooser + ?Sized,
    {
        self.walk(Some(start), chooser, stop_at_leaf)
    }

    fn walk<C>(&self, start: Option<&str>, chooser: &C, stop_at_leaf: bool) -> Result<Vec<String>>
    where
        C: Chooser + ?Sized,
    {
        let mut path = Vec::new();
        let mut node = start.map(str::to_string);

        for depth in 0..=self.depth_limit {
            let options = self.options(node.as_deref());
            if options.is_empty() {
                break;
            }

            let Some(choice) = chooser.choose(&options, depth)? else {
                break;
            };
            if !options.contains(&choice) {
                tracing::debug!(choice = %choice, depth, "chooser picked an id it was not offered");
                break;
            }

            path.push(choice.clone());
            if stop_at_leaf && self.registry.is_leaf(&choice) {
                break;
            }
            node = Some(choice);
        }

        Ok(path)
    }

    /// Replace every delegator id in `priority_order` with the leaf the
    /// chooser narrows it to. Step shapes are preserved. An id that cannot be
    /// narrowed further (no children, invalid choice, depth exhausted) is kept
    /// as is, even when it still names a delegator.
    pub async fn expand_to_leaves(
        &self,
        priority_order: &[HeapStep],
        task: &str,
        chooser: &dyn AsyncChooser,
    ) -> Result<Vec<HeapStep>> {
        let mut expanded = Vec::with_capacity(priority_order.len());

        for step in priority_order {
            let step = match step {
                HeapStep::Single(id) => HeapStep::Single(self.resolve_id(id, task, chooser).await?),
                HeapStep::Parallel { parallel } => {
                    let mut ids = Vec::with_capacity(parallel.len());
                    for id in parallel {
                        ids.push(self.resolve_id(id, task, chooser).await?);
                    }
                    HeapStep::Parallel { parallel: ids }
                }
            };
            expanded.push(step);
        }

        Ok(expanded)
    }

    /// Narrow a single id as far as the chooser and depth limit allow
    pub async fn resolve_id(
        &self,
        id: &str,
        task: &str,
        chooser: &dyn AsyncChooser,
    ) -> Result<String> {
        let mut current = id.to_string();
        let mut depth = 0;

        while depth < self.depth_limit && self.registry.is_delegator(&current) {
            let options = self.options(Some(&current));
            if options.is_empty() {
                break;
            }

            match chooser.choose(&options, task, &current).await? {
                Some(choice) if options.contains(&choice) => {
                    tracing::debug!(from = %current, to = %choice, depth, "delegator narrowed");
                    current = choice;
                }
                other => {
                    tracing::debug!(id = %current, choice = ?other, "delegation stopped");
                    break;
                }
            }
            depth += 1;
        }

        Ok(current)
    }
}
