//! Runtime configuration
//!
//! Caps for the specialist heap, resolver limits and queue concurrency.
//! Values come from defaults, a JSON file, or `SWITCHBOARD_*` environment
//! variables layered on top.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HeapError, Result};
use crate::registry::RegistryCaps;

pub const ENV_MAX_TOOLS: &str = "SWITCHBOARD_MAX_TOOLS";
pub const ENV_MAX_CHILDREN: &str = "SWITCHBOARD_MAX_CHILDREN";
pub const ENV_MAX_TOP_LEVEL: &str = "SWITCHBOARD_MAX_TOP_LEVEL";
pub const ENV_DEPTH_LIMIT: &str = "SWITCHBOARD_DEPTH_LIMIT";
pub const ENV_OPTIONS_CAP: &str = "SWITCHBOARD_OPTIONS_CAP";
pub const ENV_QUEUE_CONCURRENCY: &str = "SWITCHBOARD_QUEUE_CONCURRENCY";

/// Top-level configuration for every component of the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeapConfig {
    /// K: tools a single leaf specialist may own
    pub max_tools_per_leaf: usize,
    /// D: children a single delegator may own
    pub max_children: usize,
    /// T: specialists visible to the router
    pub max_top_level: usize,
    /// Descents the delegation resolver may take before giving up
    pub depth_limit: usize,
    /// Options offered to a chooser at each step
    pub options_cap: usize,
    /// Jobs the execution queue runs at once
    pub queue_concurrency: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            max_tools_per_leaf: 10,
            max_children: 8,
            max_top_level: 12,
            depth_limit: 4,
            options_cap: 8,
            queue_concurrency: 2,
        }
    }
}

impl HeapConfig {
    /// Defaults overlaid with any `SWITCHBOARD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: HeapConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values produced by `lookup` on top of `self`
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut usize); 6] = [
            (ENV_MAX_TOOLS, &mut self.max_tools_per_leaf),
            (ENV_MAX_CHILDREN, &mut self.max_children),
            (ENV_MAX_TOP_LEVEL, &mut self.max_top_level),
            (ENV_DEPTH_LIMIT, &mut self.depth_limit),
            (ENV_OPTIONS_CAP, &mut self.options_cap),
            (ENV_QUEUE_CONCURRENCY, &mut self.queue_concurrency),
        ];

        for (key, slot) in fields {
            if let Some(raw) = lookup(key) {
                *slot = raw
                    .trim()
                    .parse()
                    .map_err(|e| HeapError::Config(format!("{}={:?}: {}", key, raw, e)))?;
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Every cap except the depth limit must be at least one
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("maxToolsPerLeaf", self.max_tools_per_leaf),
            ("maxChildren", self.max_children),
            ("maxTopLevel", self.max_top_level),
            ("optionsCap", self.options_cap),
            ("queueConcurrency", self.queue_concurrency),
        ];
        for (name, value) in required {
            if value == 0 {
                return Err(HeapError::Config(format!("{} must be greater than 0", name)));
            }
        }
        // A single delegator level needs room for at least two children,
        // otherwise grouping never shrinks the child list.
        if self.max_children < 2 {
            return Err(HeapError::Config("maxChildren must be at least 2".to_string()));
        }
        Ok(())
    }

    pub fn registry_caps(&self) -> RegistryCaps {
        RegistryCaps {
            max_tools: self.max_tools_per_leaf,
            max_children: self.max_children,
            max_top_level: self.max_top_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HeapConfig::default();
        assert_eq!(config.max_tools_per_leaf, 10);
        assert_eq!(config.queue_concurrency, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlay_from_lookup() {
        let config = HeapConfig::default()
            .overlay(lookup_from(&[
                (ENV_MAX_TOOLS, "5"),
                (ENV_QUEUE_CONCURRENCY, " 4 "),
            ]))
            .unwrap();
        assert_eq!(config.max_tools_per_leaf, 5);
        assert_eq!(config.queue_concurrency, 4);
        assert_eq!(config.max_children, 8);
    }

    #[test]
    fn test_overlay_rejects_garbage() {
        let result = HeapConfig::default().overlay(lookup_from(&[(ENV_DEPTH_LIMIT, "deep")]));
        assert!(matches!(result, Err(HeapError::Config(_))));
    }

    #[test]
    fn test_overlay_rejects_zero_concurrency() {
        let result =
            HeapConfig::default().overlay(lookup_from(&[(ENV_QUEUE_CONCURRENCY, "0")]));
        assert!(matches!(result, Err(HeapError::Config(_))));
    }

    #[test]
    fn test_zero_depth_limit_is_allowed() {
        let config = HeapConfig::default()
            .overlay(lookup_from(&[(ENV_DEPTH_LIMIT, "0")]))
            .unwrap();
        assert_eq!(config.depth_limit, 0);
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxTopLevel": 3, "depthLimit": 2}}"#).unwrap();

        let config = HeapConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_top_level, 3);
        assert_eq!(config.depth_limit, 2);
        assert_eq!(config.options_cap, 8);
    }

    #[test]
    fn test_registry_caps() {
        let caps = HeapConfig::default().registry_caps();
        assert_eq!(caps.max_tools, 10);
        assert_eq!(caps.max_children, 8);
        assert_eq!(caps.max_top_level, 12);
    }
}
