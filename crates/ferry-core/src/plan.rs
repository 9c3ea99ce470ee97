//! Parsed build plan.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Result;

/// Executable representation of a repository's build configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Container image the script runs in.
    #[serde(default)]
    pub image: String,
    /// Extra `/etc/hosts` entries.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Environment entries in `KEY=value` form.
    #[serde(default)]
    pub env: Vec<String>,
    /// Shell commands, run in order.
    #[serde(default)]
    pub script: Vec<String>,
    /// Service images started next to the build container.
    #[serde(default)]
    pub services: Vec<String>,
}

impl BuildPlan {
    /// Environment entries split into key/value pairs.
    ///
    /// Entries without `=` are passed through with an empty value.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (entry.clone(), String::new()),
            })
            .collect()
    }
}

/// Turns raw configuration bytes into a [`BuildPlan`].
///
/// Failures are reported as [`crate::Error::ConfigParse`] carrying the
/// parser's diagnostic text.
pub trait PlanParser: Send + Sync {
    fn parse(&self, data: &[u8], params: &HashMap<String, String>) -> Result<BuildPlan>;
}
