//! System configuration parsing.

use crate::{ConfigError, ConfigResult};
use ferry_core::DEFAULT_CONFIG_PATH;
use kdl::{KdlDocument, KdlNode};
use std::path::Path;
use std::time::Duration;

/// Process-wide settings read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    /// Number of concurrent build workers.
    pub workers: usize,
    /// Address the HTTP server binds to.
    pub listen: String,
    /// PostgreSQL URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Path of the build configuration inside repositories.
    pub config_path: String,
    /// Upper bound on how long a trigger waits for its build.
    pub wait_timeout: Option<Duration>,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            listen: "0.0.0.0:3000".to_string(),
            database_url: None,
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            wait_timeout: None,
            webhook_secret: None,
        }
    }
}

impl SystemConfig {
    /// Read and parse a KDL configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        parse_system_config(&text)
    }
}

/// Parse system configuration from KDL text.
///
/// Nodes that are not present keep their default values.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "workers" => {
                let workers = get_first_integer_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("workers count".to_string()))?;
                if workers < 1 {
                    return Err(ConfigError::InvalidValue {
                        field: "workers".to_string(),
                        message: format!("must be at least 1, got {}", workers),
                    });
                }
                config.workers = usize::try_from(workers).map_err(|_| ConfigError::InvalidValue {
                    field: "workers".to_string(),
                    message: format!("{} is too large", workers),
                })?;
            }
            "listen" => {
                config.listen = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("listen address".to_string()))?;
            }
            "database-url" => {
                config.database_url = get_first_string_arg(node);
            }
            "config-path" => {
                config.config_path = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("config-path value".to_string()))?;
            }
            "wait-timeout" => {
                let seconds = get_first_integer_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("wait-timeout seconds".to_string()))?;
                config.wait_timeout = match seconds {
                    0 => None,
                    s if s < 0 => {
                        return Err(ConfigError::InvalidValue {
                            field: "wait-timeout".to_string(),
                            message: format!("must not be negative, got {}", s),
                        });
                    }
                    s => Some(Duration::from_secs(u64::try_from(s).unwrap_or(u64::MAX))),
                };
            }
            "webhook-secret" => {
                config.webhook_secret = get_first_string_arg(node);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}
