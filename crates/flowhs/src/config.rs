//! Configuration file support for flowhsd.
//!
//! Loads and validates the daemon configuration from a TOML file.
//! Default location: /etc/flowhs/flowhsd.toml

use std::fs;
use std::path::Path;

use flowhs_common::RetryPolicy;
use flowhs_types::SwitchId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{PathSegment, Switch};
use crate::path_computer::StaticPathComputer;
use crate::persistence::{FlowRepository, PersistenceError};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flowhs/flowhsd.toml";

/// Error type for configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration handling.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Saga behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How many times one speaker command is re-sent after a failure.
    #[serde(default = "default_retries_limit")]
    pub speaker_command_retries_limit: u32,
}

/// Daemon runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Depth of each saga's response queue
    #[serde(default = "default_response_channel_capacity")]
    pub response_channel_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// A static route served by the path computer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub src: SwitchId,
    pub dst: SwitchId,
    #[serde(default)]
    pub segments: Vec<PathSegment>,
}

/// Switches and routes known at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub switches: Vec<Switch>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Complete flowhsd configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowHsConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub topology: TopologyConfig,
}

fn default_retries_limit() -> u32 {
    3
}

fn default_response_channel_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            speaker_command_retries_limit: default_retries_limit(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            response_channel_capacity: default_response_channel_capacity(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl FlowHsConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| match e {
                ConfigError::Parse { message, .. } => ConfigError::Parse {
                    path: path.display().to_string(),
                    message,
                },
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "flowhsd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.speaker_command_retries_limit == 0 {
            return Err(ConfigError::Invalid(
                "speaker_command_retries_limit must be > 0".to_string(),
            ));
        }

        if self.daemon.response_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "response_channel_capacity must be > 0".to_string(),
            ));
        }

        for route in &self.topology.routes {
            if route.src != route.dst && route.segments.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "route {} -> {} has no segments",
                    route.src, route.dst
                )));
            }
        }

        Ok(())
    }

    /// Returns the retry policy for speaker commands.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.orchestrator.speaker_command_retries_limit)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Loads the configured switches and routes into the collaborators.
    pub fn seed_topology(
        &self,
        repository: &dyn FlowRepository,
        path_computer: &StaticPathComputer,
    ) -> std::result::Result<(), PersistenceError> {
        for switch in &self.topology.switches {
            repository.save_switch(switch.clone())?;
        }
        for route in &self.topology.routes {
            path_computer.add_route(route.src, route.dst, route.segments.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryFlowRepository;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FlowHsConfig::default();
        assert_eq!(config.orchestrator.speaker_command_retries_limit, 3);
        assert_eq!(config.daemon.response_channel_capacity, 1024);
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.log_format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_retry_limit() {
        let mut config = FlowHsConfig::default();
        config.orchestrator.speaker_command_retries_limit = 0;
        assert!(config.validate().is_err());
        assert!(config.retry_policy().is_err());
    }

    #[test]
    fn test_validate_route_without_segments() {
        let config = FlowHsConfig::from_toml(
            r#"
[[topology.routes]]
src = "00:00:00:00:00:00:00:01"
dst = "00:00:00:00:00:00:00:02"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[orchestrator]
speaker_command_retries_limit = 5

[daemon]
log_format = "pretty"

[[topology.switches]]
switch_id = "00:00:00:00:00:00:00:01"
status = "active"

[[topology.switches]]
switch_id = "00:00:00:00:00:00:00:02"
status = "inactive"

[[topology.routes]]
src = "00:00:00:00:00:00:00:01"
dst = "00:00:00:00:00:00:00:02"
segments = [
    { src_switch = "00:00:00:00:00:00:00:01", src_port = 3, dest_switch = "00:00:00:00:00:00:00:02", dest_port = 4 },
]
"#;
        let config = FlowHsConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.orchestrator.speaker_command_retries_limit, 5);
        assert_eq!(config.daemon.log_format, LogFormat::Pretty);
        // Unspecified values should use defaults
        assert_eq!(config.daemon.response_channel_capacity, 1024);
        assert_eq!(config.topology.switches.len(), 2);
        assert_eq!(config.topology.routes[0].segments[0].dest_port, 4);
        assert_eq!(config.retry_policy().unwrap().limit(), 5);
    }

    #[test]
    fn test_seed_topology() {
        let config = FlowHsConfig::from_toml(
            r#"
[[topology.switches]]
switch_id = "0x1"
status = "active"
"#,
        )
        .unwrap();
        let repository = InMemoryFlowRepository::new();
        config
            .seed_topology(&repository, &StaticPathComputer::new())
            .unwrap();
        assert!(repository
            .find_switch(&SwitchId::new(1))
            .unwrap()
            .is_some_and(|s| s.is_active()));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nspeaker_command_retries_limit = 2").unwrap();
        let config = FlowHsConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.orchestrator.speaker_command_retries_limit, 2);
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator\nbroken").unwrap();
        let err = FlowHsConfig::load_or_default(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowhsd.toml");
        let mut config = FlowHsConfig::default();
        config.orchestrator.speaker_command_retries_limit = 7;
        config.save(&path).unwrap();

        assert_eq!(FlowHsConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = FlowHsConfig::load_or_default("/nonexistent/path.toml").unwrap();
        assert_eq!(config, FlowHsConfig::default());
    }
}
