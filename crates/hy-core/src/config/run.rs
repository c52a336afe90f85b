//! Run configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::agent::{AgentSpec, SyncSpec};
use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// File name of the duration report in the system temp directory
const DEFAULT_HEURISTIC_FILE: &str = "hydra_heuristics.json";

/// What happens to items assigned to an agent whose link breaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrandedPolicy {
    /// Put them back on the pending queue for another agent
    #[default]
    Requeue,
    /// Give up on them and report them as unknown
    Abandon,
}

/// Configuration for one coordinator run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Command template run by each executor. `{}` or `{file}` is replaced
    /// with the work item; without a placeholder the item is appended.
    pub command: String,

    /// Order the queue by recorded durations, longest first
    pub sort_by_duration: bool,

    /// Where the duration report is read from and written to
    pub heuristic_file: Option<PathBuf>,

    /// How long an agent may take to send its first message
    #[serde(with = "duration_secs")]
    pub boot_timeout: Duration,

    /// Interval between agent heartbeats
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Cap on retries of a transient failure. Unbounded when unset.
    pub max_retries: Option<u32>,

    /// Policy for items stranded on a lost agent
    pub stranded: StrandedPolicy,

    /// Extra transient-failure signatures (regular expressions)
    pub retry_patterns: Vec<String>,

    /// Source tree mirrored to ssh agents before they boot
    pub sync: Option<SyncSpec>,

    /// Agents to boot
    pub agents: Vec<AgentSpec>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            command: "ruby {}".to_string(),
            sort_by_duration: true,
            heuristic_file: None,
            boot_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(5),
            max_retries: None,
            stranded: StrandedPolicy::Requeue,
            retry_patterns: vec![],
            sync: None,
            agents: vec![AgentSpec::local(1)],
        }
    }
}

impl RunConfig {
    /// Location of the duration report
    pub fn heuristic_path(&self) -> PathBuf {
        self.heuristic_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_HEURISTIC_FILE))
    }

    /// Executors across all configured agents
    pub fn total_executors(&self) -> usize {
        self.agents.iter().map(|a| a.executors).sum()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::MissingField("command".to_string()));
        }
        if self.agents.is_empty() {
            return Err(ConfigError::Invalid("no agents configured".to_string()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat_interval must be at least one second".to_string(),
            ));
        }
        for agent in &self.agents {
            agent.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentKind;

    #[test]
    fn test_default_is_one_local_executor() {
        let config = RunConfig::default();
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].kind, AgentKind::Local);
        assert_eq!(config.total_executors(), 1);
        assert_eq!(config.stranded, StrandedPolicy::Requeue);
        assert!(config.max_retries.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config: RunConfig = toml::from_str(
            r#"
            command = "bundle exec ruby -Itest {file}"
            boot_timeout = 120
            max_retries = 3
            stranded = "abandon"
            retry_patterns = ["Lock wait timeout exceeded"]

            [sync]
            directory = "."
            exclude = ["tmp", "log", "*.db"]

            [[agents]]
            type = "local"
            executors = 2

            [[agents]]
            type = "ssh"
            connect = "ci@build-2"
            directory = "/srv/app"
            executors = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.boot_timeout, Duration::from_secs(120));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.max_retries, Some(3));
        assert_eq!(config.stranded, StrandedPolicy::Abandon);
        assert_eq!(config.total_executors(), 10);
        assert_eq!(config.sync.as_ref().unwrap().exclude.len(), 3);
        assert!(config.agents[1].is_remote());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_incomplete_remote_agent() {
        let config: RunConfig = toml::from_str(
            r#"
            [[agents]]
            type = "ssh"
            directory = "/srv/app"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_heuristic_path_default() {
        let config = RunConfig::default();
        assert_eq!(
            config.heuristic_path(),
            std::env::temp_dir().join(DEFAULT_HEURISTIC_FILE)
        );
    }
}
