//! Configuration for halyard-daemon

use crate::error::{DaemonError, DaemonResult};
use halyard_control::{ControlSettings, DependencyGraph, PlatformNetwork};
use halyard_status::BackoffPolicy;
use halyard_types::{Provider, SubsystemId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry delays for each wait reason
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Which controllers run and how often they resync
    #[serde(default)]
    pub controllers: ControllersConfig,

    /// Object store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Kubernetes distribution the cluster runs on
    #[serde(default)]
    pub provider: Provider,

    /// Pod network reported by the platform, if any
    #[serde(default)]
    pub platform_network: Option<PlatformNetwork>,
}

/// Retry delays, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_upstream_wait")]
    pub upstream_wait_secs: u64,

    #[serde(default = "default_license_wait")]
    pub license_wait_secs: u64,

    #[serde(default = "default_availability_wait")]
    pub availability_wait_secs: u64,

    #[serde(default = "default_transient_wait")]
    pub transient_wait_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            upstream_wait_secs: default_upstream_wait(),
            license_wait_secs: default_license_wait(),
            availability_wait_secs: default_availability_wait(),
            transient_wait_secs: default_transient_wait(),
        }
    }
}

impl BackoffConfig {
    pub fn to_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            upstream_wait: Duration::from_secs(self.upstream_wait_secs),
            license_wait: Duration::from_secs(self.license_wait_secs),
            availability_wait: Duration::from_secs(self.availability_wait_secs),
            transient_wait: Duration::from_secs(self.transient_wait_secs),
        }
    }
}

fn default_upstream_wait() -> u64 {
    5
}

fn default_license_wait() -> u64 {
    10
}

fn default_availability_wait() -> u64 {
    30
}

fn default_transient_wait() -> u64 {
    5
}

/// Controller selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllersConfig {
    /// Subsystems to reconcile
    #[serde(default = "default_enabled")]
    pub enabled: Vec<SubsystemId>,

    /// Interval between unconditional passes
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
}

impl Default for ControllersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            resync_interval_secs: default_resync_interval(),
        }
    }
}

impl ControllersConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

fn default_enabled() -> Vec<SubsystemId> {
    SubsystemId::ALL.to_vec()
}

fn default_resync_interval() -> u64 {
    300
}

/// Object store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file with artifacts to load into the store at startup
    #[serde(default)]
    pub seed_path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, then the environment
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // HALYARD_BACKOFF__LICENSE_WAIT_SECS=20
        builder = builder.add_source(
            config::Environment::with_prefix("HALYARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no controller can run with
    pub fn validate(&self) -> DaemonResult<()> {
        let backoff = &self.backoff;
        let waits = [
            ("upstream_wait_secs", backoff.upstream_wait_secs),
            ("license_wait_secs", backoff.license_wait_secs),
            ("availability_wait_secs", backoff.availability_wait_secs),
            ("transient_wait_secs", backoff.transient_wait_secs),
            ("resync_interval_secs", self.controllers.resync_interval_secs),
        ];
        if let Some((name, _)) = waits.iter().find(|(_, secs)| *secs == 0) {
            return Err(DaemonError::Config(format!("{} must be greater than zero", name)));
        }

        if self.controllers.enabled.is_empty() {
            return Err(DaemonError::Config("no controllers enabled".to_string()));
        }

        let graph = DependencyGraph::standard();
        for id in &self.controllers.enabled {
            for upstream in graph.upstreams(*id) {
                if !self.controllers.enabled.contains(upstream) {
                    warn!(
                        subsystem = %id,
                        upstream = %upstream,
                        "Enabled subsystem depends on a disabled one and will wait indefinitely"
                    );
                }
            }
        }
        Ok(())
    }

    /// Settings shared by every controller
    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            provider: self.provider,
            backoff: self.backoff.to_policy(),
            platform_network: self.platform_network.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.controllers.enabled, SubsystemId::ALL.to_vec());
        assert_eq!(config.controllers.resync_interval(), Duration::from_secs(300));
        assert_eq!(config.provider, Provider::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_policy_matches_defaults() {
        let policy = BackoffConfig::default().to_policy();
        assert_eq!(policy, BackoffPolicy::default());
    }

    #[test]
    fn test_zero_wait_rejected() {
        let mut config = DaemonConfig::default();
        config.backoff.license_wait_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("license_wait_secs"));
    }

    #[test]
    fn test_empty_enabled_rejected() {
        let mut config = DaemonConfig::default();
        config.controllers.enabled.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_enabled_list_is_allowed() {
        let mut config = DaemonConfig::default();
        config.controllers.enabled = vec![SubsystemId::LogCollector];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: DaemonConfig = serde_json::from_str(
            r#"{
                "provider": "EKS",
                "backoff": {"license_wait_secs": 20},
                "controllers": {"enabled": ["log-storage", "log-collector"]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.provider, Provider::Eks);
        assert_eq!(config.backoff.license_wait_secs, 20);
        assert_eq!(config.backoff.upstream_wait_secs, 5);
        assert_eq!(
            config.controllers.enabled,
            vec![SubsystemId::LogStorage, SubsystemId::LogCollector]
        );

        let settings = config.control_settings();
        assert_eq!(settings.provider, Provider::Eks);
        assert_eq!(settings.backoff.license_wait, Duration::from_secs(20));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.backoff.availability_wait_secs, 30);
    }
}
