//! Harness configuration

use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default name of the generated compose file
pub const DEFAULT_COMPOSE_FILE_NAME: &str = "test-docker-compose-file.yaml";

/// Default time to wait for a service to become responsive
pub const DEFAULT_UP_TIMEOUT_SECS: u64 = 60;

/// Environment variable prefix for harness settings
pub const ENV_PREFIX: &str = "TESTCOMPOSE_";

/// How long one compose deployment is shared between tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerScope {
    /// One deployment for the whole run
    #[default]
    Session,
    /// One deployment per package
    Package,
    /// One deployment per module
    Module,
    /// One deployment per test group
    Class,
    /// One deployment per test
    Function,
}

impl fmt::Display for ContainerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerScope::Session => write!(f, "session"),
            ContainerScope::Package => write!(f, "package"),
            ContainerScope::Module => write!(f, "module"),
            ContainerScope::Class => write!(f, "class"),
            ContainerScope::Function => write!(f, "function"),
        }
    }
}

impl FromStr for ContainerScope {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(ContainerScope::Session),
            "package" => Ok(ContainerScope::Package),
            "module" => Ok(ContainerScope::Module),
            "class" => Ok(ContainerScope::Class),
            "function" => Ok(ContainerScope::Function),
            other => Err(ComposeError::InvalidConfig(format!(
                "unknown container scope '{}'",
                other
            ))),
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Lifetime of a shared deployment
    pub container_scope: ContainerScope,
    /// Base compose file the builder starts from
    pub base_config: Option<PathBuf>,
    /// Name of the generated compose file
    pub compose_file_name: String,
    /// Directory the generated compose file is written to
    pub working_dir: PathBuf,
    /// Prefix for generated project names
    pub project_prefix: Option<String>,
    /// Readiness timeout in seconds
    pub up_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            container_scope: ContainerScope::default(),
            base_config: None,
            compose_file_name: DEFAULT_COMPOSE_FILE_NAME.to_string(),
            working_dir: PathBuf::from("."),
            project_prefix: None,
            up_timeout_secs: DEFAULT_UP_TIMEOUT_SECS,
        }
    }
}

impl HarnessConfig {
    /// Load settings from `TESTCOMPOSE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, falling back to defaults
    ///
    /// `lookup` receives full variable names such as
    /// `TESTCOMPOSE_CONTAINER_SCOPE`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };

        let mut config = Self::default();
        if let Some(scope) = get("CONTAINER_SCOPE") {
            config.container_scope = scope.parse()?;
        }
        if let Some(base) = get("BASE_CONFIG") {
            config.base_config = Some(PathBuf::from(base));
        }
        if let Some(name) = get("FILE_NAME") {
            config.compose_file_name = name;
        }
        if let Some(dir) = get("WORKING_DIR") {
            config.working_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = get("PROJECT_PREFIX") {
            config.project_prefix = Some(prefix);
        }
        if let Some(timeout) = get("UP_TIMEOUT_SECS") {
            config.up_timeout_secs = timeout.trim().parse().map_err(|_| {
                ComposeError::InvalidConfig(format!("invalid up timeout '{}'", timeout))
            })?;
        }

        Ok(config)
    }

    /// Readiness timeout
    pub fn up_timeout(&self) -> Duration {
        Duration::from_secs(self.up_timeout_secs)
    }

    /// Path of the generated compose file
    pub fn compose_file_path(&self) -> PathBuf {
        self.working_dir.join(&self.compose_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.container_scope, ContainerScope::Session);
        assert_eq!(
            config.compose_file_path(),
            PathBuf::from("./test-docker-compose-file.yaml")
        );
        assert_eq!(config.up_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("TESTCOMPOSE_CONTAINER_SCOPE", "Module"),
            ("TESTCOMPOSE_BASE_CONFIG", "tests/compose.base.yaml"),
            ("TESTCOMPOSE_FILE_NAME", "generated.yaml"),
            ("TESTCOMPOSE_WORKING_DIR", "/tmp/it"),
            ("TESTCOMPOSE_PROJECT_PREFIX", "it"),
            ("TESTCOMPOSE_UP_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.container_scope, ContainerScope::Module);
        assert_eq!(config.base_config, Some(PathBuf::from("tests/compose.base.yaml")));
        assert_eq!(config.compose_file_path(), PathBuf::from("/tmp/it/generated.yaml"));
        assert_eq!(config.project_prefix.as_deref(), Some("it"));
        assert_eq!(config.up_timeout_secs, 5);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config =
            HarnessConfig::from_lookup(lookup(&[("TESTCOMPOSE_BASE_CONFIG", "")])).unwrap();
        assert!(config.base_config.is_none());
    }

    #[test]
    fn test_project_prefix_variable() {
        let config =
            HarnessConfig::from_lookup(lookup(&[("TESTCOMPOSE_PROJECT_NAME", "old")])).unwrap();
        assert!(config.project_prefix.is_none());

        let config =
            HarnessConfig::from_lookup(lookup(&[("TESTCOMPOSE_PROJECT_PREFIX", "ci")])).unwrap();
        assert_eq!(config.project_prefix.as_deref(), Some("ci"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            HarnessConfig::from_lookup(lookup(&[("TESTCOMPOSE_CONTAINER_SCOPE", "forever")])),
            Err(ComposeError::InvalidConfig(_))
        ));
        assert!(matches!(
            HarnessConfig::from_lookup(lookup(&[("TESTCOMPOSE_UP_TIMEOUT_SECS", "soon")])),
            Err(ComposeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_scope_round_trip() {
        for scope in [
            ContainerScope::Session,
            ContainerScope::Package,
            ContainerScope::Module,
            ContainerScope::Class,
            ContainerScope::Function,
        ] {
            assert_eq!(scope.to_string().parse::<ContainerScope>().unwrap(), scope);
        }
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: HarnessConfig =
            serde_yaml::from_str("container_scope: function\nup_timeout_secs: 10\n").unwrap();
        assert_eq!(config.container_scope, ContainerScope::Function);
        assert_eq!(config.compose_file_name, DEFAULT_COMPOSE_FILE_NAME);
        assert_eq!(config.up_timeout_secs, 10);
    }
}
