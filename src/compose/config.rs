//! Docker Compose specification types
//!
//! Every optional field distinguishes "not present" (`None`) from a present
//! value so that serialization can omit sections a base file never
//! mentioned. Keys this model does not know about are kept in the `extra`
//! mapping of the owning entity and written back unchanged.

use super::parser::is_absent;
use crate::error::{ComposeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Compose file specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeSpecification {
    /// Compose file version
    #[serde(default, skip_serializing_if = "is_absent")]
    pub version: Option<String>,
    /// Project name
    #[serde(default, skip_serializing_if = "is_absent")]
    pub name: Option<String>,
    /// Services
    #[serde(default, skip_serializing_if = "is_absent")]
    pub services: Option<BTreeMap<String, Service>>,
    /// Networks
    #[serde(default, skip_serializing_if = "is_absent")]
    pub networks: Option<BTreeMap<String, Option<Network>>>,
    /// Volumes
    #[serde(default, skip_serializing_if = "is_absent")]
    pub volumes: Option<BTreeMap<String, Option<Volume>>>,
    /// Unknown top-level keys (`x-*` extensions and the like)
    #[serde(flatten)]
    pub extra: Mapping,
}

impl ComposeSpecification {
    /// Specification holding a single service
    pub fn with_service(name: &str, service: Service) -> Self {
        let mut services = BTreeMap::new();
        services.insert(name.to_string(), service);
        Self {
            services: Some(services),
            ..Default::default()
        }
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.as_ref().and_then(|s| s.get(name))
    }

    /// Look up a service by name for modification
    pub fn service_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.as_mut().and_then(|s| s.get_mut(name))
    }

    /// Names of all defined services, in sorted order
    pub fn service_names(&self) -> Vec<&str> {
        self.services
            .as_ref()
            .map(|s| s.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Image name
    #[serde(default, skip_serializing_if = "is_absent")]
    pub image: Option<String>,
    /// Build configuration
    #[serde(default, skip_serializing_if = "is_absent")]
    pub build: Option<BuildConfig>,
    /// Command to run
    #[serde(default, skip_serializing_if = "is_absent")]
    pub command: Option<CommandConfig>,
    /// Entrypoint
    #[serde(default, skip_serializing_if = "is_absent")]
    pub entrypoint: Option<CommandConfig>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "is_absent")]
    pub environment: Option<EnvironmentConfig>,
    /// Container name
    #[serde(default, skip_serializing_if = "is_absent")]
    pub container_name: Option<String>,
    /// Hostname
    #[serde(default, skip_serializing_if = "is_absent")]
    pub hostname: Option<String>,
    /// Port mappings
    #[serde(default, skip_serializing_if = "is_absent")]
    pub ports: Option<Vec<PortMapping>>,
    /// Networks to connect to
    #[serde(default, skip_serializing_if = "is_absent")]
    pub networks: Option<ServiceNetworks>,
    /// Service dependencies
    #[serde(default, skip_serializing_if = "is_absent")]
    pub depends_on: Option<DependsOnConfig>,
    /// Healthcheck configuration
    #[serde(default, skip_serializing_if = "is_absent")]
    pub healthcheck: Option<HealthcheckConfig>,
    /// Labels
    #[serde(default, skip_serializing_if = "is_absent")]
    pub labels: Option<LabelsConfig>,
    /// Restart policy
    #[serde(default, skip_serializing_if = "is_absent")]
    pub restart: Option<String>,
    /// Working directory
    #[serde(default, skip_serializing_if = "is_absent")]
    pub working_dir: Option<String>,
    /// User
    #[serde(default, skip_serializing_if = "is_absent")]
    pub user: Option<String>,
    /// Every other service key, passed through untouched
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Service {
    /// Service running the given image
    pub fn from_image(image: &str) -> Self {
        Self {
            image: Some(image.to_string()),
            ..Default::default()
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildConfig {
    /// Simple context path
    Simple(String),
    /// Full build configuration
    Full(BuildConfigFull),
}

/// Full build configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfigFull {
    /// Build context
    #[serde(default, skip_serializing_if = "is_absent")]
    pub context: Option<String>,
    /// Dockerfile path
    #[serde(default, skip_serializing_if = "is_absent")]
    pub dockerfile: Option<String>,
    /// Build arguments
    #[serde(default, skip_serializing_if = "is_absent")]
    pub args: Option<ListOrDict>,
    /// Target stage
    #[serde(default, skip_serializing_if = "is_absent")]
    pub target: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Command configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    /// Shell command string
    Shell(String),
    /// Exec form array
    Exec(Vec<String>),
}

/// `KEY=value` list or key to scalar map
///
/// Shared by environment variables, labels and build arguments. Map values
/// may be strings, numbers, booleans or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListOrDict {
    /// Array of KEY=value strings
    Array(Vec<String>),
    /// Map of key to scalar value (null leaves the entry unset)
    Map(BTreeMap<String, Value>),
}

/// Environment configuration
pub type EnvironmentConfig = ListOrDict;

/// Labels configuration
pub type LabelsConfig = ListOrDict;

/// Port mapping entry
///
/// Whichever form the caller supplies is kept; no conversion between forms
/// is ever performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortMapping {
    /// Bare container port: `8080`
    Number(u16),
    /// Short syntax: `"8080:80"`
    Short(String),
    /// Long syntax
    Long(PortConfig),
}

impl From<u16> for PortMapping {
    fn from(port: u16) -> Self {
        PortMapping::Number(port)
    }
}

impl From<&str> for PortMapping {
    fn from(port: &str) -> Self {
        PortMapping::Short(port.to_string())
    }
}

impl From<String> for PortMapping {
    fn from(port: String) -> Self {
        PortMapping::Short(port)
    }
}

impl From<PortConfig> for PortMapping {
    fn from(port: PortConfig) -> Self {
        PortMapping::Long(port)
    }
}

/// Long port configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Target port in container
    pub target: u16,
    /// Published port on host
    #[serde(default, skip_serializing_if = "is_absent")]
    pub published: Option<Value>,
    /// Host IP to bind to
    #[serde(default, skip_serializing_if = "is_absent")]
    pub host_ip: Option<String>,
    /// Protocol (tcp/udp)
    #[serde(default, skip_serializing_if = "is_absent")]
    pub protocol: Option<String>,
    /// Mode (host/ingress)
    #[serde(default, skip_serializing_if = "is_absent")]
    pub mode: Option<String>,
    /// `name`, `app_protocol` and other newer keys
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Network attachment name, restricted to `[a-zA-Z0-9._-]+`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkName(String);

fn network_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("valid network name pattern"))
}

impl NetworkName {
    /// Validate and wrap a network name
    pub fn new(name: &str) -> Result<Self> {
        if network_name_pattern().is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(ComposeError::Validation(format!(
                "network name '{}' does not match ^[a-zA-Z0-9._-]+$",
                name
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NetworkName {
    type Error = ComposeError;

    fn try_from(name: String) -> Result<Self> {
        Self::new(&name)
    }
}

impl From<NetworkName> for String {
    fn from(name: NetworkName) -> Self {
        name.0
    }
}

impl Borrow<str> for NetworkName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Networks a service is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceNetworks {
    /// Array of network names
    List(Vec<String>),
    /// Map of network name to attachment config (null for defaults)
    Map(BTreeMap<NetworkName, Option<ServiceNetworkConfig>>),
}

impl ServiceNetworks {
    /// Attachment list from network names
    pub fn list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ServiceNetworks::List(names.into_iter().map(Into::into).collect())
    }

    /// Names of the attached networks
    pub fn names(&self) -> Vec<&str> {
        match self {
            ServiceNetworks::List(names) => names.iter().map(String::as_str).collect(),
            ServiceNetworks::Map(map) => map.keys().map(NetworkName::as_str).collect(),
        }
    }
}

/// Service network configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceNetworkConfig {
    /// Aliases
    #[serde(default, skip_serializing_if = "is_absent")]
    pub aliases: Option<Vec<String>>,
    /// IPv4 address
    #[serde(default, skip_serializing_if = "is_absent")]
    pub ipv4_address: Option<String>,
    /// IPv6 address
    #[serde(default, skip_serializing_if = "is_absent")]
    pub ipv6_address: Option<String>,
    /// Priority
    #[serde(default, skip_serializing_if = "is_absent")]
    pub priority: Option<i32>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Depends on configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOnConfig {
    /// Array of service names
    Array(Vec<String>),
    /// Map of service to condition
    Map(BTreeMap<String, DependsOnCondition>),
}

/// Depends on condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependsOnCondition {
    /// Condition to wait for
    pub condition: String,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Healthcheck configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    /// Test command
    #[serde(default, skip_serializing_if = "is_absent")]
    pub test: Option<CommandConfig>,
    /// Interval
    #[serde(default, skip_serializing_if = "is_absent")]
    pub interval: Option<String>,
    /// Timeout
    #[serde(default, skip_serializing_if = "is_absent")]
    pub timeout: Option<String>,
    /// Retries
    #[serde(default, skip_serializing_if = "is_absent")]
    pub retries: Option<u32>,
    /// Start period
    #[serde(default, skip_serializing_if = "is_absent")]
    pub start_period: Option<String>,
    /// Disable healthcheck
    #[serde(default, skip_serializing_if = "is_absent")]
    pub disable: Option<bool>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Network definition
///
/// Only identity-level attributes are typed; anything else is preserved as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Driver
    #[serde(default, skip_serializing_if = "is_absent")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(default, skip_serializing_if = "is_absent")]
    pub driver_opts: Option<BTreeMap<String, Value>>,
    /// External network
    #[serde(default, skip_serializing_if = "is_absent")]
    pub external: Option<bool>,
    /// Internal network
    #[serde(default, skip_serializing_if = "is_absent")]
    pub internal: Option<bool>,
    /// Attachable
    #[serde(default, skip_serializing_if = "is_absent")]
    pub attachable: Option<bool>,
    /// Labels
    #[serde(default, skip_serializing_if = "is_absent")]
    pub labels: Option<LabelsConfig>,
    /// Name
    #[serde(default, skip_serializing_if = "is_absent")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Network {
    /// Network using the given driver
    pub fn with_driver(driver: &str) -> Self {
        Self {
            driver: Some(driver.to_string()),
            ..Default::default()
        }
    }
}

/// Volume definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Driver
    #[serde(default, skip_serializing_if = "is_absent")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(default, skip_serializing_if = "is_absent")]
    pub driver_opts: Option<BTreeMap<String, Value>>,
    /// External volume
    #[serde(default, skip_serializing_if = "is_absent")]
    pub external: Option<bool>,
    /// Name
    #[serde(default, skip_serializing_if = "is_absent")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_name_pattern() {
        assert!(NetworkName::new("backend_1.internal-net").is_ok());
        assert!(matches!(
            NetworkName::new("bad name"),
            Err(ComposeError::Validation(_))
        ));
        assert!(NetworkName::new("").is_err());
    }

    #[test]
    fn test_service_networks_names() {
        let list = ServiceNetworks::list(["front", "back"]);
        assert_eq!(list.names(), vec!["front", "back"]);

        let mut map = BTreeMap::new();
        map.insert(NetworkName::new("back").unwrap(), None);
        map.insert(
            NetworkName::new("front").unwrap(),
            Some(ServiceNetworkConfig::default()),
        );
        assert_eq!(ServiceNetworks::Map(map).names(), vec!["back", "front"]);
    }

    #[test]
    fn test_service_lookup() {
        let spec = ComposeSpecification::with_service("web", Service::from_image("nginx"));
        assert_eq!(
            spec.service("web").and_then(|s| s.image.as_deref()),
            Some("nginx")
        );
        assert!(spec.service("db").is_none());
        assert_eq!(spec.service_names(), vec!["web"]);
        assert!(ComposeSpecification::default().service_names().is_empty());
    }

    #[test]
    fn test_port_mapping_conversions() {
        assert_eq!(PortMapping::from(80), PortMapping::Number(80));
        assert_eq!(
            PortMapping::from("8080:80"),
            PortMapping::Short("8080:80".to_string())
        );
        let long = PortConfig {
            target: 80,
            ..Default::default()
        };
        assert_eq!(PortMapping::from(long.clone()), PortMapping::Long(long));
    }
}
