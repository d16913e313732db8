//! Process-group orchestration backends
//!
//! [`ComposeBackend`] is the narrow contract the manager needs from the
//! orchestration engine, [`ControlPlane`] the one it needs from the container
//! engine API. The default implementations drive the `docker` CLI.

use crate::error::{ComposeError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Location of the compose document a process group is started from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeDescriptor {
    /// Directory the compose command runs in
    pub context: PathBuf,
    /// Compose file name, relative to `context`
    pub file_name: String,
}

impl ComposeDescriptor {
    pub fn new(context: impl Into<PathBuf>, file_name: &str) -> Self {
        Self {
            context: context.into(),
            file_name: file_name.to_string(),
        }
    }

    /// Split a compose file path into its directory and file name
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ComposeError::InvalidArgument(format!(
                    "compose file path {} has no file name",
                    path.display()
                ))
            })?;
        let context = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self::new(context, file_name))
    }

    /// Full path of the compose file
    pub fn path(&self) -> PathBuf {
        self.context.join(&self.file_name)
    }
}

/// Published port of a running container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Publisher {
    /// Host address the port is bound to
    #[serde(rename = "URL", default)]
    pub url: String,
    /// Port inside the container
    #[serde(default)]
    pub target_port: u16,
    /// Port on the host (0 when not published)
    #[serde(default)]
    pub published_port: u16,
    /// Protocol (tcp/udp)
    #[serde(default)]
    pub protocol: String,
}

impl Publisher {
    /// Host reachable from this machine; wildcard binds map to loopback
    pub fn host(&self) -> String {
        match self.url.as_str() {
            "" | "0.0.0.0" => "127.0.0.1".to_string(),
            "::" => "::1".to_string(),
            other => other.to_string(),
        }
    }

    fn is_ipv4(&self) -> bool {
        !self.url.contains(':')
    }
}

/// Container backing a compose service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInfo {
    /// Container ID, unknown until the engine reports it
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
    /// Container name
    #[serde(default)]
    pub name: String,
    /// Compose service name
    #[serde(default)]
    pub service: String,
    /// Container state (running, exited, ...)
    #[serde(default)]
    pub state: String,
    /// Published ports
    #[serde(default)]
    pub publishers: Vec<Publisher>,
}

impl ContainerInfo {
    /// Publisher for `target_port`, preferring IPv4 bindings
    pub fn publisher(&self, target_port: u16) -> Option<&Publisher> {
        let mut candidates = self
            .publishers
            .iter()
            .filter(|p| p.target_port == target_port && p.published_port != 0);
        let first = candidates.next()?;
        if first.is_ipv4() {
            return Some(first);
        }
        Some(candidates.find(|p| p.is_ipv4()).unwrap_or(first))
    }
}

/// Orchestration engine driving one process group
pub trait ComposeBackend {
    /// Start every service of `descriptor` under `project_name`
    fn start(&mut self, descriptor: &ComposeDescriptor, project_name: &str) -> Result<()>;
    /// Tear down the process group started by [`ComposeBackend::start`]
    fn stop(&mut self) -> Result<()>;
    /// Container currently backing `service`
    fn get_container(&self, service: &str) -> Result<ContainerInfo>;
    /// Host port `port` of `service` is published on
    fn get_service_port(&self, service: &str, port: u16) -> Result<u16>;
    /// Host `port` of `service` is published on, as seen from this machine
    fn get_service_host(&self, service: &str, port: u16) -> Result<String>;
}

/// Container engine API used to look up network gateways
pub trait ControlPlane {
    /// Gateway address of the network `container_id` is attached to
    fn gateway_address(&self, container_id: &str) -> Result<String>;
}

fn run(command: &mut Command) -> Result<Output> {
    tracing::debug!("Running {:?}", command);
    let output = command.output()?;
    if !output.status.success() {
        return Err(ComposeError::Orchestrator(format!(
            "{:?} exited with {}: {}",
            command,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

/// `docker compose` CLI backend
#[derive(Debug, Clone)]
pub struct DockerComposeCli {
    docker: PathBuf,
    wait: bool,
    project: Option<(ComposeDescriptor, String)>,
}

impl Default for DockerComposeCli {
    fn default() -> Self {
        Self {
            docker: PathBuf::from("docker"),
            wait: true,
            project: None,
        }
    }
}

impl DockerComposeCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific docker executable
    pub fn docker_binary(mut self, docker: impl Into<PathBuf>) -> Self {
        self.docker = docker.into();
        self
    }

    /// Whether `up` blocks until services are running or healthy
    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    fn compose_command(&self) -> Result<Command> {
        let (descriptor, project_name) = self.project.as_ref().ok_or_else(|| {
            ComposeError::InvalidState("compose project has not been started".to_string())
        })?;
        let mut command = Command::new(&self.docker);
        command
            .current_dir(&descriptor.context)
            .arg("compose")
            .arg("-f")
            .arg(&descriptor.file_name)
            .arg("-p")
            .arg(project_name);
        Ok(command)
    }

    fn containers(&self) -> Result<Vec<ContainerInfo>> {
        let mut command = self.compose_command()?;
        command.args(["ps", "--format", "json"]);
        let output = run(&mut command)?;
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn publisher(&self, service: &str, port: u16) -> Result<Publisher> {
        let container = self.get_container(service)?;
        container.publisher(port).cloned().ok_or_else(|| {
            ComposeError::KeyNotFound(format!(
                "port {} of service '{}' is not published",
                port, service
            ))
        })
    }
}

impl ComposeBackend for DockerComposeCli {
    fn start(&mut self, descriptor: &ComposeDescriptor, project_name: &str) -> Result<()> {
        self.project = Some((descriptor.clone(), project_name.to_string()));
        let mut command = self.compose_command()?;
        command.args(["up", "-d"]);
        if self.wait {
            command.arg("--wait");
        }
        run(&mut command)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut command = self.compose_command()?;
        command.args(["down", "-v"]);
        run(&mut command)?;
        self.project = None;
        Ok(())
    }

    fn get_container(&self, service: &str) -> Result<ContainerInfo> {
        self.containers()?
            .into_iter()
            .find(|c| c.service == service)
            .ok_or_else(|| {
                ComposeError::KeyNotFound(format!("service '{}' has no running container", service))
            })
    }

    fn get_service_port(&self, service: &str, port: u16) -> Result<u16> {
        Ok(self.publisher(service, port)?.published_port)
    }

    fn get_service_host(&self, service: &str, port: u16) -> Result<String> {
        Ok(self.publisher(service, port)?.host())
    }
}

/// Parse `docker compose ps --format json` output
///
/// Older compose releases print one JSON array, newer ones one object per
/// line.
pub fn parse_ps_output(output: &str) -> Result<Vec<ContainerInfo>> {
    let trimmed = output.trim();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(ComposeError::from))
        .collect()
}

/// `docker inspect` control-plane client
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            docker: PathBuf::from("docker"),
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific docker executable
    pub fn docker_binary(mut self, docker: impl Into<PathBuf>) -> Self {
        self.docker = docker.into();
        self
    }
}

impl ControlPlane for DockerCli {
    fn gateway_address(&self, container_id: &str) -> Result<String> {
        let mut command = Command::new(&self.docker);
        command.args(["inspect", "--type", "container", container_id]);
        let output = run(&mut command)?;
        parse_gateway(&String::from_utf8_lossy(&output.stdout), container_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    host_config: InspectedHostConfig,
    network_settings: InspectedNetworkSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedHostConfig {
    #[serde(default)]
    network_mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetworkSettings {
    #[serde(default)]
    networks: HashMap<String, InspectedNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetwork {
    #[serde(default)]
    gateway: String,
}

/// Extract the gateway of the container's network mode from `docker inspect`
pub fn parse_gateway(output: &str, container_id: &str) -> Result<String> {
    let containers: Vec<InspectedContainer> = serde_json::from_str(output)?;
    let container = containers.into_iter().next().ok_or_else(|| {
        ComposeError::KeyNotFound(format!("container {} not found", container_id))
    })?;

    let network = match container.host_config.network_mode.as_str() {
        "" | "default" => "bridge",
        other => other,
    };
    container
        .network_settings
        .networks
        .get(network)
        .map(|n| n.gateway.clone())
        .filter(|gateway| !gateway.is_empty())
        .ok_or_else(|| {
            ComposeError::KeyNotFound(format!(
                "container {} has no gateway on network {}",
                container_id, network
            ))
        })
}
