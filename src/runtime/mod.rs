//! Compose process-group runtime
//!
//! [`ComposeManager`] starts the process group described by a compose file
//! under a randomized project name, polls services for readiness, and
//! resolves the host and port under which each service is reachable. Host
//! resolution switches to the network gateway when this process itself runs
//! inside a container that can reach the engine's control socket.

pub mod backend;
pub mod clock;
pub mod probe;

pub use backend::{
    ComposeBackend, ComposeDescriptor, ContainerInfo, ControlPlane, DockerCli, DockerComposeCli,
    Publisher,
};
pub use clock::{tcp_check, wait_until_responsive, Clock, SystemClock};
pub use probe::{ExecutionProbe, HostProbe};

use crate::error::{ComposeError, Result};
use rand::Rng;
use std::time::Duration;

/// Length of the random project name suffix
pub const PROJECT_SUFFIX_LEN: usize = 5;

const PROJECT_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric suffix isolating one process group
pub fn project_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PROJECT_SUFFIX_LEN)
        .map(|_| PROJECT_SUFFIX_CHARSET[rng.gen_range(0..PROJECT_SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Lifecycle of the managed process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectState {
    /// Nothing started yet
    Unstarted,
    /// Startup requested from the backend
    Starting,
    /// Process group is up
    Running,
    /// Process group torn down
    Stopped,
}

/// Runtime options for one compose project
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Compose document to start
    pub descriptor: ComposeDescriptor,
    /// Optional prefix placed before the random project suffix
    pub project_prefix: Option<String>,
}

impl ComposeOptions {
    pub fn new(descriptor: ComposeDescriptor) -> Self {
        Self {
            descriptor,
            project_prefix: None,
        }
    }

    /// Prefix the generated project name with `prefix`
    pub fn project_prefix(mut self, prefix: &str) -> Self {
        self.project_prefix = Some(prefix.to_string());
        self
    }

    fn project_name(&self, suffix: &str) -> String {
        match &self.project_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}-{}", prefix, suffix),
            _ => suffix.to_string(),
        }
    }
}

/// External collaborators of a [`ComposeManager`]
pub struct Collaborators {
    pub backend: Box<dyn ComposeBackend>,
    pub control_plane: Box<dyn ControlPlane>,
    pub probe: Box<dyn ExecutionProbe>,
    pub clock: Box<dyn Clock>,
}

impl Collaborators {
    /// Docker CLI backend, filesystem probe and system clock
    pub fn docker() -> Self {
        Self {
            backend: Box::new(DockerComposeCli::new()),
            control_plane: Box::new(DockerCli::new()),
            probe: Box::new(HostProbe::default()),
            clock: Box::new(SystemClock::new()),
        }
    }
}

/// Running compose process group
///
/// The process group is torn down exactly once: by [`ComposeManager::stop`],
/// or when the manager is dropped, whichever comes first.
pub struct ComposeManager {
    descriptor: ComposeDescriptor,
    project_name: String,
    state: ProjectState,
    backend: Box<dyn ComposeBackend>,
    control_plane: Box<dyn ControlPlane>,
    probe: Box<dyn ExecutionProbe>,
    clock: Box<dyn Clock>,
}

impl ComposeManager {
    /// Start `options.descriptor` with the Docker CLI collaborators
    pub fn docker(options: ComposeOptions) -> Result<Self> {
        Self::start(options, Collaborators::docker())
    }

    /// Start `options.descriptor` with the given collaborators
    pub fn start(options: ComposeOptions, collaborators: Collaborators) -> Result<Self> {
        Self::start_with_rng(options, collaborators, &mut rand::thread_rng())
    }

    /// Start with an explicit random source for the project name
    pub fn start_with_rng<R: Rng + ?Sized>(
        options: ComposeOptions,
        collaborators: Collaborators,
        rng: &mut R,
    ) -> Result<Self> {
        let project_name = options.project_name(&project_suffix(rng));
        let mut manager = Self {
            descriptor: options.descriptor,
            project_name,
            state: ProjectState::Unstarted,
            backend: collaborators.backend,
            control_plane: collaborators.control_plane,
            probe: collaborators.probe,
            clock: collaborators.clock,
        };

        tracing::info!(
            "Starting compose project {} from {}",
            manager.project_name,
            manager.descriptor.path().display()
        );
        manager.state = ProjectState::Starting;
        if let Err(e) = manager
            .backend
            .start(&manager.descriptor, &manager.project_name)
        {
            manager.state = ProjectState::Stopped;
            return Err(e);
        }
        manager.state = ProjectState::Running;
        tracing::info!("Compose project {} is running", manager.project_name);

        Ok(manager)
    }

    /// Run `body` against the started manager, then tear it down
    ///
    /// Teardown also happens when `body` fails or panics. A teardown failure is
    /// reported only if `body` itself succeeded.
    pub fn scope<T, F>(self, body: F) -> Result<T>
    where
        F: FnOnce(&ComposeManager) -> Result<T>,
    {
        let result = body(&self);
        let stopped = self.stop();
        let value = result?;
        stopped?;
        Ok(value)
    }

    /// Generated project name
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Compose document the process group was started from
    pub fn descriptor(&self) -> &ComposeDescriptor {
        &self.descriptor
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProjectState {
        self.state
    }

    /// Tear down the process group
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.state != ProjectState::Running {
            return Ok(());
        }
        self.state = ProjectState::Stopped;
        tracing::info!("Stopping compose project {}", self.project_name);
        self.backend.stop()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state == ProjectState::Running {
            Ok(())
        } else {
            Err(ComposeError::InvalidState(format!(
                "compose project {} is {:?}",
                self.project_name, self.state
            )))
        }
    }

    /// Poll `check` every `pause` until it succeeds or `timeout` elapses
    pub fn wait_until_responsive<F>(&self, check: F, timeout: Duration, pause: Duration) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        wait_until_responsive(self.clock.as_ref(), check, timeout, pause)
    }

    /// Wait until the published `port` of `service` accepts TCP connections
    ///
    /// Returns the resolved host and host port.
    pub fn wait_for_port(
        &self,
        service: &str,
        port: u16,
        timeout: Duration,
        pause: Duration,
    ) -> Result<(String, u16)> {
        let (host, published) = self.get_service_host_and_port(service, port)?;
        tracing::debug!("Waiting for {} on {}:{}", service, host, published);
        self.wait_until_responsive(|| tcp_check(&host, published, pause), timeout, pause)?;
        Ok((host, published))
    }

    /// Container backing `service`
    pub fn get_container(&self, service: &str) -> Result<ContainerInfo> {
        self.ensure_running()?;
        self.backend.get_container(service)
    }

    /// Host port that `port` of `service` is published on
    pub fn get_service_port(&self, service: &str, port: u16) -> Result<u16> {
        self.ensure_running()?;
        self.backend.get_service_port(service, port)
    }

    /// Host under which `service` is reachable from this process
    ///
    /// Inside a container with access to the engine socket, published ports
    /// are reached through the network gateway rather than loopback.
    pub fn get_service_host(&self, service: &str, port: u16) -> Result<String> {
        let container = self.get_container(service)?;
        if self.probe.inside_container() && self.probe.control_socket_available() {
            let id = container
                .id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    ComposeError::InvalidState(format!(
                        "container ID of service '{}' is not available",
                        service
                    ))
                })?;
            return self.control_plane.gateway_address(id);
        }

        self.backend.get_service_host(service, port)
    }

    /// Host and host port for `port` of `service`
    pub fn get_service_host_and_port(&self, service: &str, port: u16) -> Result<(String, u16)> {
        let published = self.get_service_port(service, port)?;
        let host = self.get_service_host(service, port)?;
        Ok((host, published))
    }
}

impl Drop for ComposeManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Failed to stop compose project {}: {}", self.project_name, e);
        }
    }
}

impl std::fmt::Debug for ComposeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeManager")
            .field("descriptor", &self.descriptor)
            .field("project_name", &self.project_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
