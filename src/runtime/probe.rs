//! Execution-context detection

use std::path::PathBuf;

/// Marker file the Docker engine creates in every container
pub const DOCKERENV_PATH: &str = "/.dockerenv";

/// Default Docker control socket
pub const DOCKER_SOCKET_PATH: &str = "/run/docker.sock";

/// Tells whether this process runs inside a container with engine access
pub trait ExecutionProbe {
    /// This process runs inside an isolated execution environment
    fn inside_container(&self) -> bool;
    /// The engine control socket is reachable from here
    fn control_socket_available(&self) -> bool;
}

/// Filesystem-based probe
#[derive(Debug, Clone)]
pub struct HostProbe {
    /// Marker file signalling a container environment
    pub marker: PathBuf,
    /// Control socket path
    pub socket: PathBuf,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self {
            marker: PathBuf::from(DOCKERENV_PATH),
            socket: PathBuf::from(DOCKER_SOCKET_PATH),
        }
    }
}

impl ExecutionProbe for HostProbe {
    fn inside_container(&self) -> bool {
        self.marker.exists()
    }

    fn control_socket_available(&self) -> bool {
        self.socket.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_probe_checks_paths() {
        let temp = tempfile::tempdir().unwrap();
        let probe = HostProbe {
            marker: temp.path().join(".dockerenv"),
            socket: temp.path().join("docker.sock"),
        };
        assert!(!probe.inside_container());
        assert!(!probe.control_socket_available());

        std::fs::write(&probe.marker, "").unwrap();
        std::fs::write(&probe.socket, "").unwrap();
        assert!(probe.inside_container());
        assert!(probe.control_socket_available());
    }
}
