//! testcompose - Docker Compose specifications for integration tests
//!
//! testcompose builds compose files in code and runs them for the duration
//! of a test suite:
//!
//! - Typed compose model with a validating YAML codec
//! - Deep merge of partial specifications with pluggable conflict strategies
//! - Chainable specification builder
//! - Compose runtime manager with randomized project isolation, readiness
//!   polling and container-aware host resolution
//! - Scope-keyed sharing of running deployments between tests
//!
//! ```no_run
//! use std::time::Duration;
//! use testcompose::compose::{ComposeBuilder, Service};
//! use testcompose::harness::Harness;
//!
//! # fn main() -> testcompose::Result<()> {
//! let harness = Harness::from_env()?;
//! let mut builder = harness.builder()?;
//! builder
//!     .add_service("web", Service::from_image("nginx:1.27"))
//!     .set_ports("web", vec![80.into()])?;
//!
//! let deployment = harness.launch(&builder)?;
//! let (host, port) =
//!     deployment.wait_for_port("web", 80, Duration::from_secs(30), Duration::from_millis(500))?;
//! println!("nginx listening on {}:{}", host, port);
//! deployment.stop()
//! # }
//! ```

pub mod compose;
pub mod error;
pub mod harness;
pub mod runtime;

pub use error::{ComposeError, Result};
