//! Chainable builder over one in-memory compose specification

use super::config::{ComposeSpecification, Network, PortMapping, Service, ServiceNetworks};
use super::merge::{self, DefaultStrategy, MergeStrategy};
use super::parser::ComposeParser;
use crate::error::{ComposeError, Result};
use std::path::Path;

/// Compose specification builder
///
/// Every operation mutates the owned specification in place and hands the
/// builder back for chaining. Fallible operations leave the specification
/// untouched when they fail.
#[derive(Debug, Clone, Default)]
pub struct ComposeBuilder {
    spec: ComposeSpecification,
}

impl ComposeBuilder {
    /// Create a builder over an empty specification
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder over an existing specification
    pub fn from_spec(spec: ComposeSpecification) -> Self {
        Self { spec }
    }

    /// Current specification
    pub fn spec(&self) -> &ComposeSpecification {
        &self.spec
    }

    /// Consume the builder, returning its specification
    pub fn into_spec(self) -> ComposeSpecification {
        self.spec
    }

    /// Replace the current specification with the one stored at `path`
    pub fn from_base(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(ComposeError::InvalidArgument(
                "base compose file path is empty".to_string(),
            ));
        }
        if path.exists() && !path.is_file() {
            return Err(ComposeError::InvalidArgument(format!(
                "base compose file {} is not a regular file",
                path.display()
            )));
        }

        self.spec = ComposeParser::parse_file(path)?;
        tracing::debug!("Loaded base compose file {}", path.display());
        Ok(self)
    }

    /// Replace the current specification with one parsed from YAML text
    pub fn from_base_str(&mut self, content: &str) -> Result<&mut Self> {
        self.spec = ComposeParser::parse_str(content)?;
        Ok(self)
    }

    /// Define or replace a network
    pub fn set_networks(&mut self, name: &str, network: Network) -> &mut Self {
        self.spec
            .networks
            .get_or_insert_with(Default::default)
            .insert(name.to_string(), Some(network));
        self
    }

    /// Attach an existing service to networks (`None` clears the attachment)
    pub fn set_service_networks(
        &mut self,
        service: &str,
        networks: Option<ServiceNetworks>,
    ) -> Result<&mut Self> {
        self.existing_service(service)?.networks = networks;
        Ok(self)
    }

    /// Set the port mappings of an existing service
    pub fn set_ports(&mut self, service: &str, ports: Vec<PortMapping>) -> Result<&mut Self> {
        self.existing_service(service)?.ports = Some(ports);
        Ok(self)
    }

    /// Drop the port mappings of an existing service
    pub fn remove_ports(&mut self, service: &str) -> Result<&mut Self> {
        self.existing_service(service)?.ports = None;
        Ok(self)
    }

    /// Add or replace a service
    pub fn add_service(&mut self, name: &str, service: Service) -> &mut Self {
        tracing::debug!("Adding service {}", name);
        self.spec
            .services
            .get_or_insert_with(Default::default)
            .insert(name.to_string(), service);
        self
    }

    /// Remove a service; removing an unknown service is a no-op
    pub fn remove_service(&mut self, name: &str) -> &mut Self {
        if let Some(services) = self.spec.services.as_mut() {
            if services.remove(name).is_some() {
                tracing::debug!("Removed service {}", name);
            }
        }
        self
    }

    /// Deep-merge a partial specification using the default strategy
    pub fn merge_partial(&mut self, partial: &ComposeSpecification) -> Result<&mut Self> {
        self.merge_partial_with_strategy(partial, &DefaultStrategy)
    }

    /// Deep-merge a partial specification using `strategy`
    pub fn merge_partial_with_strategy(
        &mut self,
        partial: &ComposeSpecification,
        strategy: &dyn MergeStrategy,
    ) -> Result<&mut Self> {
        self.spec = merge::merge(&self.spec, partial, strategy)?;
        Ok(self)
    }

    /// Render the current specification as YAML
    pub fn build_config(&self, omit_absent: bool) -> Result<String> {
        ComposeParser::serialize(&self.spec, omit_absent)
    }

    fn existing_service(&mut self, name: &str) -> Result<&mut Service> {
        self.spec
            .service_mut(name)
            .ok_or_else(|| ComposeError::service_not_found(name))
    }
}
