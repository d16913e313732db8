//! Docker Compose specification handling
//!
//! This module provides the typed compose model, its YAML codec, the deep
//! merge engine and the chainable [`ComposeBuilder`].

pub mod builder;
pub mod config;
pub mod merge;
pub mod parser;

pub use builder::ComposeBuilder;
pub use config::{
    ComposeSpecification, ListOrDict, Network, NetworkName, PortConfig, PortMapping, Service,
    ServiceNetworkConfig, ServiceNetworks,
};
pub use merge::{merge, DefaultStrategy, Disposition, FieldStrategy, MergeStrategy};
pub use parser::ComposeParser;
