//! Core library for private-service topologies
//!
//! Declares a VPC, a compute instance behind an internal network load
//! balancer, and a public REST API that reaches it through a VPC link.
//! Entities are created through an explicit [`Topology`] context, wired by
//! typed handles, validated and ordered by [`Topology::finalize`], and
//! materialized by a [`ProvisioningBackend`].

pub mod assembly;
pub mod backend;
pub mod compute;
pub mod config;
pub mod error;
pub mod exposure;
pub mod gateway;
pub mod late_bound;
pub mod network;
pub mod plan;
pub mod security;
pub mod topology;

pub use assembly::{assemble, Assembly};
pub use backend::{ProvisioningBackend, SimulatedBackend};
pub use config::{Config, ConfigLoader};
pub use error::{ConfigError, ReferenceError, Result, TopologyError};
pub use late_bound::LateBound;
pub use plan::{Outputs, Plan, AMI_ID_OUTPUT, API_ENDPOINT_OUTPUT};
pub use topology::{EntityKind, Handle, Lifecycle, Topology};
