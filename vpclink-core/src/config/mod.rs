//! Topology configuration
//!
//! Every key has a default, so an empty file (or no file at all) describes
//! the reference deployment: one VPC with a public and a private tier, an
//! nginx instance behind an internal load balancer, and a REST API reaching
//! it through a VPC link.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    Config, GatewayConfig, HealthCheckConfig, IngressConfig, InstanceConfig, LoadBalancerConfig,
    NetworkConfig, SecurityGroupConfig, StackConfig, TargetGroupConfig, TierConfig,
};
