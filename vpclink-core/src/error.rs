//! Error types for topology assembly

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopologyError>;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("{entity} is finalized and can no longer be modified")]
    ImmutableState { entity: String },

    #[error("Failed to load config from {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to render manifest: {0}")]
    ManifestRender(#[from] toml::ser::Error),
}

impl TopologyError {
    pub fn is_config(&self) -> bool {
        matches!(self, TopologyError::Config(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TopologyError::Reference(_))
    }

    pub fn is_immutable_state(&self) -> bool {
        matches!(self, TopologyError::ImmutableState { .. })
    }
}

/// Invalid or missing static configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Network {network} declares no subnet tiers")]
    EmptyTiers { network: String },

    #[error("Subnet tier {tier} has mask /{mask}, expected /16 to /28")]
    InvalidMask { tier: String, mask: u8 },

    #[error("Subnet tier {tier} (/{mask}) does not fit in {cidr}")]
    AddressSpaceExhausted {
        tier: String,
        mask: u8,
        cidr: String,
    },

    #[error("Duplicate subnet tier name: {tier}")]
    DuplicateTier { tier: String },

    #[error("Network {network} must span at least one availability zone")]
    NoAvailabilityZones { network: String },

    #[error("Name {name} is already used in this topology")]
    DuplicateName { name: String },

    #[error("No machine image declared for region {region}")]
    MissingImage { region: String },

    #[error("Health check {field} must be a positive duration")]
    NonPositiveDuration { field: &'static str },

    #[error("Health check timeout ({timeout:?}) must be shorter than its interval ({interval:?})")]
    TimeoutNotBelowInterval { timeout: Duration, interval: Duration },

    #[error("Target group on {listener} has no targets")]
    EmptyTargets { listener: String },

    #[error("Listener {listener} already forwards to a target group")]
    ListenerAlreadyBound { listener: String },

    #[error("Listener {listener} has no target group")]
    ListenerWithoutTargetGroup { listener: String },

    #[error("Bridge {bridge} has no target load balancers")]
    EmptyBridge { bridge: String },

    #[error("Load balancer {load_balancer} needs a listener with a target group before it can be bridged")]
    UndefinedBridgeTarget { load_balancer: String },

    #[error("Network {network} needs a public and a private-with-egress tier to be reachable")]
    Unreachable { network: String },

    #[error("Invalid backend address: {address}")]
    InvalidAddress { address: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// A reference to an entity that does not exist in this context, or that
/// belongs to another one
#[derive(Debug, Error, PartialEq)]
pub enum ReferenceError {
    #[error("{kind} handle #{index} was not created by this topology")]
    ForeignHandle { kind: &'static str, index: usize },

    #[error("Unknown {kind} #{index}")]
    UnknownEntity { kind: &'static str, index: usize },

    #[error("Subnet tier {tier} is not declared in network {network}")]
    UnknownTier { tier: String, network: String },

    #[error("{entity} belongs to network {actual}, expected {expected}")]
    NetworkMismatch {
        entity: String,
        expected: String,
        actual: String,
    },

    #[error("Load balancer {load_balancer} is not a target of bridge {bridge}")]
    NotBridged {
        load_balancer: String,
        bridge: String,
    },

    #[error("Attribute {attribute} has not been resolved yet")]
    Unresolved { attribute: String },

    #[error("Dangling dependency: {from} -> {to}")]
    Dangling { from: String, to: String },

    #[error("Cycle detected in dependencies: {path}")]
    CycleDetected { path: String },
}
