//! Network layer: the VPC and its subnet tiers

use crate::error::{ConfigError, Result};
use crate::topology::{Handle, NodeId, Topology};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Narrowest and widest subnet masks a tier may request
pub const MIN_MASK: u8 = 16;
pub const MAX_MASK: u8 = 28;

/// Routing type of a subnet tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    /// Routed through an internet gateway
    Public,
    /// Private, with outbound traffic through a NAT in a public tier
    PrivateWithEgress,
}

impl SubnetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetKind::Public => "public",
            SubnetKind::PrivateWithEgress => "private_with_egress",
        }
    }
}

/// The block used when no CIDR is given
pub const DEFAULT_CIDR: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 16);

pub fn default_cidr() -> Ipv4Net {
    DEFAULT_CIDR
}

/// Requested subnet tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierSpec {
    pub name: String,
    pub kind: SubnetKind,
    pub mask: u8,
}

impl TierSpec {
    pub fn new(name: impl Into<String>, kind: SubnetKind, mask: u8) -> Self {
        Self {
            name: name.into(),
            kind,
            mask,
        }
    }
}

/// Input for [`Topology::create_network`]
#[derive(Debug, Clone)]
pub struct NetworkProps {
    pub cidr: Ipv4Net,
    /// Number of availability zones; every tier gets one subnet per zone
    pub max_azs: u8,
    pub tiers: Vec<TierSpec>,
}

impl NetworkProps {
    /// Props with the default `10.0.0.0/16` block spanning one zone
    pub fn new(tiers: Vec<TierSpec>) -> Self {
        Self {
            cidr: default_cidr(),
            max_azs: 1,
            tiers,
        }
    }

    pub fn with_cidr(mut self, cidr: Ipv4Net) -> Self {
        self.cidr = cidr;
        self
    }

    pub fn with_max_azs(mut self, max_azs: u8) -> Self {
        self.max_azs = max_azs;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub name: String,
    pub availability_zone: String,
    pub cidr: Ipv4Net,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubnetTier {
    pub name: String,
    pub kind: SubnetKind,
    pub mask: u8,
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub name: String,
    pub(crate) node: NodeId,
    pub cidr: Ipv4Net,
    pub availability_zones: Vec<String>,
    pub tiers: Vec<SubnetTier>,
}

impl Network {
    pub fn tier(&self, name: &str) -> Option<&SubnetTier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    pub fn has_tier_kind(&self, kind: SubnetKind) -> bool {
        self.tiers.iter().any(|t| t.kind == kind)
    }

    pub fn subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.tiers.iter().flat_map(|t| t.subnets.iter())
    }
}

impl Topology {
    /// Declare a network and carve its tiers out of the address block
    pub fn create_network(&mut self, name: &str, props: NetworkProps) -> Result<Handle<Network>> {
        self.ensure_open()?;

        if props.tiers.is_empty() {
            return Err(ConfigError::EmptyTiers {
                network: name.to_string(),
            }
            .into());
        }

        if props.max_azs == 0 {
            return Err(ConfigError::NoAvailabilityZones {
                network: name.to_string(),
            }
            .into());
        }
        if props.max_azs > 26 {
            return Err(ConfigError::InvalidValue {
                field: "max_azs",
                value: props.max_azs.to_string(),
            }
            .into());
        }

        let availability_zones: Vec<String> = (0..props.max_azs)
            .map(|i| format!("{}{}", self.region(), (b'a' + i) as char))
            .collect();

        let cidr = props.cidr.trunc();
        let tiers = allocate_tiers(cidr, &availability_zones, &props.tiers)?;

        for tier in &tiers {
            for subnet in &tier.subnets {
                tracing::debug!(
                    "Subnet {} ({}) in {}: {}",
                    subnet.name,
                    tier.kind.as_str(),
                    subnet.availability_zone,
                    subnet.cidr
                );
            }
        }

        self.declare(name, vec![], |node| Network {
            name: name.to_string(),
            node,
            cidr,
            availability_zones,
            tiers,
        })
    }
}

/// Assign each tier one aligned block per zone, in declaration order
fn allocate_tiers(cidr: Ipv4Net, zones: &[String], specs: &[TierSpec]) -> Result<Vec<SubnetTier>> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(ConfigError::DuplicateTier {
                tier: spec.name.clone(),
            }
            .into());
        }
        if !(MIN_MASK..=MAX_MASK).contains(&spec.mask) {
            return Err(ConfigError::InvalidMask {
                tier: spec.name.clone(),
                mask: spec.mask,
            }
            .into());
        }
    }

    let base = u64::from(u32::from(cidr.network()));
    let end = base + (1u64 << (32 - cidr.prefix_len()));
    let mut cursor = base;
    let mut tiers = Vec::with_capacity(specs.len());

    for spec in specs {
        let exhausted = || ConfigError::AddressSpaceExhausted {
            tier: spec.name.clone(),
            mask: spec.mask,
            cidr: cidr.to_string(),
        };

        if spec.mask < cidr.prefix_len() {
            return Err(exhausted().into());
        }

        let size = 1u64 << (32 - spec.mask);
        let mut subnets = Vec::with_capacity(zones.len());

        for (i, zone) in zones.iter().enumerate() {
            let start = cursor.div_ceil(size) * size;
            if start + size > end {
                return Err(exhausted().into());
            }

            let addr = Ipv4Addr::from(start as u32);
            let net = Ipv4Net::new(addr, spec.mask).map_err(|_| ConfigError::InvalidMask {
                tier: spec.name.clone(),
                mask: spec.mask,
            })?;

            subnets.push(Subnet {
                name: format!("{}Subnet{}", spec.name, i + 1),
                availability_zone: zone.clone(),
                cidr: net,
            });
            cursor = start + size;
        }

        tiers.push(SubnetTier {
            name: spec.name.clone(),
            kind: spec.kind,
            mask: spec.mask,
            subnets,
        });
    }

    Ok(tiers)
}
