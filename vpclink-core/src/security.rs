//! Security groups and their ingress rules

use crate::error::{ConfigError, Result};
use crate::network::Network;
use crate::topology::{Handle, NodeId, Topology};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Traffic source of an ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer(Ipv4Net);

impl Peer {
    /// `0.0.0.0/0`
    pub fn any_ipv4() -> Self {
        Peer(Ipv4Net::new_assert(Ipv4Addr::UNSPECIFIED, 0))
    }

    pub fn ipv4(cidr: Ipv4Net) -> Self {
        Peer(cidr.trunc())
    }

    /// Parse `any-ipv4` or an IPv4 CIDR
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "any-ipv4" | "anywhere" => Ok(Self::any_ipv4()),
            _ => s.parse::<Ipv4Net>().map(Self::ipv4).map_err(|_| {
                ConfigError::InvalidValue {
                    field: "ingress source",
                    value: s.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn cidr(&self) -> Ipv4Net {
        self.0
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub source: Peer,
    pub protocol: Protocol,
    pub port: u16,
    pub description: String,
}

impl IngressRule {
    pub fn new(source: Peer, protocol: Protocol, port: u16, description: impl Into<String>) -> Self {
        Self {
            source,
            protocol,
            port,
            description: description.into(),
        }
    }

    pub fn tcp(source: Peer, port: u16, description: impl Into<String>) -> Self {
        Self::new(source, Protocol::Tcp, port, description)
    }
}

/// Group-level settings for [`Topology::create_security_group`]
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityPolicy {
    pub description: String,
    /// Default egress: allow everything outbound
    pub allow_all_outbound: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            description: String::new(),
            allow_all_outbound: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub name: String,
    pub(crate) node: NodeId,
    pub network: Handle<Network>,
    pub description: String,
    pub allow_all_outbound: bool,
    pub ingress: Vec<IngressRule>,
}

impl Topology {
    pub fn create_security_group(
        &mut self,
        name: &str,
        network: Handle<Network>,
        policy: SecurityPolicy,
    ) -> Result<Handle<SecurityGroup>> {
        let network_node = self.get(network)?.node;

        self.declare(name, vec![network_node], |node| SecurityGroup {
            name: name.to_string(),
            node,
            network,
            description: policy.description,
            allow_all_outbound: policy.allow_all_outbound,
            ingress: Vec::new(),
        })
    }

    /// Append an ingress rule. Duplicates are kept.
    pub fn add_ingress_rule(&mut self, group: Handle<SecurityGroup>, rule: IngressRule) -> Result<()> {
        let group = self.get_mut(group)?;
        tracing::debug!(
            "Ingress on {}: {}/{} from {}",
            group.name,
            rule.protocol,
            rule.port,
            rule.source
        );
        group.ingress.push(rule);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReferenceError, TopologyError};
    use crate::network::{NetworkProps, SubnetKind, TierSpec};

    fn setup(topology: &mut Topology) -> Handle<SecurityGroup> {
        let vpc = topology
            .create_network(
                "MyVpc",
                NetworkProps::new(vec![TierSpec::new("Public", SubnetKind::Public, 24)]),
            )
            .unwrap();
        topology
            .create_security_group(
                "MySecurityGroup",
                vpc,
                SecurityPolicy {
                    description: "Allow HTTP inbound traffic".to_string(),
                    allow_all_outbound: true,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_any_ipv4() {
        assert_eq!(Peer::any_ipv4().to_string(), "0.0.0.0/0");
        assert_eq!(Peer::parse("any-ipv4").unwrap(), Peer::any_ipv4());
        assert_eq!(Peer::parse("10.1.0.0/16").unwrap().to_string(), "10.1.0.0/16");
        assert!(Peer::parse("not-a-cidr").unwrap_err().is_config());
    }

    #[test]
    fn test_duplicate_rules_are_additive() {
        let mut topology = Topology::new("Stack", "us-east-1");
        let sg = setup(&mut topology);
        let rule = IngressRule::tcp(Peer::any_ipv4(), 80, "Allow HTTP traffic");

        topology.add_ingress_rule(sg, rule.clone()).unwrap();
        topology.add_ingress_rule(sg, rule.clone()).unwrap();

        let group = topology.get(sg).unwrap();
        assert_eq!(group.ingress, vec![rule.clone(), rule]);
        assert!(group.allow_all_outbound);
    }

    #[test]
    fn test_rule_on_uncreated_group_fails() {
        let mut other = Topology::new("Other", "us-east-1");
        let foreign = setup(&mut other);

        let mut topology = Topology::new("Stack", "us-east-1");
        let err = topology
            .add_ingress_rule(foreign, IngressRule::tcp(Peer::any_ipv4(), 80, ""))
            .unwrap_err();
        assert!(err.is_reference());
    }

    #[test]
    fn test_group_requires_existing_network() {
        let mut other = Topology::new("Other", "us-east-1");
        let vpc = other
            .create_network(
                "MyVpc",
                NetworkProps::new(vec![TierSpec::new("Public", SubnetKind::Public, 24)]),
            )
            .unwrap();

        let mut topology = Topology::new("Stack", "us-east-1");
        let err = topology
            .create_security_group("MySecurityGroup", vpc, SecurityPolicy::default())
            .unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Reference(ReferenceError::ForeignHandle { .. })
        ));
    }

    #[test]
    fn test_rule_after_finalize_fails() {
        let mut topology = Topology::new("Stack", "us-east-1");
        let sg = setup(&mut topology);
        topology.finalize().unwrap();

        let err = topology
            .add_ingress_rule(sg, IngressRule::tcp(Peer::any_ipv4(), 443, "HTTPS"))
            .unwrap_err();
        assert!(err.is_immutable_state());
        assert!(topology.get(sg).unwrap().ingress.is_empty());
    }
}
