//! Exposure layer: internal load balancer, listeners and target groups
//!
//! Health-check settings are packaged for the provisioning backend as
//! declared; nothing here probes the targets.

use crate::compute::ComputeInstance;
use crate::error::{ConfigError, ReferenceError, Result};
use crate::late_bound::LateBound;
use crate::network::Network;
use crate::security::Protocol;
use crate::topology::{Handle, NodeId, Topology};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthCheckProtocol {
    Http,
    Https,
    Tcp,
}

impl fmt::Display for HealthCheckProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCheckProtocol::Http => write!(f, "HTTP"),
            HealthCheckProtocol::Https => write!(f, "HTTPS"),
            HealthCheckProtocol::Tcp => write!(f, "TCP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub path: String,
    /// Port probed, either a number or `traffic-port`
    pub port: String,
    pub protocol: HealthCheckProtocol,
    pub interval: Duration,
    pub timeout: Duration,
}

impl HealthCheck {
    /// Both durations must be positive and the timeout shorter than the interval
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::NonPositiveDuration { field: "interval" }.into());
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositiveDuration { field: "timeout" }.into());
        }
        if self.timeout >= self.interval {
            return Err(ConfigError::TimeoutNotBelowInterval {
                timeout: self.timeout,
                interval: self.interval,
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadBalancerProps {
    /// False means internet-facing
    pub internal: bool,
    pub cross_zone: bool,
}

impl Default for LoadBalancerProps {
    fn default() -> Self {
        Self {
            internal: true,
            cross_zone: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub name: String,
    pub(crate) node: NodeId,
    pub network: Handle<Network>,
    pub internal: bool,
    pub cross_zone: bool,
    pub listeners: Vec<Handle<Listener>>,
    /// Known only once the backend has created the load balancer
    pub dns_name: LateBound<String>,
}

#[derive(Debug, Clone)]
pub struct Listener {
    pub name: String,
    pub(crate) node: NodeId,
    pub load_balancer: Handle<LoadBalancer>,
    pub port: u16,
    pub protocol: Protocol,
    pub target_group: Option<Handle<TargetGroup>>,
}

/// Input for [`Topology::add_target_group`]
#[derive(Debug, Clone)]
pub struct TargetGroupProps {
    pub port: u16,
    pub targets: Vec<Handle<ComputeInstance>>,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone)]
pub struct TargetGroup {
    pub name: String,
    pub(crate) node: NodeId,
    pub listener: Handle<Listener>,
    pub port: u16,
    pub protocol: Protocol,
    pub targets: Vec<Handle<ComputeInstance>>,
    pub health_check: HealthCheck,
}

impl Topology {
    pub fn create_load_balancer(
        &mut self,
        name: &str,
        network: Handle<Network>,
        props: LoadBalancerProps,
    ) -> Result<Handle<LoadBalancer>> {
        let network_node = self.get(network)?.node;

        self.declare(name, vec![network_node], |node| LoadBalancer {
            name: name.to_string(),
            node,
            network,
            internal: props.internal,
            cross_zone: props.cross_zone,
            listeners: Vec::new(),
            dns_name: LateBound::new(format!("{}.DnsName", name)),
        })
    }

    /// Bind a TCP port on a load balancer
    pub fn add_listener(&mut self, load_balancer: Handle<LoadBalancer>, port: u16) -> Result<Handle<Listener>> {
        let lb = self.get_mut(load_balancer)?;
        let lb_node = lb.node;
        let name = format!("{}/Listener{}", lb.name, port);

        let handle = self.declare(&name, vec![lb_node], |node| Listener {
            name: name.clone(),
            node,
            load_balancer,
            port,
            protocol: Protocol::Tcp,
            target_group: None,
        })?;

        self.get_mut(load_balancer)?.listeners.push(handle);
        Ok(handle)
    }

    /// Attach the single target group of a listener
    pub fn add_target_group(
        &mut self,
        listener: Handle<Listener>,
        props: TargetGroupProps,
    ) -> Result<Handle<TargetGroup>> {
        let entry = self.get_mut(listener)?;
        let listener_name = entry.name.clone();
        let listener_node = entry.node;
        let load_balancer = entry.load_balancer;

        if entry.target_group.is_some() {
            return Err(ConfigError::ListenerAlreadyBound {
                listener: listener_name,
            }
            .into());
        }

        if props.targets.is_empty() {
            return Err(ConfigError::EmptyTargets {
                listener: listener_name,
            }
            .into());
        }

        props.health_check.validate()?;

        let lb = self.get(load_balancer)?;
        let lb_network = lb.network;
        let mut deps = vec![listener_node];

        for target in &props.targets {
            let instance = self.get(*target)?;
            if instance.network != lb_network {
                return Err(ReferenceError::NetworkMismatch {
                    entity: instance.name.clone(),
                    expected: self.get(lb_network)?.name.clone(),
                    actual: self.get(instance.network)?.name.clone(),
                }
                .into());
            }
            deps.push(instance.node);
        }

        let name = format!("{}/TargetGroup", listener_name);
        tracing::debug!(
            "Target group {} -> {} target(s), health check {} {}:{} every {:?}",
            name,
            props.targets.len(),
            props.health_check.protocol,
            props.health_check.path,
            props.health_check.port,
            props.health_check.interval
        );

        let handle = self.declare(&name, deps, |node| TargetGroup {
            name: name.clone(),
            node,
            listener,
            port: props.port,
            protocol: Protocol::Tcp,
            targets: props.targets,
            health_check: props.health_check,
        })?;

        self.get_mut(listener)?.target_group = Some(handle);
        Ok(handle)
    }

    /// Late-bound DNS name of a load balancer, for use as a route backend
    pub fn load_balancer_dns(&self, load_balancer: Handle<LoadBalancer>) -> Result<LateBound<String>> {
        Ok(self.get(load_balancer)?.dns_name.clone())
    }
}
