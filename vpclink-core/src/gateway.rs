//! Gateway layer: private link to the load balancer and the public proxy route

use crate::error::{ConfigError, ReferenceError, Result};
use crate::exposure::LoadBalancer;
use crate::late_bound::LateBound;
use crate::topology::{Handle, NodeId, Topology};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

pub const DEFAULT_RESOURCE_PATH: &str = "mynlb";
pub const DEFAULT_STAGE: &str = "prod";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Matches every method
    #[default]
    Any,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Any => "ANY",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    #[default]
    Regional,
    Edge,
    Private,
}

impl EndpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::Regional => "REGIONAL",
            EndpointType::Edge => "EDGE",
            EndpointType::Private => "PRIVATE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectivityBridge {
    pub name: String,
    pub(crate) node: NodeId,
    pub targets: Vec<Handle<LoadBalancer>>,
}

/// Late-bound backend address of a route: the DNS name of a load balancer
#[derive(Debug, Clone)]
pub struct AddressSource {
    pub load_balancer: Handle<LoadBalancer>,
    pub dns_name: LateBound<String>,
}

/// Input for [`Topology::create_proxy_route`]
#[derive(Debug, Clone)]
pub struct ProxyRouteProps {
    pub bridge: Handle<ConnectivityBridge>,
    pub backend: AddressSource,
    pub http_method: HttpMethod,
    pub resource_path: String,
    pub stage: String,
    pub endpoint_type: EndpointType,
}

impl ProxyRouteProps {
    pub fn new(bridge: Handle<ConnectivityBridge>, backend: AddressSource) -> Self {
        Self {
            bridge,
            backend,
            http_method: HttpMethod::Any,
            resource_path: DEFAULT_RESOURCE_PATH.to_string(),
            stage: DEFAULT_STAGE.to_string(),
            endpoint_type: EndpointType::Regional,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    pub fn with_resource_path(mut self, path: impl Into<String>) -> Self {
        self.resource_path = path.into();
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_endpoint_type(mut self, endpoint_type: EndpointType) -> Self {
        self.endpoint_type = endpoint_type;
        self
    }
}

/// Public HTTP proxy route forwarding over a bridge
#[derive(Debug, Clone)]
pub struct ProxyRoute {
    pub name: String,
    pub(crate) node: NodeId,
    pub bridge: Handle<ConnectivityBridge>,
    pub load_balancer: Handle<LoadBalancer>,
    /// Method matched on the public resource
    pub http_method: HttpMethod,
    /// Method used towards the backend
    pub integration_method: HttpMethod,
    pub resource_path: String,
    pub stage: String,
    pub endpoint_type: EndpointType,
    backend: LateBound<String>,
    endpoint: LateBound<String>,
}

impl ProxyRoute {
    /// Routes always reach their backend over the private link
    pub fn connection_type(&self) -> &'static str {
        "VPC_LINK"
    }

    /// `http://<load balancer DNS name>`, once the name is known
    pub fn backend_uri(&self) -> Result<Url> {
        let host = self.backend.get()?;
        let uri = format!("http://{}", host);
        Url::parse(&uri).map_err(|_| ConfigError::InvalidAddress { address: uri }.into())
    }

    pub fn backend(&self) -> &LateBound<String> {
        &self.backend
    }

    /// Public invoke URL of the API, resolved by the backend
    pub fn endpoint(&self) -> &LateBound<String> {
        &self.endpoint
    }

    /// Public URL of this route's resource
    pub fn resource_url(&self) -> Result<Url> {
        let endpoint = self.endpoint.get()?;
        let base = Url::parse(endpoint).map_err(|_| ConfigError::InvalidAddress {
            address: endpoint.clone(),
        })?;
        base.join(&self.resource_path)
            .map_err(|_| {
                ConfigError::InvalidAddress {
                    address: format!("{}{}", endpoint, self.resource_path),
                }
                .into()
            })
    }
}

impl Topology {
    /// Private link from the gateway tier to one or more load balancers
    pub fn create_bridge(
        &mut self,
        name: &str,
        targets: &[Handle<LoadBalancer>],
    ) -> Result<Handle<ConnectivityBridge>> {
        if targets.is_empty() {
            return Err(ConfigError::EmptyBridge {
                bridge: name.to_string(),
            }
            .into());
        }

        let mut deps = Vec::with_capacity(targets.len());
        for target in targets {
            let lb = self.get(*target)?;
            self.ensure_defined(lb)?;
            deps.push(lb.node);
        }

        self.declare(name, deps, |node| ConnectivityBridge {
            name: name.to_string(),
            node,
            targets: targets.to_vec(),
        })
    }

    /// A bridge target must already forward its listeners somewhere
    fn ensure_defined(&self, lb: &LoadBalancer) -> Result<()> {
        let undefined = || ConfigError::UndefinedBridgeTarget {
            load_balancer: lb.name.clone(),
        };

        if lb.listeners.is_empty() {
            return Err(undefined().into());
        }
        for listener in &lb.listeners {
            if self.get(*listener)?.target_group.is_none() {
                return Err(undefined().into());
            }
        }
        Ok(())
    }

    /// Late-bound address of a load balancer, to be forwarded to by a route
    pub fn load_balancer_address(&self, load_balancer: Handle<LoadBalancer>) -> Result<AddressSource> {
        Ok(AddressSource {
            load_balancer,
            dns_name: self.load_balancer_dns(load_balancer)?,
        })
    }

    pub fn create_proxy_route(
        &mut self,
        name: &str,
        props: ProxyRouteProps,
    ) -> Result<Handle<ProxyRoute>> {
        let bridge = self.get(props.bridge)?;
        let bridge_node = bridge.node;
        let lb = self.get(props.backend.load_balancer)?;

        if !bridge.targets.contains(&props.backend.load_balancer) {
            return Err(ReferenceError::NotBridged {
                load_balancer: lb.name.clone(),
                bridge: bridge.name.clone(),
            }
            .into());
        }

        if !lb.dns_name.same_slot(&props.backend.dns_name) {
            return Err(ReferenceError::ForeignHandle {
                kind: "address source",
                index: props.backend.load_balancer.index(),
            }
            .into());
        }
        let lb_node = lb.node;

        tracing::debug!(
            "Route {} {} /{} -> {} via {}",
            name,
            props.http_method,
            props.resource_path,
            props.backend.dns_name.attribute(),
            bridge.name
        );

        self.declare(name, vec![bridge_node, lb_node], |node| ProxyRoute {
            name: name.to_string(),
            node,
            bridge: props.bridge,
            load_balancer: props.backend.load_balancer,
            http_method: props.http_method,
            integration_method: props.http_method,
            resource_path: props.resource_path,
            stage: props.stage,
            endpoint_type: props.endpoint_type,
            backend: props.backend.dns_name,
            endpoint: LateBound::new(format!("{}.Url", name)),
        })
    }
}
