//! Finalized topology snapshot handed to the provisioning backend

use crate::error::Result;
use crate::late_bound::LateBound;
use crate::topology::{Entities, Entity, EntityKind, Handle, Lifecycle, Node, NodeId};
use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use toml::{Table, Value};

/// Output name of the machine image id
pub const AMI_ID_OUTPUT: &str = "AMI_ID";
/// Output name of the public API endpoint
pub const API_ENDPOINT_OUTPUT: &str = "ApiEndpoint";

/// Immutable, dependency-ordered view of a finalized topology
///
/// Late-bound attributes are shared with the topology they came from, so the
/// backend can resolve them through the plan.
#[derive(Debug, Clone)]
pub struct Plan {
    name: String,
    region: String,
    account: Option<String>,
    entities: Entities,
    nodes: Vec<Node>,
    order: Vec<NodeId>,
}

/// Named results the caller needs after provisioning
#[derive(Debug, Clone)]
pub struct Outputs {
    pub ami_id: Option<String>,
    pub api_endpoint: Option<LateBound<String>>,
}

impl Plan {
    pub(crate) fn new(
        name: String,
        region: String,
        account: Option<String>,
        entities: Entities,
        nodes: Vec<Node>,
        order: Vec<NodeId>,
    ) -> Self {
        Self {
            name,
            region,
            account,
            entities,
            nodes,
            order,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Entity names, dependencies first
    pub fn order_names(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|id| self.nodes[id.0].name.as_str())
            .collect()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    pub fn state(&self, name: &str) -> Option<Lifecycle> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.state)
    }

    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .map(|n| {
                n.deps
                    .iter()
                    .map(|dep| self.nodes[dep.0].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Name of an entity referenced from inside the plan
    pub fn name_of<T: Entity>(&self, handle: Handle<T>) -> &str {
        T::arena(&self.entities)
            .get(handle.index())
            .map(|e| e.name())
            .unwrap_or("<unknown>")
    }

    pub fn outputs(&self) -> Outputs {
        Outputs {
            ami_id: self.entities.instances.first().map(|i| i.image_id.clone()),
            api_endpoint: self
                .entities
                .proxy_routes
                .first()
                .map(|r| r.endpoint().clone()),
        }
    }

    /// Serializable description of the plan
    pub fn manifest(&self) -> Manifest {
        let outputs = self.outputs();
        let mut output_values = IndexMap::new();
        if let Some(ami_id) = outputs.ami_id {
            output_values.insert(AMI_ID_OUTPUT.to_string(), ami_id);
        }
        if let Some(endpoint) = outputs.api_endpoint {
            output_values.insert(API_ENDPOINT_OUTPUT.to_string(), late_value(&endpoint));
        }

        let resources = self
            .order
            .iter()
            .map(|id| {
                let node = &self.nodes[id.0];
                Resource {
                    name: node.name.clone(),
                    kind: node.kind,
                    state: node.state,
                    depends_on: self
                        .dependencies(&node.name)
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    properties: self.properties(*id, node.kind),
                }
            })
            .collect();

        Manifest {
            stack: StackInfo {
                name: self.name.clone(),
                region: self.region.clone(),
                account: self.account.clone(),
                synthesized_at: Utc::now().to_rfc3339(),
            },
            outputs: output_values,
            resources,
        }
    }

    /// Manifest rendered as TOML
    pub fn render(&self) -> Result<String> {
        Ok(toml::to_string_pretty(&self.manifest())?)
    }

    fn properties(&self, id: NodeId, kind: EntityKind) -> Table {
        let mut props = Table::new();
        let e = &self.entities;

        match kind {
            EntityKind::Network => {
                if let Some(n) = e.networks.iter().find(|n| n.node == id) {
                    props.insert("cidr".into(), n.cidr.to_string().into());
                    props.insert(
                        "availability_zones".into(),
                        n.availability_zones.clone().into(),
                    );
                    let subnets: Vec<Value> = n
                        .tiers
                        .iter()
                        .flat_map(|t| {
                            t.subnets.iter().map(move |s| {
                                let mut sub = Table::new();
                                sub.insert("name".into(), s.name.clone().into());
                                sub.insert("tier".into(), t.name.clone().into());
                                sub.insert("kind".into(), t.kind.as_str().into());
                                sub.insert("availability_zone".into(), s.availability_zone.clone().into());
                                sub.insert("cidr".into(), s.cidr.to_string().into());
                                Value::Table(sub)
                            })
                        })
                        .collect();
                    props.insert("subnets".into(), Value::Array(subnets));
                }
            }
            EntityKind::SecurityGroup => {
                if let Some(g) = e.security_groups.iter().find(|g| g.node == id) {
                    props.insert("network".into(), self.name_of(g.network).into());
                    props.insert("description".into(), g.description.clone().into());
                    props.insert("allow_all_outbound".into(), g.allow_all_outbound.into());
                    let rules: Vec<Value> = g
                        .ingress
                        .iter()
                        .map(|r| {
                            let mut rule = Table::new();
                            rule.insert("source".into(), r.source.to_string().into());
                            rule.insert("protocol".into(), r.protocol.to_string().into());
                            rule.insert("port".into(), i64::from(r.port).into());
                            rule.insert("description".into(), r.description.clone().into());
                            Value::Table(rule)
                        })
                        .collect();
                    props.insert("ingress".into(), Value::Array(rules));
                }
            }
            EntityKind::ComputeInstance => {
                if let Some(i) = e.instances.iter().find(|i| i.node == id) {
                    props.insert("class".into(), i.class.clone().into());
                    props.insert("image_id".into(), i.image_id.clone().into());
                    props.insert("subnet".into(), i.subnet.name.clone().into());
                    props.insert("security_group".into(), self.name_of(i.security_group).into());
                    props.insert("user_data".into(), i.boot_script.render().into());
                }
            }
            EntityKind::LoadBalancer => {
                if let Some(lb) = e.load_balancers.iter().find(|lb| lb.node == id) {
                    props.insert("network".into(), self.name_of(lb.network).into());
                    props.insert("internal".into(), lb.internal.into());
                    props.insert("cross_zone".into(), lb.cross_zone.into());
                    props.insert("dns_name".into(), late_value(&lb.dns_name).into());
                }
            }
            EntityKind::Listener => {
                if let Some(l) = e.listeners.iter().find(|l| l.node == id) {
                    props.insert("port".into(), i64::from(l.port).into());
                    props.insert("protocol".into(), l.protocol.to_string().into());
                }
            }
            EntityKind::TargetGroup => {
                if let Some(tg) = e.target_groups.iter().find(|tg| tg.node == id) {
                    let targets: Vec<String> =
                        tg.targets.iter().map(|t| self.name_of(*t).to_string()).collect();
                    let hc = &tg.health_check;
                    let mut check = Table::new();
                    check.insert("path".into(), hc.path.clone().into());
                    check.insert("port".into(), hc.port.clone().into());
                    check.insert("protocol".into(), hc.protocol.to_string().into());
                    check.insert("interval_seconds".into(), (hc.interval.as_secs() as i64).into());
                    check.insert("timeout_seconds".into(), (hc.timeout.as_secs() as i64).into());

                    props.insert("port".into(), i64::from(tg.port).into());
                    props.insert("protocol".into(), tg.protocol.to_string().into());
                    props.insert("targets".into(), targets.into());
                    props.insert("health_check".into(), Value::Table(check));
                }
            }
            EntityKind::ConnectivityBridge => {
                if let Some(b) = e.bridges.iter().find(|b| b.node == id) {
                    let targets: Vec<String> =
                        b.targets.iter().map(|t| self.name_of(*t).to_string()).collect();
                    props.insert("targets".into(), targets.into());
                }
            }
            EntityKind::ProxyRoute => {
                if let Some(r) = e.proxy_routes.iter().find(|r| r.node == id) {
                    let uri = match r.backend_uri() {
                        Ok(uri) => uri.to_string(),
                        Err(_) => format!("http://{}", late_value(r.backend())),
                    };
                    props.insert("resource_path".into(), r.resource_path.clone().into());
                    props.insert("http_method".into(), r.http_method.as_str().into());
                    props.insert("integration_type".into(), "HTTP_PROXY".into());
                    props.insert("integration_method".into(), r.integration_method.as_str().into());
                    props.insert("uri".into(), uri.into());
                    props.insert("connection_type".into(), r.connection_type().into());
                    props.insert("bridge".into(), self.name_of(r.bridge).into());
                    props.insert("endpoint_type".into(), r.endpoint_type.as_str().into());
                    props.insert("stage".into(), r.stage.clone().into());
                }
            }
        }

        props
    }
}

/// Resolved value, or a `${Attribute}` token when still pending
fn late_value(value: &LateBound<String>) -> String {
    match value.get() {
        Ok(v) => v.clone(),
        Err(_) => format!("${{{}}}", value.attribute()),
    }
}

#[derive(Debug, Serialize)]
pub struct Manifest {
    pub stack: StackInfo,
    pub outputs: IndexMap<String, String>,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Serialize)]
pub struct StackInfo {
    pub name: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub synthesized_at: String,
}

#[derive(Debug, Serialize)]
pub struct Resource {
    pub name: String,
    pub kind: EntityKind,
    pub state: Lifecycle,
    pub depends_on: Vec<String>,
    pub properties: Table,
}
