//! Assembly context
//!
//! A [`Topology`] owns every entity declared through it. Creation calls return
//! typed [`Handle`]s that are only valid against the topology that issued
//! them, and record explicit dependency edges so that [`Topology::finalize`]
//! can order and validate the graph without relying on call order.

use crate::compute::ComputeInstance;
use crate::error::{ConfigError, ReferenceError, Result, TopologyError};
use crate::exposure::{Listener, LoadBalancer, TargetGroup};
use crate::gateway::{ConnectivityBridge, ProxyRoute};
use crate::network::{Network, SubnetKind};
use crate::plan::Plan;
use crate::security::SecurityGroup;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Kind of entity stored in a topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Network,
    SecurityGroup,
    ComputeInstance,
    LoadBalancer,
    Listener,
    TargetGroup,
    ConnectivityBridge,
    ProxyRoute,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Network => "network",
            EntityKind::SecurityGroup => "security_group",
            EntityKind::ComputeInstance => "compute_instance",
            EntityKind::LoadBalancer => "load_balancer",
            EntityKind::Listener => "listener",
            EntityKind::TargetGroup => "target_group",
            EntityKind::ConnectivityBridge => "connectivity_bridge",
            EntityKind::ProxyRoute => "proxy_route",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entity lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Created, references not yet checked as a whole
    Declared,
    /// Every dependency edge validated
    Linked,
    /// Handed to the provisioning backend
    Finalized,
}

/// Index of a node in the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: EntityKind,
    pub state: Lifecycle,
    pub(crate) deps: Vec<NodeId>,
}

/// All entities of a topology, one arena per kind
#[derive(Debug, Clone, Default)]
pub struct Entities {
    pub networks: Vec<Network>,
    pub security_groups: Vec<SecurityGroup>,
    pub instances: Vec<ComputeInstance>,
    pub load_balancers: Vec<LoadBalancer>,
    pub listeners: Vec<Listener>,
    pub target_groups: Vec<TargetGroup>,
    pub bridges: Vec<ConnectivityBridge>,
    pub proxy_routes: Vec<ProxyRoute>,
}

/// Implemented by every entity type so that handles can be resolved generically
pub trait Entity: Sized + 'static {
    const KIND: EntityKind;

    fn arena(entities: &Entities) -> &Vec<Self>;

    fn arena_mut(entities: &mut Entities) -> &mut Vec<Self>;

    fn node(&self) -> NodeId;

    fn name(&self) -> &str;
}

macro_rules! impl_entity {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn arena(entities: &Entities) -> &Vec<Self> {
                &entities.$field
            }

            fn arena_mut(entities: &mut Entities) -> &mut Vec<Self> {
                &mut entities.$field
            }

            fn node(&self) -> NodeId {
                self.node
            }

            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

impl_entity!(Network, Network, networks);
impl_entity!(SecurityGroup, SecurityGroup, security_groups);
impl_entity!(ComputeInstance, ComputeInstance, instances);
impl_entity!(LoadBalancer, LoadBalancer, load_balancers);
impl_entity!(Listener, Listener, listeners);
impl_entity!(TargetGroup, TargetGroup, target_groups);
impl_entity!(ConnectivityBridge, ConnectivityBridge, bridges);
impl_entity!(ProxyRoute, ProxyRoute, proxy_routes);

/// Typed reference to an entity owned by a specific topology
pub struct Handle<T> {
    context: u64,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(context: u64, index: usize) -> Self {
        Self {
            context,
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context && self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.hash(state);
        self.index.hash(state);
    }
}

impl<T: Entity> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>#{}@{}", T::KIND, self.index, self.context)
    }
}

/// Explicit assembly context holding one topology
#[derive(Debug)]
pub struct Topology {
    context: u64,
    name: String,
    region: String,
    account: Option<String>,
    entities: Entities,
    nodes: Vec<Node>,
    finalized: bool,
}

impl Topology {
    /// Create an empty topology targeting a region
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            context: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            region: region.into(),
            account: None,
            entities: Entities::default(),
            nodes: Vec::new(),
            finalized: false,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
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

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Look up an entity by handle
    pub fn get<T: Entity>(&self, handle: Handle<T>) -> Result<&T> {
        if handle.context != self.context {
            return Err(ReferenceError::ForeignHandle {
                kind: T::KIND.as_str(),
                index: handle.index,
            }
            .into());
        }

        T::arena(&self.entities).get(handle.index).ok_or_else(|| {
            ReferenceError::UnknownEntity {
                kind: T::KIND.as_str(),
                index: handle.index,
            }
            .into()
        })
    }

    /// Look up an entity for mutation; fails once it is finalized
    pub(crate) fn get_mut<T: Entity>(&mut self, handle: Handle<T>) -> Result<&mut T> {
        let node = self.get(handle)?.node();
        let state = &self.nodes[node.0];
        if state.state == Lifecycle::Finalized {
            return Err(TopologyError::ImmutableState {
                entity: state.name.clone(),
            });
        }

        Ok(&mut T::arena_mut(&mut self.entities)[handle.index])
    }

    /// Lifecycle state of an entity
    pub fn state_of<T: Entity>(&self, handle: Handle<T>) -> Result<Lifecycle> {
        let node = self.get(handle)?.node();
        Ok(self.nodes[node.0].state)
    }

    /// Names of the entities an entity depends on
    pub fn dependencies_of<T: Entity>(&self, handle: Handle<T>) -> Result<Vec<&str>> {
        let node = self.get(handle)?.node();
        Ok(self.nodes[node.0]
            .deps
            .iter()
            .map(|dep| self.node_name(*dep))
            .collect())
    }

    /// Record a new entity, its name and its dependency edges
    pub(crate) fn declare<T: Entity>(
        &mut self,
        name: &str,
        deps: Vec<NodeId>,
        build: impl FnOnce(NodeId) -> T,
    ) -> Result<Handle<T>> {
        self.ensure_open()?;

        if self.nodes.iter().any(|n| n.name == name) {
            return Err(ConfigError::DuplicateName {
                name: name.to_string(),
            }
            .into());
        }

        let node = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            kind: T::KIND,
            state: Lifecycle::Declared,
            deps,
        });

        let arena = T::arena_mut(&mut self.entities);
        arena.push(build(node));
        tracing::debug!("Declared {} {}", T::KIND, name);

        Ok(Handle::new(self.context, arena.len() - 1))
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.finalized {
            return Err(TopologyError::ImmutableState {
                entity: self.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn node_name(&self, node: NodeId) -> &str {
        self.nodes
            .get(node.0)
            .map(|n| n.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// Validate the graph, order it and hand out an immutable snapshot
    ///
    /// Every dependency edge must point at an existing node, the graph must be
    /// acyclic and the topology-level invariants must hold. On success every
    /// entity is `Finalized` and further mutation fails.
    pub fn finalize(&mut self) -> Result<Plan> {
        self.ensure_open()?;

        self.check_edges()?;
        for node in &mut self.nodes {
            node.state = Lifecycle::Linked;
        }

        self.check_invariants()?;
        let order = self.dependency_order()?;

        for node in &mut self.nodes {
            node.state = Lifecycle::Finalized;
        }
        self.finalized = true;

        tracing::info!(
            "Finalized topology {} with {} entities",
            self.name,
            self.nodes.len()
        );

        Ok(Plan::new(
            self.name.clone(),
            self.region.clone(),
            self.account.clone(),
            self.entities.clone(),
            self.nodes.clone(),
            order,
        ))
    }

    fn check_edges(&self) -> Result<()> {
        for node in &self.nodes {
            for dep in &node.deps {
                if dep.0 >= self.nodes.len() {
                    return Err(ReferenceError::Dangling {
                        from: node.name.clone(),
                        to: format!("#{}", dep.0),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_invariants(&self) -> Result<()> {
        for listener in &self.entities.listeners {
            if listener.target_group.is_none() {
                return Err(ConfigError::ListenerWithoutTargetGroup {
                    listener: listener.name.clone(),
                }
                .into());
            }
        }

        // Routed load balancers need a network that can reach the outside
        for route in &self.entities.proxy_routes {
            let lb = self.get(route.load_balancer)?;
            let network = self.get(lb.network)?;
            if !network.has_tier_kind(SubnetKind::Public)
                || !network.has_tier_kind(SubnetKind::PrivateWithEgress)
            {
                return Err(ConfigError::Unreachable {
                    network: network.name.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Depth-first ordering, dependencies before dependents
    fn dependency_order(&self) -> Result<Vec<NodeId>> {
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for index in 0..self.nodes.len() {
            let mut path = Vec::new();
            self.visit(NodeId(index), &mut visited, &mut path, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        node: NodeId,
        visited: &mut HashSet<NodeId>,
        path: &mut Vec<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<()> {
        if path.contains(&node) {
            path.push(node);
            let names: Vec<&str> = path.iter().map(|n| self.node_name(*n)).collect();
            return Err(ReferenceError::CycleDetected {
                path: names.join(" -> "),
            }
            .into());
        }

        if visited.contains(&node) {
            return Ok(());
        }

        visited.insert(node);
        path.push(node);

        for dep in &self.nodes[node.0].deps {
            self.visit(*dep, visited, path, order)?;
        }

        path.pop();
        order.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkProps, TierSpec};

    fn vpc(topology: &mut Topology) -> Handle<Network> {
        topology
            .create_network(
                "MyVpc",
                NetworkProps::new(vec![
                    TierSpec::new("Public", SubnetKind::Public, 24),
                    TierSpec::new("Private", SubnetKind::PrivateWithEgress, 24),
                ]),
            )
            .unwrap()
    }

    #[test]
    fn test_handles_are_scoped_to_their_topology() {
        let mut first = Topology::new("First", "us-east-1");
        let mut second = Topology::new("Second", "us-east-1");
        let net = vpc(&mut first);
        vpc(&mut second);

        assert!(first.get(net).is_ok());
        let err = second.get(net).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Reference(ReferenceError::ForeignHandle { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut topology = Topology::new("Stack", "us-east-1");
        vpc(&mut topology);
        let err = topology
            .create_network(
                "MyVpc",
                NetworkProps::new(vec![TierSpec::new("Public", SubnetKind::Public, 24)]),
            )
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_finalize_marks_all_finalized() {
        let mut topology = Topology::new("Stack", "us-east-1");
        let net = vpc(&mut topology);
        assert_eq!(topology.state_of(net).unwrap(), Lifecycle::Declared);

        let plan = topology.finalize().unwrap();
        assert_eq!(topology.state_of(net).unwrap(), Lifecycle::Finalized);
        assert_eq!(plan.order_names(), vec!["MyVpc"]);
    }

    #[test]
    fn test_finalize_twice_fails() {
        let mut topology = Topology::new("Stack", "us-east-1");
        vpc(&mut topology);
        topology.finalize().unwrap();
        assert!(topology.finalize().unwrap_err().is_immutable_state());
    }

    #[test]
    fn test_declare_after_finalize_fails() {
        let mut topology = Topology::new("Stack", "us-east-1");
        topology.finalize().unwrap();
        let err = topology
            .create_network(
                "Late",
                NetworkProps::new(vec![TierSpec::new("Public", SubnetKind::Public, 24)]),
            )
            .unwrap_err();
        assert!(err.is_immutable_state());
    }

    #[test]
    fn test_dangling_edge_detected() {
        let mut topology = Topology::new("Stack", "us-east-1");
        let net = vpc(&mut topology);
        let node = topology.get(net).unwrap().node();
        topology.nodes[node.0].deps.push(NodeId(42));

        let err = topology.finalize().unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Reference(ReferenceError::Dangling { .. })
        ));
        assert!(!topology.is_finalized());
    }

    #[test]
    fn test_cycle_detected() {
        let mut topology = Topology::new("Stack", "us-east-1");
        let net = vpc(&mut topology);
        let node = topology.get(net).unwrap().node();
        topology.nodes[node.0].deps.push(node);

        let err = topology.finalize().unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Reference(ReferenceError::CycleDetected { .. })
        ));
    }
}
