//! Compute layer: the instance serving the private web service

use crate::error::{ConfigError, ReferenceError, Result};
use crate::network::{Network, Subnet};
use crate::security::SecurityGroup;
use crate::topology::{Handle, NodeId, Topology};
use indexmap::IndexMap;

/// Shebang prepended to the rendered boot script
const BOOT_SCRIPT_HEADER: &str = "#!/bin/bash";

/// Machine image resolved per region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineImage {
    images: IndexMap<String, String>,
}

impl MachineImage {
    /// A generic Linux image given as a region -> image id map
    pub fn generic_linux(images: IndexMap<String, String>) -> Self {
        Self { images }
    }

    pub fn for_region(region: impl Into<String>, image_id: impl Into<String>) -> Self {
        let mut images = IndexMap::new();
        images.insert(region.into(), image_id.into());
        Self { images }
    }

    pub fn image_for(&self, region: &str) -> Result<&str> {
        self.images
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| {
                ConfigError::MissingImage {
                    region: region.to_string(),
                }
                .into()
            })
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }
}

/// Opaque commands run once at first boot
///
/// Blocks are kept exactly as given; nothing here parses or checks them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootScript {
    blocks: Vec<String>,
}

impl BootScript {
    pub fn new(commands: impl Into<String>) -> Self {
        Self {
            blocks: vec![commands.into()],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, commands: impl Into<String>) {
        self.blocks.push(commands.into());
    }

    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Script text handed to the guest
    pub fn render(&self) -> String {
        let mut script = String::from(BOOT_SCRIPT_HEADER);
        for block in &self.blocks {
            script.push('\n');
            script.push_str(block);
        }
        script
    }
}

/// Input for [`Topology::create_instance`]
#[derive(Debug, Clone)]
pub struct InstanceProps {
    pub network: Handle<Network>,
    /// Name of the subnet tier to place the instance in
    pub tier: String,
    /// Instance class, e.g. `t2.micro`
    pub class: String,
    pub image: MachineImage,
    pub security_group: Handle<SecurityGroup>,
    pub boot_script: BootScript,
}

#[derive(Debug, Clone)]
pub struct ComputeInstance {
    pub name: String,
    pub(crate) node: NodeId,
    pub network: Handle<Network>,
    pub tier: String,
    /// Subnet the instance is placed in (first zone of its tier)
    pub subnet: Subnet,
    pub class: String,
    pub image: MachineImage,
    /// Image id selected for the topology's region
    pub image_id: String,
    pub security_group: Handle<SecurityGroup>,
    pub boot_script: BootScript,
}

impl Topology {
    pub fn create_instance(
        &mut self,
        name: &str,
        props: InstanceProps,
    ) -> Result<Handle<ComputeInstance>> {
        let network = self.get(props.network)?;
        let network_node = network.node;
        let network_name = network.name.clone();

        let subnet = network
            .tier(&props.tier)
            .and_then(|t| t.subnets.first())
            .cloned()
            .ok_or_else(|| ReferenceError::UnknownTier {
                tier: props.tier.clone(),
                network: network_name.clone(),
            })?;

        let group = self.get(props.security_group)?;
        if group.network != props.network {
            return Err(ReferenceError::NetworkMismatch {
                entity: group.name.clone(),
                expected: network_name,
                actual: self.get(group.network)?.name.clone(),
            }
            .into());
        }
        let group_node = group.node;

        let image_id = props.image.image_for(self.region())?.to_string();
        tracing::debug!(
            "Instance {} ({}) uses image {} in {}",
            name,
            props.class,
            image_id,
            subnet.name
        );

        self.declare(name, vec![network_node, group_node], |node| ComputeInstance {
            name: name.to_string(),
            node,
            network: props.network,
            tier: props.tier,
            subnet,
            class: props.class,
            image: props.image,
            image_id,
            security_group: props.security_group,
            boot_script: props.boot_script,
        })
    }

    /// Append a block of commands to an instance's boot script
    pub fn add_boot_commands(
        &mut self,
        instance: Handle<ComputeInstance>,
        commands: impl Into<String>,
    ) -> Result<()> {
        self.get_mut(instance)?.boot_script.push(commands);
        Ok(())
    }
}
