//! Configuration schema types

use crate::compute::{BootScript, MachineImage};
use crate::error::Result;
use crate::exposure::{HealthCheck, HealthCheckProtocol, LoadBalancerProps};
use crate::gateway::{EndpointType, HttpMethod, DEFAULT_RESOURCE_PATH, DEFAULT_STAGE};
use crate::network::{default_cidr, NetworkProps, SubnetKind, TierSpec};
use crate::security::{IngressRule, Peer, Protocol, SecurityPolicy};
use indexmap::IndexMap;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete topology configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub security_group: SecurityGroupConfig,
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Deployment target
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default = "default_stack_name")]
    pub name: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_stack_name() -> String {
    "NeelStack".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
            account: None,
            region: default_region(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default = "default_network_name")]
    pub name: String,
    #[serde(default = "default_cidr")]
    pub cidr: Ipv4Net,
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

fn default_network_name() -> String {
    "MyVpc".to_string()
}

fn default_max_azs() -> u8 {
    1
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            name: "Public".to_string(),
            kind: SubnetKind::Public,
            mask: 24,
        },
        TierConfig {
            name: "Private".to_string(),
            kind: SubnetKind::PrivateWithEgress,
            mask: 24,
        },
    ]
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            cidr: default_cidr(),
            max_azs: default_max_azs(),
            tiers: default_tiers(),
        }
    }
}

impl NetworkConfig {
    pub fn to_props(&self) -> NetworkProps {
        NetworkProps::new(
            self.tiers
                .iter()
                .map(|t| TierSpec::new(t.name.clone(), t.kind, t.mask))
                .collect(),
        )
        .with_cidr(self.cidr)
        .with_max_azs(self.max_azs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    pub name: String,
    pub kind: SubnetKind,
    pub mask: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityGroupConfig {
    #[serde(default = "default_security_group_name")]
    pub name: String,
    #[serde(default = "default_security_group_description")]
    pub description: String,
    #[serde(default = "default_true")]
    pub allow_all_outbound: bool,
    #[serde(default = "default_ingress")]
    pub ingress: Vec<IngressConfig>,
}

fn default_security_group_name() -> String {
    "MySecurityGroup".to_string()
}

fn default_security_group_description() -> String {
    "Allow HTTP inbound traffic".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ingress() -> Vec<IngressConfig> {
    vec![IngressConfig {
        source: "any-ipv4".to_string(),
        protocol: Protocol::Tcp,
        port: 80,
        description: "Allow HTTP traffic".to_string(),
    }]
}

impl Default for SecurityGroupConfig {
    fn default() -> Self {
        Self {
            name: default_security_group_name(),
            description: default_security_group_description(),
            allow_all_outbound: true,
            ingress: default_ingress(),
        }
    }
}

impl SecurityGroupConfig {
    pub fn policy(&self) -> SecurityPolicy {
        SecurityPolicy {
            description: self.description.clone(),
            allow_all_outbound: self.allow_all_outbound,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngressConfig {
    /// `any-ipv4` or an IPv4 CIDR
    pub source: String,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    pub port: u16,
    #[serde(default)]
    pub description: String,
}

fn default_protocol() -> Protocol {
    Protocol::Tcp
}

impl IngressConfig {
    pub fn to_rule(&self) -> Result<IngressRule> {
        Ok(IngressRule::new(
            Peer::parse(&self.source)?,
            self.protocol,
            self.port,
            self.description.clone(),
        ))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    #[serde(default = "default_instance_name")]
    pub name: String,
    #[serde(default = "default_instance_class")]
    pub class: String,
    /// Subnet tier the instance is placed in
    #[serde(default = "default_instance_tier")]
    pub tier: String,
    /// Region -> machine image id
    #[serde(default = "default_images")]
    pub images: IndexMap<String, String>,
    #[serde(default = "default_boot_script")]
    pub boot_script: String,
}

fn default_instance_name() -> String {
    "MyEC2Instance1".to_string()
}

fn default_instance_class() -> String {
    "t2.micro".to_string()
}

fn default_instance_tier() -> String {
    "Private".to_string()
}

fn default_images() -> IndexMap<String, String> {
    let mut images = IndexMap::new();
    // Ubuntu 20.04 LTS
    images.insert("us-east-1".to_string(), "ami-0ba8562d785e35387".to_string());
    images
}

fn default_boot_script() -> String {
    "# Install Nginx\n\
     sudo apt-get update\n\
     sudo apt-get install nginx -y\n\
     sudo systemctl start nginx"
        .to_string()
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: default_instance_name(),
            class: default_instance_class(),
            tier: default_instance_tier(),
            images: default_images(),
            boot_script: default_boot_script(),
        }
    }
}

impl InstanceConfig {
    pub fn image(&self) -> MachineImage {
        MachineImage::generic_linux(self.images.clone())
    }

    pub fn boot_script(&self) -> BootScript {
        if self.boot_script.is_empty() {
            BootScript::empty()
        } else {
            BootScript::new(self.boot_script.clone())
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerConfig {
    #[serde(default = "default_load_balancer_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub internal: bool,
    #[serde(default = "default_true")]
    pub cross_zone: bool,
    #[serde(default = "default_port")]
    pub listener_port: u16,
    #[serde(default)]
    pub target_group: TargetGroupConfig,
}

fn default_load_balancer_name() -> String {
    "MyNLB".to_string()
}

fn default_port() -> u16 {
    80
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            name: default_load_balancer_name(),
            internal: true,
            cross_zone: true,
            listener_port: default_port(),
            target_group: TargetGroupConfig::default(),
        }
    }
}

impl LoadBalancerConfig {
    pub fn props(&self) -> LoadBalancerProps {
        LoadBalancerProps {
            internal: self.internal,
            cross_zone: self.cross_zone,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TargetGroupConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

impl Default for TargetGroupConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            health_check: HealthCheckConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_health_port")]
    pub port: String,
    #[serde(default = "default_health_protocol")]
    pub protocol: HealthCheckProtocol,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_health_port() -> String {
    "80".to_string()
}

fn default_health_protocol() -> HealthCheckProtocol {
    HealthCheckProtocol::Http
}

fn default_interval_seconds() -> u64 {
    30
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            port: default_health_port(),
            protocol: default_health_protocol(),
            interval_seconds: default_interval_seconds(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl HealthCheckConfig {
    pub fn to_health_check(&self) -> HealthCheck {
        HealthCheck {
            path: self.path.clone(),
            port: self.port.clone(),
            protocol: self.protocol,
            interval: Duration::from_secs(self.interval_seconds),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,
    #[serde(default = "default_api_name")]
    pub api_name: String,
    #[serde(default = "default_resource_path")]
    pub resource_path: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub endpoint_type: EndpointType,
    #[serde(default = "default_stage")]
    pub stage: String,
}

fn default_bridge_name() -> String {
    "MyVpcLink".to_string()
}

fn default_api_name() -> String {
    "MyRestApi".to_string()
}

fn default_resource_path() -> String {
    DEFAULT_RESOURCE_PATH.to_string()
}

fn default_stage() -> String {
    DEFAULT_STAGE.to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bridge_name: default_bridge_name(),
            api_name: default_api_name(),
            resource_path: default_resource_path(),
            http_method: HttpMethod::Any,
            endpoint_type: EndpointType::Regional,
            stage: default_stage(),
        }
    }
}
