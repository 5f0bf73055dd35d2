//! Reference topology assembled from configuration

use crate::compute::{ComputeInstance, InstanceProps};
use crate::config::Config;
use crate::error::Result;
use crate::exposure::{Listener, LoadBalancer, TargetGroup, TargetGroupProps};
use crate::gateway::{ConnectivityBridge, ProxyRoute, ProxyRouteProps};
use crate::network::Network;
use crate::security::SecurityGroup;
use crate::topology::{Handle, Topology};

/// An assembled, not yet finalized topology and the handles of its entities
#[derive(Debug)]
pub struct Assembly {
    pub topology: Topology,
    pub network: Handle<Network>,
    pub security_group: Handle<SecurityGroup>,
    pub instance: Handle<ComputeInstance>,
    pub load_balancer: Handle<LoadBalancer>,
    pub listener: Handle<Listener>,
    pub target_group: Handle<TargetGroup>,
    pub bridge: Handle<ConnectivityBridge>,
    pub route: Handle<ProxyRoute>,
}

/// Declare every layer bottom-up: network, security, compute, exposure,
/// gateway. The first failure aborts.
pub fn assemble(config: &Config) -> Result<Assembly> {
    let mut topology = Topology::new(&config.stack.name, &config.stack.region);
    if let Some(account) = &config.stack.account {
        topology = topology.with_account(account);
    }

    let network = topology.create_network(&config.network.name, config.network.to_props())?;

    let sg = &config.security_group;
    let security_group = topology.create_security_group(&sg.name, network, sg.policy())?;
    for ingress in &sg.ingress {
        topology.add_ingress_rule(security_group, ingress.to_rule()?)?;
    }

    let inst = &config.instance;
    let instance = topology.create_instance(
        &inst.name,
        InstanceProps {
            network,
            tier: inst.tier.clone(),
            class: inst.class.clone(),
            image: inst.image(),
            security_group,
            boot_script: inst.boot_script(),
        },
    )?;

    let lb = &config.load_balancer;
    let load_balancer = topology.create_load_balancer(&lb.name, network, lb.props())?;
    let listener = topology.add_listener(load_balancer, lb.listener_port)?;
    let target_group = topology.add_target_group(
        listener,
        TargetGroupProps {
            port: lb.target_group.port,
            targets: vec![instance],
            health_check: lb.target_group.health_check.to_health_check(),
        },
    )?;

    let gw = &config.gateway;
    let bridge = topology.create_bridge(&gw.bridge_name, &[load_balancer])?;
    let backend = topology.load_balancer_address(load_balancer)?;
    let route = topology.create_proxy_route(
        &gw.api_name,
        ProxyRouteProps::new(bridge, backend)
            .with_method(gw.http_method)
            .with_resource_path(gw.resource_path.clone())
            .with_stage(gw.stage.clone())
            .with_endpoint_type(gw.endpoint_type),
    )?;

    tracing::debug!("Assembled topology {}", topology.name());

    Ok(Assembly {
        topology,
        network,
        security_group,
        instance,
        load_balancer,
        listener,
        target_group,
        bridge,
        route,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProvisioningBackend, SimulatedBackend};
    use crate::compute::{BootScript, MachineImage};
    use crate::config::{ConfigLoader, TierConfig};
    use crate::error::{ConfigError, ReferenceError, TopologyError};
    use crate::exposure::{HealthCheck, HealthCheckProtocol, LoadBalancerProps};
    use crate::gateway::HttpMethod;
    use crate::network::{NetworkProps, SubnetKind, TierSpec};
    use crate::plan::{AMI_ID_OUTPUT, API_ENDPOINT_OUTPUT};
    use crate::security::{IngressRule, Peer, SecurityPolicy};
    use crate::topology::{EntityKind, Lifecycle};
    use std::time::Duration;

    const ALL_KINDS: [EntityKind; 8] = [
        EntityKind::Network,
        EntityKind::SecurityGroup,
        EntityKind::ComputeInstance,
        EntityKind::LoadBalancer,
        EntityKind::Listener,
        EntityKind::TargetGroup,
        EntityKind::ConnectivityBridge,
        EntityKind::ProxyRoute,
    ];

    #[test]
    fn test_reference_scenario_by_hand() {
        let mut topology = Topology::new("NeelStack", "us-east-1");

        let vpc = topology
            .create_network(
                "MyVpc",
                NetworkProps::new(vec![
                    TierSpec::new("Public", SubnetKind::Public, 24),
                    TierSpec::new("Private", SubnetKind::PrivateWithEgress, 24),
                ]),
            )
            .unwrap();

        let sg = topology
            .create_security_group(
                "MySecurityGroup",
                vpc,
                SecurityPolicy {
                    description: "Allow HTTP inbound traffic".to_string(),
                    allow_all_outbound: true,
                },
            )
            .unwrap();
        topology
            .add_ingress_rule(sg, IngressRule::tcp(Peer::any_ipv4(), 80, "Allow HTTP traffic"))
            .unwrap();

        let instance = topology
            .create_instance(
                "MyEC2Instance1",
                InstanceProps {
                    network: vpc,
                    tier: "Private".to_string(),
                    class: "t2.micro".to_string(),
                    image: MachineImage::for_region("us-east-1", "ami-0ba8562d785e35387"),
                    security_group: sg,
                    boot_script: BootScript::new("sudo apt-get install nginx -y"),
                },
            )
            .unwrap();

        let nlb = topology
            .create_load_balancer(
                "MyNLB",
                vpc,
                LoadBalancerProps {
                    internal: true,
                    cross_zone: true,
                },
            )
            .unwrap();
        let listener = topology.add_listener(nlb, 80).unwrap();
        let health_check = HealthCheck {
            path: "/".to_string(),
            port: "80".to_string(),
            protocol: HealthCheckProtocol::Http,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        };
        let tg = topology
            .add_target_group(
                listener,
                TargetGroupProps {
                    port: 80,
                    targets: vec![instance],
                    health_check: health_check.clone(),
                },
            )
            .unwrap();

        let link = topology.create_bridge("MyVpcLink", &[nlb]).unwrap();
        let backend = topology.load_balancer_address(nlb).unwrap();
        let route = topology
            .create_proxy_route("MyRestApi", ProxyRouteProps::new(link, backend))
            .unwrap();

        let plan = topology.finalize().unwrap();
        for kind in ALL_KINDS {
            assert_eq!(plan.count(kind), 1, "expected one {}", kind);
        }
        for name in plan.order_names() {
            assert_eq!(plan.state(name), Some(Lifecycle::Finalized));
        }
        assert_eq!(topology.get(tg).unwrap().health_check, health_check);

        let entry = topology.get(route).unwrap();
        assert!(entry.backend_uri().is_err());

        SimulatedBackend::new().provision(&plan).unwrap();

        let entry = topology.get(route).unwrap();
        let uri = entry.backend_uri().unwrap();
        assert!(uri.as_str().starts_with("http://internal-mynlb-"));
        assert!(uri.as_str().contains(".elb.us-east-1.amazonaws.com"));
        assert!(entry
            .endpoint()
            .get()
            .unwrap()
            .ends_with(".execute-api.us-east-1.amazonaws.com/prod/"));

        let outputs = plan.outputs();
        assert_eq!(outputs.ami_id.as_deref(), Some("ami-0ba8562d785e35387"));
        assert!(outputs.api_endpoint.unwrap().is_resolved());
    }

    #[test]
    fn test_default_config_assembles() {
        let mut assembly = assemble(&Config::default()).unwrap();
        let topology = &assembly.topology;

        let instance = topology.get(assembly.instance).unwrap();
        assert_eq!(instance.subnet.cidr.to_string(), "10.0.1.0/24");
        assert_eq!(instance.image_id, "ami-0ba8562d785e35387");
        assert!(instance.boot_script.render().starts_with("#!/bin/bash\n"));

        let group = topology.get(assembly.security_group).unwrap();
        assert_eq!(group.ingress.len(), 1);
        assert_eq!(group.ingress[0].port, 80);

        let route = topology.get(assembly.route).unwrap();
        assert_eq!(route.http_method, HttpMethod::Any);
        assert_eq!(route.resource_path, "mynlb");

        let plan = assembly.topology.finalize().unwrap();
        assert_eq!(plan.order_names().first(), Some(&"MyVpc"));
        assert_eq!(plan.order_names().last(), Some(&"MyRestApi"));
        assert_eq!(
            plan.dependencies("MyRestApi"),
            vec!["MyVpcLink", "MyNLB"]
        );
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let mut assembly = assemble(&Config::default()).unwrap();
        let plan = assembly.topology.finalize().unwrap();
        let order = plan.order_names();

        for (position, name) in order.iter().enumerate() {
            for dep in plan.dependencies(name) {
                let dep_position = order.iter().position(|n| *n == dep).unwrap();
                assert!(dep_position < position, "{} must precede {}", dep, name);
            }
        }
    }

    #[test]
    fn test_every_mutation_fails_after_finalize() {
        let mut assembly = assemble(&Config::default()).unwrap();
        let _plan = assembly.topology.finalize().unwrap();
        let topology = &mut assembly.topology;

        let results: Vec<TopologyError> = vec![
            topology
                .create_network(
                    "Late",
                    NetworkProps::new(vec![TierSpec::new("Public", SubnetKind::Public, 24)]),
                )
                .unwrap_err(),
            topology
                .add_ingress_rule(
                    assembly.security_group,
                    IngressRule::tcp(Peer::any_ipv4(), 443, "Late rule"),
                )
                .unwrap_err(),
            topology
                .add_boot_commands(assembly.instance, "echo late")
                .unwrap_err(),
            topology.add_listener(assembly.load_balancer, 443).unwrap_err(),
            topology
                .add_target_group(
                    assembly.listener,
                    TargetGroupProps {
                        port: 80,
                        targets: vec![assembly.instance],
                        health_check: Config::default()
                            .load_balancer
                            .target_group
                            .health_check
                            .to_health_check(),
                    },
                )
                .unwrap_err(),
            topology
                .create_bridge("LateLink", &[assembly.load_balancer])
                .unwrap_err(),
        ];

        for err in results {
            assert!(err.is_immutable_state(), "unexpected error: {}", err);
        }
    }

    #[test]
    fn test_missing_public_tier_is_unreachable() {
        let mut config = Config::default();
        config.network.tiers = vec![TierConfig {
            name: "Private".to_string(),
            kind: SubnetKind::PrivateWithEgress,
            mask: 24,
        }];

        let mut assembly = assemble(&config).unwrap();
        let err = assembly.topology.finalize().unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Config(ConfigError::Unreachable { .. })
        ));
        assert!(!assembly.topology.is_finalized());
    }

    #[test]
    fn test_unknown_instance_tier() {
        let mut config = Config::default();
        config.instance.tier = "Isolated".to_string();

        let err = assemble(&config).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Reference(ReferenceError::UnknownTier { .. })
        ));
    }

    #[test]
    fn test_region_without_image() {
        let mut config = Config::default();
        config.stack.region = "ap-south-1".to_string();

        let err = assemble(&config).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::Config(ConfigError::MissingImage { .. })
        ));
    }

    #[test]
    fn test_provisioning_twice_fails() {
        let mut assembly = assemble(&Config::default()).unwrap();
        let plan = assembly.topology.finalize().unwrap();
        let backend = SimulatedBackend::new();

        backend.provision(&plan).unwrap();
        let err = backend.provision(&plan).unwrap_err();
        assert!(err.is_immutable_state());
    }

    #[test]
    fn test_simulated_backend_is_deterministic() {
        let mut first = assemble(&Config::default()).unwrap();
        let mut second = assemble(&Config::default()).unwrap();
        let first_plan = first.topology.finalize().unwrap();
        let second_plan = second.topology.finalize().unwrap();

        SimulatedBackend::new().provision(&first_plan).unwrap();
        SimulatedBackend::new().provision(&second_plan).unwrap();

        let first_dns = first.topology.load_balancer_dns(first.load_balancer).unwrap();
        let second_dns = second.topology.load_balancer_dns(second.load_balancer).unwrap();
        assert_eq!(first_dns.get().unwrap(), second_dns.get().unwrap());
    }

    #[test]
    fn test_manifest_before_and_after_provisioning() {
        let config = ConfigLoader::load_from_str(
            r#"
[stack]
account = "851725255821"
"#,
        )
        .unwrap();
        let mut assembly = assemble(&config).unwrap();
        let plan = assembly.topology.finalize().unwrap();

        let pending: toml::Table = toml::from_str(&plan.render().unwrap()).unwrap();
        assert_eq!(pending["stack"]["account"].as_str(), Some("851725255821"));
        assert_eq!(
            pending["outputs"][API_ENDPOINT_OUTPUT].as_str(),
            Some("${MyRestApi.Url}")
        );

        SimulatedBackend::with_domain("example.test")
            .provision(&plan)
            .unwrap();

        let rendered: toml::Table = toml::from_str(&plan.render().unwrap()).unwrap();
        assert_eq!(
            rendered["outputs"][AMI_ID_OUTPUT].as_str(),
            Some("ami-0ba8562d785e35387")
        );
        let endpoint = rendered["outputs"][API_ENDPOINT_OUTPUT].as_str().unwrap();
        assert!(endpoint.starts_with("https://"));
        assert!(endpoint.ends_with(".execute-api.us-east-1.example.test/prod/"));

        let resources = rendered["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 8);
        let route = resources
            .iter()
            .find(|r| r["name"].as_str() == Some("MyRestApi"))
            .unwrap();
        assert_eq!(route["kind"].as_str(), Some("proxy_route"));
        assert_eq!(route["state"].as_str(), Some("finalized"));
        assert_eq!(route["properties"]["connection_type"].as_str(), Some("VPC_LINK"));
        assert!(route["properties"]["uri"]
            .as_str()
            .unwrap()
            .starts_with("http://internal-mynlb-"));
    }
}
