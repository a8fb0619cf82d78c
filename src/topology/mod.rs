//! Peering Topology Declaration
//!
//! Builds the complete resource graph in one pass: networks with a public
//! subnet each, a complete mesh of peering links, routes over those links,
//! one firewall rule set and one test instance per network, a shared
//! keypair and the outputs the operator needs afterwards.
//!
//! The graph is plain data. Creation order, retries and rollback belong to
//! the provisioning engine that consumes the synthesized template.
//!
//! ## Example Usage
//!
//! ```ignore
//! use vpc_peering::{declare, synthesize, TopologyConfig};
//!
//! let topology = declare(&TopologyConfig::default())?;
//! assert_eq!(topology.peering_links.len(), 3);
//!
//! let template = synthesize(&topology);
//! println!("{}", template.to_json_pretty()?);
//! ```

pub mod compute;
pub mod firewall;
pub mod network;
pub mod outputs;
pub mod peering;
pub mod types;
pub mod validate;

pub use outputs::{AttributeResolver, StaticResolver, SSH_KEY_COMMAND_OUTPUT};
pub use types::{LogicalId, TopologyError};
pub use validate::Violation;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::TopologyConfig;
use compute::InstanceSpec;
use types::{
    FirewallRuleSet, Instance, Keypair, MachineImage, Network, Output, PeeringLink, Route,
};

/// The declared resource graph
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    pub stack_name: String,
    pub description: String,
    /// Literal region, or `None` when resolved at deploy time
    pub region: Option<String>,
    pub remote_shell_port: u16,
    pub networks: Vec<Network>,
    pub peering_links: Vec<PeeringLink>,
    pub routes: Vec<Route>,
    pub firewalls: Vec<FirewallRuleSet>,
    pub keypair: Keypair,
    pub image: MachineImage,
    pub instances: Vec<Instance>,
    pub outputs: Vec<Output>,
}

impl Topology {
    pub fn network(&self, id: &LogicalId) -> Option<&Network> {
        self.networks.iter().find(|n| &n.id == id)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Fail with every structural finding, if any
    pub fn validate(&self) -> Result<(), TopologyError> {
        let violations = validate::check(self);
        if violations.is_empty() {
            return Ok(());
        }
        Err(TopologyError::Structure(
            violations.iter().map(ToString::to_string).collect(),
        ))
    }
}

/// Region codes look like `us-east-1` or `us-gov-west-1`
fn validate_region(region: &str) -> Result<(), TopologyError> {
    let parts: Vec<&str> = region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts.iter().all(|p| !p.is_empty())
        && parts[..parts.len() - 1]
            .iter()
            .all(|p| p.chars().all(|c| c.is_ascii_lowercase()))
        && parts[parts.len() - 1].chars().all(|c| c.is_ascii_digit());

    if well_formed {
        Ok(())
    } else {
        Err(TopologyError::InvalidRegion(region.to_string()))
    }
}

/// Declare the full topology described by `config`
pub fn declare(config: &TopologyConfig) -> Result<Topology, TopologyError> {
    info!(
        stack = %config.stack_name,
        networks = config.networks.len(),
        "Declaring peering topology"
    );

    if let Some(region) = &config.region {
        validate_region(region)?;
    }

    let networks = network::declare_networks(&config.networks, config.subnet_prefix_len)?;
    let peering_links = peering::declare_peering_links(&networks);
    let routes = peering::declare_routes(&networks, &peering_links);
    let firewalls = firewall::declare_firewalls(&networks, config.remote_shell_port);

    let keypair = compute::declare_keypair(&config.key_name)?;
    let image = compute::declare_image(&config.image_parameter);
    let spec = InstanceSpec {
        instance_type: &config.instance_type,
        associate_public_ip: config.associate_public_ip,
        service_setting_access: &config.service_setting_access,
    };
    let instances = compute::declare_instances(&networks, &firewalls, &keypair, &image, &spec)?;
    let outputs = outputs::declare_outputs(&instances, &keypair, config.region.as_deref());

    let topology = Topology {
        stack_name: config.stack_name.clone(),
        description: config.description.clone(),
        region: config.region.clone(),
        remote_shell_port: config.remote_shell_port,
        networks,
        peering_links,
        routes,
        firewalls,
        keypair,
        image,
        instances,
        outputs,
    };

    topology.validate()?;

    debug!(
        links = topology.peering_links.len(),
        routes = topology.routes.len(),
        instances = topology.instances.len(),
        "Topology declared"
    );

    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::topology::types::{Attribute, RemovalPolicy};

    #[test]
    fn test_default_topology_shape() {
        let topology = declare(&TopologyConfig::default()).unwrap();

        assert_eq!(topology.networks.len(), 3);
        assert_eq!(topology.peering_links.len(), 3);
        assert_eq!(topology.routes.len(), 6);
        assert_eq!(topology.firewalls.len(), 3);
        assert_eq!(topology.instances.len(), 3);
        assert_eq!(topology.outputs.len(), 7);
        assert_eq!(topology.keypair.key_name, "keypair-for-vpc-peering");
        assert_eq!(topology.keypair.removal_policy, RemovalPolicy::Destroy);
    }

    #[test]
    fn test_every_network_routes_to_both_peers() {
        let topology = declare(&TopologyConfig::default()).unwrap();

        for network in &topology.networks {
            let mut destinations: Vec<_> = topology
                .routes
                .iter()
                .filter(|r| r.network == network.id)
                .map(|r| r.destination.to_string())
                .collect();
            destinations.sort();

            let mut expected: Vec<_> = topology
                .networks
                .iter()
                .filter(|n| n.id != network.id)
                .map(|n| n.cidr.to_string())
                .collect();
            expected.sort();

            assert_eq!(destinations, expected, "routes of {}", network.id);
        }
    }

    #[test]
    fn test_key_command_output_renders_with_region() {
        let topology = declare(&TopologyConfig::default()).unwrap();
        let output = topology.output(SSH_KEY_COMMAND_OUTPUT).unwrap();

        let resolver = StaticResolver::new()
            .with_attribute(&topology.keypair.id, Attribute::KeyPairId, "key-0123abcd")
            .with_region("eu-central-1");
        let command = output.value.render(&resolver).unwrap();

        assert!(command.contains("key-0123abcd"));
        assert!(command.contains("eu-central-1"));
    }

    #[test]
    fn test_literal_region_in_command() {
        let mut config = TopologyConfig::default();
        config.region = Some("us-gov-west-1".to_string());

        let topology = declare(&config).unwrap();
        let output = topology.output(SSH_KEY_COMMAND_OUTPUT).unwrap();
        assert!(output.value.embeds_region(Some("us-gov-west-1")));
    }

    #[test]
    fn test_region_validation() {
        assert!(validate_region("us-east-1").is_ok());
        assert!(validate_region("ap-southeast-2").is_ok());
        assert!(validate_region("us-gov-west-1").is_ok());

        assert!(validate_region("").is_err());
        assert!(validate_region("useast1").is_err());
        assert!(validate_region("US-EAST-1").is_err());
        assert!(validate_region("us-east-").is_err());
    }

    #[test]
    fn test_declare_propagates_config_errors() {
        let mut config = TopologyConfig::default();
        config.networks.push(NetworkConfig::new("VPC4", "10.2.0.0/16"));
        assert!(matches!(
            declare(&config),
            Err(TopologyError::AddressBlockOverlap { .. })
        ));

        let mut config = TopologyConfig::default();
        config.key_name = "bad key".to_string();
        assert!(matches!(declare(&config), Err(TopologyError::InvalidKeyName(_))));

        let mut config = TopologyConfig::default();
        config.region = Some("moon".to_string());
        assert!(matches!(declare(&config), Err(TopologyError::InvalidRegion(_))));
    }

    #[test]
    fn test_four_network_mesh_validates() {
        let mut config = TopologyConfig::default();
        config.networks.push(NetworkConfig::new("VPC4", "10.4.0.0/16"));

        let topology = declare(&config).unwrap();
        assert_eq!(topology.peering_links.len(), 6);
        assert_eq!(topology.routes.len(), 12);
        assert_eq!(topology.outputs.len(), 9);
    }
}
