//! Keypair and test instances
//!
//! One keypair is shared by every instance. The provider generates it and
//! keeps the private half in Parameter Store, so nothing secret ever
//! passes through this crate.

use std::collections::HashSet;
use tracing::debug;

use super::types::{
    FirewallRuleSet, Instance, InstanceRole, Keypair, LogicalId, MachineImage, Network,
    RemovalPolicy, TopologyError,
};

/// Actions granted to roles listed in `service_setting_access`
pub const SERVICE_SETTING_ACTIONS: [&str; 3] = [
    "ssm:GetServiceSetting",
    "ssm:ResetServiceSetting",
    "ssm:UpdateServiceSetting",
];

/// Validate a key name before it reaches the provider
pub fn validate_key_name(name: &str) -> Result<(), TopologyError> {
    if name.is_empty()
        || name.len() > 255
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(TopologyError::InvalidKeyName(format!(
            "Key name must be 1-255 alphanumeric characters, dots, hyphens, or underscores: {}",
            name
        )));
    }
    Ok(())
}

/// The keypair is always deleted with the topology
pub fn declare_keypair(key_name: &str) -> Result<Keypair, TopologyError> {
    validate_key_name(key_name)?;

    Ok(Keypair {
        id: LogicalId::new("KeyPairForVPCPeering"),
        key_name: key_name.to_string(),
        removal_policy: RemovalPolicy::Destroy,
    })
}

pub fn declare_image(ssm_parameter: &str) -> MachineImage {
    MachineImage {
        id: LogicalId::new("ImageIdParameter"),
        ssm_parameter: ssm_parameter.to_string(),
    }
}

/// Instance settings shared by every network
pub struct InstanceSpec<'a> {
    pub instance_type: &'a str,
    pub associate_public_ip: bool,
    /// Network names whose role receives [`SERVICE_SETTING_ACTIONS`]
    pub service_setting_access: &'a [String],
}

/// One instance per network, wired to that network's rule set
pub fn declare_instances(
    networks: &[Network],
    firewalls: &[FirewallRuleSet],
    keypair: &Keypair,
    image: &MachineImage,
    spec: &InstanceSpec<'_>,
) -> Result<Vec<Instance>, TopologyError> {
    let known: HashSet<&str> = networks.iter().map(|n| n.name.as_str()).collect();
    if let Some(unknown) = spec
        .service_setting_access
        .iter()
        .find(|name| !known.contains(name.as_str()))
    {
        return Err(TopologyError::UnknownNetwork(unknown.clone()));
    }

    networks
        .iter()
        .map(|network| -> Result<Instance, TopologyError> {
            let firewall = firewalls
                .iter()
                .find(|f| f.network == network.id)
                .ok_or_else(|| TopologyError::UnknownNetwork(network.name.clone()))?;

            let id = format!("EC2Instance{}", network.ordinal);
            let granted_actions = if spec.service_setting_access.contains(&network.name) {
                SERVICE_SETTING_ACTIONS.iter().map(|a| a.to_string()).collect()
            } else {
                Vec::new()
            };

            debug!(
                instance = %id,
                network = %network.name,
                firewall = %firewall.id,
                "Declared instance"
            );

            Ok(Instance {
                ordinal: network.ordinal,
                network: network.id.clone(),
                subnet: network.subnet.id.clone(),
                firewall: firewall.id.clone(),
                keypair: keypair.id.clone(),
                image: image.id.clone(),
                instance_type: spec.instance_type.to_string(),
                associate_public_ip: spec.associate_public_ip,
                role: InstanceRole {
                    id: LogicalId::new(format!("{id}InstanceRole")),
                    profile: LogicalId::new(format!("{id}InstanceProfile")),
                    granted_actions,
                },
                id: LogicalId::new(id),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::topology::firewall::declare_firewalls;
    use crate::topology::network::declare_networks;

    #[test]
    fn test_validate_key_name() {
        assert!(validate_key_name("keypair-for-vpc-peering").is_ok());
        assert!(validate_key_name("lab_key.v2").is_ok());

        assert!(validate_key_name("").is_err());
        assert!(validate_key_name("key with spaces").is_err());
        assert!(validate_key_name(&"k".repeat(256)).is_err());
    }

    #[test]
    fn test_keypair_deleted_with_topology() {
        let keypair = declare_keypair("keypair-for-vpc-peering").unwrap();
        assert_eq!(keypair.removal_policy, RemovalPolicy::Destroy);
        assert_eq!(keypair.removal_policy.as_policy(), "Delete");
    }

    #[test]
    fn test_instances_share_keypair_and_use_own_firewall() {
        let config = TopologyConfig::default();
        let networks = declare_networks(&config.networks, 24).unwrap();
        let firewalls = declare_firewalls(&networks, 22);
        let keypair = declare_keypair(&config.key_name).unwrap();
        let image = declare_image(&config.image_parameter);
        let spec = InstanceSpec {
            instance_type: "t2.micro",
            associate_public_ip: true,
            service_setting_access: &config.service_setting_access,
        };

        let instances = declare_instances(&networks, &firewalls, &keypair, &image, &spec).unwrap();

        assert_eq!(instances.len(), 3);
        for (instance, network) in instances.iter().zip(&networks) {
            assert_eq!(instance.network, network.id);
            assert_eq!(instance.subnet, network.subnet.id);
            assert_eq!(instance.keypair.as_str(), "KeyPairForVPCPeering");
            assert_eq!(instance.firewall.as_str(), format!("SecurityGroup{}", network.ordinal));
        }

        assert!(instances[0].role.granted_actions.is_empty());
        assert_eq!(instances[1].role.granted_actions.len(), 3);
        assert_eq!(instances[1].role.profile.as_str(), "EC2Instance2InstanceProfile");
    }

    #[test]
    fn test_unknown_service_setting_network() {
        let config = TopologyConfig::default();
        let networks = declare_networks(&config.networks, 24).unwrap();
        let firewalls = declare_firewalls(&networks, 22);
        let keypair = declare_keypair(&config.key_name).unwrap();
        let image = declare_image(&config.image_parameter);
        let access = vec!["VPC9".to_string()];
        let spec = InstanceSpec {
            instance_type: "t2.micro",
            associate_public_ip: true,
            service_setting_access: &access,
        };

        let err = declare_instances(&networks, &firewalls, &keypair, &image, &spec).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownNetwork(ref n) if n == "VPC9"));
    }
}
