//! Per-network firewall rule sets
//!
//! Each set admits everything from every peer's public subnet and the
//! remote shell port from anywhere.

use ipnet::Ipv4Net;

use super::types::{FirewallRuleSet, IngressRule, LogicalId, Network, PortRange, Protocol};

pub fn declare_firewalls(networks: &[Network], remote_shell_port: u16) -> Vec<FirewallRuleSet> {
    networks
        .iter()
        .map(|network| {
            let mut ingress: Vec<IngressRule> = networks
                .iter()
                .filter(|peer| peer.id != network.id)
                .map(|peer| IngressRule::new(peer.subnet.cidr, Protocol::All, PortRange::All))
                .collect();

            ingress.push(IngressRule::new(
                Ipv4Net::default(),
                Protocol::Tcp,
                PortRange::Single(remote_shell_port),
            ));

            let name = format!("SecurityGroup{}", network.ordinal);
            FirewallRuleSet {
                id: LogicalId::new(name.clone()),
                name,
                network: network.id.clone(),
                ingress,
                allow_all_outbound: true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::topology::network::declare_networks;

    #[test]
    fn test_rule_sets_admit_peer_subnets_and_ssh() {
        let config = TopologyConfig::default();
        let networks = declare_networks(&config.networks, 24).unwrap();
        let sets = declare_firewalls(&networks, 22);

        assert_eq!(sets.len(), 3);

        let sg1 = &sets[0];
        assert_eq!(sg1.id.as_str(), "SecurityGroup1");
        assert_eq!(sg1.network.as_str(), "VPC1");
        assert_eq!(sg1.ingress.len(), 3);
        assert!(sg1.permits_all_from(&"10.2.0.0/24".parse().unwrap()));
        assert!(sg1.permits_all_from(&"10.3.0.0/24".parse().unwrap()));
        assert!(!sg1.permits_all_from(&"10.1.0.0/24".parse().unwrap()));
        assert!(sg1.opens_to_anywhere(22));
        assert_eq!(sg1.ingress[2].source.to_string(), "0.0.0.0/0");
        assert!(sg1.allow_all_outbound);
    }

    #[test]
    fn test_custom_remote_shell_port() {
        let config = TopologyConfig::default();
        let networks = declare_networks(&config.networks, 24).unwrap();
        let sets = declare_firewalls(&networks, 2222);

        let sg2 = &sets[1];
        assert!(sg2.opens_to_anywhere(2222));
        assert!(!sg2.opens_to_anywhere(22));
        assert_eq!(sg2.ingress[2].protocol, Protocol::Tcp);
    }
}
