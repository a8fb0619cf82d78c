//! Network declaration
//!
//! Parses each configured address block, carves its public subnet and
//! rejects any pair of blocks that share address space.

use ipnet::Ipv4Net;
use std::collections::HashSet;
use tracing::debug;

use super::types::{LogicalId, Network, Subnet, TopologyError};
use crate::config::NetworkConfig;

/// Whether two address blocks share any address
pub fn blocks_overlap(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Parse a block, refusing host bits (`10.1.0.5/16`)
fn parse_block(config: &NetworkConfig) -> Result<Ipv4Net, TopologyError> {
    let invalid = || TopologyError::InvalidAddressBlock {
        network: config.name.clone(),
        value: config.cidr.clone(),
    };

    let block: Ipv4Net = config.cidr.trim().parse().map_err(|_| invalid())?;
    if block != block.trunc() {
        return Err(invalid());
    }
    Ok(block)
}

/// First subnet of `prefix_len` inside `block`
fn first_subnet(name: &str, block: Ipv4Net, prefix_len: u8) -> Result<Ipv4Net, TopologyError> {
    let outside = || TopologyError::SubnetOutsideBlock {
        network: name.to_string(),
        block,
        prefix_len,
    };

    if prefix_len < block.prefix_len() {
        return Err(outside());
    }
    block
        .subnets(prefix_len)
        .map_err(|_| outside())?
        .next()
        .ok_or_else(outside)
}

/// Declare one network per config entry, in order
pub fn declare_networks(
    configs: &[NetworkConfig],
    subnet_prefix_len: u8,
) -> Result<Vec<Network>, TopologyError> {
    if configs.len() < 2 {
        return Err(TopologyError::TooFewNetworks(configs.len()));
    }

    let mut seen = HashSet::new();
    let mut networks: Vec<Network> = Vec::with_capacity(configs.len());

    for (index, config) in configs.iter().enumerate() {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(TopologyError::EmptyNetworkName(index + 1));
        }
        if !seen.insert(name.to_string()) {
            return Err(TopologyError::DuplicateNetwork(config.name.clone()));
        }

        let cidr = parse_block(config)?;
        if let Some(other) = networks.iter().find(|n| blocks_overlap(&n.cidr, &cidr)) {
            return Err(TopologyError::AddressBlockOverlap {
                first: other.name.clone(),
                first_block: other.cidr,
                second: name.to_string(),
                second_block: cidr,
            });
        }

        let ordinal = index + 1;
        let id = format!("VPC{ordinal}");
        let subnet_id = format!("{id}PublicSubnet1");
        let subnet = Subnet {
            id: LogicalId::new(subnet_id.clone()),
            name: format!("{name}-Public"),
            cidr: first_subnet(name, cidr, subnet_prefix_len)?,
            route_table: LogicalId::new(format!("{subnet_id}RouteTable")),
            route_table_association: LogicalId::new(format!("{subnet_id}RouteTableAssociation")),
            map_public_ip_on_launch: true,
        };

        debug!(network = %name, block = %cidr, subnet = %subnet.cidr, "Declared network");

        networks.push(Network {
            ordinal,
            name: name.to_string(),
            cidr,
            subnet,
            internet_gateway: LogicalId::new(format!("{id}IGW")),
            gateway_attachment: LogicalId::new(format!("{id}VPCGW")),
            default_route: LogicalId::new(format!("{subnet_id}DefaultRoute")),
            id: LogicalId::new(id),
        });
    }

    Ok(networks)
}
