//! Peering links and the routes that use them
//!
//! Links form a complete mesh. Ring links come first and point from each
//! network to the next one (wrapping around), so three networks produce
//! the triangle 1→2, 2→3, 3→1. Any remaining pairs (four or more
//! networks) are joined lower to higher ordinal.

use tracing::debug;

use super::types::{LogicalId, Network, PeeringLink, Route};

fn link(requester: &Network, accepter: &Network) -> PeeringLink {
    PeeringLink {
        id: LogicalId::new(format!(
            "VPCPeeringConnection{}to{}",
            requester.ordinal, accepter.ordinal
        )),
        requester: requester.id.clone(),
        accepter: accepter.id.clone(),
    }
}

/// One link per unordered pair of networks
pub fn declare_peering_links(networks: &[Network]) -> Vec<PeeringLink> {
    let n = networks.len();
    let mut links = Vec::with_capacity(n * n.saturating_sub(1) / 2);

    if n == 2 {
        links.push(link(&networks[0], &networks[1]));
        return links;
    }

    for i in 0..n {
        links.push(link(&networks[i], &networks[(i + 1) % n]));
    }

    for i in 0..n {
        for j in (i + 2)..n {
            // (0, n-1) already closed the ring
            if i == 0 && j == n - 1 {
                continue;
            }
            links.push(link(&networks[i], &networks[j]));
        }
    }

    for l in &links {
        debug!(link = %l.id, requester = %l.requester, accepter = %l.accepter, "Declared peering link");
    }
    links
}

/// For every network, one route to each other network's block through the
/// link joining the two. The link may have either network as requester.
pub fn declare_routes(networks: &[Network], links: &[PeeringLink]) -> Vec<Route> {
    let mut routes = Vec::new();

    for network in networks {
        for other in networks.iter().filter(|o| o.id != network.id) {
            let Some(link) = links.iter().find(|l| l.joins(&network.id, &other.id)) else {
                continue;
            };

            routes.push(Route {
                id: LogicalId::new(format!(
                    "VPC{}Route{}to{}",
                    network.ordinal, network.ordinal, other.ordinal
                )),
                network: network.id.clone(),
                route_table: network.subnet.route_table.clone(),
                destination: other.cidr,
                destination_network: other.id.clone(),
                peering_link: link.id.clone(),
            });
        }
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::topology::network::declare_networks;

    fn networks(count: usize) -> Vec<Network> {
        let configs: Vec<NetworkConfig> = (1..=count)
            .map(|i| NetworkConfig::new(format!("VPC{i}"), format!("10.{i}.0.0/16")))
            .collect();
        declare_networks(&configs, 24).unwrap()
    }

    fn ids(links: &[PeeringLink]) -> Vec<&str> {
        links.iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn test_three_networks_form_triangle() {
        let links = declare_peering_links(&networks(3));

        assert_eq!(
            ids(&links),
            vec![
                "VPCPeeringConnection1to2",
                "VPCPeeringConnection2to3",
                "VPCPeeringConnection3to1"
            ]
        );
        assert_eq!(links[2].requester.as_str(), "VPC3");
        assert_eq!(links[2].accepter.as_str(), "VPC1");
    }

    #[test]
    fn test_two_networks_single_link() {
        let links = declare_peering_links(&networks(2));
        assert_eq!(ids(&links), vec!["VPCPeeringConnection1to2"]);
    }

    #[test]
    fn test_four_networks_complete_mesh() {
        let links = declare_peering_links(&networks(4));

        assert_eq!(links.len(), 6);
        assert!(ids(&links).contains(&"VPCPeeringConnection4to1"));
        assert!(ids(&links).contains(&"VPCPeeringConnection1to3"));
        assert!(ids(&links).contains(&"VPCPeeringConnection2to4"));
    }

    #[test]
    fn test_routes_follow_the_joining_link() {
        let nets = networks(3);
        let links = declare_peering_links(&nets);
        let routes = declare_routes(&nets, &links);

        assert_eq!(routes.len(), 6);

        let find = |id: &str| routes.iter().find(|r| r.id.as_str() == id).unwrap();

        // VPC1 reaches VPC3 over the link VPC3 requested
        let r13 = find("VPC1Route1to3");
        assert_eq!(r13.peering_link.as_str(), "VPCPeeringConnection3to1");
        assert_eq!(r13.destination.to_string(), "10.3.0.0/16");
        assert_eq!(r13.route_table.as_str(), "VPC1PublicSubnet1RouteTable");

        let r21 = find("VPC2Route2to1");
        assert_eq!(r21.peering_link.as_str(), "VPCPeeringConnection1to2");

        let r32 = find("VPC3Route3to2");
        assert_eq!(r32.peering_link.as_str(), "VPCPeeringConnection2to3");
        assert_eq!(r32.destination.to_string(), "10.2.0.0/16");
    }
}
