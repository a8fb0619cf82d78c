//! Structural checks over a declared topology
//!
//! Each check appends human-readable findings; an empty list means the
//! graph is well formed. Nothing here talks to the provider.

use std::collections::{HashMap, HashSet};

use super::network::blocks_overlap;
use super::types::{Attribute, RemovalPolicy};
use super::Topology;

/// A failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: &'static str,
    pub detail: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.detail)
    }
}

struct Findings(Vec<Violation>);

impl Findings {
    fn push(&mut self, rule: &'static str, detail: String) {
        self.0.push(Violation { rule, detail });
    }
}

/// Run every check
pub fn check(topology: &Topology) -> Vec<Violation> {
    let mut findings = Findings(Vec::new());

    check_address_blocks(topology, &mut findings);
    check_peering(topology, &mut findings);
    check_routes(topology, &mut findings);
    check_firewalls(topology, &mut findings);
    check_keypair(topology, &mut findings);
    check_instances(topology, &mut findings);
    check_outputs(topology, &mut findings);

    findings.0
}

fn check_address_blocks(topology: &Topology, findings: &mut Findings) {
    let nets = &topology.networks;
    for (i, a) in nets.iter().enumerate() {
        for b in &nets[i + 1..] {
            if blocks_overlap(&a.cidr, &b.cidr) {
                findings.push(
                    "address-blocks",
                    format!("{} ({}) overlaps {} ({})", a.id, a.cidr, b.id, b.cidr),
                );
            }
        }
        if !a.cidr.contains(&a.subnet.cidr) {
            findings.push(
                "address-blocks",
                format!("subnet {} lies outside {} ({})", a.subnet.cidr, a.id, a.cidr),
            );
        }
    }
}

fn check_peering(topology: &Topology, findings: &mut Findings) {
    let n = topology.networks.len();
    let expected = n * n.saturating_sub(1) / 2;
    if topology.peering_links.len() != expected {
        findings.push(
            "peering",
            format!(
                "expected {} peering links for {} networks, found {}",
                expected,
                n,
                topology.peering_links.len()
            ),
        );
    }

    let known: HashSet<_> = topology.networks.iter().map(|n| &n.id).collect();
    let mut pairs = HashSet::new();
    for link in &topology.peering_links {
        if link.requester == link.accepter {
            findings.push("peering", format!("{} peers {} with itself", link.id, link.requester));
            continue;
        }
        if !known.contains(&link.requester) || !known.contains(&link.accepter) {
            findings.push("peering", format!("{} references an undeclared network", link.id));
        }
        let pair = if link.requester < link.accepter {
            (&link.requester, &link.accepter)
        } else {
            (&link.accepter, &link.requester)
        };
        if !pairs.insert(pair) {
            findings.push(
                "peering",
                format!("{} duplicates the link between {} and {}", link.id, pair.0, pair.1),
            );
        }
    }

    for (i, a) in topology.networks.iter().enumerate() {
        for b in &topology.networks[i + 1..] {
            if !topology.peering_links.iter().any(|l| l.joins(&a.id, &b.id)) {
                findings.push("peering", format!("no peering link between {} and {}", a.id, b.id));
            }
        }
    }
}

fn check_routes(topology: &Topology, findings: &mut Findings) {
    let peers = topology.networks.len().saturating_sub(1);

    for network in &topology.networks {
        let routes: Vec<_> = topology.routes.iter().filter(|r| r.network == network.id).collect();
        if routes.len() != peers {
            findings.push(
                "routes",
                format!("{} has {} peer routes, expected {}", network.id, routes.len(), peers),
            );
        }

        let mut destinations = HashSet::new();
        for route in routes {
            if route.route_table != network.subnet.route_table {
                findings.push(
                    "routes",
                    format!("{} is not in the route table of {}", route.id, network.id),
                );
            }
            if !destinations.insert(&route.destination_network) {
                findings.push(
                    "routes",
                    format!("{} has more than one route to {}", network.id, route.destination_network),
                );
            }

            let Some(destination) = topology.network(&route.destination_network) else {
                findings.push("routes", format!("{} targets an undeclared network", route.id));
                continue;
            };
            if destination.id == network.id {
                findings.push("routes", format!("{} routes {} to itself", route.id, network.id));
            }
            if route.destination != destination.cidr {
                findings.push(
                    "routes",
                    format!(
                        "{} sends {} but {} uses {}",
                        route.id, route.destination, destination.id, destination.cidr
                    ),
                );
            }

            let joins = topology
                .peering_links
                .iter()
                .find(|l| l.id == route.peering_link)
                .is_some_and(|l| l.joins(&network.id, &destination.id));
            if !joins {
                findings.push(
                    "routes",
                    format!(
                        "{} uses {} which does not join {} and {}",
                        route.id, route.peering_link, network.id, destination.id
                    ),
                );
            }
        }
    }
}

fn check_firewalls(topology: &Topology, findings: &mut Findings) {
    for network in &topology.networks {
        let sets: Vec<_> = topology.firewalls.iter().filter(|f| f.network == network.id).collect();
        let [set] = sets.as_slice() else {
            findings.push(
                "firewall",
                format!("{} has {} rule sets, expected 1", network.id, sets.len()),
            );
            continue;
        };

        for peer in topology.networks.iter().filter(|p| p.id != network.id) {
            if !set.permits_all_from(&peer.subnet.cidr) {
                findings.push(
                    "firewall",
                    format!("{} does not admit all traffic from {} ({})", set.id, peer.id, peer.subnet.cidr),
                );
            }
        }

        if !set.opens_to_anywhere(topology.remote_shell_port) {
            findings.push(
                "firewall",
                format!("{} does not open tcp/{} to anywhere", set.id, topology.remote_shell_port),
            );
        }
        if !set.allow_all_outbound {
            findings.push("firewall", format!("{} restricts outbound traffic", set.id));
        }
    }
}

fn check_keypair(topology: &Topology, findings: &mut Findings) {
    if topology.keypair.removal_policy != RemovalPolicy::Destroy {
        findings.push(
            "keypair",
            format!(
                "{} would outlive the topology (removal policy {})",
                topology.keypair.id, topology.keypair.removal_policy
            ),
        );
    }
}

fn check_instances(topology: &Topology, findings: &mut Findings) {
    if topology.instances.len() != topology.networks.len() {
        findings.push(
            "instances",
            format!(
                "expected {} instances, found {}",
                topology.networks.len(),
                topology.instances.len()
            ),
        );
    }

    let mut per_network: HashMap<_, usize> = HashMap::new();
    for instance in &topology.instances {
        *per_network.entry(&instance.network).or_default() += 1;

        if instance.keypair != topology.keypair.id {
            findings.push(
                "instances",
                format!("{} does not use the shared keypair {}", instance.id, topology.keypair.id),
            );
        }

        let Some(network) = topology.network(&instance.network) else {
            findings.push("instances", format!("{} is on an undeclared network", instance.id));
            continue;
        };
        if instance.subnet != network.subnet.id {
            findings.push(
                "instances",
                format!("{} is not in the public subnet of {}", instance.id, network.id),
            );
        }
        let own_firewall = topology
            .firewalls
            .iter()
            .find(|f| f.id == instance.firewall)
            .is_some_and(|f| f.network == network.id);
        if !own_firewall {
            findings.push(
                "instances",
                format!("{} is not attached to the rule set of {}", instance.id, network.id),
            );
        }
    }

    for (network, count) in per_network {
        if count > 1 {
            findings.push("instances", format!("{network} hosts {count} instances"));
        }
    }
}

fn check_outputs(topology: &Topology, findings: &mut Findings) {
    for instance in &topology.instances {
        for attribute in [Attribute::PublicIp, Attribute::PrivateIp] {
            let count = topology
                .outputs
                .iter()
                .filter(|o| o.value.references(&instance.id, attribute))
                .count();
            if count != 1 {
                findings.push(
                    "outputs",
                    format!("{} has {} {} outputs, expected 1", instance.id, count, attribute.as_str()),
                );
            }
        }
    }

    let commands = topology
        .outputs
        .iter()
        .filter(|o| o.value.references(&topology.keypair.id, Attribute::KeyPairId))
        .collect::<Vec<_>>();
    match commands.as_slice() {
        [command] => {
            if !command.value.embeds_region(topology.region.as_deref()) {
                findings.push("outputs", format!("{} does not embed the region", command.name));
            }
        }
        other => findings.push(
            "outputs",
            format!("expected 1 key command output, found {}", other.len()),
        ),
    }
}
