//! Types for the peering topology
//!
//! Every entity here is an immutable record produced once by
//! [`declare`](super::declare). Cross references between entities are
//! expressed as [`LogicalId`]s, the template-local names the provisioning
//! engine uses to infer creation order.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template-local resource name (e.g. `VPC1`, `SecurityGroup2`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The single public subnet carved out of a network's address block
#[derive(Debug, Clone, Serialize)]
pub struct Subnet {
    pub id: LogicalId,
    /// Display name (e.g. "VPC1-Public")
    pub name: String,
    pub cidr: Ipv4Net,
    /// Route table associated with this subnet
    pub route_table: LogicalId,
    pub route_table_association: LogicalId,
    /// Instances launched here receive a public address by default
    pub map_public_ip_on_launch: bool,
}

/// An isolated virtual network
#[derive(Debug, Clone, Serialize)]
pub struct Network {
    pub id: LogicalId,
    /// 1-based position in the declaration, used in derived names
    pub ordinal: usize,
    pub name: String,
    pub cidr: Ipv4Net,
    pub subnet: Subnet,
    pub internet_gateway: LogicalId,
    pub gateway_attachment: LogicalId,
    /// `0.0.0.0/0` route through the internet gateway
    pub default_route: LogicalId,
}

/// Peering between two networks. Direction only records who requested
/// the link; traffic flows both ways once routes exist on each side.
#[derive(Debug, Clone, Serialize)]
pub struct PeeringLink {
    pub id: LogicalId,
    pub requester: LogicalId,
    pub accepter: LogicalId,
}

impl PeeringLink {
    /// Whether this link joins `a` and `b`, in either direction
    pub fn joins(&self, a: &LogicalId, b: &LogicalId) -> bool {
        (&self.requester == a && &self.accepter == b) || (&self.requester == b && &self.accepter == a)
    }
}

/// Route-table entry sending a peer's address block over a peering link
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub id: LogicalId,
    /// Network owning the route table
    pub network: LogicalId,
    pub route_table: LogicalId,
    pub destination: Ipv4Net,
    pub destination_network: LogicalId,
    pub peering_link: LogicalId,
}

/// IP protocol matched by an ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    All,
    Tcp,
}

impl Protocol {
    /// Protocol token as understood by the provider ("-1" means all)
    pub fn ip_protocol(&self) -> &'static str {
        match self {
            Protocol::All => "-1",
            Protocol::Tcp => "tcp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::All => write!(f, "all"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// Port selection of an ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRange {
    All,
    Single(u16),
}

impl PortRange {
    /// Inclusive bounds, `None` when every port is allowed
    pub fn bounds(&self) -> Option<(u16, u16)> {
        match *self {
            PortRange::All => None,
            PortRange::Single(p) => Some((p, p)),
        }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortRange::All => write!(f, "ALL TRAFFIC"),
            PortRange::Single(p) => write!(f, "{p}"),
        }
    }
}

/// Single inbound allow rule
#[derive(Debug, Clone, Serialize)]
pub struct IngressRule {
    pub source: Ipv4Net,
    pub protocol: Protocol,
    pub ports: PortRange,
    pub description: String,
}

impl IngressRule {
    pub fn new(source: Ipv4Net, protocol: Protocol, ports: PortRange) -> Self {
        Self {
            description: format!("from {source}:{ports}"),
            source,
            protocol,
            ports,
        }
    }
}

/// Stateful allow-list scoped to one network's instances
#[derive(Debug, Clone, Serialize)]
pub struct FirewallRuleSet {
    pub id: LogicalId,
    pub name: String,
    pub network: LogicalId,
    pub ingress: Vec<IngressRule>,
    /// Egress is left at the provider default of allow-all
    pub allow_all_outbound: bool,
}

impl FirewallRuleSet {
    /// Whether every protocol and port from the whole of `block` is admitted by one rule
    pub fn permits_all_from(&self, block: &Ipv4Net) -> bool {
        self.ingress.iter().any(|rule| {
            rule.protocol == Protocol::All && rule.ports == PortRange::All && rule.source.contains(block)
        })
    }

    /// Whether `port` is open over TCP to every address
    pub fn opens_to_anywhere(&self, port: u16) -> bool {
        self.ingress.iter().any(|rule| {
            rule.protocol == Protocol::Tcp
                && rule.ports == PortRange::Single(port)
                && rule.source.prefix_len() == 0
        })
    }
}

/// What happens to a resource when the topology is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Delete with the topology (nothing orphaned)
    #[default]
    Destroy,
    /// Keep after the topology is deleted
    Retain,
}

impl RemovalPolicy {
    /// Provider policy keyword
    pub fn as_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Destroy => write!(f, "destroy"),
            RemovalPolicy::Retain => write!(f, "retain"),
        }
    }
}

/// Shared SSH keypair. The private half is generated by the provider
/// and stored encrypted under `/ec2/keypair/<KeyPairId>`.
#[derive(Debug, Clone, Serialize)]
pub struct Keypair {
    pub id: LogicalId,
    pub key_name: String,
    pub removal_policy: RemovalPolicy,
}

/// Machine image resolved at deploy time from a public parameter path
#[derive(Debug, Clone, Serialize)]
pub struct MachineImage {
    pub id: LogicalId,
    pub ssm_parameter: String,
}

/// Role assumed by an instance, with the profile wrapping it
#[derive(Debug, Clone, Serialize)]
pub struct InstanceRole {
    pub id: LogicalId,
    pub profile: LogicalId,
    /// Actions granted on `*` in addition to the trust policy
    pub granted_actions: Vec<String>,
}

/// Test instance attached to one network
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    pub id: LogicalId,
    pub ordinal: usize,
    pub network: LogicalId,
    pub subnet: LogicalId,
    pub firewall: LogicalId,
    pub keypair: LogicalId,
    pub image: LogicalId,
    pub instance_type: String,
    pub associate_public_ip: bool,
    pub role: InstanceRole,
}

/// Deploy-time attribute of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    PublicIp,
    PrivateIp,
    KeyPairId,
    CidrBlock,
    GroupId,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::PublicIp => "PublicIp",
            Attribute::PrivateIp => "PrivateIp",
            Attribute::KeyPairId => "KeyPairId",
            Attribute::CidrBlock => "CidrBlock",
            Attribute::GroupId => "GroupId",
        }
    }
}

/// Piece of an output value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Fragment {
    Literal(String),
    Attribute { resource: LogicalId, attribute: Attribute },
    /// Region the topology is deployed into, known only at deploy time
    Region,
}

/// Value surfaced to the operator after deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputValue {
    pub fragments: Vec<Fragment>,
}

/// Named output of the topology
#[derive(Debug, Clone, Serialize)]
pub struct Output {
    pub name: String,
    pub description: Option<String>,
    pub value: OutputValue,
}

/// Errors raised while declaring or checking a topology
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Address block could not be parsed or has host bits set
    #[error("Invalid address block for {network}: {value}")]
    InvalidAddressBlock { network: String, value: String },

    /// Two networks share address space
    #[error("Address block {first_block} of {first} overlaps {second_block} of {second}")]
    AddressBlockOverlap {
        first: String,
        first_block: Ipv4Net,
        second: String,
        second_block: Ipv4Net,
    },

    /// Subnet prefix does not fit inside the network block
    #[error("Subnet /{prefix_len} does not fit in {network} ({block})")]
    SubnetOutsideBlock {
        network: String,
        block: Ipv4Net,
        prefix_len: u8,
    },

    /// Peering needs at least two networks
    #[error("At least 2 networks are required, got {0}")]
    TooFewNetworks(usize),

    /// Network names must not be blank
    #[error("Network #{0} has an empty name")]
    EmptyNetworkName(usize),

    /// Network names must be unique
    #[error("Duplicate network name: {0}")]
    DuplicateNetwork(String),

    /// A reference names a network that was never declared
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// Key name rejected before reaching the provider
    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    /// Region is not a provider region code
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Output value references an attribute nobody supplied
    #[error("Unresolved attribute {attribute} of {resource}")]
    UnresolvedAttribute { resource: String, attribute: String },

    /// Built graph violates structural rules
    #[error("Topology failed {} structural check(s): {}", .0.len(), .0.join("; "))]
    Structure(Vec<String>),
}
