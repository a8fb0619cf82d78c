//! VPC Peering Topology
//!
//! Declares three isolated networks peered in a triangle, with routes,
//! firewall rules, a shared keypair and one test instance per network,
//! and synthesizes the graph into a CloudFormation template.

pub mod config;
pub mod synth;
pub mod topology;

pub use config::TopologyConfig;
pub use synth::{synthesize, Template};
pub use topology::{declare, Topology, TopologyError};
