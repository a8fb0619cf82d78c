//! Topology configuration
//!
//! The defaults reproduce the canonical deployment: three /16 networks
//! (10.1, 10.2, 10.3), a /24 public subnet in each, `t2.micro` test
//! instances and one shared keypair deleted with the stack.
//!
//! Values can be overridden from:
//! - a JSON file (via `TopologyConfig::load()`), missing fields keep defaults
//! - environment variables (via `TopologyConfig::apply_env()`):
//!   `VPC_PEERING_REGION`, `VPC_PEERING_STACK_NAME`
//!
//! `AWS_REGION` is never embedded in the template. It only fills in the
//! region when rendering commands locally (see `TopologyConfig::operator_region()`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::debug;

/// Public parameter that always points at the latest Amazon Linux AMI
pub const AMAZON_LINUX_PARAMETER: &str =
    "/aws/service/ami-amazon-linux-latest/amzn-ami-hvm-x86_64-gp2";

/// One network to declare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Display name (e.g. "VPC1")
    pub name: String,
    /// Address block in CIDR notation (e.g. "10.1.0.0/16")
    pub cidr: String,
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>, cidr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr: cidr.into(),
        }
    }
}

/// Everything the declaration reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Stack name, used as a prefix in resource tags
    pub stack_name: String,
    pub description: String,
    /// Deployment region; `None` defers to the region the stack is deployed into
    pub region: Option<String>,
    pub networks: Vec<NetworkConfig>,
    /// Prefix length of the public subnet carved from each block
    pub subnet_prefix_len: u8,
    /// Port opened to anywhere for remote shell access
    pub remote_shell_port: u16,
    pub key_name: String,
    pub instance_type: String,
    /// Parameter path resolving to the machine image id
    pub image_parameter: String,
    pub associate_public_ip: bool,
    /// Networks whose instance role may read and change SSM service settings
    pub service_setting_access: Vec<String>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            stack_name: "VpcPeeringStack".to_string(),
            description: "Three VPCs peered in a triangle with one test instance each".to_string(),
            region: None,
            networks: vec![
                NetworkConfig::new("VPC1", "10.1.0.0/16"),
                NetworkConfig::new("VPC2", "10.2.0.0/16"),
                NetworkConfig::new("VPC3", "10.3.0.0/16"),
            ],
            subnet_prefix_len: 24,
            remote_shell_port: 22,
            key_name: "keypair-for-vpc-peering".to_string(),
            instance_type: "t2.micro".to_string(),
            image_parameter: AMAZON_LINUX_PARAMETER.to_string(),
            associate_public_ip: true,
            service_setting_access: vec!["VPC2".to_string()],
        }
    }
}

impl TopologyConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading topology config");

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply environment overrides
    pub fn apply_env(self) -> Self {
        let region = env::var("VPC_PEERING_REGION").ok();
        let stack_name = env::var("VPC_PEERING_STACK_NAME").ok();
        self.with_overrides(region, stack_name)
    }

    /// Replace region and stack name when a value is given
    pub fn with_overrides(mut self, region: Option<String>, stack_name: Option<String>) -> Self {
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            self.region = Some(region);
        }
        if let Some(stack_name) = stack_name.filter(|s| !s.is_empty()) {
            self.stack_name = stack_name;
        }
        self
    }

    /// Region for commands rendered on the operator's machine: the
    /// configured one, else the shell's `AWS_REGION`
    pub fn operator_region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(|| env::var("AWS_REGION").ok().filter(|r| !r.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_reproduces_three_networks() {
        let config = TopologyConfig::default();

        assert_eq!(config.networks.len(), 3);
        assert_eq!(config.networks[0], NetworkConfig::new("VPC1", "10.1.0.0/16"));
        assert_eq!(config.networks[2].cidr, "10.3.0.0/16");
        assert_eq!(config.remote_shell_port, 22);
        assert!(config.region.is_none());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"region": "eu-west-1", "instance_type": "t3.micro"}}"#
        )
        .unwrap();

        let config = TopologyConfig::load(file.path()).unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.instance_type, "t3.micro");
        assert_eq!(config.networks.len(), 3);
        assert_eq!(config.key_name, "keypair-for-vpc-peering");
    }

    #[test]
    fn test_load_reports_path_on_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = TopologyConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_overrides_ignore_empty_values() {
        let config = TopologyConfig::default()
            .with_overrides(Some(String::new()), Some("PeeringLab".to_string()));

        assert!(config.region.is_none());
        assert_eq!(config.stack_name, "PeeringLab");
    }

    #[test]
    fn test_aws_region_only_used_for_operator_commands() {
        env::remove_var("VPC_PEERING_REGION");
        env::set_var("AWS_REGION", "eu-west-3");

        let config = TopologyConfig::default().apply_env();
        assert!(config.region.is_none());
        assert_eq!(config.operator_region().as_deref(), Some("eu-west-3"));

        let pinned = config.with_overrides(Some("us-east-2".to_string()), None);
        assert_eq!(pinned.operator_region().as_deref(), Some("us-east-2"));

        env::remove_var("AWS_REGION");
    }
}
