//! Operator-facing outputs
//!
//! Address outputs are plain attribute references. The key command is a
//! template stitched together from literals, the keypair id and the
//! region, resolved either by the provider or later via [`OutputValue::render`].

use std::collections::HashMap;

use super::types::{Attribute, Fragment, Instance, Keypair, LogicalId, Output, OutputValue, TopologyError};

/// Name of the key-retrieval command output
pub const SSH_KEY_COMMAND_OUTPUT: &str = "GetSSHKeyCommand";

/// Supplies deploy-time values when rendering outputs offline
pub trait AttributeResolver {
    fn attribute(&self, resource: &LogicalId, attribute: Attribute) -> Option<String>;
    fn region(&self) -> Option<String>;
}

/// Resolver backed by values the operator already knows
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    attributes: HashMap<(LogicalId, Attribute), String>,
    region: Option<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(
        mut self,
        resource: &LogicalId,
        attribute: Attribute,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert((resource.clone(), attribute), value.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl AttributeResolver for StaticResolver {
    fn attribute(&self, resource: &LogicalId, attribute: Attribute) -> Option<String> {
        self.attributes.get(&(resource.clone(), attribute)).cloned()
    }

    fn region(&self) -> Option<String> {
        self.region.clone()
    }
}

impl OutputValue {
    pub fn attribute(resource: &LogicalId, attribute: Attribute) -> Self {
        Self {
            fragments: vec![Fragment::Attribute {
                resource: resource.clone(),
                attribute,
            }],
        }
    }

    /// Whether any fragment reads `attribute` of `resource`
    pub fn references(&self, resource: &LogicalId, attribute: Attribute) -> bool {
        self.fragments.iter().any(|f| {
            matches!(f, Fragment::Attribute { resource: r, attribute: a } if r == resource && *a == attribute)
        })
    }

    /// Whether the value embeds the deployment region, deferred or literal
    pub fn embeds_region(&self, region: Option<&str>) -> bool {
        self.fragments.iter().any(|f| match f {
            Fragment::Region => true,
            Fragment::Literal(text) => region.is_some_and(|r| text.contains(r)),
            Fragment::Attribute { .. } => false,
        })
    }

    /// Resolve every fragment to text
    pub fn render(&self, resolver: &dyn AttributeResolver) -> Result<String, TopologyError> {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Literal(text) => out.push_str(text),
                Fragment::Attribute { resource, attribute } => {
                    let value = resolver.attribute(resource, *attribute).ok_or_else(|| {
                        TopologyError::UnresolvedAttribute {
                            resource: resource.to_string(),
                            attribute: attribute.as_str().to_string(),
                        }
                    })?;
                    out.push_str(&value);
                }
                Fragment::Region => {
                    let region = resolver.region().ok_or_else(|| TopologyError::UnresolvedAttribute {
                        resource: "AWS".to_string(),
                        attribute: "Region".to_string(),
                    })?;
                    out.push_str(&region);
                }
            }
        }
        Ok(out)
    }
}

/// Command fetching the decrypted private key from Parameter Store
pub fn ssh_key_command(keypair: &Keypair, region: Option<&str>) -> OutputValue {
    let region = match region {
        Some(r) => Fragment::Literal(r.to_string()),
        None => Fragment::Region,
    };

    OutputValue {
        fragments: vec![
            Fragment::Literal("aws ssm get-parameter --name /ec2/keypair/".to_string()),
            Fragment::Attribute {
                resource: keypair.id.clone(),
                attribute: Attribute::KeyPairId,
            },
            Fragment::Literal(" --region ".to_string()),
            region,
            Fragment::Literal(
                " --with-decryption --query Parameter.Value --output text".to_string(),
            ),
        ],
    }
}

/// Key command first, then public and private address of every instance
pub fn declare_outputs(instances: &[Instance], keypair: &Keypair, region: Option<&str>) -> Vec<Output> {
    let mut outputs = vec![Output {
        name: SSH_KEY_COMMAND_OUTPUT.to_string(),
        description: Some("Retrieve the private key of the shared keypair".to_string()),
        value: ssh_key_command(keypair, region),
    }];

    for instance in instances {
        outputs.push(Output {
            name: format!("{}PublicIp", instance.id),
            description: None,
            value: OutputValue::attribute(&instance.id, Attribute::PublicIp),
        });
        outputs.push(Output {
            name: format!("{}PrivateIp", instance.id),
            description: None,
            value: OutputValue::attribute(&instance.id, Attribute::PrivateIp),
        });
    }

    outputs
}
