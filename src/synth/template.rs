//! CloudFormation template document

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl Resource {
    pub fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, id: impl ToString) -> Self {
        self.depends_on.push(id.to_string());
        self
    }

    /// Apply the same policy on stack deletion and on replacement
    pub fn removal_policy(mut self, policy: &str) -> Self {
        self.deletion_policy = Some(policy.to_string());
        self.update_replace_policy = Some(policy.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    pub default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Value,
}

/// Template handed to the provisioning engine. Maps are ordered so the
/// rendering is byte-for-byte stable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,
    pub resources: BTreeMap<String, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, OutputEntry>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn add_resource(&mut self, id: impl ToString, resource: Resource) {
        self.resources.insert(id.to_string(), resource);
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Logical ids of every resource of the given type
    pub fn resources_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
            .map(|(id, _)| id.as_str())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize template")
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = self.to_json_pretty()?;
        std::fs::write(path, body + "\n")
            .with_context(|| format!("Failed to write template to {}", path.display()))?;

        info!(
            path = %path.display(),
            resources = self.resources.len(),
            "Template written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_serialization_skips_empty_fields() {
        let resource = Resource::new("AWS::EC2::InternetGateway", json!({}));
        let value = serde_json::to_value(&resource).unwrap();

        assert_eq!(value, json!({ "Type": "AWS::EC2::InternetGateway", "Properties": {} }));
    }

    #[test]
    fn test_removal_policy_sets_both_fields() {
        let resource = Resource::new("AWS::EC2::KeyPair", json!({ "KeyName": "k" }))
            .removal_policy("Delete");
        let value = serde_json::to_value(&resource).unwrap();

        assert_eq!(value["DeletionPolicy"], "Delete");
        assert_eq!(value["UpdateReplacePolicy"], "Delete");
    }

    #[test]
    fn test_write_to_file() {
        let mut template = Template::new("test");
        template.add_resource("Gateway", Resource::new("AWS::EC2::InternetGateway", json!({})));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        template.write_to(&path).unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(written["Resources"]["Gateway"]["Type"], "AWS::EC2::InternetGateway");
        assert!(written.get("Outputs").is_none());
    }
}
