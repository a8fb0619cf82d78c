//! CloudFormation intrinsic functions as JSON values

use serde_json::{json, Value};

use crate::topology::types::{Attribute, Fragment, LogicalId, OutputValue};

/// Pseudo parameter holding the deployment region
pub const REGION: &str = "AWS::Region";

pub fn reference(id: impl AsRef<str>) -> Value {
    json!({ "Ref": id.as_ref() })
}

pub fn get_att(id: &LogicalId, attribute: Attribute) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute.as_str()] })
}

pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// First availability zone of the deployment region
pub fn first_availability_zone() -> Value {
    json!({ "Fn::Select": [0, { "Fn::GetAZs": "" }] })
}

fn fragment(fragment: &Fragment) -> Value {
    match fragment {
        Fragment::Literal(text) => Value::String(text.clone()),
        Fragment::Attribute { resource, attribute } => get_att(resource, *attribute),
        Fragment::Region => reference(REGION),
    }
}

/// Render an output value, collapsing single fragments
pub fn output_value(value: &OutputValue) -> Value {
    match value.fragments.as_slice() {
        [single] => fragment(single),
        many => join("", many.iter().map(fragment).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_attribute_is_get_att() {
        let id = LogicalId::new("EC2Instance1");
        let value = output_value(&OutputValue::attribute(&id, Attribute::PublicIp));

        assert_eq!(value, json!({ "Fn::GetAtt": ["EC2Instance1", "PublicIp"] }));
    }

    #[test]
    fn test_template_is_join() {
        let value = OutputValue {
            fragments: vec![
                Fragment::Literal("region=".to_string()),
                Fragment::Region,
            ],
        };

        assert_eq!(
            output_value(&value),
            json!({ "Fn::Join": ["", ["region=", { "Ref": "AWS::Region" }]] })
        );
    }
}
