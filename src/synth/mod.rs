//! Template Synthesis
//!
//! Renders a declared [`Topology`] as a CloudFormation template. Each
//! entity maps to one or more resources; references between them become
//! `Ref` / `Fn::GetAtt` so the engine can infer creation order.

pub mod intrinsic;
pub mod template;

pub use template::{OutputEntry, Parameter, Resource, Template};

use serde_json::{json, Value};
use tracing::info;

use crate::topology::types::{
    Attribute, FirewallRuleSet, Instance, Keypair, Network, PeeringLink, Route,
};
use crate::topology::Topology;
use intrinsic::{first_availability_zone, get_att, reference};

/// Catch-all destination for the internet route
const ANY_IPV4: &str = "0.0.0.0/0";

fn name_tag(stack: &str, name: &str) -> Value {
    json!([{ "Key": "Name", "Value": format!("{stack}/{name}") }])
}

fn add_network(template: &mut Template, stack: &str, network: &Network) {
    let subnet = &network.subnet;

    template.add_resource(
        &network.id,
        Resource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": network.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag(stack, &network.name),
            }),
        ),
    );

    template.add_resource(
        &subnet.id,
        Resource::new(
            "AWS::EC2::Subnet",
            json!({
                "VpcId": reference(&network.id),
                "AvailabilityZone": first_availability_zone(),
                "CidrBlock": subnet.cidr.to_string(),
                "MapPublicIpOnLaunch": subnet.map_public_ip_on_launch,
                "Tags": name_tag(stack, &subnet.name),
            }),
        ),
    );

    template.add_resource(
        &subnet.route_table,
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({
                "VpcId": reference(&network.id),
                "Tags": name_tag(stack, &subnet.name),
            }),
        ),
    );

    template.add_resource(
        &subnet.route_table_association,
        Resource::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": reference(&subnet.route_table),
                "SubnetId": reference(&subnet.id),
            }),
        ),
    );

    template.add_resource(
        &network.internet_gateway,
        Resource::new(
            "AWS::EC2::InternetGateway",
            json!({ "Tags": name_tag(stack, &network.name) }),
        ),
    );

    template.add_resource(
        &network.gateway_attachment,
        Resource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "VpcId": reference(&network.id),
                "InternetGatewayId": reference(&network.internet_gateway),
            }),
        ),
    );

    // The gateway must be attached before a route can target it
    template.add_resource(
        &network.default_route,
        Resource::new(
            "AWS::EC2::Route",
            json!({
                "RouteTableId": reference(&subnet.route_table),
                "DestinationCidrBlock": ANY_IPV4,
                "GatewayId": reference(&network.internet_gateway),
            }),
        )
        .depends_on(&network.gateway_attachment),
    );
}

fn add_peering_link(template: &mut Template, stack: &str, link: &PeeringLink) {
    template.add_resource(
        &link.id,
        Resource::new(
            "AWS::EC2::VPCPeeringConnection",
            json!({
                "VpcId": reference(&link.requester),
                "PeerVpcId": reference(&link.accepter),
                "Tags": name_tag(stack, link.id.as_str()),
            }),
        ),
    );
}

fn add_route(template: &mut Template, route: &Route) {
    template.add_resource(
        &route.id,
        Resource::new(
            "AWS::EC2::Route",
            json!({
                "RouteTableId": reference(&route.route_table),
                "DestinationCidrBlock": get_att(&route.destination_network, Attribute::CidrBlock),
                "VpcPeeringConnectionId": reference(&route.peering_link),
            }),
        ),
    );
}

fn add_firewall(template: &mut Template, stack: &str, firewall: &FirewallRuleSet) {
    let ingress: Vec<Value> = firewall
        .ingress
        .iter()
        .map(|rule| {
            let mut entry = json!({
                "CidrIp": rule.source.to_string(),
                "Description": rule.description,
                "IpProtocol": rule.protocol.ip_protocol(),
            });
            if let Some((from, to)) = rule.ports.bounds() {
                entry["FromPort"] = json!(from);
                entry["ToPort"] = json!(to);
            }
            entry
        })
        .collect();

    let mut properties = json!({
        "GroupDescription": format!("{stack}/{}", firewall.name),
        "GroupName": firewall.name,
        "VpcId": reference(&firewall.network),
        "SecurityGroupIngress": ingress,
    });
    if firewall.allow_all_outbound {
        properties["SecurityGroupEgress"] = json!([{
            "CidrIp": ANY_IPV4,
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1",
        }]);
    }

    template.add_resource(&firewall.id, Resource::new("AWS::EC2::SecurityGroup", properties));
}

fn add_keypair(template: &mut Template, keypair: &Keypair) {
    template.add_resource(
        &keypair.id,
        Resource::new("AWS::EC2::KeyPair", json!({ "KeyName": keypair.key_name }))
            .removal_policy(keypair.removal_policy.as_policy()),
    );
}

fn add_instance(template: &mut Template, stack: &str, instance: &Instance) {
    let role = &instance.role;

    let mut role_properties = json!({
        "AssumeRolePolicyDocument": {
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": "ec2.amazonaws.com" },
            }],
            "Version": "2012-10-17",
        },
        "Tags": name_tag(stack, instance.id.as_str()),
    });
    if !role.granted_actions.is_empty() {
        role_properties["Policies"] = json!([{
            "PolicyName": format!("{}ServiceSettings", instance.id),
            "PolicyDocument": {
                "Statement": [{
                    "Action": role.granted_actions,
                    "Effect": "Allow",
                    "Resource": "*",
                }],
                "Version": "2012-10-17",
            },
        }]);
    }
    template.add_resource(&role.id, Resource::new("AWS::IAM::Role", role_properties));

    template.add_resource(
        &role.profile,
        Resource::new(
            "AWS::IAM::InstanceProfile",
            json!({ "Roles": [reference(&role.id)] }),
        ),
    );

    let group = get_att(&instance.firewall, Attribute::GroupId);
    let mut properties = json!({
        "AvailabilityZone": first_availability_zone(),
        "IamInstanceProfile": reference(&role.profile),
        "ImageId": reference(&instance.image),
        "InstanceType": instance.instance_type,
        "KeyName": reference(&instance.keypair),
        "Tags": name_tag(stack, instance.id.as_str()),
    });
    if instance.associate_public_ip {
        properties["NetworkInterfaces"] = json!([{
            "AssociatePublicIpAddress": true,
            "DeviceIndex": "0",
            "GroupSet": [group],
            "SubnetId": reference(&instance.subnet),
        }]);
    } else {
        properties["SecurityGroupIds"] = json!([group]);
        properties["SubnetId"] = reference(&instance.subnet);
    }

    template.add_resource(
        &instance.id,
        Resource::new("AWS::EC2::Instance", properties).depends_on(&role.id),
    );
}

/// Render the topology as a CloudFormation template
pub fn synthesize(topology: &Topology) -> Template {
    let stack = topology.stack_name.as_str();
    let mut template = Template::new(&topology.description);

    template.parameters.insert(
        topology.image.id.to_string(),
        Parameter {
            parameter_type: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>".to_string(),
            default: topology.image.ssm_parameter.clone(),
            description: Some("Machine image for the test instances".to_string()),
        },
    );

    for network in &topology.networks {
        add_network(&mut template, stack, network);
    }
    for link in &topology.peering_links {
        add_peering_link(&mut template, stack, link);
    }
    for route in &topology.routes {
        add_route(&mut template, route);
    }
    for firewall in &topology.firewalls {
        add_firewall(&mut template, stack, firewall);
    }
    add_keypair(&mut template, &topology.keypair);
    for instance in &topology.instances {
        add_instance(&mut template, stack, instance);
    }

    for output in &topology.outputs {
        template.outputs.insert(
            output.name.clone(),
            OutputEntry {
                description: output.description.clone(),
                value: intrinsic::output_value(&output.value),
            },
        );
    }

    info!(
        stack = %stack,
        resources = template.resources.len(),
        outputs = template.outputs.len(),
        "Template synthesized"
    );

    template
}
