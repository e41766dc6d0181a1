//! Template synthesis: the only module that speaks the provider's vocabulary.
//!
//! [`Synthesizer`] turns a [`Topology`] into a [`Template`]. Resource ids
//! become logical ids, and id references become `Ref` / `Fn::GetAtt`
//! intrinsics, so the model itself stays free of provider types.

use crate::config::Config;
use crate::error::Result;
use crate::network::SubnetKind;
use crate::pattern::EventPattern;
use crate::topology::{RemovalPolicy, ResourceId, RuleTarget, Topology};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Account and region the template targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            account: cfg.environment.account.clone(),
            region: cfg.environment.region.clone(),
        }
    }

    pub fn cluster_arn(&self, cluster_name: &str) -> String {
        format!(
            "arn:aws:ecs:{}:{}:cluster/{cluster_name}",
            self.region, self.account
        )
    }

    pub fn task_definition_arn(&self, family: &str) -> String {
        format!(
            "arn:aws:ecs:{}:{}:task-definition/{family}",
            self.region, self.account
        )
    }

    pub fn function_arn(&self, function_name: &str) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{function_name}",
            self.region, self.account
        )
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties", default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(
        rename = "UpdateReplacePolicy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub update_replace_policy: Option<String>,
}

impl Resource {
    fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    fn depends_on(mut self, logical_ids: &[&str]) -> Self {
        self.depends_on = logical_ids.iter().map(|s| s.to_string()).collect();
        self.depends_on.sort();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    #[serde(rename = "Resources", default)]
    pub resources: BTreeMap<String, Resource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

impl Template {
    pub fn empty() -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    fn add(&mut self, logical_id: String, resource: Resource) {
        self.resources.insert(logical_id, resource);
    }
}

// ---------------------------------------------------------------------------
// Logical ids
// ---------------------------------------------------------------------------

/// Stable logical id for a construct path: PascalCase of the path followed by
/// the first 8 hex digits of its SHA-256.
pub fn logical_id(path: &[&str]) -> String {
    let joined = path.join("/");
    let mut human = String::new();
    for word in joined.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            human.push(first.to_ascii_uppercase());
            human.extend(chars);
        }
    }
    let digest = Sha256::digest(joined.as_bytes());
    let hash: String = digest[..4].iter().map(|b| format!("{b:02X}")).collect();
    format!("{human}{hash}")
}

fn id_of(id: &ResourceId) -> String {
    logical_id(&[id.as_str()])
}

fn reference(logical: &str) -> Value {
    json!({ "Ref": logical })
}

fn get_att(logical: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical, attribute] })
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

pub trait Synthesizer {
    fn synthesize(&self, topology: &Topology) -> Result<Template>;
}

/// Renders CloudFormation templates.
pub struct CloudFormation {
    env: Environment,
}

struct NetworkRefs {
    vpc: String,
    private_subnets: Vec<Value>,
}

impl CloudFormation {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    fn network(&self, topology: &Topology, template: &mut Template) -> Result<NetworkRefs> {
        let net = &topology.network;
        let base = net.id.as_str();
        let vpc = logical_id(&[base]);
        template.add(
            vpc.clone(),
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": net.cidr.to_string(),
                    "EnableDnsHostnames": net.enable_dns_hostnames,
                    "EnableDnsSupport": net.enable_dns_support,
                    "InstanceTenancy": "default",
                    "Tags": [{ "Key": "Name", "Value": format!("{}/{}", topology.stack_name, base) }],
                }),
            ),
        );

        let igw = logical_id(&[base, "igw"]);
        let attachment = logical_id(&[base, "vpc-gw"]);
        template.add(igw.clone(), Resource::new("AWS::EC2::InternetGateway", json!({})));
        template.add(
            attachment.clone(),
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({ "VpcId": reference(&vpc), "InternetGatewayId": reference(&igw) }),
            ),
        );

        let zones = net.availability_zones(&self.env.region);
        let mut nat_by_zone = BTreeMap::new();
        let mut private_subnets = Vec::new();
        // Public subnets come first, so every NAT gateway exists before the
        // private route that points at it is rendered.
        for subnet in net.subnets()? {
            let name = format!("{}-subnet-{}", subnet.kind.as_str(), subnet.az_index + 1);
            let subnet_id = logical_id(&[base, &name]);
            let table = logical_id(&[base, &name, "route-table"]);
            let association = logical_id(&[base, &name, "route-table-association"]);
            let route = logical_id(&[base, &name, "default-route"]);
            let zone = zones
                .get(usize::from(subnet.az_index))
                .cloned()
                .unwrap_or_default();

            template.add(
                subnet_id.clone(),
                Resource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "CidrBlock": subnet.cidr.to_string(),
                        "VpcId": reference(&vpc),
                        "AvailabilityZone": zone,
                        "MapPublicIpOnLaunch": subnet.kind == SubnetKind::Public,
                    }),
                ),
            );
            template.add(
                table.clone(),
                Resource::new("AWS::EC2::RouteTable", json!({ "VpcId": reference(&vpc) })),
            );
            template.add(
                association.clone(),
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({ "RouteTableId": reference(&table), "SubnetId": reference(&subnet_id) }),
                ),
            );

            match subnet.kind {
                SubnetKind::Public => {
                    template.add(
                        route.clone(),
                        Resource::new(
                            "AWS::EC2::Route",
                            json!({
                                "RouteTableId": reference(&table),
                                "DestinationCidrBlock": "0.0.0.0/0",
                                "GatewayId": reference(&igw),
                            }),
                        )
                        .depends_on(&[attachment.as_str()]),
                    );
                    let eip = logical_id(&[base, &name, "eip"]);
                    let nat = logical_id(&[base, &name, "nat-gateway"]);
                    template.add(
                        eip.clone(),
                        Resource::new("AWS::EC2::EIP", json!({ "Domain": "vpc" })),
                    );
                    template.add(
                        nat.clone(),
                        Resource::new(
                            "AWS::EC2::NatGateway",
                            json!({
                                "SubnetId": reference(&subnet_id),
                                "AllocationId": get_att(&eip, "AllocationId"),
                            }),
                        )
                        .depends_on(&[route.as_str(), association.as_str()]),
                    );
                    nat_by_zone.insert(subnet.az_index, nat);
                }
                SubnetKind::Private => {
                    let mut props = json!({
                        "RouteTableId": reference(&table),
                        "DestinationCidrBlock": "0.0.0.0/0",
                    });
                    if let Some(nat) = nat_by_zone.get(&subnet.az_index) {
                        props["NatGatewayId"] = reference(nat);
                    }
                    template.add(route, Resource::new("AWS::EC2::Route", props));
                    private_subnets.push(reference(&subnet_id));
                }
            }
        }

        Ok(NetworkRefs {
            vpc,
            private_subnets,
        })
    }

    fn tasks(&self, topology: &Topology, template: &mut Template) {
        for sink in &topology.log_sinks {
            let policy = match sink.removal_policy {
                RemovalPolicy::Destroy => "Delete",
                RemovalPolicy::Retain => "Retain",
            };
            let mut resource = Resource::new(
                "AWS::Logs::LogGroup",
                json!({ "LogGroupName": sink.group_name }),
            );
            resource.deletion_policy = Some(policy.to_string());
            resource.update_replace_policy = Some(policy.to_string());
            template.add(id_of(&sink.id), resource);
        }

        for task in &topology.tasks {
            let c = &task.container;
            let stream_prefix = topology
                .log_sink(&c.log_sink)
                .map(|s| s.stream_prefix.clone())
                .unwrap_or_default();
            template.add(
                id_of(&task.id),
                Resource::new(
                    "AWS::ECS::TaskDefinition",
                    json!({
                        "Family": task.family,
                        "Cpu": task.cpu.to_string(),
                        "Memory": task.memory_mib.to_string(),
                        "NetworkMode": "awsvpc",
                        "RequiresCompatibilities": ["FARGATE"],
                        "ContainerDefinitions": [{
                            "Name": c.name,
                            "Image": c.image,
                            "Memory": c.memory_mib,
                            "Essential": c.essential,
                            "LogConfiguration": {
                                "LogDriver": "awslogs",
                                "Options": {
                                    "awslogs-group": reference(&id_of(&c.log_sink)),
                                    "awslogs-stream-prefix": stream_prefix,
                                    "awslogs-region": self.env.region,
                                },
                            },
                        }],
                    }),
                ),
            );
        }
    }

    fn handlers(&self, topology: &Topology, net: &NetworkRefs, template: &mut Template) {
        for handler in &topology.handlers {
            let function = id_of(&handler.id);
            let bucket = format!("{function}AssetS3Bucket");
            let key = format!("{function}AssetS3Key");
            for (param, what) in [(&bucket, "bucket"), (&key, "object key")] {
                template.parameters.insert(
                    param.clone(),
                    json!({
                        "Type": "String",
                        "Description": format!("S3 {what} for asset \"{}\"", handler.entry),
                    }),
                );
            }

            let group = logical_id(&[handler.id.as_str(), "security-group"]);
            template.add(
                group.clone(),
                Resource::new(
                    "AWS::EC2::SecurityGroup",
                    json!({
                        "GroupDescription": format!("{}/{}", topology.stack_name, handler.function_name),
                        "VpcId": reference(&net.vpc),
                        "SecurityGroupEgress": [{
                            "CidrIp": "0.0.0.0/0",
                            "Description": "Allow all outbound traffic by default",
                            "IpProtocol": "-1",
                        }],
                    }),
                ),
            );
            template.add(
                function,
                Resource::new(
                    "AWS::Lambda::Function",
                    json!({
                        "FunctionName": handler.function_name,
                        "Handler": format!("index.{}", handler.handler),
                        "Runtime": handler.runtime,
                        "Timeout": handler.timeout_seconds,
                        "Code": { "S3Bucket": reference(&bucket), "S3Key": reference(&key) },
                        "VpcConfig": {
                            "SubnetIds": net.private_subnets,
                            "SecurityGroupIds": [get_att(&group, "GroupId")],
                        },
                    }),
                ),
            );
        }
    }

    fn target(&self, index: usize, target: &RuleTarget, net: &NetworkRefs) -> Value {
        let id = format!("Target{index}");
        match target {
            RuleTarget::InvokeHandler { handler } => json!({
                "Id": id,
                "Arn": get_att(&id_of(handler), "Arn"),
            }),
            RuleTarget::RunTask {
                cluster,
                task,
                count,
            } => json!({
                "Id": id,
                "Arn": get_att(&id_of(cluster), "Arn"),
                "EcsParameters": {
                    "TaskDefinitionArn": reference(&id_of(task)),
                    "TaskCount": count,
                    "LaunchType": "FARGATE",
                    "NetworkConfiguration": {
                        "AwsVpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "Subnets": net.private_subnets,
                        },
                    },
                },
            }),
        }
    }

    fn rules(&self, topology: &Topology, net: &NetworkRefs, template: &mut Template) {
        for rule in &topology.schedules {
            let mut props = json!({
                "ScheduleExpression": rule.schedule.expression(),
                "State": "ENABLED",
                "Targets": [self.target(0, &rule.target, net)],
            });
            if let Some(name) = &rule.name {
                props["Name"] = json!(name);
            }
            template.add(id_of(&rule.id), Resource::new("AWS::Events::Rule", props));
        }

        for rule in &topology.event_rules {
            let Some(predicate) = topology.predicate(&rule.predicate) else {
                continue;
            };
            let pattern = EventPattern::for_predicate(
                predicate,
                get_att(&id_of(&predicate.cluster), "Arn"),
            );
            let targets: Vec<Value> = rule
                .targets
                .iter()
                .enumerate()
                .map(|(i, t)| self.target(i, t, net))
                .collect();
            let mut props = json!({
                "EventPattern": pattern.as_value(),
                "State": "ENABLED",
                "Targets": targets,
            });
            if let Some(name) = &rule.name {
                props["Name"] = json!(name);
            }
            template.add(id_of(&rule.id), Resource::new("AWS::Events::Rule", props));
        }
    }

    fn outputs(&self, topology: &Topology, template: &mut Template) {
        for cluster in &topology.clusters {
            let logical = id_of(&cluster.id);
            template.outputs.insert(
                format!("{logical}Arn"),
                json!({
                    "Description": format!("ARN of cluster {}", cluster.name),
                    "Value": get_att(&logical, "Arn"),
                }),
            );
        }
        for handler in &topology.handlers {
            let logical = id_of(&handler.id);
            template.outputs.insert(
                format!("{logical}Name"),
                json!({
                    "Description": "Debug handler function name",
                    "Value": reference(&logical),
                }),
            );
        }
    }
}

impl Synthesizer for CloudFormation {
    fn synthesize(&self, topology: &Topology) -> Result<Template> {
        topology.validate()?;
        let mut template = Template::empty();
        template.description = topology.description.clone();

        let net = self.network(topology, &mut template)?;
        for cluster in &topology.clusters {
            template.add(
                id_of(&cluster.id),
                Resource::new(
                    "AWS::ECS::Cluster",
                    json!({ "ClusterName": cluster.name }),
                ),
            );
        }
        self.tasks(topology, &mut template);
        self.handlers(topology, &net, &mut template);
        self.rules(topology, &net, &mut template);
        self.outputs(topology, &mut template);

        tracing::debug!(
            stack = %topology.stack_name,
            resources = template.resources.len(),
            "synthesized template"
        );
        Ok(template)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn synth() -> Template {
        let topology = Topology::example().unwrap();
        CloudFormation::new(Environment::from_config(&Config::default()))
            .synthesize(&topology)
            .unwrap()
    }

    fn count(t: &Template, ty: &str) -> usize {
        t.resources_of_type(ty).count()
    }

    #[test]
    fn logical_ids_are_stable_and_pascal_case() {
        let a = logical_id(&["ecs-task-a-cluster"]);
        assert!(a.starts_with("EcsTaskACluster"));
        assert_eq!(a.len(), "EcsTaskACluster".len() + 8);
        assert_eq!(a, logical_id(&["ecs-task-a-cluster"]));
        assert_ne!(a, logical_id(&["ecs-task-b-cluster"]));
    }

    #[test]
    fn synthesis_is_byte_identical_across_runs() {
        assert_eq!(
            synth().to_json_pretty().unwrap(),
            synth().to_json_pretty().unwrap()
        );
    }

    #[test]
    fn example_is_not_empty() {
        let t = synth();
        assert!(!t.resources.is_empty());
        assert_eq!(count(&t, "AWS::EC2::VPC"), 1);
        assert_eq!(count(&t, "AWS::EC2::Subnet"), 4);
        assert_eq!(count(&t, "AWS::EC2::NatGateway"), 2);
        assert_eq!(count(&t, "AWS::ECS::Cluster"), 2);
        assert_eq!(count(&t, "AWS::Logs::LogGroup"), 2);
        assert_eq!(count(&t, "AWS::ECS::TaskDefinition"), 2);
        assert_eq!(count(&t, "AWS::Lambda::Function"), 1);
        assert_eq!(count(&t, "AWS::Events::Rule"), 3);
    }

    #[test]
    fn task_definitions_use_fargate_and_awslogs() {
        let t = synth();
        let (_, task) = t
            .resources_of_type("AWS::ECS::TaskDefinition")
            .find(|(_, r)| r.properties["Family"] == "ecs-task-a-taskdef")
            .unwrap();
        let p = &task.properties;
        assert_eq!(p["Cpu"], "256");
        assert_eq!(p["Memory"], "1024");
        assert_eq!(p["RequiresCompatibilities"], json!(["FARGATE"]));
        let container = &p["ContainerDefinitions"][0];
        assert_eq!(container["Memory"], 256);
        assert_eq!(container["LogConfiguration"]["LogDriver"], "awslogs");
        assert_eq!(
            container["LogConfiguration"]["Options"]["awslogs-stream-prefix"],
            "ecs-task-a"
        );
    }

    #[test]
    fn log_groups_are_deleted_with_the_stack() {
        let t = synth();
        for (_, group) in t.resources_of_type("AWS::Logs::LogGroup") {
            assert_eq!(group.deletion_policy.as_deref(), Some("Delete"));
        }
    }

    #[test]
    fn event_rules_carry_identical_patterns() {
        let t = synth();
        let patterns: Vec<&Value> = t
            .resources_of_type("AWS::Events::Rule")
            .filter_map(|(_, r)| r.properties.get("EventPattern"))
            .collect();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0], patterns[1]);
        let cluster_a = id_of(&ResourceId::new("ecs-task-a-cluster").unwrap());
        assert_eq!(
            patterns[0]["detail"]["clusterArn"],
            json!([{ "Fn::GetAtt": [cluster_a, "Arn"] }])
        );
    }

    #[test]
    fn scheduled_rule_targets_upstream_task() {
        let t = synth();
        let (_, rule) = t
            .resources_of_type("AWS::Events::Rule")
            .find(|(_, r)| r.properties.get("ScheduleExpression").is_some())
            .unwrap();
        assert_eq!(rule.properties["ScheduleExpression"], "cron(*/10 * * * ? *)");
        let task_a = id_of(&ResourceId::new("ecs-task-a-taskdef").unwrap());
        assert_eq!(
            rule.properties["Targets"][0]["EcsParameters"]["TaskDefinitionArn"],
            json!({ "Ref": task_a })
        );
        let subnets = &rule.properties["Targets"][0]["EcsParameters"]["NetworkConfiguration"]
            ["AwsVpcConfiguration"]["Subnets"];
        assert_eq!(subnets.as_array().unwrap().len(), 2);
    }

    #[test]
    fn private_routes_point_at_same_zone_nat() {
        let t = synth();
        let routes: Vec<&Resource> = t
            .resources_of_type("AWS::EC2::Route")
            .map(|(_, r)| r)
            .filter(|r| r.properties.get("NatGatewayId").is_some())
            .collect();
        assert_eq!(routes.len(), 2);
        assert_ne!(
            routes[0].properties["NatGatewayId"],
            routes[1].properties["NatGatewayId"]
        );
    }

    #[test]
    fn handler_code_is_parameterized() {
        let t = synth();
        assert_eq!(t.parameters.len(), 2);
        let (_, f) = t.resources_of_type("AWS::Lambda::Function").next().unwrap();
        assert_eq!(f.properties["Handler"], "index.lambda_handler");
        assert_eq!(f.properties["Runtime"], "python3.8");
        assert_eq!(f.properties["Timeout"], 30);
        assert_eq!(f.properties["VpcConfig"]["SubnetIds"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn template_round_trips_through_json() {
        let t = synth();
        let parsed: Template = serde_json::from_str(&t.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, t);
    }
}
