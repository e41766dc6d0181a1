use crate::synth::{Resource, Template};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// ChangeKind / ResourceChange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Remove,
    Modify,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Add => "+",
            ChangeKind::Remove => "-",
            ChangeKind::Modify => "~",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub logical_id: String,
    pub resource_type: String,
    pub kind: ChangeKind,
    /// Top-level properties (and resource attributes) that differ.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
    /// The provider has to create a new physical resource.
    #[serde(default)]
    pub replacement: bool,
}

// ---------------------------------------------------------------------------
// TemplateDiff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDiff {
    pub resources: Vec<ResourceChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

impl TemplateDiff {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.parameters.is_empty() && self.outputs.is_empty()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.resources.iter().filter(|c| c.kind == kind).count()
    }

    pub fn replacements(&self) -> usize {
        self.resources.iter().filter(|c| c.replacement).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} to add, {} to change ({} replaced), {} to remove",
            self.count(ChangeKind::Add),
            self.count(ChangeKind::Modify),
            self.replacements(),
            self.count(ChangeKind::Remove)
        )
    }
}

/// Compare the deployed template `old` with the desired template `new`.
pub fn diff(old: &Template, new: &Template) -> TemplateDiff {
    let mut resources = Vec::new();

    for (id, before) in &old.resources {
        if !new.resources.contains_key(id) {
            resources.push(ResourceChange {
                logical_id: id.clone(),
                resource_type: before.resource_type.clone(),
                kind: ChangeKind::Remove,
                changed: Vec::new(),
                replacement: false,
            });
        }
    }

    for (id, after) in &new.resources {
        match old.resources.get(id) {
            None => resources.push(ResourceChange {
                logical_id: id.clone(),
                resource_type: after.resource_type.clone(),
                kind: ChangeKind::Add,
                changed: Vec::new(),
                replacement: false,
            }),
            Some(before) => {
                if let Some(change) = modified(id, before, after) {
                    resources.push(change);
                }
            }
        }
    }
    resources.sort_by(|a, b| a.logical_id.cmp(&b.logical_id));

    TemplateDiff {
        resources,
        parameters: changed_keys(&old.parameters, &new.parameters),
        outputs: changed_keys(&old.outputs, &new.outputs),
    }
}

fn modified(id: &str, before: &Resource, after: &Resource) -> Option<ResourceChange> {
    if before.resource_type != after.resource_type {
        return Some(ResourceChange {
            logical_id: id.to_string(),
            resource_type: after.resource_type.clone(),
            kind: ChangeKind::Modify,
            changed: vec!["Type".to_string()],
            replacement: true,
        });
    }

    let empty = serde_json::Map::new();
    let old_props = before.properties.as_object().unwrap_or(&empty);
    let new_props = after.properties.as_object().unwrap_or(&empty);
    let keys: BTreeSet<&String> = old_props.keys().chain(new_props.keys()).collect();
    let mut changed: Vec<String> = keys
        .into_iter()
        .filter(|k| old_props.get(*k) != new_props.get(*k))
        .cloned()
        .collect();

    if before.depends_on != after.depends_on {
        changed.push("DependsOn".to_string());
    }
    if before.deletion_policy != after.deletion_policy {
        changed.push("DeletionPolicy".to_string());
    }
    if before.update_replace_policy != after.update_replace_policy {
        changed.push("UpdateReplacePolicy".to_string());
    }
    if changed.is_empty() {
        return None;
    }

    let replacement = changed
        .iter()
        .any(|p| replaces(&after.resource_type, p));
    Some(ResourceChange {
        logical_id: id.to_string(),
        resource_type: after.resource_type.clone(),
        kind: ChangeKind::Modify,
        changed,
        replacement,
    })
}

/// Whether changing `property` forces the provider to replace the resource.
fn replaces(resource_type: &str, property: &str) -> bool {
    let immutable: &[&str] = match resource_type {
        // Task definitions are immutable revisions.
        "AWS::ECS::TaskDefinition" => {
            return !matches!(property, "DependsOn" | "DeletionPolicy" | "UpdateReplacePolicy")
        }
        "AWS::EC2::VPC" => &["CidrBlock", "InstanceTenancy"],
        "AWS::EC2::Subnet" => &["CidrBlock", "VpcId", "AvailabilityZone"],
        "AWS::EC2::RouteTable" => &["VpcId"],
        "AWS::EC2::Route" => &["RouteTableId", "DestinationCidrBlock"],
        "AWS::EC2::NatGateway" => &["SubnetId", "AllocationId"],
        "AWS::EC2::SecurityGroup" => &["GroupDescription", "VpcId"],
        "AWS::ECS::Cluster" => &["ClusterName"],
        "AWS::Logs::LogGroup" => &["LogGroupName"],
        "AWS::Lambda::Function" => &["FunctionName"],
        "AWS::Events::Rule" => &["Name"],
        _ => &[],
    };
    immutable.contains(&property)
}

fn changed_keys(old: &BTreeMap<String, Value>, new: &BTreeMap<String, Value>) -> Vec<String> {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter(|k| old.get(*k) != new.get(*k))
        .cloned()
        .collect()
}
