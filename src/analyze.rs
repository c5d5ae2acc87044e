//! Workflow graph decoding and structural metrics.
//!
//! Artifacts in the wild are heterogeneous exports, so decoding is
//! permissive: every field is optional and a field of the wrong type is
//! treated as absent. Only bytes that are not a JSON object fail to parse.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Name used when a workflow has none.
pub const UNNAMED_WORKFLOW: &str = "Unnamed Workflow";

/// Type recorded for nodes without a `type` field.
pub const UNKNOWN_NODE_TYPE: &str = "unknown";

/// Node type fragments that mark a node as able to start a run.
const TRIGGER_MARKERS: &[&str] = &["trigger", "webhook", "cron", "interval"];

/// Returns true if the node type looks like a trigger.
///
/// Case-insensitive substring match on [`TRIGGER_MARKERS`]. Custom node
/// types can be misclassified either way; the rule is kept as-is so results
/// stay comparable with earlier reports.
pub fn is_trigger_type(node_type: &str) -> bool {
    let lower = node_type.to_lowercase();
    TRIGGER_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Treat a value of the wrong shape as missing.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Wire shape of a workflow export.
#[derive(Debug, Default, Deserialize)]
struct RawWorkflow {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    nodes: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    connections: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient")]
    tags: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    notes: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    description: Option<String>,
    #[serde(rename = "createdAt", default, deserialize_with = "lenient")]
    created_at: Option<String>,
    #[serde(rename = "updatedAt", default, deserialize_with = "lenient")]
    updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    active: Option<bool>,
}

/// One node of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Everything else on the node, kept opaque.
    pub parameters: Map<String, Value>,
}

impl Node {
    fn from_value(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = match fields.remove("id") {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let node_type = match fields.remove("type") {
            Some(Value::String(s)) => s,
            _ => UNKNOWN_NODE_TYPE.to_string(),
        };
        Self {
            id,
            node_type,
            parameters: fields,
        }
    }
}

/// Decoded node/connection structure of one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub name: String,
    /// Nodes in source order.
    pub nodes: Vec<Node>,
    /// Outgoing edges keyed by source node.
    ///
    /// n8n groups edges by output kind (`{"main": [[...]]}`); each output
    /// kind is one entry here, so counts match the `len()` of the source
    /// value.
    pub connections: BTreeMap<String, Vec<Value>>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub active: Option<bool>,
}

impl WorkflowGraph {
    /// Decode a workflow from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("expected a workflow object"));
        }
        let raw: RawWorkflow = serde_json::from_value(value)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawWorkflow) -> Self {
        let nodes = raw
            .nodes
            .unwrap_or_default()
            .into_iter()
            .map(Node::from_value)
            .collect();

        let connections = raw
            .connections
            .unwrap_or_default()
            .into_iter()
            .map(|(source, edges)| {
                let edges = match edges {
                    Value::Array(items) => items,
                    Value::Object(groups) => groups.into_iter().map(|(_, v)| v).collect(),
                    _ => Vec::new(),
                };
                (source, edges)
            })
            .collect();

        let mut tags: Vec<String> = Vec::new();
        for tag in raw.tags.unwrap_or_default() {
            let label = match tag {
                Value::String(s) => Some(s),
                // n8n exports tags as {"id": .., "name": ..}
                Value::Object(mut map) => match map.remove("name") {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                },
                _ => None,
            };
            if let Some(label) = label {
                if !tags.contains(&label) {
                    tags.push(label);
                }
            }
        }

        let description = raw
            .notes
            .filter(|n| !n.is_empty())
            .or(raw.description)
            .filter(|d| !d.is_empty());

        Self {
            name: raw.name.unwrap_or_else(|| UNNAMED_WORKFLOW.to_string()),
            nodes,
            connections,
            tags,
            description,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            active: raw.active,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.values().map(Vec::len).sum()
    }

    /// Derive the structural metrics in one pass over the nodes.
    pub fn analyze(&self) -> AnalysisResult {
        let mut node_types: Vec<String> = Vec::new();
        let mut has_trigger = false;

        for node in &self.nodes {
            if !node_types.contains(&node.node_type) {
                node_types.push(node.node_type.clone());
            }
            if !has_trigger && is_trigger_type(&node.node_type) {
                has_trigger = true;
            }
        }

        AnalysisResult {
            name: self.name.clone(),
            node_count: self.node_count(),
            connection_count: self.connection_count(),
            node_types,
            has_trigger,
            tags: self.tags.clone(),
            description: self.description.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            active: self.active,
        }
    }
}

/// Metrics derived from one workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub name: String,
    pub node_count: usize,
    pub connection_count: usize,
    /// Distinct node types in first-seen order.
    pub node_types: Vec<String>,
    pub has_trigger: bool,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub active: Option<bool>,
}

impl AnalysisResult {
    /// Space-joined distinct node types, lowercased, for substring search.
    pub fn node_types_text(&self) -> String {
        self.node_types.join(" ").to_lowercase()
    }

    pub fn has_custom_name(&self) -> bool {
        self.name != UNNAMED_WORKFLOW
    }
}

/// Decode raw bytes into a workflow graph.
pub fn parse_workflow(bytes: &[u8]) -> Result<WorkflowGraph, serde_json::Error> {
    WorkflowGraph::from_slice(bytes)
}

/// Decode raw bytes and derive their metrics.
pub fn analyze(bytes: &[u8]) -> Result<AnalysisResult, serde_json::Error> {
    Ok(parse_workflow(bytes)?.analyze())
}
