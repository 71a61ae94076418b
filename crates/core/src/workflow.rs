//! ComfyUI API-format workflow graphs.
//!
//! A workflow is a JSON object where each key is a node ID and each value
//! describes one node:
//!
//! ```json
//! {
//!   "3": {
//!     "class_type": "KSampler",
//!     "inputs": { "seed": 42, "model": ["1", 0] },
//!     "_meta": { "title": "sampler" }
//!   }
//! }
//! ```
//!
//! [`WorkflowTemplate`] is the immutable copy loaded once at startup.
//! [`WorkflowGraph::load`] hands each request its own deep copy, which is
//! the only thing ever mutated. No input field types are checked here:
//! the engine is the authority on node schemas.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Node descriptor
// ---------------------------------------------------------------------------

/// A single node in a workflow graph.
///
/// Attributes this crate does not model (anything besides `class_type`,
/// `inputs` and `_meta`) are kept in `extra` so a submitted graph carries
/// exactly what the template author wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Declared node type, e.g. `"LoadImage"` or `"KSampler"`.
    #[serde(rename = "class_type")]
    pub kind: String,
    /// Input fields. Arrays of the form `[node_id, slot]` are links to
    /// other nodes; everything else is a literal value.
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,
    #[serde(rename = "_meta", default, skip_serializing_if = "NodeMeta::is_empty")]
    pub meta: NodeMeta,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Editor metadata attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// Human-assigned label shown in the graph editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl NodeMeta {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.extra.is_empty()
    }
}

impl NodeDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            inputs: IndexMap::new(),
            meta: NodeMeta::default(),
            extra: IndexMap::new(),
        }
    }

    /// Builder-style helper setting the display name.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.meta.title = Some(title.into());
        self
    }

    /// Builder-style helper setting one input field.
    pub fn with_input(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(field.into(), value.into());
        self
    }

    /// The human-assigned display name, if any.
    pub fn display_name(&self) -> Option<&str> {
        self.meta.title.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// The immutable workflow loaded from disk at startup.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: WorkflowGraph,
}

impl WorkflowTemplate {
    /// Parse a template from API-format workflow JSON.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        Ok(Self {
            graph: WorkflowGraph::from_json(json)?,
        })
    }

    /// Read and parse a template file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::InvalidTemplate(format!("Failed to read {}: {e}", path.display()))
        })?;
        let json: Value = serde_json::from_str(&raw).map_err(|e| {
            CoreError::InvalidTemplate(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Number of nodes in the template.
    pub fn node_count(&self) -> usize {
        self.graph.len()
    }
}

impl From<WorkflowGraph> for WorkflowTemplate {
    fn from(graph: WorkflowGraph) -> Self {
        Self { graph }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// An ordered mapping from node ID to [`NodeDescriptor`].
///
/// Iteration order is the order of the source JSON, which is what
/// "first match" means for the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: IndexMap<String, NodeDescriptor>,
}

impl WorkflowGraph {
    /// Deep-copy a template into an independent graph for one request.
    pub fn load(template: &WorkflowTemplate) -> Self {
        template.graph.clone()
    }

    /// Parse API-format workflow JSON.
    ///
    /// The value must be a non-empty object and every node must carry a
    /// string `class_type`.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        let obj = json.as_object().ok_or_else(|| {
            CoreError::InvalidTemplate("Workflow JSON must be an object".to_string())
        })?;

        if obj.is_empty() {
            return Err(CoreError::InvalidTemplate(
                "Workflow JSON must contain at least one node".to_string(),
            ));
        }

        let mut nodes = IndexMap::with_capacity(obj.len());
        for (node_id, node_value) in obj {
            if !node_value.is_object() {
                return Err(CoreError::InvalidTemplate(format!(
                    "Node '{node_id}' must be an object"
                )));
            }
            if !node_value.get("class_type").is_some_and(Value::is_string) {
                return Err(CoreError::InvalidTemplate(format!(
                    "Node '{node_id}' is missing required 'class_type' field"
                )));
            }
            let node: NodeDescriptor = serde_json::from_value(node_value.clone()).map_err(|e| {
                CoreError::InvalidTemplate(format!("Node '{node_id}' is malformed: {e}"))
            })?;
            nodes.insert(node_id.clone(), node);
        }

        Ok(Self { nodes })
    }

    /// Serialize back into the API format the engine expects.
    pub fn to_json(&self) -> Value {
        let obj = self
            .nodes
            .iter()
            .map(|(id, node)| {
                let value = serde_json::to_value(node).unwrap_or(Value::Null);
                (id.clone(), value)
            })
            .collect();
        Value::Object(obj)
    }

    pub fn insert(&mut self, node_id: impl Into<String>, node: NodeDescriptor) {
        self.nodes.insert(node_id.into(), node);
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(node_id)
    }

    /// Read one input field of a node.
    pub fn input(&self, node_id: &str, field: &str) -> Option<&Value> {
        self.nodes.get(node_id)?.inputs.get(field)
    }

    /// Overwrite (or add) one input field of a node.
    pub fn set_input(
        &mut self,
        node_id: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), CoreError> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| CoreError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
        node.inputs.insert(field.to_string(), value.into());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeDescriptor)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromIterator<(String, NodeDescriptor)> for WorkflowGraph {
    fn from_iter<T: IntoIterator<Item = (String, NodeDescriptor)>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
