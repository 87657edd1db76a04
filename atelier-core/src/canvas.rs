//! The shared design canvas: a graph of typed infrastructure resources
//! and the links between them.
//!
//! A canvas is mutated wholesale: every update replaces the entire
//! [`CanvasState`] for a session, and the last writer to reach the store
//! wins. There is no field-level merge and no version clock; concurrent
//! writers cannot detect staleness.

use serde::{Deserialize, Serialize};

/// The closed set of resource kinds a canvas may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    NetworkBoundary,
    ComputeInstance,
    RelationalDb,
    LoadBalancer,
    InMemoryCache,
    ObjectStore,
    ServerlessFunction,
    ApiGateway,
}

/// One resource node on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier, unique within one canvas
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub name: String,
    /// Canvas position
    pub x: f64,
    pub y: f64,
    /// Free-form configuration properties
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub notes: String,
}

/// A directed link between two resources on the canvas.
///
/// Endpoints are resource ids. The core does not verify that they refer
/// to resources present in the same canvas; that validation is left to
/// the editing surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub from_resource: String,
    pub to_resource: String,
    #[serde(default = "default_link_kind")]
    pub link_kind: String,
}

fn default_link_kind() -> String {
    "default".to_string()
}

impl ResourceLink {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_resource: from.into(),
            to_resource: to.into(),
            link_kind: default_link_kind(),
        }
    }
}

/// Complete state of one session's canvas.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasState {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub connections: Vec<ResourceLink>,
    #[serde(default)]
    pub user_prompt: String,
    /// Milliseconds since the Unix epoch of the last accepted write
    #[serde(default)]
    pub last_updated: u64,
}

impl CanvasState {
    /// Whether this is the freshly-initialized empty state.
    ///
    /// Used on join: an empty canvas is not replayed as a snapshot.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.connections.is_empty() && self.user_prompt.is_empty()
    }
}
