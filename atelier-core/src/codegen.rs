//! Boundary types for the code-generation and deployment collaborators.
//!
//! Both collaborators are opaque to the synchronization core: a request
//! goes out, a structured success-or-failure result comes back. Their
//! faults are never allowed to cross the boundary as raw errors; the
//! service façade in `atelier-collab` translates them into the response
//! types defined here.

use serde::{Deserialize, Serialize};

use crate::canvas::CanvasState;

/// Target format for generated infrastructure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Terraform,
    Cloudformation,
}

/// Request to turn a canvas into infrastructure-as-code text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeGenRequest {
    pub canvas: CanvasState,
    /// Free-text requirements accompanying the canvas
    #[serde(default)]
    pub requirements: String,
    pub target: TargetFormat,
}

/// Result of a code-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeGenResponse {
    pub success: bool,
    #[serde(default)]
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CodeGenResponse {
    pub fn ok(code: impl Into<String>) -> Self {
        Self {
            success: true,
            code: code.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            code: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Request to provision previously generated code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub code: String,
    /// When false, the executor stops after producing a plan
    #[serde(default)]
    pub auto_approve: bool,
}

/// What a deployment executor reports back on success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployOutcome {
    /// Plan description when the run stopped before applying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Output values produced by an applied run
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

/// Result of a deployment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeployResponse {
    pub fn ok(outcome: DeployOutcome) -> Self {
        Self {
            success: true,
            plan: outcome.plan,
            outputs: outcome.outputs,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            plan: None,
            outputs: serde_json::Map::new(),
            error: Some(error.into()),
        }
    }
}
