//! Action types for cloud resource management

use crate::reference::Attributes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents a planned action for a cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for the action
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource type (e.g., "redis-instance", "ssl-certificate")
    pub resource_type: String,

    /// Resource identifier
    pub resource_id: String,

    /// Description of the action
    pub description: String,

    /// Additional details about the action
    pub details: HashMap<String, serde_json::Value>,

    /// Desired resource body (references unresolved until apply)
    #[serde(default)]
    pub config: serde_json::Value,

    /// Dependency level; every action of wave N runs after wave N-1
    #[serde(default)]
    pub wave: usize,
}

impl Action {
    pub fn new(
        action_type: ActionType,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self {
            id: format!("{}-{}-{}", action_type, resource_type, resource_id),
            action_type,
            resource_type,
            resource_id,
            description: description.into(),
            details: HashMap::new(),
            config: serde_json::Value::Null,
            wave: 0,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn in_wave(mut self, wave: usize) -> Self {
        self.wave = wave;
        self
    }

    /// Resource key (`type:id`) this action operates on
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.resource_id)
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Delete and recreate a resource that cannot be updated in place
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl ActionType {
    pub fn symbol(&self) -> &'static str {
        match self {
            ActionType::Create => "+",
            ActionType::Update => "~",
            ActionType::Replace => "-/+",
            ActionType::Delete => "-",
            ActionType::NoOp => " ",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of applying actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Actions not attempted because an earlier wave failed
    pub skipped: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn add_success(&mut self, action: &Action, message: String, attributes: Attributes) {
        self.succeeded.push(ActionResult {
            action_id: action.id.clone(),
            resource_key: action.key(),
            action_type: action.action_type,
            success: true,
            message,
            error: None,
            attributes,
        });
    }

    pub fn add_failure(&mut self, action: &Action, error: String) {
        self.failed.push(ActionResult {
            action_id: action.id.clone(),
            resource_key: action.key(),
            action_type: action.action_type,
            success: false,
            message: String::new(),
            error: Some(error),
            attributes: Attributes::new(),
        });
    }

    pub fn add_skipped(&mut self, action: &Action) {
        self.skipped.push(action.id.clone());
    }
}

impl Default for ApplyResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// ID of the action
    pub action_id: String,

    /// Resource key (`type:id`)
    pub resource_key: String,

    pub action_type: ActionType,

    /// Whether the action succeeded
    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,

    /// Runtime attributes after the action
    #[serde(default)]
    pub attributes: Attributes,
}

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform, ordered by wave
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,

    /// Caveats the operator should read before applying
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn new(mut actions: Vec<Action>) -> Self {
        actions.sort_by_key(|a| a.wave);
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
            warnings: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Actions grouped by wave, in execution order
    pub fn waves(&self) -> Vec<Vec<&Action>> {
        let mut waves: Vec<Vec<&Action>> = Vec::new();
        for action in &self.actions {
            match waves.last_mut() {
                Some(current) if current[0].wave == action.wave => current.push(action),
                _ => waves.push(vec![action]),
            }
        }
        waves
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            replace: self.actions_by_type(ActionType::Replace).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_change
        )
    }
}
