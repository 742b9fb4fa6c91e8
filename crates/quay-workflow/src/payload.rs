use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::task::Binding;
use crate::workflow::WorkflowDef;

/// Dispatch-level settings that travel with the workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchMetadata {
  /// Default executor for tasks that do not name one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor: Option<String>,
  /// Where the client wants results staged.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub results_dir: Option<String>,
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub labels: HashMap<String, String>,
}

/// Everything a client submits as one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
  pub workflow: WorkflowDef,
  #[serde(default)]
  pub inputs: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  pub metadata: DispatchMetadata,
}

impl DispatchPayload {
  pub fn new(workflow: WorkflowDef) -> Self {
    Self {
      workflow,
      inputs: serde_json::Map::new(),
      metadata: DispatchMetadata::default(),
    }
  }

  /// Validate the workflow and its input bindings.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    self.workflow.validate()?;

    for task in &self.workflow.tasks {
      for binding in task.arguments.values() {
        if let Binding::Input { name } = binding
          && !self.inputs.contains_key(name)
        {
          return Err(WorkflowError::UnknownInput {
            task_id: task.task_id.clone(),
            input: name.clone(),
          });
        }
      }
    }

    Ok(())
  }
}
