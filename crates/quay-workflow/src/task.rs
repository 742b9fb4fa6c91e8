use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reference to behaviour registered with the executor.
///
/// Functions and closures are not portable across processes, so a task
/// carries the name the executor knows its implementation by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
  /// Registered name, e.g. "my-org/normalize"
  pub name: String,

  /// Optional version constraint, e.g. "1.0.0"
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

/// Where a task argument gets its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
  /// A constant value embedded in the workflow.
  Literal { value: serde_json::Value },
  /// A named workflow input from the dispatch payload.
  Input { name: String },
  /// The output of an upstream task, optionally a single key of it.
  Output {
    task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
  },
}

impl Binding {
  /// The upstream task this binding depends on, if any.
  pub fn upstream(&self) -> Option<&str> {
    match self {
      Binding::Output { task_id, .. } => Some(task_id),
      _ => None,
    }
  }
}

/// A single task in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  pub task_id: String,
  pub task: TaskRef,
  #[serde(default)]
  pub arguments: HashMap<String, Binding>,
  /// Executor the task should run on; falls back to the dispatch default.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl TaskDef {
  /// Upstream task IDs implied by this task's output bindings.
  pub fn dependencies(&self) -> impl Iterator<Item = &str> {
    self.arguments.values().filter_map(Binding::upstream)
  }
}
