use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::task::TaskDef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
  pub from: String,
  pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub name: String,
  pub tasks: Vec<TaskDef>,
  #[serde(default)]
  pub edges: Vec<Edge>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
}

impl WorkflowDef {
  /// Get a task by ID.
  pub fn get_task(&self, task_id: &str) -> Option<&TaskDef> {
    self.tasks.iter().find(|t| t.task_id == task_id)
  }

  /// Build the graph structure for traversal.
  ///
  /// Explicit edges and the edges implied by output bindings are merged.
  /// Call [`WorkflowDef::validate`] first; the graph assumes every edge
  /// endpoint exists.
  pub fn graph(&self) -> Graph {
    let mut edges: Vec<(String, String)> = self
      .edges
      .iter()
      .map(|e| (e.from.clone(), e.to.clone()))
      .collect();

    for task in &self.tasks {
      for upstream in task.dependencies() {
        let edge = (upstream.to_string(), task.task_id.clone());
        if !edges.contains(&edge) {
          edges.push(edge);
        }
      }
    }

    Graph::new(&self.tasks, &edges)
  }

  /// Check the workflow structure.
  ///
  /// Input bindings are checked by [`crate::DispatchPayload::validate`],
  /// which knows the available inputs.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    if self.tasks.is_empty() {
      return Err(WorkflowError::Empty);
    }

    let mut ids = HashSet::new();
    for task in &self.tasks {
      if task.task_id.is_empty() {
        return Err(WorkflowError::EmptyTaskId);
      }
      if task.task.name.is_empty() {
        return Err(WorkflowError::EmptyTaskRef(task.task_id.clone()));
      }
      if !ids.insert(task.task_id.as_str()) {
        return Err(WorkflowError::DuplicateTask(task.task_id.clone()));
      }
    }

    for edge in &self.edges {
      if !ids.contains(edge.from.as_str()) || !ids.contains(edge.to.as_str()) {
        return Err(WorkflowError::InvalidEdge {
          from: edge.from.clone(),
          to: edge.to.clone(),
        });
      }
    }

    for task in &self.tasks {
      if let Some(upstream) = task.dependencies().find(|u| !ids.contains(u)) {
        return Err(WorkflowError::UnknownUpstream {
          task_id: task.task_id.clone(),
          upstream: upstream.to_string(),
        });
      }
    }

    let graph = self.graph();
    if graph.entry_points().is_empty() {
      return Err(WorkflowError::NoEntryPoints);
    }
    graph.topological_order()?;

    Ok(())
  }
}
