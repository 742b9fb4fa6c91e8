use std::collections::{HashMap, VecDeque};

use crate::error::WorkflowError;
use crate::task::TaskDef;

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Task IDs in declaration order.
  order: Vec<String>,
  /// Adjacency list: task_id -> list of downstream task_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: task_id -> list of upstream task_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Tasks with no incoming edges.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from tasks and edges.
  pub fn new(tasks: &[TaskDef], edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let order: Vec<String> = tasks.iter().map(|t| t.task_id.clone()).collect();

    for task_id in &order {
      adjacency.entry(task_id.clone()).or_default();
      reverse_adjacency.entry(task_id.clone()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    let entry_points: Vec<String> = order
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    Self {
      order,
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  /// Get entry points (tasks with no incoming edges).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get downstream tasks for a given task.
  pub fn downstream(&self, task_id: &str) -> &[String] {
    self
      .adjacency
      .get(task_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream tasks for a given task.
  pub fn upstream(&self, task_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(task_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Tasks in an order where every task follows all of its upstreams.
  ///
  /// Ties are broken by declaration order so the result is stable.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    let mut remaining: HashMap<&str, usize> = self
      .order
      .iter()
      .map(|id| (id.as_str(), self.upstream(id).len()))
      .collect();
    let mut ready: VecDeque<&str> = self.entry_points.iter().map(String::as_str).collect();
    let mut sorted = Vec::with_capacity(self.order.len());

    while let Some(task_id) = ready.pop_front() {
      sorted.push(task_id.to_string());
      for next in self.downstream(task_id) {
        if let Some(count) = remaining.get_mut(next.as_str()) {
          *count -= 1;
          if *count == 0 {
            ready.push_back(next);
          }
        }
      }
    }

    if sorted.len() < self.order.len() {
      let stuck = self
        .order
        .iter()
        .find(|id| remaining.get(id.as_str()).is_some_and(|c| *c > 0))
        .cloned()
        .unwrap_or_default();
      return Err(WorkflowError::Cycle(stuck));
    }

    Ok(sorted)
  }
}
