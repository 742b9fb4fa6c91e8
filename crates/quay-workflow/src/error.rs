use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
  #[error("workflow has no tasks")]
  Empty,

  #[error("task id must not be empty")]
  EmptyTaskId,

  #[error("task '{0}' does not reference any behaviour")]
  EmptyTaskRef(String),

  #[error("duplicate task id: {0}")]
  DuplicateTask(String),

  #[error("edge references unknown task: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("task '{task_id}' binds the output of unknown task '{upstream}'")]
  UnknownUpstream { task_id: String, upstream: String },

  #[error("task '{task_id}' binds missing workflow input '{input}'")]
  UnknownInput { task_id: String, input: String },

  #[error("workflow graph contains a cycle through task '{0}'")]
  Cycle(String),

  #[error("no entry points found (all tasks have incoming edges)")]
  NoEntryPoints,
}
