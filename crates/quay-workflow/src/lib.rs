//! Quay Workflow
//!
//! This crate contains the structured workflow types that travel inside a
//! dispatch. A workflow is never shipped as code: tasks name registered
//! behaviour through a [`TaskRef`] and wire their arguments with
//! [`Binding`]s, so the whole graph is plain data that any executor can
//! rebuild.
//!
//! A [`DispatchPayload`] bundles the workflow with its inputs and metadata.
//! [`DispatchPayload::validate`] checks the structure before a dispatch is
//! accepted:
//! - Task IDs are unique and every edge points at a known task
//! - Output bindings reference upstream tasks
//! - Input bindings reference keys present in the payload inputs
//! - The graph is acyclic and has at least one entry point

mod error;
mod graph;
mod payload;
mod task;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use payload::{DispatchMetadata, DispatchPayload};
pub use task::{Binding, TaskDef, TaskRef};
pub use workflow::{Edge, WorkflowDef};
