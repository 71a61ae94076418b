//! Locate nodes inside a [`WorkflowGraph`] by semantic identifier.
//!
//! Both lookups are linear scans returning the first match in graph order.
//! Templates are expected to use unique titles for addressable slots; that
//! convention belongs to the template author and is not enforced here.

use crate::workflow::WorkflowGraph;

/// Find the first node whose display name equals `title` exactly.
pub fn find_by_title(graph: &WorkflowGraph, title: &str) -> Option<String> {
    graph
        .iter()
        .find(|(_, node)| node.display_name() == Some(title))
        .map(|(id, _)| id.to_string())
}

/// Find the first node whose declared kind (`class_type`) equals `kind`.
///
/// Used for slots whose title varies between templates, such as the
/// sampler whose seed must be refreshed.
pub fn find_by_kind(graph: &WorkflowGraph, kind: &str) -> Option<String> {
    graph
        .iter()
        .find(|(_, node)| node.kind == kind)
        .map(|(id, _)| id.to_string())
}
