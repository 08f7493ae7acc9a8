use log::trace;

use crate::compile::Problem;
use crate::error::{ConcretizeError, Result};
use crate::solve::Assignment;

use super::concrete::{ConcreteSpec, GraphEdge, SpecGraph};

/// Rebuild a concrete graph from a flat solver assignment.
///
/// Validation is total: every input root must be matched by its solved
/// node, including its user-pinned dependency requests. A solver bug that
/// drops or weakens a request surfaces here as
/// `OutputDoesNotSatisfyInput`, never as a silently wrong graph.
pub fn reconstruct(assignment: &Assignment, problem: &Problem) -> Result<SpecGraph> {
    let mut unsolved = Vec::new();

    for (root_spec, node_id) in problem.roots.iter().zip(&assignment.roots) {
        let node = match assignment.node(*node_id) {
            Some(node) => node,
            None => {
                unsolved.push(root_spec.to_string());
                continue;
            }
        };
        if !root_spec.matches(&node.snapshot()) {
            unsolved.push(root_spec.to_string());
            continue;
        }
        // User-pinned dependencies of the root must appear as edges whose
        // child satisfies the pin.
        for dep in &root_spec.dependencies {
            let satisfied = assignment.edges_from(*node_id).any(|e| {
                assignment
                    .node(e.child)
                    .map(|child| {
                        let named = dep.spec.name.as_deref() == Some(child.name.as_str())
                            || dep
                                .spec
                                .name
                                .as_deref()
                                .map(|n| e.virtuals.contains(n))
                                .unwrap_or(false);
                        named && dep.spec.matches(&child.snapshot())
                    })
                    .unwrap_or(false)
            });
            if !satisfied {
                unsolved.push(root_spec.to_string());
                break;
            }
        }
    }

    if assignment.roots.len() < problem.roots.len() {
        for root_spec in problem.roots.iter().skip(assignment.roots.len()) {
            unsolved.push(root_spec.to_string());
        }
    }

    if !unsolved.is_empty() {
        return Err(ConcretizeError::OutputDoesNotSatisfyInput { unsolved });
    }

    let nodes: Vec<ConcreteSpec> = assignment
        .nodes
        .iter()
        .map(|n| ConcreteSpec {
            id: n.id,
            name: n.name.clone(),
            namespace: n.namespace.clone(),
            version: n.version.clone(),
            variants: n.variants.clone(),
            arch: n.arch.clone(),
            external: n.external.clone(),
            reused: n.reused,
            deprecated: n.deprecated,
        })
        .collect();

    let edges: Vec<GraphEdge> = assignment
        .edges
        .iter()
        .map(|e| GraphEdge {
            parent: e.parent,
            child: e.child,
            deptypes: e.deptypes,
            virtuals: e.virtuals.clone(),
        })
        .collect();

    trace!(
        "reconstructed graph: {} nodes, {} edges",
        nodes.len(),
        edges.len()
    );
    Ok(SpecGraph::new(nodes, edges, assignment.roots.clone()))
}
