use crate::compile::ForbiddenEdgeSet;
use crate::solve::NodeId;

use super::concrete::SpecGraph;

/// Find cycles among binding (link or run) edges.
///
/// Tarjan's strongly connected components over the binding subgraph; each
/// nontrivial component (or self-loop) becomes one forbidden edge set the
/// engine can hand back to the solver. Build-only edges never participate.
pub fn binding_cycles(graph: &SpecGraph) -> Vec<ForbiddenEdgeSet> {
    let n = graph.nodes().len();
    let mut tarjan = Tarjan {
        graph,
        index: 0,
        indices: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for v in 0..n {
        if tarjan.indices[v].is_none() {
            tarjan.visit(v);
        }
    }

    let mut cycles = Vec::new();
    for component in tarjan.components {
        let in_component = |id: NodeId| component.contains(&(id as usize));
        let edges: Vec<(String, String)> = graph
            .edges()
            .iter()
            .filter(|e| e.deptypes.is_binding() && in_component(e.parent) && in_component(e.child))
            .filter_map(|e| {
                let parent = graph.node(e.parent)?;
                let child = graph.node(e.child)?;
                Some((parent.name.clone(), child.name.clone()))
            })
            .collect();
        if !edges.is_empty() {
            cycles.push(ForbiddenEdgeSet { edges });
        }
    }
    cycles
}

struct Tarjan<'a> {
    graph: &'a SpecGraph,
    index: usize,
    indices: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, v: usize) {
        self.indices[v] = Some(self.index);
        self.lowlink[v] = self.index;
        self.index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let successors: Vec<usize> = self
            .graph
            .dependencies_of(v as NodeId)
            .filter(|e| e.deptypes.is_binding())
            .map(|e| e.child as usize)
            .collect();
        for w in successors {
            match self.indices[w] {
                None => {
                    self.visit(w);
                    self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.lowlink[v] = self.lowlink[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        if self.lowlink[v] == self.indices[v].unwrap_or(0) {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            component.sort_unstable();
            if component.len() > 1 || self.has_self_loop(v) {
                self.components.push(component);
            }
        }
    }

    fn has_self_loop(&self, v: usize) -> bool {
        self.graph
            .dependencies_of(v as NodeId)
            .any(|e| e.deptypes.is_binding() && e.child as usize == v)
    }
}
