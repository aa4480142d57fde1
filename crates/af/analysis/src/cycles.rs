use std::collections::{BTreeMap, BTreeSet};

use af_types::{AfError, Node, NodeId};

/// Directed graph over logical dependencies (`node -> its dependencies`),
/// distinct from the parent/child tree.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from the current node map.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph
                .edges
                .insert(node.id.clone(), node.dependencies.clone());
        }
        graph
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().insert(to);
    }

    /// Depth-first search from `from`; fails with the offending path when a
    /// node already on the recursion stack is revisited.
    pub fn check_cycles(&self, from: &NodeId) -> Result<(), AfError> {
        let mut stack = Vec::new();
        let mut on_stack = BTreeSet::new();
        let mut visited = BTreeSet::new();
        self.dfs(from, &mut stack, &mut on_stack, &mut visited)
    }

    /// Would adding the edge `from -> to` close a cycle?
    ///
    /// Self-reference is always a cycle. A `from` absent from the graph has
    /// no incoming edges, so nothing can loop back to it. Returns the cycle
    /// path when one exists.
    pub fn would_create_cycle(&self, from: &NodeId, to: &NodeId) -> Option<Vec<NodeId>> {
        if from == to {
            return Some(vec![from.clone(), to.clone()]);
        }
        // The new edge closes a cycle iff a dependency path to -> ... -> from
        // already exists.
        let mut path = vec![from.clone()];
        if self.find_path(to, from, &mut path, &mut BTreeSet::new()) {
            path.push(from.clone());
            Some(path)
        } else {
            None
        }
    }

    fn dfs(
        &self,
        node: &NodeId,
        stack: &mut Vec<NodeId>,
        on_stack: &mut BTreeSet<NodeId>,
        visited: &mut BTreeSet<NodeId>,
    ) -> Result<(), AfError> {
        if on_stack.contains(node) {
            let start = stack.iter().position(|n| n == node).unwrap_or(0);
            let mut path: Vec<NodeId> = stack[start..].to_vec();
            path.push(node.clone());
            return Err(AfError::Cycle { path });
        }
        if visited.contains(node) {
            return Ok(());
        }

        stack.push(node.clone());
        on_stack.insert(node.clone());
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.dfs(dep, stack, on_stack, visited)?;
            }
        }
        on_stack.remove(node);
        stack.pop();
        visited.insert(node.clone());
        Ok(())
    }

    /// DFS from `current` toward `target`, accumulating the path.
    fn find_path(
        &self,
        current: &NodeId,
        target: &NodeId,
        path: &mut Vec<NodeId>,
        visited: &mut BTreeSet<NodeId>,
    ) -> bool {
        if !visited.insert(current.clone()) {
            return false;
        }
        path.push(current.clone());
        if let Some(deps) = self.edges.get(current) {
            for dep in deps {
                if dep == target {
                    return true;
                }
                if self.find_path(dep, target, path, visited) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        s.parse().unwrap()
    }

    fn chain() -> DependencyGraph {
        // 1.2 depends on 1.1, 1.3 depends on 1.2
        let mut g = DependencyGraph::new();
        g.add_edge(id("1.2"), id("1.1"));
        g.add_edge(id("1.3"), id("1.2"));
        g
    }

    #[test]
    fn acyclic_chain_passes() {
        let g = chain();
        for n in ["1.1", "1.2", "1.3"] {
            g.check_cycles(&id(n)).unwrap();
        }
    }

    #[test]
    fn self_reference_is_always_a_cycle() {
        let g = DependencyGraph::new();
        let path = g.would_create_cycle(&id("1.1"), &id("1.1")).unwrap();
        assert_eq!(path, vec![id("1.1"), id("1.1")]);
    }

    #[test]
    fn closing_edge_reports_full_path() {
        let g = chain();
        let path = g.would_create_cycle(&id("1.1"), &id("1.3")).unwrap();
        for n in ["1.1", "1.2", "1.3"] {
            assert!(path.contains(&id(n)), "path {path:?} should contain {n}");
        }
        assert_eq!(path.first(), Some(&id("1.1")));
        assert_eq!(path.last(), Some(&id("1.1")));
    }

    #[test]
    fn non_closing_edge_is_fine() {
        let g = chain();
        assert!(g.would_create_cycle(&id("1.3"), &id("1.1")).is_none());
        assert!(g.would_create_cycle(&id("1.1"), &id("1.4")).is_none());
    }

    #[test]
    fn absent_source_has_no_incoming_edges() {
        let g = chain();
        assert!(g.would_create_cycle(&id("1.9"), &id("1.1")).is_none());
        g.check_cycles(&id("1.9")).unwrap();
    }

    #[test]
    fn existing_cycle_is_detected_with_path() {
        let mut g = chain();
        g.add_edge(id("1.1"), id("1.3"));
        let err = g.check_cycles(&id("1.1")).unwrap_err();
        match err {
            AfError::Cycle { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn from_nodes_uses_dependency_sets() {
        use af_types::NodeType;
        use chrono::Utc;
        use std::collections::BTreeSet;

        let mut deps = BTreeSet::new();
        deps.insert(id("1.1"));
        let node = Node::new(
            id("1.2"),
            NodeType::Claim,
            "uses 1.1",
            "",
            deps,
            vec![],
            Utc::now(),
        )
        .unwrap();
        let g = DependencyGraph::from_nodes([&node]);
        assert!(g.would_create_cycle(&id("1.1"), &id("1.2")).is_some());
    }
}
