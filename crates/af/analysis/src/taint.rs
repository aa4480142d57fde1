use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use af_types::{AfEvent, EpistemicState, Node, NodeId, TaintState};

/// Compute a node's taint from its epistemic state and the taints of its
/// tree ancestors. Ancestor order does not affect the result.
///
/// Rules, applied in order:
/// 1. pending node                         -> unresolved
/// 2. any ancestor unresolved              -> unresolved
/// 3. node admitted                        -> self_admitted
/// 4. any ancestor tainted / self_admitted -> tainted
/// 5. otherwise                            -> clean
pub fn compute_taint(node: &Node, ancestors: &[&Node]) -> TaintState {
    if node.epistemic_state == EpistemicState::Pending {
        return TaintState::Unresolved;
    }
    if ancestors
        .iter()
        .any(|a| a.taint_state == TaintState::Unresolved)
    {
        return TaintState::Unresolved;
    }
    if node.epistemic_state == EpistemicState::Admitted {
        return TaintState::SelfAdmitted;
    }
    if ancestors.iter().any(|a| {
        matches!(
            a.taint_state,
            TaintState::Tainted | TaintState::SelfAdmitted
        )
    }) {
        return TaintState::Tainted;
    }
    TaintState::Clean
}

/// Recompute taint for every strict descendant of `root`, writing results
/// back into `nodes`, and return the ids whose taint changed. `root` itself
/// is recomputed first (so descendants see its fresh taint) but is never
/// part of the returned list.
///
/// Descendants are processed in order of increasing depth; because each
/// node's result depends only on already-updated ancestors, one pass is
/// idempotent and convergent.
pub fn propagate(root: &NodeId, nodes: &mut BTreeMap<NodeId, Node>) -> Vec<NodeId> {
    recompute_in_place(root, nodes);

    let mut descendants: Vec<NodeId> = nodes
        .keys()
        .filter(|id| root.is_ancestor_of(id))
        .cloned()
        .collect();
    descendants.sort_by_key(|id| id.depth());

    let mut changed = Vec::new();
    for id in descendants {
        if recompute_in_place(&id, nodes) {
            changed.push(id);
        }
    }
    changed
}

/// `propagate`, additionally building one `TaintRecomputed` event per
/// changed descendant.
pub fn propagate_with_events(
    root: &NodeId,
    nodes: &mut BTreeMap<NodeId, Node>,
    timestamp: DateTime<Utc>,
) -> (Vec<NodeId>, Vec<AfEvent>) {
    let changed = propagate(root, nodes);
    let events = changed
        .iter()
        .map(|id| AfEvent::TaintRecomputed {
            node_id: id.clone(),
            new_taint: nodes[id].taint_state,
            timestamp,
        })
        .collect();
    (changed, events)
}

/// Recompute one node against the current map; true iff its taint changed.
fn recompute_in_place(id: &NodeId, nodes: &mut BTreeMap<NodeId, Node>) -> bool {
    let Some(node) = nodes.get(id) else {
        return false;
    };
    let ancestor_ids = id.ancestors();
    let ancestors: Vec<&Node> = ancestor_ids.iter().filter_map(|a| nodes.get(a)).collect();
    let fresh = compute_taint(node, &ancestors);
    if fresh != node.taint_state {
        if let Some(node) = nodes.get_mut(id) {
            node.taint_state = fresh;
        }
        true
    } else {
        false
    }
}
