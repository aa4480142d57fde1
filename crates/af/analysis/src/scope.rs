use std::collections::BTreeMap;

use af_types::{AfError, Node, NodeId, NodeType, ScopeEntry};

/// Every `scope_ref` on `node` must name an active (non-discharged) entry.
pub fn validate_scope(
    node: &Node,
    entries: &BTreeMap<NodeId, ScopeEntry>,
) -> Result<(), AfError> {
    for sref in &node.scope_refs {
        let id = NodeId::parse(sref)?;
        match entries.get(&id) {
            None => {
                return Err(AfError::NotFound(format!(
                    "scope entry for {sref} referenced by node {}",
                    node.id
                )))
            }
            Some(entry) if !entry.is_active() => {
                return Err(AfError::ScopeClosed(format!(
                    "node {} references discharged assumption {sref}",
                    node.id
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// A `local_assume` node may be finalized only once its entry is discharged.
pub fn validate_scope_closure(assume_node: &Node, entry: &ScopeEntry) -> Result<(), AfError> {
    if entry.is_active() {
        return Err(AfError::ScopeOpen(format!(
            "assumption {} is still open",
            assume_node.id
        )));
    }
    Ok(())
}

/// The collection must hold exactly as many `local_assume` nodes as
/// `local_discharge` nodes.
pub fn validate_scope_balance<'a>(
    nodes: impl IntoIterator<Item = &'a Node>,
) -> Result<(), AfError> {
    let mut assumes = 0;
    let mut discharges = 0;
    for node in nodes {
        match node.node_type {
            NodeType::LocalAssume => assumes += 1,
            NodeType::LocalDischarge => discharges += 1,
            _ => {}
        }
    }
    if assumes != discharges {
        return Err(AfError::ScopeUnbalanced {
            assumes,
            discharges,
        });
    }
    Ok(())
}
