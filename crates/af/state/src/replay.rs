use tracing::debug;

use af_ledger::LedgerReader;
use af_types::{
    AfError, AfEvent, ChallengeStatus, ClaimLock, EventRecord, NodeType, ScopeEntry,
    WorkflowState,
};

use crate::state::{ProofMeta, State};

/// Rebuild state by folding every ledger record in sequence order.
///
/// Deterministic: the result is a function of the ledger's bytes alone.
/// Any structural violation (sequence gap, duplicate creation, claim of a
/// missing or already-claimed node, bad challenge transition) halts with
/// `Corruption` rather than skipping the record.
pub fn replay(ledger: &dyn LedgerReader) -> Result<State, AfError> {
    let mut state = State::default();
    ledger.scan(&mut |record| apply_record(&mut state, record))?;
    debug!(latest_seq = state.latest_seq, nodes = state.nodes.len(), "replay complete");
    Ok(state)
}

/// Fold an already-materialized record slice (prefix replays in tests,
/// cache refreshes).
pub fn replay_records(records: &[EventRecord]) -> Result<State, AfError> {
    let mut state = State::default();
    for record in records {
        apply_record(&mut state, record)?;
    }
    Ok(state)
}

/// `replay`, then recompute and check every node's content hash.
pub fn replay_with_verify(ledger: &dyn LedgerReader) -> Result<State, AfError> {
    let state = replay(ledger)?;
    for node in state.nodes.values() {
        let recomputed = node.compute_content_hash();
        if recomputed != node.content_hash {
            return Err(AfError::Corruption(format!(
                "content hash mismatch for node {}: recorded {}, recomputed {}",
                node.id, node.content_hash, recomputed
            )));
        }
    }
    Ok(state)
}

/// Fold one record into `state`. The record's sequence must be exactly
/// `state.latest_seq + 1`; anything else is `Corruption`. Incremental
/// consumers apply only the suffix they have not yet seen.
pub fn apply_record(state: &mut State, record: &EventRecord) -> Result<(), AfError> {
    let expected = state.latest_seq + 1;
    if record.seq != expected {
        return Err(AfError::Corruption(format!(
            "sequence gap during replay: expected {expected}, found {}",
            record.seq
        )));
    }

    match &record.event {
        AfEvent::ProofInitialized {
            conjecture,
            author,
            timestamp,
        } => {
            if state.meta.is_some() {
                return Err(AfError::Corruption(
                    "proof initialized twice".into(),
                ));
            }
            state.meta = Some(ProofMeta {
                conjecture: conjecture.clone(),
                author: author.clone(),
                initialized_at: *timestamp,
            });
        }

        AfEvent::NodeCreated { node } => {
            if state.nodes.contains_key(&node.id) {
                return Err(AfError::Corruption(format!(
                    "node {} created twice",
                    node.id
                )));
            }
            match node.node_type {
                NodeType::LocalAssume => {
                    let entry = ScopeEntry::new(
                        node.id.clone(),
                        node.statement.clone(),
                        node.created_at,
                    )
                    .map_err(|e| AfError::Corruption(e.to_string()))?;
                    state.scopes.insert(node.id.clone(), entry);
                }
                NodeType::LocalDischarge => {
                    // A discharge closes the nearest (most recently opened)
                    // active assumption. With none active the node still
                    // lands in the tree; the service guards against it.
                    if let Some(open) = state
                        .scopes
                        .values_mut()
                        .filter(|s| s.is_active())
                        .max_by_key(|s| s.opened_at)
                    {
                        open.discharge(node.created_at)
                            .map_err(|e| AfError::Corruption(e.to_string()))?;
                    }
                }
                _ => {}
            }
            state.nodes.insert(node.id.clone(), node.clone());
        }

        AfEvent::NodesClaimed {
            node_ids,
            owner,
            expires_at,
            timestamp,
        } => {
            for id in node_ids {
                let node = state.nodes.get_mut(id).ok_or_else(|| {
                    AfError::Corruption(format!("claim of unknown node {id}"))
                })?;
                if node.workflow_state != WorkflowState::Available {
                    return Err(AfError::Corruption(format!(
                        "claim of node {id} which is not available"
                    )));
                }
                node.workflow_state = WorkflowState::Claimed;
                node.claimed_by = Some(owner.clone());
                node.claim_expires_at = Some(*expires_at);
                state.locks.insert(
                    id.clone(),
                    ClaimLock {
                        node_id: id.clone(),
                        owner: owner.clone(),
                        acquired_at: *timestamp,
                        expires_at: *expires_at,
                    },
                );
            }
        }

        AfEvent::NodesReleased { node_ids, .. } => {
            for id in node_ids {
                let node = state.nodes.get_mut(id).ok_or_else(|| {
                    AfError::Corruption(format!("release of unknown node {id}"))
                })?;
                node.workflow_state = WorkflowState::Available;
                node.claimed_by = None;
                node.claim_expires_at = None;
                state.locks.remove(id);
            }
        }

        AfEvent::NodeValidated { node_id, .. } => {
            set_epistemic(state, node_id, af_types::EpistemicState::Validated)?;
        }
        AfEvent::NodeAdmitted { node_id, .. } => {
            set_epistemic(state, node_id, af_types::EpistemicState::Admitted)?;
        }
        AfEvent::NodeRefuted { node_id, .. } => {
            set_epistemic(state, node_id, af_types::EpistemicState::Refuted)?;
        }
        AfEvent::NodeArchived { node_id, .. } => {
            set_epistemic(state, node_id, af_types::EpistemicState::Archived)?;
        }

        AfEvent::ChallengeRaised {
            id,
            node_id,
            facet,
            reason,
            severity,
            raised_by,
            timestamp,
        } => {
            if state.challenges.contains_key(id) {
                return Err(AfError::Corruption(format!(
                    "challenge {id} raised twice"
                )));
            }
            state.challenges.insert(
                id.clone(),
                af_types::Challenge {
                    id: id.clone(),
                    target_node: node_id.clone(),
                    facet: *facet,
                    reason: reason.clone(),
                    severity: *severity,
                    status: ChallengeStatus::Open,
                    raised_by: raised_by.clone(),
                    raised_at: *timestamp,
                },
            );
        }

        AfEvent::ChallengeResolved { challenge_id, .. } => {
            transition_challenge(state, challenge_id, ChallengeStatus::Resolved)?;
        }
        AfEvent::ChallengeWithdrawn { challenge_id, .. } => {
            transition_challenge(state, challenge_id, ChallengeStatus::Withdrawn)?;
        }

        AfEvent::DefAdded { def } => {
            if state.definitions.contains_key(&def.id) {
                return Err(AfError::Corruption(format!(
                    "definition {} added twice",
                    def.id
                )));
            }
            state.definitions.insert(def.id.clone(), def.clone());
        }

        AfEvent::LemmaExtracted { lemma } => {
            if state.lemmas.contains_key(&lemma.id) {
                return Err(AfError::Corruption(format!(
                    "lemma {} extracted twice",
                    lemma.id
                )));
            }
            state.lemmas.insert(lemma.id.clone(), lemma.clone());
        }

        AfEvent::TaintRecomputed {
            node_id, new_taint, ..
        } => {
            let node = state.nodes.get_mut(node_id).ok_or_else(|| {
                AfError::Corruption(format!("taint recomputed for unknown node {node_id}"))
            })?;
            node.taint_state = *new_taint;
        }

        AfEvent::LockReaped {
            node_id,
            owner,
            timestamp,
        } => {
            // Remove only if the table still holds the same owner's lock and
            // it had expired by the recorded reap time.
            let matches = state
                .locks
                .get(node_id)
                .map(|l| &l.owner == owner && l.expires_at <= *timestamp)
                .unwrap_or(false);
            if matches {
                state.locks.remove(node_id);
                if let Some(node) = state.nodes.get_mut(node_id) {
                    node.workflow_state = WorkflowState::Available;
                    node.claimed_by = None;
                    node.claim_expires_at = None;
                }
            }
        }
    }

    state.latest_seq = record.seq;
    Ok(())
}

fn set_epistemic(
    state: &mut State,
    node_id: &af_types::NodeId,
    to: af_types::EpistemicState,
) -> Result<(), AfError> {
    let node = state.nodes.get_mut(node_id).ok_or_else(|| {
        AfError::Corruption(format!("epistemic transition for unknown node {node_id}"))
    })?;
    node.epistemic_state = to;
    Ok(())
}

fn transition_challenge(
    state: &mut State,
    challenge_id: &str,
    to: ChallengeStatus,
) -> Result<(), AfError> {
    let challenge = state.challenges.get_mut(challenge_id).ok_or_else(|| {
        AfError::Corruption(format!("transition of unknown challenge {challenge_id}"))
    })?;
    challenge
        .transition(to)
        .map_err(|e| AfError::Corruption(e.to_string()))
}
