//! End-to-end scenarios over the full stack: ledger, projector, locks,
//! analyses, and the service transaction loop.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;

use af_analysis::JobKind;
use af_ledger::MemoryLedger;
use af_service::{ProofService, ServiceConfig};
use af_types::{
    AfError, ChallengeFacet, EpistemicState, NodeId, NodeType, Severity, TaintState,
};

fn id(s: &str) -> NodeId {
    s.parse().unwrap()
}

fn ttl() -> Duration {
    Duration::minutes(5)
}

fn service(conjecture: &str) -> ProofService {
    ProofService::init_with_ledger(
        Arc::new(MemoryLedger::new()),
        conjecture,
        "author",
        ServiceConfig::default(),
    )
    .unwrap()
}

fn refine(svc: &ProofService, parent: &str, child: &str, node_type: NodeType, statement: &str) {
    svc.refine_node(
        &id(parent),
        "prover",
        &id(child),
        node_type,
        statement,
        "",
        BTreeSet::new(),
        vec![],
    )
    .unwrap();
}

#[test]
fn simple_proof_runs_clean() {
    let svc = service("If n is even, then n+1 is odd");

    svc.claim_node(&id("1"), "prover", ttl()).unwrap();
    refine(&svc, "1", "1.1", NodeType::Claim, "n = 2k for some integer k");
    refine(&svc, "1", "1.2", NodeType::Claim, "n + 1 = 2k + 1, which is odd");
    svc.release_node(&id("1"), "prover").unwrap();

    svc.accept_node(&id("1.1")).unwrap();
    svc.accept_node(&id("1.2")).unwrap();
    svc.accept_node(&id("1")).unwrap();

    let state = svc.state().unwrap();
    assert_eq!(state.nodes.len(), 3);
    for node in state.nodes.values() {
        assert_eq!(node.epistemic_state, EpistemicState::Validated);
        assert_eq!(node.taint_state, TaintState::Clean);
    }
}

#[test]
fn claim_race_has_a_single_winner() {
    let svc = Arc::new(service("raced conjecture"));

    let mut handles = Vec::new();
    for i in 0..10 {
        let svc = Arc::clone(&svc);
        handles.push(std::thread::spawn(move || {
            svc.claim_node(&id("1"), &format!("agent-{i}"), ttl())
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(
                    e,
                    AfError::AlreadyLocked { .. } | AfError::ConcurrentModification { .. }
                ),
                "unexpected loser error: {e}"
            );
        }
    }

    let node = svc.node(&id("1")).unwrap();
    assert_eq!(node.claimed_by.as_deref(), Some(winners[0].owner.as_str()));
}

#[test]
fn lease_times_out_and_is_reclaimable() {
    let svc = service("timed conjecture");
    let lock = svc
        .claim_node(&id("1"), "prover", Duration::milliseconds(50))
        .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(60));
    assert!(lock.is_expired());

    let reaped = svc.reap_expired_locks().unwrap();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].node_id, id("1"));

    let fresh = svc.claim_node(&id("1"), "verifier", ttl()).unwrap();
    assert_eq!(fresh.owner, "verifier");
}

#[test]
fn challenge_round_trip_flips_job_kind() {
    let svc = service("challenged conjecture");

    let challenge = svc
        .raise_challenge(
            &id("1"),
            ChallengeFacet::Gap,
            "missing the zero case",
            Severity::Normal,
            Some("verifier-1".into()),
        )
        .unwrap();

    let jobs = svc.jobs().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, JobKind::Prover);

    svc.resolve_challenge(&challenge).unwrap();
    let jobs = svc.jobs().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, JobKind::Verifier);

    svc.accept_node(&id("1")).unwrap();
    assert_eq!(
        svc.node(&id("1")).unwrap().epistemic_state,
        EpistemicState::Validated
    );
    assert!(svc.jobs().unwrap().is_empty());
}

#[test]
fn taint_propagates_through_admitted_subtree() {
    let svc = service("tainted conjecture");

    svc.claim_node(&id("1"), "prover", ttl()).unwrap();
    refine(&svc, "1", "1.1", NodeType::Claim, "admitted branch");
    refine(&svc, "1", "1.2", NodeType::Claim, "proved branch");
    svc.release_node(&id("1"), "prover").unwrap();

    svc.claim_node(&id("1.1"), "prover", ttl()).unwrap();
    refine(&svc, "1.1", "1.1.1", NodeType::Claim, "below the admission");
    refine(&svc, "1.1", "1.1.2", NodeType::Claim, "also below");
    svc.release_node(&id("1.1"), "prover").unwrap();

    svc.claim_node(&id("1.2"), "prover", ttl()).unwrap();
    refine(&svc, "1.2", "1.2.1", NodeType::Claim, "clean leaf");
    svc.release_node(&id("1.2"), "prover").unwrap();

    svc.accept_node(&id("1")).unwrap();
    svc.admit_node(&id("1.1")).unwrap();
    svc.accept_node(&id("1.2")).unwrap();
    svc.accept_node(&id("1.1.1")).unwrap();
    svc.accept_node(&id("1.1.2")).unwrap();
    svc.accept_node(&id("1.2.1")).unwrap();

    let state = svc.state().unwrap();
    let taint = |s: &str| state.nodes[&id(s)].taint_state;
    assert_eq!(taint("1"), TaintState::Clean);
    assert_eq!(taint("1.1"), TaintState::SelfAdmitted);
    assert_eq!(taint("1.2"), TaintState::Clean);
    assert_eq!(taint("1.1.1"), TaintState::Tainted);
    assert_eq!(taint("1.1.2"), TaintState::Tainted);
    assert_eq!(taint("1.2.1"), TaintState::Clean);
}

#[test]
fn dependency_edit_would_close_a_cycle() {
    let svc = service("cyclic conjecture");

    svc.claim_node(&id("1"), "prover", ttl()).unwrap();
    refine(&svc, "1", "1.1", NodeType::Claim, "base");
    svc.refine_node(
        &id("1"),
        "prover",
        &id("1.2"),
        NodeType::Claim,
        "uses 1.1",
        "",
        [id("1.1")].into_iter().collect(),
        vec![],
    )
    .unwrap();
    svc.refine_node(
        &id("1"),
        "prover",
        &id("1.3"),
        NodeType::Claim,
        "uses 1.2",
        "",
        [id("1.2")].into_iter().collect(),
        vec![],
    )
    .unwrap();

    let state = svc.state().unwrap();
    let graph = af_analysis::DependencyGraph::from_nodes(state.nodes.values());
    let path = graph.would_create_cycle(&id("1.1"), &id("1.3")).unwrap();
    for n in ["1.1", "1.2", "1.3"] {
        assert!(path.contains(&id(n)), "path {path:?} missing {n}");
    }
    assert!(graph.would_create_cycle(&id("1.3"), &id("1.1")).is_none());
}

#[test]
fn replay_prefixes_agree_with_full_state() {
    let svc = service("prefix conjecture");
    svc.claim_node(&id("1"), "prover", ttl()).unwrap();
    refine(&svc, "1", "1.1", NodeType::Claim, "step");
    svc.release_node(&id("1"), "prover").unwrap();
    svc.accept_node(&id("1.1")).unwrap();

    let records = svc.events().unwrap();
    for cut in 0..=records.len() {
        let prefix = af_state::replay_records(&records[..cut]).unwrap();
        let expected_seq = if cut == 0 { 0 } else { records[cut - 1].seq };
        assert_eq!(prefix.latest_seq, expected_seq);
    }
    let full = af_state::replay_records(&records).unwrap();
    assert_eq!(full, *svc.state().unwrap());
}

#[test]
fn local_assumption_must_be_discharged_before_acceptance() {
    let svc = service("scoped conjecture");

    svc.claim_node(&id("1"), "prover", ttl()).unwrap();
    refine(&svc, "1", "1.1", NodeType::LocalAssume, "assume n is even");

    // Open scope: the assumption cannot be finalized.
    assert!(matches!(
        svc.accept_node(&id("1.1")).unwrap_err(),
        AfError::ScopeOpen(_)
    ));

    refine(&svc, "1", "1.2", NodeType::LocalDischarge, "discharge the assumption");
    svc.release_node(&id("1"), "prover").unwrap();

    svc.accept_node(&id("1.1")).unwrap();

    let state = svc.state().unwrap();
    af_analysis::validate_scope_balance(state.nodes.values().filter(|n| !n.id.is_root()))
        .unwrap();
}
