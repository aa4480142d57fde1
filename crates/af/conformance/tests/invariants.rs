//! The core invariants, one assertion per concern.

use std::sync::Arc;

use chrono::Duration;

use af_analysis::{compute_taint, detect_jobs};
use af_conformance::{fresh_service, grow_all, lease, node_id};
use af_ledger::{FileLedger, LedgerReader, LedgerWriter, MemoryLedger};
use af_locks::{FileLockManager, LockManager, MemoryLockManager, PersistentLockManager};
use af_service::{ProofService, ServiceConfig};
use af_state::{replay, replay_records};
use af_types::{AfError, ChallengeFacet, Node, Severity, WorkflowState};

/// Replay is a pure function of the ledger bytes: two replays of the same
/// records are structurally equal, and every prefix is itself a valid
/// state with a dense sequence.
#[test]
fn replay_is_pure_and_prefix_closed() {
    let svc = fresh_service("purity conjecture");
    grow_all(&svc, &[("1", "1.1"), ("1", "1.2"), ("1.1", "1.1.1")]);
    svc.admit_node(&node_id("1.1")).unwrap();
    svc.accept_node(&node_id("1.2")).unwrap();
    let challenge = svc
        .raise_challenge(
            &node_id("1.1.1"),
            ChallengeFacet::Gap,
            "needs detail",
            Severity::Normal,
            None,
        )
        .unwrap();
    svc.withdraw_challenge(&challenge).unwrap();

    let records = svc.events().unwrap();
    let once = replay_records(&records).unwrap();
    let twice = replay_records(&records).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once, *svc.state().unwrap());
    once.check_lock_consistency().unwrap();

    for cut in 0..=records.len() {
        let prefix = replay_records(&records[..cut]).unwrap();
        assert_eq!(prefix.latest_seq, cut as u64);
    }
}

/// For two concurrent mutations against the same precondition, at most one
/// lands; every loser observes a coherent error.
#[test]
fn concurrent_mutations_have_one_winner() {
    let svc = Arc::new(fresh_service("raced conjecture"));
    let mut handles = Vec::new();
    for i in 0..12 {
        let svc = Arc::clone(&svc);
        handles.push(std::thread::spawn(move || {
            svc.claim_node(&node_id("1"), &format!("racer-{i}"), lease())
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results {
        if let Err(e) = result {
            assert!(matches!(
                e,
                AfError::AlreadyLocked { .. } | AfError::ConcurrentModification { .. }
            ));
        }
    }
}

/// The same mutual exclusion holds at the raw CAS layer across two ledger
/// handles on one directory (two cooperating processes).
#[test]
fn cas_excludes_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger");
    let a = FileLedger::open(&path).unwrap();
    let b = FileLedger::open(&path).unwrap();

    let event = |n: &str| af_types::AfEvent::NodeValidated {
        node_id: node_id(n),
        timestamp: chrono::Utc::now(),
    };

    a.append_if_sequence(vec![event("1")], 0).unwrap();
    assert!(matches!(
        b.append_if_sequence(vec![event("1.1")], 0).unwrap_err(),
        AfError::SequenceMismatch { .. }
    ));
    b.append_if_sequence(vec![event("1.1")], 1).unwrap();
    assert_eq!(a.read_all().unwrap(), b.read_all().unwrap());
}

/// After any sequence of epistemic transitions, the projected taint of
/// every node is a fixpoint of the five-rule table against its current
/// ancestors.
#[test]
fn taint_is_a_fixpoint_of_the_rule_table() {
    let svc = fresh_service("fixpoint conjecture");
    grow_all(
        &svc,
        &[
            ("1", "1.1"),
            ("1", "1.2"),
            ("1.1", "1.1.1"),
            ("1.1", "1.1.2"),
            ("1.2", "1.2.1"),
        ],
    );
    svc.accept_node(&node_id("1")).unwrap();
    svc.admit_node(&node_id("1.1")).unwrap();
    svc.accept_node(&node_id("1.2")).unwrap();
    svc.accept_node(&node_id("1.1.1")).unwrap();
    svc.refute_node(&node_id("1.1.2")).unwrap();
    svc.archive_node(&node_id("1.2.1")).unwrap();

    let state = svc.state().unwrap();
    for node in state.nodes.values() {
        let ancestor_ids = node.id.ancestors();
        let ancestors: Vec<&Node> = ancestor_ids
            .iter()
            .filter_map(|a| state.nodes.get(a))
            .collect();
        assert_eq!(
            node.taint_state,
            compute_taint(node, &ancestors),
            "taint of {} is not a fixpoint",
            node.id
        );
    }
}

/// Every lock manager honors the same lease contract: live leases are
/// exclusive, expired leases are replaceable, reaping returns exactly the
/// expired set.
#[test]
fn lease_contract_is_uniform_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let file_mgr = FileLockManager::open(dir.path().join("locks")).unwrap();
    let mem_mgr = MemoryLockManager::new();
    let persistent = PersistentLockManager::open(Arc::new(MemoryLedger::new())).unwrap();

    let managers: Vec<&dyn LockManager> = vec![&mem_mgr, &file_mgr, &persistent];
    for mgr in managers {
        let node = node_id("1.3");
        mgr.acquire(&node, "a", Duration::milliseconds(20)).unwrap();
        assert!(matches!(
            mgr.acquire(&node, "b", lease()).unwrap_err(),
            AfError::AlreadyLocked { .. }
        ));
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert!(!mgr.is_locked(&node).unwrap());

        let lock = mgr.acquire(&node, "b", lease()).unwrap();
        assert_eq!(lock.owner, "b");
        assert!(matches!(
            mgr.release(&node, "a").unwrap_err(),
            AfError::NotOwner { .. }
        ));
        mgr.release(&node, "b").unwrap();
        assert!(mgr.reap_expired().unwrap().is_empty());
    }
}

/// Job classification depends only on a node's own epistemic/workflow
/// state and its direct challenges.
#[test]
fn job_classification_is_local() {
    let svc = fresh_service("local conjecture");
    grow_all(&svc, &[("1", "1.1"), ("1", "1.2")]);
    svc.raise_challenge(
        &node_id("1.1"),
        ChallengeFacet::Inference,
        "questionable step",
        Severity::Normal,
        None,
    )
    .unwrap();

    let state = svc.state().unwrap();
    let jobs = detect_jobs(&state.nodes, &state.challenges);

    // Recompute each verdict from purely local facts and compare.
    for job in &jobs {
        let open = state.open_challenges_for(&job.node_id).len();
        let node = state.node(&job.node_id).unwrap();
        let expected = af_analysis::jobs::classify(node, open).unwrap();
        assert_eq!(job.kind, expected);
    }
    assert_eq!(jobs.len(), 3);
}

mod epistemic_order_properties {
    use super::*;
    use proptest::prelude::*;

    const TREE: &[(&str, &str)] = &[
        ("1", "1.1"),
        ("1", "1.2"),
        ("1.1", "1.1.1"),
        ("1.1", "1.1.2"),
        ("1.2", "1.2.1"),
    ];
    const NODES: &[&str] = &["1", "1.1", "1.2", "1.1.1", "1.1.2", "1.2.1"];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Whatever order nodes are settled in, and whichever of them are
        /// admitted instead of accepted, the projected taint ends at the
        /// rule-table fixpoint and replay stays pure.
        #[test]
        fn settlement_order_never_breaks_taint(
            order in proptest::sample::subsequence(
                (0..NODES.len()).collect::<Vec<_>>(),
                0..=NODES.len(),
            ).prop_shuffle(),
            admit_mask in proptest::collection::vec(proptest::bool::ANY, NODES.len()),
        ) {
            let svc = fresh_service("property conjecture");
            grow_all(&svc, TREE);

            for index in order {
                let node = node_id(NODES[index]);
                if admit_mask[index] {
                    svc.admit_node(&node).unwrap();
                } else {
                    svc.accept_node(&node).unwrap();
                }
            }

            let state = svc.state().unwrap();
            for node in state.nodes.values() {
                let ancestor_ids = node.id.ancestors();
                let ancestors: Vec<&Node> = ancestor_ids
                    .iter()
                    .filter_map(|a| state.nodes.get(a))
                    .collect();
                prop_assert_eq!(node.taint_state, compute_taint(node, &ancestors));
            }

            let records = svc.events().unwrap();
            prop_assert_eq!(&replay_records(&records).unwrap(), state.as_ref());
        }
    }
}

/// Two services sharing one proof directory behave as cooperating
/// processes: claims made through one are visible and binding for the
/// other, and reaping frees them for everyone.
#[test]
fn shared_directory_cooperation() {
    let dir = tempfile::tempdir().unwrap();
    let proof_dir = dir.path().join("proof");

    let a = ProofService::init(&proof_dir, "shared conjecture", "author").unwrap();
    let b = ProofService::open(&proof_dir).unwrap();

    a.claim_node(&node_id("1"), "agent-a", Duration::milliseconds(40))
        .unwrap();
    let node = b.node(&node_id("1")).unwrap();
    assert_eq!(node.workflow_state, WorkflowState::Claimed);
    assert!(matches!(
        b.claim_node(&node_id("1"), "agent-b", lease()).unwrap_err(),
        AfError::AlreadyLocked { .. }
    ));

    std::thread::sleep(std::time::Duration::from_millis(50));
    let reaped = b.reap_expired_locks().unwrap();
    assert_eq!(reaped.len(), 1);
    b.claim_node(&node_id("1"), "agent-b", lease()).unwrap();

    // a sees b's claim on its next read, and the projected lock table
    // never contradicts the node records.
    assert_eq!(
        a.node(&node_id("1")).unwrap().claimed_by.as_deref(),
        Some("agent-b")
    );
    a.state().unwrap().check_lock_consistency().unwrap();
}

/// Writes from other handles advance the shared ledger; operations through
/// the original handle re-read the head and still land, and a storm of
/// mixed writers never corrupts sequence density.
#[test]
fn interleaved_writers_preserve_density() {
    let ledger = Arc::new(MemoryLedger::new());
    let svc = Arc::new(
        ProofService::init_with_ledger(
            ledger.clone(),
            "interleaved conjecture",
            "author",
            ServiceConfig::default(),
        )
        .unwrap(),
    );
    let competitor =
        Arc::new(ProofService::with_ledger(ledger.clone(), ServiceConfig::default()).unwrap());

    let mut handles = Vec::new();
    for i in 0..6 {
        let who = if i % 2 == 0 {
            Arc::clone(&svc)
        } else {
            Arc::clone(&competitor)
        };
        handles.push(std::thread::spawn(move || {
            who.raise_challenge(
                &node_id("1"),
                ChallengeFacet::Statement,
                &format!("objection {i}"),
                Severity::Advisory,
                None,
            )
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    svc.claim_node(&node_id("1"), "patient-agent", lease())
        .unwrap();
    assert_eq!(
        svc.node(&node_id("1")).unwrap().claimed_by.as_deref(),
        Some("patient-agent")
    );

    // Density: replaying from scratch must accept every record.
    let state = replay(ledger.as_ref()).unwrap();
    assert_eq!(state.challenges.len(), 6);
    assert_eq!(state.latest_seq, ledger.count().unwrap());
}
