//! A prover and a verifier cooperating on one proof directory.
//!
//! Run with: `cargo run -p af-service --example two_agents`

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use chrono::Duration;

use af_service::ProofService;
use af_types::{ChallengeFacet, NodeId, NodeType, Severity};

fn id(s: &str) -> NodeId {
    s.parse().unwrap()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();

    let dir = tempfile::tempdir()?;
    let proof_dir = dir.path().join("proof");

    let prover = Arc::new(ProofService::init(
        &proof_dir,
        "If n is even, then n+1 is odd",
        "demo",
    )?);
    let verifier = Arc::new(ProofService::open(&proof_dir)?);

    // The prover claims the root and decomposes it.
    {
        let prover = Arc::clone(&prover);
        thread::spawn(move || {
            prover
                .claim_node(&id("1"), "prover-1", Duration::minutes(5))
                .unwrap();
            for (child, statement, tag) in [
                ("1.1", "n = 2k for some integer k", "unfold_even"),
                ("1.2", "n + 1 = 2k + 1, which is odd", "arithmetic"),
            ] {
                prover
                    .refine_node(
                        &id("1"),
                        "prover-1",
                        &id(child),
                        NodeType::Claim,
                        statement,
                        tag,
                        BTreeSet::new(),
                        vec![],
                    )
                    .unwrap();
            }
            prover.release_node(&id("1"), "prover-1").unwrap();
        })
        .join()
        .expect("prover thread");
    }

    // The verifier objects, the objection is answered, everything settles.
    let challenge = verifier.raise_challenge(
        &id("1.2"),
        ChallengeFacet::Inference,
        "why is 2k + 1 odd?",
        Severity::Normal,
        Some("verifier-1".into()),
    )?;
    println!("verifier raised {challenge}");
    for job in verifier.jobs()? {
        println!("job: {:?} on {}", job.kind, job.node_id);
    }

    verifier.resolve_challenge(&challenge)?;
    for node in ["1.1", "1.2", "1"] {
        verifier.accept_node(&id(node))?;
    }

    let state = verifier.state()?;
    println!("final state at seq {}:", state.latest_seq);
    for node in state.nodes.values() {
        println!(
            "  {}  {:?}  taint={:?}",
            node.id, node.epistemic_state, node.taint_state
        );
    }
    Ok(())
}
