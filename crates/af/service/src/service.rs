use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use af_analysis::{
    compute_taint, detect_jobs, propagate_with_events, validate_scope, validate_scope_closure,
    DependencyGraph, Job,
};
use af_hooks::{dispatch::DEFAULT_HOOK_TIMEOUT, HookEngine, HookPayload, HooksConfig};
use af_ledger::{FileLedger, Ledger};
use af_locks::{LockManager, MemoryLockManager};
use af_state::{replay_with_verify, State, StateCache};
use af_types::{
    id, AfError, AfEvent, Challenge, ChallengeFacet, ChallengeStatus, ClaimLock, Definition,
    EpistemicState, EventRecord, Lemma, Node, NodeId, NodeType, Severity, WorkflowState,
};

use crate::config::ServiceConfig;
use crate::paths::ProofPaths;
use crate::pending::{self, PendingDefRequest};

/// The coordination core. The only layer that mutates durable state.
///
/// Every write follows the same transaction shape: project the current
/// state, validate against the workflow/epistemic machines, build events,
/// CAS-append at the observed sequence, and retry the whole loop on
/// `SequenceMismatch` up to the configured budget. Lock state is mirrored
/// into an in-process lease table after the ledger has decided, and hooks
/// fire after the append without ever delaying the caller.
pub struct ProofService {
    ledger: Arc<dyn Ledger>,
    locks: MemoryLockManager,
    cache: StateCache,
    hooks: HookEngine,
    config: ServiceConfig,
    paths: Option<ProofPaths>,
}

impl std::fmt::Debug for ProofService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofService").finish_non_exhaustive()
    }
}

impl ProofService {
    /// Create the directory layout and the first two records: the proof
    /// header and the root node `1`. Refuses to run on a non-empty ledger.
    pub fn init(
        proof_dir: impl AsRef<Path>,
        conjecture: &str,
        author: &str,
    ) -> Result<Self, AfError> {
        if conjecture.trim().is_empty() {
            return Err(AfError::Validation("conjecture is empty".into()));
        }
        if author.trim().is_empty() {
            return Err(AfError::Validation("author is empty".into()));
        }
        let paths = ProofPaths::new(proof_dir.as_ref());
        paths.ensure_layout()?;
        let ledger: Arc<dyn Ledger> = Arc::new(FileLedger::open(&paths.ledger_dir)?);

        let service = Self::assemble(ledger, Some(paths), ServiceConfig::default())?;
        service.append_genesis(conjecture, author)?;
        Ok(service)
    }

    /// Open an existing proof directory.
    pub fn open(proof_dir: impl AsRef<Path>) -> Result<Self, AfError> {
        let paths = ProofPaths::new(proof_dir.as_ref());
        if !paths.is_initialized() {
            return Err(AfError::NotFound(format!(
                "proof directory {} (run init first)",
                paths.root().display()
            )));
        }
        let ledger: Arc<dyn Ledger> = Arc::new(FileLedger::open(&paths.ledger_dir)?);
        Self::assemble(ledger, Some(paths), ServiceConfig::default())
    }

    /// Initialize over an arbitrary ledger (tests, embedding). No hooks,
    /// no sidecar files.
    pub fn init_with_ledger(
        ledger: Arc<dyn Ledger>,
        conjecture: &str,
        author: &str,
        config: ServiceConfig,
    ) -> Result<Self, AfError> {
        let service = Self::assemble(ledger, None, config)?;
        service.append_genesis(conjecture, author)?;
        Ok(service)
    }

    /// Wrap an already-initialized ledger (tests, embedding).
    pub fn with_ledger(ledger: Arc<dyn Ledger>, config: ServiceConfig) -> Result<Self, AfError> {
        Self::assemble(ledger, None, config)
    }

    fn assemble(
        ledger: Arc<dyn Ledger>,
        paths: Option<ProofPaths>,
        config: ServiceConfig,
    ) -> Result<Self, AfError> {
        let hooks = match &paths {
            Some(p) => HookEngine::from_file(&p.hooks_file)?,
            None => HookEngine::new(HooksConfig::default(), DEFAULT_HOOK_TIMEOUT),
        };
        Ok(ProofService {
            ledger,
            locks: MemoryLockManager::new(),
            cache: StateCache::new(),
            hooks,
            config,
            paths,
        })
    }

    fn append_genesis(&self, conjecture: &str, author: &str) -> Result<(), AfError> {
        if self.ledger.count()? != 0 {
            return Err(AfError::Validation(
                "proof is already initialized: ledger is not empty".into(),
            ));
        }
        let now = Utc::now();
        let root = Node::new(
            NodeId::root(),
            NodeType::Claim,
            conjecture,
            "",
            BTreeSet::new(),
            vec![],
            now,
        )?;
        let events = vec![
            AfEvent::ProofInitialized {
                conjecture: conjecture.to_string(),
                author: author.to_string(),
                timestamp: now,
            },
            AfEvent::NodeCreated { node: root },
        ];
        self.ledger.append_if_sequence(events.clone(), 0)?;
        info!(author, "proof initialized");
        self.fire_hooks(&events);
        Ok(())
    }

    // ── Read surface ────────────────────────────────────────────────

    /// Current projected state.
    pub fn state(&self) -> Result<Arc<State>, AfError> {
        self.cache.current(self.ledger.as_ref())
    }

    pub fn node(&self, id: &NodeId) -> Result<Node, AfError> {
        Ok(self.state()?.node(id)?.clone())
    }

    /// Available work, classified per node.
    pub fn jobs(&self) -> Result<Vec<Job>, AfError> {
        let state = self.state()?;
        Ok(detect_jobs(&state.nodes, &state.challenges))
    }

    /// Every challenge, open or settled, in id order.
    pub fn challenges(&self) -> Result<Vec<Challenge>, AfError> {
        Ok(self.state()?.challenges.values().cloned().collect())
    }

    /// Every ledger record, in order.
    pub fn events(&self) -> Result<Vec<EventRecord>, AfError> {
        self.ledger.read_all()
    }

    /// The on-disk layout, when this service is directory-backed.
    pub fn paths(&self) -> Option<&ProofPaths> {
        self.paths.as_ref()
    }

    /// Replay with per-node content-hash verification.
    pub fn verify(&self) -> Result<State, AfError> {
        replay_with_verify(self.ledger.as_ref())
    }

    // ── Workflow axis ───────────────────────────────────────────────

    /// Claim a node for `agent` with the given lease duration.
    pub fn claim_node(
        &self,
        node_id: &NodeId,
        agent: &str,
        ttl: Duration,
    ) -> Result<ClaimLock, AfError> {
        if agent.trim().is_empty() {
            return Err(AfError::Validation("agent name is empty".into()));
        }
        // In-process fast path; the ledger stays authoritative below.
        if self.locks.is_locked(node_id)? {
            if let Some(holder) = self.locks.get(node_id)? {
                return Err(AfError::AlreadyLocked {
                    node: node_id.clone(),
                    owner: holder.owner,
                });
            }
        }
        let (_, lock) = self.transact(|state| {
            let node = state.node(node_id)?;
            if node.workflow_state != WorkflowState::Available {
                return Err(AfError::AlreadyLocked {
                    node: node_id.clone(),
                    owner: node.claimed_by.clone().unwrap_or_default(),
                });
            }
            let now = Utc::now();
            let lock = ClaimLock {
                node_id: node_id.clone(),
                owner: agent.to_string(),
                acquired_at: now,
                expires_at: now + ttl,
            };
            let events = vec![AfEvent::NodesClaimed {
                node_ids: vec![node_id.clone()],
                owner: agent.to_string(),
                expires_at: lock.expires_at,
                timestamp: now,
            }];
            Ok((events, lock))
        })?;
        self.locks.mirror(lock.clone());
        debug!(node = %node_id, agent, "node claimed");
        Ok(lock)
    }

    /// Claim several nodes for `agent` in one atomic batch: either every
    /// node is available and all become claimed in a single event, or
    /// nothing changes.
    pub fn claim_nodes(
        &self,
        node_ids: &[NodeId],
        agent: &str,
        ttl: Duration,
    ) -> Result<Vec<ClaimLock>, AfError> {
        if node_ids.is_empty() {
            return Err(AfError::Validation("no nodes to claim".into()));
        }
        if agent.trim().is_empty() {
            return Err(AfError::Validation("agent name is empty".into()));
        }
        let (_, locks) = self.transact(|state| {
            let now = Utc::now();
            let mut locks = Vec::with_capacity(node_ids.len());
            for node_id in node_ids {
                let node = state.node(node_id)?;
                if node.workflow_state != WorkflowState::Available {
                    return Err(AfError::AlreadyLocked {
                        node: node_id.clone(),
                        owner: node.claimed_by.clone().unwrap_or_default(),
                    });
                }
                locks.push(ClaimLock {
                    node_id: node_id.clone(),
                    owner: agent.to_string(),
                    acquired_at: now,
                    expires_at: now + ttl,
                });
            }
            let events = vec![AfEvent::NodesClaimed {
                node_ids: node_ids.to_vec(),
                owner: agent.to_string(),
                expires_at: now + ttl,
                timestamp: now,
            }];
            Ok((events, locks))
        })?;
        for lock in &locks {
            self.locks.mirror(lock.clone());
        }
        debug!(count = locks.len(), agent, "nodes claimed");
        Ok(locks)
    }

    /// Release several nodes claimed by `agent` in one atomic batch.
    pub fn release_nodes(&self, node_ids: &[NodeId], agent: &str) -> Result<(), AfError> {
        if node_ids.is_empty() {
            return Err(AfError::Validation("no nodes to release".into()));
        }
        self.transact(|state| {
            for node_id in node_ids {
                let node = state.node(node_id)?;
                match (&node.workflow_state, node.claimed_by.as_deref()) {
                    (WorkflowState::Available, _) => {
                        return Err(AfError::InvalidTransition(format!(
                            "node {node_id} is not claimed"
                        )))
                    }
                    (WorkflowState::Claimed, Some(owner)) if owner != agent => {
                        return Err(AfError::NotOwner {
                            node: node_id.clone(),
                            owner: owner.to_string(),
                            caller: agent.to_string(),
                        })
                    }
                    _ => {}
                }
            }
            Ok((
                vec![AfEvent::NodesReleased {
                    node_ids: node_ids.to_vec(),
                    timestamp: Utc::now(),
                }],
                (),
            ))
        })?;
        for node_id in node_ids {
            self.locks.unmirror(node_id);
        }
        debug!(count = node_ids.len(), agent, "nodes released");
        Ok(())
    }

    /// Release a node claimed by `agent`.
    pub fn release_node(&self, node_id: &NodeId, agent: &str) -> Result<(), AfError> {
        self.transact(|state| {
            let node = state.node(node_id)?;
            match (&node.workflow_state, node.claimed_by.as_deref()) {
                (WorkflowState::Available, _) => Err(AfError::InvalidTransition(format!(
                    "node {node_id} is not claimed"
                ))),
                (WorkflowState::Claimed, Some(owner)) if owner != agent => {
                    Err(AfError::NotOwner {
                        node: node_id.clone(),
                        owner: owner.to_string(),
                        caller: agent.to_string(),
                    })
                }
                _ => Ok((
                    vec![AfEvent::NodesReleased {
                        node_ids: vec![node_id.clone()],
                        timestamp: Utc::now(),
                    }],
                    (),
                )),
            }
        })?;
        self.locks.unmirror(node_id);
        debug!(node = %node_id, agent, "node released");
        Ok(())
    }

    /// Remove every expired lease, emitting one `LockReaped` per lease.
    pub fn reap_expired_locks(&self) -> Result<Vec<ClaimLock>, AfError> {
        let (_, reaped) = self.transact(|state| {
            let now = Utc::now();
            let expired: Vec<ClaimLock> = state
                .locks
                .values()
                .filter(|l| l.is_expired_at(now))
                .cloned()
                .collect();
            let events = expired
                .iter()
                .map(|l| AfEvent::LockReaped {
                    node_id: l.node_id.clone(),
                    owner: l.owner.clone(),
                    timestamp: now,
                })
                .collect();
            Ok((events, expired))
        })?;
        for lock in &reaped {
            self.locks.unmirror(&lock.node_id);
        }
        if !reaped.is_empty() {
            info!(count = reaped.len(), "expired leases reaped");
        }
        Ok(reaped)
    }

    // ── Tree growth ─────────────────────────────────────────────────

    /// Create a child node under a parent the caller has claimed.
    #[allow(clippy::too_many_arguments)]
    pub fn refine_node(
        &self,
        parent: &NodeId,
        owner: &str,
        child_id: &NodeId,
        node_type: NodeType,
        statement: &str,
        inference_tag: &str,
        dependencies: BTreeSet<NodeId>,
        scope_refs: Vec<String>,
    ) -> Result<Node, AfError> {
        if child_id.parent().as_ref() != Some(parent) {
            return Err(AfError::Validation(format!(
                "{child_id} is not a direct child of {parent}"
            )));
        }
        if child_id.depth() > self.config.max_depth {
            return Err(AfError::Validation(format!(
                "{child_id} exceeds the maximum depth of {}",
                self.config.max_depth
            )));
        }

        let (_, node) = self.transact(|state| {
            let parent_node = state.node(parent)?;
            match (&parent_node.workflow_state, parent_node.claimed_by.as_deref()) {
                (WorkflowState::Available, _) => {
                    return Err(AfError::InvalidTransition(format!(
                        "parent {parent} must be claimed before refinement"
                    )))
                }
                (WorkflowState::Claimed, Some(holder)) if holder != owner => {
                    return Err(AfError::NotOwner {
                        node: parent.clone(),
                        owner: holder.to_string(),
                        caller: owner.to_string(),
                    })
                }
                _ => {}
            }
            if state.nodes.contains_key(child_id) {
                return Err(AfError::Validation(format!(
                    "node {child_id} already exists"
                )));
            }
            if state.children_of(parent).len() >= self.config.max_children {
                return Err(AfError::Validation(format!(
                    "{parent} already has the maximum of {} children",
                    self.config.max_children
                )));
            }

            let mut graph = DependencyGraph::from_nodes(state.nodes.values());
            for dep in &dependencies {
                state.node(dep)?;
                if let Some(path) = graph.would_create_cycle(child_id, dep) {
                    return Err(AfError::Cycle { path });
                }
                graph.add_edge(child_id.clone(), dep.clone());
            }

            if node_type == NodeType::LocalDischarge && state.active_scopes().is_empty() {
                return Err(AfError::Validation(format!(
                    "{child_id} discharges but no assumption is open"
                )));
            }

            let node = Node::new(
                child_id.clone(),
                node_type,
                statement,
                inference_tag,
                dependencies.clone(),
                scope_refs.clone(),
                Utc::now(),
            )?;
            validate_scope(&node, &state.scopes)?;

            Ok((vec![AfEvent::NodeCreated { node: node.clone() }], node))
        })?;
        debug!(child = %child_id, parent = %parent, owner, "node refined");
        Ok(node)
    }

    // ── Epistemic axis ──────────────────────────────────────────────

    /// pending -> validated. Refused while an open critical challenge
    /// targets the node, and for a `local_assume` whose scope is open.
    pub fn accept_node(&self, node_id: &NodeId) -> Result<(), AfError> {
        self.transact(|state| {
            let node = state.node(node_id)?;
            require_pending(node, "accept")?;
            let open_critical = state.open_critical_count(node_id);
            if open_critical > 0 {
                return Err(AfError::BlockingChallenges {
                    node: node_id.clone(),
                    open_critical,
                });
            }
            if node.node_type == NodeType::LocalAssume {
                if let Some(entry) = state.scopes.get(node_id) {
                    validate_scope_closure(node, entry)?;
                }
            }
            let now = Utc::now();
            let base = AfEvent::NodeValidated {
                node_id: node_id.clone(),
                timestamp: now,
            };
            Ok((
                epistemic_events(state, node_id, EpistemicState::Validated, base, now),
                (),
            ))
        })?;
        info!(node = %node_id, "node accepted");
        Ok(())
    }

    /// pending -> admitted. The admitted node becomes self_admitted and
    /// every descendant whose taint changes gets a `TaintRecomputed`
    /// record in the same batch.
    pub fn admit_node(&self, node_id: &NodeId) -> Result<(), AfError> {
        self.terminal_transition(node_id, "admit", EpistemicState::Admitted, |node_id, timestamp| {
            AfEvent::NodeAdmitted { node_id, timestamp }
        })
    }

    /// pending -> refuted.
    pub fn refute_node(&self, node_id: &NodeId) -> Result<(), AfError> {
        self.terminal_transition(node_id, "refute", EpistemicState::Refuted, |node_id, timestamp| {
            AfEvent::NodeRefuted { node_id, timestamp }
        })
    }

    /// pending -> archived.
    pub fn archive_node(&self, node_id: &NodeId) -> Result<(), AfError> {
        self.terminal_transition(node_id, "archive", EpistemicState::Archived, |node_id, timestamp| {
            AfEvent::NodeArchived { node_id, timestamp }
        })
    }

    fn terminal_transition(
        &self,
        node_id: &NodeId,
        verb: &str,
        to: EpistemicState,
        make: impl Fn(NodeId, chrono::DateTime<Utc>) -> AfEvent,
    ) -> Result<(), AfError> {
        self.transact(|state| {
            let node = state.node(node_id)?;
            require_pending(node, verb)?;
            let now = Utc::now();
            let base = make(node_id.clone(), now);
            Ok((epistemic_events(state, node_id, to, base, now), ()))
        })?;
        info!(node = %node_id, verb, "epistemic transition");
        Ok(())
    }

    // ── Challenges ──────────────────────────────────────────────────

    /// Raise a challenge against a node; returns the generated id.
    pub fn raise_challenge(
        &self,
        node_id: &NodeId,
        facet: ChallengeFacet,
        reason: &str,
        severity: Severity,
        raised_by: Option<String>,
    ) -> Result<String, AfError> {
        if reason.trim().is_empty() {
            return Err(AfError::Validation("challenge reason is empty".into()));
        }
        let (_, id) = self.transact(|state| {
            state.node(node_id)?;
            let id = id::challenge_id();
            let events = vec![AfEvent::ChallengeRaised {
                id: id.clone(),
                node_id: node_id.clone(),
                facet,
                reason: reason.to_string(),
                severity,
                raised_by: raised_by.clone(),
                timestamp: Utc::now(),
            }];
            Ok((events, id))
        })?;
        info!(node = %node_id, challenge = %id, ?severity, "challenge raised");
        Ok(id)
    }

    pub fn resolve_challenge(&self, challenge_id: &str) -> Result<(), AfError> {
        self.close_challenge(challenge_id, ChallengeStatus::Resolved, |id, timestamp| {
            AfEvent::ChallengeResolved {
                challenge_id: id,
                timestamp,
            }
        })
    }

    pub fn withdraw_challenge(&self, challenge_id: &str) -> Result<(), AfError> {
        self.close_challenge(challenge_id, ChallengeStatus::Withdrawn, |id, timestamp| {
            AfEvent::ChallengeWithdrawn {
                challenge_id: id,
                timestamp,
            }
        })
    }

    fn close_challenge(
        &self,
        challenge_id: &str,
        to: ChallengeStatus,
        make: impl Fn(String, chrono::DateTime<Utc>) -> AfEvent,
    ) -> Result<(), AfError> {
        self.transact(|state| {
            let challenge = state.challenge(challenge_id)?;
            if !challenge.is_open() {
                return Err(AfError::InvalidTransition(format!(
                    "challenge {challenge_id} is {:?}, only open challenges transition",
                    challenge.status
                )));
            }
            Ok((vec![make(challenge_id.to_string(), Utc::now())], ()))
        })?;
        info!(challenge = %challenge_id, ?to, "challenge closed");
        Ok(())
    }

    // ── Artifacts ───────────────────────────────────────────────────

    /// Record a definition. Duplicate content is rejected before the
    /// ledger sees it (definitions are content-addressed).
    pub fn add_definition(&self, name: &str, statement: &str) -> Result<Definition, AfError> {
        let (_, def) = self.transact(|state| {
            let def = Definition::new(name, statement, Utc::now())?;
            if state.definitions.contains_key(&def.id) {
                return Err(AfError::Validation(format!(
                    "definition {name:?} already exists as {}",
                    def.id
                )));
            }
            Ok((vec![AfEvent::DefAdded { def: def.clone() }], def))
        })?;
        info!(def = %def.id, "definition added");
        Ok(def)
    }

    /// Extract a lemma from a source node. Ids are fresh per extraction.
    pub fn extract_lemma(&self, source_node: &NodeId, statement: &str) -> Result<Lemma, AfError> {
        let (_, lemma) = self.transact(|state| {
            state.node(source_node)?;
            let lemma = Lemma::new(statement, source_node.clone(), Utc::now())?;
            Ok((
                vec![AfEvent::LemmaExtracted {
                    lemma: lemma.clone(),
                }],
                lemma,
            ))
        })?;
        info!(lemma = %lemma.id, source = %source_node, "lemma extracted");
        Ok(lemma)
    }

    // ── Pending definitions (sidecar, not ledger) ───────────────────

    /// File a pending-definition request for external tooling.
    pub fn request_definition(
        &self,
        term: &str,
        context: &str,
        requested_by: Option<String>,
    ) -> Result<PendingDefRequest, AfError> {
        let paths = self.paths.as_ref().ok_or_else(|| {
            AfError::Validation("pending definitions need an on-disk proof directory".into())
        })?;
        let request = PendingDefRequest::new(term, context, requested_by)?;
        pending::write_request(paths, &request)?;
        Ok(request)
    }

    pub fn pending_definitions(&self) -> Result<Vec<PendingDefRequest>, AfError> {
        match &self.paths {
            Some(paths) => pending::list_requests(paths),
            None => Ok(Vec::new()),
        }
    }

    // ── Transaction engine ──────────────────────────────────────────

    /// One read-modify-append transaction. `build` sees the freshly
    /// projected state and returns the events to append (empty means a
    /// read-only verdict) plus the value to hand back. On a lost CAS race
    /// the whole closure re-runs against fresh state; when the retry
    /// budget is exhausted the caller gets `ConcurrentModification`.
    fn transact<T>(
        &self,
        mut build: impl FnMut(&State) -> Result<(Vec<AfEvent>, T), AfError>,
    ) -> Result<(u64, T), AfError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let state = self.cache.current(self.ledger.as_ref())?;
            let (events, value) = build(&state)?;
            if events.is_empty() {
                return Ok((state.latest_seq, value));
            }
            match self
                .ledger
                .append_if_sequence(events.clone(), state.latest_seq)
            {
                Ok(seq) => {
                    self.fire_hooks(&events);
                    return Ok((seq, value));
                }
                Err(AfError::SequenceMismatch { expected, actual }) => {
                    if attempts >= self.config.cas_attempts {
                        warn!(attempts, "cas retry budget exhausted");
                        return Err(AfError::ConcurrentModification { attempts });
                    }
                    debug!(expected, actual, attempts, "cas lost, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fire_hooks(&self, events: &[AfEvent]) {
        if self.hooks.is_empty() {
            return;
        }
        let now = Utc::now();
        for event in events {
            let mut payload = HookPayload::for_event(event, now);
            match event {
                AfEvent::ProofInitialized { author, .. } => {
                    payload = payload.with_detail("author", author.as_str());
                }
                AfEvent::NodesClaimed { owner, .. } => {
                    payload = payload.with_detail("owner", owner.as_str());
                }
                AfEvent::ChallengeRaised { severity, .. } => {
                    payload = payload.with_detail("severity", format!("{severity:?}"));
                }
                AfEvent::TaintRecomputed { new_taint, .. } => {
                    payload = payload.with_detail("taint", format!("{new_taint:?}"));
                }
                AfEvent::LockReaped { owner, .. } => {
                    payload = payload.with_detail("owner", owner.as_str());
                }
                _ => {}
            }
            self.hooks.fire(&payload);
        }
    }
}

fn require_pending(node: &Node, verb: &str) -> Result<(), AfError> {
    if node.epistemic_state != EpistemicState::Pending {
        return Err(AfError::InvalidTransition(format!(
            "cannot {verb} node {}: epistemic state is {:?} (terminal)",
            node.id, node.epistemic_state
        )));
    }
    Ok(())
}

/// The epistemic transition event followed by the taint recomputations it
/// causes: the node itself (against its current ancestors) and every
/// descendant whose taint changes, all in one batch. Taint flows only
/// downward, so propagating from the transitioned node is sufficient.
fn epistemic_events(
    state: &State,
    node_id: &NodeId,
    to: EpistemicState,
    base: AfEvent,
    now: chrono::DateTime<Utc>,
) -> Vec<AfEvent> {
    let mut events = vec![base];

    let mut nodes = state.nodes.clone();
    if let Some(n) = nodes.get_mut(node_id) {
        n.epistemic_state = to;
    }
    let before = nodes[node_id].taint_state;
    let ancestor_ids = node_id.ancestors();
    let ancestors: Vec<&Node> = ancestor_ids.iter().filter_map(|a| nodes.get(a)).collect();
    let own = compute_taint(&nodes[node_id], &ancestors);
    if own != before {
        if let Some(n) = nodes.get_mut(node_id) {
            n.taint_state = own;
        }
        events.push(AfEvent::TaintRecomputed {
            node_id: node_id.clone(),
            new_taint: own,
            timestamp: now,
        });
    }
    let (_, taint_events) = propagate_with_events(node_id, &mut nodes, now);
    events.extend(taint_events);
    events
}
