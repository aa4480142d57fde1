use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};

use af_analysis::JobKind;
use af_hooks::{HookSink, HooksConfig};
use af_service::ProofService;
use af_types::{ChallengeFacet, NodeId, NodeType, Severity};

#[derive(Parser)]
#[command(name = "af", about = "Agentfield: multi-agent proof coordination")]
#[command(version)]
struct Cli {
    /// Proof directory.
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new proof directory with a root conjecture
    Init {
        conjecture: String,
        #[arg(long, default_value = "anonymous")]
        author: String,
    },

    /// Claim a node for exclusive refinement
    Claim {
        node: String,
        #[arg(long)]
        agent: String,
        /// Lease duration in minutes
        #[arg(long, default_value_t = 15)]
        ttl: i64,
    },

    /// Release a node you claimed
    Release {
        node: String,
        #[arg(long)]
        agent: String,
    },

    /// Create a child node under a claimed parent
    Refine {
        parent: String,
        child: String,
        #[arg(long)]
        agent: String,
        #[arg(long, default_value = "claim")]
        node_type: String,
        #[arg(long)]
        statement: String,
        #[arg(long, default_value = "")]
        inference: String,
        /// Logical dependency, repeatable
        #[arg(long = "dep")]
        deps: Vec<String>,
        /// Active assumption reference, repeatable
        #[arg(long = "scope-ref")]
        scope_refs: Vec<String>,
    },

    /// Mark a pending node validated
    Accept { node: String },
    /// Mark a pending node admitted (unproven; taints its subtree)
    Admit { node: String },
    /// Mark a pending node refuted
    Refute { node: String },
    /// Mark a pending node archived
    Archive { node: String },

    /// Challenge lifecycle
    Challenge {
        #[command(subcommand)]
        command: ChallengeCommands,
    },

    /// Lemma extraction and listing
    Lemma {
        #[command(subcommand)]
        command: LemmaCommands,
    },

    /// Definitions and pending-definition requests
    Def {
        #[command(subcommand)]
        command: DefCommands,
    },

    /// Manage event hooks
    Hook {
        #[command(subcommand)]
        command: HookCommands,
    },

    /// List challenges and their statuses
    Challenges,

    /// List available prover/verifier jobs
    Jobs,

    /// Render the proof tree with workflow/epistemic/taint markers
    Status,

    /// Dump the event log, one JSON record per line
    Log {
        /// Start from this sequence number
        #[arg(long, default_value_t = 1)]
        since: u64,
    },

    /// Human-readable summary of every ledger record
    Audit,

    /// Aggregate counts over the proof tree
    Stats,

    /// Replay with content-hash verification
    Verify,

    /// Remove expired leases
    Reap,
}

#[derive(Subcommand)]
enum ChallengeCommands {
    /// Raise a challenge against a node
    Raise {
        node: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "gap")]
        facet: String,
        #[arg(long, default_value = "normal")]
        severity: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Resolve an open challenge
    Resolve { id: String },
    /// Withdraw an open challenge
    Withdraw { id: String },
}

#[derive(Subcommand)]
enum LemmaCommands {
    /// Extract a lemma from a node
    Extract {
        node: String,
        #[arg(long)]
        statement: String,
    },
    /// List extracted lemmas
    List,
}

#[derive(Subcommand)]
enum HookCommands {
    /// Register a command hook (payload arrives as AF_* env vars)
    AddCommand {
        program: String,
        #[arg(long, default_value = "*")]
        event: String,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Register a webhook (payload arrives as a JSON POST)
    AddWebhook {
        url: String,
        #[arg(long, default_value = "*")]
        event: String,
    },
    /// Remove a hook by id
    Remove { id: String },
    /// List configured hooks
    List,
}

#[derive(Subcommand)]
enum DefCommands {
    /// Record a definition
    Add {
        name: String,
        #[arg(long)]
        statement: String,
    },
    /// File a pending-definition request for external tooling
    Request {
        term: String,
        #[arg(long, default_value = "")]
        context: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// List pending-definition requests
    Pending,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { conjecture, author } = &cli.command {
        ProofService::init(&cli.dir, conjecture, author)
            .with_context(|| format!("initializing {}", cli.dir.display()))?;
        println!("initialized proof in {}", cli.dir.display());
        return Ok(());
    }

    let svc = ProofService::open(&cli.dir)
        .with_context(|| format!("opening proof in {}", cli.dir.display()))?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Claim { node, agent, ttl } => {
            let lock = svc.claim_node(&parse_node(&node)?, &agent, Duration::minutes(ttl))?;
            println!("claimed {} for {} until {}", node, agent, lock.expires_at);
        }

        Commands::Release { node, agent } => {
            svc.release_node(&parse_node(&node)?, &agent)?;
            println!("released {node}");
        }

        Commands::Refine {
            parent,
            child,
            agent,
            node_type,
            statement,
            inference,
            deps,
            scope_refs,
        } => {
            let mut dep_ids = BTreeSet::new();
            for dep in &deps {
                dep_ids.insert(parse_node(dep)?);
            }
            let node = svc.refine_node(
                &parse_node(&parent)?,
                &agent,
                &parse_node(&child)?,
                node_type.parse::<NodeType>()?,
                &statement,
                &inference,
                dep_ids,
                scope_refs,
            )?;
            println!("created {} ({})", node.id, node.node_type);
        }

        Commands::Accept { node } => {
            svc.accept_node(&parse_node(&node)?)?;
            println!("accepted {node}");
        }
        Commands::Admit { node } => {
            svc.admit_node(&parse_node(&node)?)?;
            println!("admitted {node} (subtree taint recomputed)");
        }
        Commands::Refute { node } => {
            svc.refute_node(&parse_node(&node)?)?;
            println!("refuted {node}");
        }
        Commands::Archive { node } => {
            svc.archive_node(&parse_node(&node)?)?;
            println!("archived {node}");
        }

        Commands::Challenge { command } => match command {
            ChallengeCommands::Raise {
                node,
                reason,
                facet,
                severity,
                by,
            } => {
                let id = svc.raise_challenge(
                    &parse_node(&node)?,
                    parse_facet(&facet)?,
                    &reason,
                    parse_severity(&severity)?,
                    by,
                )?;
                println!("raised {id} on {node}");
            }
            ChallengeCommands::Resolve { id } => {
                svc.resolve_challenge(&id)?;
                println!("resolved {id}");
            }
            ChallengeCommands::Withdraw { id } => {
                svc.withdraw_challenge(&id)?;
                println!("withdrew {id}");
            }
        },

        Commands::Lemma { command } => match command {
            LemmaCommands::Extract { node, statement } => {
                let lemma = svc.extract_lemma(&parse_node(&node)?, &statement)?;
                println!("extracted {} from {}", lemma.id, node);
            }
            LemmaCommands::List => {
                let state = svc.state()?;
                for lemma in state.lemmas.values() {
                    println!("{}  (from {})  {}", lemma.id, lemma.source_node, lemma.statement);
                }
            }
        },

        Commands::Def { command } => match command {
            DefCommands::Add { name, statement } => {
                let def = svc.add_definition(&name, &statement)?;
                println!("added {} as {}", name, def.id);
            }
            DefCommands::Request { term, context, by } => {
                let request = svc.request_definition(&term, &context, by)?;
                println!("filed {} for {}", request.id, term);
            }
            DefCommands::Pending => {
                for request in svc.pending_definitions()? {
                    println!("{}  {}  {}", request.id, request.term, request.requested_at);
                }
            }
        },

        Commands::Hook { command } => {
            let paths = svc
                .paths()
                .context("hooks need a directory-backed proof")?;
            let mut config = HooksConfig::load(&paths.hooks_file)?;
            match command {
                HookCommands::AddCommand {
                    program,
                    event,
                    args,
                } => {
                    let hook = config.register(event, HookSink::Command { program, args });
                    println!("registered {}", hook.id);
                    config.save(&paths.hooks_file)?;
                }
                HookCommands::AddWebhook { url, event } => {
                    let hook = config.register(event, HookSink::Webhook { url });
                    println!("registered {}", hook.id);
                    config.save(&paths.hooks_file)?;
                }
                HookCommands::Remove { id } => {
                    if config.remove(&id) {
                        config.save(&paths.hooks_file)?;
                        println!("removed {id}");
                    } else {
                        bail!("no hook with id {id}");
                    }
                }
                HookCommands::List => {
                    for hook in &config.hooks {
                        let sink = match &hook.sink {
                            HookSink::Command { program, .. } => format!("command {program}"),
                            HookSink::Webhook { url } => format!("webhook {url}"),
                        };
                        println!("{}  on {}  -> {}", hook.id, hook.event, sink);
                    }
                }
            }
        }

        Commands::Challenges => {
            for challenge in svc.challenges()? {
                println!(
                    "{}  {:?}  {:?}  on {}  {}",
                    challenge.id,
                    challenge.status,
                    challenge.severity,
                    challenge.target_node,
                    challenge.reason
                );
            }
        }

        Commands::Jobs => {
            let jobs = svc.jobs()?;
            if jobs.is_empty() {
                println!("no jobs available");
            }
            for job in jobs {
                let kind = match job.kind {
                    JobKind::Prover => "prover  ",
                    JobKind::Verifier => "verifier",
                };
                println!("{kind}  {}  taint={:?}", job.node_id, job.taint);
            }
        }

        Commands::Status => {
            let state = svc.state()?;
            if let Some(meta) = &state.meta {
                println!("conjecture: {}", meta.conjecture);
                println!("author:     {}", meta.author);
                println!("seq:        {}", state.latest_seq);
                println!();
            }
            render_tree(&state);
        }

        Commands::Log { since } => {
            for record in svc.events()? {
                if record.seq >= since {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
        }

        Commands::Audit => {
            let records = svc.events()?;
            let index = af_state::AuditIndex::build(&records);
            for entry in &index.entries {
                println!("{:>5}  {:<20}  {}", entry.seq, entry.kind, entry.summary);
            }
        }

        Commands::Stats => {
            let state = svc.state()?;
            let stats = af_state::TreeStats::of(&state);
            println!("nodes:           {}", stats.total_nodes);
            println!("  pending:       {}", stats.pending);
            println!("  validated:     {}", stats.validated);
            println!("  admitted:      {}", stats.admitted);
            println!("  refuted:       {}", stats.refuted);
            println!("  archived:      {}", stats.archived);
            println!("claimed:         {}", stats.claimed);
            println!("tainted:         {}", stats.tainted);
            println!("open challenges: {}", stats.open_challenges);
            println!("active scopes:   {}", stats.active_scopes);
            println!("max depth:       {}", stats.max_depth);
            println!("settled:         {:.0}%", stats.settled_ratio() * 100.0);
        }

        Commands::Verify => {
            let state = svc.verify()?;
            println!(
                "ok: {} events, {} nodes, hashes verified",
                state.latest_seq,
                state.nodes.len()
            );
        }

        Commands::Reap => {
            let reaped = svc.reap_expired_locks()?;
            if reaped.is_empty() {
                println!("nothing to reap");
            }
            for lock in reaped {
                println!("reaped {} (was {})", lock.node_id, lock.owner);
            }
        }
    }
    Ok(())
}

fn parse_node(s: &str) -> Result<NodeId> {
    Ok(NodeId::parse(s)?)
}


fn parse_facet(s: &str) -> Result<ChallengeFacet> {
    Ok(match s {
        "statement" => ChallengeFacet::Statement,
        "inference" => ChallengeFacet::Inference,
        "gap" => ChallengeFacet::Gap,
        "scope" => ChallengeFacet::Scope,
        other => bail!("unknown challenge facet {other:?}"),
    })
}

fn parse_severity(s: &str) -> Result<Severity> {
    Ok(match s {
        "advisory" => Severity::Advisory,
        "normal" => Severity::Normal,
        "critical" => Severity::Critical,
        other => bail!("unknown severity {other:?}"),
    })
}

fn render_tree(state: &af_state::State) {
    for node in state.nodes.values() {
        let indent = "  ".repeat(node.id.depth().saturating_sub(1));
        let workflow = match node.workflow_state {
            af_types::WorkflowState::Available => ' ',
            af_types::WorkflowState::Claimed => '*',
        };
        let epistemic = match node.epistemic_state {
            af_types::EpistemicState::Pending => '?',
            af_types::EpistemicState::Validated => '+',
            af_types::EpistemicState::Admitted => '~',
            af_types::EpistemicState::Refuted => 'x',
            af_types::EpistemicState::Archived => '-',
        };
        let claim = node
            .claimed_by
            .as_deref()
            .map(|owner| format!(" [{owner}]"))
            .unwrap_or_default();
        println!(
            "{indent}{epistemic}{workflow} {}  {}  taint={:?}{claim}",
            node.id, node.statement, node.taint_state
        );
    }
}
