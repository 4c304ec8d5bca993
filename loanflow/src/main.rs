//! Loan-origination workflow CLI.
//!
//! Inspects the status graph offline and runs workflow operations against the
//! configured record store on behalf of an explicit actor identity.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};

use loanflow::core::policy::WorkflowPolicy;
use loanflow::core::thread::QueryThread;
use loanflow::core::transitions::{allowed_next_statuses, validate_transition};
use loanflow::core::types::{Actor, QueryStatus};
use loanflow::core::validation::{FieldDescriptor, ValidationVerdict};
use loanflow::error::WorkflowError;
use loanflow::exit_codes;
use loanflow::io::config::{DEFAULT_CONFIG_PATH, LoanflowConfig, load_config, write_config};
use loanflow::io::forms::{FileFormResolver, FormConfigResolver, StoreFormResolver};
use loanflow::io::http_store::HttpRecordStore;
use loanflow::logging;
use loanflow::status::LenderDecision;
use loanflow::submit::SubmitOutcome;
use loanflow::workflow::{StatusChange, Workflow};

#[derive(Parser)]
#[command(name = "loanflow", version, about = "Loan-origination workflow engine")]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Who is performing the operation.
#[derive(Args)]
struct Identity {
    /// Actor identity written to the audit log (usually an email).
    #[arg(long)]
    actor: String,
    /// Actor role (client, kam, credit, nbfc, admin; aliases accepted).
    #[arg(long)]
    role: String,
    /// Owning client id; required for the client role.
    #[arg(long)]
    client: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the statuses a role may move an application to.
    Transitions {
        #[arg(long)]
        from: String,
        #[arg(long)]
        role: String,
    },
    /// Exit 0 if the transition is permitted, otherwise print why and fail.
    CheckTransition {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        role: String,
    },
    /// Submit a draft application for KAM review.
    Submit {
        application_id: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Open a query thread on an application.
    RaiseQuery {
        application_id: String,
        #[arg(long)]
        message: String,
        /// Addressee; defaults to the role being queried.
        #[arg(long)]
        target: Option<String>,
        #[command(flatten)]
        identity: Identity,
    },
    /// Reply under an existing query entry.
    Reply {
        application_id: String,
        #[arg(long)]
        parent: String,
        #[arg(long)]
        message: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Mark a query entry resolved.
    ResolveQuery {
        entry_id: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Mark a query entry open again.
    ReopenQuery {
        entry_id: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Move an application to another status.
    SetStatus {
        application_id: String,
        status: String,
        #[arg(long)]
        remarks: Option<String>,
        #[command(flatten)]
        identity: Identity,
    },
    /// Record a lender's decision on an application sent to it.
    LenderDecision {
        application_id: String,
        #[arg(long, value_enum)]
        decision: DecisionArg,
        /// Approved amount; only used with `--decision approved`.
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        remarks: Option<String>,
        #[command(flatten)]
        identity: Identity,
    },
    /// Print the query threads of an application.
    Threads {
        application_id: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a config file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Approved,
    Rejected,
    Negotiation,
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<WorkflowError>() {
        Some(WorkflowError::Forbidden { .. }) => exit_codes::FORBIDDEN,
        Some(WorkflowError::Incomplete { .. }) => exit_codes::INCOMPLETE,
        Some(WorkflowError::PartialWrite { .. }) => exit_codes::PARTIAL_WRITE,
        _ => exit_codes::INVALID,
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let policy = WorkflowPolicy::standard();
    match cli.command {
        Command::Transitions { from, role } => {
            let from = policy.normalize_status(&from)?;
            let role = policy.normalize_role(&role)?;
            for status in allowed_next_statuses(&policy, from, role) {
                println!("{status}");
            }
            Ok(exit_codes::OK)
        }
        Command::CheckTransition { from, to, role } => {
            let from = policy.normalize_status(&from)?;
            let to = policy.normalize_status(&to)?;
            let role = policy.normalize_role(&role)?;
            validate_transition(&policy, from, to, role)?;
            println!("{role} may move {from} -> {to}");
            Ok(exit_codes::OK)
        }
        Command::Config {
            command: ConfigCommand::Init { force },
        } => cmd_config_init(&cli.config, force),
        command => {
            let config = load_config(&cli.config)?;
            let workflow = connect(&config, policy)?;
            run_workflow_command(&workflow, command).await
        }
    }
}

fn cmd_config_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &LoanflowConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

async fn run_workflow_command(
    workflow: &Workflow<HttpRecordStore, Forms>,
    command: Command,
) -> Result<i32> {
    match command {
        Command::Submit {
            application_id,
            identity,
        } => {
            let actor = identity.resolve(workflow.policy())?;
            match workflow.submit_application(&actor, &application_id).await? {
                SubmitOutcome::Submitted {
                    application,
                    audit_entry_id,
                } => {
                    println!(
                        "{} submitted: {} (audit entry {audit_entry_id})",
                        application.display_id(),
                        application.status
                    );
                    Ok(exit_codes::OK)
                }
                SubmitOutcome::Incomplete(verdict) => {
                    print_missing(&verdict);
                    Ok(exit_codes::INCOMPLETE)
                }
            }
        }
        Command::RaiseQuery {
            application_id,
            message,
            target,
            identity,
        } => {
            let actor = identity.resolve(workflow.policy())?;
            let posted = workflow
                .raise_query(&actor, &application_id, &message, target.as_deref())
                .await?;
            println!("query {} raised", posted.entry_id);
            if let Some((from, to)) = posted.status_change {
                println!("status {from} -> {to}");
            }
            Ok(exit_codes::OK)
        }
        Command::Reply {
            application_id,
            parent,
            message,
            identity,
        } => {
            let actor = identity.resolve(workflow.policy())?;
            let posted = workflow
                .respond_to_query(&actor, &application_id, &parent, &message)
                .await?;
            println!(
                "reply {} posted under {}",
                posted.entry_id,
                posted.parent_id.as_deref().unwrap_or(&parent)
            );
            if let Some((from, to)) = posted.status_change {
                println!("status {from} -> {to}");
            }
            Ok(exit_codes::OK)
        }
        Command::ResolveQuery { entry_id, identity } => {
            let actor = identity.resolve(workflow.policy())?;
            let entry = workflow
                .set_query_status(&actor, &entry_id, QueryStatus::Resolved)
                .await?;
            println!("query {} {}", entry.id, entry.content.status);
            Ok(exit_codes::OK)
        }
        Command::ReopenQuery { entry_id, identity } => {
            let actor = identity.resolve(workflow.policy())?;
            let entry = workflow
                .set_query_status(&actor, &entry_id, QueryStatus::Open)
                .await?;
            println!("query {} {}", entry.id, entry.content.status);
            Ok(exit_codes::OK)
        }
        Command::SetStatus {
            application_id,
            status,
            remarks,
            identity,
        } => {
            let actor = identity.resolve(workflow.policy())?;
            let change = workflow
                .change_status(&actor, &application_id, &status, remarks.as_deref())
                .await?;
            print_change(&change);
            Ok(exit_codes::OK)
        }
        Command::LenderDecision {
            application_id,
            decision,
            amount,
            remarks,
            identity,
        } => {
            let actor = identity.resolve(workflow.policy())?;
            let decision = match decision {
                DecisionArg::Approved => LenderDecision::Approved { amount },
                DecisionArg::Rejected => LenderDecision::Rejected,
                DecisionArg::Negotiation => LenderDecision::Negotiation,
            };
            let change = workflow
                .record_lender_decision(&actor, &application_id, decision, remarks.as_deref())
                .await?;
            print_change(&change);
            Ok(exit_codes::OK)
        }
        Command::Threads {
            application_id,
            identity,
        } => {
            let actor = identity.resolve(workflow.policy())?;
            let index = workflow.query_threads(&actor, &application_id).await?;
            for thread in &index.threads {
                print_thread(thread);
            }
            for orphan in &index.orphans {
                println!(
                    "orphan {} (parent {}): {}",
                    orphan.id,
                    orphan.parent().unwrap_or("?"),
                    orphan.content.message
                );
            }
            println!("{} open thread(s)", index.open_count());
            Ok(exit_codes::OK)
        }
        Command::Transitions { .. } | Command::CheckTransition { .. } | Command::Config { .. } => {
            Err(anyhow!("command does not use the record store"))
        }
    }
}

impl Identity {
    fn resolve(&self, policy: &WorkflowPolicy) -> Result<Actor> {
        let role = policy.normalize_role(&self.role)?;
        let mut actor = Actor::new(self.actor.trim(), role);
        actor.client_id = self
            .client
            .as_deref()
            .map(str::trim)
            .filter(|client| !client.is_empty())
            .map(str::to_string);
        if actor.id.is_empty() {
            bail!("--actor must not be blank");
        }
        Ok(actor)
    }
}

/// Form configuration source chosen by config: a JSON file when
/// `forms.path` is set, otherwise the store's form-fields table.
enum Forms {
    File(FileFormResolver),
    Store(StoreFormResolver<HttpRecordStore>),
}

#[async_trait]
impl FormConfigResolver for Forms {
    async fn resolve(&self, client_id: &str, product_id: &str) -> Result<Vec<FieldDescriptor>> {
        match self {
            Forms::File(resolver) => resolver.resolve(client_id, product_id).await,
            Forms::Store(resolver) => resolver.resolve(client_id, product_id).await,
        }
    }
}

fn connect(
    config: &LoanflowConfig,
    policy: WorkflowPolicy,
) -> Result<Workflow<HttpRecordStore, Forms>> {
    let store = Arc::new(HttpRecordStore::from_config(&config.store)?);
    let forms = match &config.forms.path {
        Some(path) => Forms::File(
            FileFormResolver::load(path)
                .with_context(|| format!("load form configuration {}", path.display()))?,
        ),
        None => Forms::Store(StoreFormResolver::new(
            Arc::clone(&store),
            config.tables.form_fields.clone(),
        )),
    };
    Ok(Workflow::new(
        store,
        Arc::new(forms),
        Arc::new(policy),
        config.tables.clone(),
    ))
}

fn print_missing(verdict: &ValidationVerdict) {
    println!("missing mandatory fields:");
    for field in &verdict.missing {
        println!("- {} ({}, {})", field.field_id, field.label, field.field_type.as_str());
    }
}

fn print_change(change: &StatusChange) {
    println!(
        "{}: {} -> {} (audit entry {})",
        change.application.display_id(),
        change.from,
        change.to,
        change.audit_entry_id
    );
}

fn print_thread(thread: &QueryThread) {
    let state = if thread.is_resolved { "resolved" } else { "open" };
    println!(
        "[{state}] {} {}: {}",
        thread.root.id,
        thread.root.actor.as_deref().unwrap_or("unknown"),
        thread.root.content.message
    );
    for reply in &thread.replies {
        println!(
            "    {} {}: {}",
            reply.id,
            reply.actor.as_deref().unwrap_or("unknown"),
            reply.content.message
        );
    }
}
