use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use turngate::{
    ApprovalDecision, CatalogConfig, ClarificationAnswer, FileCheckpoints, ResumePayload,
    Scenario, ScriptedProvider, ScriptedReasoner, TurnEngine, TurnResult,
};

/// Turngate CLI: human-in-the-loop turn orchestration over a scripted scenario
#[derive(Parser, Debug)]
#[command(name = "turngate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a fresh turn for a thread
    #[command(name = "start")]
    Start {
        #[command(flatten)]
        common: CommonArgs,

        /// The user's request text
        #[arg(short, long)]
        request: String,
    },

    /// Resume a suspended turn with approvals, rejections, or answers
    #[command(name = "resume")]
    Resume {
        #[command(flatten)]
        common: CommonArgs,

        /// Approve a pending invocation (repeatable)
        #[arg(long, value_name = "ID")]
        approve: Vec<String>,

        /// Reject a pending invocation with feedback (repeatable)
        #[arg(long, value_name = "ID=FEEDBACK")]
        reject: Vec<String>,

        /// Answer a pending clarification question (repeatable)
        #[arg(long, value_name = "ID=ANSWER")]
        answer: Vec<String>,
    },
}

#[derive(Parser, Debug)]
struct CommonArgs {
    /// Thread the turn belongs to
    #[arg(short, long)]
    thread: String,

    /// Path to a scenario file (defaults to the bundled demo)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Path to an action catalog file
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// Directory for thread checkpoints
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Start { common, request }) => {
            let engine = build_engine(&common)?;
            let result = engine.start_turn(&common.thread, &request).await;
            print_result(&common.thread, result)
        }
        Some(Command::Resume {
            common,
            approve,
            reject,
            answer,
        }) => {
            let payload = build_payload(approve, reject, answer)?;
            let engine = build_engine(&common)?;
            let result = engine.resume_turn(&common.thread, payload).await;
            print_result(&common.thread, result)
        }
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            eprintln!("Example: turngate start --thread demo --request \"book a meeting\"");
            std::process::exit(1);
        }
    }
}

fn build_engine(common: &CommonArgs) -> Result<TurnEngine> {
    // Set up logging
    let filter = if common.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let scenario = Scenario::load_or_bundled(common.scenario.as_ref())?;
    let catalog = CatalogConfig::load_or_default(common.catalog.as_ref())?;

    let state_dir = common.state_dir.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("turngate/threads")
    });
    info!("Checkpoint directory: {:?}", state_dir);

    Ok(TurnEngine::new(
        Arc::new(ScriptedReasoner::new(scenario.clone())),
        Arc::new(ScriptedProvider::new(scenario)),
        Arc::new(FileCheckpoints::new(state_dir)),
        catalog,
    ))
}

/// Split a repeatable `ID=VALUE` argument into its parts.
fn split_pair(raw: &str, flag: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((id, value)) if !id.is_empty() => Ok((id.to_string(), value.to_string())),
        _ => anyhow::bail!("--{} expects ID=VALUE, got {:?}", flag, raw),
    }
}

fn build_payload(
    approve: Vec<String>,
    reject: Vec<String>,
    answer: Vec<String>,
) -> Result<ResumePayload> {
    if !answer.is_empty() {
        if !approve.is_empty() || !reject.is_empty() {
            anyhow::bail!("--answer cannot be combined with --approve or --reject");
        }
        let answers = answer
            .iter()
            .map(|raw| {
                let (invocation_id, text) = split_pair(raw, "answer")?;
                Ok(ClarificationAnswer {
                    invocation_id,
                    answer: text,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(ResumePayload::ClarificationAnswers { answers });
    }

    if approve.is_empty() && reject.is_empty() {
        anyhow::bail!("resume requires at least one --approve, --reject, or --answer");
    }

    let mut decisions: Vec<ApprovalDecision> = approve
        .into_iter()
        .map(|invocation_id| ApprovalDecision {
            invocation_id,
            approved: true,
            feedback: None,
        })
        .collect();
    for raw in reject {
        let (invocation_id, feedback) = split_pair(&raw, "reject")?;
        decisions.push(ApprovalDecision {
            invocation_id,
            approved: false,
            feedback: Some(feedback),
        });
    }
    Ok(ResumePayload::ApprovalDecisions { decisions })
}

fn print_result(thread_id: &str, result: TurnResult) -> Result<()> {
    match result {
        TurnResult::Success { response } => {
            println!("Turn complete.");
            println!("{}", response);
            Ok(())
        }
        TurnResult::ConfirmationRequired {
            thread_id,
            pending_confirmation,
        } => {
            println!("Confirmation required before these actions run:");
            for inv in &pending_confirmation {
                println!(
                    "  [{}] {} {}",
                    inv.invocation_id,
                    inv.name,
                    serde_json::to_string(&inv.arguments).unwrap_or_default()
                );
            }
            println!();
            println!(
                "Resume with: turngate resume --thread {} --approve <ID> / --reject <ID=FEEDBACK>",
                thread_id
            );
            Ok(())
        }
        TurnResult::ClarificationRequired {
            thread_id,
            pending_clarification,
        } => {
            println!("The agent needs more information:");
            for req in &pending_clarification {
                println!("  [{}] {}", req.invocation_id, req.question);
            }
            println!();
            println!(
                "Resume with: turngate resume --thread {} --answer <ID=ANSWER>",
                thread_id
            );
            Ok(())
        }
        TurnResult::AuthorizationRequired {
            response,
            url,
            form_schema,
        } => {
            println!("{}", response);
            if let Some(url) = url {
                println!("Authorize at: {}", url);
            }
            if let Some(schema) = form_schema {
                println!(
                    "Authorization form: {}",
                    serde_json::to_string(&schema).unwrap_or_default()
                );
            }
            println!("Start a new turn once authorization is complete.");
            Ok(())
        }
        TurnResult::Error { message } => {
            eprintln!("Turn for thread {} failed: {}", thread_id, message);
            std::process::exit(1);
        }
    }
}
