use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_core::config::AppConfig;
use switchyard_core::event::EventBus;
use switchyard_core::types::{ChatMessage, WorkflowEvent};
use switchyard_llm::create_client;
use switchyard_workflow::{ApprovalBroker, RunOptions, Workflow, WorkflowBuilder};

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Run workflow graphs of LLM agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "switchyard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured workflow once with a prompt
    Run {
        /// Input for the start node (read from stdin when empty)
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
        /// Print every event as a JSON line instead of streaming text
        #[arg(long)]
        json: bool,
    },
    /// Export the configured workflow as a diagram
    Graph {
        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Mermaid,
    Dot,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchyard=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "switchyard", &mut io::stdout());
        return Ok(());
    }

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Commands::Graph { format, out } => {
            let workflow = build_workflow(&config, &cli.config)?;
            let diagram = match format {
                GraphFormat::Mermaid => workflow.to_mermaid(),
                GraphFormat::Dot => workflow.to_dot(),
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, diagram)?;
                    info!(path = %path.display(), "Wrote workflow diagram");
                }
                None => println!("{}", diagram),
            }
        }
        Commands::Run { prompt, json } => {
            let mut text = prompt.join(" ");
            if text.is_empty() {
                let stdin = io::stdin();
                text = stdin
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if text.trim().is_empty() {
                anyhow::bail!("no prompt given");
            }
            let workflow = build_workflow(&config, &cli.config)?;
            run_once(&workflow, &config, &text, json).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn build_workflow(config: &AppConfig, path: &Path) -> anyhow::Result<Workflow> {
    let wf_config = config
        .workflow
        .as_ref()
        .with_context(|| format!("no [workflow] section in {}", path.display()))?;
    let builder = WorkflowBuilder::from_config(wf_config, &config.model, |model| {
        create_client(model).map(Arc::from)
    })?;
    Ok(builder.build()?)
}

async fn run_once(
    workflow: &Workflow,
    config: &AppConfig,
    input: &str,
    json: bool,
) -> anyhow::Result<()> {
    let broker = Arc::new(ApprovalBroker::new());
    let bus = Arc::new(EventBus::new(config.run.event_capacity));
    let options = RunOptions::from_config(&config.run)
        .with_approval(broker.clone())
        .with_event_bus(bus.clone());

    // Trace every event for RUST_LOG=switchyard=debug
    let mut rx = bus.subscribe();
    let trace_handle = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            debug!(?event, "Workflow event");
        }
    });

    let mut run = workflow.run(ChatMessage::user(input), options);
    info!(run_id = %run.run_id(), workflow = %workflow.name(), "Run started");

    // Graceful cancellation on Ctrl-C
    let cancel = run.cancel_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel.cancel();
    });

    let mut events = run.events().context("event stream already taken")?;
    let mut streaming_node: Option<String> = None;

    while let Some(event) = events.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }
        match event {
            WorkflowEvent::PartialOutput {
                node_id,
                text_delta,
            } if !json => {
                if streaming_node.as_deref() != Some(node_id.as_str()) {
                    print!("\n{}: ", node_id);
                    streaming_node = Some(node_id);
                }
                print!("{}", text_delta);
                io::stdout().flush().ok();
            }
            WorkflowEvent::NodeFailed { node_id, error } if !json => {
                eprintln!("\n[{}: ERROR] {}", node_id, error);
            }
            WorkflowEvent::ApprovalRequested {
                request_id,
                node_id,
                prompt,
            } => {
                streaming_node = None;
                eprintln!("\n[APPROVAL] {}", node_id);
                eprintln!("{}", prompt);
                let answer = tokio::task::spawn_blocking(move || {
                    dialoguer::Input::<String>::new()
                        .with_prompt("Answer")
                        .allow_empty(true)
                        .interact_text()
                })
                .await;
                match answer {
                    Ok(Ok(answer)) => {
                        broker.respond(&request_id, answer);
                    }
                    Ok(Err(e)) => warn!(error = %e, "Could not read approval answer"),
                    Err(e) => warn!(error = %e, "Approval prompt task failed"),
                }
            }
            WorkflowEvent::ApprovalResolved { approved, .. } if !json => {
                let verdict = if approved { "approved" } else { "rejected" };
                eprintln!("[approval: {}]", verdict);
            }
            WorkflowEvent::Cancelled if !json => {
                eprintln!("\n[cancelled]");
            }
            _ => {}
        }
    }

    let outcome = run.outcome().await;
    drop(bus);
    trace_handle.await.ok();

    match outcome {
        Ok(outcome) => {
            if !json {
                println!("\n=== Final Output ===");
                match &outcome.output {
                    Some(message) => println!("{}", message.text()),
                    None => println!("(no output)"),
                }
            }
            eprintln!(
                "[done: {} nodes in {}ms]",
                outcome.completed.len(),
                outcome.elapsed_ms
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            Err(e.into())
        }
    }
}
