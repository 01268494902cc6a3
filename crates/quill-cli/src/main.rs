//! CLI binary for running and inspecting the quill content workflow.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use quill_llm::GenerationSettings;
use quill_pipeline::{
    lint, save_run_log, Collaborators, EventEmitter, FinalResult, HandoffManager, RunnerConfig,
    Severity, StageRegistry, WorkflowEvent, WorkflowGraph, WorkflowRunner,
};
use quill_types::{ContentRequest, ContentType};

#[derive(Parser)]
#[command(name = "quill", version, about = "Multi-stage LLM content generation workflow")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate content for a topic
    Run {
        /// Topic to write about
        topic: String,

        /// Content type: blog_post, social_media or website_copy
        #[arg(short, long, default_value = "blog_post")]
        content_type: ContentType,

        /// Target audience
        #[arg(short, long)]
        audience: Option<String>,

        /// Keyword to target (repeatable)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Skip LLM and web search calls; use local fallbacks
        #[arg(long)]
        offline: bool,

        /// Model override for the text generator
        #[arg(long)]
        model: Option<String>,

        /// Maximum number of stage executions before aborting. Default: 50.
        #[arg(long, default_value = "50")]
        max_steps: usize,

        /// Directory to write the run log (run.json) into
        #[arg(long)]
        audit_dir: Option<PathBuf>,

        /// Print the full result as JSON instead of the content
        #[arg(long)]
        json: bool,
    },

    /// Lint the workflow graph
    Validate,

    /// Show the stages, routes, and handoff rules of the workflow
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            topic,
            content_type,
            audience,
            keywords,
            offline,
            model,
            max_steps,
            audit_dir,
            json,
        } => {
            let mut request = ContentRequest::new(topic, content_type);
            request.target_audience = audience;
            request.keywords = keywords;
            let options = RunOptions {
                offline,
                model,
                max_steps,
                audit_dir,
                json,
            };
            cmd_run(request, options).await?;
        }
        Commands::Validate => cmd_validate()?,
        Commands::Info => cmd_info(),
    }

    Ok(())
}

/// `RUST_LOG` when set, otherwise `debug` or `info` depending on `--verbose`.
fn log_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

struct RunOptions {
    offline: bool,
    model: Option<String>,
    max_steps: usize,
    audit_dir: Option<PathBuf>,
    json: bool,
}

async fn cmd_run(request: ContentRequest, options: RunOptions) -> anyhow::Result<()> {
    let collaborators = if options.offline {
        Collaborators::offline()
    } else {
        Collaborators::from_env(GenerationSettings {
            model: options.model,
            ..GenerationSettings::default()
        })
    };

    let emitter = EventEmitter::default();
    let progress = tokio::spawn(log_progress(emitter.subscribe()));
    let runner = WorkflowRunner::new(
        StageRegistry::standard(collaborators),
        RunnerConfig {
            max_steps: options.max_steps,
        },
    )?
    .with_emitter(emitter);

    let result = runner.run(request).await;
    // Closing the channel lets the logger drain the remaining events and exit.
    drop(runner);
    let _ = progress.await;

    if let Some(dir) = options.audit_dir.as_deref() {
        let path = save_run_log(&result, dir).await?;
        eprintln!("Run log: {}", path.display());
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn log_progress(mut rx: broadcast::Receiver<WorkflowEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress logger fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            WorkflowEvent::RouteSelected {
                stage,
                label,
                target,
            } => {
                tracing::info!(%stage, %label, %target, "Route selected");
            }
            WorkflowEvent::StageFailed { stage, error } => {
                tracing::warn!(%stage, %error, "Stage failed");
            }
            WorkflowEvent::CycleGuardTripped { from, to, traversals } => {
                tracing::warn!(%from, %to, traversals, "Revision loop limit reached");
            }
            _ => {}
        }
    }
}

fn print_summary(result: &FinalResult) {
    println!("{}", result.final_content);
    eprintln!();
    eprintln!("Status: {:?} (ended at {})", result.status, result.terminal_stage);
    eprintln!("Words: {}", result.analytics.word_count);
    if let Some(score) = result.quality_score {
        eprintln!("Quality score: {score:.1}");
    }
    if let Some(seo) = &result.seo {
        eprintln!("SEO score: {:.1}", seo.score);
        eprintln!("Meta description: {}", seo.meta_description);
    }
    eprintln!("Revisions: {}", result.analytics.revision_count);
    eprintln!(
        "Processing time: {:.2}s",
        result.analytics.total_processing_time
    );
    for failure in &result.stage_failures {
        let note = if failure.fallback_used { " (fallback used)" } else { "" };
        eprintln!("Stage failure: {}: {}{}", failure.stage, failure.message, note);
    }
    for message in &result.error_messages {
        eprintln!("Error: {message}");
    }
}

fn cmd_validate() -> anyhow::Result<()> {
    let graph = WorkflowGraph::standard();
    let diagnostics = lint(&graph);

    if diagnostics.is_empty() {
        println!("Workflow graph is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("    fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info() {
    let graph = WorkflowGraph::standard();

    println!("Workflow: {}", graph.name);
    println!("Entry: {}", graph.entry());
    println!("Stages: {}", graph.stages().len());
    println!("Edges: {}", graph.all_edges().len());

    println!("\nStages:");
    for stage in graph.stages() {
        match graph.gate(*stage) {
            Some(gate) => println!("  {} [gate: {}]", stage, gate.as_str()),
            None if stage.is_terminal() => println!("  {} [terminal]", stage),
            None => println!("  {}", stage),
        }
    }

    println!("\nEdges:");
    for edge in graph.all_edges() {
        let label = edge.label.as_deref().unwrap_or("-");
        match edge.max_traversals {
            Some(max) => println!("  {} -> {} [{}] (max {})", edge.from, edge.to, label, max),
            None => println!("  {} -> {} [{}]", edge.from, edge.to, label),
        }
    }

    let handoffs = HandoffManager::standard();
    println!("\nValidation rules:");
    for key in sorted(handoffs.validation_rules().keys()) {
        println!("  {key}");
    }
    println!("\nTransform rules:");
    for (key, rules) in handoffs.transform_rules().entries() {
        let names: Vec<&str> = rules.iter().map(|r| r.name).collect();
        println!("  {}: {}", key, names.join(", "));
    }
}

fn sorted<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut keys: Vec<&str> = keys.collect();
    keys.sort_unstable();
    keys
}
