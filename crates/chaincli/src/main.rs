// crates/chaincli/src/main.rs

use anyhow::{bail, Context, Result};
use chaincore::{ExecutionEvent, ExecutionItem, NodeInstance, ParameterValue, WorkflowDefinition};
use chainruntime::{FlowRuntime, NodeRegistry, RuntimeConfig};
use clap::{Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chainflow")]
#[command(about = "Blockchain workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Trigger items as a JSON object or array of objects
        #[arg(short, long)]
        input: Option<String>,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file without running it
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, input, config, verbose } => {
            init_logging(verbose);
            run_workflow(file, input, config).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the verbosity flag.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    chainnodes::register_all(&mut registry);
    Arc::new(registry)
}

fn parse_input(input: &str) -> Result<Vec<ExecutionItem>> {
    let json: JsonValue = serde_json::from_str(input).context("input is not valid JSON")?;
    match json {
        JsonValue::Object(_) => Ok(vec![ExecutionItem::new(json)]),
        JsonValue::Array(items) => {
            if items.iter().any(|item| !item.is_object()) {
                bail!("Input array must contain only JSON objects");
            }
            Ok(items.into_iter().map(ExecutionItem::new).collect())
        }
        _ => bail!("Input must be a JSON object or an array of objects"),
    }
}

async fn run_workflow(file: PathBuf, input: Option<String>, config: Option<PathBuf>) -> Result<()> {
    eprintln!("🚀 Loading workflow from: {}", file.display());

    let workflow = WorkflowDefinition::load(&file)?;
    let config = match config {
        Some(path) => RuntimeConfig::load(&path)?,
        None => RuntimeConfig::default(),
    };
    let items = input.as_deref().map(parse_input).transpose()?;
    tracing::debug!(?config, trigger_items = ?items.as_ref().map(Vec::len), "runtime configured");

    eprintln!("📋 Workflow: {}", workflow.name.as_deref().unwrap_or(&workflow.id));
    eprintln!("   Nodes: {}", workflow.nodes.len());
    eprintln!("   Connections: {}", workflow.edges.len());
    eprintln!();

    let runtime = FlowRuntime::with_registry(registry(), config);
    let mut events = runtime.subscribe_events();

    // Ends once the runtime, and with it the last sender, is dropped.
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { execution_id, .. } => {
                    eprintln!("▶️  Workflow started ({})", execution_id);
                }
                ExecutionEvent::NodeFinished { node_id, node_type, items, errors, success, .. } => {
                    if success {
                        eprintln!("  ✅ {} ({}): {} items", node_id, node_type, items);
                    } else {
                        eprintln!("  ❌ {} ({}): {} items, {} failed", node_id, node_type, items, errors);
                    }
                }
                ExecutionEvent::WorkflowCompleted { node_count, duration_ms, .. } => {
                    let duration = duration_ms.map(|ms| format!(" in {}ms", ms)).unwrap_or_default();
                    eprintln!("✨ Workflow completed: {} nodes{}", node_count, duration);
                }
                ExecutionEvent::WorkflowFailed { node_id, error, .. } => match node_id {
                    Some(node_id) => eprintln!("💥 Workflow failed at {}: {}", node_id, error),
                    None => eprintln!("💥 Workflow failed: {}", error),
                },
            }
        }
    });

    let result = match items {
        Some(items) => runtime.execute_with_input(&workflow, items).await,
        None => runtime.execute(&workflow).await,
    };

    drop(runtime);
    let _ = event_task.await;

    let result = result?;
    eprintln!();
    eprintln!("📊 Execution {}", result.execution_id);
    eprintln!("   Order: {}", result.execution_order.join(" → "));
    if result.has_errors() {
        eprintln!("   ⚠️  Some items failed; see their error fields");
    }

    println!("{}", serde_json::to_string_pretty(&result.outputs)?);

    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = WorkflowDefinition::load(&file)?;
    let runtime = FlowRuntime::with_registry(registry(), RuntimeConfig::default());
    let plan = runtime.validate(&workflow)?;
    tracing::debug!(workflow = %workflow.id, nodes = plan.len(), "workflow validated");

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name.as_deref().unwrap_or(&workflow.id));
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connections: {}", workflow.edges.len());
    let starts: Vec<&str> = plan.start_nodes().iter().map(|&i| workflow.nodes[i].id.as_str()).collect();
    println!("   Start nodes: {}", starts.join(", "));

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = registry();
    for node_type in registry.list_node_types() {
        match registry.describe(&node_type) {
            Some(description) => {
                println!("  • {} ({})", node_type, description.category);
                println!("    {}", description.description);
                for parameter in &description.parameters {
                    let required = if parameter.required { " (required)" } else { "" };
                    println!(
                        "      - {} \"{}\": {}{}",
                        parameter.name,
                        parameter.display_name,
                        parameter.kind.as_str(),
                        required
                    );
                }
            }
            None => println!("  • {}", node_type),
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = WorkflowDefinition::new("sol-price").with_name("SOL price check");

    workflow.add_node(
        NodeInstance::new("fetch", "http.request")
            .with_parameter("url", "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd")
            .with_retry(3, 1000),
    );
    workflow.add_node(NodeInstance::new("price", "transform.set").with_parameter(
        "values",
        ParameterValue::Literal(json!({ "value": "={{ $json.body.solana.usd }}" })),
    ));
    workflow.add_node(NodeInstance::new("log", "debug.log").with_parameter("label", "SOL/USD"));

    workflow.connect("fetch", "price");
    workflow.connect("price", "log");

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  chainflow run --file {}", output.display());

    Ok(())
}
