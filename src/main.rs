//! Vigil CLI entry point: load a workflow document and run it to completion.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use vigil::domain::models::workflow::Workflow;
use vigil::domain::ports::human_input::HumanInputChannel;
use vigil::domain::ports::security::NullSecurityVerifier;
use vigil::domain::ports::session_manager::NullSessionManager;
use vigil::infrastructure::config::ConfigLoader;
use vigil::infrastructure::logging::{LogConfig, LoggerImpl};
use vigil::infrastructure::providers::claude::ClaudeProviderConfig;
use vigil::infrastructure::providers::ClaudeProviderFactory;
use vigil::services::checkpoint_store::CheckpointStore;
use vigil::services::event_logger::SessionEventLogger;
use vigil::services::tool_dispatcher::{ToolDispatcher, ToolRegistry};
use vigil::WorkflowRunner;

#[derive(Parser, Debug)]
#[command(name = "vigil", about = "Supervised workflow executor for tool-using language-model agents")]
struct Cli {
    /// Path to a workflow document (JSON or YAML).
    workflow: PathBuf,

    /// `name=value` input bindings, repeatable.
    #[arg(short = 'i', long = "input", value_parser = parse_input)]
    inputs: Vec<(String, String)>,

    /// Answer every PAUSE question from stdin instead of falling back
    /// autonomously.
    #[arg(long)]
    interactive: bool,
}

fn parse_input(s: &str) -> Result<(String, String), String> {
    s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())).ok_or_else(|| format!("expected `name=value`, got `{s}`"))
}

fn load_workflow(path: &PathBuf) -> Result<Workflow> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&text).context("parsing workflow JSON")
    } else {
        serde_yaml::from_str(&text).context("parsing workflow YAML")
    }
}

/// Answers PAUSE questions by prompting on stdin.
struct StdinHumanInput;

#[async_trait]
impl HumanInputChannel for StdinHumanInput {
    async fn wait(&self, question: &str, timeout: Duration) -> Option<String> {
        println!("\nSUPERVISOR PAUSED: {question}");
        print!("> ");
        std::io::stdout().flush().ok();
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_ok() {
                let _ = tx.send(line.trim().to_string());
            }
        });
        tokio::time::timeout(timeout, rx).await.ok()?.ok()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().unwrap_or_default();
    LoggerImpl::init(&LogConfig { level: if config.debug { "debug".into() } else { "info".into() }, ..LogConfig::default() })
        .context("failed to initialize logging")?;

    let workflow = load_workflow(&cli.workflow)?;
    let inputs: BTreeMap<String, String> = cli.inputs.into_iter().collect();

    let provider_factory = Arc::new(
        ClaudeProviderFactory::new(ClaudeProviderConfig::default()).context("failed to construct Claude provider")?,
    );
    let events = Arc::new(SessionEventLogger::new(config.debug, Arc::new(NullSessionManager)));
    let dispatcher = Arc::new(ToolDispatcher::new(
        ToolRegistry::new(),
        None,
        Arc::new(NullSecurityVerifier::new()),
        events.clone(),
    ));
    let checkpoints = Arc::new(CheckpointStore::with_directory(config.checkpoint_dir.as_str()));
    let human_input: Option<Arc<dyn HumanInputChannel>> = cli.interactive.then(|| Arc::new(StdinHumanInput) as Arc<dyn HumanInputChannel>);

    let runner = WorkflowRunner::new(provider_factory, dispatcher, checkpoints, events, human_input)
        .with_default_convergence_limit(config.default_convergence_limit);

    let result = runner.run(&workflow, inputs, CancellationToken::new()).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if matches!(result.status, vigil::RunStatus::Failed) {
        std::process::exit(1);
    }
    Ok(())
}
