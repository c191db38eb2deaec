use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use toolflow::utils::LoggingConfig;
use toolflow::{
    builtin_registry, CapabilityKind, DynLlmClient, DynSearchClient, LocalEchoClient,
    Orchestrator, OrchestratorConfig, StaticSearchClient, StreamEvent, StreamingResponder,
    ToolRequest,
};

#[derive(Parser)]
#[command(name = "toolflow", version, about = "Tool-orchestrated question answering", author)]
struct Cli {
    /// JSON orchestrator config; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug-level logging for the toolflow crate
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a query, streaming the response
    Ask {
        query: String,
        /// Skip web search for this request
        #[arg(long)]
        no_search: bool,
        /// Print raw SSE frames instead of rendered text
        #[arg(long)]
        sse: bool,
    },
    /// Show the execution plan for a query without running it
    Plan { query: String },
    /// List registered tools
    Tools,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        LoggingConfig::init_with_filter("toolflow=debug,info");
    } else {
        LoggingConfig::init();
    }

    let config = load_config(cli.config)?;
    match cli.command {
        Command::Ask {
            query,
            no_search,
            sse,
        } => handle_ask(config, query, no_search, sse).await?,
        Command::Plan { query } => handle_plan(config, query)?,
        Command::Tools => handle_tools(config)?,
        Command::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<OrchestratorConfig> {
    let config = match path {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };
    Ok(config.apply_env_overrides()?)
}

#[cfg(feature = "http-client")]
fn search_client(config: &OrchestratorConfig) -> DynSearchClient {
    match toolflow::EnvConfig::get_env_optional("TOOLFLOW_SEARCH_ENDPOINT") {
        Some(endpoint) => Arc::new(toolflow::HttpSearchClient::new(
            endpoint,
            toolflow::EnvConfig::get_env_optional("TOOLFLOW_SEARCH_API_KEY"),
            config.search.timeout(),
        )),
        None => Arc::new(StaticSearchClient::new()),
    }
}

#[cfg(not(feature = "http-client"))]
fn search_client(_config: &OrchestratorConfig) -> DynSearchClient {
    Arc::new(StaticSearchClient::new())
}

#[cfg(feature = "http-client")]
fn llm_client(config: &OrchestratorConfig) -> anyhow::Result<DynLlmClient> {
    if config.llm.api_key.is_none() && toolflow::EnvConfig::get_env_optional("TOOLFLOW_LLM_API_KEY").is_none()
    {
        return Ok(Arc::new(LocalEchoClient));
    }
    Ok(Arc::new(toolflow::GenericHttpClient::from_settings(&config.llm)?))
}

#[cfg(not(feature = "http-client"))]
fn llm_client(_config: &OrchestratorConfig) -> anyhow::Result<DynLlmClient> {
    Ok(Arc::new(LocalEchoClient))
}

async fn handle_ask(
    config: OrchestratorConfig,
    query: String,
    no_search: bool,
    sse: bool,
) -> anyhow::Result<()> {
    let search = search_client(&config);
    let llm = llm_client(&config)?;
    let orchestrator = Orchestrator::with_builtin_tools(search, llm, config)?;
    let responder = StreamingResponder::new(Arc::new(orchestrator));

    let mut request = ToolRequest::builder(query);
    if no_search {
        request = request.disable(&CapabilityKind::Search);
    }
    let stream = responder.respond(request.build());

    let mut stdout = std::io::stdout();
    if sse {
        let mut frames = stream.into_sse();
        while let Some(frame) = frames.next().await {
            write!(stdout, "{}", frame?)?;
            stdout.flush()?;
        }
        return Ok(());
    }

    let mut stream = stream;
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Start { workflow_id } => eprintln!("[{workflow_id}]"),
            StreamEvent::ToolProgress { tool, phase } => eprintln!("  {tool}: {phase:?}"),
            StreamEvent::Content { text } => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            StreamEvent::Complete {
                confidence,
                tools_used,
                ..
            } => {
                println!();
                eprintln!("confidence {confidence:.2}, tools: {}", tools_used.join(", "));
            }
            StreamEvent::Error { code, message } => {
                println!();
                anyhow::bail!("{code}: {message}");
            }
        }
    }
    Ok(())
}

fn handle_plan(config: OrchestratorConfig, query: String) -> anyhow::Result<()> {
    let llm = llm_client(&config)?;
    let orchestrator = Orchestrator::with_builtin_tools(search_client(&config), llm, config)?;
    let plan = orchestrator.plan(&ToolRequest::new(query))?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn handle_tools(config: OrchestratorConfig) -> anyhow::Result<()> {
    let registry = builtin_registry(search_client(&config), config.search.clone())?;
    println!("{:<24} {:<12} {:<24} {}", "Name", "Kind", "Depends on", "Description");
    for descriptor in registry.descriptors() {
        let dependencies = descriptor
            .dependencies
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<24} {:<12} {:<24} {}",
            descriptor.name,
            descriptor.kind.to_string(),
            dependencies,
            descriptor.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
