use anyhow::{Context, Result};
use axum::routing::get;
use clap::Parser;
use httmcp::api::ApiServer;
use httmcp::config::Config;
use httmcp::mcp::tools::{register_standard_handlers, ServerInfo};
use httmcp::mcp::{ChannelPublisher, HandlerRegistry, ToolRegistry};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

mod tools;

#[derive(Parser, Debug)]
#[command(name = "httmcp-server")]
#[command(about = "MCP over plain HTTP with session endpoints pushed via a publish server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "httmcp.toml")]
    config: PathBuf,

    /// Server bind address (overrides config)
    #[arg(long)]
    bind_addr: Option<String>,

    /// MCP server name (overrides config)
    #[arg(long)]
    name: Option<String>,

    /// Publish server base URL (overrides config)
    #[arg(long, env = "HTTMCP_PUBLISH_SERVER")]
    publish_server: Option<String>,

    /// Route prefix (overrides config)
    #[arg(long)]
    api_prefix: Option<String>,
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| config.observability.log_format.clone())
        .eq_ignore_ascii_case("json");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(log_file) = &config.logging.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("Failed to open log file {:?}", log_file))?;
        let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
    } else if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_create(&args.config)?;

    // Apply CLI overrides
    if let Some(bind_addr) = args.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    if let Some(name) = args.name {
        config.mcp.name = name;
    }
    if let Some(publish_server) = args.publish_server {
        config.mcp.publish_server = Some(publish_server);
    }
    if let Some(api_prefix) = args.api_prefix {
        config.mcp.api_prefix = Some(api_prefix);
    }
    config.validate()?;

    init_tracing(&config)?;

    tracing::info!("Starting httmcp server {}", config.mcp.name);
    tracing::info!("Config file: {:?}", args.config);
    match &config.mcp.publish_server {
        Some(server) => tracing::info!("Publish server: {}", server),
        None => tracing::warn!("No publish server configured; endpoint events will not be delivered"),
    }

    let publisher = Arc::new(ChannelPublisher::from_config(&config.mcp, &config.publish)?);

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(tools::EchoTool));
    tools.register(Arc::new(tools::EchoLaterTool));
    tracing::info!("Registered {} tools", tools.len());

    let mut registry = HandlerRegistry::new();
    register_standard_handlers(
        &mut registry,
        ServerInfo {
            name: config.mcp.name.clone(),
            version: config.mcp.version.clone(),
        },
        Arc::new(tools),
        Some(publisher.clone()),
    );

    let server = ApiServer::new(&config, registry, publisher);
    let mut router = server.router();

    if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
        tracing::info!("Prometheus metrics at GET /metrics");
    }

    server.serve_router(&config.server.bind_addr, router).await?;

    Ok(())
}
