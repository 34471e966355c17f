use anyhow::Result;
use clap::{Parser, Subcommand};
use codepager::{CodePager, PagerConfig, mcp::CodePagerMcp};
use rmcp::{ServiceExt, transport::sse_server::SseServer, transport::stdio};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    name = "codepager-mcp",
    about = "MCP server exposing the code pager tools",
    version
)]
struct Cli {
    /// TOML configuration file
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve over stdin/stdout
    Stdio,
    /// Serve over HTTP with server-sent events
    Sse {
        #[clap(short, long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PagerConfig::load(path)?,
        None => PagerConfig::default(),
    }
    .with_env_overrides()?;
    let pager = Arc::new(CodePager::try_new(config)?);

    match cli.command {
        Command::Stdio => {
            info!("starting codepager MCP server on stdio");
            let server = CodePagerMcp::with_pager(pager.clone())
                .serve(stdio())
                .await?;
            server.waiting().await?;
        }
        Command::Sse { port } => {
            let addr = format!("0.0.0.0:{}", port);
            info!(%addr, "starting codepager MCP server over SSE");
            let shared = pager.clone();
            let ct = SseServer::serve(addr.parse()?)
                .await?
                .with_service(move || CodePagerMcp::with_pager(shared.clone()));
            tokio::signal::ctrl_c().await?;
            ct.cancel();
        }
    }

    pager.shutdown();
    info!("codepager MCP server stopped");
    Ok(())
}
