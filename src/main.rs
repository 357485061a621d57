//! glint - local syntax highlighting service
//!
//! Serves highlight requests over TCP (binary length-prefixed frames) or
//! stdio (header-block frames), and doubles as a small client.

use clap::{Parser, Subcommand};
use glint_client::{Client, ConnectionConfig};
use glint_protocol::DEFAULT_PORT;
use glint_server::{serve_pipe, Config, RunOutcome, Server, ServerConfig, ServiceContext};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT);

#[derive(Parser)]
#[command(name = "glint")]
#[command(about = "Local syntax highlighting service")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "GLINT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the binary protocol over TCP (default)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind to
        #[arg(short, long)]
        bind: Option<IpAddr>,
    },

    /// Serve the header-frame protocol on stdin/stdout
    Stdio,

    /// Highlight a file through a running server
    Highlight {
        /// Server address
        #[arg(short, long, default_value_t = DEFAULT_ADDR)]
        addr: SocketAddr,

        /// Language (server default when omitted)
        #[arg(short, long)]
        lang: Option<String>,

        #[command(flatten)]
        timeouts: Timeouts,

        /// Source file, or - for stdin
        #[arg(default_value = "-")]
        file: String,
    },

    /// Ask a running server to exit
    Stop {
        /// Server address
        #[arg(short, long, default_value_t = DEFAULT_ADDR)]
        addr: SocketAddr,

        #[command(flatten)]
        timeouts: Timeouts,
    },
}

#[derive(clap::Args)]
struct Timeouts {
    /// Seconds to wait for the connection
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Seconds to wait for a response
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

impl Timeouts {
    fn connection_config(&self, addr: SocketAddr) -> ConnectionConfig {
        ConnectionConfig::new(addr)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_request_timeout(Duration::from_secs(self.timeout))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries protocol frames in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        bind: None,
    }) {
        Commands::Serve { port, bind } => {
            let mut config = load_config(cli.config)?;
            if let Some(bind) = bind {
                config.network.bind_addr.set_ip(bind);
            }
            if let Some(port) = port {
                config.network.bind_addr.set_port(port);
            }
            serve(config).await
        }
        Commands::Stdio => {
            let config = load_config(cli.config)?;
            let ctx = build_context(&config)?;
            serve_pipe(tokio::io::stdin(), tokio::io::stdout(), &ctx).await?;
            Ok(())
        }
        Commands::Highlight {
            addr,
            lang,
            timeouts,
            file,
        } => {
            let code = read_source(&file).await?;
            let client = Client::connect_with(timeouts.connection_config(addr)).await?;
            let html = client.highlight(lang.as_deref(), &code).await?;
            client.close().await?;
            println!("{}", html);
            Ok(())
        }
        Commands::Stop { addr, timeouts } => {
            let client = Client::connect_with(timeouts.connection_config(addr)).await?;
            client.shutdown().await?;
            tracing::info!("Exit command sent to {}", addr);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    match Config::load_from(path.as_deref()) {
        Ok(config) => {
            match &path {
                Some(path) => tracing::info!("Loaded config from {}", path.display()),
                None => tracing::info!("Using default configuration"),
            }
            Ok(config)
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            Err(e.into())
        }
    }
}

fn build_context(config: &Config) -> Result<ServiceContext, Box<dyn std::error::Error>> {
    let ctx = ServiceContext::from_config(config).map_err(|e| {
        tracing::error!("Failed to set up highlighter: {}", e);
        e
    })?;
    tracing::info!("  Default language: {}", ctx.default_language);
    tracing::info!("  Theme: {}", config.highlight.theme);
    tracing::info!("  Extra grammars: {}", config.highlight.grammar_files.len());
    Ok(ctx)
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting glint server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);

    let ctx = build_context(&config)?;
    let server = Arc::new(Server::new(ServerConfig::from(&config.network), ctx));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    match server.run().await? {
        RunOutcome::ExitRequested => {
            tracing::info!("Exit command received, terminating");
            std::process::exit(0);
        }
        RunOutcome::Shutdown => {
            tracing::info!("Server stopped");
            Ok(())
        }
    }
}

async fn read_source(file: &str) -> std::io::Result<String> {
    if file == "-" {
        let mut code = String::new();
        tokio::io::stdin().read_to_string(&mut code).await?;
        Ok(code)
    } else {
        tokio::fs::read_to_string(file).await
    }
}
