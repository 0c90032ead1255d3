//! bucketkv Server Binary
//!
//! Starts the TCP server in front of a bucket supervisor.

use std::sync::Arc;

use bucketkv::network::Server;
use bucketkv::{BucketEngine, Config};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// bucketkv Server
#[derive(Parser, Debug)]
#[command(name = "bucketkv-server")]
#[command(about = "Multi-tenant bucket server")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Supervisor config string (`engine=...;admin=...;default=...`)
    #[arg(short, long, default_value = "")]
    config: String,

    /// Engine used for auto-created buckets
    #[arg(short, long)]
    engine: Option<String>,

    /// Identity allowed to run admin commands
    #[arg(short, long)]
    admin: Option<String>,

    /// Load an unnamed default bucket at startup
    #[arg(long)]
    default_bucket: bool,

    /// Bind new connections to this named bucket
    #[arg(long)]
    default_bucket_name: Option<String>,

    /// Do not create buckets on connect or auth
    #[arg(long)]
    no_auto_create: bool,
}

fn build_config(args: &Args) -> bucketkv::Result<Config> {
    let mut config = Config::from_config_str(&args.config)?;
    config.listen_addr = args.listen.clone();
    config.max_connections = args.max_connections;
    if let Some(engine) = &args.engine {
        config.engine_path = engine.clone();
    }
    if let Some(admin) = &args.admin {
        config.admin_user = Some(admin.clone());
    }
    if args.default_bucket {
        config.default_bucket = true;
    }
    if let Some(name) = &args.default_bucket_name {
        config.default_bucket_name = Some(name.clone());
    }
    if args.no_auto_create {
        config.auto_create = false;
    }
    Ok(config)
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bucketkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("bucketkv Server v{}", bucketkv::VERSION);

    let config = match build_config(&args) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine: {}", config.engine_path);
    tracing::info!("Listen address: {}", config.listen_addr);
    match &config.admin_user {
        Some(admin) => tracing::info!("Admin user: {}", admin),
        None => tracing::info!("No admin user configured; admin commands are disabled"),
    }

    let engine = match BucketEngine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open bucket engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Bucket engine initialized successfully");

    let mut server = Server::new(config, Arc::clone(&engine));
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    engine.shutdown(false);
    tracing::info!("Server stopped");
}
