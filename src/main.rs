//! Mirra CLI

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mirra::behavior::BehaviorMode;
use mirra::config::Config;
use mirra::fingerprint::{fingerprint, RequestFingerprint};
use mirra::network::ProxyServer;
use mirra::proxy::ResolutionEngine;
use mirra::response::IGNORE_BROKEN_CHARS;
use mirra::storage::{DiskStore, ResponseStore};

#[derive(Parser)]
#[command(name = "mirra", version, about = "Record-and-replay proxy for HTTP/GraphQL APIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the proxy
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured behavior mode
        #[arg(short, long)]
        behavior: Option<BehaviorMode>,
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List stored fingerprints
    List {
        /// Cache directory path segments
        #[arg(long, num_args = 1.., default_value = "responses")]
        cache_dir: Vec<String>,
    },
    /// Delete stored responses and prune the query log
    Delete {
        /// Cache directory path segments
        #[arg(long, num_args = 1.., default_value = "responses")]
        cache_dir: Vec<String>,
        /// Fingerprints to delete
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Stop warning about replacement characters in a stored response
    IgnoreBrokenChars {
        /// Cache directory path segments
        #[arg(long, num_args = 1.., default_value = "responses")]
        cache_dir: Vec<String>,
        /// Fingerprint of the response
        id: String,
    },
    /// Print the fingerprint of a request
    Fingerprint {
        /// Path and query of the request
        url: String,
        /// Request body
        #[arg(long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Serve {
            config,
            behavior,
            port,
        } => serve(config, behavior, port).await,
        Command::List { cache_dir } => {
            let store = DiskStore::new(cache_dir.as_slice());
            let mut ids = store.list_ids();
            ids.sort();
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }
        Command::Delete { cache_dir, ids } => {
            let ids = parse_ids(&ids)?;
            let store = DiskStore::new(cache_dir.as_slice());
            for id in &ids {
                store.delete(id);
            }
            store.prune_log(&ids);
            Ok(())
        }
        Command::IgnoreBrokenChars { cache_dir, id } => {
            let id = RequestFingerprint::parse(&id)?;
            let store = DiskStore::new(cache_dir.as_slice());
            let mut meta = store.get_meta(&id);
            meta.set(IGNORE_BROKEN_CHARS, true);
            store.save_meta(&id, &meta);
            Ok(())
        }
        Command::Fingerprint { url, body } => {
            println!("{}", fingerprint(Some(&url), body.as_deref())?);
            Ok(())
        }
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    behavior: Option<BehaviorMode>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(behavior) = behavior {
        config.settings.proxy_behavior = behavior;
    }
    if let Some(port) = port {
        config.listen_port = port;
    }
    config.validate()?;

    tracing::info!(
        "Proxying {}:{} with {}",
        config.settings.source_host,
        config.settings.source_port,
        config.settings.proxy_behavior
    );

    let engine = Arc::new(ResolutionEngine::from_config(&config)?);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let server = ProxyServer::bind(addr, engine).await?;
    server.run().await?;
    Ok(())
}

fn parse_ids(raw: &[String]) -> Result<Vec<RequestFingerprint>> {
    raw.iter()
        .map(|id| RequestFingerprint::parse(id).map_err(anyhow::Error::from))
        .collect()
}
