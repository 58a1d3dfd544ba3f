use anyhow::Context;
use clap::Parser;
use routevn_sync_server::{serve, ProjectGrants, ServerError, SyncServer};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// RouteVN sync server - partitioned command log over WebSocket
#[derive(Parser, Debug)]
#[command(name = "routevn-sync-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9001")]
    addr: SocketAddr,

    /// Grant a user access to a project, as `user:project` (repeatable)
    #[arg(long = "grant", value_name = "USER:PROJECT")]
    grants: Vec<String>,

    /// Authorize every partition for every authenticated user
    #[arg(long)]
    allow_all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let server = if args.allow_all {
        SyncServer::allow_all()
    } else {
        let mut grants = ProjectGrants::new();
        for grant in &args.grants {
            let (user, project) =
                ProjectGrants::parse_grant(grant).ok_or_else(|| ServerError::InvalidGrant(grant.clone()))?;
            grants.insert(user, project);
        }
        if args.grants.is_empty() {
            tracing::warn!("no grants configured; every submission will be forbidden");
        }
        SyncServer::with_grants(grants)
    };

    let listener = TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;

    tracing::info!(addr = %args.addr, allow_all = args.allow_all, grants = args.grants.len(), "sync server listening");

    serve(listener, server).await?;
    Ok(())
}
