use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rookery::prelude::*;

/// Chess session server: WebSocket on `--bind`, HTTP fallback on
/// `--http-bind`.
#[derive(Debug, Parser)]
#[command(name = "chess-server", version)]
struct Args {
    /// WebSocket listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// HTTP fallback listen address. Disabled when omitted.
    #[arg(long)]
    http_bind: Option<String>,

    /// Keep snapshots and the audit trail on disk under this directory.
    /// Everything stays in memory when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds an unattached session stays in memory.
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,
}

impl Args {
    fn builder(&self) -> RookeryServerBuilder {
        let mut builder = RookeryServer::builder()
            .bind(&self.bind)
            .session_config(SessionConfig {
                idle_timeout: Duration::from_secs(self.idle_timeout_secs),
                ..SessionConfig::default()
            });
        if let Some(addr) = &self.http_bind {
            builder = builder.http_bind(addr);
        }
        builder
    }
}

#[tokio::main]
async fn main() -> Result<(), RookeryError> {
    rookery::init_tracing("info");
    let args = Args::parse();

    match &args.data_dir {
        Some(dir) => {
            let store = FileStore::open(dir.join("snapshots")).await?;
            let audit = JsonlAuditLog::open(dir.join("audit")).await?;
            tracing::info!(data_dir = %dir.display(), "using file-backed storage");
            let server = args.builder().build(ChessRules, store, audit).await?;
            tracing::info!(addr = ?server.local_addr(), http = ?server.http_addr(), "chess server ready");
            server.run().await
        }
        None => {
            tracing::info!("using in-memory storage");
            let server = args
                .builder()
                .build(ChessRules, MemoryStore::new(), MemoryAuditLog::new())
                .await?;
            tracing::info!(addr = ?server.local_addr(), http = ?server.http_addr(), "chess server ready");
            server.run().await
        }
    }
}
