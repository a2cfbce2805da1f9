use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ctxsnap_server::{build_router, ReportStore};

#[derive(Parser, Debug)]
#[command(name = "ctxsnap-server")]
#[command(about = "Local endpoint that stores context reports and screenshots on disk")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "4590")]
    port: u16,

    /// Directory reports and screenshots are written to
    #[arg(short, long, default_value = "./.ctxsnap/reports")]
    output_dir: PathBuf,

    /// Largest accepted request body, in megabytes
    #[arg(long, default_value = "25")]
    max_body_mb: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("🚀 Starting ctxsnap-server v{}", env!("CARGO_PKG_VERSION"));
    info!("🔧 Port: {}", args.port);
    info!("📁 Output directory: {}", args.output_dir.display());

    let store = ReportStore::open(&args.output_dir).await?;
    let app = build_router(store, args.max_body_mb.saturating_mul(1024 * 1024));

    // loopback only
    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("✅ Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
