//! lci-server: the persistent index server.
//!
//! One instance per project root, found by clients through the derived
//! socket path. Normally auto-spawned by the `lci` CLI; running it
//! directly keeps it in the foreground.

use anyhow::Result;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    lci::server::run(root).await
}

/// Logs go to stderr; `LCI_MCP_MODE` suppresses human logs so only
/// structured output is emitted.
fn init_logging() {
    let mcp_mode = std::env::var("LCI_MCP_MODE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let default_level = if mcp_mode { "error" } else { "info" };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}
