//! Dynamic backend demo: the Brave search server is spawned per request
//! with the API key taken from the `X-Brave-Api-Key` request header.
//!
//! ```bash
//! cargo run --example brave_search_proxy
//!
//! curl -N -H "X-Brave-Api-Key: <your key>" \
//!     http://127.0.0.1:8096/servers/brave/sse
//! ```
//!
//! No child runs until a request arrives, and every request gets its own
//! child with its own environment.

use std::collections::HashMap;

use mcp_stdio_bridge::{LogLevel, ProxySettings, StdioServerParams, run_proxy_server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mcp_stdio_bridge=debug".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ProxySettings {
        bind_host: "127.0.0.1".to_string(),
        port: 8096,
        stateless: true,
        allow_origins: Some(vec!["https://localhost:3000".to_string()]),
        log_level: LogLevel::Info,
    };

    let brave = StdioServerParams {
        command: "npx".to_string(),
        args: vec![
            "-y".to_string(),
            "@modelcontextprotocol/server-brave-search".to_string(),
        ],
        env: Default::default(),
        cwd: None,
    };
    let named_servers = vec![("brave".to_string(), brave)];
    let header_mappings = HashMap::from([(
        "brave".to_string(),
        vec![("X-Brave-Api-Key".to_string(), "BRAVE_API_KEY".to_string())],
    )]);

    run_proxy_server(settings, None, named_servers, header_mappings).await?;
    Ok(())
}
