//! Expose `@modelcontextprotocol/server-everything` over SSE and
//! Streamable HTTP.
//!
//! ```bash
//! cargo run --example everything_proxy
//!
//! curl http://127.0.0.1:8096/status
//! curl -N http://127.0.0.1:8096/sse
//! ```

use mcp_stdio_bridge::{LogLevel, ProxySettings, StdioServerParams, run_proxy_server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = ProxySettings {
        bind_host: "127.0.0.1".to_string(),
        port: 8096,
        stateless: false,
        allow_origins: None,
        log_level: LogLevel::Debug,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "info,mcp_stdio_bridge={}",
                    settings.log_level.tracing_directive()
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let default_server = StdioServerParams {
        command: "npx".to_string(),
        args: vec![
            "-y".to_string(),
            "@modelcontextprotocol/server-everything".to_string(),
        ],
        env: Default::default(),
        cwd: None,
    };

    run_proxy_server(settings, Some(default_server), Vec::new(), Default::default()).await?;
    Ok(())
}
