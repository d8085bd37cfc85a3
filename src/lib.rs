//! # mcp-stdio-bridge
//!
#![warn(missing_docs)]
//! Reverse proxy exposing stdio MCP servers over browser-friendly HTTP
//! transports, built on [actix-web] and the [RMCP SDK][rmcp].
//!
//! Many [Model Context Protocol (MCP)][mcp] tool servers only speak
//! JSON-RPC over stdin/stdout of a spawned process. HTTP clients expect
//! the protocol over Server-Sent Events (plus a companion POST endpoint)
//! or over the newer Streamable HTTP transport. This crate sits in
//! between: it spawns the configured child processes, materialises an MCP
//! session per backend, and relays frames between HTTP clients and the
//! children without inspecting them.
//!
//! [mcp]: https://modelcontextprotocol.io/
//! [rmcp]: https://crates.io/crates/rmcp
//! [actix-web]: https://actix.rs/
//!
//! ## Backend modes
//!
//! - **Static**: the child is spawned once at startup and shared by every
//!   request. The default backend (mounted at the root) and any named
//!   backend without a header mapping work this way.
//! - **Dynamic**: a named backend configured with a header-to-environment
//!   mapping spawns a fresh child per request, with the mapped request
//!   headers injected into the child's environment. The child is
//!   terminated when the request scope ends. Each request pays a full
//!   spawn and handshake; that is the price of per-request environment
//!   isolation.
//!
//! ## HTTP surface
//!
//! | Path | Purpose |
//! |------|---------|
//! | `GET /status` | activity timestamp and backend modes |
//! | `GET /sse`, `POST /messages/` | SSE transport for the default backend |
//! | `/mcp`, `/mcp/...` | Streamable HTTP for the default backend |
//! | `/servers/{name}/...` | the same endpoints per named backend |
//!
//! Trailing slashes are normalised in-band; the proxy never answers with a
//! redirect.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mcp_stdio_bridge::{ProxySettings, StdioServerParams, run_proxy_server};
//!
//! #[actix_web::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ProxySettings {
//!         bind_host: "127.0.0.1".to_string(),
//!         port: 8096,
//!         stateless: false,
//!         allow_origins: None,
//!         log_level: Default::default(),
//!     };
//!     let default_server = StdioServerParams {
//!         command: "uvx".to_string(),
//!         args: vec!["mcp-server-fetch".to_string()],
//!         env: Default::default(),
//!         cwd: None,
//!     };
//!
//!     run_proxy_server(settings, Some(default_server), Vec::new(), Default::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle guarantees
//!
//! - A static backend owns exactly one child for the life of the
//!   application; children are torn down in reverse acquisition order on
//!   shutdown.
//! - A dynamic request owns exactly one child, terminated when the HTTP
//!   request scope unwinds, including on client disconnect.
//! - Dead static children are not restarted; subsequent requests surface
//!   broken-pipe errors until the proxy is restarted.

pub mod backend;
pub mod config;
pub mod error;
pub mod server;
pub mod status;
pub mod transport;

pub use backend::{ProxyHandler, StdioBackend};
pub use config::{HeaderMapping, LogLevel, ProxySettings, StdioServerParams};
pub use error::BridgeError;
pub use server::{Backend, configure_routes, cors_middleware, run_proxy_server};
pub use status::{GlobalStatus, InstanceMode, StatusSnapshot};
pub use transport::{DynamicSpawner, ProxySource, SseService, StreamableHttpService, header_env_vars};
