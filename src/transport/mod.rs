//! HTTP transports pairing actix-web requests with MCP sessions.
//!
//! Two fronts are provided per backend: an SSE endpoint with a companion
//! POST path ([`sse_server`]) and a Streamable HTTP endpoint
//! ([`streamable_http_server`]). Both obtain their MCP endpoint through a
//! [`ProxySource`], which either hands out sessions against one shared
//! child or spawns a fresh child per request with header-derived
//! environment variables.

pub mod sse_server;
pub mod streamable_http_server;

pub use sse_server::SseService;
pub use streamable_http_server::StreamableHttpService;

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;

use crate::backend::{BackendGuard, ProxyHandler, StdioBackend};
use crate::config::{HeaderMapping, StdioServerParams};
use crate::error::BridgeError;

/// Environment variables extracted from request headers according to
/// `mapping`.
///
/// Header names match case-insensitively per HTTP semantics; environment
/// variable names keep the exact case the mapping supplies. Missing and
/// empty headers are omitted rather than set to an empty string.
pub fn header_env_vars(headers: &HeaderMap, mapping: &HeaderMapping) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for (header_name, env_name) in mapping {
        let value = headers
            .get(header_name.as_str())
            .and_then(|v| v.to_str().ok());
        if let Some(value) = value
            && !value.is_empty()
        {
            tracing::debug!(header = %header_name, env = %env_name, "mapped header to environment variable");
            vars.insert(env_name.clone(), value.to_owned());
        }
    }
    vars
}

/// Spawns a fresh child per request, overlaying header-derived variables on
/// the configured base environment.
pub struct DynamicSpawner {
    server_name: String,
    params: StdioServerParams,
    mapping: HeaderMapping,
}

impl DynamicSpawner {
    /// Spawner for the named backend.
    pub fn new(
        server_name: impl Into<String>,
        params: StdioServerParams,
        mapping: HeaderMapping,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            params,
            mapping,
        }
    }

    async fn acquire(&self, req: &HttpRequest) -> Result<(ProxyHandler, BackendGuard), BridgeError> {
        let header_env = header_env_vars(req.headers(), &self.mapping);
        tracing::info!(
            server = %self.server_name,
            header_env_vars = header_env.len(),
            "spawning dynamic stdio server"
        );
        let params = self.params.with_env_overlay(header_env);
        let backend = StdioBackend::spawn(&params).await?;
        let handler = backend.proxy_handler();
        Ok((handler, BackendGuard::new(backend)))
    }
}

/// Where a transport obtains its MCP endpoint for one request.
#[derive(Clone)]
pub enum ProxySource {
    /// One shared child, spawned at startup and reused by every request.
    Static(ProxyHandler),
    /// A fresh child per request; terminated when the request scope ends.
    Dynamic(Arc<DynamicSpawner>),
}

impl ProxySource {
    /// Resolve the endpoint serving `req`. The guard, when present, owns a
    /// per-request child and must live until the session is over.
    pub(crate) async fn acquire(
        &self,
        req: &HttpRequest,
    ) -> Result<(ProxyHandler, Option<BackendGuard>), BridgeError> {
        match self {
            ProxySource::Static(handler) => Ok((handler.clone(), None)),
            ProxySource::Dynamic(spawner) => {
                let (handler, guard) = spawner.acquire(req).await?;
                Ok((handler, Some(guard)))
            }
        }
    }

    pub(crate) fn is_static(&self) -> bool {
        matches!(self, ProxySource::Static(_))
    }
}
