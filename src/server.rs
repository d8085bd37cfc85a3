//! Route assembly and the proxy orchestrator.
//!
//! [`run_proxy_server`] is the application entry point: it spawns every
//! static child, builds the route tree (`/status`, the default backend at
//! the root, named backends under `/servers/{name}`), installs CORS when
//! configured, and drives the HTTP server. When the server exits, static
//! children are torn down in reverse acquisition order.

use std::collections::HashMap;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{
    App, HttpResponse, HttpServer, middleware,
    web::{self, Data},
};

use crate::backend::StdioBackend;
use crate::config::{HeaderMapping, ProxySettings, StdioServerParams};
use crate::error::BridgeError;
use crate::status::{GlobalStatus, InstanceMode};
use crate::transport::{DynamicSpawner, ProxySource, SseService, StreamableHttpService};

/// One mounted backend: where it lives in the route tree and the transport
/// services fronting it.
///
/// Clones share session registries, so the same set of backends can be
/// handed to every HTTP worker.
#[derive(Clone)]
pub struct Backend {
    name: Option<String>,
    sse: SseService,
    streamable: StreamableHttpService,
}

impl Backend {
    /// Backend mounted at the root (`name` = `None`) or under
    /// `/servers/{name}`.
    pub fn new(
        name: Option<String>,
        source: ProxySource,
        status: Arc<GlobalStatus>,
        stateless: bool,
    ) -> Self {
        let sse = SseService::builder()
            .source(source.clone())
            .status(status.clone())
            .build();
        let streamable = StreamableHttpService::builder()
            .source(source)
            .status(status)
            .stateful_mode(!stateless)
            .build();
        Self {
            name,
            sse,
            streamable,
        }
    }

    fn configure(&self, cfg: &mut web::ServiceConfig) {
        self.sse.clone().configure(cfg);
        self.streamable.clone().configure(cfg);
    }
}

async fn handle_status(status: Data<GlobalStatus>) -> HttpResponse {
    HttpResponse::Ok().json(status.snapshot())
}

/// Register `/status` and every backend's routes on an app or scope.
///
/// The default backend lands at the current level; named backends are
/// nested under `/servers/{name}`.
pub fn configure_routes(
    status: Arc<GlobalStatus>,
    backends: Vec<Backend>,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(Data::from(status));
        cfg.route("/status", web::get().to(handle_status));

        for backend in &backends {
            match &backend.name {
                None => backend.configure(cfg),
                Some(name) => {
                    cfg.service(
                        web::scope(&format!("/servers/{name}"))
                            .configure(|scope_cfg| backend.configure(scope_cfg)),
                    );
                }
            }
        }
    }
}

/// CORS middleware allowing the configured origins with all methods and
/// headers.
pub fn cors_middleware(allow_origins: &[String]) -> Cors {
    let mut cors = Cors::default().allow_any_method().allow_any_header();
    for origin in allow_origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

/// Run stdio backend(s) behind an HTTP front until the server exits.
///
/// `named_servers` preserves configuration order; a name present in
/// `header_mappings` with a non-empty mapping is served dynamically (one
/// child per request), every other backend is spawned once up front.
///
/// Returns [`BridgeError::NoServersConfigured`] without binding a socket
/// when no backend is supplied at all.
pub async fn run_proxy_server(
    settings: ProxySettings,
    default_server: Option<StdioServerParams>,
    named_servers: Vec<(String, StdioServerParams)>,
    header_mappings: HashMap<String, HeaderMapping>,
) -> Result<(), BridgeError> {
    if default_server.is_none() && named_servers.is_empty() {
        tracing::error!("no stdio servers configured to run");
        return Err(BridgeError::NoServersConfigured);
    }

    let status = Arc::new(GlobalStatus::new());
    let mut static_backends: Vec<StdioBackend> = Vec::new();

    let backends = match build_backends(
        &settings,
        &default_server,
        &named_servers,
        &header_mappings,
        &status,
        &mut static_backends,
    )
    .await
    {
        Ok(backends) => backends,
        Err(e) => {
            unwind_static(static_backends).await;
            return Err(e);
        }
    };

    let result = serve(&settings, &default_server, &named_servers, status, backends).await;

    // Master scope unwind: newest acquisition goes first.
    unwind_static(static_backends).await;
    result
}

async fn build_backends(
    settings: &ProxySettings,
    default_server: &Option<StdioServerParams>,
    named_servers: &[(String, StdioServerParams)],
    header_mappings: &HashMap<String, HeaderMapping>,
    status: &Arc<GlobalStatus>,
    static_backends: &mut Vec<StdioBackend>,
) -> Result<Vec<Backend>, BridgeError> {
    let mut backends = Vec::new();

    if let Some(params) = default_server {
        tracing::info!(command = %params.command, args = ?params.args, "setting up default server");
        let backend = StdioBackend::spawn(params).await?;
        let source = ProxySource::Static(backend.proxy_handler());
        static_backends.push(backend);
        backends.push(Backend::new(None, source, status.clone(), settings.stateless));
        status.register("default", InstanceMode::Configured);
    }

    for (name, params) in named_servers {
        match header_mappings.get(name).filter(|mapping| !mapping.is_empty()) {
            Some(mapping) => {
                tracing::info!(
                    server = %name,
                    command = %params.command,
                    headers = mapping.len(),
                    "setting up dynamic named server"
                );
                let spawner = DynamicSpawner::new(name.clone(), params.clone(), mapping.clone());
                backends.push(Backend::new(
                    Some(name.clone()),
                    ProxySource::Dynamic(Arc::new(spawner)),
                    status.clone(),
                    settings.stateless,
                ));
                status.register(name, InstanceMode::Dynamic);
            }
            None => {
                tracing::info!(server = %name, command = %params.command, "setting up static named server");
                let backend = StdioBackend::spawn(params).await?;
                let source = ProxySource::Static(backend.proxy_handler());
                static_backends.push(backend);
                backends.push(Backend::new(
                    Some(name.clone()),
                    source,
                    status.clone(),
                    settings.stateless,
                ));
                status.register(name, InstanceMode::Static);
            }
        }
    }

    Ok(backends)
}

async fn unwind_static(mut backends: Vec<StdioBackend>) {
    while let Some(backend) = backends.pop() {
        backend.shutdown().await;
    }
}

async fn serve(
    settings: &ProxySettings,
    default_server: &Option<StdioServerParams>,
    named_servers: &[(String, StdioServerParams)],
    status: Arc<GlobalStatus>,
    backends: Vec<Backend>,
) -> Result<(), BridgeError> {
    let allow_origins = settings.allow_origins.clone().unwrap_or_default();
    let cors_enabled = !allow_origins.is_empty();

    let factory = move || {
        App::new()
            .wrap(middleware::Condition::new(
                cors_enabled,
                cors_middleware(&allow_origins),
            ))
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes(status.clone(), backends.clone()))
    };

    let addr = format!("{}:{}", settings.bind_host, settings.port);
    let server = HttpServer::new(factory)
        .bind(&addr)
        .map_err(|source| BridgeError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let base_url = format!("http://{addr}");
    let mut sse_urls = Vec::new();
    if default_server.is_some() {
        sse_urls.push(format!("{base_url}/sse"));
    }
    sse_urls.extend(
        named_servers
            .iter()
            .map(|(name, _)| format!("{base_url}/servers/{name}/sse")),
    );
    if !sse_urls.is_empty() {
        tracing::info!("serving MCP servers via SSE:");
        for url in &sse_urls {
            tracing::info!("  - {url}");
        }
    }

    tracing::info!(%addr, "application lifespan starting");
    let result = server.run().await;
    tracing::info!("application lifespan shutting down");
    result.map_err(BridgeError::Serve)
}
