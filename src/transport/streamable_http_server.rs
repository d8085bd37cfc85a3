//! Streamable HTTP transport with session management.
//!
//! One scope per backend serves the exact `/mcp` path and every subpath
//! with GET, POST, and DELETE. Trailing-slash handling is done in-band by
//! the application-level path normaliser; no redirect is ever emitted.
//!
//! Static backends run against a long-lived session manager in either
//! stateful or stateless mode. Dynamic backends spawn a child per request
//! and treat the exchange as one-shot: the per-request process cannot carry
//! a session past the response that paid for it.

use std::{sync::Arc, time::Duration};

use actix_web::{
    HttpRequest, HttpResponse, Result,
    error::{ErrorInternalServerError, InternalError},
    http::{
        StatusCode,
        header::{self, CACHE_CONTROL},
    },
    web::{self, Bytes, Data},
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use rmcp::{
    RoleServer,
    model::{ClientJsonRpcMessage, ClientRequest},
    serve_server,
    service::serve_directly,
    transport::{
        OneshotTransport, TransportAdapterIdentity,
        common::http_header::{HEADER_LAST_EVENT_ID, HEADER_SESSION_ID},
        common::server_side_http::{ServerSseMessage, SessionId},
        streamable_http_server::session::{SessionManager, local::LocalSessionManager},
    },
};

use crate::backend::{BackendGuard, ProxyHandler};
use crate::status::GlobalStatus;
use crate::transport::ProxySource;

const HEADER_X_ACCEL_BUFFERING: &str = "X-Accel-Buffering";
const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const JSON_MIME_TYPE: &str = "application/json";

#[derive(Clone)]
struct AppData {
    source: ProxySource,
    status: Arc<GlobalStatus>,
    session_manager: Arc<LocalSessionManager>,
    stateful_mode: bool,
    sse_keep_alive: Option<Duration>,
}

/// Session-manager streams rendered as an SSE response body.
fn sse_stream_response(
    stream: impl Stream<Item = ServerSseMessage> + Send + 'static,
    keep_alive: Option<Duration>,
) -> HttpResponse {
    let sse_stream = async_stream::stream! {
        let mut stream = Box::pin(stream);
        let mut keep_alive_timer = keep_alive.map(|duration| tokio::time::interval(duration));

        loop {
            tokio::select! {
                Some(msg) = stream.next() => {
                    let data = serde_json::to_string(&msg.message)
                        .unwrap_or_else(|_| "{}".to_string());
                    let mut output = String::new();
                    if let Some(id) = msg.event_id {
                        output.push_str(&format!("id: {id}\n"));
                    }
                    output.push_str(&format!("data: {data}\n\n"));
                    yield Ok::<_, actix_web::Error>(Bytes::from(output));
                }
                _ = async {
                    match keep_alive_timer.as_mut() {
                        Some(timer) => {
                            timer.tick().await;
                        }
                        None => {
                            std::future::pending::<()>().await;
                        }
                    }
                } => {
                    yield Ok(Bytes::from(":ping\n\n"));
                }
                else => break,
            }
        }
    };

    HttpResponse::Ok()
        .content_type(EVENT_STREAM_MIME_TYPE)
        .append_header((CACHE_CONTROL, "no-cache"))
        .append_header((HEADER_X_ACCEL_BUFFERING, "no"))
        .streaming(sse_stream)
}

async fn handle_get(req: HttpRequest, app_data: Data<AppData>) -> Result<HttpResponse> {
    app_data.status.touch();

    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok());
    if !accept.is_some_and(|header| header.contains(EVENT_STREAM_MIME_TYPE)) {
        return Ok(HttpResponse::NotAcceptable()
            .body("Not Acceptable: Client must accept text/event-stream"));
    }

    let session_id = req
        .headers()
        .get(HEADER_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned().into());

    let Some(session_id) = session_id else {
        return Ok(HttpResponse::Unauthorized().body("Unauthorized: Session ID is required"));
    };

    tracing::debug!(%session_id, "GET request for standalone SSE stream");

    // Dynamic backends never register sessions here, so their GETs fall
    // through to the not-found arm below.
    let has_session = app_data
        .session_manager
        .has_session(&session_id)
        .await
        .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;

    if !has_session {
        return Ok(HttpResponse::Unauthorized().body("Unauthorized: Session not found"));
    }

    let last_event_id = req
        .headers()
        .get(HEADER_LAST_EVENT_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned());

    let stream: std::pin::Pin<Box<dyn Stream<Item = ServerSseMessage> + Send>> =
        if let Some(last_event_id) = last_event_id {
            tracing::debug!(%session_id, %last_event_id, "resuming stream from last event");
            Box::pin(
                app_data
                    .session_manager
                    .resume(&session_id, last_event_id)
                    .await
                    .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?,
            )
        } else {
            Box::pin(
                app_data
                    .session_manager
                    .create_standalone_stream(&session_id)
                    .await
                    .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?,
            )
        };

    Ok(sse_stream_response(stream, app_data.sse_keep_alive))
}

async fn handle_post(
    req: HttpRequest,
    body: Bytes,
    app_data: Data<AppData>,
) -> Result<HttpResponse> {
    app_data.status.touch();

    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok());
    if !accept.is_some_and(|header| {
        header.contains(JSON_MIME_TYPE) && header.contains(EVENT_STREAM_MIME_TYPE)
    }) {
        return Ok(HttpResponse::NotAcceptable().body(
            "Not Acceptable: Client must accept both application/json and text/event-stream",
        ));
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok());
    if !content_type.is_some_and(|header| header.starts_with(JSON_MIME_TYPE)) {
        return Ok(HttpResponse::UnsupportedMediaType()
            .body("Unsupported Media Type: Content-Type must be application/json"));
    }

    let message: ClientJsonRpcMessage = serde_json::from_slice(&body)
        .map_err(|e| InternalError::new(e, StatusCode::BAD_REQUEST))?;

    tracing::debug!(?message, "POST request with message");

    match &app_data.source {
        ProxySource::Static(handler) => {
            if app_data.stateful_mode {
                handle_stateful_post(&req, handler.clone(), message, app_data.get_ref()).await
            } else {
                handle_oneshot_post(handler.clone(), None, message, app_data.sse_keep_alive)
            }
        }
        ProxySource::Dynamic(_) => {
            let (handler, guard) = app_data.source.acquire(&req).await.map_err(|e| {
                tracing::error!("failed to spawn dynamic backend: {e}");
                ErrorInternalServerError(e)
            })?;
            handle_oneshot_post(handler, guard, message, app_data.sse_keep_alive)
        }
    }
}

/// Stateful flow against the long-lived session manager.
async fn handle_stateful_post(
    req: &HttpRequest,
    handler: ProxyHandler,
    message: ClientJsonRpcMessage,
    app_data: &AppData,
) -> Result<HttpResponse> {
    let session_id = req
        .headers()
        .get(HEADER_SESSION_ID)
        .and_then(|v| v.to_str().ok());

    if let Some(session_id) = session_id {
        let session_id: SessionId = session_id.to_owned().into();
        tracing::debug!(%session_id, "POST request within existing session");

        let has_session = app_data
            .session_manager
            .has_session(&session_id)
            .await
            .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;

        if !has_session {
            tracing::warn!(%session_id, "session not found");
            return Ok(HttpResponse::Unauthorized().body("Unauthorized: Session not found"));
        }

        match message {
            ClientJsonRpcMessage::Request(request_msg) => {
                let stream = app_data
                    .session_manager
                    .create_stream(&session_id, ClientJsonRpcMessage::Request(request_msg))
                    .await
                    .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;

                Ok(sse_stream_response(stream, app_data.sse_keep_alive))
            }
            ClientJsonRpcMessage::Notification(_)
            | ClientJsonRpcMessage::Response(_)
            | ClientJsonRpcMessage::Error(_) => {
                app_data
                    .session_manager
                    .accept_message(&session_id, message)
                    .await
                    .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;

                Ok(HttpResponse::Accepted().finish())
            }
        }
    } else {
        tracing::debug!("POST request without session, creating new session");

        let (session_id, transport) = app_data
            .session_manager
            .create_session()
            .await
            .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;

        tracing::info!(%session_id, "created new session");

        let is_initialize = matches!(
            &message,
            ClientJsonRpcMessage::Request(request_msg)
                if matches!(request_msg.request, ClientRequest::InitializeRequest(_))
        );
        if !is_initialize {
            return Ok(HttpResponse::UnprocessableEntity().body("Expected initialize request"));
        }

        // Serve this session until its transport closes, then drop the
        // manager entry.
        tokio::spawn({
            let session_manager = app_data.session_manager.clone();
            let session_id = session_id.clone();
            async move {
                let service = serve_server::<ProxyHandler, _, _, TransportAdapterIdentity>(
                    handler, transport,
                )
                .await;
                match service {
                    Ok(service) => {
                        let _ = service.waiting().await;
                    }
                    Err(e) => {
                        tracing::error!("failed to serve session: {e}");
                    }
                }
                let _ = session_manager
                    .close_session(&session_id)
                    .await
                    .inspect_err(|e| {
                        tracing::error!("failed to close session {session_id}: {e}");
                    });
            }
        });

        let response = app_data
            .session_manager
            .initialize_session(&session_id, message)
            .await
            .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;

        let sse_stream = async_stream::stream! {
            yield Ok::<_, actix_web::Error>(Bytes::from(format!(
                "data: {}\n\n",
                serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string())
            )));
        };

        Ok(HttpResponse::Ok()
            .content_type(EVENT_STREAM_MIME_TYPE)
            .append_header((CACHE_CONTROL, "no-cache"))
            .append_header((HEADER_X_ACCEL_BUFFERING, "no"))
            .append_header((HEADER_SESSION_ID, session_id.as_ref()))
            .streaming(sse_stream))
    }
}

/// One independent exchange: the request message in, the response stream
/// out, nothing retained. Used for stateless mode and for every dynamic
/// request.
fn handle_oneshot_post(
    handler: ProxyHandler,
    guard: Option<BackendGuard>,
    message: ClientJsonRpcMessage,
    keep_alive: Option<Duration>,
) -> Result<HttpResponse> {
    let ClientJsonRpcMessage::Request(request) = message else {
        return Ok(HttpResponse::UnprocessableEntity().body("Unexpected message type"));
    };

    let (transport, receiver) =
        OneshotTransport::<RoleServer>::new(ClientJsonRpcMessage::Request(request));
    let service_handle = serve_directly(handler, transport, None);

    tokio::spawn(async move {
        let _ = service_handle.waiting().await;
        if let Some(guard) = guard {
            guard.release().await;
        }
    });

    let mut rx = ReceiverStream::new(receiver);
    let sse_stream = async_stream::stream! {
        let mut keep_alive_timer = keep_alive.map(|duration| tokio::time::interval(duration));

        loop {
            tokio::select! {
                Some(message) = rx.next() => {
                    let data = serde_json::to_string(&message)
                        .unwrap_or_else(|_| "{}".to_string());
                    yield Ok::<_, actix_web::Error>(Bytes::from(format!("data: {data}\n\n")));
                }
                _ = async {
                    match keep_alive_timer.as_mut() {
                        Some(timer) => {
                            timer.tick().await;
                        }
                        None => {
                            std::future::pending::<()>().await;
                        }
                    }
                } => {
                    yield Ok(Bytes::from(":ping\n\n"));
                }
                else => break,
            }
        }
    };

    Ok(HttpResponse::Ok()
        .content_type(EVENT_STREAM_MIME_TYPE)
        .append_header((CACHE_CONTROL, "no-cache"))
        .append_header((HEADER_X_ACCEL_BUFFERING, "no"))
        .streaming(sse_stream))
}

async fn handle_delete(req: HttpRequest, app_data: Data<AppData>) -> Result<HttpResponse> {
    app_data.status.touch();

    let session_id = req
        .headers()
        .get(HEADER_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned().into());

    let Some(session_id) = session_id else {
        return Ok(HttpResponse::Unauthorized().body("Unauthorized: Session ID is required"));
    };

    tracing::debug!(%session_id, "DELETE request to close session");

    let has_session = app_data
        .session_manager
        .has_session(&session_id)
        .await
        .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;
    if !has_session {
        return Ok(HttpResponse::Unauthorized().body("Unauthorized: Session not found"));
    }

    app_data
        .session_manager
        .close_session(&session_id)
        .await
        .map_err(|e| InternalError::new(e, StatusCode::INTERNAL_SERVER_ERROR))?;

    tracing::info!(%session_id, "session closed");

    Ok(HttpResponse::NoContent().finish())
}

/// Streamable HTTP front for one backend.
///
/// Mounts `/mcp` (and every subpath) for GET, POST, and DELETE within the
/// enclosing scope.
#[derive(Clone, bon::Builder)]
pub struct StreamableHttpService {
    /// Backend supplying MCP endpoints.
    source: ProxySource,
    /// Process-global activity cell.
    status: Arc<GlobalStatus>,
    /// Whether to negotiate long-lived sessions with clients.
    #[builder(default = true)]
    stateful_mode: bool,
    /// Keep-alive ping interval for response streams.
    sse_keep_alive: Option<Duration>,
    /// Session storage, shared by clones of this service.
    #[builder(skip = Default::default())]
    session_manager: Arc<LocalSessionManager>,
}

impl StreamableHttpService {
    /// Register the `/mcp` routes on `cfg`.
    ///
    /// Both the bare path and any subpath are served; combined with the
    /// application-level trailing-slash normaliser this accepts `/mcp`,
    /// `/mcp/`, and `/mcp/<anything>` without redirecting.
    pub fn configure(self, cfg: &mut web::ServiceConfig) {
        let app_data = Data::new(AppData {
            source: self.source,
            status: self.status,
            session_manager: self.session_manager,
            stateful_mode: self.stateful_mode,
            sse_keep_alive: self.sse_keep_alive,
        });

        cfg.service(
            web::scope("/mcp")
                .app_data(app_data)
                .route("", web::get().to(handle_get))
                .route("", web::post().to(handle_post))
                .route("", web::delete().to(handle_delete))
                .route("/{tail:.*}", web::get().to(handle_get))
                .route("/{tail:.*}", web::post().to(handle_post))
                .route("/{tail:.*}", web::delete().to(handle_delete))
                .default_service(web::route().to(HttpResponse::MethodNotAllowed)),
        );
    }
}
