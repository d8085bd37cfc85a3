//! SSE transport: a GET event stream plus a companion POST endpoint.
//!
//! Each SSE connection is one MCP session. The connection handler mints a
//! session id, announces the companion POST path in the initial `endpoint`
//! event, and pumps server frames out as `message` events. Client frames
//! arrive on the companion endpoint correlated by `?sessionId=` and are
//! routed to the owning connection through a shared registry.
//!
//! For dynamic backends the connection handler also owns a freshly spawned
//! child; it is terminated as soon as the session ends, whether by client
//! disconnect or by stream failure.

use std::{collections::HashMap, sync::Arc, time::Duration};

use actix_web::{
    HttpRequest, HttpResponse, Result,
    error::ErrorInternalServerError,
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    web::{self, Bytes, Data, Json, Query},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

use rmcp::{
    RoleServer,
    model::ClientJsonRpcMessage,
    service::{RxJsonRpcMessage, TxJsonRpcMessage, serve_directly_with_ct},
    transport::common::server_side_http::{DEFAULT_AUTO_PING_INTERVAL, SessionId, session_id},
};

use crate::status::GlobalStatus;
use crate::transport::ProxySource;

const HEADER_X_ACCEL_BUFFERING: &str = "X-Accel-Buffering";

type TxStore =
    Arc<tokio::sync::RwLock<HashMap<SessionId, tokio::sync::mpsc::Sender<ClientJsonRpcMessage>>>>;

#[derive(Clone)]
struct AppData {
    source: ProxySource,
    status: Arc<GlobalStatus>,
    txs: TxStore,
    sse_path: Arc<str>,
    post_path: Arc<str>,
    sse_ping_interval: Duration,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostQuery {
    session_id: String,
}

async fn post_message_handler(
    app_data: Data<AppData>,
    query: Query<PostQuery>,
    message: Json<ClientJsonRpcMessage>,
) -> Result<HttpResponse> {
    app_data.status.touch();

    let session_id = &query.session_id;
    tracing::debug!(session_id, "client message");

    let tx = {
        let rg = app_data.txs.read().await;
        rg.get(session_id.as_str())
            .ok_or_else(|| actix_web::error::ErrorNotFound("Session not found"))?
            .clone()
    };

    if tx.send(message.into_inner()).await.is_err() {
        tracing::warn!(session_id, "session channel closed");
        return Err(actix_web::error::ErrorGone("Session closed"));
    }

    Ok(HttpResponse::Accepted().finish())
}

async fn sse_handler(app_data: Data<AppData>, req: HttpRequest) -> Result<HttpResponse> {
    app_data.status.touch();

    let (handler, backend_guard) = app_data.source.acquire(&req).await.map_err(|e| {
        tracing::error!("failed to acquire backend for sse connection: {e}");
        ErrorInternalServerError(e)
    })?;

    let session = session_id();
    tracing::info!(%session, "sse connection");

    let (from_client_tx, from_client_rx) = tokio::sync::mpsc::channel(64);
    let (to_client_tx, to_client_rx) = tokio::sync::mpsc::channel(64);
    let to_client_tx_clone = to_client_tx.clone();

    app_data
        .txs
        .write()
        .await
        .insert(session.clone(), from_client_tx);

    let transport = SseSessionTransport {
        stream: ReceiverStream::new(from_client_rx),
        sink: PollSender::new(to_client_tx),
        session_id: session.clone(),
        tx_store: app_data.txs.clone(),
    };

    // One MCP session per connection. The guard, when present, owns a
    // per-request child that must outlive the session and no longer.
    actix_rt::spawn(async move {
        let server = serve_directly_with_ct(
            handler,
            transport,
            None,
            tokio_util::sync::CancellationToken::new(),
        );
        if let Err(e) = server.waiting().await {
            tracing::error!("sse session ended with error: {e}");
        }
        if let Some(guard) = backend_guard {
            guard.release().await;
        }
    });

    // The companion POST path is announced relative to the current mount so
    // backends nested under /servers/{name} resolve within their own scope.
    let current_path = req.path();
    let sse_endpoint = &app_data.sse_path;
    let path_prefix = if current_path.ends_with(sse_endpoint.as_ref()) {
        &current_path[..current_path.len() - sse_endpoint.len()]
    } else {
        current_path
    };
    let endpoint = format!("{}{}/", path_prefix, app_data.post_path);

    let ping_interval = app_data.sse_ping_interval;
    let session_for_stream = session.clone();
    let sse_stream = async_stream::stream! {
        yield Ok::<_, actix_web::Error>(Bytes::from(format!(
            "event: endpoint\ndata: {endpoint}?sessionId={session_for_stream}\n\n"
        )));

        let mut ping_interval = tokio::time::interval(ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut rx = ReceiverStream::new(to_client_rx);
        loop {
            tokio::select! {
                Some(message) = rx.next() => {
                    match serde_json::to_string(&message) {
                        Ok(json) => {
                            yield Ok(Bytes::from(format!("event: message\ndata: {json}\n\n")));
                        }
                        Err(e) => {
                            tracing::error!("failed to serialize message: {e}");
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    yield Ok(Bytes::from(": ping\n\n"));
                }
                else => break,
            }
        }
    };

    // Deregister the session once the client goes away.
    let app_data_cleanup = app_data.clone();
    let session_for_cleanup = session.clone();
    actix_rt::spawn(async move {
        to_client_tx_clone.closed().await;
        app_data_cleanup
            .txs
            .write()
            .await
            .remove(&session_for_cleanup);
        tracing::debug!(%session_for_cleanup, "sse session cleaned up");
    });

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header((HEADER_X_ACCEL_BUFFERING, "no"))
        .streaming(sse_stream))
}

/// Transport for one SSE client connection.
///
/// Pairs the companion-POST receive channel with the event-stream send
/// channel so the MCP service loop sees an ordinary duplex transport.
struct SseSessionTransport {
    stream: ReceiverStream<RxJsonRpcMessage<RoleServer>>,
    sink: PollSender<TxJsonRpcMessage<RoleServer>>,
    session_id: SessionId,
    tx_store: TxStore,
}

impl Sink<TxJsonRpcMessage<RoleServer>> for SseSessionTransport {
    type Error = std::io::Error;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.sink
            .poll_ready_unpin(cx)
            .map_err(std::io::Error::other)
    }

    fn start_send(
        mut self: std::pin::Pin<&mut Self>,
        item: TxJsonRpcMessage<RoleServer>,
    ) -> Result<(), Self::Error> {
        self.sink
            .start_send_unpin(item)
            .map_err(std::io::Error::other)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.sink
            .poll_flush_unpin(cx)
            .map_err(std::io::Error::other)
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        let inner_close_result = self
            .sink
            .poll_close_unpin(cx)
            .map_err(std::io::Error::other);
        if inner_close_result.is_ready() {
            let session_id = self.session_id.clone();
            let tx_store = self.tx_store.clone();
            tokio::spawn(async move {
                tx_store.write().await.remove(&session_id);
            });
        }
        inner_close_result
    }
}

impl Stream for SseSessionTransport {
    type Item = RxJsonRpcMessage<RoleServer>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

/// SSE front for one backend.
///
/// Mounts a GET event-stream route and, for static backends, the companion
/// POST route. Dynamic backends follow the upstream route layout and omit
/// the companion mount.
#[derive(Clone, bon::Builder)]
pub struct SseService {
    /// Backend supplying MCP endpoints.
    source: ProxySource,
    /// Process-global activity cell.
    status: Arc<GlobalStatus>,
    /// Path of the SSE endpoint within the mount.
    #[builder(default = "/sse".to_string())]
    sse_path: String,
    /// Path of the companion POST endpoint within the mount.
    #[builder(default = "/messages".to_string())]
    post_path: String,
    /// Keep-alive ping interval; the SDK default when unset.
    sse_keep_alive: Option<Duration>,
    /// Session registry shared between the SSE and POST endpoints.
    #[builder(skip = Default::default())]
    shared_txs: TxStore,
}

impl SseService {
    /// Register this service's routes on `cfg`.
    ///
    /// Cloned instances share their session registry, so the same service
    /// may be registered from every HTTP worker.
    pub fn configure(self, cfg: &mut web::ServiceConfig) {
        let mount_post = self.source.is_static();
        let app_data = Data::new(AppData {
            source: self.source,
            status: self.status,
            txs: self.shared_txs,
            sse_path: self.sse_path.clone().into(),
            post_path: self.post_path.clone().into(),
            sse_ping_interval: self.sse_keep_alive.unwrap_or(DEFAULT_AUTO_PING_INTERVAL),
        });

        cfg.app_data(app_data);
        cfg.route(&self.sse_path, web::get().to(sse_handler));
        if mount_post {
            cfg.route(&self.post_path, web::post().to(post_message_handler));
        }
    }
}
