//! Stdio child-process lifecycle and the proxy endpoint that fronts it.
//!
//! A [`StdioBackend`] owns one spawned child and the MCP client session
//! driving its stdin/stdout. The [`ProxyHandler`] is the server-facing half:
//! it pipes every JSON-RPC frame from an HTTP-side session straight to the
//! child's peer without inspecting it.

use std::future::Future;
use std::process::Stdio;

use rmcp::{
    ErrorData,
    model::{ClientNotification, ClientRequest, ServerInfo, ServerResult},
    serve_client,
    service::{
        NotificationContext, Peer, RequestContext, RoleClient, RoleServer, RunningService,
        Service, ServiceError,
    },
    transport::TokioChildProcess,
};
use tokio::process::Command;

use crate::config::StdioServerParams;
use crate::error::BridgeError;

/// One spawned stdio MCP server and the client session driving it.
///
/// The child lives exactly as long as the session: cancelling the session
/// tears the transport down, which kills and reaps the child process.
pub struct StdioBackend {
    service: RunningService<RoleClient, ()>,
}

impl StdioBackend {
    /// Spawn the configured child and complete the MCP initialize handshake.
    pub async fn spawn(params: &StdioServerParams) -> Result<Self, BridgeError> {
        tracing::debug!(command = %params.command, args = ?params.args, "spawning stdio server");

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }

        let transport = TokioChildProcess::new(cmd).map_err(|source| BridgeError::Spawn {
            command: params.command.clone(),
            source,
        })?;
        let service = serve_client((), transport)
            .await
            .map_err(|source| BridgeError::Handshake {
                command: params.command.clone(),
                source,
            })?;

        Ok(Self { service })
    }

    /// Handler that forwards HTTP-side sessions to this child.
    pub fn proxy_handler(&self) -> ProxyHandler {
        let info = self
            .service
            .peer()
            .peer_info()
            .cloned()
            .unwrap_or_default();
        ProxyHandler::new(self.service.peer().clone(), info)
    }

    /// Signal the session to stop without waiting for it.
    pub fn terminate(&self) {
        self.service.cancellation_token().cancel();
    }

    /// Stop the session and wait until the child has been torn down.
    pub async fn shutdown(self) {
        if let Err(e) = self.service.cancel().await {
            tracing::warn!("stdio session did not shut down cleanly: {e}");
        }
    }
}

/// Kills a per-request child when the serving scope unwinds.
///
/// Dropping the guard cancels the session; [`BackendGuard::release`] does
/// the same but waits for the teardown to finish.
pub struct BackendGuard {
    backend: Option<StdioBackend>,
}

impl BackendGuard {
    pub(crate) fn new(backend: StdioBackend) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Orderly termination at the end of a request scope.
    pub async fn release(mut self) {
        if let Some(backend) = self.backend.take() {
            backend.shutdown().await;
        }
    }
}

impl Drop for BackendGuard {
    fn drop(&mut self) {
        if let Some(backend) = &self.backend {
            backend.terminate();
        }
    }
}

/// Server-side MCP endpoint backed by a connected stdio client session.
///
/// Requests and notifications are forwarded verbatim, with two exceptions:
/// the child completed its own handshake at spawn time, so `initialize` is
/// answered locally with the child's advertised info and the paired
/// `initialized` notification is swallowed.
#[derive(Clone)]
pub struct ProxyHandler {
    peer: Peer<RoleClient>,
    info: ServerInfo,
}

impl ProxyHandler {
    pub(crate) fn new(peer: Peer<RoleClient>, info: ServerInfo) -> Self {
        Self { peer, info }
    }
}

impl Service<RoleServer> for ProxyHandler {
    fn handle_request(
        &self,
        request: ClientRequest,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ServerResult, ErrorData>> + Send {
        let peer = self.peer.clone();
        let info = self.info.clone();
        async move {
            match request {
                ClientRequest::InitializeRequest(_) => {
                    Ok(ServerResult::InitializeResult(info))
                }
                request => peer.send_request(request).await.map_err(backend_error),
            }
        }
    }

    fn handle_notification(
        &self,
        notification: ClientNotification,
        _context: NotificationContext<RoleServer>,
    ) -> impl Future<Output = Result<(), ErrorData>> + Send {
        let peer = self.peer.clone();
        async move {
            match notification {
                ClientNotification::InitializedNotification(_) => Ok(()),
                notification => peer
                    .send_notification(notification)
                    .await
                    .map_err(backend_error),
            }
        }
    }

    fn get_info(&self) -> ServerInfo {
        self.info.clone()
    }
}

/// MCP errors from the child pass through untouched; transport failures
/// (broken pipe, dead child) surface as internal errors.
fn backend_error(err: ServiceError) -> ErrorData {
    match err {
        ServiceError::McpError(e) => e,
        other => ErrorData::internal_error(format!("stdio backend error: {other}"), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_reports_missing_executable() {
        let params = StdioServerParams {
            command: "definitely-not-a-real-mcp-server".to_string(),
            args: vec!["--fast".to_string()],
            env: Default::default(),
            cwd: None,
        };

        let err = StdioBackend::spawn(&params)
            .await
            .err()
            .expect("spawning a missing executable must fail");
        assert!(matches!(err, BridgeError::Spawn { .. }), "got {err:?}");
    }

    #[test]
    fn mcp_errors_pass_through_unchanged() {
        let inner = ErrorData::invalid_params("bad arguments", None);
        let mapped = backend_error(ServiceError::McpError(inner.clone()));
        assert_eq!(mapped.code, inner.code);
        assert_eq!(mapped.message, inner.message);
    }
}
