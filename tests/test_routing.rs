//! Route-tree tests: named mounts, path normalisation, and error
//! surfacing for dynamic backends.

mod common;

use std::sync::Arc;

use actix_web::{App, http::StatusCode, middleware, test};
use mcp_stdio_bridge::{GlobalStatus, configure_routes};

macro_rules! dynamic_echo_app {
    () => {{
        let status = Arc::new(GlobalStatus::new());
        let backend = common::unreachable_dynamic_backend("echo", &status);
        test::init_service(
            App::new()
                .wrap(middleware::NormalizePath::trim())
                .configure(configure_routes(status, vec![backend])),
        )
        .await
    }};
}

#[actix_web::test]
async fn unknown_backend_is_not_found() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::get().uri("/servers/nope/sse").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn dynamic_sse_spawn_failure_is_server_error() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::get()
        .uri("/servers/echo/sse")
        .insert_header(("X-Api-Key", "abc123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn mcp_accepts_both_slash_spellings_without_redirect() {
    let app = dynamic_echo_app!();

    // Requests lacking the required Accept header stop at validation, so
    // the handler answers 406 on both spellings; a redirect would show up
    // as a 3xx here instead.
    for uri in [
        "/servers/echo/mcp",
        "/servers/echo/mcp/",
        "/servers/echo/mcp?x=1",
        "/servers/echo/mcp/?x=1",
    ] {
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header(("content-type", "application/json"))
            .set_payload("{}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(
            !resp.status().is_redirection(),
            "{uri} answered with a redirect"
        );
        assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE, "for {uri}");
    }
}

#[actix_web::test]
async fn mcp_subpaths_are_served() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::post()
        .uri("/servers/echo/mcp/deep/path")
        .insert_header(("content-type", "application/json"))
        .set_payload("{}")
        .to_request();
    let resp = test::call_service(&app, req).await;
    // Reaching Accept validation proves the subpath routed to the handler.
    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
}

#[actix_web::test]
async fn mcp_get_without_session_is_unauthorized() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::get()
        .uri("/servers/echo/mcp")
        .insert_header(("accept", "text/event-stream"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn mcp_get_with_unknown_session_is_unauthorized() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::get()
        .uri("/servers/echo/mcp")
        .insert_header(("accept", "text/event-stream"))
        .insert_header(("mcp-session-id", "no-such-session"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn mcp_delete_without_session_is_unauthorized() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::delete()
        .uri("/servers/echo/mcp")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn mcp_rejects_unroutable_methods() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::put().uri("/servers/echo/mcp").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[actix_web::test]
async fn dynamic_backend_has_no_companion_post_mount() {
    let app = dynamic_echo_app!();

    let req = test::TestRequest::post()
        .uri("/servers/echo/messages/?sessionId=whatever")
        .insert_header(("content-type", "application/json"))
        .set_payload(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
