//! CORS behaviour for configured origins.

mod common;

use std::sync::Arc;

use actix_web::{
    App,
    dev::Service as _,
    http::{Method, header},
    middleware, test,
};
use mcp_stdio_bridge::{GlobalStatus, configure_routes, cors_middleware};

const ALLOWED_ORIGIN: &str = "https://a.example";

macro_rules! cors_app {
    () => {{
        let status = Arc::new(GlobalStatus::new());
        let backend = common::unreachable_dynamic_backend("echo", &status);
        test::init_service(
            App::new()
                .wrap(cors_middleware(&[ALLOWED_ORIGIN.to_string()]))
                .wrap(middleware::NormalizePath::trim())
                .configure(configure_routes(status, vec![backend])),
        )
        .await
    }};
}

#[actix_web::test]
async fn preflight_allows_configured_origin() {
    let app = cors_app!();

    let req = test::TestRequest::with_uri("/servers/echo/mcp")
        .method(Method::OPTIONS)
        .insert_header((header::ORIGIN, ALLOWED_ORIGIN))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    let allow_origin = resp
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .and_then(|v| v.to_str().ok());
    assert_eq!(allow_origin, Some(ALLOWED_ORIGIN));
}

#[actix_web::test]
async fn preflight_withholds_header_for_unknown_origin() {
    let app = cors_app!();

    let req = test::TestRequest::with_uri("/servers/echo/mcp")
        .method(Method::OPTIONS)
        .insert_header((header::ORIGIN, "https://b.example"))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
        .to_request();

    // The middleware may reject either with an error response or a
    // service error; the allow-origin header must be absent in both.
    let headers = match app.call(req).await {
        Ok(resp) => resp.response().headers().clone(),
        Err(err) => err.error_response().headers().clone(),
    };
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[actix_web::test]
async fn simple_request_is_echoed_with_allow_origin() {
    let app = cors_app!();

    let req = test::TestRequest::get()
        .uri("/status")
        .insert_header((header::ORIGIN, ALLOWED_ORIGIN))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let allow_origin = resp
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .and_then(|v| v.to_str().ok());
    assert_eq!(allow_origin, Some(ALLOWED_ORIGIN));
}
