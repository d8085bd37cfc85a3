//! End-to-end slice over a real socket with a real HTTP client.

mod common;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, middleware};
use mcp_stdio_bridge::{GlobalStatus, InstanceMode, configure_routes};

#[actix_web::test]
async fn status_and_dynamic_error_over_real_http() {
    let status = Arc::new(GlobalStatus::new());
    status.register("echo", InstanceMode::Dynamic);
    let backend = common::unreachable_dynamic_backend("echo", &status);

    let server = HttpServer::new({
        let status = status.clone();
        move || {
            App::new()
                .wrap(middleware::NormalizePath::trim())
                .configure(configure_routes(status.clone(), vec![backend.clone()]))
        }
    })
    .bind("127.0.0.1:0")
    .expect("failed to bind test server");

    let addr = *server.addrs().first().unwrap();
    let server_handle = server.run();
    let server_task = tokio::spawn(async move {
        let _ = server_handle.await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let body: serde_json::Value = client
        .get(format!("{base}/status"))
        .send()
        .await
        .expect("status request failed")
        .json()
        .await
        .expect("status body was not json");
    assert_eq!(body["server_instances"]["echo"], "dynamic");

    // A dynamic backend whose executable is missing surfaces the spawn
    // failure to the caller and leaves the rest of the app serving.
    let resp = client
        .get(format!("{base}/servers/echo/sse"))
        .send()
        .await
        .expect("sse request failed");
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let resp = client
        .get(format!("{base}/status"))
        .send()
        .await
        .expect("status request failed");
    assert!(resp.status().is_success());

    server_task.abort();
}
