//! Shared helpers for integration tests.
//!
//! Real MCP children cannot be assumed on the test host, so route-level
//! tests use dynamic backends whose spawn is expected to fail: they
//! exercise routing, status accounting, and error surfacing without a
//! live child process.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use mcp_stdio_bridge::{
    Backend, DynamicSpawner, GlobalStatus, HeaderMapping, ProxySource, StdioServerParams,
};

/// Command name that is certain not to resolve on any sane host.
pub const MISSING_COMMAND: &str = "definitely-not-a-real-mcp-server";

/// Stdio parameters pointing at a nonexistent executable.
pub fn unreachable_params() -> StdioServerParams {
    StdioServerParams {
        command: MISSING_COMMAND.to_string(),
        args: vec!["--fast".to_string()],
        env: HashMap::new(),
        cwd: None,
    }
}

/// A dynamic backend named `name` whose per-request spawn always fails.
pub fn unreachable_dynamic_backend(name: &str, status: &Arc<GlobalStatus>) -> Backend {
    let mapping: HeaderMapping = vec![("X-Api-Key".to_string(), "API_KEY".to_string())];
    let spawner = DynamicSpawner::new(name, unreachable_params(), mapping);
    Backend::new(
        Some(name.to_string()),
        ProxySource::Dynamic(Arc::new(spawner)),
        status.clone(),
        false,
    )
}
