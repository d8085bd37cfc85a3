//! Configuration types consumed by the proxy orchestrator.
//!
//! Parsing these out of CLI arguments or a configuration file is the
//! embedding binary's job; the library only defines the shapes.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Ordered mapping of HTTP header name to environment variable name.
///
/// A backend configured with a non-empty mapping runs in dynamic mode: a
/// fresh child is spawned per request with the mapped headers injected into
/// its environment. Header names are matched case-insensitively per HTTP
/// semantics; environment variable names are emitted exactly as written.
pub type HeaderMapping = Vec<(String, String)>;

/// Verbosity of the proxy, mirroring the common textual log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Everything, including per-frame tracing.
    Debug,
    /// Startup, shutdown, and per-session events.
    #[default]
    Info,
    /// Only anomalies.
    Warning,
    /// Only failures.
    Error,
    /// Alias for [`LogLevel::Error`]; kept for config compatibility.
    Critical,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn tracing_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Settings for the HTTP front of the proxy.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    /// Interface to bind, e.g. `127.0.0.1`.
    pub bind_host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Treat every Streamable HTTP request as an independent exchange
    /// instead of negotiating long-lived sessions.
    #[serde(default)]
    pub stateless: bool,
    /// Origins allowed by CORS. Absent or empty disables the middleware.
    #[serde(default)]
    pub allow_origins: Option<Vec<String>>,
    /// Log verbosity the embedding binary should install.
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Launch parameters for one stdio MCP server.
#[derive(Debug, Clone, Deserialize)]
pub struct StdioServerParams {
    /// Executable to spawn.
    pub command: String,
    /// Arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Base environment for the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child; inherits the proxy's when absent.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl StdioServerParams {
    /// Copy of these parameters with `overrides` laid over the base
    /// environment. Overrides win on collision.
    pub fn with_env_overlay(&self, overrides: HashMap<String, String>) -> Self {
        let mut env = self.env.clone();
        env.extend(overrides);
        Self {
            command: self.command.clone(),
            args: self.args.clone(),
            env,
            cwd: self.cwd.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overlay_prefers_overrides() {
        let params = StdioServerParams {
            command: "server".to_string(),
            args: vec![],
            env: HashMap::from([
                ("KEEP".to_string(), "base".to_string()),
                ("API_KEY".to_string(), "from-config".to_string()),
            ]),
            cwd: None,
        };

        let merged = params.with_env_overlay(HashMap::from([(
            "API_KEY".to_string(),
            "from-header".to_string(),
        )]));

        assert_eq!(merged.env.get("KEEP").map(String::as_str), Some("base"));
        assert_eq!(
            merged.env.get("API_KEY").map(String::as_str),
            Some("from-header")
        );
        assert_eq!(params.env.get("API_KEY").map(String::as_str), Some("from-config"));
    }

    #[test]
    fn empty_overlay_leaves_base_untouched() {
        let params = StdioServerParams {
            command: "server".to_string(),
            args: vec!["--fast".to_string()],
            env: HashMap::from([("A".to_string(), "1".to_string())]),
            cwd: None,
        };
        let merged = params.with_env_overlay(HashMap::new());
        assert_eq!(merged.env, params.env);
        assert_eq!(merged.args, params.args);
    }

    #[test]
    fn log_level_maps_to_tracing_directives() {
        assert_eq!(LogLevel::Debug.tracing_directive(), "debug");
        assert_eq!(LogLevel::Warning.tracing_directive(), "warn");
        assert_eq!(LogLevel::Critical.tracing_directive(), "error");
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
