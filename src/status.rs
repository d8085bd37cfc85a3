//! Process-global activity and backend status cell.
//!
//! Every transport-level request touches the cell before any session I/O;
//! the `/status` endpoint serialises a snapshot of it. Handlers never see
//! the underlying map, only [`GlobalStatus::touch`] and
//! [`GlobalStatus::snapshot`].

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// How a backend instance is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceMode {
    /// The default backend, spawned once at startup.
    Configured,
    /// A named backend spawned once at startup.
    Static,
    /// A named backend spawned per request from header-derived environment.
    Dynamic,
}

/// Serialisable view of the status cell, as returned by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// ISO-8601 UTC timestamp of the most recent transport-level request.
    pub api_last_activity: String,
    /// Backend name to serving mode.
    pub server_instances: BTreeMap<String, InstanceMode>,
}

#[derive(Debug)]
struct Inner {
    last_activity: DateTime<Utc>,
    instances: BTreeMap<String, InstanceMode>,
}

/// Lock-protected activity cell shared by every request handler.
#[derive(Debug)]
pub struct GlobalStatus {
    inner: RwLock<Inner>,
}

impl GlobalStatus {
    /// Fresh cell with no registered instances.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                last_activity: Utc::now(),
                instances: BTreeMap::new(),
            }),
        }
    }

    /// Record transport-level activity now.
    pub fn touch(&self) {
        self.inner.write().expect("status lock poisoned").last_activity = Utc::now();
    }

    /// Record how a backend is served.
    pub fn register(&self, name: &str, mode: InstanceMode) {
        self.inner
            .write()
            .expect("status lock poisoned")
            .instances
            .insert(name.to_string(), mode);
    }

    /// Point-in-time copy for serialisation.
    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().expect("status lock poisoned");
        StatusSnapshot {
            api_last_activity: inner
                .last_activity
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            server_instances: inner.instances.clone(),
        }
    }
}

impl Default for GlobalStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn touch_advances_last_activity() {
        let status = GlobalStatus::new();
        let before = status.snapshot().api_last_activity;
        tokio::time::sleep(Duration::from_millis(2)).await;
        status.touch();
        let after = status.snapshot().api_last_activity;
        // RFC 3339 with fixed precision and a trailing `Z` orders
        // lexicographically.
        assert!(after > before, "{after} should be newer than {before}");
    }

    #[test]
    fn snapshot_reports_registered_modes() {
        let status = GlobalStatus::new();
        status.register("default", InstanceMode::Configured);
        status.register("brave", InstanceMode::Dynamic);
        status.register("time", InstanceMode::Static);

        let snapshot = status.snapshot();
        assert_eq!(
            snapshot.server_instances.get("default"),
            Some(&InstanceMode::Configured)
        );
        assert_eq!(
            serde_json::to_value(&snapshot.server_instances).unwrap(),
            serde_json::json!({
                "brave": "dynamic",
                "default": "configured",
                "time": "static",
            })
        );
    }
}
