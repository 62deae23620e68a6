//! Thin HTTP surface (spec §7 health reporting, §4.3 bootstrap snapshot).
//!
//! Everything else under spec §1's "REST/WebSocket HTTP surface" is out of
//! scope; this module exists only for the two operational endpoints the
//! core subsystems themselves depend on.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::{Position, Trader};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Per-component health board (spec §7): every independent task reports
/// into this registry; the health endpoint reads a point-in-time copy.
#[derive(Default)]
pub struct HealthRegistry {
    components: RwLock<HashMap<String, ComponentHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_healthy(&self, component: &str) {
        self.components.write().insert(
            component.to_string(),
            ComponentHealth { status: ComponentStatus::Healthy, last_error: None },
        );
    }

    pub fn set_degraded(&self, component: &str, error: impl Into<String>) {
        self.components.write().insert(
            component.to_string(),
            ComponentHealth { status: ComponentStatus::Degraded, last_error: Some(error.into()) },
        );
    }

    pub fn set_unhealthy(&self, component: &str, error: impl Into<String>) {
        self.components.write().insert(
            component.to_string(),
            ComponentHealth { status: ComponentStatus::Unhealthy, last_error: Some(error.into()) },
        );
    }

    pub fn snapshot(&self) -> HashMap<String, ComponentHealth> {
        self.components.read().clone()
    }
}

async fn health_handler(State(registry): State<Arc<HealthRegistry>>) -> Json<HashMap<String, ComponentHealth>> {
    Json(registry.snapshot())
}

pub fn health_router(registry: Arc<HealthRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(registry)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub traders: Vec<Trader>,
    pub positions: Vec<Position>,
}

async fn snapshot_handler(State(store): State<Arc<DocumentStore>>) -> Json<SnapshotPayload> {
    let traders = store.active_traders().unwrap_or_default();
    let positions = store.latest_positions().unwrap_or_default();
    Json(SnapshotPayload { traders, positions })
}

/// The Scraper's synchronous bootstrap endpoint (spec §4.3): a freshly
/// started Signal System calls this once before subscribing to the bus.
pub fn snapshot_router(store: Arc<DocumentStore>) -> Router {
    Router::new()
        .route("/snapshot", get(snapshot_handler))
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty_and_records_transitions() {
        let registry = HealthRegistry::new();
        assert!(registry.snapshot().is_empty());
        registry.set_healthy("ws_ingest");
        registry.set_degraded("leaderboard_poller", "fetch timed out");
        let snap = registry.snapshot();
        assert_eq!(snap["ws_ingest"].status, ComponentStatus::Healthy);
        assert_eq!(snap["leaderboard_poller"].status, ComponentStatus::Degraded);
        assert_eq!(snap["leaderboard_poller"].last_error.as_deref(), Some("fetch timed out"));
    }
}
