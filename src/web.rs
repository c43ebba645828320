//! Read-only status surface.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::Extension;
use axum::routing::get;
use serde::Serialize;

/// A point-in-time view of the graph, refreshed by the engine thread.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub nodes: Vec<NodeStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub id: u32,
    pub name: String,
    pub state: String,
    pub driver: bool,
    pub position: u64,
    pub duration: u64,
    pub xrun_count: u32,
    pub cpu_load: [f32; 3],
}

/// Shared handle the engine publishes snapshots into.
#[derive(Clone, Default)]
pub struct Status {
    inner: Arc<Mutex<Snapshot>>,
}

impl Status {
    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    fn read(&self) -> Snapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Run the status server until the process exits.
pub async fn serve(listen: String, status: Status) -> Result<()> {
    let app = Router::new()
        .route("/status", get(get_status))
        .layer(Extension(status));

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(listen, "Status endpoint up");

    axum::serve(listener, app).await?;
    Ok(())
}

#[axum::debug_handler]
async fn get_status(Extension(status): Extension<Status>) -> Json<Snapshot> {
    Json(status.read())
}
