use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use clap::Args;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use vigil_core::{Envelope, ItemType};
use vigil_replay::transport::AUTH_HEADER;
use vigil_replay::DecodedSegment;

const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

#[derive(Args)]
pub struct IngestCommand {
    /// Address to bind the ingestion endpoint to
    #[arg(long, default_value = "127.0.0.1:8787", env = "VIGIL_INGEST_ADDRESS")]
    pub address: String,
}

impl IngestCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(serve(&self.address))
    }
}

async fn serve(address: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Ingestion endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, router()).await?;
    info!("Ingestion endpoint exited");
    Ok(())
}

pub fn router() -> Router {
    Router::new().route("/api/{project_id}/envelope/", post(ingest_envelope))
}

fn problem(status: StatusCode, title: &str, detail: impl Into<String>) -> Response {
    let body = json!({
        "type": "about:blank",
        "title": title,
        "status": status.as_u16(),
        "detail": detail.into(),
    });
    (
        status,
        [(header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE)],
        body.to_string(),
    )
        .into_response()
}

async fn ingest_envelope(
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !headers.contains_key(AUTH_HEADER) {
        return problem(
            StatusCode::UNAUTHORIZED,
            "Missing authentication",
            format!("Requests must carry an {} header", AUTH_HEADER),
        );
    }

    let envelope = match Envelope::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Rejecting envelope for project {}: {}", project_id, e);
            return problem(StatusCode::BAD_REQUEST, "Invalid envelope", e.to_string());
        }
    };

    if envelope.item(&ItemType::ReplayEvent).is_none() {
        let event_id = envelope.header().event_id.clone();
        debug!(
            "Project {}: envelope without replay items ({} item(s))",
            project_id,
            envelope.items().count()
        );
        return Json(json!({ "id": event_id })).into_response();
    }

    match DecodedSegment::from_envelope(&envelope) {
        Ok(segment) => {
            info!(
                "Project {}: replay {} segment {} ({} full, {} incremental snapshots)",
                project_id,
                segment.event.replay_id,
                segment.segment_id,
                segment.full_snapshots(),
                segment.incremental_snapshots()
            );
            let event_id = envelope
                .header()
                .event_id
                .clone()
                .unwrap_or_else(|| segment.event.event_id.clone());
            Json(json!({ "id": event_id })).into_response()
        }
        Err(e) => {
            warn!("Rejecting replay segment for project {}: {}", project_id, e);
            problem(StatusCode::BAD_REQUEST, "Invalid replay segment", e.to_string())
        }
    }
}
