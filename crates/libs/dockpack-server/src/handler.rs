//! Internal build endpoint (C6): receives the hook's callback and drives
//! the build orchestrator, streaming its log lines back as the response
//! body.
//!
//! Grounded on `original_source/main.go::handleApp`/`flushWriter`, which
//! flushed the HTTP response after every write so the hook's `tee` saw
//! output as it happened. Axum's chunked transfer-encoding already
//! flushes each item produced by a streamed `Body`, so bridging an
//! `mpsc` channel into `Body::from_stream` reproduces that behaviour
//! without a manual flush call.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dockpack_core::hook::BUILD_ERROR_PREFIX;
use dockpack_core::types::{PushRequest, RepoName};
use dockpack_docker::{BuildConfig, BuildOrchestrator};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::app::AppState;
use crate::webhook;

/// `PUT /` (any method, spec §6). The request is validated synchronously;
/// the build itself runs on a spawned task so the response can start
/// streaming immediately, mirroring the original's `http.Flusher`-driven
/// handler which wrote the "starting build" line before the build began.
pub async fn handle_push(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PushRequest>,
) -> Response {
    let (tx, rx) = mpsc::channel::<String>(64);

    tokio::spawn(run_build(state, req, tx));

    let body_stream = ReceiverStream::new(rx).map(|line| {
        Ok::<_, std::io::Error>(axum::body::Bytes::from(format!("{line}\n")))
    });
    (StatusCode::OK, Body::from_stream(body_stream)).into_response()
}

async fn run_build(state: Arc<AppState>, req: PushRequest, tx: mpsc::Sender<String>) {
    let _ = tx
        .send(format!(
            "starting build for repo {} ref {}",
            req.repo, req.git_ref
        ))
        .await;

    let repo = match RepoName::parse(&req.repo) {
        Ok(repo) => repo,
        Err(e) => {
            let _ = tx.send(format!("{BUILD_ERROR_PREFIX} - {e}")).await;
            return;
        }
    };

    let build_config = BuildConfig {
        workspace_dir: state.workspace.root().to_path_buf(),
        ..state.build_config.clone()
    };

    let orchestrator = match BuildOrchestrator::new(build_config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            let _ = tx.send(format!("{BUILD_ERROR_PREFIX} - {e}")).await;
            return;
        }
    };

    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    match orchestrator
        .run(tx.clone(), &repo, &req.git_ref, unix_seconds)
        .await
    {
        Ok(result) => {
            info!(repo = %repo, tag = %result.image_tag, "build succeeded");
            if let Some(url) = &state.web_hook_url {
                // A failed webhook is logged but never fails the push
                // (spec §4.6, §7 WebhookFailure).
                if let Err(e) =
                    webhook::notify(url, &result, state.web_hook_insecure_tls, &tx).await
                {
                    error!(error = %e, "webhook notification failed");
                }
            }
        }
        Err(e) => {
            error!(error = %e, "build failed");
            let _ = tx.send(format!("{BUILD_ERROR_PREFIX} - {e}")).await;
        }
    }
}
