//! Shared application state and router for the internal build endpoint
//! (C6). Grounded on the teacher's `AppState`-plus-`State`-extractor axum
//! wiring (`mcp-server`/`mcp-agent-mail` route modules).

use std::sync::Arc;

use axum::Router;
use axum::routing::any;
use dockpack_core::workspace::RepoWorkspace;
use dockpack_docker::BuildConfig;
use tower_http::trace::TraceLayer;

use crate::handler::handle_push;

/// Everything the `PUT /` handler needs, built once at supervisor startup
/// and shared across requests behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub workspace: RepoWorkspace,
    pub build_config: BuildConfig,
    /// `None` disables webhook notification (spec §6).
    pub web_hook_url: Option<String>,
    pub web_hook_insecure_tls: bool,
}

/// Build the axum router. A single route accepts any HTTP method on `/`
/// (spec §6: "any method accepted"), matching the hook script's plain
/// `curl -X PUT`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(handle_push))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use dockpack_docker::BuildConfig;
    use tower::ServiceExt;

    fn test_state(workspace_dir: std::path::PathBuf) -> Arc<AppState> {
        Arc::new(AppState {
            workspace: RepoWorkspace::new(workspace_dir.clone()),
            build_config: BuildConfig {
                build_image: "gliderlabs/herokuish".into(),
                build_image_tag: "latest".into(),
                pull_credentials: None,
                push_credentials: None,
                image_namespace: "dockpack".into(),
                workspace_dir,
                testing: true,
            },
            web_hook_url: None,
            web_hook_insecure_tls: false,
        })
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path().to_path_buf()));

        let response = app
            .oneshot(
                Request::put("/")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn any_method_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path().to_path_buf()));

        let body = serde_json::json!({"repo": "demo", "ref": "abc123"}).to_string();
        let response = app
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
