//! Webhook notifier (C8): PUT the build result to the external URL.
//!
//! Grounded on `original_source/notify.go` (`put`): a plain `PUT` with the
//! result JSON-encoded, response body copied back to the log writer, a
//! status outside 200–299 treated as an error. The original hardcodes
//! `InsecureSkipVerify: true` on `https`; here that's a config-gated
//! opt-out (`AppConfig::web_hook_insecure_tls`, default `false`) per the
//! re-architecture note in spec §9.

use dockpack_core::types::BuildResult;
use tokio::sync::mpsc;

use crate::error::{Result, ServerError};

/// PUT `result` to `url`. Any response body is forwarded line-by-line to
/// `sink` (mirroring the original's `io.Copy(w, resp.Body)`), regardless
/// of whether the call ultimately succeeds.
pub async fn notify(
    url: &str,
    result: &BuildResult,
    insecure_tls: bool,
    sink: &mpsc::Sender<String>,
) -> Result<()> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(insecure_tls)
        .build()?;

    let response = client.put(url).json(result).send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !body.is_empty() {
        let _ = sink.send(body.clone()).await;
    }

    if !status.is_success() {
        return Err(ServerError::Webhook(format!(
            "bad status code expected 200 .. 299 got {status}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_2xx_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/hook")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::channel(8);
        let result = BuildResult {
            repo: "demo".into(),
            image_name: "dockpack/demo".into(),
            image_tag: "1_abc".into(),
            procfile: None,
        };

        let url = format!("{}/hook", server.url());
        let outcome = notify(&url, &result, false, &tx).await;
        assert!(outcome.is_err());
        assert_eq!(rx.recv().await.unwrap(), "boom");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn success_forwards_response_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/hook")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let (tx, mut rx) = mpsc::channel(8);
        let result = BuildResult {
            repo: "demo".into(),
            image_name: "dockpack/demo".into(),
            image_tag: "1_abc".into(),
            procfile: None,
        };

        let url = format!("{}/hook", server.url());
        notify(&url, &result, false, &tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "ok");
    }
}
