//! Build orchestrator (C7): drives one container-based build end to end.
//!
//! Grounded on `original_source/build.go` (pull/create/upload/start/
//! stream/wait against `fsouza/go-dockerclient` over a Unix socket),
//! reimplemented against `bollard`, using the pull-image and
//! `bollard::container::Config`/`CreateContainerOptions` idioms from the
//! pack's Docker-orchestration reference
//! (`examples/other_examples/...pantsbuild-pants...docker.rs`). The cache
//! save/commit/push/Procfile steps (§4.7 steps 7–10) have no counterpart
//! in `build.go` — they're this spec's "richest version" consolidation,
//! grounded directly on spec prose (see DESIGN.md).

use std::path::{Path, PathBuf};

use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, DownloadFromContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::image::{
    CommitContainerOptions, CreateImageOptions, PushImageOptions, RemoveImageOptions,
};
use bollard::service::CreateImageInfo;
use dockpack_core::types::{BuildResult, RepoName, image_tag, parse_procfile};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{DockerError, Result};

/// Everything the orchestrator needs, loaded once from `AppConfig` at
/// supervisor startup and handed down per build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub build_image: String,
    pub build_image_tag: String,
    pub pull_credentials: Option<DockerCredentials>,
    pub push_credentials: Option<DockerCredentials>,
    pub image_namespace: String,
    pub workspace_dir: PathBuf,
    /// `DOCKPACK_ENV=testing` skips the registry push (spec §4.7 step 9).
    pub testing: bool,
}

/// A line of build output, sent over an unbounded-in-flight channel so the
/// orchestrator never buffers the full log in memory — the caller (C6)
/// drains and forwards each line as it arrives.
pub type LogSender = mpsc::Sender<String>;

pub struct BuildOrchestrator {
    docker: Docker,
    config: BuildConfig,
}

impl BuildOrchestrator {
    pub fn new(config: BuildConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, config })
    }

    async fn log(&self, sink: &LogSender, line: impl Into<String>) {
        let line = line.into();
        info!(%line, "build log");
        // A closed receiver (client disconnected) is not a build failure;
        // the build still runs to completion per spec §5 cancellation.
        let _ = sink.send(line).await;
    }

    /// Run the full ten-step build for `(repo, git_ref)`, started at
    /// `unix_seconds` (injected so the image tag is deterministic and
    /// testable rather than reading the clock inline).
    pub async fn run(
        &self,
        sink: LogSender,
        repo: &RepoName,
        git_ref: &str,
        unix_seconds: i64,
    ) -> Result<BuildResult> {
        let container_name = format!("{repo}_{git_ref}");
        let tag = image_tag(unix_seconds, git_ref);
        let image_name = format!("{}/{}", self.config.image_namespace, repo);

        let outcome = self
            .run_inner(&sink, repo, git_ref, &container_name, &image_name, &tag)
            .await;

        self.remove_container(&container_name).await;

        outcome
    }

    async fn run_inner(
        &self,
        sink: &LogSender,
        repo: &RepoName,
        git_ref: &str,
        container_name: &str,
        image_name: &str,
        tag: &str,
    ) -> Result<BuildResult> {
        // 1. PullImage
        self.log(sink, format!("-----> pulling {}:{}", self.config.build_image, self.config.build_image_tag)).await;
        self.pull_image().await?;

        // 2. CreateContainer
        self.log(sink, format!("-----> creating container {container_name}")).await;
        self.create_container(container_name).await?;

        // 3. UploadInputs
        self.log(sink, "-----> uploading sources").await;
        let tar_path = self.config.workspace_dir.join(format!("{repo}_{git_ref}.tar"));
        self.upload_inputs(container_name, repo, &tar_path).await?;

        // 4. Start
        self.log(sink, "-----> starting build").await;
        self.docker
            .start_container::<String>(container_name, None)
            .await
            .map_err(DockerError::from)?;

        // 5. StreamLogs
        self.stream_logs(sink, container_name).await?;

        // 6. Wait
        let status_code = self.wait_container(container_name).await?;
        if status_code != 0 {
            return Err(DockerError::Step(format!(
                "build container finished with status code: {status_code}"
            )));
        }
        self.log(sink, "-----> build succeeded").await;

        // 7. SaveCache
        self.log(sink, "-----> saving build cache").await;
        self.save_cache(container_name, repo).await?;

        // 8. Commit
        self.log(sink, format!("-----> committing {image_name}:{tag}")).await;
        let commit_outcome = self.commit_image(container_name, image_name, tag).await;

        // The committed image must be force-removed on every exit path from
        // here, success or failure (spec §4.7 step 8, §3 ownership summary).
        let push_outcome = match &commit_outcome {
            Ok(()) => {
                // 9. Push
                if self.config.testing {
                    self.log(sink, "Test, skipping push").await;
                    Ok(())
                } else {
                    self.log(sink, format!("-----> pushing {image_name}:{tag}")).await;
                    self.push_image(image_name, tag).await
                }
            }
            Err(e) => Err(DockerError::Step(e.to_string())),
        };

        self.remove_local_image(image_name, tag).await;
        commit_outcome?;
        push_outcome?;

        // 10. ParseProcfile
        let procfile = self.parse_procfile(repo).await;

        Ok(BuildResult {
            repo: repo.to_string(),
            image_name: image_name.to_string(),
            image_tag: tag.to_string(),
            procfile,
        })
    }

    async fn pull_image(&self) -> Result<()> {
        let from_image = self.config.build_image.clone();
        let tag = self.config.build_image_tag.clone();
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .create_image(Some(options), None, self.config.pull_credentials.clone());

        while let Some(event) = stream.next().await {
            match event? {
                CreateImageInfo { error: Some(error), .. } => {
                    return Err(DockerError::Step(format!("failed to pull image: {error}")));
                }
                _ => continue,
            }
        }
        Ok(())
    }

    async fn create_container(&self, container_name: &str) -> Result<()> {
        let image = format!("{}:{}", self.config.build_image, self.config.build_image_tag);
        let config = ContainerConfig {
            image: Some(image),
            cmd: Some(vec!["/build".to_string()]),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: container_name,
            platform: None,
        };
        self.docker.create_container(Some(options), config).await?;
        Ok(())
    }

    async fn upload_inputs(&self, container_name: &str, repo: &RepoName, tar_path: &Path) -> Result<()> {
        let tar_bytes = tokio::fs::read(tar_path).await?;

        // Keep a host-side clone for Procfile parsing (step 10) — the
        // container owns the only *uploaded* copy once this step finishes.
        let clone_dir = self.config.workspace_dir.join(format!("{repo}_clone"));
        if let Err(e) = extract_tar(&tar_bytes, &clone_dir) {
            warn!(repo = %repo, error = %e, "unable to extract source clone for Procfile parsing");
        }

        self.docker
            .upload_to_container(
                container_name,
                Some(UploadToContainerOptions {
                    path: "/tmp/build".to_string(),
                    ..Default::default()
                }),
                tar_bytes.into(),
            )
            .await?;

        let cache_tar_path = self.config.workspace_dir.join(format!("{repo}_cache.tar"));
        if cache_tar_path.exists() {
            let cache_bytes = tokio::fs::read(&cache_tar_path).await?;
            self.docker
                .upload_to_container(
                    container_name,
                    Some(UploadToContainerOptions {
                        path: "/tmp/".to_string(),
                        ..Default::default()
                    }),
                    cache_bytes.into(),
                )
                .await?;
        }

        tokio::fs::remove_file(tar_path).await?;
        Ok(())
    }

    async fn stream_logs(&self, sink: &LogSender, container_name: &str) -> Result<()> {
        let mut stream = self.docker.logs(
            container_name,
            Some(LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        while let Some(chunk) = stream.next().await {
            let output = chunk?;
            let text = match output {
                LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                    String::from_utf8_lossy(&message).into_owned()
                }
                LogOutput::Console { message } => String::from_utf8_lossy(&message).into_owned(),
                LogOutput::StdIn { .. } => continue,
            };
            for line in text.lines() {
                self.log(sink, line.to_string()).await;
            }
        }
        Ok(())
    }

    async fn wait_container(&self, container_name: &str) -> Result<i64> {
        let mut stream = self
            .docker
            .wait_container(container_name, None::<WaitContainerOptions<String>>);

        let mut status_code = 0;
        while let Some(response) = stream.next().await {
            status_code = response?.status_code;
        }
        Ok(status_code)
    }

    async fn save_cache(&self, container_name: &str, repo: &RepoName) -> Result<()> {
        let cache_tar_path = self.config.workspace_dir.join(format!("{repo}_cache.tar"));
        if cache_tar_path.exists() {
            tokio::fs::remove_file(&cache_tar_path).await?;
        }

        let mut stream = self.docker.download_from_container(
            container_name,
            Some(DownloadFromContainerOptions { path: "/tmp/cache".to_string() }),
        );

        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        tokio::fs::write(&cache_tar_path, bytes).await?;
        Ok(())
    }

    async fn commit_image(&self, container_name: &str, image_name: &str, tag: &str) -> Result<()> {
        let options = CommitContainerOptions {
            container: container_name.to_string(),
            repo: image_name.to_string(),
            tag: tag.to_string(),
            author: "dockpack".to_string(),
            comment: "build committed by dockpack".to_string(),
            ..Default::default()
        };
        let config = ContainerConfig {
            cmd: Some(vec!["/start".to_string(), "web".to_string()]),
            ..Default::default()
        };
        self.docker.commit_container(options, config).await?;
        Ok(())
    }

    async fn push_image(&self, image_name: &str, tag: &str) -> Result<()> {
        let options = PushImageOptions { tag: tag.to_string() };
        let mut stream = self.docker.push_image(
            image_name,
            Some(options),
            self.config.push_credentials.clone(),
        );

        while let Some(event) = stream.next().await {
            let info = event?;
            if let Some(error) = info.error {
                return Err(DockerError::Step(format!("failed to push image: {error}")));
            }
        }
        Ok(())
    }

    async fn remove_local_image(&self, image_name: &str, tag: &str) {
        let full = format!("{image_name}:{tag}");
        let options = RemoveImageOptions { force: true, ..Default::default() };
        if let Err(e) = self.docker.remove_image(&full, Some(options), None).await {
            warn!(image = %full, error = %e, "unable to remove local committed image");
        }
    }

    async fn remove_container(&self, container_name: &str) {
        let options = RemoveContainerOptions { force: true, ..Default::default() };
        if let Err(e) = self.docker.remove_container(container_name, Some(options)).await {
            warn!(container = %container_name, error = %e, "unable to remove build container");
        }
    }

    async fn parse_procfile(&self, repo: &RepoName) -> Option<dockpack_core::types::Procfile> {
        let path = self
            .config
            .workspace_dir
            .join(format!("{repo}_clone"))
            .join("Procfile");
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let procfile = parse_procfile(&contents);
                if procfile.is_empty() { None } else { Some(procfile) }
            }
            Err(e) => {
                warn!(repo = %repo, error = %e, "no Procfile found, proceeding without one");
                None
            }
        }
    }
}

fn extract_tar(bytes: &[u8], dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(bytes);
    archive.unpack(dest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn extract_tar_writes_files_into_dest() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("src.tar");

        {
            let file = std::fs::File::create(&tar_path).unwrap();
            let mut builder = tar::Builder::new(file);
            let mut header = tar::Header::new_gnu();
            header.set_size(9);
            header.set_cksum();
            builder.append_data(&mut header, "Procfile", "web: run\n".as_bytes()).unwrap();
            builder.finish().unwrap();
        }

        let bytes = std::fs::read(&tar_path).unwrap();
        let dest = dir.path().join("extracted");
        extract_tar(&bytes, &dest).unwrap();

        assert!(dest.join("Procfile").exists());
    }
}
