use std::{path::PathBuf, process::Output};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{HeraclesError, Result},
    fixture::Fixture,
    runner::until_cancelled,
};

const DOCKER_PROGRAM: &str = "docker";

/// A docker compose project driven through the `docker compose` CLI.
///
/// The same handle is the stack fixture, the lookup used by the compose
/// exporter and the target of container scripts; the pipeline is sequential
/// so it is never used concurrently.
#[derive(Debug, Clone)]
pub struct ComposeStack {
    compose_file: PathBuf,
    project: String,
    remove_images: bool,
}

impl ComposeStack {
    pub fn new(compose_file: impl Into<PathBuf>, remove_images: bool) -> Self {
        Self {
            compose_file: compose_file.into(),
            project: format!("heracles-{}", Uuid::new_v4().simple()),
            remove_images,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Host address (`host:port`) published for `port` of `service`.
    pub async fn service_endpoint(
        &self,
        service: &str,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let args = vec!["port".to_string(), service.to_string(), port.to_string()];
        let output = self.run(args, cancel).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_port_output(&stdout).ok_or_else(|| {
            HeraclesError::Compose(format!(
                "service {service} does not publish port {port}: {:?}",
                stdout.trim()
            ))
        })
    }

    /// Runs `argv` inside `service` without an intermediate shell.
    pub async fn exec(&self, service: &str, argv: &[String], cancel: &CancellationToken) -> Result<()> {
        let output = self.run(exec_args(service, argv), cancel).await?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!(service, "{line}");
        }
        Ok(())
    }

    fn up_args(&self) -> Vec<String> {
        ["up", "--detach", "--wait", "--remove-orphans"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn down_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["down", "--remove-orphans", "--volumes"]
            .into_iter()
            .map(String::from)
            .collect();
        if self.remove_images {
            args.push("--rmi".to_string());
            args.push("all".to_string());
        }
        args
    }

    fn command_args(&self, args: Vec<String>) -> Vec<String> {
        let mut full = vec![
            "compose".to_string(),
            "--file".to_string(),
            self.compose_file.display().to_string(),
            "--project-name".to_string(),
            self.project.clone(),
        ];
        full.extend(args);
        full
    }

    async fn run(&self, args: Vec<String>, cancel: &CancellationToken) -> Result<Output> {
        let subcommand = args.first().cloned().unwrap_or_default();
        let args = self.command_args(args);
        debug!(program = DOCKER_PROGRAM, args = ?args, "running docker compose");

        let mut command = Command::new(DOCKER_PROGRAM);
        command.args(&args).kill_on_drop(true);
        let output = until_cancelled(cancel, async {
            command.output().await.map_err(|err| {
                HeraclesError::Compose(format!("failed to run docker compose {subcommand}: {err}"))
            })
        })
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HeraclesError::Compose(format!(
                "docker compose {subcommand} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }
}

#[async_trait]
impl Fixture for ComposeStack {
    fn name(&self) -> String {
        format!("compose:{}", self.compose_file.display())
    }

    async fn setup(&self, cancel: &CancellationToken) -> Result<()> {
        info!(project = %self.project, file = %self.compose_file.display(), "starting compose stack");
        self.run(self.up_args(), cancel).await?;
        Ok(())
    }

    async fn tear_down(&self, cancel: &CancellationToken) -> Result<()> {
        info!(project = %self.project, "stopping compose stack");
        if let Err(err) = self.run(self.down_args(), cancel).await {
            warn!(project = %self.project, error = %err, "compose stack did not stop cleanly");
            return Err(err);
        }
        Ok(())
    }
}

fn exec_args(service: &str, argv: &[String]) -> Vec<String> {
    let mut args = vec!["exec".to_string(), "-T".to_string(), service.to_string()];
    args.extend(argv.iter().cloned());
    args
}

/// Parses `docker compose port` output, rewriting wildcard binds to loopback.
fn parse_port_output(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    let (host, port) = line.rsplit_once(':')?;
    if port.is_empty() || port == "0" {
        return None;
    }

    let host = match host {
        "" | "0.0.0.0" | "[::]" | "::" => "127.0.0.1",
        other => other,
    };
    Some(format!("{host}:{port}"))
}
