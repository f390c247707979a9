use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{HeraclesError, Result},
    fixture::compose::ComposeStack,
    runner::until_cancelled,
};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Yields the base URL of the service whose metrics get scraped.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn start(&self, cancel: &CancellationToken) -> Result<String>;
}

/// Exporter already running outside managed infrastructure.
#[derive(Debug, Clone)]
pub struct ExternalExporter {
    base_url: String,
}

impl ExternalExporter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Exporter for ExternalExporter {
    async fn start(&self, _cancel: &CancellationToken) -> Result<String> {
        Ok(self.base_url.clone())
    }
}

/// Exporter running as a service of a compose stack.
#[derive(Debug, Clone)]
pub struct ComposeExporter {
    stack: Arc<ComposeStack>,
    service: String,
    port: u16,
    startup_timeout: Duration,
}

impl ComposeExporter {
    pub fn new(
        stack: Arc<ComposeStack>,
        service: impl Into<String>,
        port: u16,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            stack,
            service: service.into(),
            port,
            startup_timeout,
        }
    }
}

#[async_trait]
impl Exporter for ComposeExporter {
    async fn start(&self, cancel: &CancellationToken) -> Result<String> {
        let endpoint = self
            .stack
            .service_endpoint(&self.service, self.port, cancel)
            .await
            .map_err(|err| {
                HeraclesError::Exporter(format!(
                    "failed to locate service {}: {err}",
                    self.service
                ))
            })?;

        info!(service = %self.service, endpoint = %endpoint, "waiting for exporter port");
        wait_for_port(&endpoint, self.startup_timeout, cancel).await?;
        Ok(format!("http://{endpoint}"))
    }
}

/// Polls a TCP connect to `address` until it succeeds or `timeout` elapses.
pub async fn wait_for_port(
    address: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let poll = async {
        loop {
            match TcpStream::connect(address).await {
                Ok(_) => return Ok::<(), HeraclesError>(()),
                Err(err) => {
                    debug!(address, error = %err, "exporter port not reachable yet");
                    tokio::time::sleep(READINESS_POLL_INTERVAL).await;
                }
            }
        }
    };

    match tokio::time::timeout(timeout, until_cancelled(cancel, poll)).await {
        Ok(result) => result,
        Err(_) => Err(HeraclesError::Exporter(format!(
            "{address} was not reachable within {timeout:?}"
        ))),
    }
}
