use std::{future::Future, sync::Arc, time::Duration};

use heracles_metrics::{MetricFamilies, parse_text};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{HeraclesError, Result},
    exporter::Exporter,
    fixture::Fixture,
};

/// Resolves `future` unless `cancel` fires first.
pub(crate) async fn until_cancelled<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HeraclesError::Cancelled),
        result = future => result,
    }
}

/// Primary result of a run plus whatever went wrong while tearing down.
#[derive(Debug)]
pub struct RunOutcome<T> {
    pub result: Result<T>,
    pub teardown_errors: Vec<HeraclesError>,
}

/// Sequential pipeline: fixtures up, exporter start, warm-up, scrape,
/// callback, fixtures down.
pub struct Runner {
    exporter: Arc<dyn Exporter>,
    fixtures: Vec<Arc<dyn Fixture>>,
    client: reqwest::Client,
    metrics_path: String,
    wait: Duration,
}

impl Runner {
    pub fn new(
        exporter: Arc<dyn Exporter>,
        fixtures: Vec<Arc<dyn Fixture>>,
        metrics_path: impl Into<String>,
        wait: Duration,
    ) -> Self {
        Self {
            exporter,
            fixtures,
            client: reqwest::Client::new(),
            metrics_path: metrics_path.into(),
            wait,
        }
    }

    /// Sets fixtures up in list order. Returns how many completed setup; on
    /// failure the count covers the fixtures before the failing one.
    pub async fn setup_fixtures(&self, cancel: &CancellationToken) -> (usize, Result<()>) {
        for (index, fixture) in self.fixtures.iter().enumerate() {
            let name = fixture.name();
            debug!(fixture = %name, "setting up fixture");
            if let Err(err) = until_cancelled(cancel, fixture.setup(cancel)).await {
                return (index, Err(err.in_stage(format!("failed to set up fixture {name}"))));
            }
        }
        (self.fixtures.len(), Ok(()))
    }

    /// Tears down the first `ready` fixtures in reverse order. Every fixture is
    /// attempted; failures are collected, never short-circuit.
    pub async fn tear_down_fixtures(
        &self,
        ready: usize,
        cancel: &CancellationToken,
    ) -> Vec<HeraclesError> {
        let mut errors = Vec::new();
        for fixture in self.fixtures.iter().take(ready).rev() {
            let name = fixture.name();
            debug!(fixture = %name, "tearing down fixture");
            if let Err(err) = fixture.tear_down(cancel).await {
                warn!(fixture = %name, error = %err, "failed to tear down fixture");
                errors.push(err.in_stage(format!("failed to tear down fixture {name}")));
            }
        }
        errors
    }

    pub async fn fetch_metric_families(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<MetricFamilies> {
        let url = join_metrics_url(base_url, &self.metrics_path)?;

        let body = until_cancelled(cancel, async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|err| HeraclesError::Fetch(format!("GET {url} failed: {err}")))?;

            let status = response.status();
            info!(url = %url, status = status.as_u16(), "fetched metrics");
            if status != StatusCode::OK {
                return Err(HeraclesError::Fetch(format!("GET {url} returned status {status}")));
            }

            response.text().await.map_err(|err| {
                HeraclesError::Fetch(format!("failed to read response body from {url}: {err}"))
            })
        })
        .await?;

        let families = parse_text(&body)?;
        info!(families = families.len(), "parsed metric families");
        Ok(families)
    }

    pub async fn run<T, F>(&self, cancel: &CancellationToken, callback: F) -> Result<T>
    where
        F: FnOnce(&MetricFamilies) -> Result<T>,
    {
        self.run_detailed(cancel, callback).await.result
    }

    /// Like [`Runner::run`], also handing back teardown failures.
    ///
    /// Teardown always runs with a fresh token so that a cancelled run still
    /// releases what it started.
    pub async fn run_detailed<T, F>(&self, cancel: &CancellationToken, callback: F) -> RunOutcome<T>
    where
        F: FnOnce(&MetricFamilies) -> Result<T>,
    {
        let (ready, setup) = self.setup_fixtures(cancel).await;
        let result = match setup {
            Ok(()) => self.run_stages(cancel, callback).await,
            Err(err) => Err(err.in_stage("setup fixtures")),
        };

        let teardown_errors = self.tear_down_fixtures(ready, &CancellationToken::new()).await;
        if !teardown_errors.is_empty() {
            warn!(
                failures = teardown_errors.len(),
                "fixture teardown finished with errors"
            );
        }

        RunOutcome {
            result,
            teardown_errors,
        }
    }

    async fn run_stages<T, F>(&self, cancel: &CancellationToken, callback: F) -> Result<T>
    where
        F: FnOnce(&MetricFamilies) -> Result<T>,
    {
        let base_url = until_cancelled(cancel, self.exporter.start(cancel))
            .await
            .map_err(|err| err.in_stage("start exporter"))?;
        info!(base_url = %base_url, "exporter started");

        if !self.wait.is_zero() {
            info!(wait = ?self.wait, "waiting for exporter warm-up");
            until_cancelled(cancel, async {
                tokio::time::sleep(self.wait).await;
                Ok::<(), HeraclesError>(())
            })
            .await
            .map_err(|err| err.in_stage("warm-up wait"))?;
        }

        let families = self
            .fetch_metric_families(&base_url, cancel)
            .await
            .map_err(|err| err.in_stage("fetch metrics"))?;

        callback(&families)
    }
}

/// Appends `path` to the path of `base_url` with exactly one separator.
pub fn join_metrics_url(base_url: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|err| HeraclesError::Fetch(format!("invalid exporter url {base_url}: {err}")))?;

    let base_path = url.path().trim_end_matches('/').to_string();
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        url.set_path(&format!("{base_path}/"));
    } else {
        url.set_path(&format!("{base_path}/{path}"));
    }
    Ok(url)
}
