pub mod compose;
pub mod script;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A resource that must be set up before the scrape and released after it.
#[async_trait]
pub trait Fixture: Send + Sync {
    fn name(&self) -> String;

    async fn setup(&self, cancel: &CancellationToken) -> Result<()>;

    async fn tear_down(&self, cancel: &CancellationToken) -> Result<()>;
}
