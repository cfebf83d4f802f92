//! Long-running services and their lifecycle.

use async_trait::async_trait;
use tokio::sync::broadcast;

pub mod manager;
pub mod price_refresh;
pub mod signals;
pub mod web;

/// A unit of work that runs for the lifetime of the process.
#[async_trait]
pub trait Service: Send {
    /// Name used in logs and the status registry.
    fn name(&self) -> &'static str;

    /// Run until `shutdown` fires, then clean up and return.
    ///
    /// Returning before shutdown is treated as a failure of the process.
    async fn run(&mut self, shutdown: broadcast::Receiver<()>) -> anyhow::Result<()>;
}
