use anyhow::anyhow;
use futures::future::select_all;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::services::Service;
use crate::state::{ServiceStatus, ServiceStatusRegistry};

/// Spawns registered services and coordinates their shutdown.
pub struct ServiceManager {
    registered: Vec<Box<dyn Service>>,
    running: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
    shutdown_tx: broadcast::Sender<()>,
    statuses: ServiceStatusRegistry,
}

impl ServiceManager {
    pub fn new(statuses: ServiceStatusRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registered: Vec::new(),
            running: Vec::new(),
            shutdown_tx,
            statuses,
        }
    }

    pub fn register_service(&mut self, service: Box<dyn Service>) {
        trace!(service = service.name(), "service registered");
        self.registered.push(service);
    }

    pub fn has_services(&self) -> bool {
        !self.registered.is_empty() || !self.running.is_empty()
    }

    /// Spawn every registered service. Each gets its own shutdown receiver.
    pub fn spawn_all(&mut self) {
        for mut service in self.registered.drain(..) {
            let name = service.name();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let statuses = self.statuses.clone();
            statuses.set(name, ServiceStatus::Starting);

            let handle = tokio::spawn(async move {
                let result = service.run(shutdown_rx).await;
                if let Err(e) = &result {
                    warn!(service = name, error = ?e, "service returned an error");
                    statuses.set(name, ServiceStatus::Error);
                }
                result
            });
            debug!(service = name, "service spawned");
            self.running.push((name, handle));
        }
        info!(count = self.running.len(), "services started");
    }

    /// Resolve when the first running service exits, with its result.
    /// Never resolves if nothing is running.
    pub async fn wait_for_exit(&mut self) -> (&'static str, anyhow::Result<()>) {
        if self.running.is_empty() {
            return std::future::pending().await;
        }

        let (joined, index, rest) =
            select_all(self.running.iter_mut().map(|(_, handle)| handle)).await;
        drop(rest);
        let (name, _) = self.running.remove(index);
        let result = joined.unwrap_or_else(|e| Err(anyhow!("service task panicked: {e}")));
        (name, result)
    }

    /// Signal every service and wait for them to finish within `timeout`.
    ///
    /// Returns the elapsed time, or the names of services still running when
    /// the timeout expired.
    pub async fn shutdown(self, timeout: Duration) -> Result<Duration, Vec<&'static str>> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;
        // No receivers left is fine: every service already exited.
        let _ = self.shutdown_tx.send(());

        let mut pending = Vec::new();
        for (name, handle) in self.running {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(Ok(()))) => debug!(service = name, "service stopped"),
                Ok(Ok(Err(e))) => warn!(service = name, error = ?e, "service stopped with error"),
                Ok(Err(e)) => warn!(service = name, error = %e, "service task panicked"),
                Err(_) => {
                    warn!(service = name, "service did not stop before the deadline");
                    pending.push(name);
                }
            }
        }

        if pending.is_empty() {
            Ok(start.elapsed())
        } else {
            Err(pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Polite;

    #[async_trait]
    impl Service for Polite {
        fn name(&self) -> &'static str {
            "polite"
        }

        async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
            let _ = shutdown.recv().await;
            Ok(())
        }
    }

    struct Quitter;

    #[async_trait]
    impl Service for Quitter {
        fn name(&self) -> &'static str {
            "quitter"
        }

        async fn run(&mut self, _shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
            Err(anyhow!("bind failed"))
        }
    }

    struct Stubborn;

    #[async_trait]
    impl Service for Stubborn {
        fn name(&self) -> &'static str {
            "stubborn"
        }

        async fn run(&mut self, _shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn polite_services_stop_on_signal() {
        let statuses = ServiceStatusRegistry::new();
        let mut manager = ServiceManager::new(statuses.clone());
        manager.register_service(Box::new(Polite));
        manager.spawn_all();

        assert_eq!(statuses.get("polite"), Some(ServiceStatus::Starting));
        assert!(manager.shutdown(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn failing_service_is_reported() {
        let statuses = ServiceStatusRegistry::new();
        let mut manager = ServiceManager::new(statuses.clone());
        manager.register_service(Box::new(Polite));
        manager.register_service(Box::new(Quitter));
        manager.spawn_all();

        let (name, result) = manager.wait_for_exit().await;
        assert_eq!(name, "quitter");
        assert!(result.is_err());
        assert_eq!(statuses.get("quitter"), Some(ServiceStatus::Error));
        assert!(manager.shutdown(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn stubborn_service_is_named_on_timeout() {
        let mut manager = ServiceManager::new(ServiceStatusRegistry::new());
        manager.register_service(Box::new(Stubborn));
        manager.register_service(Box::new(Polite));
        manager.spawn_all();

        let pending = manager
            .shutdown(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(pending, vec!["stubborn"]);
    }
}
