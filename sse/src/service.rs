use crate::error::{Error, Result, SseErrorKind};
use crate::hub::{Hub, HubConfig, HubStats, HubStatus};
use crate::message::BroadcastMessage;
use log::*;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
    hub: Arc<Hub>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub status: HubStatus,
    pub running: bool,
    pub stats: Option<HubStats>,
}

/// Owns the current hub and lets it be started and stopped at runtime.
///
/// Every hub runs under a child of `root`, so cancelling `root` stops the
/// current hub and disconnects its clients.
pub struct SseService {
    config: HubConfig,
    root: CancellationToken,
    current: RwLock<Option<Running>>,
}

impl SseService {
    pub fn new(config: HubConfig, root: CancellationToken) -> Self {
        Self {
            config,
            root,
            current: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Token that parents each client of the running hub.
    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Creates and runs a fresh hub.
    pub fn start(&self) -> Result<Arc<Hub>> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|running| running.hub.is_running())
        {
            return Err(SseErrorKind::ServiceAlreadyRunning.into());
        }

        let hub = Arc::new(Hub::new(self.config.clone()));
        let handle = hub.run(self.root.child_token())?;
        *current = Some(Running {
            hub: Arc::clone(&hub),
            handle,
        });

        info!("SSE service started");
        Ok(hub)
    }

    /// Shuts the current hub down and waits for its event loop to finish.
    pub async fn stop(&self) -> Result<()> {
        let running = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::new(SseErrorKind::ServiceNotRunning))?;

        running.hub.shutdown();
        if let Err(e) = running.handle.await {
            error!("SSE hub event loop ended abnormally: {e}");
        }

        info!("SSE service stopped");
        Ok(())
    }

    /// The running hub, if any.
    pub fn hub(&self) -> Option<Arc<Hub>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|running| running.hub.is_running())
            .map(|running| Arc::clone(&running.hub))
    }

    pub fn is_running(&self) -> bool {
        self.hub().is_some()
    }

    pub fn status(&self) -> ServiceStatus {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(running) => {
                let stats = running.hub.stats();
                ServiceStatus {
                    status: stats.status,
                    running: stats.status == HubStatus::Running,
                    stats: Some(stats),
                }
            }
            None => ServiceStatus {
                status: HubStatus::Stopped,
                running: false,
                stats: None,
            },
        }
    }

    pub fn broadcast(&self, message: BroadcastMessage) -> Result<()> {
        self.hub()
            .ok_or_else(|| Error::new(SseErrorKind::ServiceNotRunning))?
            .broadcast(message)
    }
}
