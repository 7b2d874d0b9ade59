use super::frame::{FrameObserver, Participant, Transport};
use super::manager::{BufferManager, ManagerStatus, PendingExport};
use crate::config::EvidenceConfig;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// One monitored voice session: the buffer worker, its handle, and the
/// transport it is attached to.
pub struct EvidenceSession {
    manager: BufferManager,
    worker: JoinHandle<()>,
    transport: Arc<dyn Transport>,
}

impl EvidenceSession {
    /// Spawns the buffer worker and installs the manager as the transport's
    /// frame observer. Must be called from within a Tokio runtime.
    pub fn start(
        config: &EvidenceConfig,
        transport: Arc<dyn Transport>,
        downstream: Option<Weak<dyn FrameObserver>>,
    ) -> Self {
        let (manager, worker) = BufferManager::new(config);
        let manager = match downstream {
            Some(downstream) => manager.with_downstream(downstream),
            None => manager,
        };
        let worker = tokio::spawn(worker.run());

        transport.configure_capture(config.format);
        transport.configure_playback(config.format);
        transport.set_frame_observer(Some(Arc::new(manager.clone())));

        info!(
            "Evidence session attached ({:?} window, {})",
            config.window, config.format
        );

        Self {
            manager,
            worker,
            transport,
        }
    }

    pub fn manager(&self) -> &BufferManager {
        &self.manager
    }

    pub fn on_session_started(&self) {
        self.manager.set_recording(true);
    }

    pub fn on_session_stopped(&self) {
        self.manager.set_recording(false);
    }

    pub fn on_participant_joined(&self, user_id: u64, is_local: bool) {
        if is_local {
            self.manager.set_local_identity(Some(user_id));
        }
        self.manager.register_participant(user_id);
    }

    pub fn on_participant_left(&self, user_id: u64) {
        self.manager.unregister_participant(user_id);
    }

    pub fn request_report(&self, participant: Participant) -> PendingExport {
        self.manager.report(participant)
    }

    pub async fn status(&self) -> Option<ManagerStatus> {
        self.manager.status().await
    }

    /// Forgets all buffers, detaches from the transport and waits for the
    /// worker to drain.
    pub async fn teardown(self) {
        self.manager.set_recording(false);
        self.transport.set_frame_observer(None);
        self.manager.shutdown();

        if let Err(e) = self.worker.await {
            error!("Buffer worker panicked: {:?}", e);
        }
        info!("Evidence session torn down");
    }
}
