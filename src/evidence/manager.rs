//! Buffer manager: a cloneable handle feeding a single worker task that owns
//! every rolling buffer.
//!
//! Producers (transport callbacks) only check the frame format, copy the
//! payload and enqueue it. The worker applies messages strictly in arrival
//! order, so an export always sees every frame enqueued before it and none
//! enqueued after it.

use super::error::ExportError;
use super::export::{self, EvidenceFile};
use super::format::FrameFormat;
use super::frame::{AudioFrame, FrameObserver, Participant};
use super::rolling::RollingBuffer;
use super::wav;
use crate::config::EvidenceConfig;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

type ExportCallback = Box<dyn FnOnce(Result<EvidenceFile, ExportError>) + Send + 'static>;

enum ManagerMessage {
    SetRecording(bool),
    Register(u64),
    Unregister(u64),
    SetLocalIdentity(Option<u64>),
    Frame {
        source: Participant,
        format: FrameFormat,
        payload: Vec<u8>,
    },
    Export {
        source: Participant,
        on_complete: ExportCallback,
    },
    Status(oneshot::Sender<ManagerStatus>),
    Shutdown,
}

/// Point-in-time view of the worker state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    pub recording: bool,
    pub monitored: Vec<u64>,
    pub local_identity: Option<u64>,
    pub buffers: Vec<BufferStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub participant: Participant,
    pub live_bytes: usize,
    pub capacity: usize,
    pub duration: Duration,
}

/// Resolves once an export requested through [`BufferManager::report`]
/// has completed.
#[derive(Debug)]
pub struct PendingExport {
    rx: oneshot::Receiver<Result<EvidenceFile, ExportError>>,
}

impl Future for PendingExport {
    type Output = Result<EvidenceFile, ExportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ExportError::Closed)))
    }
}

/// Handle to the buffer worker. Cheap to clone; every method returns
/// immediately.
#[derive(Clone)]
pub struct BufferManager {
    tx: mpsc::UnboundedSender<ManagerMessage>,
    /// Mirror of the worker's recording flag so producers can skip copying
    /// frames while nothing is recorded. The worker's flag is authoritative.
    recording: Arc<AtomicBool>,
    /// Held while storing the hint and enqueueing the toggle, so the last
    /// stored value is also the last one the worker applies.
    toggle: Arc<Mutex<()>>,
    format: FrameFormat,
    downstream: Option<Weak<dyn FrameObserver>>,
}

impl BufferManager {
    pub fn new(config: &EvidenceConfig) -> (Self, BufferWorker) {
        let (tx, rx) = mpsc::unbounded_channel();

        let manager = Self {
            tx,
            recording: Arc::new(AtomicBool::new(false)),
            toggle: Arc::new(Mutex::new(())),
            format: config.format,
            downstream: None,
        };
        let worker = BufferWorker {
            rx,
            window: config.window,
            format: config.format,
            export_dir: config.export_dir.clone(),
            recording: false,
            monitored: HashSet::new(),
            local_identity: None,
            remote: HashMap::new(),
            local: None,
            exports: 0,
        };

        (manager, worker)
    }

    /// Passes every received frame on to `downstream` after buffering,
    /// whether or not the frame was buffered. The observer is not kept alive
    /// by the manager.
    pub fn with_downstream(mut self, downstream: Weak<dyn FrameObserver>) -> Self {
        self.downstream = Some(downstream);
        self
    }

    /// Turning recording off forgets every buffer and registration.
    pub fn set_recording(&self, enabled: bool) {
        let _toggle = self.toggle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.recording.store(enabled, Ordering::Release);
        self.send(ManagerMessage::SetRecording(enabled));
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn register_participant(&self, user_id: u64) {
        self.send(ManagerMessage::Register(user_id));
    }

    /// Stops monitoring `user_id` and frees its buffer.
    pub fn unregister_participant(&self, user_id: u64) {
        self.send(ManagerMessage::Unregister(user_id));
    }

    /// Sets which registered user the local stream belongs to. Local frames
    /// are only buffered while that user is registered.
    pub fn set_local_identity(&self, user_id: Option<u64>) {
        self.send(ManagerMessage::SetLocalIdentity(user_id));
    }

    /// Producer entry point. Returns `true` if the frame was handed to the
    /// worker; the worker may still ignore it if `source` is not monitored.
    pub fn ingest_frame(&self, source: Participant, frame: &AudioFrame<'_>) -> bool {
        if !self.is_recording() {
            return false;
        }
        if frame.format != self.format {
            trace!(format = %frame.format, "Ignoring frame for {} in unexpected format", source);
            return false;
        }
        if frame.payload.is_empty() || !frame.is_aligned() {
            return false;
        }

        self.send(ManagerMessage::Frame {
            source,
            format: frame.format,
            payload: frame.payload.to_vec(),
        })
    }

    /// Writes the current window of `source` to an evidence file and hands
    /// the outcome to `on_complete`. The callback runs on a blocking pool
    /// thread, or inline if the worker is gone.
    pub fn export<F>(&self, source: Participant, on_complete: F)
    where
        F: FnOnce(Result<EvidenceFile, ExportError>) + Send + 'static,
    {
        let message = ManagerMessage::Export {
            source,
            on_complete: Box::new(on_complete),
        };
        if let Err(mpsc::error::SendError(ManagerMessage::Export { on_complete, .. })) =
            self.tx.send(message)
        {
            on_complete(Err(ExportError::Closed));
        }
    }

    pub fn export_participant<F>(&self, user_id: u64, on_complete: F)
    where
        F: FnOnce(Result<EvidenceFile, ExportError>) + Send + 'static,
    {
        self.export(Participant::Remote(user_id), on_complete);
    }

    pub fn export_local<F>(&self, on_complete: F)
    where
        F: FnOnce(Result<EvidenceFile, ExportError>) + Send + 'static,
    {
        self.export(Participant::Local, on_complete);
    }

    /// Future flavour of [`export`](Self::export). The request is queued
    /// now, not when the future is first polled.
    pub fn report(&self, source: Participant) -> PendingExport {
        let (tx, rx) = oneshot::channel();
        self.export(source, move |result| {
            let _ = tx.send(result);
        });
        PendingExport { rx }
    }

    /// `None` once the worker has stopped.
    pub async fn status(&self) -> Option<ManagerStatus> {
        let (tx, rx) = oneshot::channel();
        if !self.send(ManagerMessage::Status(tx)) {
            return None;
        }
        rx.await.ok()
    }

    /// Stops the worker after everything already queued has run.
    pub fn shutdown(&self) {
        self.send(ManagerMessage::Shutdown);
    }

    fn send(&self, message: ManagerMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    fn downstream(&self) -> Option<Arc<dyn FrameObserver>> {
        self.downstream.as_ref().and_then(Weak::upgrade)
    }
}

impl FrameObserver for BufferManager {
    fn on_local_frame(&self, frame: &AudioFrame<'_>) -> bool {
        self.ingest_frame(Participant::Local, frame);
        match self.downstream() {
            Some(downstream) => downstream.on_local_frame(frame),
            None => true,
        }
    }

    fn on_remote_frame(&self, user_id: u64, frame: &AudioFrame<'_>) -> bool {
        self.ingest_frame(Participant::Remote(user_id), frame);
        match self.downstream() {
            Some(downstream) => downstream.on_remote_frame(user_id, frame),
            None => true,
        }
    }
}

/// Sole owner of all buffer state. Run it with `tokio::spawn(worker.run())`.
pub struct BufferWorker {
    rx: mpsc::UnboundedReceiver<ManagerMessage>,
    window: Duration,
    format: FrameFormat,
    export_dir: PathBuf,
    recording: bool,
    monitored: HashSet<u64>,
    local_identity: Option<u64>,
    remote: HashMap<u64, RollingBuffer>,
    local: Option<RollingBuffer>,
    /// Keeps file names unique within this worker
    exports: u64,
}

impl BufferWorker {
    pub async fn run(mut self) {
        info!("Buffer worker started ({:?} window)", self.window);

        while let Some(message) = self.rx.recv().await {
            if !self.handle(message) {
                break;
            }
        }

        self.rx.close();
        while let Ok(message) = self.rx.try_recv() {
            if let ManagerMessage::Export { on_complete, .. } = message {
                on_complete(Err(ExportError::Closed));
            }
        }
        self.reset();

        info!("Buffer worker stopped");
    }

    fn handle(&mut self, message: ManagerMessage) -> bool {
        match message {
            ManagerMessage::SetRecording(enabled) => self.set_recording(enabled),
            ManagerMessage::Register(user_id) => {
                if self.monitored.insert(user_id) {
                    debug!("Monitoring participant {}", user_id);
                }
            }
            ManagerMessage::Unregister(user_id) => self.unregister(user_id),
            ManagerMessage::SetLocalIdentity(user_id) => {
                if self.local_identity != user_id && self.local.take().is_some() {
                    debug!("Local identity changed, discarded local buffer");
                }
                self.local_identity = user_id;
            }
            ManagerMessage::Frame {
                source,
                format,
                payload,
            } => self.buffer_frame(source, format, &payload),
            ManagerMessage::Export {
                source,
                on_complete,
            } => self.export(source, on_complete),
            ManagerMessage::Status(reply) => {
                let _ = reply.send(self.status());
            }
            ManagerMessage::Shutdown => {
                info!("Buffer worker shutting down");
                return false;
            }
        }
        true
    }

    fn set_recording(&mut self, enabled: bool) {
        if enabled {
            if !self.recording {
                info!("Recording started");
            }
            self.recording = true;
        } else {
            if self.recording {
                info!(
                    "Recording stopped, discarding {} buffers",
                    self.remote.len() + usize::from(self.local.is_some())
                );
            }
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.recording = false;
        self.remote.clear();
        self.local = None;
        self.monitored.clear();
    }

    fn unregister(&mut self, user_id: u64) {
        self.monitored.remove(&user_id);
        if self.remote.remove(&user_id).is_some() {
            debug!("Discarded buffer for participant {}", user_id);
        }
        if self.local_identity == Some(user_id) && self.local.take().is_some() {
            debug!("Discarded local buffer for participant {}", user_id);
        }
    }

    fn is_monitored(&self, source: Participant) -> bool {
        match source {
            Participant::Remote(user_id) => self.monitored.contains(&user_id),
            Participant::Local => self
                .local_identity
                .is_some_and(|user_id| self.monitored.contains(&user_id)),
        }
    }

    fn buffer_frame(&mut self, source: Participant, format: FrameFormat, payload: &[u8]) {
        if !self.recording || !self.is_monitored(source) {
            trace!("Ignoring frame for unmonitored {}", source);
            return;
        }
        if format != self.format || payload.is_empty() {
            return;
        }

        let window = self.window;
        let create = || {
            info!("Created rolling buffer for {}", source);
            RollingBuffer::for_window(window, format)
        };
        let buffer = match source {
            Participant::Remote(user_id) => self.remote.entry(user_id).or_insert_with(create),
            Participant::Local => self.local.get_or_insert_with(create),
        };
        push_frame(buffer, source, format, payload);
    }

    fn export(&mut self, source: Participant, on_complete: ExportCallback) {
        let buffer = match source {
            Participant::Remote(user_id) => self.remote.get(&user_id),
            Participant::Local => self.local.as_ref(),
        };
        let Some(buffer) = buffer else {
            debug!("Export requested for {} but nothing is buffered", source);
            on_complete(Err(ExportError::MissingBuffer(source)));
            return;
        };

        let format = buffer.format();
        let pcm = buffer.snapshot();
        let captured_at = Utc::now();
        self.exports += 1;
        let name = export::file_name(&self.file_label(source), captured_at, self.exports);
        let dir = self.export_dir.clone();

        tokio::task::spawn_blocking(move || {
            let path = dir.join(&name);
            let result = wav::encode(format, &pcm)
                .and_then(|bytes| export::write_evidence(&dir, &name, &bytes))
                .map(|path| {
                    info!("Exported {} bytes of {} to {:?}", pcm.len(), source, path);
                    EvidenceFile {
                        path,
                        participant: source,
                        data_bytes: pcm.len(),
                        duration: format.duration_of(pcm.len()),
                        captured_at,
                    }
                })
                .map_err(|e| {
                    error!("Failed to export evidence for {}: {}", source, e);
                    ExportError::io(path, e)
                });
            on_complete(result);
        });
    }

    fn file_label(&self, source: Participant) -> String {
        match (source, self.local_identity) {
            (Participant::Remote(user_id), _) => format!("participant_{}", user_id),
            (Participant::Local, Some(user_id)) => format!("local_{}", user_id),
            (Participant::Local, None) => "local".to_string(),
        }
    }

    fn status(&self) -> ManagerStatus {
        let mut monitored: Vec<u64> = self.monitored.iter().copied().collect();
        monitored.sort_unstable();

        let mut buffers: Vec<BufferStats> = self
            .remote
            .iter()
            .map(|(user_id, buffer)| stats(Participant::Remote(*user_id), buffer))
            .collect();
        buffers.sort_unstable_by_key(|s| match s.participant {
            Participant::Remote(user_id) => user_id,
            Participant::Local => 0,
        });
        if let Some(buffer) = &self.local {
            buffers.push(stats(Participant::Local, buffer));
        }

        ManagerStatus {
            recording: self.recording,
            monitored,
            local_identity: self.local_identity,
            buffers,
        }
    }
}

fn push_frame(buffer: &mut RollingBuffer, source: Participant, format: FrameFormat, payload: &[u8]) {
    if buffer.format() != format {
        debug!("Dropping frame for {}: format changed from {}", source, buffer.format());
        return;
    }
    if !buffer.push(payload) {
        warn!(
            "Dropping {} byte frame for {}: larger than the {} byte window",
            payload.len(),
            source,
            buffer.capacity()
        );
    }
}

fn stats(participant: Participant, buffer: &RollingBuffer) -> BufferStats {
    BufferStats {
        participant,
        live_bytes: buffer.len(),
        capacity: buffer.capacity(),
        duration: buffer.duration(),
    }
}
