pub mod error;
pub mod export;
pub mod format;
pub mod frame;
pub mod manager;
pub mod rolling;
pub mod session;
pub mod wav;

pub use error::ExportError;
pub use export::EvidenceFile;
pub use format::FrameFormat;
pub use frame::{AudioFrame, FrameObserver, Participant, Transport};
pub use manager::{BufferManager, BufferStats, BufferWorker, ManagerStatus, PendingExport};
pub use rolling::RollingBuffer;
pub use session::EvidenceSession;
