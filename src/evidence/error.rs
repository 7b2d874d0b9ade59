use super::frame::Participant;
use std::path::PathBuf;

/// Why an evidence export produced no file.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Nothing has been buffered for this participant (never spoke, not
    /// monitored, or already unregistered).
    #[error("no audio buffered for {0}")]
    MissingBuffer(Participant),

    #[error("failed to write evidence file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The buffer worker has shut down.
    #[error("buffer manager is no longer running")]
    Closed,
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
