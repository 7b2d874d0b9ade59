use super::frame::Participant;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An exported WAV snapshot of one participant's rolling window.
#[derive(Debug, Clone)]
pub struct EvidenceFile {
    pub path: PathBuf,
    pub participant: Participant,
    /// Size of the PCM data chunk
    pub data_bytes: usize,
    pub duration: Duration,
    pub captured_at: DateTime<Utc>,
}

/// File name for an export, e.g. `participant_42_20240101_120000_123_3.wav`.
///
/// `sequence` must be unique per writer so two exports within the same
/// millisecond do not collide.
pub fn file_name(label: &str, captured_at: DateTime<Utc>, sequence: u64) -> String {
    format!(
        "{}_{}_{}.wav",
        label,
        captured_at.format("%Y%m%d_%H%M%S_%3f"),
        sequence
    )
}

/// Writes `contents` to a new file in `dir`, creating the directory if needed.
/// Never overwrites an existing file.
pub fn write_evidence(dir: &Path, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    file.write_all(contents)?;
    file.sync_all()?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            file_name("participant_42", at, 3),
            "participant_42_20240309_140507_000_3.wav"
        );
    }

    #[test]
    fn test_write_evidence_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("evidence");

        let path = write_evidence(&dir, "a.wav", b"RIFF").unwrap();
        assert_eq!(path, dir.join("a.wav"));
        assert_eq!(fs::read(&path).unwrap(), b"RIFF");
    }

    #[test]
    fn test_write_evidence_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        write_evidence(tmp.path(), "a.wav", b"first").unwrap();

        let err = write_evidence(tmp.path(), "a.wav", b"second").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(tmp.path().join("a.wav")).unwrap(), b"first");
    }
}
