//! Overflow artifact scanner
//!
//! When dump-on-overflow is on, the device writes one artifact per overflow
//! event into a directory, named `<prefix>.<timestamp>`. Each artifact header
//! carries the stream and task id of the overflowing kernel, which the
//! session maps back to an operator name.

use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt};
use hashbrown::HashMap;

/// Byte offset of the header inside an artifact
pub const HEADER_OFFSET: u64 = 313;
/// Bytes read from the header
pub const HEADER_LEN: u64 = 256;

const STREAM_ID_OFFSET: u64 = 8;
const TASK_ID_OFFSET: u64 = 16;

/// `(stream id, task id)` to operator name
pub type TaskMap = HashMap<(u64, u64), String>;

/// Finds operators that overflowed since the last scan
#[derive(Debug, Clone)]
pub struct OverflowScanner {
    dir: PathBuf,
    last_timestamp: u64,
}

impl OverflowScanner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_timestamp: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest artifact timestamp already accounted for
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    /// Mark every artifact currently in the directory as seen
    pub fn baseline(&mut self) {
        for (timestamp, _) in self.artifacts() {
            self.last_timestamp = self.last_timestamp.max(timestamp);
        }
        tracing::debug!(
            dir = %self.dir.display(),
            timestamp = self.last_timestamp,
            "overflow baseline recorded"
        );
    }

    /// Read artifacts newer than the baseline and name their operators
    ///
    /// Unreadable artifacts are logged and skipped but still count as seen.
    pub fn scan(&mut self, tasks: &TaskMap) -> Vec<String> {
        let mut op_names = Vec::new();
        let mut newest = self.last_timestamp;

        for (timestamp, path) in self.artifacts() {
            if timestamp <= self.last_timestamp {
                continue;
            }
            newest = newest.max(timestamp);

            let (stream_id, task_id) = match read_task_ids(&path) {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %format!("{:#}", e),
                        "skipping overflow artifact"
                    );
                    continue;
                }
            };
            tracing::debug!(stream_id, task_id, "overflow artifact");

            match tasks.get(&(stream_id, task_id)) {
                Some(op_name) => {
                    tracing::error!(node = %op_name, "overflow detected");
                    op_names.push(op_name.clone());
                }
                None => tracing::debug!(stream_id, task_id, "overflow task not recorded"),
            }
        }

        self.last_timestamp = newest;
        op_names
    }

    /// Regular files with a numeric timestamp suffix
    fn artifacts(&self) -> Vec<(u64, PathBuf)> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => {
                tracing::debug!(dir = %self.dir.display(), "overflow directory does not exist");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name();
                let timestamp = artifact_timestamp(name.to_str()?)?;
                Some((timestamp, entry.path()))
            })
            .collect()
    }
}

/// Timestamp after the last `.` of an artifact name
pub fn artifact_timestamp(file_name: &str) -> Option<u64> {
    let (_, suffix) = file_name.rsplit_once('.')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Stream and task id from an artifact header
fn read_task_ids(path: &Path) -> Result<(u64, u64)> {
    let mut file = File::open(path).context("failed to open overflow artifact")?;
    file.seek(SeekFrom::Start(HEADER_OFFSET))
        .context("failed to seek to overflow header")?;

    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    file.take(HEADER_LEN)
        .read_to_end(&mut header)
        .context("failed to read overflow header")?;
    if (header.len() as u64) < TASK_ID_OFFSET + 8 {
        bail!("overflow header truncated to {} bytes", header.len());
    }

    let mut cursor = Cursor::new(header.as_slice());
    cursor.set_position(STREAM_ID_OFFSET);
    let stream_id = cursor.read_u64::<LittleEndian>()?;
    cursor.set_position(TASK_ID_OFFSET);
    let task_id = cursor.read_u64::<LittleEndian>()?;
    Ok((stream_id, task_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_artifact(dir: &Path, name: &str, stream_id: u64, task_id: u64) {
        let mut bytes = vec![0u8; (HEADER_OFFSET + HEADER_LEN) as usize];
        let header = HEADER_OFFSET as usize;
        bytes[header + 8..header + 16].copy_from_slice(&stream_id.to_le_bytes());
        bytes[header + 16..header + 24].copy_from_slice(&task_id.to_le_bytes());
        let mut file = File::create(dir.join(name)).unwrap();
        file.write_all(&bytes).unwrap();
    }

    fn tasks() -> TaskMap {
        let mut map = TaskMap::new();
        map.insert((1, 7), "net/add".to_string());
        map.insert((2, 3), "net/mul".to_string());
        map
    }

    #[test]
    fn test_artifact_timestamp() {
        assert_eq!(artifact_timestamp("Opdebug.Node_OpDebug.12.100"), Some(100));
        assert_eq!(artifact_timestamp("overflow.5"), Some(5));
        assert_eq!(artifact_timestamp("no_suffix"), None);
        assert_eq!(artifact_timestamp("overflow.abc"), None);
        assert_eq!(artifact_timestamp("overflow."), None);
    }

    #[test]
    fn test_scan_reads_header_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "op.10", 1, 7);
        write_artifact(dir.path(), "op.11", 9, 9);

        let mut scanner = OverflowScanner::new(dir.path());
        let ops = scanner.scan(&tasks());

        assert_eq!(ops, vec!["net/add".to_string()]);
        assert_eq!(scanner.last_timestamp(), 11);
    }

    #[test]
    fn test_scan_only_processes_newer_files() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), "op.10", 1, 7);

        let mut scanner = OverflowScanner::new(dir.path());
        scanner.baseline();
        assert_eq!(scanner.last_timestamp(), 10);
        assert!(scanner.scan(&tasks()).is_empty());

        write_artifact(dir.path(), "op.20", 2, 3);
        assert_eq!(scanner.scan(&tasks()), vec!["net/mul".to_string()]);
        assert!(scanner.scan(&tasks()).is_empty());
    }

    #[test]
    fn test_short_file_is_skipped_but_seen() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("op.30"))
            .unwrap()
            .write_all(&[0u8; 16])
            .unwrap();

        let mut scanner = OverflowScanner::new(dir.path());
        assert!(scanner.scan(&tasks()).is_empty());
        assert_eq!(scanner.last_timestamp(), 30);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut scanner = OverflowScanner::new(dir.path().join("absent"));
        scanner.baseline();
        assert_eq!(scanner.last_timestamp(), 0);
        assert!(scanner.scan(&tasks()).is_empty());
    }

    #[test]
    fn test_subdirectories_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested.99")).unwrap();
        write_artifact(dir.path(), "op.5", 1, 7);

        let mut scanner = OverflowScanner::new(dir.path());
        scanner.baseline();
        assert_eq!(scanner.last_timestamp(), 5);
    }
}
