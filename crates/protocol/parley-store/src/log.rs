//! The segmented append-only object log.
//!
//! Record format:
//!
//! ```text
//! [length: u32 BE] [payload] [sha256(payload)[..8]]
//! ```
//!
//! Segments roll at 64 MiB. The log is canonical: every other on-disk
//! structure can be rebuilt from it. A partially written tail record in
//! the newest segment is dropped on open; a damaged record anywhere else
//! is a fatal fault.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use parley_types::SEGMENT_SIZE;

use crate::error::{Result, StoreError};

/// Per-record checksum length.
const CHECKSUM_LEN: usize = 8;

/// Location of one record inside the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLoc {
    pub segment: u32,
    /// Byte offset of the record header within the segment.
    pub offset: u64,
    /// Payload length.
    pub len: u32,
}

/// Append handle over the newest segment.
#[derive(Debug)]
pub struct ObjectLog {
    dir: PathBuf,
    segment: u32,
    file: File,
    written: u64,
    segment_limit: u64,
}

impl ObjectLog {
    /// Path of an object segment.
    pub fn segment_path(dir: &Path, segment: u32) -> PathBuf {
        dir.join(format!("seg-{segment:05}.log"))
    }

    /// List existing segment indices in order.
    pub fn segments(dir: &Path) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        if !dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(idx) = name.strip_prefix("seg-").and_then(|s| s.strip_suffix(".log")) {
                if let Ok(idx) = idx.parse::<u32>() {
                    out.push(idx);
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// Open the log for appending, creating the directory if needed.
    ///
    /// Returns the handle positioned at the end of the newest segment.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_limit(dir, SEGMENT_SIZE)
    }

    /// Open with a custom segment size. Production uses [`SEGMENT_SIZE`];
    /// tests shrink it to exercise rollover.
    pub fn open_with_limit(dir: impl AsRef<Path>, segment_limit: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let segment = Self::segments(&dir)?.last().copied().unwrap_or(0);
        let path = Self::segment_path(&dir, segment);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self { dir, segment, file, written, segment_limit })
    }

    /// The segment currently being appended to.
    pub fn current_segment(&self) -> u32 {
        self.segment
    }

    /// Append one record, fsync it, and report whether the log rolled to a
    /// new segment afterwards.
    pub fn append(&mut self, payload: &[u8]) -> Result<(RecordLoc, bool)> {
        let loc = RecordLoc {
            segment: self.segment,
            offset: self.written,
            len: payload.len() as u32,
        };

        let checksum = record_checksum(payload);
        self.file.write_all(&(payload.len() as u32).to_be_bytes())?;
        self.file.write_all(payload)?;
        self.file.write_all(&checksum)?;
        self.file.sync_all()?;
        self.written += 4 + payload.len() as u64 + CHECKSUM_LEN as u64;

        let mut rolled = false;
        if self.written >= self.segment_limit {
            self.segment += 1;
            let path = Self::segment_path(&self.dir, self.segment);
            self.file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.written = 0;
            rolled = true;
        }
        Ok((loc, rolled))
    }

    /// Read and verify one record.
    pub fn read(dir: &Path, loc: &RecordLoc) -> Result<Vec<u8>> {
        let mut file = File::open(Self::segment_path(dir, loc.segment))?;
        file.seek(SeekFrom::Start(loc.offset))?;

        let mut header = [0u8; 4];
        file.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header);
        if len != loc.len {
            return Err(StoreError::Fatal(format!(
                "record at seg {} offset {} has length {}, index says {}",
                loc.segment, loc.offset, len, loc.len
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        let mut checksum = [0u8; CHECKSUM_LEN];
        file.read_exact(&mut checksum)?;
        if checksum != record_checksum(&payload) {
            return Err(StoreError::Fatal(format!(
                "record checksum mismatch at seg {} offset {}",
                loc.segment, loc.offset
            )));
        }
        Ok(payload)
    }

    /// Scan one segment, invoking `visit` for every intact record.
    ///
    /// When `is_tail` is set, a truncated or checksum-damaged trailing
    /// record is cut off and the scan succeeds; anywhere else the damage
    /// is fatal.
    pub fn scan_segment(
        dir: &Path,
        segment: u32,
        is_tail: bool,
        mut visit: impl FnMut(RecordLoc, &[u8]),
    ) -> Result<()> {
        let path = Self::segment_path(dir, segment);
        let bytes = fs::read(&path)?;
        let mut offset = 0usize;

        while offset < bytes.len() {
            match parse_record(&bytes[offset..]) {
                Parsed::Record { payload, record_len } => {
                    visit(
                        RecordLoc { segment, offset: offset as u64, len: payload.len() as u32 },
                        payload,
                    );
                    offset += record_len;
                }
                // A record cut short can only be the torn tail of a crash.
                Parsed::Truncated if is_tail => {
                    warn!(
                        segment,
                        offset, "dropping partially written tail record after crash"
                    );
                    let file = OpenOptions::new().write(true).open(&path)?;
                    file.set_len(offset as u64)?;
                    file.sync_all()?;
                    return Ok(());
                }
                Parsed::Truncated => {
                    return Err(StoreError::Fatal(format!(
                        "truncated record in sealed segment {segment} at offset {offset}"
                    )));
                }
                // A full-length record with a bad checksum is corruption,
                // not a crash artifact, wherever it sits.
                Parsed::BadChecksum => {
                    return Err(StoreError::Fatal(format!(
                        "record checksum mismatch in segment {segment} at offset {offset}"
                    )));
                }
            }
        }
        Ok(())
    }
}

enum Parsed<'a> {
    Record { payload: &'a [u8], record_len: usize },
    Truncated,
    BadChecksum,
}

/// Parse one record at the start of `bytes`.
fn parse_record(bytes: &[u8]) -> Parsed<'_> {
    if bytes.len() < 4 {
        return Parsed::Truncated;
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let total = 4 + len + CHECKSUM_LEN;
    if bytes.len() < total {
        return Parsed::Truncated;
    }
    let payload = &bytes[4..4 + len];
    let checksum = &bytes[4 + len..total];
    if checksum != record_checksum(payload) {
        return Parsed::BadChecksum;
    }
    Parsed::Record { payload, record_len: total }
}

/// First eight bytes of the payload's SHA-256.
fn record_checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn log_rolls_to_a_new_segment_at_the_limit() {
        let dir = TempDir::new().unwrap();
        let mut log = ObjectLog::open_with_limit(dir.path(), 64).unwrap();

        let (first, rolled) = log.append(&[0xAA; 80]).unwrap();
        assert!(rolled);
        assert_eq!(first.segment, 0);
        assert_eq!(log.current_segment(), 1);

        let (second, rolled) = log.append(b"next segment").unwrap();
        assert!(!rolled);
        assert_eq!(second.segment, 1);
        assert_eq!(second.offset, 0);

        // Records stay readable across the segment boundary.
        assert_eq!(ObjectLog::read(dir.path(), &first).unwrap(), vec![0xAA; 80]);
        assert_eq!(ObjectLog::read(dir.path(), &second).unwrap(), b"next segment");
        assert_eq!(ObjectLog::segments(dir.path()).unwrap(), vec![0, 1]);
    }

    #[test]
    fn append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut log = ObjectLog::open(dir.path()).unwrap();
        let (loc, rolled) = log.append(b"first record").unwrap();
        assert!(!rolled);
        assert_eq!(ObjectLog::read(dir.path(), &loc).unwrap(), b"first record");
    }

    #[test]
    fn scan_visits_records_in_order() {
        let dir = TempDir::new().unwrap();
        let mut log = ObjectLog::open(dir.path()).unwrap();
        log.append(b"one").unwrap();
        log.append(b"two").unwrap();

        let mut seen = Vec::new();
        ObjectLog::scan_segment(dir.path(), 0, true, |_, payload| {
            seen.push(payload.to_vec());
        })
        .unwrap();
        assert_eq!(seen, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let dir = TempDir::new().unwrap();
        let mut log = ObjectLog::open(dir.path()).unwrap();
        log.append(b"keep me").unwrap();
        let (loc, _) = log.append(b"partial").unwrap();
        drop(log);

        // Simulate a crash mid-write of the second record.
        let path = ObjectLog::segment_path(dir.path(), 0);
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(loc.offset + 6).unwrap();

        let mut seen = Vec::new();
        ObjectLog::scan_segment(dir.path(), 0, true, |_, payload| {
            seen.push(payload.to_vec());
        })
        .unwrap();
        assert_eq!(seen, vec![b"keep me".to_vec()]);

        // The log reopens clean and appends after the dropped record.
        let mut log = ObjectLog::open(dir.path()).unwrap();
        let (new_loc, _) = log.append(b"after recovery").unwrap();
        assert_eq!(new_loc.offset, loc.offset);
    }

    #[test]
    fn damage_in_sealed_segment_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut log = ObjectLog::open(dir.path()).unwrap();
        log.append(b"record").unwrap();
        drop(log);

        let path = ObjectLog::segment_path(dir.path(), 0);
        let mut bytes = fs::read(&path).unwrap();
        bytes[5] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let result = ObjectLog::scan_segment(dir.path(), 0, false, |_, _| {});
        assert!(matches!(result, Err(StoreError::Fatal(_))));
    }
}
