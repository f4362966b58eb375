//! The reverse-map log.
//!
//! Every put appends `(referenced_hash, referencing_hash)` pairs as fixed
//! 64-byte records, segmented in parallel with the object log: reverse-map
//! segment N indexes exactly the objects of object-log segment N, which is
//! what makes per-segment rebuilds possible.
//!
//! Each segment carries a `.sum` sidecar holding the hex SHA-256 of the
//! segment contents, refreshed after every append from a running hasher.
//! A missing or disagreeing sidecar marks the segment for rebuild from the
//! object log.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parley_crypto::{hex_string, Hash};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// One reverse-map record.
pub const RECORD_LEN: usize = 64;

/// Append handle over the newest reverse-map segment.
#[derive(Debug)]
pub struct ReverseMapLog {
    dir: PathBuf,
    segment: u32,
    file: File,
    hasher: Sha256,
}

impl ReverseMapLog {
    /// Path of a reverse-map segment.
    pub fn segment_path(dir: &Path, segment: u32) -> PathBuf {
        dir.join(format!("seg-{segment:05}.rmap"))
    }

    /// Path of a segment's checksum sidecar.
    pub fn sidecar_path(dir: &Path, segment: u32) -> PathBuf {
        dir.join(format!("seg-{segment:05}.sum"))
    }

    /// Open the log positioned at the given segment, creating the
    /// directory if needed. The running hasher is primed from the
    /// segment's existing contents.
    pub fn open(dir: impl AsRef<Path>, segment: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let path = Self::segment_path(&dir, segment);
        let existing = if path.exists() { fs::read(&path)? } else { Vec::new() };
        let mut hasher = Sha256::new();
        hasher.update(&existing);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { dir, segment, file, hasher })
    }

    /// Append one `(referenced, referencing)` pair and refresh the sidecar.
    pub fn append(&mut self, referenced: &Hash, referencing: &Hash) -> Result<()> {
        let mut record = [0u8; RECORD_LEN];
        record[..32].copy_from_slice(referenced.as_bytes());
        record[32..].copy_from_slice(referencing.as_bytes());
        self.file.write_all(&record)?;
        self.hasher.update(record);
        self.write_sidecar()
    }

    /// Move to the next segment in step with the object log.
    pub fn roll(&mut self, segment: u32) -> Result<()> {
        self.file.sync_all()?;
        self.segment = segment;
        let path = Self::segment_path(&self.dir, segment);
        self.file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.hasher = Sha256::new();
        self.write_sidecar()
    }

    fn write_sidecar(&self) -> Result<()> {
        let digest = self.hasher.clone().finalize();
        fs::write(Self::sidecar_path(&self.dir, self.segment), hex_string(&digest))?;
        Ok(())
    }

    /// Whether a segment's sidecar exists and matches its contents.
    pub fn segment_intact(dir: &Path, segment: u32) -> Result<bool> {
        let path = Self::segment_path(dir, segment);
        let sidecar = Self::sidecar_path(dir, segment);
        if !path.exists() || !sidecar.exists() {
            return Ok(false);
        }
        let contents = fs::read(&path)?;
        let expected = fs::read_to_string(&sidecar)?;
        Ok(hex_string(&Sha256::digest(&contents)) == expected.trim())
    }

    /// Load a segment's records.
    pub fn load_segment(dir: &Path, segment: u32) -> Result<Vec<(Hash, Hash)>> {
        let path = Self::segment_path(dir, segment);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        let mut out = Vec::with_capacity(bytes.len() / RECORD_LEN);
        for record in bytes.chunks_exact(RECORD_LEN) {
            let mut referenced = [0u8; 32];
            let mut referencing = [0u8; 32];
            referenced.copy_from_slice(&record[..32]);
            referencing.copy_from_slice(&record[32..]);
            out.push((Hash(referenced), Hash(referencing)));
        }
        Ok(out)
    }

    /// Replace a segment wholesale with rebuilt pairs and a fresh sidecar.
    pub fn rewrite_segment(dir: &Path, segment: u32, pairs: &[(Hash, Hash)]) -> Result<()> {
        fs::create_dir_all(dir)?;
        let mut bytes = Vec::with_capacity(pairs.len() * RECORD_LEN);
        for (referenced, referencing) in pairs {
            bytes.extend_from_slice(referenced.as_bytes());
            bytes.extend_from_slice(referencing.as_bytes());
        }
        fs::write(Self::segment_path(dir, segment), &bytes)?;
        fs::write(Self::sidecar_path(dir, segment), hex_string(&Sha256::digest(&bytes)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut log = ReverseMapLog::open(dir.path(), 0).unwrap();
        log.append(&Hash([1u8; 32]), &Hash([2u8; 32])).unwrap();
        log.append(&Hash([3u8; 32]), &Hash([4u8; 32])).unwrap();

        assert!(ReverseMapLog::segment_intact(dir.path(), 0).unwrap());
        let pairs = ReverseMapLog::load_segment(dir.path(), 0).unwrap();
        assert_eq!(pairs, vec![
            (Hash([1u8; 32]), Hash([2u8; 32])),
            (Hash([3u8; 32]), Hash([4u8; 32])),
        ]);
    }

    #[test]
    fn missing_sidecar_marks_segment_for_rebuild() {
        let dir = TempDir::new().unwrap();
        let mut log = ReverseMapLog::open(dir.path(), 0).unwrap();
        log.append(&Hash([1u8; 32]), &Hash([2u8; 32])).unwrap();
        fs::remove_file(ReverseMapLog::sidecar_path(dir.path(), 0)).unwrap();
        assert!(!ReverseMapLog::segment_intact(dir.path(), 0).unwrap());
    }

    #[test]
    fn rewrite_produces_intact_segment() {
        let dir = TempDir::new().unwrap();
        let pairs = vec![(Hash([9u8; 32]), Hash([8u8; 32]))];
        ReverseMapLog::rewrite_segment(dir.path(), 3, &pairs).unwrap();
        assert!(ReverseMapLog::segment_intact(dir.path(), 3).unwrap());
        assert_eq!(ReverseMapLog::load_segment(dir.path(), 3).unwrap(), pairs);
    }
}
