//! The current-version index.
//!
//! A small append-only file of fixed 64-byte `(id_hash, version_hash)`
//! records; the last record for an identity wins. The file is compacted on
//! open once superseded records dominate, and can always be rebuilt from
//! the object log.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parley_crypto::{Hash, IdHash};

use crate::error::Result;

const RECORD_LEN: usize = 64;

/// The in-memory map plus its append handle.
pub struct VersionIndex {
    path: PathBuf,
    file: File,
    heads: HashMap<IdHash, Hash>,
}

impl VersionIndex {
    /// Open the index, compacting when more than half the records are
    /// superseded. A trailing partial record (crash mid-append) is cut.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut heads = HashMap::new();
        let mut record_count = 0usize;

        if path.exists() {
            let mut bytes = fs::read(&path)?;
            let whole = bytes.len() - bytes.len() % RECORD_LEN;
            if whole != bytes.len() {
                bytes.truncate(whole);
                fs::write(&path, &bytes)?;
            }
            for record in bytes.chunks_exact(RECORD_LEN) {
                let mut id = [0u8; 32];
                let mut version = [0u8; 32];
                id.copy_from_slice(&record[..32]);
                version.copy_from_slice(&record[32..]);
                heads.insert(IdHash(id), Hash(version));
                record_count += 1;
            }
        }

        if record_count > 2 * heads.len().max(1) {
            Self::write_compacted(&path, &heads)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file, heads })
    }

    fn write_compacted(path: &Path, heads: &HashMap<IdHash, Hash>) -> Result<()> {
        let mut bytes = Vec::with_capacity(heads.len() * RECORD_LEN);
        for (id, version) in heads {
            bytes.extend_from_slice(id.as_bytes());
            bytes.extend_from_slice(version.as_bytes());
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Record a new current version for an identity.
    pub fn set(&mut self, id: IdHash, version: Hash) -> Result<()> {
        let mut record = [0u8; RECORD_LEN];
        record[..32].copy_from_slice(id.as_bytes());
        record[32..].copy_from_slice(version.as_bytes());
        self.file.write_all(&record)?;
        self.file.sync_all()?;
        self.heads.insert(id, version);
        Ok(())
    }

    /// The current version of an identity.
    pub fn get(&self, id: &IdHash) -> Option<Hash> {
        self.heads.get(id).copied()
    }

    /// A snapshot of all heads, for the store's read index.
    pub fn heads(&self) -> &HashMap<IdHash, Hash> {
        &self.heads
    }

    /// Rebuild the file from heads recovered out of the object log.
    pub fn rebuild(path: impl AsRef<Path>, heads: &HashMap<IdHash, Hash>) -> Result<()> {
        Self::write_compacted(path.as_ref(), heads)
    }
}

impl std::fmt::Debug for VersionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionIndex")
            .field("path", &self.path)
            .field("identities", &self.heads.len())
            .finish()
    }
}
