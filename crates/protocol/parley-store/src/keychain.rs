//! The keychain file.
//!
//! Secret keys rest wrapped with XChaCha20-Poly1305 under a key derived
//! from the instance's local wrapping secret (`local.key`, created at
//! init). The keychain also records peer person keys admitted as trusted
//! during pairing.
//!
//! A data directory that already holds objects but has lost its keychain
//! is a fatal fault: the instance cannot authenticate as itself anymore.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parley_crypto::{
    derive_wrapping_key, hex_decode, hex_string, open_enveloped, seal_enveloped, PublicKey,
    SymmetricKey,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StoreError};

const KEYCHAIN_FILE: &str = "keychain.json";
const WRAPPING_SECRET_FILE: &str = "local.key";

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeychainData {
    /// Wrapped secrets by name, hex `nonce || ciphertext` envelopes.
    entries: BTreeMap<String, String>,
    /// Peer person keys admitted as trusted at pairing.
    trusted_keys: Vec<PublicKey>,
}

/// Wrapped secret keys plus trusted peer keys.
pub struct Keychain {
    path: PathBuf,
    wrap: SymmetricKey,
    data: KeychainData,
}

impl Keychain {
    /// Open the keychain inside a data directory, creating it (and the
    /// wrapping secret) on first use.
    ///
    /// `initialized` tells the keychain whether the directory already
    /// holds objects; in that case a missing keychain is fatal rather than
    /// a fresh start.
    pub fn open(dir: impl AsRef<Path>, initialized: bool) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(KEYCHAIN_FILE);
        let secret_path = dir.join(WRAPPING_SECRET_FILE);

        if initialized && (!path.exists() || !secret_path.exists()) {
            return Err(StoreError::Fatal(format!(
                "keychain missing from initialized store at {}",
                dir.display()
            )));
        }

        let wrap_secret: [u8; 32] = if secret_path.exists() {
            let bytes = fs::read(&secret_path)?;
            bytes.try_into().map_err(|_| {
                StoreError::Fatal(format!("wrapping secret at {} is damaged", secret_path.display()))
            })?
        } else {
            let secret = parley_crypto::random_token();
            fs::write(&secret_path, secret)?;
            restrict_permissions(&secret_path)?;
            info!(path = %secret_path.display(), "created instance wrapping secret");
            secret
        };
        let wrap = derive_wrapping_key(&wrap_secret);

        let data = if path.exists() {
            let json = fs::read(&path)?;
            serde_json::from_slice(&json)
                .map_err(|e| StoreError::Fatal(format!("keychain unreadable: {e}")))?
        } else {
            KeychainData::default()
        };

        Ok(Self { path, wrap, data })
    }

    /// Wrap and persist a named secret.
    pub fn store_secret(&mut self, name: &str, secret: &[u8; 32]) -> Result<()> {
        let envelope = seal_enveloped(&self.wrap, secret)
            .map_err(|e| StoreError::Fatal(format!("keychain wrap: {e}")))?;
        self.data.entries.insert(name.to_string(), hex_string(&envelope));
        self.flush()
    }

    /// Unwrap a named secret.
    pub fn load_secret(&self, name: &str) -> Result<Option<[u8; 32]>> {
        let Some(envelope_hex) = self.data.entries.get(name) else {
            return Ok(None);
        };
        let envelope = hex_decode(envelope_hex)
            .map_err(|e| StoreError::Fatal(format!("keychain entry {name}: {e}")))?;
        let secret = open_enveloped(&self.wrap, &envelope)
            .map_err(|e| StoreError::Fatal(format!("keychain entry {name}: {e}")))?;
        let secret: [u8; 32] = secret
            .try_into()
            .map_err(|_| StoreError::Fatal(format!("keychain entry {name} has wrong length")))?;
        Ok(Some(secret))
    }

    /// Record a peer person key as trusted.
    ///
    /// Idempotent, mirroring the trust certificate's duplicate-write
    /// behavior in the object store.
    pub fn add_trusted_key(&mut self, key: PublicKey) -> Result<()> {
        if !self.data.trusted_keys.contains(&key) {
            self.data.trusted_keys.push(key);
            self.flush()?;
        }
        Ok(())
    }

    /// Whether a peer person key was admitted at pairing.
    pub fn is_trusted(&self, key: &PublicKey) -> bool {
        self.data.trusted_keys.contains(key)
    }

    /// All trusted peer keys.
    pub fn trusted_keys(&self) -> &[PublicKey] {
        &self.data.trusted_keys
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.data)
            .map_err(|e| StoreError::Fatal(format!("keychain encode: {e}")))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn secret_round_trip_across_reopen() {
        let dir = TempDir::new().unwrap();
        let mut keychain = Keychain::open(dir.path(), false).unwrap();
        keychain.store_secret("person-sign", &[7u8; 32]).unwrap();
        drop(keychain);

        let keychain = Keychain::open(dir.path(), false).unwrap();
        assert_eq!(keychain.load_secret("person-sign").unwrap(), Some([7u8; 32]));
        assert_eq!(keychain.load_secret("missing").unwrap(), None);
    }

    #[test]
    fn secrets_are_not_plaintext_on_disk() {
        let dir = TempDir::new().unwrap();
        let mut keychain = Keychain::open(dir.path(), false).unwrap();
        keychain.store_secret("person-sign", &[0xAB; 32]).unwrap();

        let on_disk = fs::read_to_string(dir.path().join(KEYCHAIN_FILE)).unwrap();
        assert!(!on_disk.contains(&hex_string(&[0xAB; 32])));
    }

    #[test]
    fn missing_keychain_on_initialized_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = Keychain::open(dir.path(), true);
        assert!(matches!(result, Err(StoreError::Fatal(_))));
    }

    #[test]
    fn trusted_keys_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut keychain = Keychain::open(dir.path(), false).unwrap();
        let key = PublicKey([9u8; 32]);
        keychain.add_trusted_key(key).unwrap();
        keychain.add_trusted_key(key).unwrap();
        assert_eq!(keychain.trusted_keys().len(), 1);
        assert!(keychain.is_trusted(&key));
    }
}
