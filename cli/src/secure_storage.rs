//! Encrypted recovery notes
//!
//! A recovery note carries the withdrawal proof, which embeds the swap
//! secret, so notes only ever touch disk encrypted: AES-256-GCM under a key
//! derived with Argon2id. The commitment is stored in the clear and bound to
//! the ciphertext as associated data, so a note file cannot be relabelled.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use anyhow::{bail, Context, Result};
use argon2::password_hash::{rand_core::RngCore, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;
use zk_ledger::{Hash32, ShortHex};

use crate::config::write_private;
use crate::orchestrator::RecoveryNote;

const NOTE_VERSION: u8 = 1;

/// Environment variable consulted before prompting
pub const PASSWORD_ENV: &str = "ZKBRIDGE_NOTE_PASSWORD";

/// Argon2id cost parameters, stored with each note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MB
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl KdfParams {
    fn derive_key(&self, password: &str, salt: &str) -> Result<[u8; 32]> {
        let params = argon2::Params::new(self.m_cost, self.t_cost, self.p_cost, Some(32))
            .map_err(|e| anyhow::anyhow!("Argon2 params error: {}", e))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
            .map_err(|e| anyhow::anyhow!("Key derivation failed: {}", e))?;
        Ok(key)
    }
}

/// On-disk note format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedNote {
    pub version: u8,
    pub commitment: Hash32,
    pub kdf: KdfParams,
    pub salt: String,
    /// AES-GCM nonce (base64)
    pub nonce: String,
    /// Encrypted note JSON (base64)
    pub ciphertext: String,
    pub created_at: String,
}

impl EncryptedNote {
    pub fn seal(note: &RecoveryNote, password: &str) -> Result<Self> {
        Self::seal_with(note, password, KdfParams::default())
    }

    pub fn seal_with(note: &RecoveryNote, password: &str, kdf: KdfParams) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let mut key = kdf.derive_key(password, salt.as_str())?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| anyhow::anyhow!("Cipher creation failed: {}", e))?;
        key.zeroize();

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);

        let mut plaintext = serde_json::to_vec(note)?;
        let sealed = cipher.encrypt(
            &Nonce::from(nonce_bytes),
            Payload {
                msg: &plaintext,
                aad: note.commitment.as_slice(),
            },
        );
        plaintext.zeroize();
        let ciphertext = sealed.map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        Ok(Self {
            version: NOTE_VERSION,
            commitment: note.commitment,
            kdf,
            salt: salt.as_str().to_string(),
            nonce: b64::encode(&nonce_bytes),
            ciphertext: b64::encode(&ciphertext),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn open(&self, password: &str) -> Result<RecoveryNote> {
        if self.version != NOTE_VERSION {
            bail!("Unsupported note version {}", self.version);
        }

        let nonce_bytes: [u8; 12] = b64::decode(&self.nonce)
            .context("Invalid nonce encoding")?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid nonce length"))?;
        let ciphertext = b64::decode(&self.ciphertext).context("Invalid ciphertext encoding")?;

        let mut key = self.kdf.derive_key(password, &self.salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| anyhow::anyhow!("Cipher creation failed: {}", e))?;
        key.zeroize();

        let mut plaintext = cipher
            .decrypt(
                &Nonce::from(nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: self.commitment.as_slice(),
                },
            )
            .map_err(|_| anyhow::anyhow!("Decryption failed - wrong password or corrupted note"))?;

        let parsed = serde_json::from_slice::<RecoveryNote>(&plaintext);
        plaintext.zeroize();
        let note = parsed.context("Failed to parse decrypted note")?;

        if note.commitment != self.commitment {
            bail!("Note commitment does not match its header");
        }
        Ok(note)
    }
}

/// Directory of encrypted notes, one file per commitment
pub struct NoteVault {
    dir: PathBuf,
    kdf: KdfParams,
}

impl NoteVault {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn path_for(&self, commitment: &Hash32) -> PathBuf {
        self.dir.join(format!("{}.json", commitment.short()))
    }

    pub fn save(&self, note: &RecoveryNote, password: &str) -> Result<PathBuf> {
        let sealed = EncryptedNote::seal_with(note, password, self.kdf)?;
        let path = self.path_for(&note.commitment);
        write_private(&path, &serde_json::to_string_pretty(&sealed)?)
            .context("Failed to write recovery note")?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<EncryptedNote> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read note {}", path.display()))?;
        serde_json::from_str(&json).context("Failed to parse note file")
    }

    pub fn load(path: &Path, password: &str) -> Result<RecoveryNote> {
        Self::read(path)?.open(password)
    }

    /// Resolve a path or a commitment prefix to a note file
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let direct = PathBuf::from(reference);
        if direct.is_file() {
            return Ok(direct);
        }

        let prefix = reference.trim_start_matches("0x").to_lowercase();
        let matches: Vec<PathBuf> = self
            .list()?
            .into_iter()
            .filter(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem.starts_with(&prefix) || prefix.starts_with(stem))
            })
            .collect();

        match matches.as_slice() {
            [] => bail!("No recovery note matches '{}'", reference),
            [one] => Ok(one.clone()),
            _ => bail!("'{}' matches {} notes; use a longer prefix", reference, matches.len()),
        }
    }

    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut notes = Vec::new();
        for entry in fs::read_dir(&self.dir).context("Failed to list notes")? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                notes.push(path);
            }
        }
        notes.sort();
        Ok(notes)
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))
    }
}

/// Password strength validation
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        bail!("Password must be at least 8 characters");
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_numeric());

    if !has_upper || !has_lower || !has_digit {
        bail!("Password must contain uppercase, lowercase, and numeric characters");
    }

    Ok(())
}

/// Prompt for password securely (hides input)
pub fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

/// Password for an existing note: environment first, then prompt
pub fn note_password() -> Result<String> {
    match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => prompt_password("Note password: "),
    }
}

/// Password for a new note, confirmed and strength-checked when prompted
pub fn new_note_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            validate_password_strength(&password)?;
            return Ok(password);
        }
    }

    let password = prompt_password("New note password: ")?;
    let confirm = prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    validate_password_strength(&password)?;
    Ok(password)
}

// Base64 encoding/decoding helpers
mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> anyhow::Result<Vec<u8>> {
        STANDARD
            .decode(s)
            .map_err(|e| anyhow::anyhow!("Base64 decode error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::crypto::{derive, Secret};

    const FAST: KdfParams = KdfParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    };

    fn note() -> RecoveryNote {
        let recipient = "0x3333333333333333333333333333333333333333".parse().unwrap();
        let bridge = derive(Secret::from_bytes([9; 32]), zk_ledger::Amount::from(1_000_000u64), &recipient).unwrap();
        RecoveryNote {
            commitment: bridge.commitment,
            nullifier_hash: bridge.nullifier_hash,
            proof: bridge.proof.clone(),
            amount: zk_ledger::Amount::from(1_000_000u64),
            recipient,
            source: Network::MantleSepolia,
            target: Network::FlowTestnet,
            created_at: chrono::Utc::now(),
            deposited_at: None,
            deposit_tx: None,
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let note = note();
        let sealed = EncryptedNote::seal_with(&note, "TestPassword123", FAST).unwrap();
        assert_eq!(sealed.commitment, note.commitment);
        assert!(!sealed.ciphertext.contains(&hex::encode([9u8; 32])));

        let opened = sealed.open("TestPassword123").unwrap();
        assert_eq!(opened, note);
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = EncryptedNote::seal_with(&note(), "TestPassword123", FAST).unwrap();
        assert!(sealed.open("WrongPassword123").is_err());
    }

    #[test]
    fn test_relabelled_note_fails() {
        let mut sealed = EncryptedNote::seal_with(&note(), "TestPassword123", FAST).unwrap();
        sealed.commitment = Hash32::new([1; 32]);
        assert!(sealed.open("TestPassword123").is_err());
    }

    #[test]
    fn test_vault_save_resolve_load() {
        let dir = tempfile::tempdir().unwrap();
        let vault = NoteVault::new(dir.path().to_path_buf()).with_kdf(FAST);
        let note = note();

        let path = vault.save(&note, "TestPassword123").unwrap();
        assert_eq!(vault.list().unwrap(), vec![path.clone()]);

        let prefix = format!("0x{}", &note.commitment.short()[..6]);
        assert_eq!(vault.resolve(&prefix).unwrap(), path);
        assert_eq!(vault.resolve(&note.commitment.to_string()).unwrap(), path);
        assert!(vault.resolve("ffffffff").is_err());

        let loaded = NoteVault::load(&path, "TestPassword123").unwrap();
        assert_eq!(loaded.nullifier_hash, note.nullifier_hash);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_password_validation() {
        assert!(validate_password_strength("short").is_err());
        assert!(validate_password_strength("alllowercase").is_err());
        assert!(validate_password_strength("ALLUPPERCASE").is_err());
        assert!(validate_password_strength("NoNumbers").is_err());
        assert!(validate_password_strength("ValidPass123").is_ok());
    }
}
