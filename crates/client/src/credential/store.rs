// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential persistence: load/save to a JSON file with atomic writes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::credential::Credential;

/// Durable holder for the current credential.
///
/// All-or-nothing: `load` returns either a complete credential or `None`,
/// and `clear` removes every field in one step. No partial state is ever
/// observable.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// File-backed store: one JSON file holding the whole credential.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store under `dir/credential.json`.
    pub fn new(dir: &Path) -> Self {
        Self { path: dir.join("credential.json") }
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> anyhow::Result<Option<Credential>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let credential: Credential = serde_json::from_str(&contents)?;
        Ok(Some(credential))
    }

    /// Atomic save: write tmp + rename.
    ///
    /// Uses a unique temp filename (PID + counter) to avoid corruption when
    /// concurrent saves race on the same `.tmp` file — a shorter write can
    /// leave trailing bytes from a longer previous write.
    fn save(&self, credential: &Credential) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(credential)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<Credential>> {
        Ok(self.slot.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?.clone())
    }

    fn save(&self, credential: &Credential) -> anyhow::Result<()> {
        *self.slot.lock().map_err(|_| anyhow::anyhow!("store poisoned"))? =
            Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.slot.lock().map_err(|_| anyhow::anyhow!("store poisoned"))? = None;
        Ok(())
    }
}
