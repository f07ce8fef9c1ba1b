use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// File name for a slot file inside its storage directory
const SLOT_FILE: &str = "session.json";

/// Directory name under the OS data/temp dirs
const APP_DIR: &str = "taskdeck";

/// Named slots of the persisted session state. The serialized keys are
/// fixed and versionless; both backends use the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    AccessToken,
    RefreshToken,
    ExpiresAt,
    SessionId,
    Identity,
    Remember,
    LastActivity,
}

impl Slot {
    pub const ALL: [Slot; 7] = [
        Slot::AccessToken,
        Slot::RefreshToken,
        Slot::ExpiresAt,
        Slot::SessionId,
        Slot::Identity,
        Slot::Remember,
        Slot::LastActivity,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Slot::AccessToken => "access_token",
            Slot::RefreshToken => "refresh_token",
            Slot::ExpiresAt => "expires_at",
            Slot::SessionId => "session_id",
            Slot::Identity => "identity",
            Slot::Remember => "remember",
            Slot::LastActivity => "last_activity",
        }
    }
}

/// One storage lifetime: a JSON slot file mirrored in memory.
///
/// Every read is served from memory; the file is loaded once at open and
/// rewritten on every mutation. When the file cannot be written the backend
/// degrades to memory-only and keeps serving - loss of persistence is
/// acceptable, loss of function is not.
struct SlotFile {
    path: Option<PathBuf>,
    slots: Mutex<HashMap<String, String>>,
    degraded: AtomicBool,
}

impl SlotFile {
    fn open(path: Option<PathBuf>) -> Self {
        let slots = match path.as_deref() {
            Some(p) if p.exists() => match Self::load(p) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "Failed to load slot file, starting empty");
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };

        Self {
            path,
            slots: Mutex::new(slots),
            degraded: AtomicBool::new(false),
        }
    }

    fn load(path: &std::path::Path) -> Result<HashMap<String, String>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read slot file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse slot file: {}", path.display()))
    }

    fn get(&self, slot: Slot) -> Option<String> {
        self.slots
            .lock()
            .expect("slot map lock poisoned")
            .get(slot.key())
            .cloned()
    }

    fn set(&self, slot: Slot, value: &str) {
        let snapshot = {
            let mut slots = self.slots.lock().expect("slot map lock poisoned");
            slots.insert(slot.key().to_string(), value.to_string());
            slots.clone()
        };
        self.flush(&snapshot);
    }

    fn clear(&self) {
        let was_empty = {
            let mut slots = self.slots.lock().expect("slot map lock poisoned");
            let was_empty = slots.is_empty();
            slots.clear();
            was_empty
        };

        if let Some(ref path) = self.path {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove slot file");
                }
            }
        }
        if !was_empty {
            debug!("Slot store cleared");
        }
    }

    fn flush(&self, snapshot: &HashMap<String, String>) {
        if self.degraded.load(Ordering::Relaxed) {
            return;
        }
        let Some(ref path) = self.path else { return };

        if let Err(e) = Self::persist(path, snapshot) {
            // First failure flips the backend to memory-only; callers never
            // see an error.
            self.degraded.store(true, Ordering::Relaxed);
            warn!(path = %path.display(), error = %e, "Slot store degraded to memory-only");
        }
    }

    fn persist(path: &std::path::Path, snapshot: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create storage dir: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write slot file: {}", path.display()))?;
        Ok(())
    }
}

/// Key/value persistence over two storage lifetimes.
///
/// The durable backend lives under the OS data directory and survives
/// restarts; the ephemeral backend lives under the OS temp directory, which
/// the OS clears at boot. A login writes all of its slots to exactly one of
/// the two, chosen by the remember flag; reads probe durable first so a
/// remembered session wins over a leftover ephemeral one.
pub struct CredentialStore {
    durable: SlotFile,
    ephemeral: SlotFile,
}

impl CredentialStore {
    /// Open the store at the default OS locations. Unresolvable directories
    /// degrade that backend to memory-only.
    pub fn open_default() -> Self {
        let durable = dirs::data_dir().map(|d| d.join(APP_DIR).join(SLOT_FILE));
        if durable.is_none() {
            warn!("Could not resolve data directory, durable store is memory-only");
        }
        let ephemeral = Some(std::env::temp_dir().join(APP_DIR).join(SLOT_FILE));
        Self::with_paths(durable, ephemeral)
    }

    /// Open the store at explicit locations. `None` keeps that backend
    /// memory-only.
    pub fn with_paths(durable: Option<PathBuf>, ephemeral: Option<PathBuf>) -> Self {
        Self {
            durable: SlotFile::open(durable),
            ephemeral: SlotFile::open(ephemeral),
        }
    }

    /// A store with no file backing at all. Used by tests and by embedders
    /// that handle persistence themselves.
    pub fn in_memory() -> Self {
        Self::with_paths(None, None)
    }

    /// Write one slot to the store selected by `durable`. The caller picks
    /// the backend once per login and sticks with it.
    pub fn write(&self, slot: Slot, value: &str, durable: bool) {
        if durable {
            self.durable.set(slot, value);
        } else {
            self.ephemeral.set(slot, value);
        }
    }

    /// Read one slot, probing durable first, then ephemeral.
    pub fn read(&self, slot: Slot) -> Option<String> {
        self.durable.get(slot).or_else(|| self.ephemeral.get(slot))
    }

    /// Empty every slot in both stores. Idempotent; never raises on missing
    /// slots or an unavailable backend.
    pub fn clear(&self) {
        self.durable.clear();
        self.ephemeral.clear();
    }

    /// True when no slot exists in either store.
    pub fn is_empty(&self) -> bool {
        Slot::ALL.iter().all(|slot| self.read(*slot).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> (Option<PathBuf>, Option<PathBuf>) {
        (
            Some(dir.path().join("durable").join(SLOT_FILE)),
            Some(dir.path().join("ephemeral").join(SLOT_FILE)),
        )
    }

    #[test]
    fn test_write_and_read_back() {
        let store = CredentialStore::in_memory();
        store.write(Slot::AccessToken, "acc-1", false);
        assert_eq!(store.read(Slot::AccessToken).as_deref(), Some("acc-1"));
        assert_eq!(store.read(Slot::RefreshToken), None);
    }

    #[test]
    fn test_read_probes_durable_first() {
        let store = CredentialStore::in_memory();
        store.write(Slot::SessionId, "ephemeral-session", false);
        store.write(Slot::SessionId, "durable-session", true);
        assert_eq!(store.read(Slot::SessionId).as_deref(), Some("durable-session"));
    }

    #[test]
    fn test_clear_empties_both_stores() {
        let store = CredentialStore::in_memory();
        store.write(Slot::AccessToken, "a", true);
        store.write(Slot::RefreshToken, "r", false);
        store.clear();
        assert!(store.is_empty());
        // Idempotent
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_durable_slots_survive_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let (durable, ephemeral) = paths(&dir);

        let store = CredentialStore::with_paths(durable.clone(), ephemeral.clone());
        store.write(Slot::AccessToken, "persisted", true);
        drop(store);

        let reopened = CredentialStore::with_paths(durable, ephemeral);
        assert_eq!(reopened.read(Slot::AccessToken).as_deref(), Some("persisted"));
    }

    #[test]
    fn test_ephemeral_slots_gone_when_backing_file_removed() {
        let dir = TempDir::new().expect("temp dir");
        let (durable, ephemeral) = paths(&dir);

        let store = CredentialStore::with_paths(durable.clone(), ephemeral.clone());
        store.write(Slot::AccessToken, "short-lived", false);
        drop(store);

        // Simulates the OS clearing the temp dir between browser sessions.
        std::fs::remove_file(ephemeral.as_ref().unwrap()).expect("remove ephemeral file");

        let reopened = CredentialStore::with_paths(durable, ephemeral);
        assert_eq!(reopened.read(Slot::AccessToken), None);
    }

    #[test]
    fn test_unwritable_backend_degrades_silently() {
        let dir = TempDir::new().expect("temp dir");
        // Make the parent path a file so create_dir_all must fail.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").expect("write blocker");
        let durable = Some(blocker.join("nested").join(SLOT_FILE));

        let store = CredentialStore::with_paths(durable, None);
        store.write(Slot::AccessToken, "memory-only", true);
        // Still fully functional from memory.
        assert_eq!(store.read(Slot::AccessToken).as_deref(), Some("memory-only"));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_slot_file_starts_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(SLOT_FILE);
        std::fs::write(&path, "{ not json").expect("write corrupt file");

        let store = CredentialStore::with_paths(Some(path), None);
        assert!(store.is_empty());
    }
}
