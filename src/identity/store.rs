use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::RegistryError;

/// local user id -> external account id
pub type IdentityMap = BTreeMap<String, String>;

/// Backing storage for the identity registry
pub trait RegistryStore: Send + Sync {
    /// Load the full mapping; an absent backing file is an empty mapping
    fn load(&self) -> Result<IdentityMap, RegistryError>;

    /// Replace the stored mapping with `map`
    fn save(&self, map: &IdentityMap) -> Result<(), RegistryError>;
}

/// Flat JSON object on disk, rewritten in full on every save
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<IdentityMap, RegistryError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(IdentityMap::new()),
            Ok(bytes) => {
                let map: IdentityMap = serde_json::from_slice(&bytes)?;
                info!("Loaded {} identities from {}", map.len(), self.path.display());
                Ok(map)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No registry file at {}, starting empty", self.path.display());
                Ok(IdentityMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, map: &IdentityMap) -> Result<(), RegistryError> {
        let bytes = serde_json::to_vec(map)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Persisted {} identities to {}", map.len(), self.path.display());
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<IdentityMap>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(map: IdentityMap) -> Self {
        Self {
            map: Mutex::new(map),
            fail_writes: Mutex::new(false),
        }
    }

    /// Make every subsequent save fail
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn stored(&self) -> IdentityMap {
        self.map.lock().clone()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<IdentityMap, RegistryError> {
        Ok(self.map.lock().clone())
    }

    fn save(&self, map: &IdentityMap) -> Result<(), RegistryError> {
        if *self.fail_writes.lock() {
            return Err(RegistryError::Persistence("write rejected".to_string()));
        }
        *self.map.lock() = map.clone();
        Ok(())
    }
}
