//! Persisted session store.
//!
//! The backend contract is a single JSON blob shaped as
//! `{ "state": { "token": ..., "user": { "permissions", "features",
//! "tenancy", ... } } }`. This module is the only place the core
//! touches it, and the contract is deliberately narrow: read the
//! token, merge-patch exactly the three authorization fields, emit a
//! change signal. The store never assumes exclusive-writer status
//! (other parts of the app write the same blob), so every write is a
//! locked read-modify-write of the whole document, and unrelated
//! fields are carried through untouched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use washport_protocol::SessionProfile;

use crate::error::ClientError;

/// Emitted on the change feed after a merge-patch lands
#[derive(Debug, Clone)]
pub struct StoreChanged;

pub struct SessionStore {
    path: PathBuf,
    cached: Mutex<Value>,
    changed_tx: broadcast::Sender<StoreChanged>,
}

impl SessionStore {
    /// Open the store at `path`. A missing or unreadable file is not
    /// an error; it reads as an empty blob (unauthenticated state).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(
                    component = "store",
                    event = "store.parse_failed",
                    path = %path.display(),
                    error = %e,
                    "Session blob unparseable, starting empty"
                );
                json!({})
            }),
            Err(_) => json!({}),
        };
        let (changed_tx, _) = broadcast::channel(16);
        Self {
            path,
            cached: Mutex::new(cached),
            changed_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current auth token, if any
    pub fn token(&self) -> Option<String> {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        cached
            .pointer("/state/token")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Clone of the whole blob (inspection / diagnostics)
    pub fn value(&self) -> Value {
        self.cached.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Subscribe to store-changed signals
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChanged> {
        self.changed_tx.subscribe()
    }

    /// Merge the profile's authorization fields into `state.user`,
    /// in memory and on disk.
    ///
    /// Only `permissions`, `features` and `tenancy` are touched, and
    /// only those present (non-null) in the profile. Everything else
    /// in the blob survives as-is.
    pub fn merge_authorization(&self, profile: &SessionProfile) -> Result<(), ClientError> {
        {
            let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

            if !cached.is_object() {
                *cached = Value::Object(Map::new());
            }
            if let Value::Object(root) = &mut *cached {
                let user = child_object(child_object(root, "state"), "user");
                for (key, value) in [
                    ("permissions", &profile.permissions),
                    ("features", &profile.features),
                    ("tenancy", &profile.tenancy),
                ] {
                    if !value.is_null() {
                        user.insert(key.to_string(), value.clone());
                    }
                }
            }

            self.persist(&cached)?;
        }

        debug!(
            component = "store",
            event = "store.authorization_patched",
            path = %self.path.display(),
            "Merged authorization fields into session blob"
        );
        let _ = self.changed_tx.send(StoreChanged);
        Ok(())
    }

    /// Write the blob atomically: temp file in the same directory,
    /// then rename over the target.
    fn persist(&self, blob: &Value) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(blob)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Fetch `key` from `map` as a mutable object, replacing a missing or
/// non-object value with an empty one.
fn child_object<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(child) => child,
        _ => unreachable!("slot normalized to an object above"),
    }
}
