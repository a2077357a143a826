use std::path::PathBuf;

use thiserror::Error;

mod local;
mod web;

pub use local::LocalBackend;
pub use web::{KeyValueStore, MemoryStore, WebBackend};

/// A numbered save position, `1..=max_slots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

/// Addressable storage records. The reserved records of the wire contract
/// (negative raw id for config, zero for the global index) are explicit
/// variants instead of magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKey {
    Config,
    Global,
    Save(SlotId),
}

impl SlotKey {
    /// Maps a raw host-facing slot id: negative ids are the config record,
    /// zero is the global index, positive ids are numbered saves.
    pub fn from_raw(raw: i64) -> SlotKey {
        if raw < 0 {
            SlotKey::Config
        } else if raw == 0 {
            SlotKey::Global
        } else {
            SlotKey::Save(SlotId(raw as u32))
        }
    }
}

/// The resolved on-disk or in-store identity of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageIdentity {
    Path(PathBuf),
    Key(String),
}

impl StorageIdentity {
    pub fn describe(&self) -> String {
        match self {
            StorageIdentity::Path(path) => path.display().to_string(),
            StorageIdentity::Key(key) => key.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {identity}: {source}")]
    WriteIo {
        identity: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {identity}: {source}")]
    ReadIo {
        identity: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store rejected key {key}: {message}")]
    StoreRejected { key: String, message: String },
    #[error("stored payload for {identity} is not decodable: {message}")]
    CorruptPayload { identity: String, message: String },
    #[error("identity {identity} does not belong to this backend")]
    ForeignIdentity { identity: String },
}

/// Derives record stems shared by both backends: the configured save-file
/// name with spaces stripped and lowercased, and the autosave alias.
#[derive(Debug, Clone)]
pub struct SlotNaming {
    base_name: String,
    autosave_slot: Option<SlotId>,
}

impl SlotNaming {
    pub fn new(save_name: &str, autosave_slot: Option<SlotId>) -> Self {
        let base_name = save_name
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        Self {
            base_name,
            autosave_slot,
        }
    }

    pub fn autosave_slot(&self) -> Option<SlotId> {
        self.autosave_slot
    }

    pub fn is_autosave(&self, slot: SlotId) -> bool {
        self.autosave_slot == Some(slot)
    }

    /// The numbered stem for a save slot, or the fixed `autosave` alias.
    /// The alias is keyed on the configured autosave slot, so reconfiguring
    /// the autosave id never orphans the alias file.
    pub fn stem(&self, slot: SlotId) -> String {
        if self.is_autosave(slot) {
            "autosave".to_string()
        } else {
            format!("{}{}", self.base_name, slot.0)
        }
    }
}

/// Uniform persistence surface over the local filesystem and the browser
/// key-value store. Identity derivation is a pure function of the key and
/// the naming configuration. Writes report failure as an error result;
/// backends never retry and never panic past this boundary — callers decide
/// whether a failure is fatal.
pub trait StorageBackend {
    /// Save-data identity for a record.
    fn resolve(&self, key: SlotKey) -> StorageIdentity;

    /// Screenshot identity for a record.
    fn resolve_screenshot(&self, key: SlotKey) -> StorageIdentity;

    /// Writes a payload. `auxiliary` marks non-save payloads (screenshots):
    /// the local backend creates the target directory lazily and decodes
    /// data-URL payloads for these.
    fn write(
        &mut self,
        identity: &StorageIdentity,
        bytes: &[u8],
        auxiliary: bool,
    ) -> Result<(), StorageError>;

    /// Reads a payload; `Ok(None)` when the record is absent.
    fn read(&self, identity: &StorageIdentity) -> Result<Option<Vec<u8>>, StorageError>;

    /// Cheap presence probe without reading the payload.
    fn contains(&self, identity: &StorageIdentity) -> bool;

    /// Preserves the current save record for a slot, if any, so a failed
    /// overwrite cannot lose the previous save.
    fn backup(&mut self, key: SlotKey) -> Result<(), StorageError>;

    /// Drops the stale backup left by `backup` after a successful save.
    fn clean_backup(&mut self, key: SlotKey);

    fn is_local(&self) -> bool;
}

/// Strips a data-URL header and decodes the base64 body. Payloads that are
/// not data-URLs pass through untouched.
pub(crate) fn decode_data_url_payload(bytes: &[u8]) -> Result<Vec<u8>, String> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let Ok(text) = std::str::from_utf8(bytes) else {
        return Ok(bytes.to_vec());
    };
    if !text.starts_with("data:") {
        return Ok(bytes.to_vec());
    }
    let Some((_, body)) = text.split_once(',') else {
        return Err("data-URL payload has no comma separator".to_string());
    };
    STANDARD
        .decode(body)
        .map_err(|error| format!("data-URL body is not valid base64: {error}"))
}
