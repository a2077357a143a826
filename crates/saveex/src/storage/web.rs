use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::{SlotKey, SlotNaming, StorageBackend, StorageError, StorageIdentity};

const SCREENSHOT_SUFFIX: &str = "Img";
const BACKUP_SUFFIX: &str = "bak";
const GLOBAL_KEY: &str = "Global";
const CONFIG_KEY: &str = "Config";

/// The browser-side key-value surface. The real store is the hosting
/// runtime's; `MemoryStore` stands in for it in native builds and tests.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&mut self, key: &str);
}

/// Clones share the same underlying map, the way every page in a browser
/// origin shares one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Rc<RefCell<HashMap<String, String>>>,
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) {
        self.items.borrow_mut().remove(key);
    }
}

/// Key-value backend. Keys are `<prefix?><base><N>` (`autosave` for the
/// autosave slot) with reserved `Global`/`Config` records; screenshots use
/// the save key plus an `Img` suffix. Payloads are deflated and base64
/// encoded so binary data survives a text-only store, and so quota is spent
/// on compressed bytes.
pub struct WebBackend<S: KeyValueStore> {
    store: S,
    naming: SlotNaming,
    title_prefix: Option<String>,
}

impl<S: KeyValueStore> WebBackend<S> {
    /// `title_prefix` carries the game title when key prefixing is enabled;
    /// spaces are stripped so the prefix is a single token.
    pub fn new(store: S, naming: SlotNaming, title_prefix: Option<&str>) -> Self {
        let title_prefix = title_prefix.map(|title| {
            title
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>()
        });
        Self {
            store,
            naming,
            title_prefix,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn key_for(&self, key: SlotKey) -> String {
        let stem = match key {
            SlotKey::Config => CONFIG_KEY.to_string(),
            SlotKey::Global => GLOBAL_KEY.to_string(),
            SlotKey::Save(slot) => self.naming.stem(slot),
        };
        match &self.title_prefix {
            Some(prefix) => format!("{prefix}{stem}"),
            None => stem,
        }
    }

    fn expect_key<'a>(&self, identity: &'a StorageIdentity) -> Result<&'a str, StorageError> {
        match identity {
            StorageIdentity::Key(key) => Ok(key),
            StorageIdentity::Path(_) => Err(StorageError::ForeignIdentity {
                identity: identity.describe(),
            }),
        }
    }
}

impl<S: KeyValueStore> StorageBackend for WebBackend<S> {
    fn resolve(&self, key: SlotKey) -> StorageIdentity {
        StorageIdentity::Key(self.key_for(key))
    }

    fn resolve_screenshot(&self, key: SlotKey) -> StorageIdentity {
        StorageIdentity::Key(format!("{}{SCREENSHOT_SUFFIX}", self.key_for(key)))
    }

    fn write(
        &mut self,
        identity: &StorageIdentity,
        bytes: &[u8],
        _auxiliary: bool,
    ) -> Result<(), StorageError> {
        let key = self.expect_key(identity)?.to_string();
        let value = compress_to_base64(bytes).map_err(|source| StorageError::WriteIo {
            identity: key.clone(),
            source,
        })?;
        self.store.set_item(&key, &value)
    }

    fn read(&self, identity: &StorageIdentity) -> Result<Option<Vec<u8>>, StorageError> {
        let key = self.expect_key(identity)?;
        let Some(value) = self.store.get_item(key) else {
            return Ok(None);
        };
        decompress_from_base64(&value)
            .map(Some)
            .map_err(|message| StorageError::CorruptPayload {
                identity: key.to_string(),
                message,
            })
    }

    fn contains(&self, identity: &StorageIdentity) -> bool {
        match identity {
            StorageIdentity::Key(key) => self.store.get_item(key).is_some(),
            StorageIdentity::Path(_) => false,
        }
    }

    fn backup(&mut self, key: SlotKey) -> Result<(), StorageError> {
        let save_key = self.key_for(key);
        let Some(value) = self.store.get_item(&save_key) else {
            return Ok(());
        };
        self.store
            .set_item(&format!("{save_key}{BACKUP_SUFFIX}"), &value)
    }

    fn clean_backup(&mut self, key: SlotKey) {
        let save_key = self.key_for(key);
        self.store.remove_item(&format!("{save_key}{BACKUP_SUFFIX}"));
    }

    fn is_local(&self) -> bool {
        false
    }
}

fn compress_to_base64(bytes: &[u8]) -> std::io::Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(STANDARD.encode(encoder.finish()?))
}

fn decompress_from_base64(value: &str) -> Result<Vec<u8>, String> {
    let compressed = STANDARD
        .decode(value)
        .map_err(|error| format!("not valid base64: {error}"))?;
    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|error| format!("not a valid deflate stream: {error}"))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SlotId;

    fn backend() -> WebBackend<MemoryStore> {
        WebBackend::new(
            MemoryStore::default(),
            SlotNaming::new("Save", Some(SlotId(1))),
            Some("My Game"),
        )
    }

    #[test]
    fn keys_carry_title_prefix_without_spaces() {
        let backend = backend();
        assert_eq!(
            backend.resolve(SlotKey::Save(SlotId(3))),
            StorageIdentity::Key("MyGamesave3".to_string())
        );
        assert_eq!(
            backend.resolve(SlotKey::Save(SlotId(1))),
            StorageIdentity::Key("MyGameautosave".to_string())
        );
    }

    #[test]
    fn reserved_records_never_use_numbered_keys() {
        let backend = backend();
        assert_eq!(
            backend.resolve(SlotKey::Global),
            StorageIdentity::Key("MyGameGlobal".to_string())
        );
        assert_eq!(
            backend.resolve(SlotKey::Config),
            StorageIdentity::Key("MyGameConfig".to_string())
        );
        assert_eq!(
            backend.resolve(SlotKey::from_raw(0)),
            StorageIdentity::Key("MyGameGlobal".to_string())
        );
    }

    #[test]
    fn prefix_is_omitted_when_disabled() {
        let backend = WebBackend::new(
            MemoryStore::default(),
            SlotNaming::new("Save", None),
            None,
        );
        assert_eq!(
            backend.resolve(SlotKey::Save(SlotId(2))),
            StorageIdentity::Key("save2".to_string())
        );
    }

    #[test]
    fn screenshot_key_is_save_key_plus_img_suffix() {
        let backend = backend();
        assert_eq!(
            backend.resolve_screenshot(SlotKey::Save(SlotId(3))),
            StorageIdentity::Key("MyGamesave3Img".to_string())
        );
    }

    #[test]
    fn write_stores_text_and_read_round_trips_binary() {
        let mut backend = backend();
        let identity = backend.resolve(SlotKey::Save(SlotId(3)));
        let payload = vec![0u8, 255, 17, 3, 0, 99];

        backend.write(&identity, &payload, false).expect("write");

        let stored = backend.store().get_item("MyGamesave3").expect("stored");
        assert!(stored.is_ascii());
        assert_eq!(backend.read(&identity).expect("read"), Some(payload));
    }

    #[test]
    fn read_of_absent_key_is_none() {
        let backend = backend();
        let identity = backend.resolve(SlotKey::Save(SlotId(5)));
        assert_eq!(backend.read(&identity).expect("read"), None);
        assert!(!backend.contains(&identity));
    }

    #[test]
    fn corrupt_stored_value_surfaces_as_error_not_panic() {
        let mut backend = backend();
        let identity = backend.resolve(SlotKey::Save(SlotId(3)));
        backend
            .store
            .set_item("MyGamesave3", "definitely not base64 deflate")
            .expect("seed");
        assert!(matches!(
            backend.read(&identity),
            Err(StorageError::CorruptPayload { .. })
        ));
    }

    #[test]
    fn backup_copies_value_under_bak_suffix_until_cleaned() {
        let mut backend = backend();
        let key = SlotKey::Save(SlotId(3));
        let identity = backend.resolve(key);

        backend.write(&identity, b"old", false).expect("write");
        backend.backup(key).expect("backup");
        backend.write(&identity, b"new", false).expect("overwrite");

        let backup_value = backend.store().get_item("MyGamesave3bak").expect("backup");
        assert_eq!(
            decompress_from_base64(&backup_value).expect("decode"),
            b"old"
        );

        backend.clean_backup(key);
        assert!(backend.store().get_item("MyGamesave3bak").is_none());
    }

    #[test]
    fn local_identity_is_rejected_as_foreign() {
        let mut backend = backend();
        let foreign = StorageIdentity::Path(std::path::PathBuf::from("save3.sav"));
        assert!(matches!(
            backend.write(&foreign, b"x", false),
            Err(StorageError::ForeignIdentity { .. })
        ));
    }
}
