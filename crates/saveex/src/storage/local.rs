use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{
    decode_data_url_payload, SlotKey, SlotNaming, StorageBackend, StorageError, StorageIdentity,
};

const SAVE_EXT: &str = "sav";
const BACKUP_EXT: &str = "sav.bak";

/// Filesystem backend. Save records live under `save_dir` as
/// `<base><N>.sav` (`autosave.sav` for the autosave slot); screenshots live
/// under `screenshot_dir` with the image extension chosen at construction.
pub struct LocalBackend {
    save_dir: PathBuf,
    screenshot_dir: PathBuf,
    image_ext: String,
    naming: SlotNaming,
}

impl LocalBackend {
    pub fn new(
        save_dir: PathBuf,
        screenshot_dir: PathBuf,
        image_ext: &str,
        naming: SlotNaming,
    ) -> Self {
        Self {
            save_dir,
            screenshot_dir,
            image_ext: image_ext.to_string(),
            naming,
        }
    }

    fn save_path(&self, key: SlotKey) -> PathBuf {
        let stem = match key {
            SlotKey::Config => "config".to_string(),
            SlotKey::Global => "global".to_string(),
            SlotKey::Save(slot) => self.naming.stem(slot),
        };
        self.save_dir.join(format!("{stem}.{SAVE_EXT}"))
    }

    fn backup_path(&self, key: SlotKey) -> PathBuf {
        let path = self.save_path(key);
        path.with_extension(BACKUP_EXT)
    }

    fn expect_path<'a>(&self, identity: &'a StorageIdentity) -> Result<&'a Path, StorageError> {
        match identity {
            StorageIdentity::Path(path) => Ok(path),
            StorageIdentity::Key(_) => Err(StorageError::ForeignIdentity {
                identity: identity.describe(),
            }),
        }
    }
}

impl StorageBackend for LocalBackend {
    fn resolve(&self, key: SlotKey) -> StorageIdentity {
        StorageIdentity::Path(self.save_path(key))
    }

    fn resolve_screenshot(&self, key: SlotKey) -> StorageIdentity {
        let stem = match key {
            SlotKey::Config => "config".to_string(),
            SlotKey::Global => "global".to_string(),
            SlotKey::Save(slot) => self.naming.stem(slot),
        };
        StorageIdentity::Path(self.screenshot_dir.join(format!("{stem}.{}", self.image_ext)))
    }

    fn write(
        &mut self,
        identity: &StorageIdentity,
        bytes: &[u8],
        auxiliary: bool,
    ) -> Result<(), StorageError> {
        let path = self.expect_path(identity)?;
        if auxiliary {
            let payload =
                decode_data_url_payload(bytes).map_err(|message| StorageError::CorruptPayload {
                    identity: identity.describe(),
                    message,
                })?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| StorageError::WriteIo {
                    identity: identity.describe(),
                    source,
                })?;
            }
            fs::write(path, payload).map_err(|source| StorageError::WriteIo {
                identity: identity.describe(),
                source,
            })
        } else {
            write_bytes_atomic(path, bytes).map_err(|source| StorageError::WriteIo {
                identity: identity.describe(),
                source,
            })
        }
    }

    fn read(&self, identity: &StorageIdentity) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.expect_path(identity)?;
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::ReadIo {
                identity: identity.describe(),
                source,
            }),
        }
    }

    fn contains(&self, identity: &StorageIdentity) -> bool {
        match identity {
            StorageIdentity::Path(path) => path.is_file(),
            StorageIdentity::Key(_) => false,
        }
    }

    fn backup(&mut self, key: SlotKey) -> Result<(), StorageError> {
        let current = self.save_path(key);
        if !current.is_file() {
            return Ok(());
        }
        let backup = self.backup_path(key);
        fs::copy(&current, &backup)
            .map(|_| ())
            .map_err(|source| StorageError::WriteIo {
                identity: backup.display().to_string(),
                source,
            })
    }

    fn clean_backup(&mut self, key: SlotKey) {
        // Best effort: a stale backup is only ever cosmetic.
        let _ = fs::remove_file(self.backup_path(key));
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// Save-data writes go through a temp file and rename so an interrupted
/// write never truncates the previous save.
fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes)?;
    replace_file(&tmp_path, path)
}

fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    match fs::remove_file(final_path) {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(tmp_path);
            return Err(error);
        }
    }

    if let Err(error) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("save.tmp");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}
