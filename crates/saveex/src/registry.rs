use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::SaveConfig;
use crate::payload::{
    deserialize_state, format_playtime, serialize_state, GameState, SaveError,
};
use crate::screenshot::ScreenshotArtifact;
use crate::storage::{SlotId, SlotKey, StorageBackend, StorageError, StorageIdentity};

/// Per-slot record in the persisted index: enough to answer existence,
/// ownership, and list-row metadata without loading save payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotIndexEntry {
    pub owner_id: String,
    pub title: String,
    pub playtime: String,
}

/// The persisted `slotId -> entry` index. Presence of a key means the slot
/// claims to exist; the registry cross-checks the claim against storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalIndex {
    slots: BTreeMap<u32, SlotIndexEntry>,
}

impl GlobalIndex {
    pub fn entry(&self, slot: SlotId) -> Option<&SlotIndexEntry> {
        self.slots.get(&slot.0)
    }

    pub fn set_entry(&mut self, slot: SlotId, entry: SlotIndexEntry) {
        self.slots.insert(slot.0, entry);
    }

    fn decode(bytes: &[u8]) -> Option<GlobalIndex> {
        serde_json::from_slice(bytes).ok()
    }

    fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Maps logical slot ids onto backend identities and tracks existence and
/// ownership through the global index record.
pub struct SlotRegistry {
    backend: Box<dyn StorageBackend>,
    index: GlobalIndex,
    max_slots: u32,
    autosave_slot: Option<SlotId>,
    save_name: String,
    game_title: String,
    use_map_display_name: bool,
    owner_id: String,
}

impl SlotRegistry {
    /// Loads the index from the backend's `Global` record. A missing or
    /// unreadable index starts empty and self-heals on the next save.
    pub fn open(backend: Box<dyn StorageBackend>, config: &SaveConfig) -> Self {
        let identity = backend.resolve(SlotKey::Global);
        let index = match backend.read(&identity) {
            Ok(Some(bytes)) => GlobalIndex::decode(&bytes).unwrap_or_else(|| {
                warn!(identity = %identity.describe(), "global_index_unreadable");
                GlobalIndex::default()
            }),
            Ok(None) => GlobalIndex::default(),
            Err(error) => {
                warn!(error = %error, "global_index_read_failed");
                GlobalIndex::default()
            }
        };

        Self {
            backend,
            index,
            max_slots: config.max_slots,
            autosave_slot: config.autosave_slot(),
            save_name: config.save_name.clone(),
            game_title: config.game_title.clone(),
            use_map_display_name: config.use_map_display_name,
            owner_id: session_fingerprint(&config.game_title),
        }
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    pub fn is_local(&self) -> bool {
        self.backend.is_local()
    }

    pub fn is_autosave(&self, slot: SlotId) -> bool {
        self.autosave_slot == Some(slot)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn identity_for(&self, key: SlotKey) -> StorageIdentity {
        self.backend.resolve(key)
    }

    pub fn screenshot_identity_for(&self, key: SlotKey) -> StorageIdentity {
        self.backend.resolve_screenshot(key)
    }

    /// True when the index claims the slot and the storage entry actually
    /// exists. An indexed slot with no storage entry is a consistency error
    /// treated as absent; the next save overwrites the stale claim.
    pub fn exists(&self, slot: SlotId) -> bool {
        if self.index.entry(slot).is_none() {
            return false;
        }
        self.backend.contains(&self.backend.resolve(SlotKey::Save(slot)))
    }

    /// Ownership gate for overwrite/load shortcuts. The local target trusts
    /// the filesystem (single-user model); the web target also requires the
    /// recorded owner to match this session, so saves written by another
    /// profile under the same key prefix stay visible but unclaimed.
    pub fn belongs_to_current_session(&self, slot: SlotId) -> bool {
        if !self.exists(slot) {
            return false;
        }
        if self.backend.is_local() {
            return true;
        }
        self.index
            .entry(slot)
            .is_some_and(|entry| entry.owner_id == self.owner_id)
    }

    pub fn any_save_exists(&self) -> bool {
        (1..=self.max_slots).any(|id| self.exists(SlotId(id)))
    }

    pub fn entry(&self, slot: SlotId) -> Option<&SlotIndexEntry> {
        self.index.entry(slot)
    }

    /// Row label for a slot: the autosave slot gets its synthetic name so
    /// display code can special-case it.
    pub fn slot_label(&self, slot: SlotId) -> String {
        if self.is_autosave(slot) {
            "Autosave".to_string()
        } else {
            format!("{} {}", self.save_name, slot.0)
        }
    }

    /// The full save pipeline for one slot: backup the previous record,
    /// write the payload atomically, persist the screenshot, update the
    /// index, then drop the stale backup. A failed write leaves the prior
    /// save and its index entry untouched.
    pub fn save_slot(
        &mut self,
        slot: SlotId,
        state: &GameState,
        screenshot: Option<ScreenshotArtifact>,
    ) -> Result<(), SaveError> {
        debug_assert!(
            slot.0 >= 1 && slot.0 <= self.max_slots,
            "slot id out of configured range"
        );
        let key = SlotKey::Save(slot);
        let bytes = serialize_state(state)?;

        self.backend.backup(key)?;
        let identity = self.backend.resolve(key);
        self.backend.write(&identity, &bytes, false)?;

        if let Some(artifact) = screenshot {
            let shot_identity = self.backend.resolve_screenshot(key);
            if let Err(error) = self.backend.write(&shot_identity, &artifact.bytes, true) {
                // The save itself succeeded; the row just renders without
                // an image until the next save.
                warn!(error = %error, identity = %shot_identity.describe(), "screenshot_write_failed");
            }
        }

        self.index.set_entry(
            slot,
            SlotIndexEntry {
                owner_id: self.owner_id.clone(),
                title: self.title_for(state),
                playtime: format_playtime(state.playtime_seconds),
            },
        );
        self.persist_index()?;
        self.backend.clean_backup(key);
        Ok(())
    }

    pub fn load_slot(&self, slot: SlotId) -> Result<Option<GameState>, SaveError> {
        let identity = self.backend.resolve(SlotKey::Save(slot));
        match self.backend.read(&identity)? {
            Some(bytes) => Ok(Some(deserialize_state(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Screenshot bytes for a row; `Ok(None)` when the asset is absent
    /// (render without it).
    pub fn load_screenshot(&self, slot: SlotId) -> Result<Option<Vec<u8>>, StorageError> {
        self.backend
            .read(&self.backend.resolve_screenshot(SlotKey::Save(slot)))
    }

    fn title_for(&self, state: &GameState) -> String {
        if self.use_map_display_name && !state.map_display_name.is_empty() {
            state.map_display_name.clone()
        } else {
            self.game_title.clone()
        }
    }

    fn persist_index(&mut self) -> Result<(), SaveError> {
        let identity = self.backend.resolve(SlotKey::Global);
        let bytes = self.index.encode();
        self.backend.write(&identity, &bytes, false)?;
        Ok(())
    }
}

enum TicketState {
    Pending {
        listeners: Vec<Box<dyn FnOnce(Option<&[u8]>)>>,
    },
    Ready(Option<Vec<u8>>),
}

/// Completion signal for one screenshot read. Rows subscribe and defer
/// their dependent drawing until the image is ready; an absent or
/// unreadable asset completes with `None` and the row renders without it.
#[derive(Clone)]
pub struct ScreenshotTicket {
    state: Rc<RefCell<TicketState>>,
}

impl ScreenshotTicket {
    fn pending() -> Self {
        Self {
            state: Rc::new(RefCell::new(TicketState::Pending {
                listeners: Vec::new(),
            })),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), TicketState::Ready(_))
    }

    /// Runs `listener` once the read completes; immediately when it already
    /// has.
    pub fn on_ready(&self, listener: Box<dyn FnOnce(Option<&[u8]>)>) {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            TicketState::Pending { listeners } => listeners.push(listener),
            TicketState::Ready(bytes) => {
                let bytes = bytes.clone();
                drop(state);
                listener(bytes.as_deref());
            }
        }
    }

    fn complete(&self, bytes: Option<Vec<u8>>) {
        let listeners = {
            let mut state = self.state.borrow_mut();
            let drained = match &mut *state {
                TicketState::Pending { listeners } => std::mem::take(listeners),
                TicketState::Ready(_) => Vec::new(),
            };
            *state = TicketState::Ready(bytes.clone());
            drained
        };
        for listener in listeners {
            listener(bytes.as_deref());
        }
    }
}

/// Deferred screenshot reads. Requests queue up while rows are laid out and
/// resolve on the next pump from the host's frame loop, so retrieval never
/// blocks a draw call.
#[derive(Default)]
pub struct ScreenshotLoads {
    pending: Vec<(SlotId, ScreenshotTicket)>,
}

impl ScreenshotLoads {
    pub fn request(&mut self, slot: SlotId) -> ScreenshotTicket {
        let ticket = ScreenshotTicket::pending();
        self.pending.push((slot, ticket.clone()));
        ticket
    }

    pub fn pump(&mut self, registry: &SlotRegistry) {
        for (slot, ticket) in self.pending.drain(..) {
            let bytes = match registry.load_screenshot(slot) {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(slot = slot.0, error = %error, "screenshot_read_failed");
                    None
                }
            };
            ticket.complete(bytes);
        }
    }
}

/// Stable per-game session fingerprint recorded as the slot owner on the
/// web target.
pub fn session_fingerprint(game_title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(game_title.as_bytes());
    let digest = hasher.finalize();
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
