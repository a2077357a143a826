pub mod autosave;
pub mod command;
pub mod config;
pub mod layout;
pub mod payload;
pub mod prompt;
pub mod registry;
pub mod screenshot;
pub mod storage;
pub mod transitions;

pub use autosave::{AutosaveController, SaveHost, SuppressionGate, DEFAULT_SUPPRESSION};
pub use command::Command;
pub use config::{
    AutosaveConfig, ConfigError, SaveConfig, ScreenshotConfig, WarningConfig,
};
pub use layout::{layout, FontMetrics, MonoMetrics, WrapLayout};
pub use payload::{
    deserialize_state, format_playtime, serialize_state, GameState, MapEvent, MoveRoute, SaveError,
};
pub use prompt::{
    ConfirmationPrompt, PromptGeometry, PromptPhase, PromptRequest, PromptResolution, PromptStyle,
};
pub use registry::{
    session_fingerprint, GlobalIndex, ScreenshotLoads, ScreenshotTicket, SlotIndexEntry,
    SlotRegistry,
};
pub use screenshot::{
    ImageFormat, ProcessOptions, ScreenshotArtifact, ScreenshotCodec, ScreenshotError, Snapshot,
    WEB_SCREENSHOT_SCALE,
};
pub use storage::{
    KeyValueStore, LocalBackend, MemoryStore, SlotId, SlotKey, SlotNaming, StorageBackend,
    StorageError, StorageIdentity, WebBackend,
};
pub use transitions::{SessionFlags, SessionFlagsHandle, TransitionDecision, TransitionFlow};
