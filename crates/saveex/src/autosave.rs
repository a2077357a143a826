use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::SaveConfig;
use crate::registry::SlotRegistry;
use crate::screenshot::{ProcessOptions, ScreenshotCodec, Snapshot};
use crate::storage::SlotId;

/// How long autosave stays suppressed after a confirmed risky transition.
pub const DEFAULT_SUPPRESSION: Duration = Duration::from_millis(3000);

/// Timed flag that drops autosave requests right after a warning prompt is
/// confirmed: the confirmation itself can trigger a scene transition that
/// would otherwise race an autosave of the old state. Expiry is observed
/// lazily; re-arming overwrites the deadline (last write wins), which also
/// retires the previously scheduled disarm.
#[derive(Debug, Default)]
pub struct SuppressionGate {
    armed_until: Option<Instant>,
}

impl SuppressionGate {
    pub fn arm(&mut self, duration: Duration) {
        self.armed_until = Some(Instant::now() + duration);
    }

    pub fn arm_default(&mut self) {
        self.arm(DEFAULT_SUPPRESSION);
    }

    pub fn disarm(&mut self) {
        self.armed_until = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_until
            .is_some_and(|deadline| Instant::now() < deadline)
    }
}

/// The host-side collaborators an autosave needs: a framebuffer to capture,
/// the pre-save hook, and the current game state.
pub trait SaveHost {
    /// `None` when no surface is available (e.g. mid-transfer).
    fn frame(&self) -> Option<Snapshot>;

    fn before_save(&mut self);

    fn state(&self) -> &crate::payload::GameState;
}

/// Orchestrates `capture -> hook -> serialize -> write -> clean backup` for
/// the reserved autosave slot. Each request runs the linear pipeline to
/// completion or not at all; the suppression gate is an orthogonal check at
/// the entrance, not a pipeline state.
pub struct AutosaveController {
    slot: Option<SlotId>,
    screenshot_enabled: bool,
    process_options: ProcessOptions,
    gate: SuppressionGate,
}

impl AutosaveController {
    pub fn from_config(config: &SaveConfig, backend_is_local: bool) -> Self {
        Self {
            slot: config.autosave_slot(),
            screenshot_enabled: config.screenshot.enabled,
            process_options: config
                .screenshot
                .process_options(config.image_format(), backend_is_local),
            gate: SuppressionGate::default(),
        }
    }

    pub fn arm_suppression(&mut self, duration: Duration) {
        self.gate.arm(duration);
    }

    pub fn gate(&self) -> &SuppressionGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut SuppressionGate {
        &mut self.gate
    }

    /// Runs one autosave. Returns `false` without side effects when
    /// autosave is disabled or the gate is armed; returns `false` with the
    /// prior save data untouched when the write fails.
    pub fn request_autosave(
        &mut self,
        host: &mut dyn SaveHost,
        codec: &mut ScreenshotCodec,
        registry: &mut SlotRegistry,
    ) -> bool {
        let Some(slot) = self.slot else {
            return false;
        };
        if self.gate.is_armed() {
            return false;
        }

        if self.screenshot_enabled {
            if let Some(snapshot) = host.frame() {
                if let Err(error) = codec.capture_into_pending(&snapshot, &self.process_options) {
                    warn!(error = %error, "autosave_screenshot_failed");
                }
            }
        }

        host.before_save();
        let screenshot = codec.take_pending();
        match registry.save_slot(slot, host.state(), screenshot) {
            Ok(()) => {
                info!(slot = slot.0, "autosave_written");
                true
            }
            Err(error) => {
                warn!(slot = slot.0, error = %error, "autosave_failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::{AutosaveConfig, SaveConfig};
    use crate::payload::{GameState, MapEvent, MoveRoute};
    use crate::registry::SlotRegistry;
    use crate::storage::{LocalBackend, SlotId};

    struct TestHost {
        state: GameState,
        before_save_calls: usize,
        has_frame: bool,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                state: GameState {
                    map_id: 1,
                    map_display_name: "Old Mill".to_string(),
                    party: vec!["Mina".to_string()],
                    playtime_seconds: 42,
                    events: Vec::new(),
                },
                before_save_calls: 0,
                has_frame: true,
            }
        }
    }

    impl SaveHost for TestHost {
        fn frame(&self) -> Option<Snapshot> {
            self.has_frame
                .then(|| Snapshot::new(32, 24, vec![128u8; 32 * 24 * 4]).expect("snapshot"))
        }

        fn before_save(&mut self) {
            self.before_save_calls += 1;
        }

        fn state(&self) -> &GameState {
            &self.state
        }
    }

    fn autosave_config() -> SaveConfig {
        SaveConfig {
            game_title: "My Game".to_string(),
            max_slots: 5,
            autosave: AutosaveConfig {
                enabled: true,
                slot_id: 1,
            },
            ..SaveConfig::default()
        }
        .normalized()
        .expect("config")
    }

    fn registry_in(temp: &TempDir, config: &SaveConfig) -> SlotRegistry {
        let backend = LocalBackend::new(
            temp.path().join("save"),
            temp.path().join("save"),
            "png",
            config.slot_naming(),
        );
        SlotRegistry::open(Box::new(backend), config)
    }

    #[test]
    fn autosave_writes_slot_and_screenshot() {
        let temp = TempDir::new().expect("tempdir");
        let config = autosave_config();
        let mut registry = registry_in(&temp, &config);
        let mut controller = AutosaveController::from_config(&config, true);
        let mut codec = ScreenshotCodec::default();
        let mut host = TestHost::new();

        assert!(controller.request_autosave(&mut host, &mut codec, &mut registry));
        assert_eq!(host.before_save_calls, 1);
        assert!(temp.path().join("save").join("autosave.sav").is_file());
        assert!(temp.path().join("save").join("autosave.png").is_file());
        assert!(!codec.has_pending());
    }

    #[test]
    fn disabled_autosave_request_is_a_silent_noop() {
        let temp = TempDir::new().expect("tempdir");
        let config = SaveConfig {
            autosave: AutosaveConfig {
                enabled: false,
                slot_id: 1,
            },
            ..autosave_config()
        }
        .normalized()
        .expect("config");
        let mut registry = registry_in(&temp, &config);
        let mut controller = AutosaveController::from_config(&config, true);
        let mut codec = ScreenshotCodec::default();
        let mut host = TestHost::new();

        assert!(!controller.request_autosave(&mut host, &mut codec, &mut registry));
        assert_eq!(host.before_save_calls, 0);
    }

    #[test]
    fn armed_gate_drops_requests_until_expiry() {
        let temp = TempDir::new().expect("tempdir");
        let config = autosave_config();
        let mut registry = registry_in(&temp, &config);
        let mut controller = AutosaveController::from_config(&config, true);
        let mut codec = ScreenshotCodec::default();
        let mut host = TestHost::new();

        controller.arm_suppression(Duration::from_secs(3600));
        assert!(!controller.request_autosave(&mut host, &mut codec, &mut registry));
        assert!(!controller.request_autosave(&mut host, &mut codec, &mut registry));
        assert_eq!(host.before_save_calls, 0);
        assert!(!temp.path().join("save").join("autosave.sav").exists());

        // An elapsed deadline disarms without any timer callback.
        controller.arm_suppression(Duration::ZERO);
        assert!(controller.request_autosave(&mut host, &mut codec, &mut registry));
    }

    #[test]
    fn rearming_resets_the_deadline_last_write_wins() {
        let mut gate = SuppressionGate::default();
        gate.arm(Duration::from_secs(3600));
        assert!(gate.is_armed());

        gate.arm(Duration::ZERO);
        assert!(!gate.is_armed());

        gate.arm(Duration::from_secs(3600));
        assert!(gate.is_armed());
        gate.disarm();
        assert!(!gate.is_armed());
    }

    #[test]
    fn failed_serialization_keeps_prior_autosave_data() {
        let temp = TempDir::new().expect("tempdir");
        let config = autosave_config();
        let mut registry = registry_in(&temp, &config);
        let mut controller = AutosaveController::from_config(&config, true);
        let mut codec = ScreenshotCodec::default();
        let mut host = TestHost::new();

        assert!(controller.request_autosave(&mut host, &mut codec, &mut registry));

        host.state.events = vec![MapEvent {
            id: 3,
            name: "spinner".to_string(),
            route: Some(MoveRoute {
                target_event: Some(3),
                repeat: true,
                commands: Vec::new(),
            }),
        }];
        assert!(!controller.request_autosave(&mut host, &mut codec, &mut registry));

        let loaded = registry
            .load_slot(SlotId(1))
            .expect("load")
            .expect("prior autosave");
        assert!(loaded.events.is_empty());
    }

    #[test]
    fn missing_frame_still_saves_without_screenshot() {
        let temp = TempDir::new().expect("tempdir");
        let config = autosave_config();
        let mut registry = registry_in(&temp, &config);
        let mut controller = AutosaveController::from_config(&config, true);
        let mut codec = ScreenshotCodec::default();
        let mut host = TestHost::new();
        host.has_frame = false;

        assert!(controller.request_autosave(&mut host, &mut codec, &mut registry));
        assert!(temp.path().join("save").join("autosave.sav").is_file());
        assert!(!temp.path().join("save").join("autosave.png").exists());
    }
}
