use serde::Deserialize;
use thiserror::Error;

use crate::screenshot::{parse_hex_color, ImageFormat, ProcessOptions, WEB_SCREENSHOT_SCALE};
use crate::storage::{SlotId, SlotNaming};

/// Complete configuration surface for the save system. Field defaults match
/// the shipped parameter defaults; `normalized` applies the clamps and
/// fallbacks the system guarantees before anything else consumes the values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub game_title: String,
    pub save_name: String,
    pub autosave: AutosaveConfig,
    pub max_slots: u32,
    pub web_prepend: bool,
    /// Menu label for the in-game load command; empty disables the command.
    pub load_command_label: String,
    /// Save titles use the current map's display name instead of the game
    /// title when set.
    pub use_map_display_name: bool,
    pub screenshot: ScreenshotConfig,
    pub warnings: WarningConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub slot_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    pub directory: String,
    /// Capture scale for stored screenshots, 10..=100 percent.
    pub save_scale: u32,
    /// Scale applied when the list row renders the image, 10..=100 percent.
    pub display_scale: u32,
    /// `png` or `jpeg`; anything else normalizes to `png`.
    pub format: String,
    pub jpeg_quality: u32,
    pub border_color: String,
    pub border_thickness: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    /// Empty string disables the corresponding warning prompt.
    pub exit_message: String,
    pub overwrite_message: String,
    pub load_message: String,
    /// Fixed prompt width; 0 sizes from content.
    pub prompt_width: u32,
    /// Fixed cursor width; 0 sizes from the prompt contents.
    pub cursor_width: u32,
    pub confirm_label: String,
    pub cancel_label: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            game_title: String::new(),
            save_name: "Save".to_string(),
            autosave: AutosaveConfig::default(),
            max_slots: 20,
            web_prepend: true,
            load_command_label: "Load".to_string(),
            use_map_display_name: true,
            screenshot: ScreenshotConfig::default(),
            warnings: WarningConfig::default(),
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slot_id: 1,
        }
    }
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "save".to_string(),
            save_scale: 50,
            display_scale: 100,
            format: "png".to_string(),
            jpeg_quality: 50,
            border_color: "#ffffff".to_string(),
            border_thickness: 2,
        }
    }
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            exit_message: "Exit Without Saving?".to_string(),
            overwrite_message: "Confirm Save Overwrite?".to_string(),
            load_message: "Abort Current Game?".to_string(),
            prompt_width: 0,
            cursor_width: 0,
            confirm_label: "OK".to_string(),
            cancel_label: "Cancel".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_slots must be at least 1, got {max_slots}")]
    NoSlots { max_slots: u32 },
    #[error("autosave slot {slot_id} is outside 1..={max_slots}")]
    AutosaveSlotOutOfRange { slot_id: u32, max_slots: u32 },
    #[error("border_color {value:?} is not a hex color")]
    InvalidBorderColor { value: String },
}

impl SaveConfig {
    /// Applies clamps and fallbacks, then validates what cannot be fixed up.
    pub fn normalized(mut self) -> Result<SaveConfig, ConfigError> {
        if self.max_slots == 0 {
            return Err(ConfigError::NoSlots {
                max_slots: self.max_slots,
            });
        }
        if self.autosave.enabled
            && (self.autosave.slot_id == 0 || self.autosave.slot_id > self.max_slots)
        {
            return Err(ConfigError::AutosaveSlotOutOfRange {
                slot_id: self.autosave.slot_id,
                max_slots: self.max_slots,
            });
        }

        self.screenshot.save_scale = self.screenshot.save_scale.clamp(10, 100);
        self.screenshot.display_scale = self.screenshot.display_scale.clamp(10, 100);
        self.screenshot.jpeg_quality = self.screenshot.jpeg_quality.min(100);
        self.screenshot.format = ImageFormat::from_name(&self.screenshot.format)
            .extension()
            .to_string();
        if !self.screenshot.border_color.starts_with('#') {
            self.screenshot.border_color = format!("#{}", self.screenshot.border_color);
        }
        if parse_hex_color(&self.screenshot.border_color).is_none() {
            return Err(ConfigError::InvalidBorderColor {
                value: self.screenshot.border_color,
            });
        }
        Ok(self)
    }

    /// The configured autosave slot, while autosave is enabled.
    pub fn autosave_slot(&self) -> Option<SlotId> {
        self.autosave
            .enabled
            .then_some(SlotId(self.autosave.slot_id))
    }

    pub fn slot_naming(&self) -> SlotNaming {
        SlotNaming::new(&self.save_name, self.autosave_slot())
    }

    pub fn image_format(&self) -> ImageFormat {
        ImageFormat::from_name(&self.screenshot.format)
    }
}

impl ScreenshotConfig {
    /// Capture options for the active backend. Web targets pin the capture
    /// scale so stored screenshots stay within quota.
    pub fn process_options(&self, format: ImageFormat, is_local: bool) -> ProcessOptions {
        ProcessOptions {
            scale_percent: if is_local {
                self.save_scale
            } else {
                WEB_SCREENSHOT_SCALE
            },
            border_color: parse_hex_color(&self.border_color).unwrap_or([255, 255, 255]),
            border_thickness: self.border_thickness,
            format,
            jpeg_quality: self.jpeg_quality.min(100) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_normalize_cleanly() {
        let config = SaveConfig::default().normalized().expect("normalize");
        assert_eq!(config.max_slots, 20);
        assert_eq!(config.autosave_slot(), Some(SlotId(1)));
        assert_eq!(config.screenshot.format, "png");
    }

    #[test]
    fn zero_slots_is_rejected() {
        let config = SaveConfig {
            max_slots: 0,
            ..SaveConfig::default()
        };
        assert!(matches!(
            config.normalized(),
            Err(ConfigError::NoSlots { .. })
        ));
    }

    #[test]
    fn autosave_slot_must_fit_slot_range() {
        let config = SaveConfig {
            max_slots: 5,
            autosave: AutosaveConfig {
                enabled: true,
                slot_id: 6,
            },
            ..SaveConfig::default()
        };
        assert!(matches!(
            config.normalized(),
            Err(ConfigError::AutosaveSlotOutOfRange {
                slot_id: 6,
                max_slots: 5
            })
        ));
    }

    #[test]
    fn disabled_autosave_skips_slot_validation_and_yields_no_slot() {
        let config = SaveConfig {
            max_slots: 5,
            autosave: AutosaveConfig {
                enabled: false,
                slot_id: 99,
            },
            ..SaveConfig::default()
        };
        let config = config.normalized().expect("normalize");
        assert_eq!(config.autosave_slot(), None);
    }

    #[test]
    fn unknown_image_format_falls_back_to_png() {
        let mut config = SaveConfig::default();
        config.screenshot.format = "webp".to_string();
        let config = config.normalized().expect("normalize");
        assert_eq!(config.screenshot.format, "png");
        assert_eq!(config.image_format(), ImageFormat::Png);
    }

    #[test]
    fn scales_clamp_into_valid_range() {
        let mut config = SaveConfig::default();
        config.screenshot.save_scale = 3;
        config.screenshot.display_scale = 400;
        let config = config.normalized().expect("normalize");
        assert_eq!(config.screenshot.save_scale, 10);
        assert_eq!(config.screenshot.display_scale, 100);
    }

    #[test]
    fn bare_border_color_gains_hash_prefix() {
        let mut config = SaveConfig::default();
        config.screenshot.border_color = "a0b1c2".to_string();
        let config = config.normalized().expect("normalize");
        assert_eq!(config.screenshot.border_color, "#a0b1c2");
    }

    #[test]
    fn nonsense_border_color_is_rejected() {
        let mut config = SaveConfig::default();
        config.screenshot.border_color = "camouflage".to_string();
        assert!(matches!(
            config.normalized(),
            Err(ConfigError::InvalidBorderColor { .. })
        ));
    }

    #[test]
    fn web_process_options_pin_capture_scale() {
        let config = SaveConfig::default().normalized().expect("normalize");
        let local = config
            .screenshot
            .process_options(config.image_format(), true);
        let web = config
            .screenshot
            .process_options(config.image_format(), false);
        assert_eq!(local.scale_percent, 50);
        assert_eq!(web.scale_percent, WEB_SCREENSHOT_SCALE);
    }

    #[test]
    fn config_parses_from_partial_json() {
        let json = r#"{ "game_title": "My Game", "max_slots": 5 }"#;
        let config: SaveConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(config.game_title, "My Game");
        assert_eq!(config.max_slots, 5);
        assert_eq!(config.save_name, "Save");
    }
}
