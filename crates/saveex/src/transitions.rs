use std::cell::RefCell;
use std::rc::Rc;

use crate::autosave::SuppressionGate;
use crate::config::SaveConfig;
use crate::layout::FontMetrics;
use crate::prompt::{ConfirmationPrompt, PromptRequest, PromptStyle};

/// Menu-session state that used to live in ambient globals: whether the
/// game was saved since the menu opened, and whether loading should warn.
/// Shared with prompt continuations, so it lives behind a handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionFlags {
    pub recent_save: bool,
    pub load_warning: bool,
}

pub type SessionFlagsHandle = Rc<RefCell<SessionFlags>>;

/// Whether a requested transition ran synchronously or was parked behind a
/// prompt. Callers must treat `Prompted` as a suspension: the action runs
/// from the prompt continuation on a later frame, or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    RanNow,
    Prompted,
}

/// Gates the three risky transitions (overwrite, load-over-active-game,
/// exit-without-saving) behind their configured warnings. An empty warning
/// message disables that specific warning and the transition runs directly.
pub struct TransitionFlow {
    flags: SessionFlagsHandle,
    exit_message: String,
    overwrite_message: String,
    load_message: String,
    load_command_label: String,
    confirm_label: String,
    cancel_label: String,
    style: PromptStyle,
}

impl TransitionFlow {
    pub fn from_config(config: &SaveConfig) -> Self {
        Self {
            flags: Rc::new(RefCell::new(SessionFlags::default())),
            exit_message: config.warnings.exit_message.clone(),
            overwrite_message: config.warnings.overwrite_message.clone(),
            load_message: config.warnings.load_message.clone(),
            load_command_label: config.load_command_label.clone(),
            confirm_label: config.warnings.confirm_label.clone(),
            cancel_label: config.warnings.cancel_label.clone(),
            style: PromptStyle {
                fixed_width: config.warnings.prompt_width,
                cursor_width: config.warnings.cursor_width,
            },
        }
    }

    pub fn flags(&self) -> SessionFlagsHandle {
        Rc::clone(&self.flags)
    }

    pub fn recent_save(&self) -> bool {
        self.flags.borrow().recent_save
    }

    /// The in-game menu's load command label, when the command is enabled.
    pub fn menu_load_command(&self) -> Option<&str> {
        (!self.load_command_label.is_empty()).then_some(self.load_command_label.as_str())
    }

    /// The menu load command was picked: loading from here warns if a load
    /// warning is configured.
    pub fn on_menu_load_selected(&self) {
        self.flags.borrow_mut().load_warning = !self.load_message.is_empty();
    }

    /// The menu closed back into the game; both flags reset.
    pub fn on_menu_closed(&self) {
        *self.flags.borrow_mut() = SessionFlags::default();
    }

    /// Saving into a slot. Overwriting a slot owned by this session warns
    /// first; empty slots, foreign slots, and a disabled warning save
    /// directly.
    pub fn request_save(
        &self,
        prompt: &mut ConfirmationPrompt,
        metrics: &dyn FontMetrics,
        viewport_width: u32,
        slot_owned: bool,
        save_action: Box<dyn FnOnce()>,
    ) -> TransitionDecision {
        if self.overwrite_message.is_empty() || !slot_owned {
            self.flags.borrow_mut().recent_save = true;
            save_action();
            return TransitionDecision::RanNow;
        }

        let flags = self.flags();
        prompt.open(
            PromptRequest {
                message: self.overwrite_message.clone(),
                choices: self.choice_labels(),
                fade_on_confirm: false,
                continuation: Box::new(move |index| {
                    if index == 0 {
                        flags.borrow_mut().recent_save = true;
                        save_action();
                    }
                }),
            },
            self.style,
            metrics,
            viewport_width,
        );
        TransitionDecision::Prompted
    }

    /// Loading a slot owned by this session. From the in-game menu the load
    /// warning applies (confirming fades the scene); from the title path no
    /// prompt is shown, but the gate still arms so an autosave cannot fire
    /// into the load transition.
    pub fn request_load(
        &self,
        prompt: &mut ConfirmationPrompt,
        gate: &mut SuppressionGate,
        metrics: &dyn FontMetrics,
        viewport_width: u32,
        slot_owned: bool,
        load_action: Box<dyn FnOnce()>,
    ) -> TransitionDecision {
        let warn = self.flags.borrow().load_warning && slot_owned;
        if !warn {
            gate.arm_default();
            self.flags.borrow_mut().recent_save = false;
            load_action();
            return TransitionDecision::RanNow;
        }

        let flags = self.flags();
        prompt.open(
            PromptRequest {
                message: self.load_message.clone(),
                choices: self.choice_labels(),
                fade_on_confirm: true,
                continuation: Box::new(move |index| {
                    if index == 0 {
                        flags.borrow_mut().recent_save = false;
                        load_action();
                    }
                }),
            },
            self.style,
            metrics,
            viewport_width,
        );
        TransitionDecision::Prompted
    }

    /// Exiting to the title. A save made this menu session skips the
    /// warning; otherwise confirming fades out, resets the session flags,
    /// and runs the exit.
    pub fn request_exit(
        &self,
        prompt: &mut ConfirmationPrompt,
        metrics: &dyn FontMetrics,
        viewport_width: u32,
        exit_action: Box<dyn FnOnce()>,
    ) -> TransitionDecision {
        let warn = !self.exit_message.is_empty() && !self.flags.borrow().recent_save;
        if !warn {
            *self.flags.borrow_mut() = SessionFlags::default();
            exit_action();
            return TransitionDecision::RanNow;
        }

        let flags = self.flags();
        prompt.open(
            PromptRequest {
                message: self.exit_message.clone(),
                choices: self.choice_labels(),
                fade_on_confirm: true,
                continuation: Box::new(move |index| {
                    if index == 0 {
                        *flags.borrow_mut() = SessionFlags::default();
                        exit_action();
                    }
                }),
            },
            self.style,
            metrics,
            viewport_width,
        );
        TransitionDecision::Prompted
    }

    fn choice_labels(&self) -> Vec<String> {
        vec![self.confirm_label.clone(), self.cancel_label.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SaveConfig, WarningConfig};
    use crate::layout::MonoMetrics;

    const VIEWPORT: u32 = 816;

    fn flow() -> TransitionFlow {
        TransitionFlow::from_config(&SaveConfig::default().normalized().expect("config"))
    }

    fn recorder() -> (Rc<RefCell<usize>>, Box<dyn FnOnce()>) {
        let count = Rc::new(RefCell::new(0usize));
        let recorded = Rc::clone(&count);
        (count, Box::new(move || *recorded.borrow_mut() += 1))
    }

    #[test]
    fn saving_into_unowned_slot_runs_directly_and_marks_recent_save() {
        let flow = flow();
        let mut prompt = ConfirmationPrompt::default();
        let (count, action) = recorder();

        let decision =
            flow.request_save(&mut prompt, &MonoMetrics::default(), VIEWPORT, false, action);
        assert_eq!(decision, TransitionDecision::RanNow);
        assert_eq!(*count.borrow(), 1);
        assert!(flow.recent_save());
        assert!(!prompt.is_open());
    }

    #[test]
    fn overwriting_owned_slot_prompts_and_confirm_saves() {
        let flow = flow();
        let mut prompt = ConfirmationPrompt::default();
        let mut gate = SuppressionGate::default();
        let (count, action) = recorder();

        let decision =
            flow.request_save(&mut prompt, &MonoMetrics::default(), VIEWPORT, true, action);
        assert_eq!(decision, TransitionDecision::Prompted);
        assert!(prompt.is_open());
        assert_eq!(*count.borrow(), 0);

        let resolution = prompt.select(0, &mut gate).expect("resolution");
        assert!(!resolution.fade, "save confirmation never fades");
        assert_eq!(*count.borrow(), 1);
        assert!(flow.recent_save());
        assert!(gate.is_armed());
    }

    #[test]
    fn cancelled_overwrite_leaves_state_untouched() {
        let flow = flow();
        let mut prompt = ConfirmationPrompt::default();
        let mut gate = SuppressionGate::default();
        let (count, action) = recorder();

        flow.request_save(&mut prompt, &MonoMetrics::default(), VIEWPORT, true, action);
        prompt.cancel(&mut gate).expect("resolution");
        assert_eq!(*count.borrow(), 0);
        assert!(!flow.recent_save());
        assert!(!gate.is_armed());
    }

    #[test]
    fn disabled_overwrite_warning_saves_directly() {
        let config = SaveConfig {
            warnings: WarningConfig {
                overwrite_message: String::new(),
                ..WarningConfig::default()
            },
            ..SaveConfig::default()
        }
        .normalized()
        .expect("config");
        let flow = TransitionFlow::from_config(&config);
        let mut prompt = ConfirmationPrompt::default();
        let (count, action) = recorder();

        let decision =
            flow.request_save(&mut prompt, &MonoMetrics::default(), VIEWPORT, true, action);
        assert_eq!(decision, TransitionDecision::RanNow);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn menu_load_prompts_and_confirm_fades() {
        let flow = flow();
        flow.on_menu_load_selected();
        let mut prompt = ConfirmationPrompt::default();
        let mut gate = SuppressionGate::default();
        let (count, action) = recorder();

        let decision = flow.request_load(
            &mut prompt,
            &mut gate,
            &MonoMetrics::default(),
            VIEWPORT,
            true,
            action,
        );
        assert_eq!(decision, TransitionDecision::Prompted);

        let resolution = prompt.select(0, &mut gate).expect("resolution");
        assert!(resolution.fade);
        assert!(gate.is_armed());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn title_path_load_arms_gate_without_prompting() {
        let flow = flow();
        let mut prompt = ConfirmationPrompt::default();
        let mut gate = SuppressionGate::default();
        let (count, action) = recorder();

        let decision = flow.request_load(
            &mut prompt,
            &mut gate,
            &MonoMetrics::default(),
            VIEWPORT,
            true,
            action,
        );
        assert_eq!(decision, TransitionDecision::RanNow);
        assert!(!prompt.is_open());
        assert!(gate.is_armed());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn loading_foreign_slot_skips_the_warning() {
        let flow = flow();
        flow.on_menu_load_selected();
        let mut prompt = ConfirmationPrompt::default();
        let mut gate = SuppressionGate::default();
        let (count, action) = recorder();

        let decision = flow.request_load(
            &mut prompt,
            &mut gate,
            &MonoMetrics::default(),
            VIEWPORT,
            false,
            action,
        );
        assert_eq!(decision, TransitionDecision::RanNow);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn exit_after_recent_save_skips_the_warning() {
        let flow = flow();
        flow.flags().borrow_mut().recent_save = true;
        let mut prompt = ConfirmationPrompt::default();
        let (count, action) = recorder();

        let decision =
            flow.request_exit(&mut prompt, &MonoMetrics::default(), VIEWPORT, action);
        assert_eq!(decision, TransitionDecision::RanNow);
        assert_eq!(*count.borrow(), 1);
        assert!(!flow.recent_save());
    }

    #[test]
    fn exit_without_recent_save_prompts_and_cancel_stays() {
        let flow = flow();
        let mut prompt = ConfirmationPrompt::default();
        let mut gate = SuppressionGate::default();
        let (count, action) = recorder();

        let decision =
            flow.request_exit(&mut prompt, &MonoMetrics::default(), VIEWPORT, action);
        assert_eq!(decision, TransitionDecision::Prompted);

        prompt.cancel(&mut gate).expect("resolution");
        assert_eq!(*count.borrow(), 0);
        assert!(!gate.is_armed());
    }

    #[test]
    fn confirmed_exit_resets_flags() {
        let flow = flow();
        flow.on_menu_load_selected();
        let mut prompt = ConfirmationPrompt::default();
        let mut gate = SuppressionGate::default();
        let (count, action) = recorder();

        flow.request_exit(&mut prompt, &MonoMetrics::default(), VIEWPORT, action);
        prompt.select(0, &mut gate).expect("resolution");
        assert_eq!(*count.borrow(), 1);
        let flags = *flow.flags().borrow();
        assert!(!flags.recent_save);
        assert!(!flags.load_warning);
    }

    #[test]
    fn menu_close_resets_both_flags() {
        let flow = flow();
        flow.flags().borrow_mut().recent_save = true;
        flow.on_menu_load_selected();
        flow.on_menu_closed();
        let flags = *flow.flags().borrow();
        assert!(!flags.recent_save);
        assert!(!flags.load_warning);
    }

    #[test]
    fn empty_load_command_label_disables_the_menu_command() {
        let config = SaveConfig {
            load_command_label: String::new(),
            ..SaveConfig::default()
        }
        .normalized()
        .expect("config");
        let disabled = TransitionFlow::from_config(&config);
        assert_eq!(disabled.menu_load_command(), None);
        assert_eq!(flow().menu_load_command(), Some("Load"));
    }
}
