use crate::autosave::SuppressionGate;
use crate::layout::{layout, FontMetrics, WrapLayout};

/// Outer window padding, in px.
const WINDOW_PADDING: u32 = 18;
/// Per-choice inner text padding, in px.
const TEXT_PADDING: u32 = 6;
/// Choice columns never size below this.
const MIN_CHOICE_WIDTH: u32 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPhase {
    Closed,
    Open,
    Confirmed,
    Cancelled,
}

/// The caller-supplied resume point, invoked exactly once with the selected
/// choice index when the prompt reaches a terminal phase.
pub type Continuation = Box<dyn FnOnce(usize)>;

pub struct PromptRequest {
    pub message: String,
    /// Ordered choice labels; the last entry is the cancel choice.
    pub choices: Vec<String>,
    pub fade_on_confirm: bool,
    pub continuation: Continuation,
}

/// Fixed-size overrides from configuration; zero means size from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptStyle {
    pub fixed_width: u32,
    pub cursor_width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptGeometry {
    pub width: u32,
    pub height: u32,
    pub cursor_width: u32,
}

/// How a prompt resolved; the caller applies `fade` to the underlying
/// scene. Cancellation never fades, whatever the request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptResolution {
    pub phase: PromptPhase,
    pub selected_index: usize,
    pub fade: bool,
}

struct PromptState {
    choices: Vec<String>,
    fade_on_confirm: bool,
    continuation: Continuation,
    layout: WrapLayout,
    geometry: PromptGeometry,
    selected: usize,
}

/// Modal confirmation over a word-wrapped message and a choice list.
/// `Closed -> Open -> (Confirmed | Cancelled) -> Closed`; at most one
/// prompt is open at a time, and opening over an open prompt is a caller
/// error, not a handled state.
#[derive(Default)]
pub struct ConfirmationPrompt {
    state: Option<PromptState>,
}

impl ConfirmationPrompt {
    pub fn phase(&self) -> PromptPhase {
        if self.state.is_some() {
            PromptPhase::Open
        } else {
            PromptPhase::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Opens the prompt and suspends the calling flow. The continuation
    /// runs only from `select`/`cancel` on a later frame. Precondition:
    /// the prompt is closed.
    pub fn open(
        &mut self,
        request: PromptRequest,
        style: PromptStyle,
        metrics: &dyn FontMetrics,
        viewport_width: u32,
    ) {
        debug_assert!(self.state.is_none(), "prompt opened while already open");
        debug_assert!(!request.choices.is_empty(), "prompt needs at least one choice");

        // A fixed window width wraps the message inside the text padding;
        // auto width leaves the message unwrapped and sizes from it.
        let wrap_width = if style.fixed_width > 0 {
            style.fixed_width.saturating_sub(TEXT_PADDING * 2)
        } else {
            0
        };
        let message_layout = layout(&request.message, wrap_width, metrics);
        let geometry = compute_geometry(
            &request.choices,
            &message_layout,
            style,
            metrics,
            viewport_width,
        );
        let cancel_index = request.choices.len() - 1;

        self.state = Some(PromptState {
            choices: request.choices,
            fade_on_confirm: request.fade_on_confirm,
            continuation: request.continuation,
            layout: message_layout,
            geometry,
            selected: cancel_index,
        });
    }

    pub fn message_lines(&self) -> &[String] {
        self.state
            .as_ref()
            .map(|state| state.layout.lines.as_slice())
            .unwrap_or(&[])
    }

    pub fn choices(&self) -> &[String] {
        self.state
            .as_ref()
            .map(|state| state.choices.as_slice())
            .unwrap_or(&[])
    }

    pub fn geometry(&self) -> Option<PromptGeometry> {
        self.state.as_ref().map(|state| state.geometry)
    }

    /// The cursor position; the cancel choice is pre-selected on open.
    pub fn selected(&self) -> Option<usize> {
        self.state.as_ref().map(|state| state.selected)
    }

    pub fn set_selected(&mut self, index: usize) {
        if let Some(state) = self.state.as_mut() {
            if index < state.choices.len() {
                state.selected = index;
            }
        }
    }

    /// Confirms the currently highlighted choice.
    pub fn confirm_selected(&mut self, gate: &mut SuppressionGate) -> Option<PromptResolution> {
        let selected = self.selected()?;
        self.select(selected, gate)
    }

    /// Resolves the prompt on a chosen index. Selecting the cancel index
    /// behaves exactly like an explicit cancel input. Confirming arms the
    /// suppression gate before the continuation runs, so an autosave cannot
    /// fire into the scene transition the confirmation triggers.
    pub fn select(&mut self, index: usize, gate: &mut SuppressionGate) -> Option<PromptResolution> {
        let state = self.state.take()?;
        let cancel_index = state.choices.len() - 1;
        let index = index.min(cancel_index);
        let continuation = state.continuation;

        if index == cancel_index {
            continuation(cancel_index);
            Some(PromptResolution {
                phase: PromptPhase::Cancelled,
                selected_index: cancel_index,
                fade: false,
            })
        } else {
            gate.arm_default();
            continuation(index);
            Some(PromptResolution {
                phase: PromptPhase::Confirmed,
                selected_index: index,
                fade: state.fade_on_confirm,
            })
        }
    }

    /// Explicit cancel input (escape / right click).
    pub fn cancel(&mut self, gate: &mut SuppressionGate) -> Option<PromptResolution> {
        let cancel_index = self.state.as_ref()?.choices.len() - 1;
        self.select(cancel_index, gate)
    }

    /// Drops any open prompt without resolving it, for scene teardown. The
    /// continuation is discarded unfired.
    pub fn teardown(&mut self) {
        self.state = None;
    }
}

fn compute_geometry(
    choices: &[String],
    message_layout: &WrapLayout,
    style: PromptStyle,
    metrics: &dyn FontMetrics,
    viewport_width: u32,
) -> PromptGeometry {
    let width = if style.fixed_width > 0 {
        style.fixed_width.min(viewport_width)
    } else {
        let widest_choice = choices
            .iter()
            .map(|choice| metrics.text_width(choice) + TEXT_PADDING * 2)
            .max()
            .unwrap_or(0)
            .max(MIN_CHOICE_WIDTH);
        let content = widest_choice.max(message_layout.content_width);
        (content + WINDOW_PADDING * 2).min(viewport_width)
    };

    let list_height = choices.len() as u32 * metrics.line_height() + WINDOW_PADDING * 2;
    let height = list_height + message_layout.content_height;

    let cursor_width = if style.cursor_width > 0 {
        style.cursor_width
    } else {
        width.saturating_sub(WINDOW_PADDING * 2)
    };

    PromptGeometry {
        width,
        height,
        cursor_width,
    }
}
