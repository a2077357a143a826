/// Text measurement is the host renderer's job; the layout only ever asks
/// for widths and the line height.
pub trait FontMetrics {
    fn text_width(&self, text: &str) -> u32;
    fn line_height(&self) -> u32;
}

/// Fixed-advance metrics for hosts without a measuring font. Also what the
/// tests measure with, so layouts stay deterministic.
#[derive(Debug, Clone, Copy)]
pub struct MonoMetrics {
    pub advance: u32,
    pub line_height: u32,
}

impl Default for MonoMetrics {
    fn default() -> Self {
        Self {
            advance: 8,
            line_height: 21,
        }
    }
}

impl FontMetrics for MonoMetrics {
    fn text_width(&self, text: &str) -> u32 {
        text.chars().count() as u32 * self.advance
    }

    fn line_height(&self) -> u32 {
        self.line_height
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapLayout {
    pub lines: Vec<String>,
    pub content_width: u32,
    pub content_height: u32,
}

/// Greedy word-wrap. With `max_width` zero the message stays a single
/// unwrapped line. Otherwise words accumulate onto the current line while
/// the joined text still fits; a single word wider than the limit stays on
/// its own line unsplit. Empty lines are dropped. Pure in its inputs, so
/// re-laying out on a refresh yields the same lines.
pub fn layout(message: &str, max_width: u32, metrics: &dyn FontMetrics) -> WrapLayout {
    let lines = if max_width == 0 {
        if message.is_empty() {
            Vec::new()
        } else {
            vec![message.to_string()]
        }
    } else {
        wrap_words(message, max_width, metrics)
    };

    let content_width = lines
        .iter()
        .map(|line| metrics.text_width(line))
        .max()
        .unwrap_or(0);
    let content_height = lines.len() as u32 * metrics.line_height();

    WrapLayout {
        lines,
        content_width,
        content_height,
    }
}

fn wrap_words(message: &str, max_width: u32, metrics: &dyn FontMetrics) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in message.split(' ').filter(|word| !word.is_empty()) {
        if current.is_empty() {
            current = word.to_string();
            continue;
        }
        let candidate = format!("{current} {word}");
        if metrics.text_width(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
