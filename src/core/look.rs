//! Colors, text styles and the combined cell appearance.

use bitflags::bitflags;

/// A terminal color request.
///
/// `NoChange` is a write-time instruction ("leave this component as-is");
/// it is resolved before storage and never appears in a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    NoChange,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    /// Resolve a write-time request against the currently stored color.
    pub fn resolved_over(self, current: Color) -> Color {
        match self {
            Color::NoChange => current,
            other => other,
        }
    }

    /// SGR sub-parameters selecting this color as the foreground.
    pub(crate) fn push_fg_params(&self, params: &mut Vec<String>) {
        match self {
            Color::Default => params.push("39".to_string()),
            Color::Indexed(n) => params.push(format!("38;5;{n}")),
            Color::Rgb(r, g, b) => params.push(format!("38;2;{r};{g};{b}")),
            Color::NoChange => {}
        }
    }

    /// SGR sub-parameters selecting this color as the background.
    pub(crate) fn push_bg_params(&self, params: &mut Vec<String>) {
        match self {
            Color::Default => params.push("49".to_string()),
            Color::Indexed(n) => params.push(format!("48;5;{n}")),
            Color::Rgb(r, g, b) => params.push(format!("48;2;{r};{g};{b}")),
            Color::NoChange => {}
        }
    }
}

bitflags! {
    /// Text style attributes, encoded as SGR parameters on flush.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Style: u8 {
        const BOLD      = 1 << 0;
        const DIM       = 1 << 1;
        const ITALIC    = 1 << 2;
        const UNDERLINE = 1 << 3;
        const BLINK     = 1 << 4;
        const REVERSE   = 1 << 5;
        const STRIKE    = 1 << 6;
    }
}

const STYLE_CODES: &[(Style, &str, &str)] = &[
    (Style::BOLD, "1", "22"),
    (Style::DIM, "2", "22"),
    (Style::ITALIC, "3", "23"),
    (Style::UNDERLINE, "4", "24"),
    (Style::BLINK, "5", "25"),
    (Style::REVERSE, "7", "27"),
    (Style::STRIKE, "9", "29"),
];

/// SGR sub-parameters transitioning `from` into `to`.
///
/// SGR 22 clears both bold and dim, so dropping one of the pair re-asserts
/// the survivor.
pub(crate) fn push_style_transition(from: Style, to: Style, params: &mut Vec<String>) {
    let removed = from - to;
    let mut current = from;

    if removed.intersects(Style::BOLD | Style::DIM) {
        params.push("22".to_string());
        current -= Style::BOLD | Style::DIM;
    }

    for (flag, on, off) in STYLE_CODES {
        if to.contains(*flag) && !current.contains(*flag) {
            params.push((*on).to_string());
        } else if !to.contains(*flag) && current.contains(*flag) {
            params.push((*off).to_string());
        }
    }
}

/// A cell's complete appearance: foreground, background and style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Look {
    pub fg: Color,
    pub bg: Color,
    pub style: Style,
}

impl Look {
    pub const fn new(fg: Color, bg: Color, style: Style) -> Self {
        Self { fg, bg, style }
    }

    pub fn with_fg(fg: Color) -> Self {
        Self {
            fg,
            ..Self::default()
        }
    }

    /// Resolve `NoChange` components against a stored look.
    pub fn resolved_over(self, current: Look) -> Look {
        Look {
            fg: self.fg.resolved_over(current.fg),
            bg: self.bg.resolved_over(current.bg),
            style: self.style,
        }
    }
}
