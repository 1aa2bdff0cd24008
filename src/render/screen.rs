//! Double-buffered screen with differential flush.
//!
//! Invariant: after a successful flush the front buffer equals the back
//! buffer and no cell is dirty. All terminal bytes leave through the single
//! sink handed to [`Screen::new`].

use std::io::{self, Write};
use std::os::unix::io::RawFd;

use log::error;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::cell::{Cell, ScreenBuffer};
use crate::core::geometry::{Pos, Rectangle, Size};
use crate::core::look::{push_style_transition, Color, Look, Style};
use crate::core::text::utf8::is_breaking_space;
use crate::core::text::width::grapheme_width;
use crate::platform::terminal::{read_winsize, FdWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// What the terminal is believed to hold; `None` components are unknown and
/// force a full emission on the next cell.
struct CursorState {
    pos: Option<Pos>,
    fg: Option<Color>,
    bg: Option<Color>,
    style: Option<Style>,
}

impl CursorState {
    fn unknown() -> Self {
        Self {
            pos: None,
            fg: None,
            bg: None,
            style: None,
        }
    }
}

pub struct Screen {
    back: ScreenBuffer,
    front: ScreenBuffer,
    client_cursor: Pos,
    out: Box<dyn Write>,
    size_fd: Option<RawFd>,
}

impl Screen {
    /// Screen writing to an arbitrary sink (tests, capture).
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            back: ScreenBuffer::default(),
            front: ScreenBuffer::default(),
            client_cursor: Pos::default(),
            out,
            size_fd: None,
        }
    }

    /// Screen bound to a terminal fd for both output and size queries.
    pub fn bound_to_fd(fd: RawFd) -> Self {
        let mut screen = Self::new(Box::new(FdWriter::new(fd)));
        screen.size_fd = Some(fd);
        screen
    }

    pub fn size(&self) -> Size {
        self.back.size()
    }

    pub fn rect(&self) -> Rectangle {
        Rectangle::new(Pos::default(), self.size())
    }

    /// Current terminal size via TIOCGWINSZ, falling back to 80x24.
    pub fn get_terminal_size(&self) -> Size {
        self.size_fd
            .and_then(read_winsize)
            .unwrap_or(Size::new(80, 24))
    }

    /// Resize both buffers. The overlap keeps its content; the front buffer
    /// is conservatively marked entirely dirty so the next flush repaints
    /// the whole visible region.
    pub fn set_size(&mut self, size: Size) {
        self.back.set_size(size);
        self.front.set_size(size);
        self.front.mark_all_dirty();
    }

    pub fn go_to(&mut self, pos: Pos) {
        self.client_cursor = pos;
    }

    pub fn cursor(&self) -> Pos {
        self.client_cursor
    }

    /// Display columns `s` would occupy, without wrapping.
    pub fn measure(&self, s: &str) -> usize {
        s.graphemes(true).map(grapheme_width).sum()
    }

    pub fn set_cell(&mut self, pos: Pos, grapheme: &str, width: u8, look: Look) {
        self.back.set_cell(pos, grapheme, width, look);
    }

    /// Clear the whole screen to a blank with the given colors; `NoChange`
    /// components keep each cell's stored color.
    pub fn clear(&mut self, bg: Color, fg: Color) {
        self.back.clear(bg, fg);
    }

    /// Clear a rectangular region, releasing any double-width pair that
    /// straddles the region edge.
    pub fn clear_rect(&mut self, rect: Rectangle, bg: Color, fg: Color) {
        let rect = rect.clamped_to(self.size());
        let look = Look::new(fg, bg, Style::default());
        for y in rect.pos.y..rect.bottom() {
            for x in rect.pos.x..rect.right() {
                self.back.set_cell(Pos::new(x, y), "", 1, look);
            }
        }
    }

    /// Print at the client cursor, advancing it.
    pub fn print(&mut self, s: &str, look: Look) -> usize {
        let start = self.client_cursor;
        self.put_text(start, None, s, look)
    }

    /// Print at an explicit position.
    pub fn print_at(&mut self, pos: Pos, s: &str, look: Look) -> usize {
        self.put_text(pos, None, s, look)
    }

    /// Print wrapping at `wrap_width` columns, breaking only at breaking
    /// whitespace. Returns the display columns emitted.
    pub fn print_wrapped(&mut self, pos: Pos, wrap_width: u16, s: &str, look: Look) -> usize {
        self.put_text(pos, Some(wrap_width), s, look)
    }

    /// Print relative to an anchor: `Left` starts at it, `Center` centers on
    /// it, `Right` ends at it.
    pub fn print_aligned(&mut self, align: Alignment, anchor: Pos, s: &str, look: Look) -> usize {
        let width = self.measure(s) as u16;
        let x = match align {
            Alignment::Left => anchor.x,
            Alignment::Center => anchor.x.saturating_sub(width / 2),
            Alignment::Right => anchor.x.saturating_sub(width.saturating_sub(1)),
        };
        self.put_text(Pos::new(x, anchor.y), None, s, look)
    }

    fn put_text(&mut self, start: Pos, wrap_width: Option<u16>, s: &str, look: Look) -> usize {
        let line_limit = wrap_width.map(|w| u32::from(start.x) + u32::from(w));
        let mut pos = start;
        let mut emitted = 0usize;

        let mut wrap = |pos: &mut Pos| {
            *pos = Pos::new(start.x, pos.y.saturating_add(1));
        };

        for (is_break, token) in tokenize(s) {
            if token == "\n" || token == "\r\n" {
                wrap(&mut pos);
                continue;
            }

            if is_break {
                let width = grapheme_width(token) as u16;
                if width == 0 {
                    // Zero-width break opportunity, nothing to place.
                    continue;
                }
                if let Some(limit) = line_limit {
                    if u32::from(pos.x) + u32::from(width) > limit {
                        // The space is swallowed by the wrap.
                        wrap(&mut pos);
                        continue;
                    }
                }
                self.back.set_cell(pos, token, width as u8, look);
                pos.x = pos.x.saturating_add(width);
                emitted += usize::from(width);
                continue;
            }

            let word_width = self.measure(token) as u32;
            if let Some(limit) = line_limit {
                let fits_fresh = u32::from(start.x) + word_width <= limit;
                if u32::from(pos.x) + word_width > limit && fits_fresh && pos.x > start.x {
                    wrap(&mut pos);
                }
            }

            for grapheme in token.graphemes(true) {
                let width = grapheme_width(grapheme) as u16;
                if width == 0 {
                    continue;
                }
                if let Some(limit) = line_limit {
                    if u32::from(pos.x) + u32::from(width) > limit {
                        // Overlong word: hard break at the limit.
                        wrap(&mut pos);
                    }
                }
                self.back.set_cell(pos, grapheme, width as u8, look);
                pos.x = pos.x.saturating_add(width);
                emitted += usize::from(width);
            }
        }

        self.client_cursor = pos;
        emitted
    }

    /// Differential flush: emit cursor moves, attribute changes and grapheme
    /// bytes only where the terminal content must change, then write once.
    ///
    /// On a write error the state stays dirty and the flush is retried next
    /// time; this method never fails.
    pub fn update(&mut self) {
        let size = self.back.size();
        let mut cursor = CursorState::unknown();
        let mut out = String::new();
        let mut committed: Vec<Pos> = Vec::new();

        for y in 0..size.height {
            for x in 0..size.width {
                let pos = Pos::new(x, y);
                let Some(back_cell) = self.back.cell(pos) else {
                    continue;
                };
                let Some(front_cell) = self.front.cell(pos) else {
                    continue;
                };
                if !back_cell.dirty && !front_cell.dirty {
                    continue;
                }

                let must_emit =
                    front_cell.dirty || (back_cell.dirty && !same_content(back_cell, front_cell));
                if must_emit && !back_cell.is_virtual {
                    emit_cell(back_cell, pos, size.width, &mut cursor, &mut out);
                }
                committed.push(pos);
            }
        }

        if committed.is_empty() {
            return;
        }

        if !out.is_empty() {
            let result = self
                .out
                .write_all(out.as_bytes())
                .and_then(|()| self.out.flush());
            if let Err(err) = result {
                error!("screen flush failed, retrying next update: {err}");
                return;
            }
        }

        for pos in committed {
            if let Some(cell) = self.back.cell_mut(pos) {
                cell.dirty = false;
                let snapshot = cell.clone();
                if let Some(front_cell) = self.front.cell_mut(pos) {
                    *front_cell = snapshot;
                }
            }
        }
    }

    #[cfg(test)]
    fn dirty_count(&self) -> usize {
        let size = self.back.size();
        let mut count = 0;
        for y in 0..size.height {
            for x in 0..size.width {
                let pos = Pos::new(x, y);
                if self.back.cell(pos).is_some_and(|cell| cell.dirty)
                    || self.front.cell(pos).is_some_and(|cell| cell.dirty)
                {
                    count += 1;
                }
            }
        }
        count
    }

    #[cfg(test)]
    fn buffers_match(&self) -> bool {
        let size = self.back.size();
        for y in 0..size.height {
            for x in 0..size.width {
                let pos = Pos::new(x, y);
                let (Some(back), Some(front)) = (self.back.cell(pos), self.front.cell(pos)) else {
                    return false;
                };
                if !same_content(back, front) {
                    return false;
                }
            }
        }
        true
    }
}

/// Cell equality ignoring the dirty bookkeeping bit.
fn same_content(a: &Cell, b: &Cell) -> bool {
    a.grapheme == b.grapheme && a.width == b.width && a.look == b.look && a.is_virtual == b.is_virtual
}

fn emit_cell(cell: &Cell, pos: Pos, screen_width: u16, cursor: &mut CursorState, out: &mut String) {
    if cursor.pos != Some(pos) {
        out.push_str(&format!("\x1b[{};{}H", pos.y + 1, pos.x + 1));
    }

    let mut params: Vec<String> = Vec::new();
    let (current_style, current_fg, current_bg) =
        match (cursor.style, cursor.fg, cursor.bg) {
            (Some(style), Some(fg), Some(bg)) => (style, fg, bg),
            _ => {
                // Unknown terminal state: reset, then diff from the defaults.
                params.push("0".to_string());
                (Style::empty(), Color::Default, Color::Default)
            }
        };

    push_style_transition(current_style, cell.look.style, &mut params);
    if cell.look.fg != current_fg {
        cell.look.fg.push_fg_params(&mut params);
    }
    if cell.look.bg != current_bg {
        cell.look.bg.push_bg_params(&mut params);
    }
    if !params.is_empty() {
        out.push_str("\x1b[");
        out.push_str(&params.join(";"));
        out.push('m');
    }

    if cell.grapheme.is_empty() {
        out.push(' ');
    } else {
        out.push_str(&cell.grapheme);
    }

    cursor.style = Some(cell.look.style);
    cursor.fg = Some(cell.look.fg);
    cursor.bg = Some(cell.look.bg);
    let next_x = pos.x + u16::from(cell.width);
    // Autowrap behavior at the margin varies; treat the position as unknown.
    cursor.pos = if next_x >= screen_width {
        None
    } else {
        Some(Pos::new(next_x, pos.y))
    };
}

/// Split text into breaking-space and word tokens, with `\n` on its own.
fn tokenize(s: &str) -> Vec<(bool, &str)> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (idx, grapheme) in s.grapheme_indices(true) {
        let breaking = grapheme.chars().next().is_some_and(is_breaking_space);
        if breaking || grapheme == "\n" || grapheme == "\r\n" {
            if let Some(start) = word_start.take() {
                tokens.push((false, &s[start..idx]));
            }
            tokens.push((breaking, grapheme));
        } else if word_start.is_none() {
            word_start = Some(idx);
        }
    }
    if let Some(start) = word_start {
        tokens.push((false, &s[start..]));
    }
    tokens
}
