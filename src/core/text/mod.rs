//! Text helpers (UTF-8 decoding, space classification, column widths).
//!
//! These helpers are pure (bytes/str in, values out) and live under `core`
//! so both the decoder and the renderer can depend on them.

pub mod utf8;
pub mod width;
