//! Stroke font providers for label rendering.
//!
//! A stroke font describes each glyph as pen-up / pen-down moves inside a
//! normalized character box: x and y in `0..=1` span the box, origin at the
//! glyph's lower left. The renderer scales the box by the active character
//! size and slant, so providers never see plotter units.
//!
//! Two providers exist: an embedded stick font and a loader for Hershey
//! `.jhf` files. Both precompute their stroke tables at construction;
//! `get_paths` is a plain map lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod hershey;
mod stick;

pub use hershey::HersheyFont;
pub use stick::StickFont;

/// One pen move inside the normalized character box.
///
/// `pen_down == false` means "lift the pen and move to (x, y)";
/// `true` means "draw from the previous point to (x, y)".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub pen_down: bool,
    pub x: f64,
    pub y: f64,
}

impl Stroke {
    pub const fn up(x: f64, y: f64) -> Self {
        Self {
            pen_down: false,
            x,
            y,
        }
    }

    pub const fn down(x: f64, y: f64) -> Self {
        Self { pen_down: true, x, y }
    }
}

pub trait Font: Send + Sync + std::fmt::Debug {
    /// Strokes for `c`, or `None` when the glyph is not defined. Callers
    /// still advance the character origin for undefined glyphs.
    fn get_paths(&self, c: char) -> Option<&[Stroke]>;
}

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("unknown font {0:?}")]
    Unknown(String),
    #[error("invalid hershey font name {0:?}, expected \"hershey:VARIANT\"")]
    InvalidHersheyName(String),
    #[error("reading font file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed glyph on line {line} of {path}")]
    Malformed { path: PathBuf, line: usize },
}

/// Construct a font from its configuration name.
///
/// Accepted names are `stick_font` and `hershey:VARIANT`. A variant that
/// contains a path separator is taken as a `.jhf` path verbatim; otherwise it
/// resolves to `<font_dir>/<VARIANT>.jhf`.
pub fn load_font(name: &str, font_dir: &Path) -> Result<Arc<dyn Font>, FontError> {
    if name == "stick_font" {
        return Ok(Arc::new(StickFont::new()));
    }
    if let Some(rest) = name.strip_prefix("hershey") {
        let variant = rest.strip_prefix(':').unwrap_or("");
        if variant.is_empty() {
            return Err(FontError::InvalidHersheyName(name.to_string()));
        }
        let path = if variant.contains(['/', '\\']) {
            PathBuf::from(variant)
        } else {
            font_dir.join(format!("{variant}.jhf"))
        };
        return Ok(Arc::new(HersheyFont::load(&path)?));
    }
    Err(FontError::Unknown(name.to_string()))
}

pub(crate) type StrokeTable = HashMap<char, Vec<Stroke>>;
