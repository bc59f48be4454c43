//! Hershey `.jhf` stroke font loader.
//!
//! One line per glyph. Columns 0..5 hold the glyph number (ignored, glyphs
//! are indexed by line order starting at ASCII 32), columns 5..8 the vertex
//! count (derived instead), column 8 and 9 the left/right margin, and the
//! rest coordinate pairs encoded relative to `'R'`. The pair `" R"` is a
//! pen-up marker, not a point.
//!
//! Hershey glyphs are proportional, but the renderer treats every glyph as
//! occupying the same character box, so the per-glyph margins are ignored
//! and the box is normalized with fixed empirical extents.

use std::path::Path;

use crate::{Font, FontError, Stroke, StrokeTable};

const REF: i32 = 'R' as i32;

// Empirical extents of the normal-size Hershey fonts. Y grows downward in
// the raw data, so the cap line sits at a negative coordinate.
const CAP: f64 = -12.0;
const BOTTOM: f64 = 9.0;
const LEFT: f64 = -6.0;
const RIGHT: f64 = 7.0;

// Only 7-bit ASCII is addressable: line 0 is ASCII 32.
const FIRST_CODE: u32 = 32;
const MAX_GLYPHS: usize = 96;

#[derive(Debug)]
pub struct HersheyFont {
    table: StrokeTable,
}

impl HersheyFont {
    pub fn load(path: &Path) -> Result<Self, FontError> {
        let text = std::fs::read_to_string(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let ky = 1.0 / (CAP - BOTTOM);
        let by = -ky * BOTTOM;
        let kx = 1.0 / (RIGHT - LEFT);
        let bx = -kx * LEFT;

        let mut table = StrokeTable::new();
        for (index, line) in text.lines().enumerate().take(MAX_GLYPHS) {
            let bytes = line.as_bytes();
            if bytes.len() < 10 || !line.is_ascii() {
                return Err(FontError::Malformed {
                    path: path.to_path_buf(),
                    line: index + 1,
                });
            }
            let verts = &bytes[10..];
            if verts.len() % 2 != 0 {
                return Err(FontError::Malformed {
                    path: path.to_path_buf(),
                    line: index + 1,
                });
            }

            let mut strokes = Vec::new();
            let mut lifted = true;
            for pair in verts.chunks_exact(2) {
                if pair == b" R" {
                    lifted = true;
                    continue;
                }
                let x = f64::from(i32::from(pair[0]) - REF);
                let y = f64::from(i32::from(pair[1]) - REF);
                strokes.push(Stroke {
                    pen_down: !lifted,
                    x: x * kx + bx,
                    y: y * ky + by,
                });
                lifted = false;
            }

            let c = char::from_u32(FIRST_CODE + index as u32).unwrap_or('\u{FFFD}');
            table.insert(c, strokes);
        }
        tracing::debug!(
            target: "font",
            path = %path.display(),
            glyphs = table.len(),
            "hershey_loaded"
        );
        Ok(Self { table })
    }
}

impl Font for HersheyFont {
    fn get_paths(&self, c: char) -> Option<&[Stroke]> {
        match self.table.get(&c) {
            // An empty line of strokes (e.g. the space glyph) means "advance
            // only", which callers express as an absent glyph.
            Some(strokes) if strokes.is_empty() => None,
            Some(strokes) => Some(strokes),
            None => None,
        }
    }
}
