//! Loading and normalization of Hershey `.jhf` files, driven by a
//! hand-assembled two-glyph fixture.

use std::io::Write;

use core_font::{Font, FontError, HersheyFont};

/// Encode one glyph line: right-justified number, vertex count, margins,
/// then coordinate pairs relative to 'R'.
fn glyph_line(number: u32, left: i32, right: i32, pairs: &str) -> String {
    let margins = format!(
        "{}{}",
        char::from_u32(('R' as i32 + left) as u32).unwrap(),
        char::from_u32(('R' as i32 + right) as u32).unwrap(),
    );
    let count = pairs.len() / 2 + 1;
    format!("{number:>5}{count:>3}{margins}{pairs}")
}

fn write_fixture(lines: &[String]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    for line in lines {
        writeln!(file, "{line}").expect("write fixture");
    }
    file
}

#[test]
fn space_glyph_is_advance_only() {
    let file = write_fixture(&[glyph_line(32, -8, 8, "")]);
    let font = HersheyFont::load(file.path()).expect("load fixture");
    assert!(font.get_paths(' ').is_none());
}

#[test]
fn exclamation_strokes_are_normalized() {
    // Line 0 is ASCII 32 (space), line 1 is '!': a vertical bar from the cap
    // line (y=-12) to y=2, a pen-up marker, then a short dot stroke.
    let file = write_fixture(&[
        glyph_line(32, -8, 8, ""),
        glyph_line(1, -5, 5, "RFRT RRYR["),
    ]);
    let font = HersheyFont::load(file.path()).expect("load fixture");
    let strokes = font.get_paths('!').expect("glyph defined");
    assert_eq!(strokes.len(), 4);

    // Two polylines means exactly two pen-up moves.
    assert_eq!(strokes.iter().filter(|s| !s.pen_down).count(), 2);

    // x=0 maps to the box midpoint of the fixed margins; cap-line y maps
    // to the top of the box, the baseline-ish end to the bottom.
    let eps = 1e-9;
    assert!(!strokes[0].pen_down);
    assert!((strokes[0].x - 6.0 / 13.0).abs() < eps);
    assert!((strokes[0].y - 1.0).abs() < eps);
    assert!(strokes[1].pen_down);
    assert!((strokes[1].y - 7.0 / 21.0).abs() < eps);
    assert!(!strokes[2].pen_down);
    assert!(strokes[3].pen_down);
    assert!(strokes[3].y.abs() < eps);
}

#[test]
fn truncated_line_is_rejected_with_location() {
    let file = write_fixture(&[glyph_line(32, -8, 8, ""), "  1  1".to_string()]);
    let err = HersheyFont::load(file.path()).unwrap_err();
    match err {
        FontError::Malformed { line, .. } => assert_eq!(line, 2),
        other => panic!("expected Malformed, got {other:?}"),
    }
}

#[test]
fn odd_vertex_area_is_rejected() {
    let mut line = glyph_line(1, -5, 5, "RFRT");
    line.push('R');
    let file = write_fixture(&[line]);
    assert!(matches!(
        HersheyFont::load(file.path()),
        Err(FontError::Malformed { .. })
    ));
}
