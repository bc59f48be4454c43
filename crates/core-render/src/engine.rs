//! The HPGL command interpreter.
//!
//! State follows the plotter model: two anchor points (`IP`/`SC`) define the
//! user-to-absolute mapping, a page rotation (`RO`) defines how absolute
//! plotter units land on paper, and a character box (`SI`/`SU`/`SR`/`SL`)
//! drives the stroke-font label renderer. All drawing funnels through the
//! raw pen primitives so polylines are stroked exactly once, on the
//! pen-down → pen-up transition.

use std::f64::consts::{FRAC_PI_2, PI};
use std::path::Path;
use std::sync::Arc;

use core_config::ImageFormat;
use core_geom::Affine;
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::options::{PenStyle, RenderOptions};
use crate::surface::RecordingSurface;

/// One absolute plotter unit in mm (1/40 mm).
pub const HPGL_UNIT_MM: f64 = 0.025;

const DEFAULT_CHAR_W_MM: f64 = 2.85;
const DEFAULT_CHAR_H_MM: f64 = 3.75;
/// Horizontal advance between characters, in character widths.
const CHAR_STEP_X: f64 = 1.5;
/// Vertical advance between lines, in character heights.
const CHAR_STEP_Y: f64 = 2.0;

pub struct PlotCanvas {
    options: Arc<RenderOptions>,
    surface: RecordingSurface,
    rot: u8,
    p1_abs: (f64, f64),
    p2_abs: (f64, f64),
    p1_usr: (f64, f64),
    p2_usr: (f64, f64),
    /// Character box size in plotter units.
    char_w: f64,
    char_h: f64,
    char_tilt_tg: f64,
    /// Absolute plotter units → page mm.
    device: Affine,
    user_to_abs: Affine,
    char_to_abs: Affine,
    clip_window: Option<[f64; 4]>,
    active_pen: i64,
    style: PenStyle,
    pen_down: bool,
    /// Current point in absolute plotter units.
    current: (f64, f64),
    /// Pending polyline in page mm, populated only while the pen is down.
    path: Vec<(f64, f64)>,
}

impl PlotCanvas {
    pub fn new(options: Arc<RenderOptions>) -> Self {
        let (x, y, w, h) = options.draw_extents();
        let surface = RecordingSurface::new(x, y, w, h, options.background);
        let style = options.pen(0).clone();
        let mut canvas = Self {
            options,
            surface,
            rot: 0,
            p1_abs: (0.0, 0.0),
            p2_abs: (0.0, 0.0),
            p1_usr: (0.0, 0.0),
            p2_usr: (0.0, 0.0),
            char_w: 0.0,
            char_h: 0.0,
            char_tilt_tg: 0.0,
            device: Affine::IDENTITY,
            user_to_abs: Affine::IDENTITY,
            char_to_abs: Affine::IDENTITY,
            clip_window: None,
            active_pen: 0,
            style,
            pen_down: false,
            current: (0.0, 0.0),
            path: Vec::new(),
        };
        canvas.reset();
        canvas
    }

    /// Interpret one complete command, terminator already stripped.
    pub fn process_command(&mut self, cmd: &str) -> Result<(), RenderError> {
        let opcode: String = cmd.chars().take(2).flat_map(char::to_uppercase).collect();
        let raw_args = cmd.get(2..).unwrap_or("");
        match opcode.as_str() {
            "IN" | "DF" => {
                self.reset();
                Ok(())
            }
            // Terminator selection is handled at the stream-parser level.
            "DT" => Ok(()),
            "IP" => {
                let v = parse_floats(&opcode, raw_args)?;
                let [x1, y1, x2, y2] = exact(&opcode, raw_args, &v)?;
                self.ip((x1, y1), (x2, y2))
            }
            "SC" => {
                let v = parse_floats(&opcode, raw_args)?;
                let [xmin, xmax, ymin, ymax] = exact(&opcode, raw_args, &v)?;
                self.sc((xmin, ymin), (xmax, ymax))
            }
            "RO" => {
                let v = parse_ints(&opcode, raw_args)?;
                match v.as_slice() {
                    [] => self.ro(0),
                    [angle] => self.ro(*angle),
                    _ => return Err(RenderError::invalid_args(&opcode, raw_args)),
                }
                Ok(())
            }
            "IW" => {
                let v = parse_floats(&opcode, raw_args)?;
                match v.as_slice() {
                    [] => self.clip_window = None,
                    [x1, y1, x2, y2] => {
                        // Recorded only; clipping is not enforced.
                        self.clip_window = Some([*x1, *y1, *x2, *y2]);
                        debug!(
                            target: "render.engine",
                            window = ?self.clip_window,
                            "clip_window_recorded"
                        );
                    }
                    _ => return Err(RenderError::invalid_args(&opcode, raw_args)),
                }
                Ok(())
            }
            "SI" => {
                let v = parse_floats(&opcode, raw_args)?;
                let [w_cm, h_cm] = exact(&opcode, raw_args, &v)?;
                self.char_w = w_cm * 10.0 / HPGL_UNIT_MM;
                self.char_h = h_cm * 10.0 / HPGL_UNIT_MM;
                self.update_char_transform();
                Ok(())
            }
            "SU" => {
                let v = parse_floats(&opcode, raw_args)?;
                let [w_usr, h_usr] = exact(&opcode, raw_args, &v)?;
                self.char_w = self.user_to_abs.map_distance(w_usr, 0.0).0;
                self.char_h = self.user_to_abs.map_distance(0.0, h_usr).1;
                self.update_char_transform();
                Ok(())
            }
            "SR" => {
                let v = parse_floats(&opcode, raw_args)?;
                let [pct_w, pct_h] = exact(&opcode, raw_args, &v)?;
                self.char_w = pct_w * (self.p2_abs.0 - self.p1_abs.0) * 0.01;
                self.char_h = pct_h * (self.p2_abs.1 - self.p1_abs.1) * 0.01;
                self.update_char_transform();
                Ok(())
            }
            "SL" => {
                let v = parse_floats(&opcode, raw_args)?;
                match v.as_slice() {
                    [] => self.char_tilt_tg = 0.0,
                    [tangent] => self.char_tilt_tg = *tangent,
                    _ => return Err(RenderError::invalid_args(&opcode, raw_args)),
                }
                self.update_char_transform();
                Ok(())
            }
            "SP" => {
                let v = parse_ints(&opcode, raw_args)?;
                let [pen] = exact(&opcode, raw_args, &v)?;
                self.choose_pen(pen);
                Ok(())
            }
            "PU" => {
                let points = parse_point_pairs(&opcode, raw_args)?;
                self.raw_pen_up();
                self.move_user(&points);
                Ok(())
            }
            "PD" => {
                let points = parse_point_pairs(&opcode, raw_args)?;
                self.raw_pen_down();
                self.move_user(&points);
                Ok(())
            }
            "LB" => {
                self.label(raw_args);
                Ok(())
            }
            _ => Err(RenderError::UnknownOpcode(opcode)),
        }
    }

    pub fn save(&self, path: &Path, format: ImageFormat) -> anyhow::Result<()> {
        info!(
            target: "render.save",
            path = %path.display(),
            format = ?format,
            strokes = self.surface.paths().len(),
            "saving_plot"
        );
        self.surface.save(path, format, self.options.dpi)
    }

    pub fn surface(&self) -> &RecordingSurface {
        &self.surface
    }

    pub fn is_pen_down(&self) -> bool {
        self.pen_down
    }

    /// Current point in absolute plotter units.
    pub fn current_point(&self) -> (f64, f64) {
        self.current
    }

    /// Restore power-on defaults. The recording itself is kept: `IN` mid-plot
    /// resets coordinates and pens, it does not erase paper.
    fn reset(&mut self) {
        self.rot = 0;
        self.p1_abs = (0.0, 0.0);
        self.p2_abs = (
            self.options.paper_w / HPGL_UNIT_MM,
            self.options.paper_h / HPGL_UNIT_MM,
        );
        self.p1_usr = self.p1_abs;
        self.p2_usr = self.p2_abs;
        self.char_w = DEFAULT_CHAR_W_MM / HPGL_UNIT_MM;
        self.char_h = DEFAULT_CHAR_H_MM / HPGL_UNIT_MM;
        self.char_tilt_tg = 0.0;
        self.device = self.device_transform();
        // Anchors coincide pairwise, so this cannot fail here.
        self.user_to_abs = Affine::anchor_scale(self.p1_usr, self.p2_usr, self.p1_abs, self.p2_abs)
            .unwrap_or(Affine::IDENTITY);
        self.update_char_transform();
        self.clip_window = None;
        self.path.clear();
        self.current = (0.0, 0.0);
        self.choose_pen(0);
        self.pen_down = false;
    }

    /// Plotter-unit → page-mm transform for the active rotation. Mirrors the
    /// pen carriage: y grows upward on the plotter, downward on the page.
    fn device_transform(&self) -> Affine {
        let unit = Affine::scale(HPGL_UNIT_MM, HPGL_UNIT_MM);
        let flip = Affine::scale(1.0, -1.0);
        let (w, h) = (self.options.paper_w, self.options.paper_h);
        match self.rot {
            1 => unit
                .then(&Affine::rotation(FRAC_PI_2))
                .then(&flip)
                .then(&Affine::translation(w, h)),
            2 => unit
                .then(&Affine::rotation(PI))
                .then(&flip)
                .then(&Affine::translation(w, 0.0)),
            3 => unit.then(&Affine::rotation(3.0 * FRAC_PI_2)).then(&flip),
            _ => unit.then(&flip).then(&Affine::translation(0.0, h)),
        }
    }

    fn update_char_transform(&mut self) {
        self.char_to_abs = Affine::scale(self.char_w, self.char_h)
            .then(&Affine::shear_x(self.char_tilt_tg));
    }

    fn ip(&mut self, p1: (f64, f64), p2: (f64, f64)) -> Result<(), RenderError> {
        self.p1_abs = p1;
        self.p2_abs = p2;
        self.user_to_abs = Affine::anchor_scale(self.p1_usr, self.p2_usr, self.p1_abs, self.p2_abs)
            .ok_or(RenderError::InvalidCoords)?;
        Ok(())
    }

    fn sc(&mut self, p1_usr: (f64, f64), p2_usr: (f64, f64)) -> Result<(), RenderError> {
        // Validate before committing so a degenerate window leaves state intact.
        let transform = Affine::anchor_scale(p1_usr, p2_usr, self.p1_abs, self.p2_abs)
            .ok_or(RenderError::InvalidCoords)?;
        self.p1_usr = p1_usr;
        self.p2_usr = p2_usr;
        self.user_to_abs = transform;
        Ok(())
    }

    fn ro(&mut self, angle: i64) {
        self.rot = match angle {
            0 => 0,
            90 => 1,
            180 => 2,
            270 => 3,
            other => {
                warn!(target: "render.engine", angle = other, "unexpected_rotation_angle");
                0
            }
        };
        self.device = self.device_transform();
    }

    fn choose_pen(&mut self, pen: i64) {
        self.active_pen = pen;
        self.style = self.options.pen(pen).clone();
    }

    fn raw_pen_down(&mut self) {
        self.pen_down = true;
    }

    /// Stroke the pending polyline, if any, and lift the pen. The current
    /// point survives so a following pen-down continues from it.
    fn raw_pen_up(&mut self) {
        if self.pen_down {
            let pending = std::mem::take(&mut self.path);
            self.surface
                .push_polyline(pending, self.style.color, self.style.line_width);
        }
        self.pen_down = false;
    }

    /// Move through points given in absolute plotter units, drawing when the
    /// pen is down.
    fn raw_move(&mut self, points: &[(f64, f64)]) {
        for &p in points {
            if self.pen_down {
                if self.path.is_empty() {
                    let (cx, cy) = self.current;
                    self.path.push(self.device.map_point(cx, cy));
                }
                self.path.push(self.device.map_point(p.0, p.1));
            }
            self.current = p;
        }
    }

    /// Move through points given in user coordinates.
    fn move_user(&mut self, points: &[(f64, f64)]) {
        for &(x, y) in points {
            let p = self.user_to_abs.map_point(x, y);
            self.raw_move(&[p]);
        }
    }

    /// Stroke a label with the text font, advancing the character origin by
    /// the fixed HPGL cell spacing. `\n` drops one line and returns to the
    /// column of the label origin; `\r` only returns the column.
    fn label(&mut self, text: &str) {
        let origin = self.current;
        let mut char_org = origin;
        let saved_style = self.style.clone();
        if let Some(width) = self.options.text_line_width {
            self.style.line_width = width;
        }
        if let Some(color) = self.options.text_color {
            self.style.color = color;
        }
        let font = Arc::clone(&self.options.text_font);

        for c in text.chars() {
            match c {
                '\n' => {
                    char_org.1 -= self.char_h * CHAR_STEP_Y;
                    char_org.0 = origin.0;
                }
                '\r' => {
                    char_org.0 = origin.0;
                }
                _ => {
                    if let Some(strokes) = font.get_paths(c) {
                        for stroke in strokes {
                            let (gx, gy) = self.char_to_abs.map_point(stroke.x, stroke.y);
                            let p = (gx + char_org.0, gy + char_org.1);
                            if stroke.pen_down {
                                self.raw_pen_down();
                            } else {
                                self.raw_pen_up();
                            }
                            self.raw_move(&[p]);
                        }
                    }
                    char_org.0 += self.char_w * CHAR_STEP_X;
                }
            }
            self.raw_pen_up();
            self.raw_move(&[char_org]);
        }

        self.style = saved_style;
    }
}

fn parse_floats(opcode: &str, raw: &str) -> Result<Vec<f64>, RenderError> {
    parse_list(opcode, raw)
}

fn parse_ints(opcode: &str, raw: &str) -> Result<Vec<i64>, RenderError> {
    parse_list(opcode, raw)
}

fn parse_list<T: std::str::FromStr>(opcode: &str, raw: &str) -> Result<Vec<T>, RenderError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|token| {
            token
                .trim()
                .parse()
                .map_err(|_| RenderError::invalid_args(opcode, raw))
        })
        .collect()
}

fn parse_point_pairs(opcode: &str, raw: &str) -> Result<Vec<(f64, f64)>, RenderError> {
    let values = parse_floats(opcode, raw)?;
    if values.len() % 2 != 0 {
        return Err(RenderError::invalid_args(opcode, raw));
    }
    Ok(values.chunks_exact(2).map(|c| (c[0], c[1])).collect())
}

fn exact<T: Copy, const N: usize>(
    opcode: &str,
    raw: &str,
    values: &[T],
) -> Result<[T; N], RenderError> {
    values
        .try_into()
        .map_err(|_| RenderError::invalid_args(opcode, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::RenderConfigFile;
    use core_font::StickFont;

    fn canvas() -> PlotCanvas {
        let config = RenderConfigFile {
            crop: None,
            ..Default::default()
        };
        let options =
            RenderOptions::with_font(&config, Arc::new(StickFont::new())).expect("valid config");
        PlotCanvas::new(options)
    }

    fn run(canvas: &mut PlotCanvas, cmds: &[&str]) {
        for cmd in cmds {
            canvas.process_command(cmd).expect("command accepted");
        }
    }

    #[test]
    fn default_user_transform_is_identity() {
        let canvas = canvas();
        let p = canvas.user_to_abs.map_point(500.0, 4000.0);
        assert_eq!(p, (500.0, 4000.0));
    }

    #[test]
    fn reset_is_idempotent() {
        let mut once = canvas();
        run(&mut once, &["SP1", "SC0,100,0,100", "SL0.5", "RO90", "IN"]);
        let mut twice = canvas();
        run(&mut twice, &["IN", "IN"]);
        assert_eq!(once.rot, twice.rot);
        assert_eq!(once.p1_abs, twice.p1_abs);
        assert_eq!(once.p2_abs, twice.p2_abs);
        assert_eq!(once.p1_usr, twice.p1_usr);
        assert_eq!(once.char_w, twice.char_w);
        assert_eq!(once.char_tilt_tg, twice.char_tilt_tg);
        assert_eq!(once.user_to_abs, twice.user_to_abs);
        assert_eq!(once.device, twice.device);
        assert_eq!(once.current, twice.current);
        assert_eq!(once.pen_down, twice.pen_down);
        assert_eq!(once.active_pen, twice.active_pen);
    }

    #[test]
    fn reset_restores_default_anchors() {
        let mut c = canvas();
        run(&mut c, &["IP0,0,1000,1000", "SC0,10,0,10", "IN"]);
        assert_eq!(c.p2_abs, (297.0 / HPGL_UNIT_MM, 210.0 / HPGL_UNIT_MM));
        assert_eq!(c.p1_usr, c.p1_abs);
        assert_eq!(c.p2_usr, c.p2_abs);
    }

    #[test]
    fn pen_up_after_any_sequence() {
        let mut c = canvas();
        run(&mut c, &["PD", "PD100,100", "PU"]);
        assert!(!c.is_pen_down());
    }

    #[test]
    fn pen_toggle_without_args_does_not_move() {
        let mut c = canvas();
        run(&mut c, &["PU1000,2000", "PD"]);
        assert_eq!(c.current_point(), (1000.0, 2000.0));
        assert!(c.is_pen_down());
        run(&mut c, &["PU"]);
        assert_eq!(c.current_point(), (1000.0, 2000.0));
    }

    #[test]
    fn scaling_maps_user_points() {
        let mut c = canvas();
        run(&mut c, &["IP0,0,4000,4000", "SC0,100,0,100"]);
        let p = c.user_to_abs.map_point(50.0, 25.0);
        assert_eq!(p, (2000.0, 1000.0));
    }

    #[test]
    fn degenerate_scale_fails_and_preserves_state() {
        let mut c = canvas();
        let before = c.user_to_abs;
        let err = c.process_command("SC0,0,0,100").unwrap_err();
        assert!(matches!(err, RenderError::InvalidCoords));
        assert_eq!(c.user_to_abs, before);
        assert_eq!(c.p1_usr, c.p1_abs);
    }

    #[test]
    fn unknown_opcode_is_reported() {
        let mut c = canvas();
        let err = c.process_command("QQ1,2").unwrap_err();
        assert!(matches!(err, RenderError::UnknownOpcode(op) if op == "QQ"));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let mut c = canvas();
        assert!(matches!(
            c.process_command("IP1,2,3").unwrap_err(),
            RenderError::InvalidArgs { .. }
        ));
        assert!(matches!(
            c.process_command("PD1,2,3").unwrap_err(),
            RenderError::InvalidArgs { .. }
        ));
        assert!(matches!(
            c.process_command("SP"),
            Err(RenderError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let mut c = canvas();
        assert!(matches!(
            c.process_command("PU10,abc").unwrap_err(),
            RenderError::InvalidArgs { .. }
        ));
    }

    #[test]
    fn unexpected_rotation_falls_back_to_zero() {
        let mut c = canvas();
        run(&mut c, &["RO90"]);
        assert_eq!(c.rot, 1);
        run(&mut c, &["RO45"]);
        assert_eq!(c.rot, 0);
        run(&mut c, &["RO270"]);
        assert_eq!(c.rot, 3);
    }

    #[test]
    fn iw_records_without_clipping() {
        let mut c = canvas();
        run(&mut c, &["IW0,0,1000,1000"]);
        assert_eq!(c.clip_window, Some([0.0, 0.0, 1000.0, 1000.0]));
        run(&mut c, &["IW"]);
        assert_eq!(c.clip_window, None);
        run(&mut c, &["IW0,0,500,500", "SP1", "PD20000,20000", "PU"]);
        // Geometry outside the window still strokes.
        assert_eq!(c.surface().paths().len(), 1);
    }

    #[test]
    fn character_size_commands_update_the_box() {
        let mut c = canvas();
        run(&mut c, &["SI1.0,1.8"]);
        assert_eq!(c.char_w, 10.0 / HPGL_UNIT_MM);
        assert_eq!(c.char_h, 18.0 / HPGL_UNIT_MM);

        run(&mut c, &["IP0,0,1000,2000", "SC0,100,0,100", "SU10,10"]);
        assert_eq!(c.char_w, 100.0);
        assert_eq!(c.char_h, 200.0);

        run(&mut c, &["SR10,5"]);
        assert_eq!(c.char_w, 100.0);
        assert_eq!(c.char_h, 100.0);
    }

    #[test]
    fn slant_shears_the_character_box() {
        let mut c = canvas();
        run(&mut c, &["SI1.0,1.0", "SL0.5"]);
        let w = 10.0 / HPGL_UNIT_MM;
        let top = c.char_to_abs.map_point(0.0, 1.0);
        assert_eq!(top, (0.5 * w, w));
        run(&mut c, &["SL"]);
        assert_eq!(c.char_to_abs.map_point(0.0, 1.0), (0.0, w));
    }

    #[test]
    fn selecting_unknown_pen_strokes_invisibly() {
        let mut c = canvas();
        run(&mut c, &["SP42", "PU0,0", "PD1000,1000", "PU"]);
        let paths = c.surface().paths();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].color.is_visible());
        assert_eq!(paths[0].width, 0.0);
    }

    #[test]
    fn mid_move_pen_changes_do_not_split_the_stroke() {
        let mut c = canvas();
        run(&mut c, &["SP1", "PU0,0", "PD1000,0,1000,1000", "SP2", "PD2000,1000", "PU"]);
        // One polyline, stroked with the style active at pen-up.
        let paths = c.surface().paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].points.len(), 4);
    }
}
