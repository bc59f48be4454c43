//! 2D affine transforms shared by the plotter coordinate pipeline.
//!
//! Three spaces are involved when replaying a plot: user coordinates (what the
//! device sends after `SC`), absolute plotter units (1/40 mm), and page
//! millimeters on the output surface. Every mapping between them is an affine
//! 2×3 matrix, so this crate provides exactly that and nothing more.

/// Affine 2×3 matrix in column-vector convention:
///
/// ```text
/// | xx  xy  x0 |   | x |
/// | yx  yy  y0 | · | y |
/// ```
///
/// `map_point(x, y)` computes `(xx·x + xy·y + x0, yx·x + yy·y + y0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub xx: f64,
    pub yx: f64,
    pub xy: f64,
    pub yy: f64,
    pub x0: f64,
    pub y0: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        xx: 1.0,
        yx: 0.0,
        xy: 0.0,
        yy: 1.0,
        x0: 0.0,
        y0: 0.0,
    };

    pub const fn translation(tx: f64, ty: f64) -> Affine {
        Affine {
            xx: 1.0,
            yx: 0.0,
            xy: 0.0,
            yy: 1.0,
            x0: tx,
            y0: ty,
        }
    }

    pub const fn scale(sx: f64, sy: f64) -> Affine {
        Affine {
            xx: sx,
            yx: 0.0,
            xy: 0.0,
            yy: sy,
            x0: 0.0,
            y0: 0.0,
        }
    }

    pub fn rotation(theta: f64) -> Affine {
        let (sin, cos) = theta.sin_cos();
        Affine {
            xx: cos,
            yx: sin,
            xy: -sin,
            yy: cos,
            x0: 0.0,
            y0: 0.0,
        }
    }

    /// Horizontal shear: `x' = x + t·y`. Used for character slant (`SL`).
    pub const fn shear_x(t: f64) -> Affine {
        Affine {
            xx: 1.0,
            yx: 0.0,
            xy: t,
            yy: 1.0,
            x0: 0.0,
            y0: 0.0,
        }
    }

    /// Compose so that `self` applies first, then `after`.
    #[must_use]
    pub fn then(&self, after: &Affine) -> Affine {
        Affine {
            xx: after.xx * self.xx + after.xy * self.yx,
            yx: after.yx * self.xx + after.yy * self.yx,
            xy: after.xx * self.xy + after.xy * self.yy,
            yy: after.yx * self.xy + after.yy * self.yy,
            x0: after.xx * self.x0 + after.xy * self.y0 + after.x0,
            y0: after.yx * self.x0 + after.yy * self.y0 + after.y0,
        }
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.xx * x + self.xy * y + self.x0,
            self.yx * x + self.yy * y + self.y0,
        )
    }

    /// Like [`map_point`](Self::map_point) but ignoring translation. Used for
    /// size-like quantities (character box dimensions in user units).
    pub fn map_distance(&self, dx: f64, dy: f64) -> (f64, f64) {
        (self.xx * dx + self.xy * dy, self.yx * dx + self.yy * dy)
    }

    /// Axis-aligned scaling map sending `p1_src → p1_dst` and `p2_src → p2_dst`.
    ///
    /// Returns `None` when the source points coincide on either axis, which
    /// would make the per-axis scale factors undefined.
    pub fn anchor_scale(
        p1_src: (f64, f64),
        p2_src: (f64, f64),
        p1_dst: (f64, f64),
        p2_dst: (f64, f64),
    ) -> Option<Affine> {
        let dx = p2_src.0 - p1_src.0;
        let dy = p2_src.1 - p1_src.1;
        if dx == 0.0 || dy == 0.0 {
            return None;
        }
        let kx = (p2_dst.0 - p1_dst.0) / dx;
        let ky = (p2_dst.1 - p1_dst.1) / dy;
        Some(Affine {
            xx: kx,
            yx: 0.0,
            xy: 0.0,
            yy: ky,
            x0: p1_dst.0 - kx * p1_src.0,
            y0: p1_dst.1 - ky * p1_src.1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn identity_maps_points_unchanged() {
        assert_eq!(Affine::IDENTITY.map_point(3.5, -2.0), (3.5, -2.0));
    }

    #[test]
    fn then_applies_left_operand_first() {
        // Scale by 2, then translate by (10, 0): (1, 1) -> (12, 2).
        let m = Affine::scale(2.0, 2.0).then(&Affine::translation(10.0, 0.0));
        assert!(close(m.map_point(1.0, 1.0), (12.0, 2.0)));
        // The opposite order gives (22, 2).
        let m = Affine::translation(10.0, 0.0).then(&Affine::scale(2.0, 2.0));
        assert!(close(m.map_point(1.0, 1.0), (22.0, 2.0)));
    }

    #[test]
    fn quarter_rotation() {
        let m = Affine::rotation(std::f64::consts::FRAC_PI_2);
        assert!(close(m.map_point(1.0, 0.0), (0.0, 1.0)));
        assert!(close(m.map_point(0.0, 1.0), (-1.0, 0.0)));
    }

    #[test]
    fn shear_slants_in_x_only() {
        let m = Affine::shear_x(0.5);
        assert!(close(m.map_point(0.0, 2.0), (1.0, 2.0)));
        assert!(close(m.map_point(3.0, 0.0), (3.0, 0.0)));
    }

    #[test]
    fn map_distance_ignores_translation() {
        let m = Affine::scale(2.0, 3.0).then(&Affine::translation(100.0, 100.0));
        assert!(close(m.map_distance(1.0, 1.0), (2.0, 3.0)));
    }

    #[test]
    fn anchor_scale_identity_when_spaces_coincide() {
        let p1 = (0.0, 0.0);
        let p2 = (11880.0, 8400.0);
        let m = Affine::anchor_scale(p1, p2, p1, p2).expect("well-formed anchors");
        assert!(close(m.map_point(500.0, 4000.0), (500.0, 4000.0)));
    }

    #[test]
    fn anchor_scale_maps_both_anchor_points() {
        let m = Affine::anchor_scale((0.0, 0.0), (100.0, 50.0), (1000.0, 2000.0), (3000.0, 4000.0))
            .expect("well-formed anchors");
        assert!(close(m.map_point(0.0, 0.0), (1000.0, 2000.0)));
        assert!(close(m.map_point(100.0, 50.0), (3000.0, 4000.0)));
    }

    #[test]
    fn anchor_scale_rejects_degenerate_axis() {
        assert!(Affine::anchor_scale((0.0, 0.0), (0.0, 50.0), (0.0, 0.0), (10.0, 10.0)).is_none());
        assert!(Affine::anchor_scale((5.0, 1.0), (9.0, 1.0), (0.0, 0.0), (10.0, 10.0)).is_none());
    }
}
