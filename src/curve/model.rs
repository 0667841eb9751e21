use kurbo::{CubicBez, ParamCurve, Point};

/// Cubic parallax trajectory of one sampled point.
///
/// The four control points are fully determined by the anchor position, the
/// point's depth offset from the zero-depth plane and the handle fraction:
///
/// ```text
/// curvature = (depth - zero_depth) * curvature_scale
/// offset    = curvature * (1 + 3 * a_factor) / 4
/// P0 = (x - curvature,            y - curvature            + offset)
/// H0 = (x - curvature * a_factor, y - curvature * a_factor + offset)
/// H1 = (x + curvature * a_factor, y - curvature * a_factor + offset)
/// P3 = (x + curvature,            y - curvature            + offset)
/// ```
///
/// The offset term places the anchor itself on the curve at tick 0.5, which is
/// what keeps the center frame of a warped sequence an exact copy of the input
/// field. Zero curvature collapses the curve to the anchor for every tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParallaxCurve {
    cubic: CubicBez,
}

impl ParallaxCurve {
    /// Build the trajectory for a point with the given depth.
    ///
    /// `curvature_scale` is `field_width / b_factor`; see
    /// [`SceneParams::curvature_scale`](crate::SceneParams::curvature_scale).
    /// Depth and curvature are unrestricted; near-zero-curvature filtering is
    /// the caller's decision.
    pub fn build(
        pos: Point,
        depth: f32,
        zero_depth: f32,
        a_factor: f64,
        curvature_scale: f64,
    ) -> Self {
        let curvature = f64::from(depth - zero_depth) * curvature_scale;
        let offset = curvature * (1.0 + 3.0 * a_factor) / 4.0;
        let handle = curvature * a_factor;
        let end_y = pos.y - curvature + offset;
        let handle_y = pos.y - handle + offset;
        Self {
            cubic: CubicBez::new(
                Point::new(pos.x - curvature, end_y),
                Point::new(pos.x - handle, handle_y),
                Point::new(pos.x + handle, handle_y),
                Point::new(pos.x + curvature, end_y),
            ),
        }
    }

    /// Trajectory of a bare depth value anchored at the origin.
    ///
    /// Evaluating this curve yields the displacement a cell of that depth
    /// experiences at a tick, independent of the cell's position.
    pub fn displacement(depth: f32, zero_depth: f32, a_factor: f64, curvature_scale: f64) -> Self {
        Self::build(Point::ORIGIN, depth, zero_depth, a_factor, curvature_scale)
    }

    /// Evaluate the cubic at tick `t` in `[0, 1]`.
    pub fn eval(&self, t: f64) -> Point {
        self.cubic.eval(t)
    }

    /// Exact sub-curve whose evaluation over `[0, 1]` reproduces this curve's
    /// evaluation over `[t0, t1]`.
    ///
    /// Uses control-point subdivision, not endpoint interpolation, so exported
    /// segment shapes match the parent curve exactly.
    pub fn subsegment(&self, t0: f64, t1: f64) -> Self {
        Self {
            cubic: self.cubic.subsegment(t0..t1),
        }
    }

    /// The four control points `[P0, H0, H1, P3]`.
    pub fn control_points(&self) -> [Point; 4] {
        [self.cubic.p0, self.cubic.p1, self.cubic.p2, self.cubic.p3]
    }

    /// SVG cubic path command for the whole curve, two-decimal coordinates.
    pub fn to_path_data(&self) -> String {
        let c = self.cubic;
        format!(
            "M {:.2},{:.2} C {:.2},{:.2} {:.2},{:.2} {:.2},{:.2}",
            c.p0.x, c.p0.y, c.p1.x, c.p1.y, c.p2.x, c.p2.y, c.p3.x, c.p3.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point, eps: f64) {
        assert!(
            (a.x - b.x).abs() < eps && (a.y - b.y).abs() < eps,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn zero_depth_offset_collapses_to_the_anchor() {
        let anchor = Point::new(42.0, 17.0);
        let curve = ParallaxCurve::build(anchor, 128.0, 128.0, 0.16, 0.5);
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert_close(curve.eval(t), anchor, 1e-12);
        }
    }

    #[test]
    fn anchor_lies_on_the_curve_at_half_tick() {
        let anchor = Point::new(30.0, 40.0);
        let curve = ParallaxCurve::build(anchor, 200.0, 128.0, 0.16, 0.64);
        assert_close(curve.eval(0.5), anchor, 1e-9);
    }

    #[test]
    fn control_points_match_the_closed_form() {
        // 4x4 field valued 200, zero depth 128, a 0.66, b 1400:
        // curvature = 72 * 4 / 1400, offset = curvature * 2.98 / 4.
        let curvature = 72.0 * 4.0 / 1400.0;
        let offset = curvature * (1.0 + 3.0 * 0.66) / 4.0;
        let curve = ParallaxCurve::build(Point::new(2.0, 2.0), 200.0, 128.0, 0.66, 4.0 / 1400.0);
        let [p0, h0, h1, p3] = curve.control_points();
        assert_close(p0, Point::new(2.0 - curvature, 2.0 - curvature + offset), 1e-12);
        assert_close(
            h0,
            Point::new(2.0 - curvature * 0.66, 2.0 - curvature * 0.66 + offset),
            1e-12,
        );
        assert_close(
            h1,
            Point::new(2.0 + curvature * 0.66, 2.0 - curvature * 0.66 + offset),
            1e-12,
        );
        assert_close(p3, Point::new(2.0 + curvature, 2.0 - curvature + offset), 1e-12);
    }

    #[test]
    fn full_subsegment_reproduces_the_control_points() {
        let curve = ParallaxCurve::build(Point::new(5.0, 9.0), 180.0, 128.0, 0.3, 0.2);
        let full = curve.subsegment(0.0, 1.0);
        for (a, b) in curve.control_points().iter().zip(full.control_points()) {
            assert_close(*a, b, 1e-12);
        }
    }

    #[test]
    fn subsegment_is_an_affine_reparameterization() {
        let curve = ParallaxCurve::build(Point::new(12.0, 7.0), 250.0, 100.0, 0.4, 0.35);
        let (t0, t1) = (0.2, 0.7);
        let sub = curve.subsegment(t0, t1);
        for i in 0..=20 {
            let s = i as f64 / 20.0;
            assert_close(sub.eval(s), curve.eval(t0 + s * (t1 - t0)), 1e-9);
        }
    }

    #[test]
    fn path_data_uses_two_decimal_cubic_syntax() {
        let curve = ParallaxCurve::build(Point::new(2.0, 2.0), 200.0, 128.0, 0.66, 4.0 / 1400.0);
        assert_eq!(
            curve.to_path_data(),
            "M 1.79,1.95 C 1.86,2.02 2.14,2.02 2.21,1.95"
        );
    }
}
