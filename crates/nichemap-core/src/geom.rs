//! Small planar geometry helpers used when laying out transect lines
//! around occurrence points. All coordinate math uses f64.

pub type Point = (f64, f64);

/// The point `dist` units from `p1` along the direction of `p1 -> p2`.
/// A zero-length direction leaves `p1` unchanged.
pub fn pt_on_line(p1: Point, p2: Point, dist: f64) -> Point {
    let (dx, dy) = (p2.0 - p1.0, p2.1 - p1.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < f64::EPSILON {
        return p1;
    }
    (p1.0 + dist * dx / length, p1.1 + dist * dy / length)
}

/// The point `dist` units from `p1`, perpendicular to the direction of
/// `p1 -> p2`. `left` picks the side when looking from `p1` towards `p2`.
pub fn pt_to_side(p1: Point, p2: Point, dist: f64, left: bool) -> Point {
    let (dx, dy) = (p2.0 - p1.0, p2.1 - p1.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < f64::EPSILON {
        return p1;
    }
    let (nx, ny) = if left {
        (-dy / length, dx / length)
    } else {
        (dy / length, -dx / length)
    };
    (p1.0 + dist * nx, p1.1 + dist * ny)
}

/// Angle of the direction `p1 -> p2`, in radians from the positive x-axis.
pub fn azimuth(p1: Point, p2: Point) -> f64 {
    (p2.1 - p1.1).atan2(p2.0 - p1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn point_on_horizontal_line_moves_along_x() {
        let p = pt_on_line((2.0, 5.0), (12.0, 5.0), 3.0);
        assert_abs_diff_eq!(p.0, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.1, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn side_point_is_at_a_right_angle() {
        let p1 = (2.0, 5.0);
        let p2 = (12.0, 5.0);
        let side = pt_to_side(p1, p2, 4.0, true);
        let along = azimuth(p1, p2);
        let offset = azimuth(p1, side);
        assert_abs_diff_eq!(offset - along, FRAC_PI_2, epsilon = 1e-12);
        // Distance from the anchor is preserved.
        let d = ((side.0 - p1.0).powi(2) + (side.1 - p1.1).powi(2)).sqrt();
        assert_abs_diff_eq!(d, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn side_flag_mirrors_the_offset() {
        let left = pt_to_side((0.0, 0.0), (1.0, 0.0), 2.0, true);
        let right = pt_to_side((0.0, 0.0), (1.0, 0.0), 2.0, false);
        assert_abs_diff_eq!(left.1, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(right.1, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_direction_returns_the_anchor() {
        assert_eq!(pt_on_line((1.0, 1.0), (1.0, 1.0), 5.0), (1.0, 1.0));
        assert_eq!(pt_to_side((1.0, 1.0), (1.0, 1.0), 5.0, true), (1.0, 1.0));
    }
}
