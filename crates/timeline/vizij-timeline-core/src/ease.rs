//! Progress remap curves applied to normalized loop progress.

use serde::{Deserialize, Serialize};

/// Monotonic remap of normalized progress `[0, 1] -> [0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Ease {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InSine,
    OutSine,
    InOutSine,
    /// CSS-style control points `[x1, y1, x2, y2]`.
    CubicBezier([f64; 4]),
    /// Jump in `n` equal steps; the final step lands on 1.
    Steps(u32),
}

impl Ease {
    /// Remap `t`, clamped to `[0, 1]`. Endpoints are preserved exactly.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        if t == 0.0 || t == 1.0 {
            return t;
        }
        use std::f64::consts::PI;
        match *self {
            Ease::Linear => t,
            Ease::InQuad => t * t,
            Ease::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Ease::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Ease::InCubic => t * t * t,
            Ease::OutCubic => 1.0 - (1.0 - t).powi(3),
            Ease::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Ease::InSine => 1.0 - (t * PI / 2.0).cos(),
            Ease::OutSine => (t * PI / 2.0).sin(),
            Ease::InOutSine => -((PI * t).cos() - 1.0) / 2.0,
            Ease::CubicBezier(cp) => cubic_bezier(t, &cp),
            Ease::Steps(n) => {
                let n = n.max(1) as f64;
                (t * n).floor() / n
            }
        }
    }

    #[inline]
    pub fn is_linear(&self) -> bool {
        matches!(self, Ease::Linear)
    }
}

/// One coordinate of a unit cubic Bezier with end points 0 and 1.
#[inline]
fn bezier_axis(s: f64, c1: f64, c2: f64) -> f64 {
    // 3(1-s)^2 s c1 + 3(1-s) s^2 c2 + s^3, in Horner form.
    ((1.0 + 3.0 * c1 - 3.0 * c2) * s + (3.0 * c2 - 6.0 * c1)) * s * s + 3.0 * c1 * s
}

#[inline]
fn bezier_axis_slope(s: f64, c1: f64, c2: f64) -> f64 {
    3.0 * (1.0 + 3.0 * c1 - 3.0 * c2) * s * s + 2.0 * (3.0 * c2 - 6.0 * c1) * s + 3.0 * c1
}

fn cubic_bezier(x: f64, &[x1, y1, x2, y2]: &[f64; 4]) -> f64 {
    // Solve x(s) = x with Newton steps, falling back to bisection when the slope flattens.
    let mut s = x;
    for _ in 0..8 {
        let err = bezier_axis(s, x1, x2) - x;
        if err.abs() < 1e-9 {
            return bezier_axis(s, y1, y2);
        }
        let slope = bezier_axis_slope(s, x1, x2);
        if slope.abs() < 1e-6 {
            break;
        }
        s = (s - err / slope).clamp(0.0, 1.0);
    }
    let (mut lo, mut hi) = (0.0, 1.0);
    s = x;
    for _ in 0..48 {
        let err = bezier_axis(s, x1, x2) - x;
        if err.abs() < 1e-9 {
            break;
        }
        if err < 0.0 {
            lo = s;
        } else {
            hi = s;
        }
        s = 0.5 * (lo + hi);
    }
    bezier_axis(s, y1, y2)
}
