//! Easing curves used to shape transition progress.

use serde::{Deserialize, Serialize};

/// Cubic Bézier control points (x1, y1, x2, y2) of a curve from (0,0) to (1,1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubicBezier {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl CubicBezier {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    fn sample(a: f64, b: f64, t: f64) -> f64 {
        let mt = 1.0 - t;
        3.0 * mt * mt * t * a + 3.0 * mt * t * t * b + t * t * t
    }

    fn sample_dx(&self, t: f64) -> f64 {
        let mt = 1.0 - t;
        3.0 * mt * mt * self.x1 + 6.0 * mt * t * (self.x2 - self.x1) + 3.0 * t * t * (1.0 - self.x2)
    }

    /// Solve x(t) = `x` with Newton-Raphson and return y(t).
    pub fn evaluate(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        let mut t = x;
        for _ in 0..8 {
            let err = Self::sample(self.x1, self.x2, t) - x;
            if err.abs() < 1e-10 {
                break;
            }
            let dx = self.sample_dx(t);
            if dx.abs() < 1e-12 {
                break;
            }
            t = (t - err / dx).clamp(0.0, 1.0);
        }
        Self::sample(self.y1, self.y2, t)
    }

    pub const EASE_IN: Self = Self::new(0.42, 0.0, 1.0, 1.0);
    pub const EASE_OUT: Self = Self::new(0.0, 0.0, 0.58, 1.0);
    pub const EASE_IN_OUT: Self = Self::new(0.42, 0.0, 0.58, 1.0);
}

/// Named easing presets plus a custom curve.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Bezier(CubicBezier),
}

impl Easing {
    /// Map linear progress in `[0, 1]` through the curve.
    pub fn apply(self, progress: f64) -> f64 {
        let p = progress.clamp(0.0, 1.0);
        match self {
            Self::Linear => p,
            Self::EaseIn => CubicBezier::EASE_IN.evaluate(p),
            Self::EaseOut => CubicBezier::EASE_OUT.evaluate(p),
            Self::EaseInOut => CubicBezier::EASE_IN_OUT.evaluate(p),
            Self::Bezier(curve) => curve.evaluate(p),
        }
    }
}
