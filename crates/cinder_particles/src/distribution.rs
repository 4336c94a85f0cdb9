//! # Distributions
//!
//! Scalar and vector values sampled by modules: constants, uniform ranges
//! and piecewise-linear curves over a time parameter.
//!
//! ## TOML shape
//!
//! ```toml
//! spawn_rate = { type = "constant", value = 20.0 }
//! lifetime = { type = "uniform", min = 1.0, max = 2.0 }
//! scale = { type = "curve", points = [{ time = 0.0, value = 1.0 }, { time = 1.0, value = 0.0 }] }
//! ```

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::context::SimRng;

/// A key of a scalar curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Input value.
    pub time: f32,
    /// Output value.
    pub value: f32,
}

/// A key of a vector curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorCurvePoint {
    /// Input value.
    pub time: f32,
    /// Output value.
    pub value: Vec3,
}

/// A scalar distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FloatDistribution {
    /// Always `value`.
    Constant {
        /// The value.
        value: f32,
    },
    /// Uniformly random in `[min, max]`.
    Uniform {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },
    /// Piecewise linear over time, clamped at the ends.
    Curve {
        /// Keys sorted by time.
        points: Vec<CurvePoint>,
    },
}

impl Default for FloatDistribution {
    fn default() -> Self {
        Self::Constant { value: 0.0 }
    }
}

impl FloatDistribution {
    /// A constant distribution.
    #[inline]
    #[must_use]
    pub const fn constant(value: f32) -> Self {
        Self::Constant { value }
    }

    /// A uniform distribution.
    #[inline]
    #[must_use]
    pub const fn uniform(min: f32, max: f32) -> Self {
        Self::Uniform { min, max }
    }

    /// Samples the distribution at `time`.
    ///
    /// Only uniform distributions draw from `rng`.
    pub fn sample(&self, time: f32, rng: &mut SimRng) -> f32 {
        match self {
            Self::Constant { value } => *value,
            Self::Uniform { min, max } => min + (max - min) * rng.gen::<f32>(),
            Self::Curve { points } => eval_curve(points, time, |p| (p.time, p.value), lerp),
        }
    }

    /// Returns the `(min, max)` range this distribution can produce.
    #[must_use]
    pub fn range(&self) -> (f32, f32) {
        match self {
            Self::Constant { value } => (*value, *value),
            Self::Uniform { min, max } => (min.min(*max), min.max(*max)),
            Self::Curve { points } => points.iter().fold(
                (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), p| (lo.min(p.value), hi.max(p.value)),
            ),
        }
    }
}

/// A vector distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VectorDistribution {
    /// Always `value`.
    Constant {
        /// The value.
        value: Vec3,
    },
    /// Uniformly random per component in `[min, max]`.
    Uniform {
        /// Lower corner.
        min: Vec3,
        /// Upper corner.
        max: Vec3,
    },
    /// Piecewise linear over time, clamped at the ends.
    Curve {
        /// Keys sorted by time.
        points: Vec<VectorCurvePoint>,
    },
}

impl Default for VectorDistribution {
    fn default() -> Self {
        Self::Constant { value: Vec3::ZERO }
    }
}

impl VectorDistribution {
    /// A constant distribution.
    #[inline]
    #[must_use]
    pub const fn constant(value: Vec3) -> Self {
        Self::Constant { value }
    }

    /// A uniform distribution.
    #[inline]
    #[must_use]
    pub const fn uniform(min: Vec3, max: Vec3) -> Self {
        Self::Uniform { min, max }
    }

    /// Samples the distribution at `time`.
    pub fn sample(&self, time: f32, rng: &mut SimRng) -> Vec3 {
        match self {
            Self::Constant { value } => *value,
            Self::Uniform { min, max } => {
                let t = Vec3::new(rng.gen(), rng.gen(), rng.gen());
                *min + (*max - *min) * t
            }
            Self::Curve { points } => {
                eval_curve(points, time, |p| (p.time, p.value), |a, b, t| a.lerp(b, t))
            }
        }
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Evaluates a sorted key list with clamped ends.
fn eval_curve<P, V: Default + Copy>(
    points: &[P],
    time: f32,
    key: impl Fn(&P) -> (f32, V),
    mix: impl Fn(V, V, f32) -> V,
) -> V {
    let Some(first) = points.first() else {
        return V::default();
    };
    let (first_time, first_value) = key(first);
    if time <= first_time {
        return first_value;
    }

    let mut prev = (first_time, first_value);
    for point in &points[1..] {
        let (t, v) = key(point);
        if time < t {
            let span = t - prev.0;
            if span <= f32::EPSILON {
                return v;
            }
            return mix(prev.1, v, (time - prev.0) / span);
        }
        prev = (t, v);
    }
    prev.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> SimRng {
        SimRng::seed_from_u64(7)
    }

    #[test]
    fn test_constant() {
        let d = FloatDistribution::constant(3.0);
        assert_eq!(d.sample(0.5, &mut rng()), 3.0);
        assert_eq!(d.range(), (3.0, 3.0));
    }

    #[test]
    fn test_uniform_stays_in_range() {
        let d = FloatDistribution::uniform(1.0, 2.0);
        let mut rng = rng();
        for _ in 0..100 {
            let v = d.sample(0.0, &mut rng);
            assert!((1.0..=2.0).contains(&v));
        }
    }

    #[test]
    fn test_curve_interpolates_and_clamps() {
        let d = FloatDistribution::Curve {
            points: vec![
                CurvePoint { time: 0.0, value: 0.0 },
                CurvePoint { time: 1.0, value: 10.0 },
            ],
        };
        let mut rng = rng();
        assert!((d.sample(0.25, &mut rng) - 2.5).abs() < 1e-5);
        assert_eq!(d.sample(-1.0, &mut rng), 0.0);
        assert_eq!(d.sample(5.0, &mut rng), 10.0);
    }

    #[test]
    fn test_empty_curve_is_zero() {
        let d = FloatDistribution::Curve { points: Vec::new() };
        assert_eq!(d.sample(0.5, &mut rng()), 0.0);
    }

    #[test]
    fn test_vector_curve() {
        let d = VectorDistribution::Curve {
            points: vec![
                VectorCurvePoint { time: 0.0, value: Vec3::ZERO },
                VectorCurvePoint { time: 2.0, value: Vec3::splat(4.0) },
            ],
        };
        let v = d.sample(1.0, &mut rng());
        assert!((v - Vec3::splat(2.0)).length() < 1e-5);
    }

    #[test]
    fn test_toml_shape() {
        #[derive(Deserialize)]
        struct Holder {
            rate: FloatDistribution,
            offset: VectorDistribution,
        }
        let parsed: Holder = toml::from_str(
            r#"
            rate = { type = "uniform", min = 1.0, max = 4.0 }
            offset = { type = "constant", value = [1.0, 2.0, 3.0] }
            "#,
        )
        .unwrap();
        assert_eq!(parsed.rate, FloatDistribution::uniform(1.0, 4.0));
        assert_eq!(parsed.offset, VectorDistribution::constant(Vec3::new(1.0, 2.0, 3.0)));
    }
}
