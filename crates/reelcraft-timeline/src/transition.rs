//! Clip transitions.
//!
//! Each transition kind has a fixed parameter set and resolves to a
//! `PlaneModifier` that the scene applies on top of the clip's own
//! transform and opacity.

use glam::Vec3;
use reelcraft_core::Easing;
use serde::{Deserialize, Serialize};

/// Direction a sliding clip travels when entering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlideDirection {
    Left,
    Right,
    Up,
    Down,
}

impl SlideDirection {
    /// Unit vector pointing where the clip comes from.
    fn origin(self) -> Vec3 {
        match self {
            Self::Left => Vec3::X,
            Self::Right => Vec3::NEG_X,
            Self::Up => Vec3::NEG_Y,
            Self::Down => Vec3::Y,
        }
    }
}

/// Transition type with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransitionKind {
    Fade,
    /// Pass through a solid color.
    DipToColor { color: [u8; 3] },
    /// Move in from `distance` world units away.
    Slide { direction: SlideDirection, distance: f32 },
    /// Scale from `from_scale` to 1 while fading.
    Zoom { from_scale: f32 },
    /// Rotate about the view axis while growing.
    Spin { turns: f32 },
}

/// Whether the transition brings a clip in or takes it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    In,
    Out,
}

/// A transition attached to one end of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub kind: TransitionKind,
    /// Seconds.
    pub duration: f64,
    #[serde(default)]
    pub easing: Easing,
}

impl Transition {
    pub fn new(kind: TransitionKind, duration: f64) -> Self {
        Self {
            kind,
            duration,
            easing: Easing::default(),
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Modifier at linear `progress` through the transition.
    ///
    /// For `In`, progress 0 is fully hidden and 1 is the untouched clip; `Out`
    /// runs the same curve backwards.
    pub fn evaluate(&self, progress: f64, phase: TransitionPhase) -> PlaneModifier {
        let progress = progress.clamp(0.0, 1.0);
        let linear = match phase {
            TransitionPhase::In => progress,
            TransitionPhase::Out => 1.0 - progress,
        };
        let p = self.easing.apply(linear) as f32;
        let rest = 1.0 - p;

        match self.kind {
            TransitionKind::Fade => PlaneModifier {
                opacity: p,
                ..PlaneModifier::IDENTITY
            },
            TransitionKind::DipToColor { color } => {
                let c = color.map(|v| v as f32 / 255.0);
                PlaneModifier {
                    tint: [
                        c[0] * rest + p,
                        c[1] * rest + p,
                        c[2] * rest + p,
                    ],
                    ..PlaneModifier::IDENTITY
                }
            }
            TransitionKind::Slide { direction, distance } => PlaneModifier {
                offset: direction.origin() * distance * rest,
                ..PlaneModifier::IDENTITY
            },
            TransitionKind::Zoom { from_scale } => PlaneModifier {
                opacity: p,
                scale: from_scale * rest + p,
                ..PlaneModifier::IDENTITY
            },
            TransitionKind::Spin { turns } => PlaneModifier {
                rotation_z: turns * std::f32::consts::TAU * rest,
                scale: p,
                ..PlaneModifier::IDENTITY
            },
        }
    }
}

/// Per-frame adjustments produced by transitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneModifier {
    pub opacity: f32,
    pub offset: Vec3,
    pub scale: f32,
    /// Radians about the plane normal.
    pub rotation_z: f32,
    /// Multiplied into the sampled RGB.
    pub tint: [f32; 3],
}

impl PlaneModifier {
    pub const IDENTITY: Self = Self {
        opacity: 1.0,
        offset: Vec3::ZERO,
        scale: 1.0,
        rotation_z: 0.0,
        tint: [1.0; 3],
    };

    /// Stack two modifiers.
    pub fn combine(self, other: Self) -> Self {
        Self {
            opacity: self.opacity * other.opacity,
            offset: self.offset + other.offset,
            scale: self.scale * other.scale,
            rotation_z: self.rotation_z + other.rotation_z,
            tint: [
                self.tint[0] * other.tint[0],
                self.tint[1] * other.tint[1],
                self.tint[2] * other.tint[2],
            ],
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for PlaneModifier {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_endpoints() {
        let t = Transition::new(TransitionKind::Fade, 1.0);
        assert_eq!(t.evaluate(0.0, TransitionPhase::In).opacity, 0.0);
        assert_eq!(t.evaluate(1.0, TransitionPhase::In).opacity, 1.0);
        assert_eq!(t.evaluate(0.0, TransitionPhase::Out).opacity, 1.0);
        assert_eq!(t.evaluate(1.0, TransitionPhase::Out).opacity, 0.0);
    }

    #[test]
    fn test_completed_transitions_are_identity() {
        let kinds = [
            TransitionKind::Fade,
            TransitionKind::DipToColor { color: [0, 0, 0] },
            TransitionKind::Slide {
                direction: SlideDirection::Left,
                distance: 3.0,
            },
            TransitionKind::Zoom { from_scale: 0.5 },
            TransitionKind::Spin { turns: 1.0 },
        ];
        for kind in kinds {
            let m = Transition::new(kind, 0.5).evaluate(1.0, TransitionPhase::In);
            assert!(m.is_identity(), "{kind:?} -> {m:?}");
        }
    }

    #[test]
    fn test_slide_starts_offset() {
        let t = Transition::new(
            TransitionKind::Slide {
                direction: SlideDirection::Left,
                distance: 2.0,
            },
            1.0,
        );
        assert_eq!(t.evaluate(0.0, TransitionPhase::In).offset, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_dip_to_black_darkens() {
        let t = Transition::new(TransitionKind::DipToColor { color: [0, 0, 0] }, 1.0);
        assert_eq!(t.evaluate(0.0, TransitionPhase::In).tint, [0.0; 3]);
    }

    #[test]
    fn test_serde_tagged() {
        let t = Transition::new(TransitionKind::Zoom { from_scale: 0.25 }, 0.5);
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"type\":\"zoom\""));
        let back: Transition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_combine() {
        let a = PlaneModifier {
            opacity: 0.5,
            ..PlaneModifier::IDENTITY
        };
        let b = PlaneModifier {
            opacity: 0.5,
            scale: 2.0,
            ..PlaneModifier::IDENTITY
        };
        let c = a.combine(b);
        assert_eq!(c.opacity, 0.25);
        assert_eq!(c.scale, 2.0);
    }
}
