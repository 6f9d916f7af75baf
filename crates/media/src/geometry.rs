//! Frame sizes and display transforms.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel area, widened so 16384x16384 cannot overflow.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Affine display transform stored alongside a video track.
///
/// The matrix is `[a b 0; c d 0; tx ty 1]`, the same layout container
/// formats use for track headers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Pure rotation by a multiple of 90 degrees (clockwise, as players apply it).
    pub fn rotation(degrees: i32) -> Self {
        let radians = (degrees.rem_euclid(360) as f64).to_radians();
        let (sin, cos) = radians.sin_cos();
        Self {
            a: cos.round(),
            b: sin.round(),
            c: -sin.round(),
            d: cos.round(),
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Rotation angle in whole degrees, in `[0, 360)`.
    pub fn rotation_degrees(&self) -> i32 {
        let degrees = self.b.atan2(self.a).to_degrees().round() as i32;
        degrees.rem_euclid(360)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_does_not_overflow() {
        assert_eq!(Size::new(16384, 16384).area(), 268_435_456);
    }

    #[test]
    fn test_rotation_round_trip() {
        for degrees in [0, 90, 180, 270] {
            assert_eq!(Transform::rotation(degrees).rotation_degrees(), degrees);
        }
        assert!(Transform::rotation(360).is_identity());
    }
}
