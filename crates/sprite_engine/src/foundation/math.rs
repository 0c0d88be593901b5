//! Plane math
//!
//! Sprites are placed with homogeneous 3x3 matrices. Positions and sizes are
//! in pixels, angles in degrees.

pub use nalgebra::{Matrix3, Point2 as NPoint2, Vector2};

/// Pixel-space vector
pub type Vec2 = Vector2<f32>;

/// Affine transform in homogeneous form
pub type Mat3 = Matrix3<f32>;

/// Pixel-space point
pub type Point2 = NPoint2<f32>;

/// Local placement of a game object relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    /// Offset from the parent origin
    pub position: Vec2,
    /// Degrees
    pub rotation: f32,
    /// Per-axis scale
    pub scale: Vec2,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            rotation: 0.0,
            scale: Vec2::new(1.0, 1.0),
        }
    }
}

impl Transform2D {
    /// Matrix scaling first, then rotating, then translating
    pub fn to_matrix(&self) -> Mat3 {
        translation(self.position) * rotation_degrees(self.rotation) * scaling(self.scale)
    }
}

/// Translation matrix
pub fn translation(offset: Vec2) -> Mat3 {
    Mat3::new_translation(&offset)
}

/// Rotation matrix around the origin, angle in degrees
pub fn rotation_degrees(angle: f32) -> Mat3 {
    Mat3::new_rotation(angle * constants::DEG_TO_RAD)
}

/// Non-uniform scaling matrix
pub fn scaling(scale: Vec2) -> Mat3 {
    Mat3::new_nonuniform_scaling(&scale)
}

/// Apply a transformation matrix to a point
pub fn transform_point(matrix: &Mat3, point: Vec2) -> Vec2 {
    matrix.transform_point(&Point2::new(point.x, point.y)).coords
}

/// Invert a transformation matrix, falling back to identity for singular input
/// (a zero scale collapses the object and there is nothing meaningful to map back)
pub fn inverse_or_identity(matrix: &Mat3) -> Mat3 {
    matrix.try_inverse().unwrap_or_else(Mat3::identity)
}

/// Angle in degrees of the transformed x axis, normalized to `[0, 360)`
pub fn absolute_rotation(matrix: &Mat3) -> f32 {
    let a = transform_point(matrix, Vec2::zeros());
    let b = transform_point(matrix, Vec2::new(1.0, 0.0));
    let angle = (b.y - a.y).atan2(b.x - a.x) * constants::RAD_TO_DEG;
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// Floor both coordinates of a point
pub fn floor2(point: Vec2) -> Vec2 {
    Vec2::new(point.x.floor(), point.y.floor())
}

/// Smallest power of two not less than `value`, starting from `minimum`
pub fn next_pow2_at_least(value: u32, minimum: u32) -> u32 {
    let mut size = minimum.max(1);
    while size < value {
        size <<= 1;
    }
    size
}

/// Angle conversion factors
pub mod constants {
    use std::f32::consts::PI;

    /// Degrees to radians
    pub const DEG_TO_RAD: f32 = PI / 180.0;
    /// Radians to degrees
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_translation_then_rotation_order() {
        let t = Transform2D {
            position: Vec2::new(10.0, 0.0),
            rotation: 90.0,
            scale: Vec2::new(2.0, 1.0),
        };
        let p = transform_point(&t.to_matrix(), Vec2::new(1.0, 0.0));
        // scaled to (2,0), rotated to (0,2), translated to (10,2)
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_absolute_rotation_normalized() {
        assert_relative_eq!(absolute_rotation(&rotation_degrees(-90.0)), 270.0, epsilon = 1e-3);
        assert_relative_eq!(absolute_rotation(&rotation_degrees(45.0)), 45.0, epsilon = 1e-3);
        assert_relative_eq!(absolute_rotation(&Mat3::identity()), 0.0);
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = Transform2D {
            position: Vec2::new(3.0, -7.0),
            rotation: 30.0,
            scale: Vec2::new(1.5, 0.5),
        }
        .to_matrix();
        let inv = inverse_or_identity(&m);
        let p = transform_point(&inv, transform_point(&m, Vec2::new(4.0, 5.0)));
        assert_relative_eq!(p.x, 4.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2_at_least(800, 256), 1024);
        assert_eq!(next_pow2_at_least(100, 256), 256);
        assert_eq!(next_pow2_at_least(512, 256), 512);
    }
}
