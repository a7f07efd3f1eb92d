//! Minimal pose math for camera transforms
//!
//! Transforms are row-major 4x4 matrices of f64, matching the wire layout of
//! the pose record. Only the operations the pose streamer needs are provided:
//! translation/rotation extraction and delta comparison.

/// Row-major 4x4 transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [f64; 16]);

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.0[3] = x;
        m.0[7] = y;
        m.0[11] = z;
        m
    }

    /// Rotation about the Y axis, with an optional translation
    pub fn from_rotation_y(angle: f64, translation: Vec3) -> Self {
        let (s, c) = angle.sin_cos();
        Mat4([
            c, 0.0, s, translation.x, //
            0.0, 1.0, 0.0, translation.y, //
            -s, 0.0, c, translation.z, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    pub fn elements(&self) -> &[f64; 16] {
        &self.0
    }

    pub fn translation(&self) -> Vec3 {
        Vec3 {
            x: self.0[3],
            y: self.0[7],
            z: self.0[11],
        }
    }

    /// Extract the rotation as a unit quaternion (assumes an unscaled basis)
    pub fn rotation(&self) -> Quat {
        let m = &self.0;
        let (m00, m01, m02) = (m[0], m[1], m[2]);
        let (m10, m11, m12) = (m[4], m[5], m[6]);
        let (m20, m21, m22) = (m[8], m[9], m[10]);

        let trace = m00 + m11 + m22;
        if trace > 0.0 {
            let s = 0.5 / (trace + 1.0).sqrt();
            Quat {
                w: 0.25 / s,
                x: (m21 - m12) * s,
                y: (m02 - m20) * s,
                z: (m10 - m01) * s,
            }
        } else if m00 > m11 && m00 > m22 {
            let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
            Quat {
                w: (m21 - m12) / s,
                x: 0.25 * s,
                y: (m01 + m10) / s,
                z: (m02 + m20) / s,
            }
        } else if m11 > m22 {
            let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
            Quat {
                w: (m02 - m20) / s,
                x: (m01 + m10) / s,
                y: 0.25 * s,
                z: (m12 + m21) / s,
            }
        } else {
            let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
            Quat {
                w: (m10 - m01) / s,
                x: (m02 + m20) / s,
                y: (m12 + m21) / s,
                z: 0.25 * s,
            }
        }
    }
}

/// Position in world units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Unit quaternion orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn dot(&self, other: Quat) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Angle between two orientations in radians
    pub fn angle_to(&self, other: Quat) -> f64 {
        2.0 * self.dot(other).abs().clamp(0.0, 1.0).acos()
    }
}
