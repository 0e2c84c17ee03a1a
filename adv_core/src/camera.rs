//! Pinhole cameras in the OpenGL/Blender convention.
//!
//! Cameras look down their local `-z` axis with `+y` up. Poses are camera-to-world
//! matrices stored row-major, exactly as they appear in `transforms_*.json` files.

use crate::traits::ViewProjector;
use crate::types::{Point3, Ray};

/// Camera intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    /// Focal length along x.
    pub fx: f32,
    /// Focal length along y.
    pub fy: f32,
    /// Principal point x.
    pub cx: f32,
    /// Principal point y.
    pub cy: f32,
}

impl Intrinsics {
    /// Intrinsics for a centered principal point and a horizontal field of view in radians.
    pub fn from_fov_x(width: usize, height: usize, fov_x: f32) -> Self {
        let focal = 0.5 * width as f32 / libm::tanf(0.5 * fov_x);
        Self {
            fx: focal,
            fy: focal,
            cx: width as f32 * 0.5,
            cy: height as f32 * 0.5,
        }
    }

    /// Intrinsics scaled for an image downsampled by `factor`.
    pub fn downscaled(&self, factor: f32) -> Self {
        Self {
            fx: self.fx / factor,
            fy: self.fy / factor,
            cx: self.cx / factor,
            cy: self.cy / factor,
        }
    }
}

/// A pinhole camera with pose and resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    /// Camera-to-world transform, row-major.
    pub pose: [[f32; 4]; 4],
    /// Intrinsics.
    pub intrinsics: Intrinsics,
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
}

impl PinholeCamera {
    /// Create a camera.
    pub fn new(pose: [[f32; 4]; 4], intrinsics: Intrinsics, width: usize, height: usize) -> Self {
        Self {
            pose,
            intrinsics,
            width,
            height,
        }
    }

    /// Camera center in world space.
    #[inline]
    pub fn center(&self) -> Point3 {
        Point3::new(self.pose[0][3], self.pose[1][3], self.pose[2][3])
    }

    /// Rotate a camera-space direction into world space.
    #[inline]
    fn rotate(&self, d: Point3) -> Point3 {
        let m = &self.pose;
        Point3::new(
            m[0][0] * d.x + m[0][1] * d.y + m[0][2] * d.z,
            m[1][0] * d.x + m[1][1] * d.y + m[1][2] * d.z,
            m[2][0] * d.x + m[2][1] * d.y + m[2][2] * d.z,
        )
    }

    /// Rotate a world-space direction into camera space (transpose of the pose rotation).
    #[inline]
    fn rotate_inv(&self, d: Point3) -> Point3 {
        let m = &self.pose;
        Point3::new(
            m[0][0] * d.x + m[1][0] * d.y + m[2][0] * d.z,
            m[0][1] * d.x + m[1][1] * d.y + m[2][1] * d.z,
            m[0][2] * d.x + m[1][2] * d.y + m[2][2] * d.z,
        )
    }

    /// Ray through the continuous pixel position `(u, v)`, direction normalized.
    pub fn ray(&self, u: f32, v: f32) -> Ray {
        let k = &self.intrinsics;
        let d_cam = Point3::new((u - k.cx) / k.fx, -(v - k.cy) / k.fy, -1.0);
        Ray::new(self.center(), self.rotate(d_cam).normalize())
    }

    /// Ray through the center of pixel `(x, y)`.
    #[inline]
    pub fn pixel_ray(&self, x: usize, y: usize) -> Ray {
        self.ray(x as f32 + 0.5, y as f32 + 0.5)
    }

    /// Uniformly scale and offset the camera position (used to fit scenes into the bound).
    pub fn rescaled(mut self, scale: f32, offset: Point3) -> Self {
        for (row, off) in [offset.x, offset.y, offset.z].iter().enumerate() {
            self.pose[row][3] = self.pose[row][3] * scale + off;
        }
        self
    }

    /// Same camera rendering at a different resolution.
    pub fn resized(mut self, width: usize, height: usize) -> Self {
        let sx = width as f32 / self.width as f32;
        let sy = height as f32 / self.height as f32;
        self.intrinsics = Intrinsics {
            fx: self.intrinsics.fx * sx,
            fy: self.intrinsics.fy * sy,
            cx: self.intrinsics.cx * sx,
            cy: self.intrinsics.cy * sy,
        };
        self.width = width;
        self.height = height;
        self
    }
}

impl ViewProjector for PinholeCamera {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn project(&self, p: Point3) -> Option<(f32, f32)> {
        let pc = self.rotate_inv(p - self.center());
        if pc.z >= -1e-6 {
            return None;
        }
        let depth = -pc.z;
        let k = &self.intrinsics;
        Some((k.fx * pc.x / depth + k.cx, k.cy - k.fy * pc.y / depth))
    }
}

/// Camera-to-world pose at `eye` looking at `target`, with `+z` world up.
pub fn look_at(eye: Point3, target: Point3) -> [[f32; 4]; 4] {
    let forward = (target - eye).normalize();
    let mut up = Point3::new(0.0, 0.0, 1.0);
    if libm::fabsf(forward.dot(up)) > 0.999 {
        up = Point3::new(0.0, 1.0, 0.0);
    }
    let right = forward.cross(up).normalize();
    let cam_up = right.cross(forward);
    let back = -forward;

    [
        [right.x, cam_up.x, back.x, eye.x],
        [right.y, cam_up.y, back.y, eye.y],
        [right.z, cam_up.z, back.z, eye.z],
        [0.0, 0.0, 0.0, 1.0],
    ]
}
