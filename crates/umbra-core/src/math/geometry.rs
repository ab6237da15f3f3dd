// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounding volumes and the view-frustum test used for culling.

use super::{Mat4, Vec3, Vec4};

/// A bounding sphere in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sphere {
    /// The center of the sphere.
    pub center: Vec3,
    /// The radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    /// Creates a new sphere.
    #[inline]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Transforms a local-space sphere by an affine matrix.
    ///
    /// The radius is scaled by the largest axis scale so the result still
    /// encloses the transformed geometry.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        Self {
            center: transform.project_point(self.center),
            radius: self.radius * transform.max_axis_scale(),
        }
    }
}

/// A plane in Hessian normal form: `dot(normal, p) + distance = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    /// The unit normal of the plane, pointing towards the inside of the frustum.
    pub normal: Vec3,
    /// Signed distance term.
    pub distance: f32,
}

impl Plane {
    /// Builds a normalized plane from raw `ax + by + cz + d` coefficients.
    fn from_coefficients(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                distance: v.w / len,
            }
        } else {
            Self {
                normal,
                distance: v.w,
            }
        }
    }

    /// Signed distance from the plane to `point` (positive on the inside).
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// A view frustum expressed as six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum planes from a view-projection matrix with a
    /// [0, 1] clip-space depth range.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);
        let sub = |a: Vec4, b: Vec4| Vec4::new(a.x - b.x, a.y - b.y, a.z - b.z, a.w - b.w);

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(sub(r3, r0)),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(sub(r3, r1)),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(sub(r3, r2)),
            ],
        }
    }

    /// Returns `true` if the sphere is at least partially inside the frustum.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(sphere.center) >= -sphere.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_frustum() -> Frustum {
        let proj = Mat4::perspective_rh_zo(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0).unwrap();
        let view = Mat4::look_at_rh(Vec3::ZERO, -Vec3::Z, Vec3::Y).unwrap();
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_sphere_in_front_is_visible() {
        let frustum = camera_frustum();
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
    }

    #[test]
    fn test_sphere_behind_camera_is_culled() {
        let frustum = camera_frustum();
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)));
    }

    #[test]
    fn test_sphere_beyond_far_plane_is_culled() {
        let frustum = camera_frustum();
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -200.0), 1.0)));
    }

    #[test]
    fn test_sphere_straddling_side_plane_is_visible() {
        let frustum = camera_frustum();
        // 90 degree fov: the side plane at depth 10 sits at x = 10.
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::new(10.5, 0.0, -10.0), 1.0)));
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(14.0, 0.0, -10.0), 1.0)));
    }

    #[test]
    fn test_transformed_sphere_scales_radius() {
        let t = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))
            * Mat4::from_scale(Vec3::new(2.0, 3.0, 1.0));
        let s = Sphere::new(Vec3::ZERO, 1.0).transformed(&t);
        assert_eq!(s.center, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(s.radius, 3.0);
    }
}
