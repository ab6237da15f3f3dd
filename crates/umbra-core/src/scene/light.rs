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

//! Light capabilities and the concrete light types.

use super::SceneNode;
use crate::math::{LinearRgba, Mat4, Vec3, Vec4};
use crate::renderer::uniforms::{LightRecord, MAX_CASCADES};
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-unique light identity, stable for the light's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u64);

impl LightId {
    /// Allocates a new identity.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The kind of a light; the discriminant is what shaders see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightKind {
    /// Uniform light everywhere.
    Ambient = 0,
    /// Parallel rays, optionally with cascaded shadows.
    Directional = 1,
    /// Omnidirectional light with a range.
    Point = 2,
}

/// One shadow cascade of a light: a light-space camera covering a slice of
/// the viewer's frustum.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cascade {
    /// Light view matrix.
    pub view: Mat4,
    /// Orthographic projection.
    pub proj: Mat4,
    /// `proj * view`.
    pub view_proj: Mat4,
    /// Start of the slice, in view-space distance.
    pub near_split: f32,
    /// End of the slice, in view-space distance.
    pub far_split: f32,
}

/// Looks up the sampler slot of a light's shadow map.
pub trait ShadowResolver {
    /// Returns the slot of `(light, cascade)`, or `None` when no shadow map exists.
    fn shadow_slot(&mut self, light: LightId, cascade: usize) -> Option<u32>;

    /// Number of cascades per light that can have a shadow map at all.
    fn cascade_limit(&self) -> usize {
        MAX_CASCADES
    }
}

/// A resolver for passes without shadows.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoShadows;

impl ShadowResolver for NoShadows {
    fn shadow_slot(&mut self, _light: LightId, _cascade: usize) -> Option<u32> {
        None
    }
}

/// Something that emits light.
pub trait Light: Send + Sync {
    /// The light's identity.
    fn id(&self) -> LightId;

    /// The kind.
    fn kind(&self) -> LightKind;

    /// Linear colour.
    fn color(&self) -> LinearRgba;

    /// Intensity multiplier.
    fn intensity(&self) -> f32;

    /// Range (point lights).
    fn range(&self) -> f32 {
        0.0
    }

    /// Attenuation coefficients (constant, linear, quadratic).
    fn attenuation(&self) -> Vec3 {
        Vec3::ZERO
    }

    /// World position.
    fn position(&self) -> Vec3 {
        Vec3::ZERO
    }

    /// Direction the light travels.
    fn direction(&self) -> Vec3 {
        -Vec3::Y
    }

    /// Whether the shadow pass should render maps for this light.
    fn cast_shadows(&self) -> bool {
        false
    }

    /// Number of shadow cascades.
    fn cascade_count(&self) -> usize {
        0
    }

    /// The light-space camera of a cascade.
    fn cascade(&self, _index: usize) -> Option<Cascade> {
        None
    }

    /// Builds the GPU record, resolving shadow maps through `shadows`.
    ///
    /// Only the first [`ShadowResolver::cascade_limit`] cascades are written.
    /// A cascade without a shadow map gets slot 0, which shaders treat as
    /// "unshadowed".
    fn light_record(&self, shadows: &mut dyn ShadowResolver) -> LightRecord {
        let kind = self.kind();
        let position = match kind {
            LightKind::Directional => self.direction().normalize().extend(0.0),
            LightKind::Point => self.position().extend(1.0),
            LightKind::Ambient => Vec4::ZERO,
        };
        let mut record = LightRecord {
            color: self.color(),
            position,
            attenuation: self.attenuation().extend(0.0),
            kind: kind as u32,
            intensity: self.intensity(),
            range: self.range(),
            ..Default::default()
        };

        let count = self
            .cascade_count()
            .min(MAX_CASCADES)
            .min(shadows.cascade_limit());
        for index in 0..count {
            let Some(cascade) = self.cascade(index) else {
                continue;
            };
            record.view_proj[index] = cascade.view_proj;
            record.distance[index] = cascade.far_split;
            if self.cast_shadows() {
                record.shadowmap[index] =
                    shadows.shadow_slot(self.id(), index).unwrap_or_else(|| {
                        log::trace!(
                            "No shadow map for light {:?} cascade {index} yet, rendering unshadowed",
                            self.id()
                        );
                        0
                    });
            }
        }
        record
    }
}

/// Uniform light applied everywhere.
#[derive(Debug, Clone)]
pub struct AmbientLight {
    id: LightId,
    /// Colour.
    pub color: LinearRgba,
    /// Intensity.
    pub intensity: f32,
}

impl AmbientLight {
    /// Creates an ambient light.
    pub fn new(color: LinearRgba, intensity: f32) -> Self {
        Self {
            id: LightId::fresh(),
            color,
            intensity,
        }
    }
}

impl Light for AmbientLight {
    fn id(&self) -> LightId {
        self.id
    }

    fn kind(&self) -> LightKind {
        LightKind::Ambient
    }

    fn color(&self) -> LinearRgba {
        self.color
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }
}

impl SceneNode for AmbientLight {
    fn as_light(&self) -> Option<&(dyn Light + 'static)> {
        Some(self)
    }
}

/// An omnidirectional light.
#[derive(Debug, Clone)]
pub struct PointLight {
    id: LightId,
    /// World position.
    pub position: Vec3,
    /// Colour.
    pub color: LinearRgba,
    /// Intensity.
    pub intensity: f32,
    /// Distance at which the contribution reaches zero.
    pub range: f32,
    /// Constant, linear and quadratic attenuation.
    pub attenuation: Vec3,
}

impl PointLight {
    /// Creates a point light with quadratic falloff.
    pub fn new(position: Vec3, color: LinearRgba, intensity: f32, range: f32) -> Self {
        Self {
            id: LightId::fresh(),
            position,
            color,
            intensity,
            range,
            attenuation: Vec3::new(1.0, 0.0, 2.0),
        }
    }
}

impl Light for PointLight {
    fn id(&self) -> LightId {
        self.id
    }

    fn kind(&self) -> LightKind {
        LightKind::Point
    }

    fn color(&self) -> LinearRgba {
        self.color
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn range(&self) -> f32 {
        self.range
    }

    fn attenuation(&self) -> Vec3 {
        self.attenuation
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}

impl SceneNode for PointLight {
    fn as_light(&self) -> Option<&(dyn Light + 'static)> {
        Some(self)
    }
}

/// A sun-like light with cascaded shadow maps.
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    id: LightId,
    /// Direction the light travels.
    pub direction: Vec3,
    /// Colour.
    pub color: LinearRgba,
    /// Intensity.
    pub intensity: f32,
    /// Whether shadow maps are rendered.
    pub shadows: bool,
    /// Blend between logarithmic (1.0) and uniform (0.0) cascade splits.
    pub cascade_lambda: f32,
    /// Blend distance between cascades, stored in the record's range.
    pub cascade_blend: f32,
    /// Resolution the texel snapping assumes.
    pub shadow_map_size: u32,
    cascades: Vec<Cascade>,
}

impl DirectionalLight {
    /// Creates a light with `cascades` cascades (at most four are used).
    pub fn new(direction: Vec3, color: LinearRgba, intensity: f32, cascades: usize) -> Self {
        Self {
            id: LightId::fresh(),
            direction: direction.normalize(),
            color,
            intensity,
            shadows: true,
            cascade_lambda: 0.9,
            cascade_blend: 3.0,
            shadow_map_size: 2048,
            cascades: vec![Cascade::default(); cascades.min(MAX_CASCADES)],
        }
    }

    /// Enables or disables shadows.
    pub fn with_shadows(mut self, shadows: bool) -> Self {
        self.shadows = shadows;
        self
    }

    /// Recomputes every cascade for the given camera.
    ///
    /// The camera frustum between `near` and `far` is split with a blend of
    /// logarithmic and uniform distribution, and each slice is enclosed in a
    /// texel-snapped orthographic projection looking along the light.
    pub fn update_cascades(&mut self, view: &Mat4, proj: &Mat4, near: f32, far: f32) {
        let inv_view_proj = (*proj * *view).inverse_or_identity();
        let mut corners = [Vec3::ZERO; 8];
        let mut i = 0;
        for z in [0.0, 1.0] {
            for y in [1.0, -1.0] {
                for x in [-1.0, 1.0] {
                    corners[i] = inv_view_proj.project_point(Vec3::new(x, y, z));
                    i += 1;
                }
            }
        }

        let count = self.cascades.len();
        for index in 0..count {
            self.cascades[index] = self.fit_cascade(&corners, index, count, near, far);
        }
    }

    fn fit_cascade(
        &self,
        frustum: &[Vec3; 8],
        index: usize,
        count: usize,
        near: f32,
        far: f32,
    ) -> Cascade {
        let near_split = if index == 0 {
            0.0
        } else {
            split_distance(index - 1, count, near, far, self.cascade_lambda)
        };
        let far_split = split_distance(index, count, near, far, self.cascade_lambda);

        let mut corners = *frustum;
        for i in 0..4 {
            let ray = frustum[i + 4] - frustum[i];
            corners[i] = frustum[i] + ray * near_split;
            corners[i + 4] = frustum[i] + ray * far_split;
        }

        let center = corners.iter().fold(Vec3::ZERO, |acc, c| acc + *c) / 8.0;
        let radius = corners
            .iter()
            .map(|c| c.distance(center))
            .fold(0.0_f32, f32::max);
        let radius = ((radius / 16.0).ceil() * 16.0).max(16.0);

        let up = if self.direction.y.abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let eye = center - self.direction * radius;
        let view = Mat4::look_at_rh(eye, center, up).unwrap_or(Mat4::IDENTITY);
        let mut proj = Mat4::orthographic_rh_zo(
            -radius - 0.01,
            radius + 0.01,
            -radius - 0.01,
            radius + 0.01,
            0.0,
            2.0 * radius,
        );

        // Snap the projected origin to a texel to keep shadow edges stable while moving.
        let texels = self.shadow_map_size as f32 / 2.0;
        let origin = (proj * view).project_point(Vec3::ZERO);
        proj.cols[3].x += ((origin.x * texels).round() - origin.x * texels) / texels;
        proj.cols[3].y += ((origin.y * texels).round() - origin.y * texels) / texels;

        Cascade {
            view,
            proj,
            view_proj: proj * view,
            near_split: near + near_split * (far - near),
            far_split: near + far_split * (far - near),
        }
    }
}

/// Normalized [0, 1] far boundary of cascade `index` out of `count`.
fn split_distance(index: usize, count: usize, near: f32, far: f32, lambda: f32) -> f32 {
    let p = (index as f32 + 1.0) / count as f32;
    let log = near * (far / near).powf(p);
    let uniform = near + (far - near) * p;
    let d = lambda * (log - uniform) + uniform;
    (d - near) / (far - near)
}

impl Light for DirectionalLight {
    fn id(&self) -> LightId {
        self.id
    }

    fn kind(&self) -> LightKind {
        LightKind::Directional
    }

    fn color(&self) -> LinearRgba {
        self.color
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn range(&self) -> f32 {
        self.cascade_blend
    }

    fn direction(&self) -> Vec3 {
        self.direction
    }

    fn cast_shadows(&self) -> bool {
        self.shadows
    }

    fn cascade_count(&self) -> usize {
        self.cascades.len()
    }

    fn cascade(&self, index: usize) -> Option<Cascade> {
        self.cascades.get(index).copied()
    }
}

impl SceneNode for DirectionalLight {
    fn as_light(&self) -> Option<&(dyn Light + 'static)> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    struct MapResolver(HashMap<(LightId, usize), u32>);

    impl ShadowResolver for MapResolver {
        fn shadow_slot(&mut self, light: LightId, cascade: usize) -> Option<u32> {
            self.0.get(&(light, cascade)).copied()
        }
    }

    fn camera() -> (Mat4, Mat4) {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, Vec3::Y).unwrap();
        let proj = Mat4::perspective_rh_zo(crate::math::FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0).unwrap();
        (view, proj)
    }

    #[test]
    fn test_light_ids_are_unique() {
        assert_ne!(LightId::fresh(), LightId::fresh());
    }

    #[test]
    fn test_split_distances_are_monotonic_and_end_at_far() {
        let splits = (0..4)
            .map(|i| split_distance(i, 4, 0.1, 100.0, 0.9))
            .collect::<Vec<_>>();
        assert!(splits.windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(splits[3], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_cascades_cover_increasing_ranges() {
        let (view, proj) = camera();
        let mut sun = DirectionalLight::new(Vec3::new(-0.3, -1.0, -0.2), LinearRgba::WHITE, 1.0, 4);
        sun.update_cascades(&view, &proj, 0.1, 100.0);

        assert_eq!(sun.cascade_count(), 4);
        let cascades = (0..4).filter_map(|i| sun.cascade(i)).collect::<Vec<_>>();
        assert_eq!(cascades.len(), 4);
        for pair in cascades.windows(2) {
            assert_relative_eq!(pair[0].far_split, pair[1].near_split, epsilon = 1e-3);
        }
        assert_relative_eq!(cascades[3].far_split, 100.0, epsilon = 1e-2);

        // The viewer's focus point lands inside the first cascade's clip volume.
        let p = cascades[0].view_proj.project_point(Vec3::ZERO);
        assert!(p.x.abs() <= 1.0 && p.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&p.z));
    }

    #[test]
    fn test_light_record_resolves_shadow_slots() {
        let (view, proj) = camera();
        let mut sun = DirectionalLight::new(-Vec3::Y, LinearRgba::WHITE, 2.0, 2);
        sun.update_cascades(&view, &proj, 0.1, 100.0);

        let mut resolver = MapResolver(HashMap::from([((sun.id(), 0), 5)]));
        let record = sun.light_record(&mut resolver);
        assert_eq!(record.kind, LightKind::Directional as u32);
        assert_eq!(record.shadowmap, [5, 0, 0, 0]);
        assert_eq!(record.position.w, 0.0);
        assert_eq!(record.intensity, 2.0);
        assert_eq!(record.distance[1], sun.cascade(1).unwrap().far_split);
    }

    struct LimitedResolver {
        limit: usize,
        asked: Vec<usize>,
    }

    impl ShadowResolver for LimitedResolver {
        fn shadow_slot(&mut self, _light: LightId, cascade: usize) -> Option<u32> {
            self.asked.push(cascade);
            Some(cascade as u32 + 1)
        }

        fn cascade_limit(&self) -> usize {
            self.limit
        }
    }

    #[test]
    fn test_light_record_stops_at_cascade_limit() {
        let (view, proj) = camera();
        let mut sun = DirectionalLight::new(-Vec3::Y, LinearRgba::WHITE, 1.0, 4);
        sun.update_cascades(&view, &proj, 0.1, 100.0);

        let mut resolver = LimitedResolver {
            limit: 2,
            asked: Vec::new(),
        };
        let record = sun.light_record(&mut resolver);
        assert_eq!(resolver.asked, [0, 1]);
        assert_eq!(record.shadowmap, [1, 2, 0, 0]);
        assert_eq!(record.distance[2], 0.0);
        assert_eq!(record.distance[3], 0.0);
        assert_eq!(record.view_proj[3], Mat4::IDENTITY);

        let unlimited = sun.light_record(&mut NoShadows);
        assert_eq!(unlimited.distance[3], sun.cascade(3).unwrap().far_split);
    }

    #[test]
    fn test_point_and_ambient_records() {
        let point = PointLight::new(Vec3::new(1.0, 2.0, 3.0), LinearRgba::WHITE, 1.0, 10.0);
        let record = point.light_record(&mut NoShadows);
        assert_eq!(record.kind, LightKind::Point as u32);
        assert_eq!(record.position, Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(record.range, 10.0);
        assert_eq!(record.shadowmap, [0; 4]);

        let ambient = AmbientLight::new(LinearRgba::WHITE, 0.33);
        assert_eq!(ambient.light_record(&mut NoShadows).kind, 0);
    }
}
