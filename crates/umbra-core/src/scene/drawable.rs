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

use super::SceneNode;
use crate::math::{Mat4, Sphere, Vec3};
use crate::renderer::{
    DrawPass, MaterialDef, MaterialId, MeshRef, PrimitiveTopology, TextureRef, VertexLayout,
};

/// Something the renderer can draw.
pub trait Drawable: Send + Sync {
    /// The mesh to draw.
    fn mesh(&self) -> MeshRef;

    /// The material, or `None` to use the pass default.
    fn material(&self) -> Option<&MaterialDef>;

    /// The content hash of [`material`](Self::material).
    fn material_id(&self) -> Option<MaterialId> {
        self.material().map(MaterialDef::id)
    }

    /// The texture bound to a named material slot (e.g. `"diffuse"`).
    fn texture(&self, slot: &str) -> Option<TextureRef>;

    /// Object to world transform.
    fn world_transform(&self) -> Mat4;

    /// World-space bounding sphere, used for frustum culling.
    fn bounding_sphere(&self) -> Sphere;

    /// Whether the object is rendered into shadow maps.
    fn cast_shadows(&self) -> bool {
        true
    }

    /// The pass family that renders the object.
    fn draw_pass(&self) -> DrawPass {
        self.material().map(|m| m.pass).unwrap_or_default()
    }

    /// Whether the object is blended and must be drawn back to front.
    fn is_transparent(&self) -> bool {
        self.material().is_some_and(|m| m.transparent)
    }

    /// The primitive topology of the mesh.
    fn primitive(&self) -> PrimitiveTopology {
        self.material().map(|m| m.primitive).unwrap_or_default()
    }

    /// The vertex layout of the mesh.
    fn vertex_layout(&self) -> VertexLayout {
        self.material().map(|m| m.vertex_layout).unwrap_or_default()
    }
}

/// A mesh with a fixed transform, material and texture set.
#[derive(Debug, Clone)]
pub struct StaticMesh {
    mesh: MeshRef,
    material: Option<MaterialDef>,
    material_id: Option<MaterialId>,
    textures: Vec<(String, TextureRef)>,
    transform: Mat4,
    local_bounds: Sphere,
    cast_shadows: bool,
    enabled: bool,
}

impl StaticMesh {
    /// Creates a mesh at the origin with a unit bounding sphere.
    pub fn new(mesh: MeshRef, material: Option<MaterialDef>) -> Self {
        let material_id = material.as_ref().map(MaterialDef::id);
        Self {
            mesh,
            material,
            material_id,
            textures: Vec::new(),
            transform: Mat4::IDENTITY,
            local_bounds: Sphere::new(Vec3::ZERO, 1.0),
            cast_shadows: true,
            enabled: true,
        }
    }

    /// Sets the object to world transform.
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Sets the object-space bounding sphere.
    pub fn with_bounds(mut self, bounds: Sphere) -> Self {
        self.local_bounds = bounds;
        self
    }

    /// Binds a texture to a material slot.
    pub fn with_texture(mut self, slot: impl Into<String>, texture: TextureRef) -> Self {
        self.textures.push((slot.into(), texture));
        self
    }

    /// Enables or disables shadow casting.
    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    /// Moves the mesh.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Shows or hides the mesh.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl Drawable for StaticMesh {
    fn mesh(&self) -> MeshRef {
        self.mesh
    }

    fn material(&self) -> Option<&MaterialDef> {
        self.material.as_ref()
    }

    fn material_id(&self) -> Option<MaterialId> {
        self.material_id
    }

    fn texture(&self, slot: &str) -> Option<TextureRef> {
        self.textures
            .iter()
            .find(|(name, _)| name == slot)
            .map(|(_, texture)| *texture)
    }

    fn world_transform(&self) -> Mat4 {
        self.transform
    }

    fn bounding_sphere(&self) -> Sphere {
        self.local_bounds.transformed(&self.transform)
    }

    fn cast_shadows(&self) -> bool {
        self.cast_shadows
    }
}

impl SceneNode for StaticMesh {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn as_drawable(&self) -> Option<&(dyn Drawable + 'static)> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_material() {
        let mesh = StaticMesh::new(MeshRef(1), None);
        assert_eq!(mesh.material_id(), None);
        assert_eq!(mesh.draw_pass(), DrawPass::Deferred);
        assert!(!mesh.is_transparent());
    }

    #[test]
    fn test_cached_material_id_matches_definition() {
        let mesh = StaticMesh::new(MeshRef(1), Some(MaterialDef::transparent_forward()));
        assert_eq!(
            mesh.material_id(),
            Some(MaterialDef::transparent_forward().id())
        );
        assert!(mesh.is_transparent());
    }

    #[test]
    fn test_texture_slots_and_bounds() {
        let mesh = StaticMesh::new(MeshRef(1), None)
            .with_texture("diffuse", TextureRef(7))
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        assert_eq!(mesh.texture("diffuse"), Some(TextureRef(7)));
        assert_eq!(mesh.texture("normal"), None);
        assert_eq!(mesh.bounding_sphere().center, Vec3::new(0.0, 2.0, 0.0));
    }
}
