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

//! The capability layer between a scene and the renderer.
//!
//! The renderer does not know concrete node types. It walks a tree of
//! [`SceneNode`]s and asks each one whether it is [`Drawable`] or a [`Light`].
//! [`Query`] turns such a walk into a flat, homogeneous list.

mod drawable;
mod light;

pub use drawable::*;
pub use light::*;

use std::marker::PhantomData;

/// A node of a scene tree.
pub trait SceneNode: Send + Sync + 'static {
    /// Disabled nodes are skipped together with their whole subtree.
    fn is_enabled(&self) -> bool {
        true
    }

    /// The direct children of this node.
    fn children(&self) -> &[Box<dyn SceneNode>] {
        &[]
    }

    /// Returns the drawable capability, if the node has one.
    fn as_drawable(&self) -> Option<&(dyn Drawable + 'static)> {
        None
    }

    /// Returns the light capability, if the node has one.
    fn as_light(&self) -> Option<&(dyn Light + 'static)> {
        None
    }
}

/// A capability a [`Query`] can collect.
pub trait Capability: 'static {
    /// Extracts the capability from a node.
    fn extract(node: &dyn SceneNode) -> Option<&Self>;
}

impl Capability for dyn Drawable {
    fn extract(node: &dyn SceneNode) -> Option<&Self> {
        node.as_drawable()
    }
}

impl Capability for dyn Light {
    fn extract(node: &dyn SceneNode) -> Option<&Self> {
        node.as_light()
    }
}

type Predicate<'f, T> = Box<dyn Fn(&T) -> bool + 'f>;

/// Collects every node with capability `T` under a root.
///
/// Traversal is depth-first, pre-order, following child order, so the result
/// is deterministic for a given tree.
///
/// ```
/// use umbra_core::scene::{Drawable, Group, Query};
/// let root = Group::new("root");
/// let drawables = Query::<dyn Drawable>::new()
///     .filter(|d| d.cast_shadows())
///     .collect(&root);
/// assert!(drawables.is_empty());
/// ```
pub struct Query<'f, T: Capability + ?Sized> {
    filters: Vec<Predicate<'f, T>>,
    _marker: PhantomData<fn(&T)>,
}

impl<'f, T: Capability + ?Sized> Default for Query<'f, T> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<'f, T: Capability + ?Sized> Query<'f, T> {
    /// Creates an unfiltered query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate; all predicates must hold for a node to be collected.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + 'f) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Walks the tree below (and including) `root`.
    pub fn collect<'a>(&self, root: &'a dyn SceneNode) -> Vec<&'a T> {
        let mut out = Vec::new();
        self.visit(root, &mut out);
        out
    }

    fn visit<'a>(&self, node: &'a dyn SceneNode, out: &mut Vec<&'a T>) {
        if !node.is_enabled() {
            return;
        }
        if let Some(item) = T::extract(node) {
            if self.filters.iter().all(|f| f(item)) {
                out.push(item);
            }
        }
        for child in node.children() {
            self.visit(child.as_ref(), out);
        }
    }
}

/// A plain grouping node.
pub struct Group {
    /// Display name.
    pub name: String,
    /// Whether the subtree is visible to queries.
    pub enabled: bool,
    /// Child nodes.
    pub children: Vec<Box<dyn SceneNode>>,
}

impl Group {
    /// Creates an empty, enabled group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            children: Vec::new(),
        }
    }

    /// Appends a child.
    pub fn with(mut self, child: impl SceneNode) -> Self {
        self.children.push(Box::new(child));
        self
    }

    /// Appends a child in place.
    pub fn push(&mut self, child: impl SceneNode) {
        self.children.push(Box::new(child));
    }
}

impl SceneNode for Group {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn children(&self) -> &[Box<dyn SceneNode>] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{LinearRgba, Mat4, Vec3};
    use crate::renderer::{DrawPass, MaterialDef, MeshRef};

    fn mesh(id: u64) -> StaticMesh {
        StaticMesh::new(MeshRef(id), Some(MaterialDef::standard_deferred()))
    }

    fn tree() -> Group {
        let mut disabled = Group::new("hidden").with(mesh(99));
        disabled.enabled = false;

        Group::new("root")
            .with(mesh(1))
            .with(
                Group::new("child")
                    .with(mesh(2))
                    .with(PointLight::new(Vec3::ZERO, LinearRgba::WHITE, 1.0, 10.0))
                    .with(mesh(3)),
            )
            .with(disabled)
            .with(
                StaticMesh::new(MeshRef(4), Some(MaterialDef::standard_forward()))
                    .with_transform(Mat4::from_translation(Vec3::X)),
            )
    }

    #[test]
    fn test_query_is_depth_first_pre_order() {
        let root = tree();
        let found = Query::<dyn Drawable>::new().collect(&root);
        let ids = found.iter().map(|d| d.mesh().0).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_query_skips_disabled_subtrees() {
        let root = tree();
        let found = Query::<dyn Drawable>::new().collect(&root);
        assert!(found.iter().all(|d| d.mesh().0 != 99));
    }

    #[test]
    fn test_query_filters_compose() {
        let root = tree();
        let forward = Query::<dyn Drawable>::new()
            .filter(|d| d.draw_pass() == DrawPass::Forward)
            .collect(&root);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].mesh(), MeshRef(4));

        let none = Query::<dyn Drawable>::new()
            .filter(|d| d.draw_pass() == DrawPass::Forward)
            .filter(|d| d.mesh().0 != 4)
            .collect(&root);
        assert!(none.is_empty());
    }

    #[test]
    fn test_light_query() {
        let root = tree();
        let lights = Query::<dyn Light>::new().collect(&root);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].kind(), LightKind::Point);
    }
}
