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

use crate::error::PassError;
use ahash::AHashMap;
use std::borrow::Cow;
use umbra_core::renderer::{CompiledShader, Fetch, MaterialDef, MaterialId, ShaderProvider};

/// Rewrites a material definition before it is built (e.g. the shadow pass
/// swaps every shader for its depth-only variant).
pub type MaterialTransform = Box<dyn Fn(&MaterialDef) -> MaterialDef + Send + Sync>;

/// The outcome of one build attempt.
#[derive(Debug)]
pub enum Build<T> {
    /// Built; the cache keeps it.
    Ready(T),
    /// A dependency is still loading; try again next frame.
    Pending,
    /// A dependency can never load; the material is remembered as invalid.
    Invalid(String),
}

/// Builds and destroys the GPU side of cached materials.
pub trait MaterialMaker {
    /// What the cache stores per material.
    type Material;

    /// Builds a material with `frames` per-frame instances.
    ///
    /// GPU failures are fatal and returned as errors; missing dependencies
    /// are reported through [`Build`].
    fn build(
        &mut self,
        def: &MaterialDef,
        frames: usize,
    ) -> Result<Build<Self::Material>, PassError>;

    /// Releases a material's GPU objects.
    fn destroy(&mut self, material: Self::Material) -> Result<(), PassError>;
}

/// Polls a shader and maps the answer onto a build outcome.
pub fn fetch_shader(shaders: &dyn ShaderProvider, name: &str) -> Build<CompiledShader> {
    match shaders.try_fetch(name) {
        Fetch::Ready(shader) => Build::Ready(shader),
        Fetch::Pending => Build::Pending,
        Fetch::Failed(reason) => Build::Invalid(format!("shader '{name}': {reason}")),
    }
}

/// Materials keyed by the content hash of their definition.
///
/// A lookup either returns the cached material or builds it as a whole; a
/// build that is not ready inserts nothing, so the next frame retries from
/// scratch. Materials whose build reported [`Build::Invalid`] are remembered
/// and skipped without rebuilding until [`invalidate`](Self::invalidate) or
/// [`forget_invalid`](Self::forget_invalid) is called.
pub struct MaterialCache<M: MaterialMaker> {
    maker: M,
    frames: usize,
    default: MaterialDef,
    default_id: MaterialId,
    transform: Option<MaterialTransform>,
    materials: AHashMap<MaterialId, M::Material>,
    invalid: AHashMap<MaterialId, String>,
}

impl<M: MaterialMaker> MaterialCache<M> {
    /// Creates an empty cache. Drawables without a material use `default`.
    pub fn new(maker: M, frames: usize, default: MaterialDef) -> Self {
        Self {
            maker,
            frames: frames.max(1),
            default_id: default.id(),
            default,
            transform: None,
            materials: AHashMap::new(),
            invalid: AHashMap::new(),
        }
    }

    /// Rewrites every definition before it is built.
    ///
    /// Materials stay keyed by the hash of the original definition.
    pub fn with_transform(mut self, transform: MaterialTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The definition used for drawables without a material.
    pub fn default_def(&self) -> &MaterialDef {
        &self.default
    }

    /// The id of [`default_def`](Self::default_def).
    pub fn default_id(&self) -> MaterialId {
        self.default_id
    }

    /// Per-frame instance count of every material.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The maker.
    pub fn maker(&self) -> &M {
        &self.maker
    }

    /// Returns the material for `def` (the default when `None`), building it
    /// on a miss. `Ok(None)` means not ready or invalid.
    pub fn get_or_build(
        &mut self,
        def: Option<&MaterialDef>,
    ) -> Result<Option<&mut M::Material>, PassError> {
        let id = def.map_or(self.default_id, MaterialDef::id);
        self.get_or_build_with_id(id, def)
    }

    /// Like [`get_or_build`](Self::get_or_build) with a precomputed id.
    pub fn get_or_build_with_id(
        &mut self,
        id: MaterialId,
        def: Option<&MaterialDef>,
    ) -> Result<Option<&mut M::Material>, PassError> {
        if !self.materials.contains_key(&id) {
            if self.invalid.contains_key(&id) {
                return Ok(None);
            }
            let def = def.unwrap_or(&self.default);
            let def = match &self.transform {
                Some(transform) => Cow::Owned(transform(def)),
                None => Cow::Borrowed(def),
            };
            match self.maker.build(&def, self.frames)? {
                Build::Ready(material) => {
                    log::debug!(
                        "MaterialCache: Built material {:?} (shader '{}', {} frames)",
                        id,
                        def.shader,
                        self.frames
                    );
                    self.materials.insert(id, material);
                }
                Build::Pending => return Ok(None),
                Build::Invalid(reason) => {
                    log::warn!(
                        "MaterialCache: Material {id:?} is invalid and will be skipped: {reason}"
                    );
                    self.invalid.insert(id, reason);
                    return Ok(None);
                }
            }
        }
        Ok(self.materials.get_mut(&id))
    }

    /// A cached material.
    pub fn get(&self, id: MaterialId) -> Option<&M::Material> {
        self.materials.get(&id)
    }

    /// A cached material, mutably.
    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut M::Material> {
        self.materials.get_mut(&id)
    }

    /// Every cached material.
    pub fn iter(&self) -> impl Iterator<Item = (&MaterialId, &M::Material)> {
        self.materials.iter()
    }

    /// Every cached material, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&MaterialId, &mut M::Material)> {
        self.materials.iter_mut()
    }

    /// Whether `id` is cached.
    pub fn contains(&self, id: MaterialId) -> bool {
        self.materials.contains_key(&id)
    }

    /// The reason `id` was marked invalid, if it was.
    pub fn invalid_reason(&self, id: MaterialId) -> Option<&str> {
        self.invalid.get(&id).map(String::as_str)
    }

    /// Number of cached materials.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Destroys `id` and clears its invalid mark; the next lookup rebuilds it.
    pub fn invalidate(&mut self, id: MaterialId) -> Result<(), PassError> {
        self.invalid.remove(&id);
        match self.materials.remove(&id) {
            Some(material) => self.maker.destroy(material),
            None => Ok(()),
        }
    }

    /// Clears every invalid mark so failed materials are retried.
    pub fn forget_invalid(&mut self) {
        self.invalid.clear();
    }

    /// Destroys every cached material.
    ///
    /// Every material is released even if some fail; the first error is returned.
    pub fn destroy(&mut self) -> Result<(), PassError> {
        let mut first_error = None;
        for (id, material) in self.materials.drain() {
            if let Err(e) = self.maker.destroy(material) {
                log::warn!("MaterialCache: Failed to destroy material {id:?}: {e}");
                first_error.get_or_insert(e);
            }
        }
        self.invalid.clear();
        first_error.map_or(Ok(()), Err)
    }
}

impl<M: MaterialMaker> std::fmt::Debug for MaterialCache<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialCache")
            .field("frames", &self.frames)
            .field("default", &self.default.shader)
            .field("materials", &self.materials.len())
            .field("invalid", &self.invalid.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use umbra_core::renderer::CullMode;

    /// Builds `shader` names found in `ready`, pends on `pending`, rejects the rest.
    #[derive(Default)]
    struct FakeMaker {
        ready: Vec<&'static str>,
        pending: Vec<&'static str>,
        builds: HashMap<String, usize>,
        destroyed: usize,
    }

    impl MaterialMaker for FakeMaker {
        type Material = (String, usize);

        fn build(
            &mut self,
            def: &MaterialDef,
            frames: usize,
        ) -> Result<Build<Self::Material>, PassError> {
            *self.builds.entry(def.shader.clone()).or_default() += 1;
            if self.ready.contains(&def.shader.as_str()) {
                Ok(Build::Ready((def.shader.clone(), frames)))
            } else if self.pending.contains(&def.shader.as_str()) {
                Ok(Build::Pending)
            } else {
                Ok(Build::Invalid("no such shader".into()))
            }
        }

        fn destroy(&mut self, _material: Self::Material) -> Result<(), PassError> {
            self.destroyed += 1;
            Ok(())
        }
    }

    fn cache(ready: &[&'static str], pending: &[&'static str]) -> MaterialCache<FakeMaker> {
        let maker = FakeMaker {
            ready: ready.to_vec(),
            pending: pending.to_vec(),
            ..Default::default()
        };
        MaterialCache::new(maker, 3, MaterialDef::standard_deferred())
    }

    #[test]
    fn test_equal_definitions_share_one_entry() {
        let mut cache = cache(&["forward/textured"], &[]);
        let a = MaterialDef::standard_forward();
        let b = MaterialDef::standard_forward();

        assert_eq!(cache.get_or_build(Some(&a)).unwrap().unwrap().1, 3);
        assert!(cache.get_or_build(Some(&b)).unwrap().is_some());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.maker().builds["forward/textured"], 1);
    }

    #[test]
    fn test_pending_inserts_nothing_and_builds_once_when_ready() {
        let mut cache = cache(&[], &["forward/textured"]);
        let def = MaterialDef::standard_forward();

        assert!(cache.get_or_build(Some(&def)).unwrap().is_none());
        assert!(cache.get_or_build(Some(&def)).unwrap().is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.invalid_reason(def.id()), None);

        cache.maker.pending.clear();
        cache.maker.ready.push("forward/textured");
        assert!(cache.get_or_build(Some(&def)).unwrap().is_some());
        assert!(cache.get_or_build(Some(&def)).unwrap().is_some());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.maker().builds["forward/textured"], 3);
    }

    #[test]
    fn test_invalid_materials_are_not_rebuilt() {
        let mut cache = cache(&[], &[]);
        let def = MaterialDef::standard_forward().with_shader("missing");

        assert!(cache.get_or_build(Some(&def)).unwrap().is_none());
        assert!(cache.get_or_build(Some(&def)).unwrap().is_none());
        assert_eq!(cache.maker().builds["missing"], 1);
        assert!(cache.invalid_reason(def.id()).is_some());

        cache.forget_invalid();
        assert!(cache.get_or_build(Some(&def)).unwrap().is_none());
        assert_eq!(cache.maker().builds["missing"], 2);
    }

    #[test]
    fn test_missing_definition_uses_default() {
        let mut cache = cache(&["deferred/textured"], &[]);
        let (shader, _) = cache.get_or_build(None).unwrap().unwrap().clone();
        assert_eq!(shader, "deferred/textured");
        assert!(cache.contains(MaterialDef::standard_deferred().id()));
    }

    #[test]
    fn test_transform_keeps_original_key() {
        let mut cache = cache(&["pass/shadow"], &[]).with_transform(Box::new(|def| {
            def.with_shader("pass/shadow").with_cull_mode(CullMode::Front)
        }));
        let def = MaterialDef::standard_forward();
        let (shader, _) = cache.get_or_build(Some(&def)).unwrap().unwrap().clone();
        assert_eq!(shader, "pass/shadow");
        assert!(cache.contains(def.id()));
    }

    #[test]
    fn test_invalidate_and_destroy_release_materials() {
        let mut cache = cache(&["deferred/textured", "forward/textured"], &[]);
        cache.get_or_build(None).unwrap();
        cache
            .get_or_build(Some(&MaterialDef::standard_forward()))
            .unwrap();

        cache.invalidate(cache.default_id()).unwrap();
        assert_eq!(cache.maker().destroyed, 1);
        assert_eq!(cache.len(), 1);

        cache.destroy().unwrap();
        assert_eq!(cache.maker().destroyed, 2);
        assert!(cache.is_empty());
    }
}
