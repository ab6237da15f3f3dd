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

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use umbra_core::renderer::{
    CompiledShader, Fetch, GraphicsDevice, ResourceError, ShaderModuleDescriptor, ShaderModuleId,
    ShaderProvider, ShaderSourceData,
};

#[derive(Debug, Clone)]
struct ShaderSource {
    source: String,
    texture_slots: Vec<String>,
}

#[derive(Debug, Clone)]
enum ShaderState {
    Queued,
    Compiled(CompiledShader),
    Failed(String),
}

#[derive(Debug, Default)]
struct Compilation {
    states: HashMap<String, ShaderState>,
    /// Modules replaced by a reload, destroyed on the next `process_pending`.
    retired: Vec<ShaderModuleId>,
}

/// A registry of named WGSL sources compiled on demand.
///
/// The first [`try_fetch`](ShaderProvider::try_fetch) of a name only queues
/// the compilation and answers [`Fetch::Pending`]; the owner of the device
/// runs [`process_pending`](Self::process_pending) (typically once per frame)
/// to compile the queue. Unknown names and sources that fail to compile are
/// reported as [`Fetch::Failed`].
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    sources: RwLock<HashMap<String, ShaderSource>>,
    compilation: Mutex<Compilation>,
}

fn poisoned(what: &str, e: impl std::fmt::Display) -> ResourceError {
    ResourceError::BackendError(format!("Mutex poisoned ({what}): {e}"))
}

impl ShaderLibrary {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the source of a shader.
    ///
    /// `texture_slots` names the material textures the fragment stage samples,
    /// in table order. Replacing a compiled shader retires its module and
    /// recompiles on the next fetch.
    pub fn register<I, S>(
        &self,
        name: impl Into<String>,
        source: impl Into<String>,
        texture_slots: I,
    ) -> Result<(), ResourceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let entry = ShaderSource {
            source: source.into(),
            texture_slots: texture_slots.into_iter().map(Into::into).collect(),
        };

        self.sources
            .write()
            .map_err(|e| poisoned("shader sources", e))?
            .insert(name.clone(), entry);

        let mut compilation = self
            .compilation
            .lock()
            .map_err(|e| poisoned("shader states", e))?;
        if let Some(ShaderState::Compiled(old)) = compilation.states.remove(&name) {
            log::info!("ShaderLibrary: Reloading shader '{name}'");
            compilation.retired.push(old.module);
        }
        Ok(())
    }

    /// Returns `true` if a source is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.sources
            .read()
            .map(|sources| sources.contains_key(name))
            .unwrap_or(false)
    }

    /// Queues every registered shader that has not been requested yet.
    pub fn queue_all(&self) -> Result<(), ResourceError> {
        let sources = self
            .sources
            .read()
            .map_err(|e| poisoned("shader sources", e))?;
        let mut compilation = self
            .compilation
            .lock()
            .map_err(|e| poisoned("shader states", e))?;
        for name in sources.keys() {
            compilation
                .states
                .entry(name.clone())
                .or_insert(ShaderState::Queued);
        }
        Ok(())
    }

    /// Number of shaders waiting for [`process_pending`](Self::process_pending).
    pub fn pending_count(&self) -> usize {
        self.compilation
            .lock()
            .map(|c| {
                c.states
                    .values()
                    .filter(|s| matches!(s, ShaderState::Queued))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Compiles every queued shader and releases retired modules.
    ///
    /// Returns the number of shaders that compiled successfully. Compilation
    /// failures are not errors here: they are remembered and reported by
    /// `try_fetch` as [`Fetch::Failed`].
    pub fn process_pending(&self, device: &dyn GraphicsDevice) -> Result<usize, ResourceError> {
        let (queued, retired) = {
            let mut compilation = self
                .compilation
                .lock()
                .map_err(|e| poisoned("shader states", e))?;
            let queued = compilation
                .states
                .iter()
                .filter(|(_, state)| matches!(state, ShaderState::Queued))
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>();
            (queued, std::mem::take(&mut compilation.retired))
        };

        for module in retired {
            if let Err(e) = device.destroy_shader_module(module) {
                log::warn!("ShaderLibrary: Failed to destroy retired module {module:?}: {e}");
            }
        }

        let mut compiled = 0;
        for name in queued {
            let source = self
                .sources
                .read()
                .map_err(|e| poisoned("shader sources", e))?
                .get(&name)
                .cloned();

            let state = match source {
                None => ShaderState::Failed(format!("unknown shader '{name}'")),
                Some(source) => {
                    let descriptor = ShaderModuleDescriptor {
                        label: Some(name.as_str()),
                        source: ShaderSourceData::Wgsl(Cow::Borrowed(&source.source)),
                    };
                    match device.create_shader_module(&descriptor) {
                        Ok(module) => {
                            compiled += 1;
                            log::info!("ShaderLibrary: Compiled shader '{name}'");
                            ShaderState::Compiled(CompiledShader {
                                name: name.clone(),
                                module,
                                texture_slots: source.texture_slots,
                            })
                        }
                        Err(e) => {
                            log::error!("ShaderLibrary: Shader '{name}' failed to compile: {e}");
                            ShaderState::Failed(e.to_string())
                        }
                    }
                }
            };

            self.compilation
                .lock()
                .map_err(|e| poisoned("shader states", e))?
                .states
                .insert(name, state);
        }
        Ok(compiled)
    }

    /// Destroys every compiled module and forgets all compilation state.
    pub fn destroy(&self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        let mut compilation = self
            .compilation
            .lock()
            .map_err(|e| poisoned("shader states", e))?;
        let compilation = &mut *compilation;
        let modules = compilation
            .states
            .drain()
            .filter_map(|(_, state)| match state {
                ShaderState::Compiled(shader) => Some(shader.module),
                _ => None,
            })
            .chain(compilation.retired.drain(..))
            .collect::<Vec<_>>();

        for module in modules {
            device.destroy_shader_module(module)?;
        }
        Ok(())
    }
}

impl ShaderProvider for ShaderLibrary {
    fn try_fetch(&self, name: &str) -> Fetch<CompiledShader> {
        let known = self.contains(name);
        let mut compilation = match self.compilation.lock() {
            Ok(compilation) => compilation,
            Err(e) => return Fetch::Failed(poisoned("shader states", e).to_string()),
        };

        match compilation.states.get(name) {
            Some(ShaderState::Compiled(shader)) => Fetch::Ready(shader.clone()),
            Some(ShaderState::Failed(reason)) => Fetch::Failed(reason.clone()),
            Some(ShaderState::Queued) => Fetch::Pending,
            None if known => {
                compilation
                    .states
                    .insert(name.to_owned(), ShaderState::Queued);
                Fetch::Pending
            }
            None => Fetch::Failed(format!("unknown shader '{name}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::HeadlessDevice;

    const VALID: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";

    #[test]
    fn test_first_fetch_queues_then_compiles() {
        let device = HeadlessDevice::new();
        let library = ShaderLibrary::new();
        library
            .register("forward/textured", VALID, ["diffuse", "normal"])
            .unwrap();

        assert_eq!(library.try_fetch("forward/textured"), Fetch::Pending);
        assert_eq!(library.pending_count(), 1);
        assert_eq!(library.try_fetch("forward/textured"), Fetch::Pending);

        assert_eq!(library.process_pending(&device).unwrap(), 1);
        let shader = library.try_fetch("forward/textured").ready().unwrap();
        assert_eq!(shader.name, "forward/textured");
        assert_eq!(shader.texture_slots, vec!["diffuse", "normal"]);
        assert_eq!(
            device.shader_label(shader.module).as_deref(),
            Some("forward/textured")
        );
    }

    #[test]
    fn test_unknown_and_broken_shaders_fail_permanently() {
        let device = HeadlessDevice::new();
        let library = ShaderLibrary::new();
        library
            .register("broken", "@vertex fn vs_main() {}", Vec::<String>::new())
            .unwrap();

        assert!(matches!(library.try_fetch("missing"), Fetch::Failed(_)));

        assert_eq!(library.try_fetch("broken"), Fetch::Pending);
        assert_eq!(library.process_pending(&device).unwrap(), 0);
        assert!(matches!(library.try_fetch("broken"), Fetch::Failed(_)));
        assert!(matches!(library.try_fetch("broken"), Fetch::Failed(_)));
    }

    #[test]
    fn test_reload_retires_old_module() {
        let device = HeadlessDevice::new();
        let library = ShaderLibrary::new();
        library.register("a", VALID, ["diffuse"]).unwrap();
        library.queue_all().unwrap();
        library.process_pending(&device).unwrap();
        let first = library.try_fetch("a").ready().unwrap();

        library.register("a", VALID, ["diffuse"]).unwrap();
        assert_eq!(library.try_fetch("a"), Fetch::Pending);
        library.process_pending(&device).unwrap();
        let second = library.try_fetch("a").ready().unwrap();

        assert_ne!(first.module, second.module);
        assert_eq!(device.live_resources().unwrap().shader_modules, 1);

        library.destroy(&device).unwrap();
        assert_eq!(device.live_resources().unwrap().shader_modules, 0);
    }
}
