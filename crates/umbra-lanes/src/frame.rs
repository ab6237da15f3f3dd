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

//! Per-frame-in-flight storage and the arguments every pass records with.

use umbra_core::math::{Extent2D, Frustum, Mat4, Vec3};
use umbra_core::renderer::CameraUniform;

/// One independent copy of `T` per frame in flight, selected by
/// `frame_index % len`.
///
/// Frames in flight never share a copy, so the CPU can fill copy `n + 1`
/// while the GPU still reads copy `n`.
#[derive(Debug, Clone)]
pub struct PerFrame<T> {
    items: Vec<T>,
}

impl<T> PerFrame<T> {
    /// Builds `count` copies (at least one) with a fallible constructor.
    pub fn try_new<E>(
        count: usize,
        mut build: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Self, E> {
        let items = (0..count.max(1))
            .map(&mut build)
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self { items })
    }

    /// Builds `count` copies (at least one).
    pub fn new(count: usize, mut build: impl FnMut(usize) -> T) -> Self {
        Self {
            items: (0..count.max(1)).map(&mut build).collect(),
        }
    }

    /// Number of copies.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false`; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The copy used by `frame_index`.
    pub fn get(&self, frame_index: u64) -> &T {
        &self.items[self.slot(frame_index)]
    }

    /// The copy used by `frame_index`, mutably.
    pub fn get_mut(&mut self, frame_index: u64) -> &mut T {
        let slot = self.slot(frame_index);
        &mut self.items[slot]
    }

    /// Every copy.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Every copy, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    /// Consumes the arena.
    pub fn into_inner(self) -> Vec<T> {
        self.items
    }

    fn slot(&self, frame_index: u64) -> usize {
        (frame_index % self.items.len() as u64) as usize
    }
}

/// Everything a pass needs to know about the frame being recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameArgs {
    /// Monotonic frame counter; selects the per-frame copies.
    pub frame_index: u64,
    /// Seconds since start.
    pub time: f32,
    /// Seconds since the previous frame.
    pub delta: f32,
    /// World to view.
    pub view: Mat4,
    /// View to clip.
    pub projection: Mat4,
    /// Camera position.
    pub eye: Vec3,
    /// Camera forward direction.
    pub forward: Vec3,
    /// Render target size in pixels.
    pub viewport: Extent2D,
    /// DPI scale.
    pub scale: f32,
}

impl FrameArgs {
    /// Arguments for a camera; the eye and forward direction are derived
    /// from the inverse view.
    pub fn new(frame_index: u64, view: Mat4, projection: Mat4, viewport: Extent2D) -> Self {
        let camera = view.inverse_or_identity();
        let eye = camera.translation();
        let forward = (camera.project_point(-Vec3::Z) - eye).normalize();
        Self {
            frame_index,
            time: 0.0,
            delta: 0.0,
            view,
            projection,
            eye,
            forward,
            viewport,
            scale: 1.0,
        }
    }

    /// Sets the clock.
    pub fn with_time(mut self, time: f32, delta: f32) -> Self {
        self.time = time;
        self.delta = delta;
        self
    }

    /// Overrides the derived eye position and direction.
    pub fn with_eye(mut self, eye: Vec3, forward: Vec3) -> Self {
        self.eye = eye;
        self.forward = forward;
        self
    }

    /// Projection * view.
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    /// The view frustum used for culling.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_proj())
    }

    /// The camera uniform for this frame.
    pub fn camera_uniform(&self) -> CameraUniform {
        CameraUniform::new(
            self.view,
            self.projection,
            self.eye,
            self.forward,
            [self.viewport.width as f32, self.viewport.height as f32],
            self.scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_per_frame_wraps() {
        let mut frames = PerFrame::new(3, |i| i * 10);
        assert_eq!(frames.len(), 3);
        assert_eq!(*frames.get(0), 0);
        assert_eq!(*frames.get(4), 10);
        *frames.get_mut(5) += 1;
        assert_eq!(frames.iter().copied().collect::<Vec<_>>(), vec![0, 10, 21]);
    }

    #[test]
    fn test_per_frame_never_empty() {
        let frames = PerFrame::<u8>::try_new(0, |_| Ok::<_, ()>(1)).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(PerFrame::<u8>::try_new(2, |i| if i == 1 { Err("boom") } else { Ok(0) }).is_err());
    }

    #[test]
    fn test_frame_args_derive_eye() {
        let eye = Vec3::new(1.0, 2.0, 5.0);
        let view = Mat4::look_at_rh(eye, Vec3::new(1.0, 2.0, 0.0), Vec3::Y).unwrap();
        let args = FrameArgs::new(7, view, Mat4::IDENTITY, Extent2D::new(800, 600));
        assert_relative_eq!(args.eye.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(args.eye.z, 5.0, epsilon = 1e-4);
        assert_relative_eq!(args.forward.z, -1.0, epsilon = 1e-4);

        let camera = args.camera_uniform();
        assert_eq!(camera.viewport, [800.0, 600.0]);
        assert_relative_eq!(camera.eye.y, 2.0, epsilon = 1e-4);
    }
}
