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

use super::indirect::IndirectDrawBuffer;
use crate::error::CapacityError;
use umbra_core::renderer::{
    DescriptorSetId, DrawIndirectArgs, MaterialId, RenderPass, RenderPipelineId,
};

/// The state shared by every draw of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    /// The material the batch was resolved from.
    pub material: MaterialId,
    /// The pipeline bound once per batch.
    pub pipeline: RenderPipelineId,
    /// The descriptor set bound at set 0.
    pub descriptor_set: DescriptorSetId,
}

/// One object of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    /// Slot of the object in its material's object buffer.
    pub object: u32,
    /// Indices pulled by the vertex shader.
    pub index_count: u32,
}

/// Objects drawn back to back with the same [`BatchKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawGroup {
    /// The shared state.
    pub key: BatchKey,
    /// Objects in draw order.
    pub items: Vec<DrawItem>,
}

/// Resolves the indirect argument buffer a batch is drawn from.
pub trait IndirectTarget {
    /// The buffer for `key`, or `None` to skip the batch.
    fn indirect(&mut self, key: &BatchKey) -> Option<&mut IndirectDrawBuffer>;
}

impl IndirectTarget for IndirectDrawBuffer {
    fn indirect(&mut self, _key: &BatchKey) -> Option<&mut IndirectDrawBuffer> {
        Some(self)
    }
}

/// An ordered list of draw groups.
///
/// [`add`](Self::add) coalesces every object of a key into one group, for
/// order-independent opaque geometry. [`add_ordered`](Self::add_ordered)
/// only extends the most recent group, so the concatenated groups replay the
/// exact submission order (back-to-front blending).
///
/// [`clear`](Self::clear) keeps every group's allocation for the next frame.
#[derive(Debug, Default)]
pub struct RenderPlan {
    groups: Vec<DrawGroup>,
    active: usize,
}

impl RenderPlan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the group of `key` wherever it is, or opens a new group.
    pub fn add(&mut self, key: BatchKey, item: DrawItem) {
        match self.groups[..self.active].iter_mut().find(|g| g.key == key) {
            Some(group) => group.items.push(item),
            None => self.open(key, item),
        }
    }

    /// Extends the last group if it has the same key, otherwise opens a new one.
    pub fn add_ordered(&mut self, key: BatchKey, item: DrawItem) {
        match self.groups[..self.active].last_mut() {
            Some(group) if group.key == key => group.items.push(item),
            _ => self.open(key, item),
        }
    }

    fn open(&mut self, key: BatchKey, item: DrawItem) {
        if let Some(group) = self.groups.get_mut(self.active) {
            group.key = key;
            group.items.clear();
            group.items.push(item);
        } else {
            self.groups.push(DrawGroup {
                key,
                items: vec![item],
            });
        }
        self.active += 1;
    }

    /// Empties the plan, keeping allocations.
    pub fn clear(&mut self) {
        self.active = 0;
    }

    /// The groups in draw order.
    pub fn groups(&self) -> &[DrawGroup] {
        &self.groups[..self.active]
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.active
    }

    /// Returns `true` if nothing was added since the last clear.
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Total number of objects.
    pub fn object_count(&self) -> usize {
        self.groups().iter().map(|g| g.items.len()).sum()
    }

    /// Records the plan: per group, binds the pipeline and descriptor set once
    /// and issues one indirect draw covering the group's objects.
    ///
    /// Objects without indices are skipped. Returns the number of objects drawn.
    pub fn draw(
        &self,
        pass: &mut dyn RenderPass,
        target: &mut dyn IndirectTarget,
    ) -> Result<usize, CapacityError> {
        let mut drawn = 0;
        for group in self.groups() {
            let Some(indirect) = target.indirect(&group.key) else {
                continue;
            };
            pass.set_pipeline(group.key.pipeline);
            pass.set_descriptor_set(0, group.key.descriptor_set);
            indirect.begin();
            for item in group.items.iter().filter(|item| item.index_count > 0) {
                indirect.push(DrawIndirectArgs::object(item.object, item.index_count))?;
            }
            drawn += indirect.end(pass) as usize;
        }
        Ok(drawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(material: u64) -> BatchKey {
        BatchKey {
            material: MaterialId(material),
            pipeline: RenderPipelineId(material as usize),
            descriptor_set: DescriptorSetId(material as usize),
        }
    }

    fn feed(plan: &mut RenderPlan, sequence: &[u64], ordered: bool) {
        for (object, &material) in sequence.iter().enumerate() {
            let item = DrawItem {
                object: object as u32,
                index_count: 3,
            };
            if ordered {
                plan.add_ordered(key(material), item);
            } else {
                plan.add(key(material), item);
            }
        }
    }

    fn sizes(plan: &RenderPlan) -> Vec<usize> {
        plan.groups().iter().map(|g| g.items.len()).collect()
    }

    const A: u64 = 1;
    const B: u64 = 2;

    #[test]
    fn test_opaque_batch_coalesces_interleaved_materials() {
        // Five A and three B objects, interleaved.
        let sequence = [A, B, A, B, A, B, A, A];
        let mut plan = RenderPlan::new();
        feed(&mut plan, &sequence, false);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.groups()[0].key, key(A));
        assert_eq!(sizes(&plan), vec![5, 3]);
        let mut objects = plan
            .groups()
            .iter()
            .flat_map(|g| g.items.iter().map(|i| i.object))
            .collect::<Vec<_>>();
        objects.sort_unstable();
        assert_eq!(objects, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_transparency_keeps_submission_order() {
        let sequence = [A, B, A, B, A, B, A, A];
        let mut plan = RenderPlan::new();
        feed(&mut plan, &sequence, true);

        assert_eq!(plan.len(), 7);
        assert_eq!(sizes(&plan), vec![1, 1, 1, 1, 1, 1, 2]);
        let replay = plan
            .groups()
            .iter()
            .flat_map(|g| g.items.iter().map(move |i| (g.key.material.0, i.object)))
            .collect::<Vec<_>>();
        let expected = sequence
            .iter()
            .enumerate()
            .map(|(i, &m)| (m, i as u32))
            .collect::<Vec<_>>();
        assert_eq!(replay, expected);
    }

    #[test]
    fn test_run_lengths_of_short_sequence() {
        let sequence = [A, B, A, B, A, A, B];
        let mut ordered = RenderPlan::new();
        feed(&mut ordered, &sequence, true);
        assert_eq!(sizes(&ordered), vec![1, 1, 1, 1, 2, 1]);

        let mut coalesced = RenderPlan::new();
        feed(&mut coalesced, &sequence, false);
        assert_eq!(sizes(&coalesced), vec![4, 3]);
    }

    #[test]
    fn test_clear_reuses_groups() {
        let mut plan = RenderPlan::new();
        feed(&mut plan, &[A, B, A], true);
        assert_eq!(plan.len(), 3);

        plan.clear();
        assert!(plan.is_empty());
        assert_eq!(plan.object_count(), 0);

        feed(&mut plan, &[B, B], false);
        assert_eq!(plan.groups().len(), 1);
        assert_eq!(plan.groups()[0].key, key(B));
        assert_eq!(plan.object_count(), 2);
        assert_eq!(plan.groups.len(), 3);
    }
}
