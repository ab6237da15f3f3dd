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

//! Lazy creation and invalidation of shadow cascades.

mod common;

use common::{config, count, frame, Harness};
use umbra_core::math::{LinearRgba, Vec3};
use umbra_core::renderer::MaterialDef;
use umbra_core::scene::{DirectionalLight, Group, Light, PointLight, StaticMesh};
use umbra_lanes::material::ShadowMaps;
use umbra_lanes::RendererConfig;

fn sun(cascades: usize) -> DirectionalLight {
    DirectionalLight::new(Vec3::new(0.3, -1.0, 0.0), LinearRgba::WHITE, 1.0, cascades)
}

fn scene(harness: &Harness, light: DirectionalLight) -> Group {
    Group::new("root")
        .with(StaticMesh::new(harness.quad, Some(MaterialDef::standard_deferred())))
        .with(light)
}

#[test]
fn test_cascades_are_created_on_first_use() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let lamp = Group::new("lamp")
        .with(StaticMesh::new(harness.quad, Some(MaterialDef::standard_deferred())))
        .with(PointLight::new(Vec3::Y, LinearRgba::WHITE, 1.0, 5.0));

    renderer.render(&frame(0), &lamp).unwrap();
    assert_eq!(renderer.shadow_cascade_count().unwrap(), 0);
    assert_eq!(count(&harness.last_submission(), "shadow/pass/shadow"), 0);

    let light = sun(4);
    let id = light.id();
    let scene = scene(&harness, light);
    renderer.render(&frame(1), &scene).unwrap();
    // Clamped to the configured cascade count.
    assert_eq!(renderer.shadow_cascade_count().unwrap(), 2);
    assert_eq!(count(&harness.last_submission(), "shadow/pass/shadow"), 2);
    assert!(renderer.shadowmap(id, 0).is_some());
    assert!(renderer.shadowmap(id, 1).is_some());
    assert!(renderer.shadowmap(id, 2).is_none());
    renderer.destroy().unwrap();
}

#[test]
fn test_cascades_are_reused_across_frames() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let light = sun(2);
    let id = light.id();
    let scene = scene(&harness, light);

    renderer.render(&frame(0), &scene).unwrap();
    renderer.render(&frame(1), &scene).unwrap();
    let map = renderer.shadowmap(id, 0);
    let live = harness.live();
    let generation = renderer.shadows().read().unwrap().generation();

    renderer.render(&frame(2), &scene).unwrap();
    renderer.render(&frame(3), &scene).unwrap();
    assert_eq!(harness.live(), live);
    assert_eq!(renderer.shadowmap(id, 0), map);
    assert_eq!(renderer.shadows().read().unwrap().generation(), generation);
    renderer.destroy().unwrap();
}

#[test]
fn test_invalidate_drops_and_recreates() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let light = sun(2);
    let id = light.id();
    let scene = scene(&harness, light);

    renderer.render(&frame(0), &scene).unwrap();
    let first = renderer.shadowmap(id, 0).unwrap();
    let generation = renderer.shadows().read().unwrap().generation();

    assert_eq!(renderer.invalidate_light(id).unwrap(), 2);
    assert_eq!(renderer.shadow_cascade_count().unwrap(), 0);
    assert!(renderer.shadowmap(id, 0).is_none());
    assert!(renderer.shadows().read().unwrap().generation() > generation);
    // Nothing to drop the second time.
    assert_eq!(renderer.invalidate_light(id).unwrap(), 0);

    renderer.render(&frame(1), &scene).unwrap();
    assert_eq!(renderer.shadow_cascade_count().unwrap(), 2);
    assert_ne!(renderer.shadowmap(id, 0), Some(first));
    renderer.destroy().unwrap();
}

#[test]
fn test_lights_without_shadows_get_no_cascades() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let light = sun(2).with_shadows(false);
    let id = light.id();

    renderer.render(&frame(0), &scene(&harness, light)).unwrap();
    assert_eq!(renderer.shadow_cascade_count().unwrap(), 0);
    assert!(renderer.shadowmap(id, 0).is_none());
    renderer.destroy().unwrap();
}

#[test]
fn test_non_casters_are_left_out_of_shadow_maps() {
    let harness = Harness::new();
    let mut renderer = harness.renderer_with(RendererConfig {
        shadow: umbra_lanes::config::ShadowConfig {
            cascades: 1,
            ..config().shadow
        },
        ..config()
    });
    let scene = scene(&harness, sun(1)).with(
        StaticMesh::new(harness.quad, Some(MaterialDef::standard_deferred())).with_shadows(false),
    );

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    assert_eq!(count(&submission, "shadow/pass/shadow"), 1);
    assert_eq!(count(&submission, "depth/pass/depth"), 2);
    renderer.destroy().unwrap();
}

#[test]
fn test_cascade_maps_are_released_on_destroy() {
    let harness = Harness::new();
    let before = harness.live();
    let mut renderer = harness.renderer();
    let light = sun(2);
    let id = light.id();
    let scene = scene(&harness, light);
    renderer.render(&frame(0), &scene).unwrap();
    renderer.invalidate_light(id).unwrap();
    renderer.render(&frame(1), &scene).unwrap();

    renderer.destroy().unwrap();
    assert_eq!(harness.live(), before);
}
