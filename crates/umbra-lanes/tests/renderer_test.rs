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

//! End-to-end frame recording through every pass of the renderer.

mod common;

use common::{config, count, draw_labels, frame, Harness, BROKEN_SOURCE, EXTENT};
use umbra_core::math::{LinearRgba, Mat4, Vec3};
use umbra_core::renderer::{
    CullMode, DescriptorResource, DescriptorSetId, DrawIndirectArgs, GraphicsDevice, MaterialDef,
    RenderPassId,
};
use umbra_core::scene::{DirectionalLight, Group, PointLight, StaticMesh};
use umbra_infra::graphics::headless::{Command, Submission};
use umbra_lanes::config::OcclusionConfig;
use umbra_lanes::material::TEXTURES_BINDING;
use umbra_lanes::render_lane::{
    identity_lut, occlusion_params, PostProcessPass, RenderTargets, SsaoPass, LUT_SLOT,
    OCCLUSION_BINDING,
};
use umbra_lanes::{Pass, PassError, RendererConfig};

fn sun() -> DirectionalLight {
    DirectionalLight::new(Vec3::new(0.0, -1.0, -0.3), LinearRgba::WHITE, 2.0, 4)
}

fn opaque_scene(harness: &Harness) -> Group {
    Group::new("root")
        .with(StaticMesh::new(harness.quad, Some(MaterialDef::standard_deferred())))
        .with(sun())
}

#[test]
fn test_passes_run_in_frame_order() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    assert_eq!(
        renderer.pass_names(),
        vec![
            "shadow",
            "depth",
            "ssao",
            "blur",
            "deferred",
            "forward",
            "postprocess",
            "output",
            "ui"
        ]
    );
    renderer.destroy().unwrap();
}

#[test]
fn test_full_frame_records_every_pass() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness);

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    assert_eq!(submission.label.as_deref(), Some("frame"));
    assert_eq!(
        draw_labels(&submission),
        vec![
            "shadow/pass/shadow",
            "shadow/pass/shadow",
            "depth/pass/depth",
            "ssao/pass/ssao",
            "blur/pass/blur",
            "deferred/deferred/textured",
            "deferred/pass/lighting",
            "postprocess/pass/postprocess",
            "output/pass/output",
        ]
    );

    // One object of six indices, pulled through the object record.
    let depth = &submission.draws[2];
    assert_eq!(depth.args, DrawIndirectArgs::object(0, 6));

    // Ambient plus the sun, skipping the header slot.
    let lighting = &submission.draws[6];
    assert_eq!(lighting.subpass, 1);
    assert_eq!(
        lighting.args,
        DrawIndirectArgs {
            vertex_count: 3,
            instance_count: 2,
            first_vertex: 0,
            first_instance: 1,
        }
    );
    assert_eq!(submission.draws[5].subpass, 0);
    assert_eq!(submission.draws[5].render_pass, lighting.render_pass);

    // Both occlusion passes draw one full-screen triangle.
    for draw in &submission.draws[3..5] {
        assert_eq!(draw.args.vertex_count, 3);
        assert_eq!(draw.args.instance_count, 1);
    }

    renderer.destroy().unwrap();
}

#[test]
fn test_lights_feed_the_lighting_draw() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness)
        .with(PointLight::new(Vec3::X, LinearRgba::WHITE, 1.0, 5.0))
        .with(PointLight::new(-Vec3::X, LinearRgba::WHITE, 1.0, 5.0));

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    let lighting = submission
        .draws
        .iter()
        .find(|draw| draw.pipeline_label.as_deref() == Some("deferred/pass/lighting"))
        .unwrap();
    assert_eq!(lighting.args.instance_count, 4);
    renderer.destroy().unwrap();
}

#[test]
fn test_culled_meshes_are_not_drawn() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness).with(
        StaticMesh::new(harness.quad, Some(MaterialDef::standard_deferred()))
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 50.0))),
    );

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    assert_eq!(count(&submission, "depth/pass/depth"), 1);
    assert_eq!(count(&submission, "deferred/deferred/textured"), 1);
    // Shadow casters are not culled against the camera.
    assert_eq!(count(&submission, "shadow/pass/shadow"), 4);
    renderer.destroy().unwrap();
}

#[test]
fn test_nothing_is_drawn_until_shaders_compile() {
    let harness = Harness::uncompiled();
    harness.upload_lut();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness);

    renderer.render(&frame(0), &scene).unwrap();
    assert!(harness.last_submission().draws.is_empty());
    assert!(harness.shaders.pending_count() > 0);

    harness.compile();
    renderer.render(&frame(1), &scene).unwrap();
    let submission = harness.last_submission();
    assert_eq!(count(&submission, "deferred/deferred/textured"), 1);
    assert_eq!(count(&submission, "deferred/pass/lighting"), 1);
    assert_eq!(count(&submission, "output/pass/output"), 1);
    renderer.destroy().unwrap();
}

#[test]
fn test_streaming_mesh_appears_once_uploaded() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let streaming = harness.meshes.reserve().unwrap();
    let scene = opaque_scene(&harness)
        .with(StaticMesh::new(streaming, Some(MaterialDef::standard_deferred())));

    renderer.render(&frame(0), &scene).unwrap();
    assert_eq!(count(&harness.last_submission(), "depth/pass/depth"), 1);

    harness
        .meshes
        .upload_to(streaming, &[[0.0f32; 8]; 3], &[0, 1, 2])
        .unwrap();
    renderer.render(&frame(1), &scene).unwrap();
    let submission = harness.last_submission();
    let depth = submission
        .draws
        .iter()
        .filter(|draw| draw.pipeline_label.as_deref() == Some("depth/pass/depth"))
        .map(|draw| draw.args.vertex_count)
        .collect::<Vec<_>>();
    assert_eq!(depth, vec![6, 3]);
    renderer.destroy().unwrap();
}

#[test]
fn test_invalid_material_is_skipped_every_frame() {
    let harness = Harness::new();
    harness
        .shaders
        .register("broken", BROKEN_SOURCE, Vec::<String>::new())
        .unwrap();
    harness.compile();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness).with(StaticMesh::new(
        harness.quad,
        Some(MaterialDef::standard_deferred().with_shader("broken")),
    ));

    for frame_index in 0..3 {
        renderer.render(&frame(frame_index), &scene).unwrap();
        let submission = harness.last_submission();
        assert_eq!(count(&submission, "deferred/deferred/textured"), 1);
        // The depth-only override does not use the broken shader.
        assert_eq!(count(&submission, "depth/pass/depth"), 2);
    }
    renderer.destroy().unwrap();
}

#[test]
fn test_invalid_pass_shader_is_fatal() {
    let harness = Harness::new();
    harness
        .shaders
        .register("pass/lighting", BROKEN_SOURCE, Vec::<String>::new())
        .unwrap();
    harness.compile();
    let mut renderer = harness.renderer();

    let err = renderer
        .render(&frame(0), &opaque_scene(&harness))
        .unwrap_err();
    assert!(matches!(
        err,
        PassError::InvalidMaterial { pass: "deferred", ref shader, .. } if shader == "pass/lighting"
    ));
    renderer.destroy().unwrap();
}

#[test]
fn test_transparent_meshes_draw_back_to_front() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let a = MaterialDef::transparent_forward();
    let b = MaterialDef::transparent_forward().with_cull_mode(CullMode::Back);
    let at = |z: f32, material: &MaterialDef| {
        StaticMesh::new(harness.quad, Some(material.clone()))
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, z)))
    };
    // Scene order would batch as [a, a], [b].
    let scene = Group::new("glass")
        .with(at(-1.0, &a))
        .with(at(-3.0, &a))
        .with(at(-2.0, &b));

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    let forward = submission
        .draws
        .iter()
        .filter(|draw| draw.pipeline_label.as_deref() == Some("forward/forward/textured"))
        .collect::<Vec<_>>();
    assert_eq!(forward.len(), 3);
    assert_eq!(forward[0].pipeline, forward[2].pipeline);
    assert_ne!(forward[0].pipeline, forward[1].pipeline);
    // Both `a` objects share one object buffer: the far one was stored first.
    assert_eq!(forward[0].args.first_instance, 0);
    assert_eq!(forward[2].args.first_instance, 1);
    renderer.destroy().unwrap();
}

#[test]
fn test_opaque_forward_meshes_coalesce() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let a = MaterialDef::standard_forward();
    let b = MaterialDef::standard_forward().with_cull_mode(CullMode::None);
    let mut scene = Group::new("opaque");
    for material in [&a, &b, &a, &b, &a] {
        scene.push(StaticMesh::new(harness.quad, Some(material.clone())));
    }

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    let pipelines = submission
        .draws
        .iter()
        .filter(|draw| draw.pipeline_label.as_deref() == Some("forward/forward/textured"))
        .map(|draw| draw.pipeline)
        .collect::<Vec<_>>();
    assert_eq!(pipelines.len(), 5);
    assert!(pipelines[..3].iter().all(|p| *p == pipelines[0]));
    assert!(pipelines[3..].iter().all(|p| *p == pipelines[3]));
    assert_ne!(pipelines[0], pipelines[3]);
    renderer.destroy().unwrap();
}

#[test]
fn test_ui_draws_in_submission_order() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let a = MaterialDef::ui();
    let b = MaterialDef::ui().with_cull_mode(CullMode::Back);
    let scene = Group::new("hud")
        .with(StaticMesh::new(harness.quad, Some(a.clone())))
        .with(StaticMesh::new(harness.quad, Some(b)))
        .with(StaticMesh::new(harness.quad, Some(a)));

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    let labels = draw_labels(&submission);
    assert_eq!(labels.iter().filter(|l| *l == "ui/ui/quad").count(), 3);
    assert_eq!(labels.last().map(String::as_str), Some("ui/ui/quad"));
    let ui = &submission.draws[submission.draws.len() - 3..];
    assert_eq!(ui[0].pipeline, ui[2].pipeline);
    assert_ne!(ui[0].pipeline, ui[1].pipeline);
    // UI elements never cast shadows or reach the depth pre-pass.
    assert_eq!(count(&submission, "shadow/pass/shadow"), 0);
    assert_eq!(count(&submission, "depth/pass/depth"), 0);
    renderer.destroy().unwrap();
}

/// The render pass of the first draw with pipeline `label`.
fn render_pass_of(submission: &Submission, label: &str) -> RenderPassId {
    submission
        .draws
        .iter()
        .find(|draw| draw.pipeline_label.as_deref() == Some(label))
        .unwrap()
        .render_pass
}

/// The first descriptor set bound in `subpass` of `render_pass`.
fn set_bound_in(
    submission: &Submission,
    render_pass: RenderPassId,
    subpass: usize,
) -> DescriptorSetId {
    let begins = |command: &&Command| match command {
        Command::BeginRenderPass { render_pass: pass, .. } => *pass == render_pass,
        _ => false,
    };
    submission
        .commands
        .iter()
        .skip_while(|command| !begins(command))
        .scan(0, |current, command| {
            if matches!(command, Command::NextSubpass) {
                *current += 1;
            }
            Some((*current, command))
        })
        .find_map(|(current, command)| match command {
            Command::SetDescriptorSet { set, .. } if current == subpass => Some(*set),
            _ => None,
        })
        .unwrap()
}

/// Texels of the sampled texture at `set[binding][element]`.
fn bound_texels(harness: &Harness, set: DescriptorSetId, binding: u32, element: u32) -> Vec<u8> {
    let Some(DescriptorResource::SampledTexture { view, .. }) =
        harness.device.descriptor(set, binding, element)
    else {
        panic!("no texture bound at {binding}[{element}]");
    };
    let texture = harness.device.view_texture(view).unwrap();
    harness.device.read_texture(texture).unwrap()
}

/// Texels of the grading table the post-process pass bound in `submission`.
fn bound_lut(harness: &Harness, submission: &Submission) -> Vec<u8> {
    let post = render_pass_of(submission, "postprocess/pass/postprocess");
    let set = set_bound_in(submission, post, 0);
    bound_texels(harness, set, TEXTURES_BINDING, LUT_SLOT)
}

/// Asserts the composite image is graded before the output pass reads it.
fn assert_composite_before_output(submission: &Submission) {
    let labels = draw_labels(submission);
    let post = labels
        .iter()
        .position(|label| label == "postprocess/pass/postprocess")
        .unwrap();
    let output = labels
        .iter()
        .position(|label| label == "output/pass/output")
        .unwrap();
    assert!(post < output, "{labels:?}");
}

#[test]
fn test_unavailable_lut_grades_with_identity() {
    let harness = Harness::uncompiled();
    harness.compile();
    harness.textures.reserve(harness.lut()).unwrap();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness);

    renderer.render(&frame(0), &scene).unwrap();
    let submission = harness.last_submission();
    assert_composite_before_output(&submission);
    assert_eq!(bound_lut(&harness, &submission), identity_lut());

    harness.upload_lut();
    renderer.render(&frame(1), &scene).unwrap();
    let submission = harness.last_submission();
    assert_composite_before_output(&submission);
    assert_eq!(bound_lut(&harness, &submission), vec![128; 16 * 4 * 4]);

    harness.textures.fail(harness.lut(), "decode error").unwrap();
    for frame_index in 2..4 {
        renderer.render(&frame(frame_index), &scene).unwrap();
        let submission = harness.last_submission();
        assert_composite_before_output(&submission);
        assert_eq!(bound_lut(&harness, &submission), identity_lut());
    }
    renderer.destroy().unwrap();
}

#[test]
fn test_post_process_clears_composite_while_compiling() {
    let harness = Harness::uncompiled();
    harness.upload_lut();
    let context = harness.context(config());
    let targets = RenderTargets::new(&context).unwrap();
    let mut post = PostProcessPass::new(&context, &targets).unwrap();

    let device = harness.device.clone();
    let mut encoder = device.create_command_encoder(Some("post"));
    post.record(encoder.as_mut(), &frame(0), &Group::new("root")).unwrap();
    device.submit_command_buffer(encoder.finish());

    let submission = harness.last_submission();
    assert!(submission.draws.is_empty());
    assert!(submission.commands.iter().any(|command| matches!(
        command,
        Command::BeginRenderPass { render_pass, .. } if *render_pass == post.render_pass()
    )));

    post.destroy().unwrap();
    targets.destroy(&device).unwrap();
    context.destroy().unwrap();
}

#[test]
fn test_lighting_reads_blurred_occlusion() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness);

    for frame_index in 0..2 {
        renderer.render(&frame(frame_index), &scene).unwrap();
        let submission = harness.last_submission();
        let deferred = render_pass_of(&submission, "deferred/pass/lighting");
        let set = set_bound_in(&submission, deferred, 1);
        let Some(DescriptorResource::SampledTexture { view, .. }) =
            harness.device.descriptor(set, OCCLUSION_BINDING, 0)
        else {
            panic!("no occlusion bound");
        };
        let blurred = renderer.targets().frame(frame_index).occlusion_blur.view;
        assert_eq!(view, blurred);
    }
    renderer.destroy().unwrap();
}

#[test]
fn test_occlusion_targets_are_half_resolution() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    let targets = *renderer.targets().frame(0);
    let half = (EXTENT.width / 2 * EXTENT.height / 2 * 2) as usize;
    for target in [targets.occlusion, targets.occlusion_blur] {
        assert!(harness.device.write_texture(target.texture, &vec![0; half]).is_ok());
        assert!(harness
            .device
            .write_texture(target.texture, &vec![0; half * 4])
            .is_err());
    }
    renderer.destroy().unwrap();
}

#[test]
fn test_disabled_occlusion_lights_unoccluded() {
    let harness = Harness::new();
    let mut renderer = harness.renderer_with(RendererConfig {
        occlusion: OcclusionConfig {
            enabled: false,
            ..Default::default()
        },
        ..config()
    });
    assert!(!renderer.pass_names().contains(&"ssao"));
    assert!(!renderer.pass_names().contains(&"blur"));

    renderer.render(&frame(0), &opaque_scene(&harness)).unwrap();
    let submission = harness.last_submission();
    assert_eq!(count(&submission, "ssao/pass/ssao"), 0);
    assert_eq!(count(&submission, "deferred/pass/lighting"), 1);
    let deferred = render_pass_of(&submission, "deferred/pass/lighting");
    let set = set_bound_in(&submission, deferred, 1);
    assert_eq!(bound_texels(&harness, set, OCCLUSION_BINDING, 0), vec![255; 4]);
    renderer.destroy().unwrap();
}

#[test]
fn test_ssao_uploads_its_kernel_and_clears_while_compiling() {
    let harness = Harness::uncompiled();
    let context = harness.context(config());
    let targets = RenderTargets::new(&context).unwrap();
    let mut ssao = SsaoPass::new(&context, &targets).unwrap();

    let expected = occlusion_params(&context.config.occlusion, targets.occlusion_extent());
    assert_eq!(
        harness.device.read_buffer(ssao.params()).unwrap(),
        bytemuck::bytes_of(&expected)
    );

    let device = harness.device.clone();
    let mut encoder = device.create_command_encoder(Some("ssao"));
    ssao.record(encoder.as_mut(), &frame(0), &Group::new("root")).unwrap();
    device.submit_command_buffer(encoder.finish());
    let submission = harness.last_submission();
    assert!(submission.draws.is_empty());
    assert!(submission.commands.iter().any(|command| matches!(
        command,
        Command::BeginRenderPass { render_pass, .. } if *render_pass == ssao.render_pass()
    )));

    ssao.destroy().unwrap();
    targets.destroy(&device).unwrap();
    context.destroy().unwrap();
}

#[test]
fn test_object_overflow_is_fatal() {
    let harness = Harness::new();
    let mut renderer = harness.renderer_with(RendererConfig {
        max_objects: 2,
        ..config()
    });
    let mut scene = Group::new("crowd");
    for _ in 0..3 {
        scene.push(StaticMesh::new(harness.quad, Some(MaterialDef::standard_deferred())));
    }

    let err = renderer.render(&frame(0), &scene).unwrap_err();
    assert!(matches!(err, PassError::Capacity(ref e) if e.capacity == 2));
    renderer.destroy().unwrap();
}

#[test]
fn test_light_overflow_is_fatal() {
    let harness = Harness::new();
    let mut renderer = harness.renderer_with(RendererConfig {
        max_lights: 1,
        ..config()
    });
    let scene = Group::new("lamps")
        .with(StaticMesh::new(harness.quad, Some(MaterialDef::standard_deferred())))
        .with(PointLight::new(Vec3::X, LinearRgba::WHITE, 1.0, 5.0))
        .with(PointLight::new(-Vec3::X, LinearRgba::WHITE, 1.0, 5.0));

    assert!(matches!(
        renderer.render(&frame(0), &scene),
        Err(PassError::Capacity(_))
    ));
    renderer.destroy().unwrap();
}

#[test]
fn test_destroy_releases_everything() {
    let harness = Harness::new();
    let before = harness.live();
    let mut renderer = harness.renderer();
    let scene = opaque_scene(&harness)
        .with(StaticMesh::new(harness.quad, Some(MaterialDef::transparent_forward())))
        .with(StaticMesh::new(harness.quad, Some(MaterialDef::ui())));
    for frame_index in 0..3 {
        renderer.render(&frame(frame_index), &scene).unwrap();
    }
    assert!(harness.live() > before);

    renderer.destroy().unwrap();
    assert_eq!(harness.live(), before);
    // A second destroy is a no-op.
    renderer.destroy().unwrap();

    harness.destroy_assets();
    assert_eq!(harness.live(), 0);
}

#[test]
fn test_render_after_destroy_fails() {
    let harness = Harness::new();
    let mut renderer = harness.renderer();
    renderer.destroy().unwrap();
    assert!(matches!(
        renderer.render(&frame(0), &opaque_scene(&harness)),
        Err(PassError::Destroyed("renderer"))
    ));
}
