// cl_ents.rs — persistent entities into the scene, and the per-frame add order

use q2frame_common::q_shared::{EffectFlags, RenderFlags};

use crate::cl_fx::{FxRng, LightStyleTable};
use crate::cl_lerp::{InterpolatedEntity, PoseSet, ViewPose};
use crate::cl_tent::EffectSpawner;
use crate::cl_view::SceneAssembler;
use crate::client::ModelHandle;
use crate::ref_def::{Entity, FrameDescriptor};

/// Entity lights are refreshed every frame, so they all report this lifetime.
pub const ENTITY_LIGHT_MS: i32 = 100;

const BFG_LIGHTRAMP: [f32; 6] = [300.0, 400.0, 600.0, 300.0, 150.0, 75.0];

/// Everything entity assembly reads for one frame.
#[derive(Clone, Copy)]
pub struct EntityFrame<'a> {
    pub poses: &'a PoseSet,
    pub model_precache: &'a [ModelHandle],
    pub player_entity: i32,
    pub noskins: bool,
    pub time: i32,
}

fn model_for(precache: &[ModelHandle], index: i32) -> ModelHandle {
    usize::try_from(index)
        .ok()
        .and_then(|i| precache.get(i))
        .copied()
        .unwrap_or(ModelHandle::NONE)
}

/// Lights carried by the entity's effect bits.
fn add_entity_lights(scene: &mut SceneAssembler, pose: &InterpolatedEntity, effects: EffectFlags) {
    let org = &pose.origin;
    if effects.intersects(EffectFlags::ROCKET | EffectFlags::BLASTER | EffectFlags::HYPERBLASTER) {
        scene.v_add_light(org, 200.0, 1.0, 1.0, 0.0, ENTITY_LIGHT_MS);
    } else if effects.contains(EffectFlags::BFG) {
        let intensity = if effects.contains(EffectFlags::ANIM_ALLFAST) {
            200.0
        } else {
            usize::try_from(pose.state.frame)
                .ok()
                .and_then(|f| BFG_LIGHTRAMP.get(f))
                .copied()
                .unwrap_or(200.0)
        };
        scene.v_add_light(org, intensity, 0.0, 1.0, 0.0, ENTITY_LIGHT_MS);
    } else if effects.contains(EffectFlags::FLAG1) {
        scene.v_add_light(org, 225.0, 1.0, 0.1, 0.1, ENTITY_LIGHT_MS);
    } else if effects.contains(EffectFlags::FLAG2) {
        scene.v_add_light(org, 225.0, 0.1, 0.1, 1.0, ENTITY_LIGHT_MS);
    }
}

/// CL_AddPacketEntities: one pass in ascending entity index.
pub fn add_packet_entities(scene: &mut SceneAssembler, rng: &mut FxRng, fr: &EntityFrame<'_>) {
    for pose in fr.poses.iter() {
        let s1 = &pose.state;
        let mut effects = s1.effects;
        let mut renderfx = s1.renderfx;

        // quad and pent can do different things on client
        if effects.contains(EffectFlags::PENT) {
            effects.remove(EffectFlags::PENT);
            effects |= EffectFlags::COLOR_SHELL;
            renderfx |= RenderFlags::SHELL_RED;
        }
        if effects.contains(EffectFlags::QUAD) {
            effects.remove(EffectFlags::QUAD);
            effects |= EffectFlags::COLOR_SHELL;
            renderfx |= RenderFlags::SHELL_BLUE;
        }

        let mut ent = Entity {
            origin: pose.origin,
            oldorigin: pose.old_origin,
            angles: pose.angles,
            frame: pose.frame,
            oldframe: pose.oldframe,
            backlerp: pose.backlerp,
            ..Entity::default()
        };

        if renderfx.contains(RenderFlags::BEAM) {
            // the four beam colors are encoded in 32 bits of skinnum
            ent.alpha = 0.30;
            ent.skinnum = (s1.skinnum >> ((rng.qrand() % 4) * 8)) & 0xff;
            ent.model = ModelHandle::NONE;
        } else {
            ent.skinnum = if fr.noskins { 0 } else { s1.skinnum };
            ent.model = model_for(fr.model_precache, s1.modelindex);
            if renderfx.contains(RenderFlags::TRANSLUCENT) {
                ent.alpha = 0.70;
            }
        }

        // renderfx go on the color shell entity
        ent.flags = if effects.contains(EffectFlags::COLOR_SHELL) { RenderFlags::empty() } else { renderfx };

        if s1.number == fr.player_entity {
            // only draw from mirrors
            ent.flags |= RenderFlags::VIEWERMODEL;
            if effects.contains(EffectFlags::FLAG1) {
                scene.v_add_light(&ent.origin, 225.0, 1.0, 0.1, 0.1, ENTITY_LIGHT_MS);
            } else if effects.contains(EffectFlags::FLAG2) {
                scene.v_add_light(&ent.origin, 225.0, 0.1, 0.1, 1.0, ENTITY_LIGHT_MS);
            }
            continue;
        }

        // invisible
        if s1.modelindex == 0 {
            continue;
        }
        if ent.model.is_none() && !renderfx.contains(RenderFlags::BEAM) {
            log::trace!("entity {}: model {} unresolved", s1.number, s1.modelindex);
            add_entity_lights(scene, pose, effects);
            continue;
        }

        if effects.contains(EffectFlags::BFG) {
            ent.flags |= RenderFlags::TRANSLUCENT;
            ent.alpha = 0.30;
        }

        scene.v_add_entity(&ent);

        // color shells generate a separate entity for the main model
        if effects.contains(EffectFlags::COLOR_SHELL) {
            ent.flags = renderfx | RenderFlags::TRANSLUCENT;
            ent.alpha = 0.30;
            scene.v_add_entity(&ent);
        }

        // never use a custom skin on others
        ent.skinnum = 0;
        ent.flags = RenderFlags::empty();
        ent.alpha = 0.0;

        // duplicate for linked models
        if s1.modelindex2 != 0 {
            ent.model = model_for(fr.model_precache, s1.modelindex2);
            if !ent.model.is_none() {
                scene.v_add_entity(&ent);
            }
        }

        add_entity_lights(scene, pose, effects);
    }
}

/// CL_AddEntities: camera, then every producer in its fixed order, then
/// light selection. The returned descriptor is complete for this frame.
pub fn add_entities<'s>(
    scene: &'s mut SceneAssembler,
    spawner: &mut EffectSpawner,
    lightstyles: &LightStyleTable,
    view: &ViewPose,
    fr: &EntityFrame<'_>,
    server_frame: i32,
) -> &'s FrameDescriptor {
    scene.v_clear_scene();
    scene.set_camera(view, fr.time, server_frame);

    add_packet_entities(scene, spawner.rng(), fr);

    let poses = fr.poses;
    spawner.add_tents(scene, &view.vieworg, fr.player_entity, fr.time, |n| poses.get(n).map(|p| p.origin));

    spawner.particles().add_particles(|p| scene.v_add_particle(p));
    spawner.dlights().add_dlights(fr.time, |dl, remaining| {
        scene.v_add_light(&dl.origin, dl.intensity, dl.color[0], dl.color[1], dl.color[2], remaining);
    });
    lightstyles.add_light_styles(|i, r, g, b| scene.v_add_light_style(i, r, g, b));

    scene.finish()
}
