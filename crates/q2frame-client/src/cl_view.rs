// cl_view.rs — scene assembly into a pre-sized frame descriptor

use q2frame_common::common::com_error;
use q2frame_common::q_shared::{Vec3, ERR_DROP, MAX_LIGHTSTYLES};

use crate::cl_lerp::ViewPose;
use crate::client::MAX_DLIGHTS;
use crate::ref_def::{DLight, Entity, FrameDescriptor, LightStyle, Particle};

/// A light that wants into the frame, with how long it has left to live.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LightCandidate {
    pub light: DLight,
    pub remaining: i32, // ms
    pub order: u32,
}

/// Things dropped because a buffer was full, since the last clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneDrops {
    pub entities: u64,
    pub particles: u64,
    pub lights: u64,
    pub candidates: u64,
}

/// Owns every buffer the assembled frame needs. Nothing here allocates
/// after construction.
#[derive(Debug, Clone)]
pub struct SceneAssembler {
    frame: FrameDescriptor,
    max_entities: usize,
    max_particles: usize,
    max_candidates: usize,
    next_order: u32,
    candidates: Vec<LightCandidate>,
    selection: Vec<LightCandidate>,
    drops: SceneDrops,
}

impl SceneAssembler {
    /// `max_light_candidates` must cover every light producer: explosions,
    /// dynamic lights and entity lights.
    pub fn new(max_entities: usize, max_particles: usize, max_light_candidates: usize) -> Self {
        let mut frame = FrameDescriptor::with_capacity(max_entities, max_particles);
        frame.lightstyles.resize(MAX_LIGHTSTYLES, LightStyle::default());
        Self {
            frame,
            max_entities,
            max_particles,
            max_candidates: max_light_candidates,
            next_order: 0,
            candidates: Vec::with_capacity(max_light_candidates),
            selection: Vec::with_capacity(max_light_candidates),
            drops: SceneDrops::default(),
        }
    }

    pub fn frame(&self) -> &FrameDescriptor {
        &self.frame
    }

    pub fn drops(&self) -> SceneDrops {
        self.drops
    }

    pub fn max_entities(&self) -> usize {
        self.max_entities
    }

    pub fn v_clear_scene(&mut self) {
        self.frame.entities.clear();
        self.frame.dlights.clear();
        self.frame.particles.clear();
        self.candidates.clear();
        self.next_order = 0;
        self.drops = SceneDrops::default();
    }

    /// Returns false once the entity cap is reached.
    pub fn v_add_entity(&mut self, ent: &Entity) -> bool {
        if self.frame.entities.len() >= self.max_entities {
            self.drops.entities += 1;
            return false;
        }
        self.frame.entities.push(*ent);
        true
    }

    pub fn v_add_particle(&mut self, p: &Particle) {
        if self.frame.particles.len() >= self.max_particles {
            self.drops.particles += 1;
            return;
        }
        self.frame.particles.push(*p);
    }

    /// Queue a light candidate. Selection happens in `finish`. A full buffer
    /// evicts the candidate closest to expiry, the newest of those on ties.
    pub fn v_add_light(&mut self, org: &Vec3, intensity: f32, r: f32, g: f32, b: f32, remaining_ms: i32) {
        let candidate = LightCandidate {
            light: DLight { origin: *org, color: [r, g, b], intensity },
            remaining: remaining_ms,
            order: self.next_order,
        };
        self.next_order += 1;
        if self.candidates.len() < self.max_candidates {
            self.candidates.push(candidate);
            return;
        }

        self.drops.candidates += 1;
        let weakest = self
            .candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.remaining.cmp(&b.remaining).then(b.order.cmp(&a.order)))
            .map(|(i, c)| (i, c.remaining));
        match weakest {
            Some((i, remaining)) if remaining < candidate.remaining => {
                log::trace!("light candidate buffer full, evicting one with {} ms left", remaining);
                self.candidates[i] = candidate;
            }
            _ => log::trace!("light candidate buffer full"),
        }
    }

    pub fn v_add_light_style(&mut self, style: usize, r: f32, g: f32, b: f32) {
        let Some(ls) = self.frame.lightstyles.get_mut(style) else {
            com_error(ERR_DROP, &format!("Bad light style {}", style));
            return;
        };
        ls.white = r + g + b;
        ls.rgb = [r, g, b];
    }

    pub fn set_camera(&mut self, view: &ViewPose, time_ms: i32, server_frame: i32) {
        let fd = &mut self.frame;
        fd.fov_x = view.fov;
        fd.vieworg = view.vieworg;
        fd.viewangles = view.viewangles;
        fd.forward = view.forward;
        fd.right = view.right;
        fd.up = view.up;
        fd.blend = view.blend;
        fd.rdflags = view.rdflags;
        fd.areabits = view.areabits;
        fd.time = time_ms as f32 * 0.001;
        fd.server_frame = server_frame;
    }

    /// Pick the lights that make it into the frame and hand back the result.
    pub fn finish(&mut self) -> &FrameDescriptor {
        self.frame.dlights.clear();
        if self.candidates.len() > MAX_DLIGHTS {
            self.drops.lights += (self.candidates.len() - MAX_DLIGHTS) as u64;
            log::trace!("{} lights over the cap dropped", self.candidates.len() - MAX_DLIGHTS);
        }
        select_lights(&self.candidates, &mut self.selection, MAX_DLIGHTS);
        self.frame.dlights.extend(self.selection.iter().map(|c| c.light));
        &self.frame
    }
}

/// Keep the `cap` candidates with the longest remaining lifetime, earlier
/// insertion first on ties, and leave them in insertion order.
pub fn select_lights(candidates: &[LightCandidate], out: &mut Vec<LightCandidate>, cap: usize) {
    out.clear();
    out.extend_from_slice(candidates);
    if out.len() <= cap {
        return;
    }
    out.sort_unstable_by(|a, b| b.remaining.cmp(&a.remaining).then(a.order.cmp(&b.order)));
    out.truncate(cap);
    out.sort_unstable_by_key(|c| c.order);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(assembler: &mut SceneAssembler, remaining: &[i32]) {
        for (i, &r) in remaining.iter().enumerate() {
            assembler.v_add_light(&[i as f32, 0.0, 0.0], 100.0, 1.0, 1.0, 1.0, r);
        }
    }

    #[test]
    fn forty_lights_keep_the_longest_lived_thirty_two() {
        let mut sa = SceneAssembler::new(16, 16, 64);
        sa.v_clear_scene();
        // light i has i*10 ms left: 0..=7 are the shortest
        let remaining: Vec<i32> = (0..40).map(|i| i * 10).collect();
        lit(&mut sa, &remaining);
        let fd = sa.finish();
        assert_eq!(fd.dlights.len(), MAX_DLIGHTS);
        let xs: Vec<f32> = fd.dlights.iter().map(|l| l.origin[0]).collect();
        let expected: Vec<f32> = (8..40).map(|i| i as f32).collect();
        assert_eq!(xs, expected);
        assert_eq!(sa.drops().lights, 8);
    }

    #[test]
    fn full_candidate_buffer_evicts_the_shortest_lived() {
        let mut sa = SceneAssembler::new(16, 16, 34);
        sa.v_clear_scene();
        // the longest-lived lights arrive after the buffer fills
        let remaining: Vec<i32> = (0..40).map(|i| i * 10).collect();
        lit(&mut sa, &remaining);
        assert_eq!(sa.drops().candidates, 6);
        let fd = sa.finish();
        let xs: Vec<f32> = fd.dlights.iter().map(|l| l.origin[0]).collect();
        let expected: Vec<f32> = (8..40).map(|i| i as f32).collect();
        assert_eq!(xs, expected);
    }

    #[test]
    fn full_candidate_buffer_refuses_a_shorter_newcomer() {
        let mut sa = SceneAssembler::new(16, 16, 2);
        sa.v_clear_scene();
        lit(&mut sa, &[50, 60, 50]);
        let fd = sa.finish();
        let xs: Vec<f32> = fd.dlights.iter().map(|l| l.origin[0]).collect();
        assert_eq!(xs, vec![0.0, 1.0]);
    }

    #[test]
    fn ties_favour_earlier_insertion() {
        let mut sa = SceneAssembler::new(16, 16, 64);
        sa.v_clear_scene();
        lit(&mut sa, &[50; 34]);
        let fd = sa.finish();
        assert_eq!(fd.dlights.len(), 32);
        assert_eq!(fd.dlights[0].origin[0], 0.0);
        assert_eq!(fd.dlights[31].origin[0], 31.0);
    }

    #[test]
    fn survivors_keep_insertion_order() {
        let mut candidates = Vec::new();
        for (i, r) in [5, 100, 1, 90, 80].iter().enumerate() {
            candidates.push(LightCandidate { remaining: *r, order: i as u32, ..Default::default() });
        }
        let mut out = Vec::with_capacity(8);
        select_lights(&candidates, &mut out, 3);
        let orders: Vec<u32> = out.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 3, 4]);
    }

    #[test]
    fn under_the_cap_everything_passes() {
        let mut sa = SceneAssembler::new(16, 16, 64);
        sa.v_clear_scene();
        lit(&mut sa, &[1, 2, 3]);
        assert_eq!(sa.finish().dlights.len(), 3);
    }

    #[test]
    fn entity_cap_is_enforced_without_growth() {
        let mut sa = SceneAssembler::new(4, 2, 8);
        sa.v_clear_scene();
        let cap = sa.frame().entities.capacity();
        for _ in 0..10 {
            sa.v_add_entity(&Entity::default());
        }
        for _ in 0..5 {
            sa.v_add_particle(&Particle::default());
        }
        assert_eq!(sa.frame().entities.len(), 4);
        assert_eq!(sa.frame().particles.len(), 2);
        assert_eq!(sa.frame().entities.capacity(), cap);
        assert_eq!(sa.drops().entities, 6);
        assert_eq!(sa.drops().particles, 3);
    }

    #[test]
    fn light_styles_and_camera() {
        let mut sa = SceneAssembler::new(4, 4, 4);
        sa.v_add_light_style(3, 0.5, 0.5, 0.5);
        // out of range is dropped, not fatal
        sa.v_add_light_style(MAX_LIGHTSTYLES, 1.0, 1.0, 1.0);
        assert_eq!(sa.frame().lightstyles.len(), MAX_LIGHTSTYLES);
        assert_eq!(sa.frame().lightstyles[3].white, 1.5);

        let view = ViewPose {
            vieworg: [1.0, 2.0, 3.0],
            viewangles: [0.0; 3],
            fov: 100.0,
            blend: [0.0; 4],
            rdflags: 0,
            areabits: [0xff; 32],
            forward: [1.0, 0.0, 0.0],
            right: [0.0, -1.0, 0.0],
            up: [0.0, 0.0, 1.0],
        };
        sa.set_camera(&view, 2500, 25);
        assert_eq!(sa.frame().fov_x, 100.0);
        assert_eq!(sa.frame().time, 2.5);
        assert_eq!(sa.frame().server_frame, 25);
    }
}
