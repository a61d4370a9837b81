// cl_lerp.rs — blend fraction, per-entity poses and camera interpolation

use q2frame_common::common::com_dprintf;
use q2frame_common::q_shared::{
    anglemod, angle_vectors, lerp_angle, vector_add, vector_scale, vector_subtract, EffectFlags,
    EntityState, RenderFlags, Vec3, AREABITS_BYTES, EV_OTHER_TELEPORT, EV_PLAYER_TELEPORT,
    MAX_EDICTS,
};

use crate::cl_snap::{EntitySnapshotFrame, SnapshotPair};
use crate::client::MAX_LERP_DISTANCE;

// ============================================================
// Blend fraction
// ============================================================

/// Render clock for one tick: the clamped time and the fraction derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LerpClock {
    pub time: i32,
    pub lerpfrac: f32,
}

/// (render − previous) / (current − previous), with the render time clamped
/// into the snapshot interval.
pub fn compute_lerpfrac(
    render_time: i32,
    pair: Option<&SnapshotPair<'_>>,
    timedemo: bool,
    showclamp: bool,
) -> LerpClock {
    let Some(pair) = pair else {
        return LerpClock { time: render_time, lerpfrac: 1.0 };
    };
    let (prev_t, cur_t) = (pair.previous.server_time, pair.current.server_time);

    let mut time = render_time;
    if time > cur_t {
        if showclamp {
            com_dprintf(&format!("high clamp {}\n", time - cur_t));
        }
        time = cur_t;
    } else if time < prev_t {
        if showclamp {
            com_dprintf(&format!("low clamp {}\n", prev_t - time));
        }
        time = prev_t;
    }

    let lerpfrac = if timedemo || !pair.interpolate || cur_t <= prev_t {
        1.0
    } else {
        ((time - prev_t) as f32 / (cur_t - prev_t) as f32).clamp(0.0, 1.0)
    };
    LerpClock { time, lerpfrac }
}

// ============================================================
// Blending helpers exact at both ends
// ============================================================

#[inline]
fn blend(from: f32, to: f32, frac: f32) -> f32 {
    if frac <= 0.0 {
        from
    } else if frac >= 1.0 {
        to
    } else {
        from + frac * (to - from)
    }
}

fn blend_vec3(from: &Vec3, to: &Vec3, frac: f32) -> Vec3 {
    [
        blend(from[0], to[0], frac),
        blend(from[1], to[1], frac),
        blend(from[2], to[2], frac),
    ]
}

/// Shortest-arc blend on every axis.
pub fn blend_angles(from: &Vec3, to: &Vec3, frac: f32) -> Vec3 {
    if frac <= 0.0 {
        return *from;
    }
    if frac >= 1.0 {
        return *to;
    }
    [
        lerp_angle(from[0], to[0], frac),
        lerp_angle(from[1], to[1], frac),
        lerp_angle(from[2], to[2], frac),
    ]
}

// ============================================================
// Entity poses
// ============================================================

/// Render pose of one entity for this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatedEntity {
    pub number: i32,
    pub origin: Vec3,
    pub old_origin: Vec3,
    pub angles: Vec3,
    pub frame: i32,
    pub oldframe: i32,
    pub backlerp: f32,
    /// Units per second, zero when not lerped.
    pub velocity: Vec3,
    /// False on a discontinuity: the pose is the current state.
    pub lerped: bool,
    /// Absent from the previous snapshot.
    pub spawned: bool,
    pub state: EntityState,
}

/// Teleports, model swaps, long jumps and the server's explicit flag all
/// snap to the current state.
pub fn needs_nolerp(prev: &EntityState, cur: &EntityState) -> bool {
    if cur.renderfx.contains(RenderFlags::NOLERP) {
        return true;
    }
    if cur.modelindex != prev.modelindex || cur.modelindex2 != prev.modelindex2 {
        return true;
    }
    if (0..3).any(|i| (cur.origin[i] - prev.origin[i]).abs() > MAX_LERP_DISTANCE) {
        return true;
    }
    cur.event == EV_PLAYER_TELEPORT || cur.event == EV_OTHER_TELEPORT
}

fn auto_frame(effects: EffectFlags, frame: i32, time: i32) -> i32 {
    // brush models can auto animate their frames
    let autoanim = 2 * time / 1000;
    if effects.contains(EffectFlags::ANIM01) {
        autoanim & 1
    } else if effects.contains(EffectFlags::ANIM23) {
        2 + (autoanim & 1)
    } else if effects.contains(EffectFlags::ANIM_ALL) {
        autoanim
    } else if effects.contains(EffectFlags::ANIM_ALLFAST) {
        time / 100
    } else {
        frame
    }
}

/// Pose of `number`, or None when the entity is not in `current`.
pub fn compute_pose(
    number: i32,
    previous: &EntitySnapshotFrame,
    current: &EntitySnapshotFrame,
    frac: f32,
    time: i32,
) -> Option<InterpolatedEntity> {
    let cur = current.entities.get(&number)?;
    let prev_state = previous.entities.get(&number);
    let spawned = prev_state.is_none();
    let prev = match prev_state {
        Some(p) if !needs_nolerp(p, cur) => p,
        _ => cur,
    };
    let lerped = !std::ptr::eq(prev, cur);
    let frac = if lerped { frac.clamp(0.0, 1.0) } else { 1.0 };

    let (origin, old_origin) = if cur.renderfx.intersects(RenderFlags::FRAMELERP | RenderFlags::BEAM) {
        // step origin discretely, because the frames do the animation properly
        (cur.origin, cur.old_origin)
    } else {
        let o = blend_vec3(&prev.origin, &cur.origin, frac);
        (o, o)
    };

    let angles = if cur.effects.contains(EffectFlags::ROTATE) {
        // bonus items rotate at a fixed rate
        [0.0, anglemod(time as f32 / 10.0), 0.0]
    } else {
        blend_angles(&prev.angles, &cur.angles, frac)
    };

    let interval = current.server_time - previous.server_time;
    let velocity = if lerped && interval > 0 {
        vector_scale(&vector_subtract(&cur.origin, &prev.origin), 1000.0 / interval as f32)
    } else {
        [0.0; 3]
    };

    Some(InterpolatedEntity {
        number,
        origin,
        old_origin,
        angles,
        frame: auto_frame(cur.effects, cur.frame, time),
        oldframe: prev.frame,
        backlerp: if lerped { 1.0 - frac } else { 0.0 },
        velocity,
        lerped,
        spawned,
        state: *cur,
    })
}

/// Poses of every entity in the current snapshot, index-addressed, with
/// storage sized once for the engine maximum.
#[derive(Debug, Clone)]
pub struct PoseSet {
    poses: Vec<Option<InterpolatedEntity>>,
    order: Vec<i32>,
}

impl Default for PoseSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseSet {
    pub fn new() -> Self {
        let mut poses = Vec::with_capacity(MAX_EDICTS);
        poses.resize(MAX_EDICTS, None);
        Self { poses, order: Vec::with_capacity(MAX_EDICTS) }
    }

    pub fn clear(&mut self) {
        for &n in &self.order {
            self.poses[n as usize] = None;
        }
        self.order.clear();
    }

    pub fn build(&mut self, pair: &SnapshotPair<'_>, frac: f32, time: i32) {
        self.clear();
        let previous = if pair.interpolate { pair.previous } else { pair.current };
        for &number in pair.current.entities.keys() {
            if number < 0 || number as usize >= MAX_EDICTS {
                log::trace!("entity {} out of range, skipped", number);
                continue;
            }
            if let Some(pose) = compute_pose(number, previous, pair.current, frac, time) {
                self.poses[number as usize] = Some(pose);
                self.order.push(number);
            }
        }
    }

    pub fn get(&self, number: i32) -> Option<&InterpolatedEntity> {
        usize::try_from(number)
            .ok()
            .and_then(|i| self.poses.get(i))
            .and_then(Option::as_ref)
    }

    /// Ascending entity index.
    pub fn iter(&self) -> impl Iterator<Item = &InterpolatedEntity> {
        self.order.iter().filter_map(|&n| self.poses[n as usize].as_ref())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ============================================================
// Camera
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPose {
    pub vieworg: Vec3,
    pub viewangles: Vec3,
    pub fov: f32,
    pub blend: [f32; 4],
    pub rdflags: i32,
    pub areabits: [u8; AREABITS_BYTES],
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

/// CL_CalcViewValues without prediction: everything blends from the
/// previous player view except the screen blend, rdflags and areabits.
pub fn compute_view(pair: &SnapshotPair<'_>, frac: f32) -> ViewPose {
    let ps = &pair.current.player;
    let ops = if pair.interpolate { &pair.previous.player } else { ps };

    let from = vector_add(&ops.origin, &ops.viewoffset);
    let to = vector_add(&ps.origin, &ps.viewoffset);
    let vieworg = blend_vec3(&from, &to, frac);

    let base = blend_angles(&ops.viewangles, &ps.viewangles, frac);
    let kick = blend_angles(&ops.kick_angles, &ps.kick_angles, frac);
    let viewangles = vector_add(&base, &kick);

    let (forward, right, up) = angle_vectors(&viewangles);
    ViewPose {
        vieworg,
        viewangles,
        fov: blend(ops.fov, ps.fov, frac),
        blend: ps.blend,
        rdflags: ps.rdflags,
        areabits: ps.areabits,
        forward,
        right,
        up,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q2frame_common::q_shared::PlayerView;

    fn ent(n: i32, origin: Vec3, angles: Vec3) -> EntityState {
        EntityState { number: n, origin, angles, modelindex: 1, frame: 3, ..Default::default() }
    }

    fn frames(a: EntityState, b: EntityState) -> (EntitySnapshotFrame, EntitySnapshotFrame) {
        let mut p = EntitySnapshotFrame::new(1, 100);
        p.insert(a);
        let mut c = EntitySnapshotFrame::new(2, 200);
        c.insert(b);
        (p, c)
    }

    fn pair<'a>(p: &'a EntitySnapshotFrame, c: &'a EntitySnapshotFrame) -> SnapshotPair<'a> {
        SnapshotPair { previous: p, current: c, interpolate: true }
    }

    #[test]
    fn blend_fraction_clamps() {
        let (p, c) = frames(ent(1, [0.0; 3], [0.0; 3]), ent(1, [0.0; 3], [0.0; 3]));
        let pr = pair(&p, &c);
        assert_eq!(compute_lerpfrac(150, Some(&pr), false, false).lerpfrac, 0.5);
        assert_eq!(compute_lerpfrac(500, Some(&pr), false, true), LerpClock { time: 200, lerpfrac: 1.0 });
        assert_eq!(compute_lerpfrac(20, Some(&pr), false, true), LerpClock { time: 100, lerpfrac: 0.0 });
        assert_eq!(compute_lerpfrac(150, Some(&pr), true, false).lerpfrac, 1.0);
        assert_eq!(compute_lerpfrac(5, None, false, false).lerpfrac, 1.0);
    }

    #[test]
    fn pose_endpoints_are_exact() {
        let a = ent(1, [0.1, -7.3, 1e3], [10.0, 20.0, 30.0]);
        let b = ent(1, [0.3, 100.9, 999.7], [15.0, 25.0, 35.0]);
        let (p, c) = frames(a, b);
        let at0 = compute_pose(1, &p, &c, 0.0, 0).unwrap();
        assert_eq!(at0.origin, a.origin);
        assert_eq!(at0.angles, a.angles);
        let at1 = compute_pose(1, &p, &c, 1.0, 0).unwrap();
        assert_eq!(at1.origin, b.origin);
        assert_eq!(at1.angles, b.angles);
        assert_eq!(at1.backlerp, 0.0);
    }

    #[test]
    fn yaw_takes_short_path() {
        let (p, c) = frames(ent(1, [0.0; 3], [0.0, 350.0, 0.0]), ent(1, [0.0; 3], [0.0, 10.0, 0.0]));
        let pose = compute_pose(1, &p, &c, 0.5, 0).unwrap();
        let yaw = pose.angles[1];
        assert!((yaw - 360.0).abs() < 1e-3 || yaw.abs() < 1e-3, "yaw {yaw}");
    }

    #[test]
    fn new_entity_is_current_state() {
        let p = EntitySnapshotFrame::new(1, 100);
        let mut c = EntitySnapshotFrame::new(2, 200);
        c.insert(ent(4, [50.0, 60.0, 70.0], [0.0, 90.0, 0.0]));
        for frac in [0.0, 0.3, 1.0] {
            let pose = compute_pose(4, &p, &c, frac, 0).unwrap();
            assert_eq!(pose.origin, [50.0, 60.0, 70.0]);
            assert_eq!(pose.angles, [0.0, 90.0, 0.0]);
            assert!(pose.spawned && !pose.lerped);
            assert_eq!(pose.velocity, [0.0; 3]);
        }
    }

    #[test]
    fn removed_entity_has_no_pose() {
        let (p, mut c) = frames(ent(1, [0.0; 3], [0.0; 3]), ent(1, [0.0; 3], [0.0; 3]));
        c.entities.clear();
        assert!(compute_pose(1, &p, &c, 0.5, 0).is_none());
        let mut set = PoseSet::new();
        set.build(&pair(&p, &c), 0.5, 0);
        assert!(set.is_empty());
    }

    #[test]
    fn discontinuities_snap() {
        let a = ent(1, [0.0; 3], [0.0; 3]);

        let mut flagged = ent(1, [10.0, 0.0, 0.0], [0.0; 3]);
        flagged.renderfx = RenderFlags::NOLERP;
        let mut jumped = ent(1, [600.0, 0.0, 0.0], [0.0; 3]);
        jumped.frame = 3;
        let mut swapped = ent(1, [10.0, 0.0, 0.0], [0.0; 3]);
        swapped.modelindex = 9;
        let mut teleported = ent(1, [10.0, 0.0, 0.0], [0.0; 3]);
        teleported.event = EV_PLAYER_TELEPORT;

        for b in [flagged, jumped, swapped, teleported] {
            let (p, c) = frames(a, b);
            let pose = compute_pose(1, &p, &c, 0.25, 0).unwrap();
            assert_eq!(pose.origin, b.origin);
            assert!(!pose.lerped);
        }
    }

    #[test]
    fn velocity_in_units_per_second() {
        let (p, c) = frames(ent(1, [0.0; 3], [0.0; 3]), ent(1, [10.0, 0.0, -5.0], [0.0; 3]));
        let pose = compute_pose(1, &p, &c, 0.5, 0).unwrap();
        assert_eq!(pose.velocity, [100.0, 0.0, -50.0]);
    }

    #[test]
    fn beam_and_rotate_rules() {
        let a = ent(1, [0.0; 3], [0.0; 3]);
        let mut b = ent(1, [20.0, 0.0, 0.0], [0.0, 45.0, 0.0]);
        b.renderfx = RenderFlags::BEAM;
        b.old_origin = [5.0, 5.0, 5.0];
        b.effects = EffectFlags::ROTATE | EffectFlags::ANIM23;
        let (p, c) = frames(a, b);
        let pose = compute_pose(1, &p, &c, 0.5, 1500).unwrap();
        assert_eq!(pose.origin, [20.0, 0.0, 0.0]);
        assert_eq!(pose.old_origin, [5.0, 5.0, 5.0]);
        assert_eq!(pose.angles, [0.0, anglemod(150.0), 0.0]);
        assert_eq!(pose.frame, 3);
    }

    #[test]
    fn pose_set_ascending_and_reused() {
        let mut p = EntitySnapshotFrame::new(1, 100);
        let mut c = EntitySnapshotFrame::new(2, 200);
        for n in [9, 2, 5] {
            p.insert(ent(n, [0.0; 3], [0.0; 3]));
            c.insert(ent(n, [1.0; 3], [0.0; 3]));
        }
        let mut set = PoseSet::new();
        set.build(&pair(&p, &c), 0.5, 0);
        assert_eq!(set.iter().map(|e| e.number).collect::<Vec<_>>(), vec![2, 5, 9]);
        c.entities.remove(&5);
        set.build(&pair(&p, &c), 0.5, 0);
        assert!(set.get(5).is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn camera_blends_origin_and_kick() {
        let mut p = EntitySnapshotFrame::new(1, 100);
        let mut c = EntitySnapshotFrame::new(2, 200);
        p.player = PlayerView { origin: [0.0; 3], viewoffset: [0.0, 0.0, 22.0], fov: 90.0, ..Default::default() };
        c.player = PlayerView {
            origin: [100.0, 0.0, 0.0],
            viewoffset: [0.0, 0.0, 22.0],
            viewangles: [0.0, 10.0, 0.0],
            kick_angles: [2.0, 0.0, 0.0],
            fov: 110.0,
            blend: [1.0, 0.0, 0.0, 0.5],
            ..Default::default()
        };
        p.player.viewangles = [0.0, 350.0, 0.0];
        let v = compute_view(&pair(&p, &c), 0.5);
        assert_eq!(v.vieworg, [50.0, 0.0, 22.0]);
        assert!((v.viewangles[1] - 360.0).abs() < 1e-3 || v.viewangles[1].abs() < 1e-3);
        assert_eq!(v.viewangles[0], 1.0);
        assert_eq!(v.fov, 100.0);
        assert_eq!(v.blend, [1.0, 0.0, 0.0, 0.5]);
    }
}
