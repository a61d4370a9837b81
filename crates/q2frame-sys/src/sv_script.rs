// sv_script.rs — a scripted stand-in for the server side of the connection

use std::collections::{BTreeMap, VecDeque};

use q2frame_client::cl_snap::{EntityDelta, EntitySnapshotFrame, FrameDelta, SnapshotMessage, SnapshotSource};
use q2frame_client::cl_tent::TempEntityParams;
use q2frame_common::q_shared::{
    vectoangles2, vector_subtract, EffectFlags, EntityState, RenderFlags, TempEvent, Vec3,
    EV_FOOTSTEP, EV_ITEM_RESPAWN, EV_PLAYER_TELEPORT, SERVER_FRAMETIME_MS,
};

/// Precache entries the script refers to by index.
pub const MODELS: &[(usize, &str)] = &[
    (1, "maps/base1.bsp"),
    (2, "models/objects/rocket/tris.md2"),
    (3, "models/items/armor/body/tris.md2"),
    (4, "models/monsters/soldier/tris.md2"),
    (5, "models/objects/dmspot/tris.md2"),
    (6, "models/weapons/g_rocket/tris.md2"),
];

pub const SOUNDS: &[(usize, &str)] = &[
    (1, "world/amb10.wav"),
    (2, "weapons/rocklf1a.wav"),
];

/// Full frames go out this often; everything between is a delta.
const FULL_FRAME_INTERVAL: i32 = 10;
/// Every this many frames a duplicate of the previous frame arrives first.
const DUPLICATE_INTERVAL: i32 = 25;

const PLAYER: i32 = 1;
const ROCKET: i32 = 2;
const ARMOR: i32 = 3;
const SOLDIER: i32 = 4;
const HUMMER: i32 = 5;

/// Something the server sends alongside a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    Temp(TempEvent, TempEntityParams),
    MuzzleFlash { entity: i32, weapon: i32 },
    Sound { index: usize, origin: Vec3 },
}

struct Outgoing {
    message: SnapshotMessage,
    events: Vec<ScriptEvent>,
}

/// Produces the world one server frame at a time, on a 100 ms clock.
pub struct ScriptedServer {
    frame: i32,
    next_due: i32,
    last: Option<EntitySnapshotFrame>,
    baselines: BTreeMap<i32, EntityState>,
    outgoing: VecDeque<Outgoing>,
    pending_events: Vec<ScriptEvent>,
}

impl Default for ScriptedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedServer {
    pub fn new() -> Self {
        // spawn state of every entity, events stripped
        let baselines = build_world(0)
            .entities
            .into_iter()
            .map(|(n, s)| (n, EntityState { event: 0, ..s }))
            .collect();
        Self { frame: 0, next_due: 0, last: None, baselines, outgoing: VecDeque::new(), pending_events: Vec::new() }
    }

    /// svc_spawnbaseline: sent once, before the first frame.
    pub fn baselines(&self) -> impl Iterator<Item = &EntityState> {
        self.baselines.values()
    }

    pub fn frame(&self) -> i32 {
        self.frame
    }

    /// Run the world up to `wall_time` ms, queueing every frame that came due.
    pub fn run_to(&mut self, wall_time: i32) {
        while self.next_due <= wall_time {
            self.next_due += SERVER_FRAMETIME_MS;
            self.frame += 1;
            let n = self.frame;
            let world = build_world(n);

            if n % DUPLICATE_INTERVAL == 0 {
                if let Some(prev) = &self.last {
                    self.outgoing.push_back(Outgoing { message: SnapshotMessage::Full(prev.clone()), events: Vec::new() });
                }
            }

            let message = match &self.last {
                Some(base) if n % FULL_FRAME_INTERVAL != 1 => SnapshotMessage::Delta(diff(base, &world, &self.baselines)),
                _ => SnapshotMessage::Full(world.clone()),
            };
            self.outgoing.push_back(Outgoing { message, events: script_events(n) });
            self.last = Some(world);
        }
    }

    /// Events that arrived with the last delivered frame.
    pub fn take_events(&mut self) -> Vec<ScriptEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

impl SnapshotSource for ScriptedServer {
    fn next_snapshot(&mut self) -> Option<SnapshotMessage> {
        let out = self.outgoing.pop_front()?;
        self.pending_events.extend(out.events);
        Some(out.message)
    }
}

// ============================================================
// World script
// ============================================================

/// Facing along the move from frame `n - 1` to `n`.
fn heading(origin: fn(i32) -> Vec3, n: i32) -> Vec3 {
    vectoangles2(&vector_subtract(&origin(n), &origin(n - 1)))
}

fn rocket_origin(n: i32) -> Vec3 {
    [-512.0 + (n % 40) as f32 * 64.0, 128.0, 48.0]
}

fn soldier_origin(n: i32) -> Vec3 {
    let a = n as f32 * 0.1;
    // jumps across the map every 60 frames
    let base = if (n / 60) % 2 == 0 { [0.0, 0.0, 24.0] } else { [1024.0, 1024.0, 24.0] };
    [base[0] + a.cos() * 96.0, base[1] + a.sin() * 96.0, base[2]]
}

fn build_world(n: i32) -> EntitySnapshotFrame {
    let mut f = EntitySnapshotFrame::new(n, n * SERVER_FRAMETIME_MS);

    let player_origin = [-64.0 + n as f32 * 2.0, 0.0, 24.0];
    f.player.origin = player_origin;
    f.player.viewoffset = [0.0, 0.0, 22.0];
    f.player.viewangles = [0.0, (n * 3) as f32 % 360.0, 0.0];
    if n % 30 < 3 {
        f.player.kick_angles = [-2.0, 0.0, 0.0];
        f.player.blend = [1.0, 0.0, 0.0, 0.2];
    }

    let mut player = EntityState::new(PLAYER);
    player.origin = player_origin;
    player.old_origin = [player_origin[0] - 2.0, 0.0, 24.0];
    player.modelindex = 4;
    player.effects = EffectFlags::FLAG1;
    if n % 4 == 0 {
        player.event = EV_FOOTSTEP;
    }
    f.insert(player);

    // world model
    let mut world = EntityState::new(7);
    world.modelindex = 1;
    f.insert(world);

    // in flight for 30 frames, then gone for 10
    if n % 40 < 30 {
        let mut rocket = EntityState::new(ROCKET);
        rocket.origin = rocket_origin(n);
        rocket.old_origin = rocket_origin(n - 1);
        rocket.angles = heading(rocket_origin, n);
        rocket.modelindex = 2;
        rocket.effects = EffectFlags::ROCKET;
        rocket.sound = 2;
        f.insert(rocket);
    }

    let mut armor = EntityState::new(ARMOR);
    armor.origin = [128.0, -128.0, 16.0];
    armor.old_origin = armor.origin;
    armor.modelindex = 3;
    armor.effects = EffectFlags::ROTATE | EffectFlags::ANIM01;
    if n % 50 == 0 {
        armor.event = EV_ITEM_RESPAWN;
    }
    f.insert(armor);

    let mut soldier = EntityState::new(SOLDIER);
    soldier.origin = soldier_origin(n);
    soldier.old_origin = soldier_origin(n - 1);
    soldier.angles = heading(soldier_origin, n);
    soldier.modelindex = 4;
    soldier.modelindex2 = 6;
    soldier.frame = n % 40;
    if (n / 20) % 3 == 1 {
        soldier.effects = EffectFlags::QUAD;
    }
    if n % 60 == 0 {
        soldier.event = EV_PLAYER_TELEPORT;
    }
    f.insert(soldier);

    let mut hummer = EntityState::new(HUMMER);
    hummer.origin = [-256.0, 256.0, 0.0];
    hummer.old_origin = hummer.origin;
    hummer.modelindex = 5;
    hummer.sound = 1;
    hummer.renderfx = RenderFlags::TRANSLUCENT;
    f.insert(hummer);

    f
}

fn script_events(n: i32) -> Vec<ScriptEvent> {
    let mut events = Vec::new();
    if n % 7 == 0 {
        let pos = soldier_origin(n);
        events.push(ScriptEvent::Temp(
            TempEvent::Blaster,
            TempEntityParams { pos, dir: [0.0, 0.0, 1.0], ..Default::default() },
        ));
    }
    if n % 40 == 29 {
        events.push(ScriptEvent::Temp(
            TempEvent::RocketExplosion,
            TempEntityParams { pos: rocket_origin(n), ..Default::default() },
        ));
    }
    if n % 13 == 0 {
        events.push(ScriptEvent::Temp(
            TempEvent::Railtrail,
            TempEntityParams { pos: [0.0, -200.0, 32.0], pos2: [600.0, 200.0, 32.0], ..Default::default() },
        ));
    }
    if n % 15 == 0 {
        events.push(ScriptEvent::Temp(
            TempEvent::BfgLaser,
            TempEntityParams { pos: [0.0, 0.0, 64.0], pos2: [300.0, 0.0, 64.0], ..Default::default() },
        ));
    }
    if n % 11 == 0 {
        events.push(ScriptEvent::Temp(
            TempEvent::Gunshot,
            TempEntityParams { pos: [200.0, 40.0, 20.0], dir: [-1.0, 0.0, 0.0], ..Default::default() },
        ));
    }
    if n % 40 == 0 {
        events.push(ScriptEvent::Temp(
            TempEvent::ParasiteAttack,
            TempEntityParams { entity: SOLDIER, pos: soldier_origin(n), pos2: [0.0, 0.0, 24.0], ..Default::default() },
        ));
    }
    if n % 40 == 1 {
        // rocket launch
        events.push(ScriptEvent::MuzzleFlash { entity: PLAYER, weapon: 7 });
        events.push(ScriptEvent::Sound { index: 2, origin: rocket_origin(n) });
    }
    events
}

/// Fields of `to` that differ from `base`, the way the server encodes a delta.
/// Entities new to `base` are encoded against their baseline. A missing
/// old_origin decodes as the base origin.
fn diff(base: &EntitySnapshotFrame, to: &EntitySnapshotFrame, baselines: &BTreeMap<i32, EntityState>) -> FrameDelta {
    let mut entities = Vec::new();
    for &number in base.entities.keys() {
        if !to.entities.contains_key(&number) {
            entities.push(EntityDelta::remove(number));
        }
    }
    for (&number, s) in &to.entities {
        let b = base
            .entities
            .get(&number)
            .or_else(|| baselines.get(&number))
            .copied()
            .unwrap_or_else(|| EntityState::new(number));
        let d = EntityDelta {
            number,
            remove: false,
            origin: (s.origin != b.origin).then_some(s.origin),
            angles: (s.angles != b.angles).then_some(s.angles),
            old_origin: (s.old_origin != b.origin).then_some(s.old_origin),
            modelindex: (s.modelindex != b.modelindex).then_some(s.modelindex),
            modelindex2: (s.modelindex2 != b.modelindex2).then_some(s.modelindex2),
            frame: (s.frame != b.frame).then_some(s.frame),
            skinnum: (s.skinnum != b.skinnum).then_some(s.skinnum),
            effects: (s.effects != b.effects).then_some(s.effects),
            renderfx: (s.renderfx != b.renderfx).then_some(s.renderfx),
            sound: (s.sound != b.sound).then_some(s.sound),
            event: (s.event != 0).then_some(s.event),
        };
        let untouched = EntityDelta { number, ..EntityDelta::default() };
        if d != untouched || !base.entities.contains_key(&number) {
            entities.push(d);
        }
    }
    FrameDelta {
        server_frame: to.server_frame,
        server_time: to.server_time,
        delta_frame: base.server_frame,
        player: to.player,
        entities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q2frame_client::cl_snap::{SnapshotError, SnapshotStore};

    #[test]
    fn one_frame_per_hundred_ms() {
        let mut sv = ScriptedServer::new();
        sv.run_to(0);
        assert_eq!(sv.frame(), 1);
        sv.run_to(250);
        assert_eq!(sv.frame(), 3);
    }

    fn connected_store(sv: &ScriptedServer) -> SnapshotStore {
        let mut store = SnapshotStore::new();
        for b in sv.baselines() {
            store.set_baseline(*b);
        }
        store
    }

    #[test]
    fn deltas_decode_to_the_scripted_world() {
        let mut sv = ScriptedServer::new();
        let mut store = connected_store(&sv);
        // past the rocket's return at frame 40
        for step in 0..45 {
            sv.run_to(step * SERVER_FRAMETIME_MS);
            while let Some(msg) = sv.next_snapshot() {
                if let Err(e) = store.ingest_message(msg) {
                    assert!(matches!(e, SnapshotError::Stale { .. }), "{}", e);
                }
            }
            let n = sv.frame();
            let cur = store.current().unwrap();
            assert_eq!(cur.server_frame, n);
            assert_eq!(cur.entities, build_world(n).entities, "frame {}", n);
        }
        assert_eq!(store.stats().undecodable, 0);
    }

    #[test]
    fn returning_entity_is_encoded_against_its_baseline() {
        let sv = ScriptedServer::new();
        let to = build_world(40);
        let d = diff(&build_world(39), &to, &sv.baselines);
        let rocket = d.entities.iter().find(|e| e.number == ROCKET).unwrap();
        assert_eq!(rocket.modelindex, None);
        assert_eq!(rocket.effects, None);
        assert_eq!(rocket.sound, None);
        // relaunched from its spawn point
        assert_eq!(rocket.origin, None);
        assert_eq!(rocket.old_origin, Some(rocket_origin(39)));
    }

    #[test]
    fn resting_entities_stay_out_of_the_delta() {
        let sv = ScriptedServer::new();
        let d = diff(&build_world(1), &build_world(2), &sv.baselines);
        let numbers: Vec<i32> = d.entities.iter().map(|e| e.number).collect();
        assert!(!numbers.contains(&ARMOR));
        assert!(!numbers.contains(&HUMMER));
        assert!(!numbers.contains(&7));
        let player = d.entities.iter().find(|e| e.number == PLAYER).unwrap();
        assert_eq!(player.old_origin, None);
    }

    #[test]
    fn duplicate_frames_precede_their_successor() {
        let mut sv = ScriptedServer::new();
        let mut store = SnapshotStore::new();
        sv.run_to(24 * SERVER_FRAMETIME_MS);
        while let Some(msg) = sv.next_snapshot() {
            let _ = store.ingest_message(msg);
        }
        assert_eq!(store.stats().stale, 1);
        assert_eq!(store.current().unwrap().server_frame, 25);
    }

    #[test]
    fn events_travel_with_their_frame() {
        let mut sv = ScriptedServer::new();
        sv.run_to(6 * SERVER_FRAMETIME_MS);
        for _ in 0..6 {
            sv.next_snapshot();
        }
        // the launch at frame 1 only
        let early = sv.take_events();
        assert_eq!(early.len(), 2);
        assert!(matches!(early[0], ScriptEvent::MuzzleFlash { entity: PLAYER, .. }));
        sv.next_snapshot();
        let events = sv.take_events();
        assert!(matches!(events[0], ScriptEvent::Temp(TempEvent::Blaster, _)));
    }
}
