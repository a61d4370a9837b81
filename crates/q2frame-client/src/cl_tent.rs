// cl_tent.rs — transient effects: explosions, beams, lasers and the recipes that spawn them

use q2frame_common::q_shared::{
    angle_vectors, vector_add, vector_ma, vector_normalize, vector_subtract, EntityEvent,
    EntityState, RenderFlags, TempEvent, Vec3, ATTN_IDLE, ATTN_NONE, ATTN_NORM, ATTN_STATIC,
    CHAN_AUTO, CHAN_BODY, CHAN_WEAPON, RAD_TO_DEG, SPLASH_SPARKS,
};

use crate::cl_fx::{DlightTable, FxRng, ParticleSystem};
use crate::cl_pool::{Handle, Pool, SpawnError};
use crate::cl_view::SceneAssembler;
use crate::client::{AssetResolver, ClientConfig, ModelHandle, SoundHandle};
use crate::ref_def::Entity;
use crate::snd_dma::SoundEvent;

pub const BEAM_LIFETIME_MS: i32 = 200;
pub const LASER_LIFETIME_MS: i32 = 100;
pub const MUZZLE_FLASH_LIFETIME_MS: i32 = 100;
const MAX_PENDING_SOUNDS: usize = 128;

const SPLASH_COLOR: [i32; 7] = [0x00, 0xe0, 0xb0, 0x50, 0xd0, 0xe0, 0xe8];

// ============================================================
// Types
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpType {
    Misc,
    Flash,
    Poly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Explosion {
    pub exp_type: ExpType,
    pub ent: Entity,
    pub frames: i32,
    pub light: f32,
    pub lightcolor: Vec3,
    pub start: i32, // ms
    pub baseframe: i32,
    pub expire: i32,
    pub sequence: u64,
}

impl Explosion {
    pub fn new(exp_type: ExpType, origin: &Vec3, model: ModelHandle, start: i32) -> Self {
        Self {
            exp_type,
            ent: Entity { model, origin: *origin, alpha: 1.0, ..Entity::default() },
            frames: 1,
            light: 0.0,
            lightcolor: [0.0; 3],
            start,
            baseframe: 0,
            expire: start,
            sequence: 0,
        }
    }

    fn expire_time(&self) -> i32 {
        match self.exp_type {
            ExpType::Flash => self.start + 100,
            _ => self.start + 100 * (self.frames - 1),
        }
    }

    /// Frame, fade and skin at `now`. Only called on live explosions.
    fn animate(&mut self, now: i32, lerpfrac: f32) {
        let frac = (now - self.start) as f32 / 100.0;
        let f = frac.floor() as i32;
        let ent = &mut self.ent;

        match self.exp_type {
            ExpType::Misc => ent.alpha = 1.0 - frac / (self.frames - 1) as f32,
            ExpType::Flash => ent.alpha = 1.0,
            ExpType::Poly => {
                ent.alpha = (16.0 - f as f32) / 16.0;
                if f < 10 {
                    ent.skinnum = (f >> 1).max(0);
                } else {
                    ent.flags |= RenderFlags::TRANSLUCENT;
                    ent.skinnum = if f < 13 { 5 } else { 6 };
                }
            }
        }

        let f = f.max(0);
        ent.oldorigin = ent.origin;
        ent.frame = self.baseframe + f + 1;
        ent.oldframe = self.baseframe + f;
        ent.backlerp = 1.0 - lerpfrac;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Beam {
    pub entity: i32,
    pub dest_entity: i32,
    pub model: ModelHandle,
    pub endtime: i32,
    pub offset: Vec3,
    pub start: Vec3,
    pub end: Vec3,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Laser {
    pub ent: Entity,
    pub endtime: i32,
    pub sequence: u64,
}

/// Which pool a live effect sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectHandle {
    Explosion(Handle),
    Beam(Handle),
    Laser(Handle),
}

/// Borrowed view of one live effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransientEffect<'a> {
    Explosion(&'a Explosion),
    Beam(&'a Beam),
    Laser(&'a Laser),
}

impl TransientEffect<'_> {
    pub fn sequence(&self) -> u64 {
        match self {
            TransientEffect::Explosion(ex) => ex.sequence,
            TransientEffect::Beam(b) => b.sequence,
            TransientEffect::Laser(l) => l.sequence,
        }
    }
}

/// A particle recipe with its placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleBurst {
    Puff { org: Vec3, dir: Vec3, color: i32, count: usize },
    SteadyPuff { org: Vec3, dir: Vec3, color: i32, count: usize },
    ItemRespawn { org: Vec3 },
    Explosion { org: Vec3 },
    BfgExplosion { org: Vec3 },
    BigTeleport { org: Vec3 },
    Blaster { org: Vec3, dir: Vec3 },
    Teleport { org: Vec3 },
    RailTrail { start: Vec3, end: Vec3 },
    BubbleTrail { start: Vec3, end: Vec3 },
}

/// Everything a temp entity message can carry. Each event reads only the
/// fields it needs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TempEntityParams {
    pub pos: Vec3,
    pub pos2: Vec3,
    pub dir: Vec3,
    pub offset: Vec3,
    pub count: i32,
    pub color: i32,
    pub splash: i32,
    pub entity: i32,
    pub dest_entity: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnerStats {
    pub explosions: usize,
    pub beams: usize,
    pub lasers: usize,
    pub particles: usize,
    pub dlights: usize,
    pub refused: u64,
    pub dropped_sounds: u64,
}

// ============================================================
// Registered assets
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
struct TentModels {
    explode: ModelHandle,
    smoke: ModelHandle,
    flash: ModelHandle,
    parasite_segment: ModelHandle,
    grapple_cable: ModelHandle,
    lightning: ModelHandle,
    explo4: ModelHandle,
    bfg_explo: ModelHandle,
}

#[derive(Debug, Clone, Copy, Default)]
struct TentSounds {
    ric: [SoundHandle; 3],
    lashit: SoundHandle,
    spark: [SoundHandle; 3],
    railg: SoundHandle,
    rockexp: SoundHandle,
    grenexp: SoundHandle,
    watrexp: SoundHandle,
    footsteps: [SoundHandle; 4],
    land: SoundHandle,
    fall_short: SoundHandle,
    fall_far: SoundHandle,
    respawn: SoundHandle,
    teleport: SoundHandle,
    bigtele: SoundHandle,
    lightning: SoundHandle,
    muzzle: [SoundHandle; MUZZLE_WEAPONS],
}

// ============================================================
// Muzzle flashes
// ============================================================

pub const MZ_BLASTER: i32 = 0;
pub const MZ_MACHINEGUN: i32 = 1;
pub const MZ_SHOTGUN: i32 = 2;
pub const MZ_RAILGUN: i32 = 6;
pub const MZ_ROCKET: i32 = 7;
pub const MZ_GRENADE: i32 = 8;
pub const MZ_BFG: i32 = 12;
pub const MZ_SSHOTGUN: i32 = 13;
pub const MZ_HYPERBLASTER: i32 = 14;
pub const MZ_SILENCED: i32 = 128;

const MUZZLE_WEAPONS: usize = 9;

/// (code, sound, light colour)
const MUZZLE_TABLE: [(i32, &str, Vec3); MUZZLE_WEAPONS] = [
    (MZ_BLASTER, "weapons/blastf1a.wav", [1.0, 1.0, 0.0]),
    (MZ_MACHINEGUN, "weapons/machgf1b.wav", [1.0, 1.0, 0.0]),
    (MZ_SHOTGUN, "weapons/shotgf1b.wav", [1.0, 1.0, 0.0]),
    (MZ_RAILGUN, "weapons/railgf1a.wav", [0.5, 0.5, 1.0]),
    (MZ_ROCKET, "weapons/rocklf1a.wav", [1.0, 0.5, 0.2]),
    (MZ_GRENADE, "weapons/grenlf1a.wav", [1.0, 0.5, 0.0]),
    (MZ_BFG, "weapons/bfg__f1y.wav", [0.0, 1.0, 0.0]),
    (MZ_SSHOTGUN, "weapons/sshotf1b.wav", [1.0, 1.0, 0.0]),
    (MZ_HYPERBLASTER, "weapons/hyprbf1a.wav", [1.0, 1.0, 0.0]),
];

// ============================================================
// Spawner
// ============================================================

/// Owns the effect pools and everything effects touch: particles, dynamic
/// lights, the random source and the one-shot sounds they start.
pub struct EffectSpawner {
    explosions: Pool<Explosion>,
    beams: Pool<Beam>,
    lasers: Pool<Laser>,
    order: Vec<EffectHandle>,
    next_sequence: u64,
    particles: ParticleSystem,
    dlights: DlightTable,
    rng: FxRng,
    seed: u64,
    models: TentModels,
    sounds: TentSounds,
    pending_sounds: Vec<SoundEvent>,
    dropped_sounds: u64,
}

impl EffectSpawner {
    pub fn new(config: &ClientConfig) -> Self {
        let capacity = config.max_explosions + config.max_beams + config.max_lasers;
        Self {
            explosions: Pool::new("explosion", config.max_explosions),
            beams: Pool::new("beam", config.max_beams),
            lasers: Pool::new("laser", config.max_lasers),
            order: Vec::with_capacity(capacity),
            next_sequence: 0,
            particles: ParticleSystem::new(config.max_particles),
            dlights: DlightTable::default(),
            rng: FxRng::new(config.rng_seed),
            seed: config.rng_seed,
            models: TentModels::default(),
            sounds: TentSounds::default(),
            pending_sounds: Vec::with_capacity(MAX_PENDING_SOUNDS),
            dropped_sounds: 0,
        }
    }

    /// CL_RegisterTEntModels / CL_RegisterTEntSounds
    pub fn register_assets(&mut self, resolver: &mut dyn AssetResolver) {
        let m = &mut self.models;
        m.explode = resolver.resolve_model("models/objects/explode/tris.md2");
        m.smoke = resolver.resolve_model("models/objects/smoke/tris.md2");
        m.flash = resolver.resolve_model("models/objects/flash/tris.md2");
        m.parasite_segment = resolver.resolve_model("models/monsters/parasite/segment/tris.md2");
        m.grapple_cable = resolver.resolve_model("models/ctf/segment/tris.md2");
        m.lightning = resolver.resolve_model("models/proj/lightning/tris.md2");
        m.explo4 = resolver.resolve_model("models/objects/r_explode/tris.md2");
        m.bfg_explo = resolver.resolve_model("sprites/s_bfg2.sp2");

        let s = &mut self.sounds;
        for (i, h) in s.ric.iter_mut().enumerate() {
            *h = resolver.resolve_sound(&format!("world/ric{}.wav", i + 1));
        }
        s.lashit = resolver.resolve_sound("weapons/lashit.wav");
        for (i, h) in s.spark.iter_mut().enumerate() {
            *h = resolver.resolve_sound(&format!("world/spark{}.wav", i + 5));
        }
        s.railg = resolver.resolve_sound("weapons/railgf1a.wav");
        s.rockexp = resolver.resolve_sound("weapons/rocklx1a.wav");
        s.grenexp = resolver.resolve_sound("weapons/grenlx1a.wav");
        s.watrexp = resolver.resolve_sound("weapons/xpld_wat.wav");
        for (i, h) in s.footsteps.iter_mut().enumerate() {
            *h = resolver.resolve_sound(&format!("player/step{}.wav", i + 1));
        }
        s.land = resolver.resolve_sound("player/land1.wav");
        s.fall_short = resolver.resolve_sound("player/fall2.wav");
        s.fall_far = resolver.resolve_sound("player/fall1.wav");
        s.respawn = resolver.resolve_sound("items/respawn1.wav");
        s.teleport = resolver.resolve_sound("misc/tele1.wav");
        s.bigtele = resolver.resolve_sound("misc/bigtele.wav");
        s.lightning = resolver.resolve_sound("weapons/tesla.wav");
        for (h, (_, name, _)) in s.muzzle.iter_mut().zip(MUZZLE_TABLE.iter()) {
            *h = resolver.resolve_sound(name);
        }
    }

    /// CL_ClearTEnts plus the particle and light tables. Reseeds the random source.
    pub fn clear(&mut self) {
        self.explosions.clear();
        self.beams.clear();
        self.lasers.clear();
        self.order.clear();
        self.next_sequence = 0;
        self.particles.clear();
        self.dlights.clear();
        self.pending_sounds.clear();
        self.rng.reseed(self.seed);
    }

    pub fn rng(&mut self) -> &mut FxRng {
        &mut self.rng
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn dlights(&self) -> &DlightTable {
        &self.dlights
    }

    pub fn explosions(&self) -> &Pool<Explosion> {
        &self.explosions
    }

    pub fn beams(&self) -> &Pool<Beam> {
        &self.beams
    }

    pub fn lasers(&self) -> &Pool<Laser> {
        &self.lasers
    }

    pub fn stats(&self) -> SpawnerStats {
        SpawnerStats {
            explosions: self.explosions.live_count(),
            beams: self.beams.live_count(),
            lasers: self.lasers.live_count(),
            particles: self.particles.pool().live_count(),
            dlights: self.dlights.live_count(),
            refused: self.explosions.exhausted_count()
                + self.beams.exhausted_count()
                + self.lasers.exhausted_count()
                + self.particles.pool().exhausted_count(),
            dropped_sounds: self.dropped_sounds,
        }
    }

    /// Live effects in spawn order.
    pub fn effects(&self) -> impl Iterator<Item = TransientEffect<'_>> {
        self.order.iter().filter_map(move |h| match *h {
            EffectHandle::Explosion(x) => self.explosions.get(x).map(TransientEffect::Explosion),
            EffectHandle::Beam(x) => self.beams.get(x).map(TransientEffect::Beam),
            EffectHandle::Laser(x) => self.lasers.get(x).map(TransientEffect::Laser),
        })
    }

    /// Sounds started by effects since the last drain.
    pub fn drain_sounds(&mut self) -> std::vec::Drain<'_, SoundEvent> {
        self.pending_sounds.drain(..)
    }

    fn next_sequence(&mut self) -> u64 {
        let s = self.next_sequence;
        self.next_sequence += 1;
        s
    }

    fn start_sound(&mut self, ev: SoundEvent) {
        if ev.sound.is_none() {
            return;
        }
        if self.pending_sounds.len() >= MAX_PENDING_SOUNDS {
            self.dropped_sounds += 1;
            log::trace!("effect sound queue full");
            return;
        }
        self.pending_sounds.push(ev);
    }

    fn sound_at(&mut self, org: &Vec3, sound: SoundHandle, attenuation: f32) {
        self.start_sound(SoundEvent::at(org, sound, 1.0, attenuation));
    }

    // ============================================================
    // Spawning
    // ============================================================

    pub fn spawn_explosion(&mut self, mut ex: Explosion) -> Result<EffectHandle, SpawnError> {
        ex.expire = ex.expire_time();
        ex.sequence = self.next_sequence;
        let h = EffectHandle::Explosion(self.explosions.alloc(ex)?);
        self.next_sequence();
        self.order.push(h);
        Ok(h)
    }

    /// CL_ParseBeam: a live beam from the same entity with the same model is
    /// updated in place, keeping its handle and order. A beam with a
    /// destination entity (lightning) matches on the (src, dst) pair alone.
    pub fn spawn_beam(&mut self, beam: Beam, now: i32) -> Result<EffectHandle, SpawnError> {
        let existing = self
            .beams
            .iter()
            .find(|(_, b)| {
                b.entity == beam.entity
                    && if beam.dest_entity != 0 { b.dest_entity == beam.dest_entity } else { b.model == beam.model }
            })
            .map(|(h, _)| h);

        if let Some(h) = existing {
            if let Some(b) = self.beams.get_mut(h) {
                b.dest_entity = beam.dest_entity;
                b.model = beam.model;
                b.endtime = now + BEAM_LIFETIME_MS;
                b.start = beam.start;
                b.end = beam.end;
                b.offset = beam.offset;
            }
            return Ok(EffectHandle::Beam(h));
        }

        let b = Beam { endtime: now + BEAM_LIFETIME_MS, sequence: self.next_sequence, ..beam };
        let h = EffectHandle::Beam(self.beams.alloc(b)?);
        self.next_sequence();
        self.order.push(h);
        Ok(h)
    }

    /// CL_ParseLaser: one of the four packed palette bytes per laser.
    pub fn spawn_laser(&mut self, start: &Vec3, end: &Vec3, colors: u32, now: i32) -> Result<EffectHandle, SpawnError> {
        let shift = (self.rng.qrand() % 4) * 8;
        let ent = Entity {
            flags: RenderFlags::TRANSLUCENT | RenderFlags::BEAM,
            origin: *start,
            oldorigin: *end,
            alpha: 0.30,
            skinnum: ((colors >> shift) & 0xff) as i32,
            model: ModelHandle::NONE,
            frame: 4,
            ..Entity::default()
        };
        let laser = Laser { ent, endtime: now + LASER_LIFETIME_MS, sequence: self.next_sequence };
        let h = EffectHandle::Laser(self.lasers.alloc(laser)?);
        self.next_sequence();
        self.order.push(h);
        Ok(h)
    }

    /// Returns how many particles were spawned. Partial bursts succeed.
    pub fn spawn_particle_burst(&mut self, burst: ParticleBurst, now: i32) -> Result<usize, SpawnError> {
        let (ps, rng) = (&mut self.particles, &mut self.rng);
        match burst {
            ParticleBurst::Puff { org, dir, color, count } => ps.particle_effect(rng, now, &org, &dir, color, count),
            ParticleBurst::SteadyPuff { org, dir, color, count } => {
                ps.particle_effect2(rng, now, &org, &dir, color, count)
            }
            ParticleBurst::ItemRespawn { org } => ps.item_respawn_particles(rng, now, &org),
            ParticleBurst::Explosion { org } => ps.explosion_particles(rng, now, &org),
            ParticleBurst::BfgExplosion { org } => ps.bfg_explosion_particles(rng, now, &org),
            ParticleBurst::BigTeleport { org } => ps.big_teleport_particles(rng, now, &org),
            ParticleBurst::Blaster { org, dir } => ps.blaster_particles(rng, now, &org, &dir),
            ParticleBurst::Teleport { org } => ps.teleport_particles(rng, now, &org),
            ParticleBurst::RailTrail { start, end } => ps.rail_trail(rng, now, &start, &end),
            ParticleBurst::BubbleTrail { start, end } => ps.bubble_trail(rng, now, &start, &end),
        }
    }

    fn burst(&mut self, burst: ParticleBurst, now: i32) {
        if let Err(e) = self.spawn_particle_burst(burst, now) {
            log::trace!("{}", e);
        }
    }

    fn explosion(&mut self, ex: Explosion) {
        if let Err(e) = self.spawn_explosion(ex) {
            log::trace!("{}", e);
        }
    }

    /// CL_SmokeAndFlash
    pub fn smoke_and_flash(&mut self, origin: &Vec3, server_time: i32) {
        let mut smoke = Explosion::new(ExpType::Misc, origin, self.models.smoke, server_time - 100);
        smoke.frames = 4;
        smoke.ent.flags = RenderFlags::TRANSLUCENT;
        self.explosion(smoke);

        let mut flash = Explosion::new(ExpType::Flash, origin, self.models.flash, server_time - 100);
        flash.frames = 2;
        flash.ent.flags = RenderFlags::FULLBRIGHT;
        self.explosion(flash);
    }

    fn ricochet(&mut self, pos: &Vec3) {
        let cnt = self.rng.qrand() & 15;
        if (1..=3).contains(&cnt) {
            let sound = self.sounds.ric[(cnt - 1) as usize];
            self.sound_at(pos, sound, ATTN_NORM);
        }
    }

    fn rocket_style(&mut self, pos: &Vec3, server_time: i32, frames: i32, baseframe: i32) {
        let mut ex = Explosion::new(ExpType::Poly, pos, self.models.explo4, server_time - 100);
        ex.ent.flags = RenderFlags::FULLBRIGHT;
        ex.light = 350.0;
        ex.lightcolor = [1.0, 0.5, 0.5];
        ex.ent.angles[1] = (self.rng.qrand() % 360) as f32;
        ex.frames = frames;
        ex.baseframe = baseframe;
        self.explosion(ex);
    }

    // ============================================================
    // Discrete events
    // ============================================================

    /// CL_ParseTEnt, with the message already decoded.
    pub fn temp_entity(&mut self, event: TempEvent, p: &TempEntityParams, now: i32, server_time: i32) {
        use TempEvent::*;
        match event {
            Blood => self.burst(ParticleBurst::Puff { org: p.pos, dir: p.dir, color: 0xe8, count: 60 }, now),

            Gunshot | Sparks | BulletSparks => {
                let (color, count) = if event == Gunshot { (0, 40) } else { (0xe0, 6) };
                self.burst(ParticleBurst::Puff { org: p.pos, dir: p.dir, color, count }, now);
                if event != Sparks {
                    self.smoke_and_flash(&p.pos, server_time);
                    self.ricochet(&p.pos);
                }
            }

            ScreenSparks | ShieldSparks => {
                let color = if event == ScreenSparks { 0xd0 } else { 0xb0 };
                self.burst(ParticleBurst::Puff { org: p.pos, dir: p.dir, color, count: 40 }, now);
                self.sound_at(&p.pos, self.sounds.lashit, ATTN_NORM);
            }

            Shotgun => {
                self.burst(ParticleBurst::Puff { org: p.pos, dir: p.dir, color: 0, count: 20 }, now);
                self.smoke_and_flash(&p.pos, server_time);
            }

            Splash => {
                let r = p.splash;
                let color = usize::try_from(r).ok().and_then(|i| SPLASH_COLOR.get(i)).copied().unwrap_or(0x00);
                let count = p.count.max(0) as usize;
                self.burst(ParticleBurst::Puff { org: p.pos, dir: p.dir, color, count }, now);
                if r == SPLASH_SPARKS {
                    let sound = match self.rng.qrand() & 3 {
                        0 => self.sounds.spark[0],
                        1 => self.sounds.spark[1],
                        _ => self.sounds.spark[2],
                    };
                    self.sound_at(&p.pos, sound, ATTN_STATIC);
                }
            }

            LaserSparks => {
                let count = p.count.max(0) as usize;
                self.burst(ParticleBurst::SteadyPuff { org: p.pos, dir: p.dir, color: p.color, count }, now);
            }

            Blaster => {
                self.burst(ParticleBurst::Blaster { org: p.pos, dir: p.dir }, now);
                let mut ex = Explosion::new(ExpType::Misc, &p.pos, self.models.explode, server_time - 100);
                ex.ent.angles[0] = p.dir[2].clamp(-1.0, 1.0).acos() * RAD_TO_DEG;
                ex.ent.angles[1] = if p.dir[0] != 0.0 {
                    p.dir[1].atan2(p.dir[0]) * RAD_TO_DEG
                } else if p.dir[1] > 0.0 {
                    90.0
                } else if p.dir[1] < 0.0 {
                    270.0
                } else {
                    0.0
                };
                ex.ent.flags = RenderFlags::FULLBRIGHT | RenderFlags::TRANSLUCENT;
                ex.light = 150.0;
                ex.lightcolor = [1.0, 1.0, 0.0];
                ex.frames = 4;
                self.explosion(ex);
                self.sound_at(&p.pos, self.sounds.lashit, ATTN_NORM);
            }

            Railtrail => {
                self.burst(ParticleBurst::RailTrail { start: p.pos, end: p.pos2 }, now);
                self.sound_at(&p.pos2, self.sounds.railg, ATTN_NORM);
            }

            Explosion2 | GrenadeExplosion | GrenadeExplosionWater => {
                self.rocket_style(&p.pos, server_time, 19, 30);
                self.burst(ParticleBurst::Explosion { org: p.pos }, now);
                let sound = if event == GrenadeExplosionWater { self.sounds.watrexp } else { self.sounds.grenexp };
                self.sound_at(&p.pos, sound, ATTN_NORM);
            }

            Explosion1 | RocketExplosion | RocketExplosionWater => {
                let baseframe = if self.rng.frand() < 0.5 { 15 } else { 0 };
                self.rocket_style(&p.pos, server_time, 15, baseframe);
                self.burst(ParticleBurst::Explosion { org: p.pos }, now);
                let sound = if event == RocketExplosionWater { self.sounds.watrexp } else { self.sounds.rockexp };
                self.sound_at(&p.pos, sound, ATTN_NORM);
            }

            BfgExplosion => {
                let mut ex = Explosion::new(ExpType::Poly, &p.pos, self.models.bfg_explo, server_time - 100);
                ex.ent.flags = RenderFlags::FULLBRIGHT | RenderFlags::TRANSLUCENT;
                ex.ent.alpha = 0.30;
                ex.light = 350.0;
                ex.lightcolor = [0.0, 1.0, 0.0];
                ex.frames = 4;
                self.explosion(ex);
            }

            BfgBigexplosion => self.burst(ParticleBurst::BfgExplosion { org: p.pos }, now),

            BfgLaser => {
                if let Err(e) = self.spawn_laser(&p.pos, &p.pos2, 0xd0d1d2d3, now) {
                    log::trace!("{}", e);
                }
            }

            Bubbletrail => self.burst(ParticleBurst::BubbleTrail { start: p.pos, end: p.pos2 }, now),

            ParasiteAttack | MedicCableAttack | GrappleCable => {
                let (model, offset) = if event == GrappleCable {
                    (self.models.grapple_cable, p.offset)
                } else {
                    (self.models.parasite_segment, [0.0; 3])
                };
                let beam = Beam { entity: p.entity, model, offset, start: p.pos, end: p.pos2, ..Beam::default() };
                if let Err(e) = self.spawn_beam(beam, now) {
                    log::trace!("{}", e);
                }
            }

            Bosstport => {
                self.burst(ParticleBurst::BigTeleport { org: p.pos }, now);
                self.sound_at(&p.pos, self.sounds.bigtele, ATTN_NONE);
            }

            Lightning => {
                let beam = Beam {
                    entity: p.entity,
                    dest_entity: p.dest_entity,
                    model: self.models.lightning,
                    start: p.pos,
                    end: p.pos2,
                    ..Beam::default()
                };
                if let Err(e) = self.spawn_beam(beam, now) {
                    log::trace!("{}", e);
                }
                let sound = self.sounds.lightning;
                self.start_sound(SoundEvent::on_entity(p.entity, CHAN_WEAPON, sound, 1.0, ATTN_NORM));
            }
        }
    }

    /// CL_EntityEvent: the event carried by an entity in a freshly accepted snapshot.
    pub fn entity_event(&mut self, ent: &EntityState, now: i32) {
        let on_entity = |channel, sound, attenuation| SoundEvent::on_entity(ent.number, channel, sound, 1.0, attenuation);
        match EntityEvent::from_i32(ent.event) {
            EntityEvent::ItemRespawn => {
                self.start_sound(on_entity(CHAN_WEAPON, self.sounds.respawn, ATTN_IDLE));
                self.burst(ParticleBurst::ItemRespawn { org: ent.origin }, now);
            }
            EntityEvent::PlayerTeleport => {
                self.start_sound(on_entity(CHAN_WEAPON, self.sounds.teleport, ATTN_IDLE));
                self.burst(ParticleBurst::Teleport { org: ent.origin }, now);
            }
            EntityEvent::Footstep => {
                let step = self.sounds.footsteps[(self.rng.qrand() & 3) as usize];
                self.start_sound(on_entity(CHAN_BODY, step, ATTN_NORM));
            }
            EntityEvent::FallShort => self.start_sound(on_entity(CHAN_AUTO, self.sounds.land, ATTN_NORM)),
            EntityEvent::Fall => self.start_sound(on_entity(CHAN_AUTO, self.sounds.fall_short, ATTN_NORM)),
            EntityEvent::FallFar => self.start_sound(on_entity(CHAN_AUTO, self.sounds.fall_far, ATTN_NORM)),
            EntityEvent::None | EntityEvent::OtherTeleport => {}
        }
    }

    /// CL_ParseMuzzleFlash: light ahead of the firing entity plus the weapon sound.
    pub fn muzzle_flash(&mut self, entity: i32, weapon: i32, origin: &Vec3, angles: &Vec3, now: i32) {
        let silenced = weapon & MZ_SILENCED != 0;
        let code = weapon & !MZ_SILENCED;

        let (fv, rv, _) = angle_vectors(angles);
        let org = vector_ma(&vector_ma(origin, 18.0, &fv), 16.0, &rv);
        let base = if silenced { 100.0 } else { 200.0 };
        let radius = base + (self.rng.qrand() & 31) as f32;

        let entry = MUZZLE_TABLE.iter().position(|(c, _, _)| *c == code);
        let color = entry.map_or([1.0, 1.0, 0.0], |i| MUZZLE_TABLE[i].2);
        let dl = self.dlights.new_dlight(entity, &org, radius, MUZZLE_FLASH_LIFETIME_MS, now);
        dl.color = color;
        dl.minlight = 32.0;

        if let Some(i) = entry {
            let volume = if silenced { 0.2 } else { 1.0 };
            self.start_sound(SoundEvent::on_entity(entity, CHAN_WEAPON, self.sounds.muzzle[i], volume, ATTN_NORM));
        } else {
            log::trace!("muzzle flash {} has no sound", code);
        }
    }

    // ============================================================
    // Aging
    // ============================================================

    /// Reap expired effects, animate the rest, then run particles and lights.
    pub fn tick(&mut self, now: i32, lerpfrac: f32, frametime: f32) {
        self.explosions.reap(|ex| ex.expire <= now);
        self.beams.reap(|b| b.endtime <= now);
        self.lasers.reap(|l| l.endtime <= now);

        let (ex, bm, lz) = (&self.explosions, &self.beams, &self.lasers);
        self.order.retain(|h| match *h {
            EffectHandle::Explosion(x) => ex.contains(x),
            EffectHandle::Beam(x) => bm.contains(x),
            EffectHandle::Laser(x) => lz.contains(x),
        });

        for h in &self.order {
            if let EffectHandle::Explosion(x) = *h {
                if let Some(ex) = self.explosions.get_mut(x) {
                    ex.animate(now, lerpfrac);
                }
            }
        }

        self.particles.tick(now);
        self.dlights.run(now, frametime);
    }

    // ============================================================
    // Scene contribution
    // ============================================================

    /// CL_AddTEnts: beams, explosions and lasers in spawn order. `lookup`
    /// gives an entity's interpolated origin for beam endpoints.
    pub fn add_tents<F>(&mut self, scene: &mut SceneAssembler, vieworg: &Vec3, player_entity: i32, now: i32, lookup: F)
    where
        F: Fn(i32) -> Option<Vec3>,
    {
        for i in 0..self.order.len() {
            match self.order[i] {
                EffectHandle::Explosion(x) => {
                    let Some(ex) = self.explosions.get(x) else { continue };
                    if ex.light != 0.0 {
                        let c = ex.lightcolor;
                        scene.v_add_light(&ex.ent.origin, ex.light * ex.ent.alpha, c[0], c[1], c[2], ex.expire - now);
                    }
                    scene.v_add_entity(&ex.ent);
                }
                EffectHandle::Laser(x) => {
                    if let Some(l) = self.lasers.get(x) {
                        scene.v_add_entity(&l.ent);
                    }
                }
                EffectHandle::Beam(x) => {
                    let Some(b) = self.beams.get(x).copied() else { continue };
                    self.add_beam(scene, &b, vieworg, player_entity, &lookup);
                }
            }
        }
    }

    fn add_beam<F>(&mut self, scene: &mut SceneAssembler, b: &Beam, vieworg: &Vec3, player_entity: i32, lookup: &F)
    where
        F: Fn(i32) -> Option<Vec3>,
    {
        if b.model.is_none() {
            return;
        }

        let start = if b.entity == player_entity {
            let mut s = *vieworg;
            s[2] -= 22.0;
            s
        } else if b.entity > 0 {
            lookup(b.entity).unwrap_or(b.start)
        } else {
            b.start
        };
        let end = if b.dest_entity > 0 { lookup(b.dest_entity).unwrap_or(b.end) } else { b.end };

        let mut org = vector_add(&start, &b.offset);
        let mut dist = vector_subtract(&end, &org);
        let (yaw, pitch) = calc_beam_angles(&dist);

        let lightning = b.model == self.models.lightning;
        let mut d = vector_normalize(&mut dist);
        let model_length = if lightning { 35.0 } else { 30.0 };
        let steps = (d / model_length).ceil();
        let len = if steps > 1.0 { (d - model_length) / (steps - 1.0) } else { 0.0 };

        while d > 0.0 {
            let roll = (self.rng.qrand() % 360) as f32;
            // lightning segments are modeled pointing back at the source
            let (angles, flags) = if lightning {
                ([-pitch, yaw + 180.0, roll], RenderFlags::FULLBRIGHT)
            } else {
                ([pitch, yaw, roll], RenderFlags::empty())
            };
            let ent = Entity { origin: org, model: b.model, angles, flags, ..Entity::default() };
            if !scene.v_add_entity(&ent) {
                return;
            }
            org = vector_ma(&org, len, &dist);
            d -= model_length;
        }
    }
}

/// Pitch and yaw for a beam direction vector, as (yaw, pitch).
fn calc_beam_angles(dist: &Vec3) -> (f32, f32) {
    if dist[1] == 0.0 && dist[0] == 0.0 {
        (0.0, if dist[2] > 0.0 { 90.0 } else { 270.0 })
    } else {
        let mut y = if dist[0] != 0.0 {
            dist[1].atan2(dist[0]) * RAD_TO_DEG
        } else if dist[1] > 0.0 {
            90.0
        } else {
            270.0
        };
        if y < 0.0 {
            y += 360.0;
        }
        let forward = (dist[0] * dist[0] + dist[1] * dist[1]).sqrt();
        let mut p = dist[2].atan2(forward) * -RAD_TO_DEG;
        if p < 0.0 {
            p += 360.0;
        }
        (y, p)
    }
}
