// cl_fx.rs — particles, dynamic lights, light styles and the effect random source

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel-particles")]
use rayon::prelude::*;

use q2frame_common::common::com_printf;
use q2frame_common::q_shared::{
    make_normal_vectors, vector_ma, vector_normalize, vector_scale, vector_subtract,
    Vec3, MAX_LIGHTSTYLES, MAX_QPATH,
};

use crate::cl_pool::{Handle, Pool, SpawnError};
use crate::client::{BLASTER_PARTICLE_COLOR, INSTANT_PARTICLE, MAX_DLIGHTS, PARTICLE_GRAVITY};
use crate::ref_def::{DLight, Particle};

// ============================================================
// Random source
// ============================================================

/// Seeded generator behind every random choice an effect makes.
/// Same seed and same call sequence give the same effects.
#[derive(Debug, Clone)]
pub struct FxRng {
    rng: StdRng,
}

impl FxRng {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// 0..=0x7fff
    pub fn qrand(&mut self) -> i32 {
        self.rng.gen_range(0..0x8000)
    }

    /// [0, 1)
    pub fn frand(&mut self) -> f32 {
        self.qrand() as f32 / 32768.0
    }

    /// [-1, 1)
    pub fn crand(&mut self) -> f32 {
        self.qrand() as f32 / 16384.0 - 1.0
    }
}

// ============================================================
// Particles
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CParticle {
    pub time: f32, // spawn, ms
    pub org: Vec3,
    pub vel: Vec3,
    pub accel: Vec3,
    pub color: f32,
    pub alpha: f32,
    pub alphavel: f32,
}

impl CParticle {
    fn at(time: i32) -> Self {
        Self {
            time: time as f32,
            accel: [0.0, 0.0, -PARTICLE_GRAVITY],
            alpha: 1.0,
            ..Self::default()
        }
    }

    /// Position and alpha at `now`, or None once faded out.
    fn evaluate(&self, now: f32) -> Option<(Particle, bool)> {
        let time = (now - self.time) * 0.001;
        let instant = self.alphavel == INSTANT_PARTICLE;
        let alpha = if instant { self.alpha } else { self.alpha + time * self.alphavel };
        if alpha <= 0.0 {
            return None;
        }
        let time2 = time * time;
        let origin = [
            self.org[0] + self.vel[0] * time + self.accel[0] * time2,
            self.org[1] + self.vel[1] * time + self.accel[1] * time2,
            self.org[2] + self.vel[2] * time + self.accel[2] * time2,
        ];
        Some((Particle { origin, color: self.color as i32, alpha: alpha.min(1.0) }, instant))
    }
}

/// Every particle is one pool slot. Bursts are flattened on spawn, and
/// `order` keeps spawn order for emission.
pub struct ParticleSystem {
    pool: Pool<CParticle>,
    order: Vec<Handle>,
    scratch: Vec<Option<(Particle, bool)>>,
    visible: Vec<Particle>,
}

impl ParticleSystem {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Pool::new("particle", capacity),
            order: Vec::with_capacity(capacity),
            scratch: Vec::with_capacity(capacity),
            visible: Vec::with_capacity(capacity),
        }
    }

    pub fn pool(&self) -> &Pool<CParticle> {
        &self.pool
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.order.clear();
        self.scratch.clear();
        self.visible.clear();
    }

    pub fn spawn(&mut self, p: CParticle) -> Result<Handle, SpawnError> {
        let h = self.pool.alloc(p)?;
        self.order.push(h);
        Ok(h)
    }

    /// Spawn up to `count`, stopping when the pool fills. Only a burst that
    /// got nothing in reports exhaustion.
    fn burst(
        &mut self,
        count: usize,
        rng: &mut FxRng,
        mut make: impl FnMut(usize, &mut FxRng) -> CParticle,
    ) -> Result<usize, SpawnError> {
        let mut spawned = 0;
        for i in 0..count {
            match self.spawn(make(i, rng)) {
                Ok(_) => spawned += 1,
                Err(e) if spawned == 0 => return Err(e),
                Err(_) => break,
            }
        }
        if spawned < count {
            log::trace!("particle burst truncated: {} of {}", spawned, count);
        }
        Ok(spawned)
    }

    /// Advance every particle to `now`. Faded particles go back to the pool
    /// at once; survivors are kept in spawn order for `add_particles`.
    pub fn tick(&mut self, now: i32) {
        let now = now as f32;
        let pool = &self.pool;
        #[cfg(feature = "parallel-particles")]
        self.order
            .par_iter()
            .map(|&h| pool.get(h).and_then(|p| p.evaluate(now)))
            .collect_into_vec(&mut self.scratch);
        #[cfg(not(feature = "parallel-particles"))]
        {
            self.scratch.clear();
            self.scratch
                .extend(self.order.iter().map(|&h| pool.get(h).and_then(|p| p.evaluate(now))));
        }

        self.visible.clear();
        for (&h, result) in self.order.iter().zip(self.scratch.iter()) {
            match result {
                Some((particle, instant)) => {
                    self.visible.push(*particle);
                    if *instant {
                        // shown once, gone next frame
                        if let Some(p) = self.pool.get_mut(h) {
                            p.alpha = 0.0;
                            p.alphavel = 0.0;
                        }
                    }
                }
                None => {
                    self.pool.release(h);
                }
            }
        }
        let scratch = &self.scratch;
        let mut i = 0;
        self.order.retain(|_| {
            let keep = scratch[i].is_some();
            i += 1;
            keep
        });
    }

    /// CL_AddParticles
    pub fn add_particles<F>(&self, mut add_particle_fn: F)
    where
        F: FnMut(&Particle),
    {
        for p in &self.visible {
            add_particle_fn(p);
        }
    }

    // ============================================================
    // Recipes
    // ============================================================

    /// Wall impact puffs.
    pub fn particle_effect(&mut self, rng: &mut FxRng, time: i32, org: &Vec3, dir: &Vec3, color: i32, count: usize) -> Result<usize, SpawnError> {
        let (org, dir) = (*org, *dir);
        self.burst(count, rng, |_, rng| {
            let mut p = CParticle::at(time);
            let d = (rng.qrand() & 31) as f32;
            p.color = (color + (rng.qrand() & 7)) as f32;
            for j in 0..3 {
                p.org[j] = org[j] + ((rng.qrand() & 7) - 4) as f32 + d * dir[j];
                p.vel[j] = rng.crand() * 20.0;
            }
            p.alphavel = -1.0 / (0.5 + rng.frand() * 0.3);
            p
        })
    }

    /// Single-colour puffs.
    pub fn particle_effect2(&mut self, rng: &mut FxRng, time: i32, org: &Vec3, dir: &Vec3, color: i32, count: usize) -> Result<usize, SpawnError> {
        let (org, dir) = (*org, *dir);
        self.burst(count, rng, |_, rng| {
            let mut p = CParticle::at(time);
            let d = (rng.qrand() & 7) as f32;
            p.color = color as f32;
            for j in 0..3 {
                p.org[j] = org[j] + ((rng.qrand() & 7) - 4) as f32 + d * dir[j];
                p.vel[j] = rng.crand() * 20.0;
            }
            p.alphavel = -1.0 / (0.5 + rng.frand() * 0.3);
            p
        })
    }

    pub fn item_respawn_particles(&mut self, rng: &mut FxRng, time: i32, org: &Vec3) -> Result<usize, SpawnError> {
        let org = *org;
        self.burst(64, rng, |_, rng| {
            let mut p = CParticle::at(time);
            p.color = (0xd4 + (rng.qrand() & 3)) as f32; // green
            for j in 0..3 {
                p.org[j] = org[j] + rng.crand() * 8.0;
                p.vel[j] = rng.crand() * 8.0;
            }
            p.accel[2] = -PARTICLE_GRAVITY * 0.2;
            p.alphavel = -1.0 / (1.0 + rng.frand() * 0.3);
            p
        })
    }

    fn fireball(&mut self, rng: &mut FxRng, time: i32, org: &Vec3, base_color: i32) -> Result<usize, SpawnError> {
        let org = *org;
        self.burst(256, rng, |_, rng| {
            let mut p = CParticle::at(time);
            p.color = (base_color + (rng.qrand() & 7)) as f32;
            for j in 0..3 {
                p.org[j] = org[j] + ((rng.qrand() % 32) - 16) as f32;
                p.vel[j] = ((rng.qrand() % 384) - 192) as f32;
            }
            p.alphavel = -0.8 / (0.5 + rng.frand() * 0.3);
            p
        })
    }

    pub fn explosion_particles(&mut self, rng: &mut FxRng, time: i32, org: &Vec3) -> Result<usize, SpawnError> {
        self.fireball(rng, time, org, 0xe0)
    }

    pub fn bfg_explosion_particles(&mut self, rng: &mut FxRng, time: i32, org: &Vec3) -> Result<usize, SpawnError> {
        self.fireball(rng, time, org, 0xd0)
    }

    pub fn big_teleport_particles(&mut self, rng: &mut FxRng, time: i32, org: &Vec3) -> Result<usize, SpawnError> {
        const COLORTABLE: [i32; 4] = [2 * 8, 13 * 8, 21 * 8, 18 * 8];
        let org = *org;
        self.burst(4096, rng, |_, rng| {
            let mut p = CParticle::at(time);
            p.color = COLORTABLE[(rng.qrand() & 3) as usize] as f32;

            let angle = PI * 2.0 * (rng.qrand() & 1023) as f32 / 1023.0;
            let dist = (rng.qrand() & 31) as f32;
            let (s, c) = angle.sin_cos();
            p.org[0] = org[0] + c * dist;
            p.vel[0] = c * (70.0 + (rng.qrand() & 63) as f32);
            p.accel[0] = -c * 100.0;

            p.org[1] = org[1] + s * dist;
            p.vel[1] = s * (70.0 + (rng.qrand() & 63) as f32);
            p.accel[1] = -s * 100.0;

            p.org[2] = org[2] + 8.0 + (rng.qrand() % 90) as f32;
            p.vel[2] = -100.0 + (rng.qrand() & 31) as f32;
            p.accel[2] = PARTICLE_GRAVITY * 4.0;
            p.alphavel = -0.3 / (0.5 + rng.frand() * 0.3);
            p
        })
    }

    pub fn blaster_particles(&mut self, rng: &mut FxRng, time: i32, org: &Vec3, dir: &Vec3) -> Result<usize, SpawnError> {
        let (org, dir) = (*org, *dir);
        self.burst(40, rng, |_, rng| {
            let mut p = CParticle::at(time);
            p.color = (BLASTER_PARTICLE_COLOR + (rng.qrand() & 7)) as f32;
            let d = (rng.qrand() & 15) as f32;
            for j in 0..3 {
                p.org[j] = org[j] + ((rng.qrand() & 7) - 4) as f32 + d * dir[j];
                p.vel[j] = dir[j] * 30.0 + rng.crand() * 40.0;
            }
            p.alphavel = -1.0 / (0.5 + rng.frand() * 0.3);
            p
        })
    }

    /// Teleporter fountain on a 9x9x13 grid.
    pub fn teleport_particles(&mut self, rng: &mut FxRng, time: i32, org: &Vec3) -> Result<usize, SpawnError> {
        let org = *org;
        self.burst(9 * 9 * 13, rng, |n, rng| {
            let i = (n / (9 * 13)) as i32 * 4 - 16;
            let j = ((n / 13) % 9) as i32 * 4 - 16;
            let k = (n % 13) as i32 * 4 - 16;

            let mut p = CParticle::at(time);
            p.color = (7 + (rng.qrand() & 7)) as f32;
            p.alphavel = -1.0 / (0.3 + (rng.qrand() & 7) as f32 * 0.02);
            p.org[0] = org[0] + i as f32 + (rng.qrand() & 3) as f32;
            p.org[1] = org[1] + j as f32 + (rng.qrand() & 3) as f32;
            p.org[2] = org[2] + k as f32 + (rng.qrand() & 3) as f32;

            let mut dir = [j as f32 * 8.0, i as f32 * 8.0, k as f32 * 8.0];
            vector_normalize(&mut dir);
            let vel = 50.0 + (rng.qrand() & 63) as f32;
            p.vel = vector_scale(&dir, vel);
            p
        })
    }

    /// Spiral plus core.
    pub fn rail_trail(&mut self, rng: &mut FxRng, time: i32, start: &Vec3, end: &Vec3) -> Result<usize, SpawnError> {
        let mut vec = vector_subtract(end, start);
        let len = vector_normalize(&mut vec);
        let (right, up) = make_normal_vectors(&vec);
        let start = *start;
        let steps = len.max(0.0) as usize;

        let spiral = self.burst(steps, rng, |i, rng| {
            let mut p = CParticle::at(time);
            p.accel = [0.0; 3];
            let d = i as f32 * 0.1;
            let (s, c) = d.sin_cos();
            let dir = vector_ma(&vector_scale(&right, c), s, &up);
            let mov = vector_ma(&start, i as f32, &vec);
            p.alphavel = -1.0 / (1.0 + rng.frand() * 0.2);
            p.color = (0x74 + (rng.qrand() & 7)) as f32;
            p.org = vector_ma(&mov, 3.0, &dir);
            p.vel = vector_scale(&dir, 6.0);
            p
        })?;

        let core_steps = (len.max(0.0) / 0.75) as usize;
        let core = self.burst(core_steps, rng, |i, rng| {
            let mut p = CParticle::at(time);
            p.accel = [0.0; 3];
            let mov = vector_ma(&start, i as f32 * 0.75, &vec);
            p.alphavel = -1.0 / (0.6 + rng.frand() * 0.2);
            p.color = (rng.qrand() & 15) as f32;
            for j in 0..3 {
                p.org[j] = mov[j] + rng.crand() * 3.0;
                p.vel[j] = rng.crand() * 3.0;
            }
            p
        });
        Ok(spiral + core.unwrap_or(0))
    }

    pub fn bubble_trail(&mut self, rng: &mut FxRng, time: i32, start: &Vec3, end: &Vec3) -> Result<usize, SpawnError> {
        const DEC: f32 = 32.0;
        let mut vec = vector_subtract(end, start);
        let len = vector_normalize(&mut vec);
        let step = vector_scale(&vec, DEC);
        let start = *start;
        let count = (len.max(0.0) / DEC).ceil() as usize;

        self.burst(count, rng, |i, rng| {
            let mut p = CParticle::at(time);
            p.accel = [0.0; 3];
            let mov = vector_ma(&start, i as f32, &step);
            p.alphavel = -1.0 / (1.0 + rng.frand() * 0.2);
            p.color = (4 + (rng.qrand() & 7)) as f32;
            for j in 0..3 {
                p.org[j] = mov[j] + rng.crand() * 2.0;
                p.vel[j] = rng.crand() * 5.0;
            }
            p.vel[2] += 6.0;
            p
        })
    }

    /// One-frame particle, e.g. a laser endpoint.
    pub fn instant_particle(&mut self, time: i32, org: &Vec3, color: i32) -> Result<Handle, SpawnError> {
        let mut p = CParticle::at(time);
        p.org = *org;
        p.accel = [0.0; 3];
        p.color = color as f32;
        p.alphavel = INSTANT_PARTICLE;
        self.spawn(p)
    }
}

// ============================================================
// Dynamic lights
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CDlight {
    pub key: i32,
    pub color: Vec3,
    pub origin: Vec3,
    pub radius: f32,
    pub die: i32, // ms
    pub decay: f32,
    pub minlight: f32,
}

#[derive(Debug, Clone)]
pub struct DlightTable {
    lights: Vec<CDlight>,
}

impl Default for DlightTable {
    fn default() -> Self {
        Self { lights: vec![CDlight::default(); MAX_DLIGHTS] }
    }
}

impl DlightTable {
    pub fn clear(&mut self) {
        self.lights.fill(CDlight::default());
    }

    /// Same key first, then anything dead, then slot 0.
    pub fn alloc(&mut self, key: i32, now: i32) -> &mut CDlight {
        let idx = (key != 0)
            .then(|| self.lights.iter().position(|dl| dl.key == key))
            .flatten()
            .or_else(|| self.lights.iter().position(|dl| dl.die < now))
            .unwrap_or(0);
        self.lights[idx] = CDlight { key, ..CDlight::default() };
        &mut self.lights[idx]
    }

    pub fn new_dlight(&mut self, key: i32, origin: &Vec3, radius: f32, duration_ms: i32, now: i32) -> &mut CDlight {
        let dl = self.alloc(key, now);
        dl.origin = *origin;
        dl.radius = radius;
        dl.die = now + duration_ms;
        dl
    }

    pub fn run(&mut self, now: i32, frametime: f32) {
        for dl in self.lights.iter_mut() {
            if dl.radius == 0.0 {
                continue;
            }
            if dl.die < now {
                dl.radius = 0.0;
                continue;
            }
            dl.radius = (dl.radius - frametime * dl.decay).max(0.0);
        }
    }

    pub fn live_count(&self) -> usize {
        self.lights.iter().filter(|dl| dl.radius > 0.0).count()
    }

    /// CL_AddDLights: each live light with its remaining lifetime in ms.
    pub fn add_dlights<F>(&self, now: i32, mut add_light_fn: F)
    where
        F: FnMut(&DLight, i32),
    {
        for dl in self.lights.iter().filter(|dl| dl.radius > 0.0) {
            let light = DLight { origin: dl.origin, color: dl.color, intensity: dl.radius };
            add_light_fn(&light, dl.die - now);
        }
    }
}

// ============================================================
// Light styles
// ============================================================

#[derive(Clone, Debug)]
pub struct CLightStyle {
    length: usize,
    value: [f32; 3],
    map: [f32; MAX_QPATH],
}

impl Default for CLightStyle {
    fn default() -> Self {
        Self { length: 0, value: [1.0; 3], map: [0.0; MAX_QPATH] }
    }
}

#[derive(Clone, Debug)]
pub struct LightStyleTable {
    styles: Vec<CLightStyle>,
    lastofs: i32,
}

impl Default for LightStyleTable {
    fn default() -> Self {
        Self { styles: vec![CLightStyle::default(); MAX_LIGHTSTYLES], lastofs: -1 }
    }
}

impl LightStyleTable {
    pub fn clear(&mut self) {
        self.styles.fill(CLightStyle::default());
        self.lastofs = -1;
    }

    /// 'a' is dark, 'm' is normal, 'z' is double bright.
    pub fn set_lightstyle(&mut self, i: usize, s: &str) {
        let Some(style) = self.styles.get_mut(i) else {
            com_printf(&format!("lightstyle {} out of range\n", i));
            return;
        };
        let j = s.len();
        if j >= MAX_QPATH {
            com_printf(&format!("svc_lightstyle length={}\n", j));
            return;
        }
        style.length = j;
        for (k, ch) in s.bytes().enumerate() {
            style.map[k] = (ch as f32 - b'a' as f32) / (b'm' as f32 - b'a' as f32);
        }
        // force a refresh on the next run
        self.lastofs = -1;
    }

    /// Steps every style once per 100 ms.
    pub fn run(&mut self, time: i32) {
        let ofs = time / 100;
        if ofs == self.lastofs {
            return;
        }
        self.lastofs = ofs;

        for ls in self.styles.iter_mut() {
            let v = match ls.length {
                0 => 1.0,
                1 => ls.map[0],
                n => ls.map[ofs.rem_euclid(n as i32) as usize],
            };
            ls.value = [v; 3];
        }
    }

    pub fn value(&self, i: usize) -> Option<[f32; 3]> {
        self.styles.get(i).map(|ls| ls.value)
    }

    /// CL_AddLightStyles
    pub fn add_light_styles<F>(&self, mut add_light_style_fn: F)
    where
        F: FnMut(usize, f32, f32, f32),
    {
        for (i, ls) in self.styles.iter().enumerate() {
            add_light_style_fn(i, ls.value[0], ls.value[1], ls.value[2]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_reproducible_and_in_range() {
        let mut a = FxRng::new(7);
        let mut b = FxRng::new(7);
        for _ in 0..1000 {
            let q = a.qrand();
            assert_eq!(q, b.qrand());
            assert!((0..0x8000).contains(&q));
            let f = a.frand();
            assert_eq!(f, b.frand());
            assert!((0.0..1.0).contains(&f));
            let c = a.crand();
            assert_eq!(c, b.crand());
            assert!((-1.0..1.0).contains(&c));
        }
        a.reseed(7);
        let mut fresh = FxRng::new(7);
        assert_eq!(a.qrand(), fresh.qrand());
    }

    #[test]
    fn burst_partially_succeeds() {
        let mut ps = ParticleSystem::new(100);
        let mut rng = FxRng::new(0);
        assert_eq!(ps.item_respawn_particles(&mut rng, 0, &[0.0; 3]), Ok(64));
        assert_eq!(ps.item_respawn_particles(&mut rng, 0, &[0.0; 3]), Ok(36));
        assert_eq!(
            ps.item_respawn_particles(&mut rng, 0, &[0.0; 3]),
            Err(SpawnError::PoolExhausted { pool: "particle", capacity: 100 })
        );
        assert_eq!(ps.pool().live_count(), 100);
    }

    #[test]
    fn particles_fade_and_return_slots() {
        let mut ps = ParticleSystem::new(64);
        let mut rng = FxRng::new(1);
        ps.particle_effect(&mut rng, 1000, &[0.0; 3], &[0.0, 0.0, 1.0], 0xe0, 10).unwrap();
        ps.tick(1000);
        let mut n = 0;
        ps.add_particles(|p| {
            assert!(p.alpha > 0.0 && p.alpha <= 1.0);
            n += 1;
        });
        assert_eq!(n, 10);
        // alphavel is at most -1/0.8 per second
        ps.tick(1000 + 900);
        let pool = ps.pool();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.live_count() + pool.free_count(), pool.capacity());
    }

    #[test]
    fn instant_particle_lives_one_frame() {
        let mut ps = ParticleSystem::new(4);
        ps.instant_particle(0, &[1.0, 2.0, 3.0], 0xd0).unwrap();
        ps.tick(0);
        let mut seen = Vec::new();
        ps.add_particles(|p| seen.push(*p));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, [1.0, 2.0, 3.0]);
        ps.tick(16);
        assert_eq!(ps.pool().live_count(), 0);
    }

    #[test]
    fn emission_keeps_spawn_order() {
        let mut ps = ParticleSystem::new(8);
        for c in 0..4 {
            ps.instant_particle(0, &[0.0; 3], c).unwrap();
        }
        ps.tick(0);
        let mut colors = Vec::new();
        ps.add_particles(|p| colors.push(p.color));
        assert_eq!(colors, vec![0, 1, 2, 3]);
    }

    #[test]
    fn teleport_grid_size() {
        let mut ps = ParticleSystem::new(2000);
        let mut rng = FxRng::new(0);
        assert_eq!(ps.teleport_particles(&mut rng, 0, &[0.0; 3]), Ok(1053));
    }

    #[test]
    fn trails_scale_with_length() {
        let mut ps = ParticleSystem::new(4000);
        let mut rng = FxRng::new(0);
        let n = ps.bubble_trail(&mut rng, 0, &[0.0; 3], &[320.0, 0.0, 0.0]).unwrap();
        assert_eq!(n, 10);
        let r = ps.rail_trail(&mut rng, 0, &[0.0; 3], &[300.0, 0.0, 0.0]).unwrap();
        assert_eq!(r, 300 + 400);
    }

    #[test]
    fn dlight_alloc_prefers_key_then_dead() {
        let mut dl = DlightTable::default();
        dl.new_dlight(5, &[0.0; 3], 200.0, 100, 0);
        dl.new_dlight(5, &[1.0; 3], 150.0, 100, 0);
        assert_eq!(dl.live_count(), 1);

        dl.run(50, 0.05);
        let mut seen = Vec::new();
        dl.add_dlights(50, |l, remaining| seen.push((l.intensity, remaining)));
        assert_eq!(seen, vec![(150.0, 50)]);

        dl.run(101, 0.05);
        assert_eq!(dl.live_count(), 0);
    }

    #[test]
    fn dlight_decay() {
        let mut table = DlightTable::default();
        table.new_dlight(0, &[0.0; 3], 100.0, 1000, 0).decay = 200.0;
        table.run(10, 0.25);
        let mut r = 0.0;
        table.add_dlights(10, |l, _| r = l.intensity);
        assert_eq!(r, 50.0);
    }

    #[test]
    fn lightstyle_patterns() {
        let mut ls = LightStyleTable::default();
        ls.set_lightstyle(1, "am");
        ls.set_lightstyle(2, "m");
        ls.run(0);
        assert_eq!(ls.value(0), Some([1.0; 3]));
        assert_eq!(ls.value(1), Some([0.0; 3]));
        assert_eq!(ls.value(2), Some([1.0; 3]));
        ls.run(100);
        assert_eq!(ls.value(1), Some([1.0; 3]));
        let mut count = 0;
        ls.add_light_styles(|_, _, _, _| count += 1);
        assert_eq!(count, MAX_LIGHTSTYLES);
    }
}
