// client.rs — client-wide limits, asset handles and configuration

use q2frame_common::cvar::CvarContext;
use q2frame_common::q_shared::{CVAR_ARCHIVE, CVAR_LATCH, CVAR_ZERO, MAX_EDICTS};

// ============================================================
// Limits
// ============================================================

pub const MAX_DLIGHTS: usize = 32;
pub const MAX_ENTITIES: usize = MAX_EDICTS;
pub const MAX_PARTICLES: usize = 16000;
pub const MAX_EXPLOSIONS: usize = 256;
pub const MAX_BEAMS: usize = 256;
pub const MAX_LASERS: usize = 256;

pub const PARTICLE_GRAVITY: f32 = 40.0;
pub const BLASTER_PARTICLE_COLOR: i32 = 0xE0;
pub const INSTANT_PARTICLE: f32 = -10000.0;

/// Origin jump on any axis above which an entity is not lerped.
pub const MAX_LERP_DISTANCE: f32 = 512.0;

// ============================================================
// Asset handles
// ============================================================

/// Resolved model. `NONE` renders as nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u32);

impl ModelHandle {
    pub const NONE: ModelHandle = ModelHandle(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Resolved sound. `NONE` plays nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub u32);

impl SoundHandle {
    pub const NONE: SoundHandle = SoundHandle(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Asset lookups. Assumed cached; a miss returns the null handle.
pub trait AssetResolver {
    fn resolve_model(&mut self, name: &str) -> ModelHandle;
    fn resolve_sound(&mut self, name: &str) -> SoundHandle;
}

/// Hands out increasing handles per unique name. Used by tests and the headless driver.
#[derive(Debug, Default)]
pub struct SequentialResolver {
    names: Vec<String>,
}

impl SequentialResolver {
    fn lookup(&mut self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        let idx = match self.names.iter().position(|n| n == name) {
            Some(i) => i,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        };
        idx as u32 + 1
    }

    pub fn name_of(&self, handle: u32) -> Option<&str> {
        let idx = (handle as usize).checked_sub(1)?;
        self.names.get(idx).map(String::as_str)
    }
}

impl AssetResolver for SequentialResolver {
    fn resolve_model(&mut self, name: &str) -> ModelHandle {
        ModelHandle(self.lookup(name))
    }
    fn resolve_sound(&mut self, name: &str) -> SoundHandle {
        SoundHandle(self.lookup(name))
    }
}

// ============================================================
// Configuration
// ============================================================

/// Snapshot of the client cvars. Capacities are read once per context.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub timedemo: bool,
    pub showclamp: bool,
    pub noskins: bool,
    pub developer: bool,
    pub volume: f32,
    pub max_explosions: usize,
    pub max_beams: usize,
    pub max_lasers: usize,
    pub max_particles: usize,
    pub max_channels: usize,
    pub max_entities: usize,
    pub rng_seed: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timedemo: false,
            showclamp: false,
            noskins: false,
            developer: false,
            volume: 0.7,
            max_explosions: MAX_EXPLOSIONS,
            max_beams: MAX_BEAMS,
            max_lasers: MAX_LASERS,
            max_particles: MAX_PARTICLES,
            max_channels: crate::snd_dma::DEFAULT_CHANNELS,
            max_entities: MAX_ENTITIES,
            rng_seed: 0,
        }
    }
}

impl ClientConfig {
    /// Declare every client cvar with its default.
    pub fn register(cvars: &mut CvarContext) {
        cvars.get("cl_timedemo", "0", CVAR_ZERO);
        cvars.get("cl_showclamp", "0", CVAR_ZERO);
        cvars.get("cl_noskins", "0", CVAR_ZERO);
        cvars.get("developer", "0", CVAR_ZERO);
        cvars.get("s_volume", "0.7", CVAR_ARCHIVE);
        cvars.get("cl_max_explosions", &MAX_EXPLOSIONS.to_string(), CVAR_LATCH);
        cvars.get("cl_max_beams", &MAX_BEAMS.to_string(), CVAR_LATCH);
        cvars.get("cl_max_lasers", &MAX_LASERS.to_string(), CVAR_LATCH);
        cvars.get("cl_max_particles", &MAX_PARTICLES.to_string(), CVAR_LATCH);
        cvars.get("s_max_channels", &crate::snd_dma::DEFAULT_CHANNELS.to_string(), CVAR_LATCH);
        cvars.get("cl_max_entities", &MAX_ENTITIES.to_string(), CVAR_LATCH);
        cvars.get("cl_rng_seed", "0", CVAR_LATCH);
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let mut cfg = Self {
            max_explosions: cvars.variable_usize("cl_max_explosions", 1),
            max_beams: cvars.variable_usize("cl_max_beams", 1),
            max_lasers: cvars.variable_usize("cl_max_lasers", 1),
            max_particles: cvars.variable_usize("cl_max_particles", 1),
            max_channels: cvars.variable_usize("s_max_channels", crate::snd_dma::MIN_CHANNELS),
            max_entities: cvars.variable_usize("cl_max_entities", 1).min(MAX_EDICTS),
            rng_seed: cvars.variable_usize("cl_rng_seed", 0) as u64,
            ..Self::default()
        };
        cfg.apply_runtime(cvars);
        cfg
    }

    /// Refresh the values that may change mid-session.
    pub fn apply_runtime(&mut self, cvars: &CvarContext) {
        self.timedemo = cvars.variable_bool("cl_timedemo");
        self.showclamp = cvars.variable_bool("cl_showclamp");
        self.noskins = cvars.variable_bool("cl_noskins");
        self.developer = cvars.variable_bool("developer");
        self.volume = cvars.variable_value("s_volume").clamp(0.0, 1.0);
    }
}
