// q_shared.rs — math, entity state and engine limits shared by every crate

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

pub const DEG_TO_RAD: f32 = std::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / std::f32::consts::PI;

// ============================================================
// Engine limits
// ============================================================

pub const MAX_EDICTS: usize = 1024;
pub const MAX_MODELS: usize = 256;
pub const MAX_SOUNDS: usize = 256;
pub const MAX_LIGHTSTYLES: usize = 256;
pub const MAX_QPATH: usize = 64;
pub const MAX_MAP_AREAS: usize = 256;
pub const AREABITS_BYTES: usize = MAX_MAP_AREAS / 8;

/// Authoritative simulation step. Snapshots arrive on this cadence.
pub const SERVER_FRAMETIME_MS: i32 = 100;

/// Frames kept for delta decompression. Must be a power of two.
pub const UPDATE_BACKUP: usize = 16;
pub const UPDATE_MASK: usize = UPDATE_BACKUP - 1;

// ============================================================
// Error codes (com_error)
// ============================================================

pub const ERR_FATAL: i32 = 0; // exit the entire game with a popup window
pub const ERR_DROP: i32 = 1; // print to console and disconnect from game

// ============================================================
// Cvar flags
// ============================================================

pub const CVAR_ZERO: i32 = 0;
pub const CVAR_ARCHIVE: i32 = 1;
pub const CVAR_NOSET: i32 = 8;
pub const CVAR_LATCH: i32 = 16;

// ============================================================
// Entity effects (entity_state_t->effects)
// ============================================================

bitflags::bitflags! {
    /// Effects are things handled on the client side (lights, particles,
    /// frame animations) that happen constantly on the given entity.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EffectFlags: u32 {
        const ROTATE       = 0x00000001; // rotate (bonus items)
        const GIB          = 0x00000002; // leave a trail
        const BLASTER      = 0x00000008; // redlight + trail
        const ROCKET       = 0x00000010; // redlight + trail
        const GRENADE      = 0x00000020;
        const HYPERBLASTER = 0x00000040;
        const BFG          = 0x00000080;
        const COLOR_SHELL  = 0x00000100;
        const POWERSCREEN  = 0x00000200;
        const ANIM01       = 0x00000400; // automatically cycle between frames 0 and 1 at 2 hz
        const ANIM23       = 0x00000800; // automatically cycle between frames 2 and 3 at 2 hz
        const ANIM_ALL     = 0x00001000; // automatically cycle through all frames at 2hz
        const ANIM_ALLFAST = 0x00002000; // automatically cycle through all frames at 10hz
        const FLIES        = 0x00004000;
        const QUAD         = 0x00008000;
        const PENT         = 0x00010000;
        const TELEPORTER   = 0x00020000; // particle fountain
        const FLAG1        = 0x00040000;
        const FLAG2        = 0x00080000;
    }
}

// ============================================================
// Render effects (entity_state_t->renderfx)
// ============================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u32 {
        const MINLIGHT    = 0x00000001; // always have some light (viewmodel)
        const VIEWERMODEL = 0x00000002; // don't draw through eyes, only mirrors
        const WEAPONMODEL = 0x00000004; // only draw through eyes
        const FULLBRIGHT  = 0x00000008; // always draw full intensity
        const DEPTHHACK   = 0x00000010; // for view weapon Z crunching
        const TRANSLUCENT = 0x00000020;
        const FRAMELERP   = 0x00000040;
        const BEAM        = 0x00000080;
        const CUSTOMSKIN  = 0x00000100; // skin is an index in image_precache
        const GLOW        = 0x00000200; // pulse lighting for bonus items
        const SHELL_RED   = 0x00000400;
        const SHELL_GREEN = 0x00000800;
        const SHELL_BLUE  = 0x00001000;
        /// Server-set discontinuity marker: teleport, respawn, new this frame.
        const NOLERP      = 0x00100000;
    }
}

// ============================================================
// Temp entity events
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TempEvent {
    Gunshot = 0,
    Blood = 1,
    Blaster = 2,
    Railtrail = 3,
    Shotgun = 4,
    Explosion1 = 5,
    Explosion2 = 6,
    RocketExplosion = 7,
    GrenadeExplosion = 8,
    Sparks = 9,
    Splash = 10,
    Bubbletrail = 11,
    ScreenSparks = 12,
    ShieldSparks = 13,
    BulletSparks = 14,
    LaserSparks = 15,
    ParasiteAttack = 16,
    RocketExplosionWater = 17,
    GrenadeExplosionWater = 18,
    MedicCableAttack = 19,
    BfgExplosion = 20,
    BfgBigexplosion = 21,
    Bosstport = 22,
    BfgLaser = 23,
    GrappleCable = 24,
    Lightning = 33,
}

impl TempEvent {
    pub fn from_i32(v: i32) -> Option<Self> {
        use TempEvent::*;
        const ALL: [TempEvent; 25] = [
            Gunshot, Blood, Blaster, Railtrail, Shotgun, Explosion1, Explosion2,
            RocketExplosion, GrenadeExplosion, Sparks, Splash, Bubbletrail,
            ScreenSparks, ShieldSparks, BulletSparks, LaserSparks, ParasiteAttack,
            RocketExplosionWater, GrenadeExplosionWater, MedicCableAttack,
            BfgExplosion, BfgBigexplosion, Bosstport, BfgLaser, GrappleCable,
        ];
        match v {
            // 25..=32 are not parsed by this client
            33 => Some(Lightning),
            _ => usize::try_from(v).ok().and_then(|i| ALL.get(i).copied()),
        }
    }
}

pub const SPLASH_UNKNOWN: i32 = 0;
pub const SPLASH_SPARKS: i32 = 1;
pub const SPLASH_BLUE_WATER: i32 = 2;
pub const SPLASH_BROWN_WATER: i32 = 3;
pub const SPLASH_SLIME: i32 = 4;
pub const SPLASH_LAVA: i32 = 5;
pub const SPLASH_BLOOD: i32 = 6;

// ============================================================
// Entity events
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EntityEvent {
    None = 0,
    ItemRespawn = 1,
    Footstep = 2,
    FallShort = 3,
    Fall = 4,
    FallFar = 5,
    PlayerTeleport = 6,
    OtherTeleport = 7,
}

impl EntityEvent {
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => EntityEvent::ItemRespawn,
            2 => EntityEvent::Footstep,
            3 => EntityEvent::FallShort,
            4 => EntityEvent::Fall,
            5 => EntityEvent::FallFar,
            6 => EntityEvent::PlayerTeleport,
            7 => EntityEvent::OtherTeleport,
            _ => EntityEvent::None,
        }
    }
}

pub const EV_NONE: i32 = 0;
pub const EV_ITEM_RESPAWN: i32 = 1;
pub const EV_FOOTSTEP: i32 = 2;
pub const EV_FALLSHORT: i32 = 3;
pub const EV_FALL: i32 = 4;
pub const EV_FALLFAR: i32 = 5;
pub const EV_PLAYER_TELEPORT: i32 = 6;
pub const EV_OTHER_TELEPORT: i32 = 7;

// ============================================================
// Sound channels / attenuation
// ============================================================

pub const CHAN_AUTO: i32 = 0;
pub const CHAN_WEAPON: i32 = 1;
pub const CHAN_VOICE: i32 = 2;
pub const CHAN_ITEM: i32 = 3;
pub const CHAN_BODY: i32 = 4;

pub const ATTN_NONE: f32 = 0.0; // full volume the entire level
pub const ATTN_NORM: f32 = 1.0;
pub const ATTN_IDLE: f32 = 2.0;
pub const ATTN_STATIC: f32 = 3.0; // diminish very rapidly with distance

// ============================================================
// Entity state
// ============================================================

/// One entity as the server sees it in a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityState {
    pub number: i32, // edict index
    pub origin: Vec3,
    pub angles: Vec3,
    pub old_origin: Vec3, // for lerping and beams
    pub modelindex: i32,
    pub modelindex2: i32, // weapons, CTF flags, etc
    pub frame: i32,
    pub skinnum: i32,
    pub effects: EffectFlags,
    pub renderfx: RenderFlags,
    pub sound: i32, // for looping sounds, to guarantee shutoff
    pub event: i32, // impulse events, cleared after each frame
}

impl EntityState {
    pub fn new(number: i32) -> Self {
        Self { number, ..Self::default() }
    }
}

/// Camera-relevant part of the player state carried by each snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerView {
    pub origin: Vec3,
    pub viewoffset: Vec3,
    pub viewangles: Vec3,
    pub kick_angles: Vec3,
    pub fov: f32,
    pub blend: [f32; 4],
    pub rdflags: i32,
    pub areabits: [u8; AREABITS_BYTES],
}

impl Default for PlayerView {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            viewoffset: [0.0; 3],
            viewangles: [0.0; 3],
            kick_angles: [0.0; 3],
            fov: 90.0,
            blend: [0.0; 4],
            rdflags: 0,
            areabits: [0xff; AREABITS_BYTES],
        }
    }
}

// ============================================================
// MATHLIB — Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

pub fn vector_distance(a: &Vec3, b: &Vec3) -> f32 {
    vector_length(&vector_subtract(a, b))
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

/// Two vectors perpendicular to `forward` and to each other.
pub fn make_normal_vectors(forward: &Vec3) -> (Vec3, Vec3) {
    // this rotate and negate guarantees a vector not colinear with the original
    let mut right = [forward[2], -forward[0], forward[1]];
    let d = dot_product(&right, forward);
    right = vector_ma(&right, -d, forward);
    vector_normalize(&mut right);
    let up = cross_product(&right, forward);
    (right, up)
}

// ============================================================
// Angle functions
// ============================================================

/// (forward, right, up) for a set of euler angles in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = (angles[YAW] * DEG_TO_RAD).sin_cos();
    let (sp, cp) = (angles[PITCH] * DEG_TO_RAD).sin_cos();
    let (sr, cr) = (angles[ROLL] * DEG_TO_RAD).sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + sr * sy,
        cr * sp * sy - sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

/// Direction vector to euler angles, without integer truncation.
pub fn vectoangles2(value: &Vec3) -> Vec3 {
    if value[1] == 0.0 && value[0] == 0.0 {
        let pitch = if value[2] > 0.0 { -90.0 } else { -270.0 };
        return [pitch, 0.0, 0.0];
    }

    let mut yaw = if value[0] != 0.0 {
        value[1].atan2(value[0]) * RAD_TO_DEG
    } else if value[1] > 0.0 {
        90.0
    } else {
        270.0
    };
    if yaw < 0.0 {
        yaw += 360.0;
    }

    let forward = (value[0] * value[0] + value[1] * value[1]).sqrt();
    [-(value[2].atan2(forward) * RAD_TO_DEG), yaw, 0.0]
}

/// Blend from `a2` toward `a1` along the shorter arc.
pub fn lerp_angle(a2: f32, a1: f32, frac: f32) -> f32 {
    let mut a1 = a1;
    if a1 - a2 > 180.0 {
        a1 -= 360.0;
    }
    if a1 - a2 < -180.0 {
        a1 += 360.0;
    }
    a2 + frac * (a1 - a2)
}

/// Wrap to [0, 360) with 16-bit angle precision.
pub fn anglemod(a: f32) -> f32 {
    (360.0 / 65536.0) * (((a * (65536.0 / 360.0)) as i32) & 65535) as f32
}
