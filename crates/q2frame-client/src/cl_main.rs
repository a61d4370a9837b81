// cl_main.rs — the presentation context and its per-tick driver

use q2frame_common::cvar::CvarContext;
use q2frame_common::q_shared::{EntityState, TempEvent, AREABITS_BYTES, MAX_MODELS, MAX_SOUNDS};

use crate::cl_bgmusic::BackgroundMusic;
use crate::cl_ents::{add_entities, EntityFrame};
use crate::cl_fx::LightStyleTable;
use crate::cl_lerp::{compute_lerpfrac, compute_view, PoseSet, ViewPose};
use crate::cl_snap::{SnapshotMessage, SnapshotStats, SnapshotStore};
use crate::cl_tent::{EffectSpawner, SpawnerStats, TempEntityParams};
use crate::cl_view::{SceneAssembler, SceneDrops};
use crate::client::{AssetResolver, ClientConfig, ModelHandle, SoundHandle, MAX_DLIGHTS};
use crate::ref_def::{FrameDescriptor, FrameSummary, RenderBackend};
use crate::snd_dma::{AudioBackend, Listener, SoundEvent, SoundState, SoundStats};

/// Counters gathered from every subsystem after a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentationStats {
    pub ticks: u64,
    pub time: i32,
    pub snapshots: SnapshotStats,
    pub effects: SpawnerStats,
    pub sound: SoundStats,
    pub drops: SceneDrops,
    pub frame: FrameSummary,
}

/// Camera used until the first snapshot arrives.
fn idle_view() -> ViewPose {
    ViewPose {
        vieworg: [0.0; 3],
        viewangles: [0.0; 3],
        fov: 90.0,
        blend: [0.0; 4],
        rdflags: 0,
        areabits: [0; AREABITS_BYTES],
        forward: [1.0, 0.0, 0.0],
        right: [0.0, -1.0, 0.0],
        up: [0.0, 0.0, 1.0],
    }
}

/// One client's presentation state. Every pool is sized here, from the
/// config, and nothing resizes afterwards.
pub struct ClientPresentation {
    config: ClientConfig,
    snapshots: SnapshotStore,
    poses: PoseSet,
    view: ViewPose,
    spawner: EffectSpawner,
    lightstyles: LightStyleTable,
    scene: SceneAssembler,
    sound: SoundState,
    music: BackgroundMusic,
    model_precache: Vec<ModelHandle>,
    sound_precache: Vec<SoundHandle>,
    playernum: i32,
    time: i32, // ms, clamped render time
    last_wall: Option<i32>,
    ticks: u64,
}

impl ClientPresentation {
    pub fn new(config: &ClientConfig) -> Self {
        // every light producer can fill its own pool in one frame
        let light_candidates = config.max_explosions + MAX_DLIGHTS + config.max_entities;
        Self {
            config: config.clone(),
            snapshots: SnapshotStore::new(),
            poses: PoseSet::new(),
            view: idle_view(),
            spawner: EffectSpawner::new(config),
            lightstyles: LightStyleTable::default(),
            scene: SceneAssembler::new(config.max_entities, config.max_particles, light_candidates),
            sound: SoundState::new(config.max_channels, config.volume),
            music: BackgroundMusic::new(),
            model_precache: vec![ModelHandle::NONE; MAX_MODELS],
            sound_precache: vec![SoundHandle::NONE; MAX_SOUNDS],
            playernum: 0,
            time: 0,
            last_wall: None,
            ticks: 0,
        }
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        Self::new(&ClientConfig::from_cvars(cvars))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Pick up runtime cvar changes. Capacities stay as constructed.
    pub fn apply_cvars(&mut self, cvars: &CvarContext) {
        self.config.apply_runtime(cvars);
        self.sound.set_volume(self.config.volume);
    }

    // ============================================================
    // Level setup
    // ============================================================

    /// Effect models and sounds.
    pub fn register_assets(&mut self, resolver: &mut dyn AssetResolver) {
        self.spawner.register_assets(resolver);
    }

    /// CS_MODELS entry `index`.
    pub fn precache_model(&mut self, index: usize, name: &str, resolver: &mut dyn AssetResolver) {
        let Some(slot) = self.model_precache.get_mut(index) else {
            log::debug!("model index {} out of range: {}", index, name);
            return;
        };
        *slot = resolver.resolve_model(name);
        if slot.is_none() {
            log::debug!("model {} unresolved", name);
        }
    }

    /// CS_SOUNDS entry `index`.
    pub fn precache_sound(&mut self, index: usize, name: &str, resolver: &mut dyn AssetResolver) {
        let Some(slot) = self.sound_precache.get_mut(index) else {
            log::debug!("sound index {} out of range: {}", index, name);
            return;
        };
        *slot = resolver.resolve_sound(name);
        if slot.is_none() {
            log::debug!("sound {} unresolved", name);
        }
    }

    pub fn sound_handle(&self, index: usize) -> SoundHandle {
        self.sound_precache.get(index).copied().unwrap_or(SoundHandle::NONE)
    }

    pub fn set_lightstyle(&mut self, index: usize, pattern: &str) {
        self.lightstyles.set_lightstyle(index, pattern);
    }

    /// Client slot; the local entity is `playernum + 1`.
    pub fn set_playernum(&mut self, playernum: i32) {
        self.playernum = playernum;
    }

    pub fn player_entity(&self) -> i32 {
        self.playernum + 1
    }

    // ============================================================
    // Per-tick driver
    // ============================================================

    /// Runs one tick: snapshot rotation, interpolation, entity events,
    /// effect aging, assembly and audio, in that order. Always yields a
    /// frame, empty when nothing has arrived yet.
    pub fn tick(&mut self, snapshot: Option<SnapshotMessage>, wall_time: i32, audio: &mut dyn AudioBackend) -> &FrameDescriptor {
        self.ticks += 1;
        let msec = self.last_wall.map_or(0, |w| (wall_time - w).max(0));
        self.last_wall = Some(wall_time);
        let frametime = msec as f32 * 0.001;
        self.time += msec;

        let accepted = match snapshot.map(|msg| self.snapshots.ingest_message(msg)) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                log::debug!("snapshot dropped: {}", e);
                false
            }
            None => false,
        };

        let player_entity = self.player_entity();
        let mut server_frame = 0;
        let mut lerpfrac = 1.0;
        match self.snapshots.get_pair() {
            Some(pair) => {
                let clock = compute_lerpfrac(self.time, Some(&pair), self.config.timedemo, self.config.showclamp);
                self.time = clock.time;
                lerpfrac = clock.lerpfrac;
                server_frame = pair.current.server_frame;
                self.poses.build(&pair, lerpfrac, self.time);
                self.view = compute_view(&pair, lerpfrac);

                if accepted {
                    for state in pair.current.entities.values().filter(|s| s.event != 0) {
                        self.spawner.entity_event(state, self.time);
                    }
                }
            }
            None => self.poses.clear(),
        }

        self.lightstyles.run(self.time);
        self.spawner.tick(self.time, lerpfrac, frametime);

        let fr = EntityFrame {
            poses: &self.poses,
            model_precache: &self.model_precache,
            player_entity,
            noskins: self.config.noskins,
            time: self.time,
        };
        add_entities(&mut self.scene, &mut self.spawner, &self.lightstyles, &self.view, &fr, server_frame);

        for ev in self.spawner.drain_sounds() {
            self.sound.s_start_sound(ev, self.time);
        }
        let listener = Listener {
            origin: self.view.vieworg,
            forward: self.view.forward,
            right: self.view.right,
            up: self.view.up,
            entity: player_entity,
        };
        self.sound.s_update(self.time, &listener, &self.poses, &self.sound_precache, audio);
        self.music.update(self.config.volume, audio);

        self.scene.frame()
    }

    /// Hand the last assembled frame to a renderer.
    pub fn submit(&self, renderer: &mut dyn RenderBackend) {
        renderer.submit_frame(self.scene.frame());
    }

    // ============================================================
    // Discrete events
    // ============================================================

    pub fn on_temp_entity_event(&mut self, event: TempEvent, params: &TempEntityParams) {
        let server_time = self.snapshots.current().map_or(self.time, |f| f.server_time);
        self.spawner.temp_entity(event, params, self.time, server_time);
    }

    /// Raw temp-entity code off the wire. Unknown codes are ignored.
    pub fn on_temp_entity_code(&mut self, code: i32, params: &TempEntityParams) {
        match TempEvent::from_i32(code) {
            Some(event) => self.on_temp_entity_event(event, params),
            None => log::debug!("unknown temp entity {}", code),
        }
    }

    pub fn on_sound_event(&mut self, event: SoundEvent) {
        self.sound.s_start_sound(event, self.time);
    }

    /// svc_muzzleflash, placed at the entity's current snapshot state.
    pub fn on_muzzle_flash(&mut self, entity: i32, weapon: i32) {
        let Some(state) = self.snapshots.current().and_then(|f| f.entities.get(&entity)).copied() else {
            log::trace!("muzzle flash on absent entity {}", entity);
            return;
        };
        self.spawner.muzzle_flash(entity, weapon, &state.origin, &state.angles, self.time);
    }

    /// svc_spawnbaseline. New entities in a delta start from this state.
    pub fn on_baseline(&mut self, state: EntityState) {
        self.snapshots.set_baseline(state);
    }

    /// Drop every snapshot, effect, sound and precache entry.
    pub fn on_disconnect(&mut self, audio: &mut dyn AudioBackend) {
        self.snapshots.reset();
        self.poses.clear();
        self.view = idle_view();
        self.spawner.clear();
        self.lightstyles.clear();
        self.scene.v_clear_scene();
        self.sound.s_stop_all_sounds(audio);
        self.music.stop(audio);
        self.model_precache.fill(ModelHandle::NONE);
        self.sound_precache.fill(SoundHandle::NONE);
        self.time = 0;
        log::info!("disconnected, presentation state cleared");
    }

    // ============================================================
    // Inspection
    // ============================================================

    pub fn frame(&self) -> &FrameDescriptor {
        self.scene.frame()
    }

    pub fn poses(&self) -> &PoseSet {
        &self.poses
    }

    pub fn spawner(&self) -> &EffectSpawner {
        &self.spawner
    }

    pub fn sound(&self) -> &SoundState {
        &self.sound
    }

    pub fn music(&self) -> &BackgroundMusic {
        &self.music
    }

    pub fn music_mut(&mut self) -> &mut BackgroundMusic {
        &mut self.music
    }

    pub fn time(&self) -> i32 {
        self.time
    }

    pub fn stats(&self) -> PresentationStats {
        PresentationStats {
            ticks: self.ticks,
            time: self.time,
            snapshots: self.snapshots.stats(),
            effects: self.spawner.stats(),
            sound: self.sound.stats(),
            drops: self.scene.drops(),
            frame: self.scene.frame().summary(),
        }
    }
}
