// snd_dma.rs — channel allocation and per-frame spatialization

use q2frame_common::q_shared::{vector_distance, Vec3, ATTN_STATIC, MAX_SOUNDS};

use crate::cl_lerp::PoseSet;
use crate::client::SoundHandle;

pub const SOUND_FULLVOLUME: f32 = 80.0;
pub const SOUND_LOOPATTENUATE: f32 = 0.003;

pub const MIN_CHANNELS: usize = 16;
pub const DEFAULT_CHANNELS: usize = 32;

const MAX_PLAYSOUNDS: usize = 128;

// ============================================================
// Backend interface
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Mix(usize),
    Stream,
}

/// Everything the mixer needs to place one channel this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub gain: f32,
    /// Position is the listener itself, no attenuation.
    pub relative: bool,
    pub looping: bool,
}

pub trait AudioBackend {
    fn set_channel_state(&mut self, id: ChannelId, state: &ChannelState);
    fn play(&mut self, id: ChannelId, sound: SoundHandle, looping: bool);
    fn pause(&mut self, id: ChannelId);
    fn resume(&mut self, id: ChannelId);
    fn stop(&mut self, id: ChannelId);
    fn is_playing(&self, id: ChannelId) -> bool;
    fn update_listener(&mut self, _origin: &Vec3, _forward: &Vec3, _up: &Vec3) {}
    fn queue_stream_buffer(&mut self, samples: &[i16]);
}

/// No device. Nothing ever reports as playing.
#[derive(Debug, Default)]
pub struct NullAudio;

impl AudioBackend for NullAudio {
    fn set_channel_state(&mut self, _id: ChannelId, _state: &ChannelState) {}
    fn play(&mut self, _id: ChannelId, _sound: SoundHandle, _looping: bool) {}
    fn pause(&mut self, _id: ChannelId) {}
    fn resume(&mut self, _id: ChannelId) {}
    fn stop(&mut self, _id: ChannelId) {}
    fn is_playing(&self, _id: ChannelId) -> bool {
        false
    }
    fn queue_stream_buffer(&mut self, _samples: &[i16]) {}
}

// ============================================================
// Sounds and channels
// ============================================================

/// A one-shot sound request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundEvent {
    pub entity: i32,
    pub channel: i32,
    pub sound: SoundHandle,
    pub volume: f32,
    pub attenuation: f32,
    /// Plays at this point instead of following the entity.
    pub fixed_origin: Option<Vec3>,
    pub time_offset: f32, // seconds
}

impl SoundEvent {
    pub fn at(origin: &Vec3, sound: SoundHandle, volume: f32, attenuation: f32) -> Self {
        Self {
            entity: 0,
            channel: 0,
            sound,
            volume,
            attenuation,
            fixed_origin: Some(*origin),
            time_offset: 0.0,
        }
    }

    pub fn on_entity(entity: i32, channel: i32, sound: SoundHandle, volume: f32, attenuation: f32) -> Self {
        Self { entity, channel, sound, volume, attenuation, fixed_origin: None, time_offset: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Playsound {
    event: SoundEvent,
    begin: i32, // ms
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Channel {
    pub sound: SoundHandle,
    pub entnum: i32,
    pub entchannel: i32,
    pub origin: Vec3,
    pub dist_mult: f32,
    pub master_vol: f32,
    pub fixed_origin: bool,
    pub autosound: bool,
    touched: u64,
    issued: u64,
}

impl Channel {
    pub fn is_free(&self) -> bool {
        self.sound.is_none()
    }
}

/// Where the ears are this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Listener {
    pub origin: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    /// playernum + 1
    pub entity: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoundStats {
    pub active: usize,
    pub autosounds: usize,
    pub no_channel: u64,
    pub dropped_playsounds: u64,
}

/// Distance attenuation for an attenuation constant.
pub fn dist_mult(attenuation: f32) -> f32 {
    if attenuation == ATTN_STATIC {
        attenuation * 0.001
    } else {
        attenuation * 0.0005
    }
}

/// S_SpatializeOrigin, as a single gain.
pub fn falloff(dist: f32, dist_mult: f32) -> f32 {
    let dist = (dist - SOUND_FULLVOLUME).max(0.0);
    (1.0 - dist * dist_mult).max(0.0)
}

pub struct SoundState {
    channels: Vec<Channel>,
    playsounds: Vec<Playsound>,
    volume: f32,
    frame: u64,
    no_channel: u64,
    dropped_playsounds: u64,
}

impl SoundState {
    pub fn new(max_channels: usize, volume: f32) -> Self {
        let n = max_channels.max(MIN_CHANNELS);
        Self {
            channels: vec![Channel::default(); n],
            playsounds: Vec::with_capacity(MAX_PLAYSOUNDS),
            volume,
            frame: 0,
            no_channel: 0,
            dropped_playsounds: 0,
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn stats(&self) -> SoundStats {
        SoundStats {
            active: self.channels.iter().filter(|c| !c.is_free()).count(),
            autosounds: self.channels.iter().filter(|c| !c.is_free() && c.autosound).count(),
            no_channel: self.no_channel,
            dropped_playsounds: self.dropped_playsounds,
        }
    }

    /// Same (entity, channel) first, then an empty slot, then anything not
    /// owned by the player unless the player is asking.
    pub fn s_pick_channel(&mut self, entnum: i32, entchannel: i32, player_entity: i32) -> Option<usize> {
        assert!(entchannel >= 0, "S_PickChannel: entchannel<0");

        // a live (entity, channel) match wins over any free slot
        let same = (entchannel != 0)
            .then(|| {
                self.channels
                    .iter()
                    .position(|ch| !ch.is_free() && ch.entnum == entnum && ch.entchannel == entchannel)
            })
            .flatten();
        let first_to_die = same
            .or_else(|| self.channels.iter().position(Channel::is_free))
            .or_else(|| {
                self.channels
                    .iter()
                    .position(|ch| ch.entnum != player_entity || entnum == player_entity)
            });

        let Some(i) = first_to_die else {
            self.no_channel += 1;
            log::trace!("no channel for entity {}", entnum);
            return None;
        };
        Some(i)
    }

    /// Queue a one-shot. It is issued on the first update at or after its start time.
    pub fn s_start_sound(&mut self, event: SoundEvent, now: i32) {
        if event.sound.is_none() {
            return;
        }
        if self.playsounds.len() >= MAX_PLAYSOUNDS {
            self.dropped_playsounds += 1;
            log::trace!("playsound queue full");
            return;
        }
        let begin = now + (event.time_offset * 1000.0) as i32;
        self.playsounds.push(Playsound { event, begin });
    }

    fn s_issue_playsound(&mut self, ps: &Playsound, player_entity: i32, backend: &mut dyn AudioBackend) {
        let ev = &ps.event;
        let Some(i) = self.s_pick_channel(ev.entity, ev.channel, player_entity) else {
            return;
        };
        if !self.channels[i].is_free() {
            backend.stop(ChannelId::Mix(i));
        }
        self.channels[i] = Channel {
            sound: ev.sound,
            entnum: ev.entity,
            entchannel: ev.channel,
            origin: ev.fixed_origin.unwrap_or_default(),
            dist_mult: dist_mult(ev.attenuation),
            master_vol: ev.volume,
            fixed_origin: ev.fixed_origin.is_some(),
            autosound: false,
            touched: self.frame,
            issued: self.frame,
        };
        backend.play(ChannelId::Mix(i), ev.sound, false);
    }

    /// S_AddLoopSounds: every entity with a sound attribute keeps one looping
    /// channel alive for this update.
    fn s_add_loop_sounds(&mut self, poses: &PoseSet, sound_precache: &[SoundHandle], player_entity: i32, backend: &mut dyn AudioBackend) {
        for pose in poses.iter() {
            let index = pose.state.sound;
            if index <= 0 || index as usize >= MAX_SOUNDS {
                continue;
            }
            let Some(&sound) = sound_precache.get(index as usize) else { continue };
            if sound.is_none() {
                continue;
            }

            let frame = self.frame;
            if let Some(ch) = self
                .channels
                .iter_mut()
                .find(|c| c.autosound && c.entnum == pose.number && c.sound == sound)
            {
                ch.touched = frame;
                continue;
            }

            let Some(i) = self.s_pick_channel(0, 0, player_entity) else {
                continue;
            };
            if !self.channels[i].is_free() {
                backend.stop(ChannelId::Mix(i));
            }
            self.channels[i] = Channel {
                sound,
                entnum: pose.number,
                entchannel: 0,
                origin: pose.origin,
                dist_mult: SOUND_LOOPATTENUATE,
                master_vol: 1.0,
                fixed_origin: false,
                autosound: true,
                touched: frame,
                issued: frame,
            };
            backend.play(ChannelId::Mix(i), sound, true);
        }
    }

    /// S_Update: issue due one-shots, refresh the loops, reap and respatialize.
    pub fn s_update(&mut self, now: i32, listener: &Listener, poses: &PoseSet, sound_precache: &[SoundHandle], backend: &mut dyn AudioBackend) {
        self.frame += 1;
        backend.update_listener(&listener.origin, &listener.forward, &listener.up);

        let mut pending = std::mem::take(&mut self.playsounds);
        pending.retain(|ps| {
            if ps.begin > now {
                return true;
            }
            self.s_issue_playsound(ps, listener.entity, backend);
            false
        });
        self.playsounds = pending;

        self.s_add_loop_sounds(poses, sound_precache, listener.entity, backend);

        let frame = self.frame;
        for (i, ch) in self.channels.iter_mut().enumerate() {
            if ch.is_free() {
                continue;
            }
            let id = ChannelId::Mix(i);
            if ch.autosound && ch.touched != frame {
                backend.stop(id);
                *ch = Channel::default();
                continue;
            }
            if !ch.autosound && ch.issued != frame && !backend.is_playing(id) {
                *ch = Channel::default();
                continue;
            }

            let mut velocity = [0.0; 3];
            if !ch.fixed_origin {
                if let Some(pose) = poses.get(ch.entnum) {
                    ch.origin = pose.origin;
                    velocity = pose.velocity;
                }
            }
            let state = spatialize(ch, listener, velocity, self.volume);
            backend.set_channel_state(id, &state);
        }
    }

    /// S_StopAllSounds
    pub fn s_stop_all_sounds(&mut self, backend: &mut dyn AudioBackend) {
        for (i, ch) in self.channels.iter_mut().enumerate() {
            if !ch.is_free() {
                backend.stop(ChannelId::Mix(i));
            }
            *ch = Channel::default();
        }
        self.playsounds.clear();
    }
}

/// Gain and placement for one channel. The listener's own sounds, local
/// sounds and unattenuated sounds play at the listener.
fn spatialize(ch: &Channel, listener: &Listener, velocity: Vec3, volume: f32) -> ChannelState {
    let looping = ch.autosound;
    if ch.entnum == listener.entity || ch.entnum == -1 || ch.dist_mult == 0.0 {
        return ChannelState {
            position: listener.origin,
            velocity: [0.0; 3],
            gain: ch.master_vol * volume,
            relative: true,
            looping,
        };
    }
    let dist = vector_distance(&ch.origin, &listener.origin);
    ChannelState {
        position: ch.origin,
        velocity,
        gain: ch.master_vol * volume * falloff(dist, ch.dist_mult),
        relative: false,
        looping,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cl_snap::{EntitySnapshotFrame, SnapshotPair};
    use q2frame_common::q_shared::{EntityState, ATTN_NORM, CHAN_BODY, CHAN_WEAPON};
    use std::collections::{HashMap, HashSet};

    /// Backend that remembers what it was told.
    #[derive(Default)]
    pub(crate) struct RecordingAudio {
        pub playing: HashSet<ChannelId>,
        pub states: HashMap<ChannelId, ChannelState>,
        pub stops: Vec<ChannelId>,
        pub plays: Vec<(ChannelId, SoundHandle, bool)>,
        pub paused: HashSet<ChannelId>,
        pub stream: Vec<i16>,
    }

    impl AudioBackend for RecordingAudio {
        fn set_channel_state(&mut self, id: ChannelId, state: &ChannelState) {
            self.states.insert(id, *state);
        }
        fn play(&mut self, id: ChannelId, sound: SoundHandle, looping: bool) {
            self.playing.insert(id);
            self.plays.push((id, sound, looping));
        }
        fn pause(&mut self, id: ChannelId) {
            self.paused.insert(id);
        }
        fn resume(&mut self, id: ChannelId) {
            self.paused.remove(&id);
        }
        fn stop(&mut self, id: ChannelId) {
            self.playing.remove(&id);
            self.stops.push(id);
        }
        fn is_playing(&self, id: ChannelId) -> bool {
            self.playing.contains(&id)
        }
        fn queue_stream_buffer(&mut self, samples: &[i16]) {
            self.stream.extend_from_slice(samples);
        }
    }

    fn poses_for(entities: &[(i32, Vec3, i32)]) -> PoseSet {
        let mut frame = EntitySnapshotFrame::new(1, 100);
        for &(n, origin, sound) in entities {
            let mut s = EntityState::new(n);
            s.origin = origin;
            s.old_origin = origin;
            s.modelindex = 1;
            s.sound = sound;
            frame.insert(s);
        }
        let pair = SnapshotPair { previous: &frame, current: &frame, interpolate: false };
        let mut poses = PoseSet::new();
        poses.build(&pair, 1.0, 100);
        poses
    }

    fn precache() -> Vec<SoundHandle> {
        (0..4).map(SoundHandle).collect()
    }

    fn listener() -> Listener {
        Listener { entity: 1, ..Listener::default() }
    }

    #[test]
    fn autosound_is_stopped_the_tick_its_entity_leaves() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let with = poses_for(&[(5, [100.0, 0.0, 0.0], 2)]);
        snd.s_update(0, &listener(), &with, &precache(), &mut audio);
        assert_eq!(snd.stats().autosounds, 1);
        assert_eq!(audio.plays, vec![(ChannelId::Mix(0), SoundHandle(2), true)]);

        // refreshed, not restarted
        snd.s_update(16, &listener(), &with, &precache(), &mut audio);
        assert_eq!(audio.plays.len(), 1);
        assert_eq!(snd.stats().autosounds, 1);

        let without = poses_for(&[]);
        snd.s_update(32, &listener(), &without, &precache(), &mut audio);
        assert_eq!(snd.stats().autosounds, 0);
        assert_eq!(audio.stops, vec![ChannelId::Mix(0)]);
    }

    #[test]
    fn listener_sounds_are_relative_and_unattenuated() {
        let mut snd = SoundState::new(16, 0.5);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[(1, [5000.0, 0.0, 0.0], 0)]);
        snd.s_start_sound(SoundEvent::on_entity(1, CHAN_WEAPON, SoundHandle(3), 1.0, ATTN_NORM), 0);
        snd.s_update(0, &listener(), &poses, &precache(), &mut audio);
        let st = audio.states[&ChannelId::Mix(0)];
        assert!(st.relative);
        assert_eq!(st.gain, 0.5);
        assert_eq!(st.position, [0.0; 3]);
    }

    #[test]
    fn distant_sounds_fall_off() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[(9, [1080.0, 0.0, 0.0], 0)]);
        snd.s_start_sound(SoundEvent::on_entity(9, CHAN_BODY, SoundHandle(3), 1.0, ATTN_NORM), 0);
        snd.s_update(0, &listener(), &poses, &precache(), &mut audio);
        let st = audio.states[&ChannelId::Mix(0)];
        assert!(!st.relative);
        // 1000 units past full volume at 0.0005 per unit
        assert!((st.gain - 0.5).abs() < 1e-5);
        assert_eq!(st.position, [1080.0, 0.0, 0.0]);
    }

    #[test]
    fn falloff_law() {
        assert_eq!(falloff(40.0, 0.0005), 1.0);
        assert_eq!(falloff(80.0 + 4000.0, 0.0005), 0.0);
        assert!((dist_mult(ATTN_STATIC) - 0.003).abs() < 1e-7);
    }

    #[test]
    fn same_entity_channel_replaces() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[]);
        snd.s_start_sound(SoundEvent::on_entity(4, CHAN_WEAPON, SoundHandle(1), 1.0, ATTN_NORM), 0);
        snd.s_update(0, &listener(), &poses, &precache(), &mut audio);
        snd.s_start_sound(SoundEvent::on_entity(4, CHAN_WEAPON, SoundHandle(2), 1.0, ATTN_NORM), 0);
        snd.s_update(16, &listener(), &poses, &precache(), &mut audio);
        assert_eq!(snd.stats().active, 1);
        assert_eq!(snd.channels()[0].sound, SoundHandle(2));
        assert_eq!(audio.stops, vec![ChannelId::Mix(0)]);
    }

    #[test]
    fn entity_channel_match_beats_an_earlier_free_slot() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[]);
        snd.s_start_sound(SoundEvent::on_entity(4, CHAN_WEAPON, SoundHandle(1), 1.0, ATTN_NORM), 0);
        snd.s_start_sound(SoundEvent::on_entity(5, CHAN_WEAPON, SoundHandle(1), 1.0, ATTN_NORM), 0);
        snd.s_update(0, &listener(), &poses, &precache(), &mut audio);
        assert_eq!(snd.channels()[1].entnum, 5);

        // slot 0 finishes and is freed ahead of slot 1
        audio.playing.remove(&ChannelId::Mix(0));
        snd.s_update(16, &listener(), &poses, &precache(), &mut audio);
        assert!(snd.channels()[0].is_free());

        snd.s_start_sound(SoundEvent::on_entity(5, CHAN_WEAPON, SoundHandle(2), 1.0, ATTN_NORM), 0);
        snd.s_update(32, &listener(), &poses, &precache(), &mut audio);
        let live = snd
            .channels()
            .iter()
            .filter(|c| !c.is_free() && c.entnum == 5 && c.entchannel == CHAN_WEAPON)
            .count();
        assert_eq!(live, 1);
        assert_eq!(snd.channels()[1].sound, SoundHandle(2));
        assert!(snd.channels()[0].is_free());
    }

    #[test]
    fn player_channels_are_not_stolen() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[]);
        for c in 0..16 {
            snd.s_start_sound(SoundEvent::on_entity(1, c + 1, SoundHandle(1), 1.0, ATTN_NORM), 0);
        }
        snd.s_update(0, &listener(), &poses, &precache(), &mut audio);
        assert_eq!(snd.stats().active, 16);

        snd.s_start_sound(SoundEvent::on_entity(8, CHAN_BODY, SoundHandle(2), 1.0, ATTN_NORM), 0);
        snd.s_update(16, &listener(), &poses, &precache(), &mut audio);
        assert!(snd.channels().iter().all(|c| c.entnum == 1));
        assert_eq!(snd.stats().no_channel, 1);
    }

    #[test]
    fn finished_one_shots_are_freed() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[]);
        snd.s_start_sound(SoundEvent::at(&[0.0; 3], SoundHandle(1), 1.0, ATTN_NORM), 0);
        snd.s_update(0, &listener(), &poses, &precache(), &mut audio);
        assert_eq!(snd.stats().active, 1);
        audio.playing.clear();
        snd.s_update(16, &listener(), &poses, &precache(), &mut audio);
        assert_eq!(snd.stats().active, 0);
    }

    #[test]
    fn delayed_sound_waits_for_its_start() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[]);
        let mut ev = SoundEvent::at(&[0.0; 3], SoundHandle(1), 1.0, ATTN_NORM);
        ev.time_offset = 0.1;
        snd.s_start_sound(ev, 0);
        snd.s_update(50, &listener(), &poses, &precache(), &mut audio);
        assert!(audio.plays.is_empty());
        snd.s_update(100, &listener(), &poses, &precache(), &mut audio);
        assert_eq!(audio.plays.len(), 1);
    }

    #[test]
    fn stop_all_clears_everything() {
        let mut snd = SoundState::new(16, 1.0);
        let mut audio = RecordingAudio::default();
        let poses = poses_for(&[(5, [0.0; 3], 1)]);
        snd.s_update(0, &listener(), &poses, &precache(), &mut audio);
        snd.s_stop_all_sounds(&mut audio);
        assert_eq!(snd.stats().active, 0);
        assert!(audio.playing.is_empty());
    }
}
