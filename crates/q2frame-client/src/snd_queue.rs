// snd_queue.rs — audio backend that forwards owned commands to a mixer thread

use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use q2frame_common::q_shared::Vec3;

use crate::client::SoundHandle;
use crate::snd_dma::{AudioBackend, ChannelId, ChannelState};

/// One backend call, copied out so the mixer never sees pipeline state.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    SetState(ChannelId, ChannelState),
    Play(ChannelId, SoundHandle, bool),
    Pause(ChannelId),
    Resume(ChannelId),
    Stop(ChannelId),
    Listener { origin: Vec3, forward: Vec3, up: Vec3 },
    Stream(Vec<i16>),
}

/// Playing flags per mix channel, the stream last. Written by the mixer.
#[derive(Debug, Clone)]
pub struct PlayingFlags {
    flags: Arc<Mutex<Vec<bool>>>,
}

impl PlayingFlags {
    fn new(channels: usize) -> Self {
        Self { flags: Arc::new(Mutex::new(vec![false; channels + 1])) }
    }

    fn slot(&self, id: ChannelId, len: usize) -> Option<usize> {
        match id {
            ChannelId::Mix(i) if i + 1 < len => Some(i),
            ChannelId::Mix(_) => None,
            ChannelId::Stream => Some(len - 1),
        }
    }

    pub fn get(&self, id: ChannelId) -> bool {
        let flags = self.flags.lock();
        self.slot(id, flags.len()).is_some_and(|i| flags[i])
    }

    pub fn set(&self, id: ChannelId, playing: bool) {
        let mut flags = self.flags.lock();
        if let Some(i) = self.slot(id, flags.len()) {
            flags[i] = playing;
        }
    }
}

pub struct QueuedAudioBackend {
    tx: Sender<AudioCommand>,
    playing: PlayingFlags,
    dropped: u64,
}

/// The mixer side of a `QueuedAudioBackend`.
pub struct AudioConsumer {
    rx: Receiver<AudioCommand>,
    playing: PlayingFlags,
}

impl QueuedAudioBackend {
    pub fn new(queue_len: usize, channels: usize) -> (Self, AudioConsumer) {
        let (tx, rx) = bounded(queue_len);
        let playing = PlayingFlags::new(channels);
        let consumer = AudioConsumer { rx, playing: playing.clone() };
        (Self { tx, playing, dropped: 0 }, consumer)
    }

    /// Commands lost to a full queue or a gone mixer.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn send(&mut self, cmd: AudioCommand) {
        match self.tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::trace!("audio queue full, command dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                log::trace!("audio mixer gone, command dropped");
            }
        }
    }
}

impl AudioBackend for QueuedAudioBackend {
    fn set_channel_state(&mut self, id: ChannelId, state: &ChannelState) {
        self.send(AudioCommand::SetState(id, *state));
    }

    fn play(&mut self, id: ChannelId, sound: SoundHandle, looping: bool) {
        // visible as playing until the mixer says otherwise
        self.playing.set(id, true);
        self.send(AudioCommand::Play(id, sound, looping));
    }

    fn pause(&mut self, id: ChannelId) {
        self.send(AudioCommand::Pause(id));
    }

    fn resume(&mut self, id: ChannelId) {
        self.send(AudioCommand::Resume(id));
    }

    fn stop(&mut self, id: ChannelId) {
        self.playing.set(id, false);
        self.send(AudioCommand::Stop(id));
    }

    fn is_playing(&self, id: ChannelId) -> bool {
        self.playing.get(id)
    }

    fn update_listener(&mut self, origin: &Vec3, forward: &Vec3, up: &Vec3) {
        self.send(AudioCommand::Listener { origin: *origin, forward: *forward, up: *up });
    }

    fn queue_stream_buffer(&mut self, samples: &[i16]) {
        self.send(AudioCommand::Stream(samples.to_vec()));
    }
}

impl AudioConsumer {
    /// Blocking receive; None once the producer is gone.
    pub fn recv(&self) -> Option<AudioCommand> {
        self.rx.recv().ok()
    }

    /// Everything queued right now.
    pub fn drain(&self) -> impl Iterator<Item = AudioCommand> + '_ {
        self.rx.try_iter()
    }

    /// Mark a channel finished, so the pipeline can reuse it.
    pub fn finish(&self, id: ChannelId) {
        self.playing.set(id, false);
    }
}
