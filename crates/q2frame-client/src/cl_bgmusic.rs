// cl_bgmusic.rs — the background music stream channel

use crate::snd_dma::{AudioBackend, ChannelId};
use crate::client::SoundHandle;

/// Samples read per buffer.
pub const STREAM_BUFFER_SAMPLES: usize = 4096;
/// Buffers read per update at most.
pub const MAX_STREAM_READS: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream read error: {0}")]
    Read(String),
    #[error("stream seek error: {0}")]
    Rewind(String),
    #[error("stream has no data")]
    NoData,
}

/// A decoded PCM source. `read` returning 0 is end of stream.
pub trait StreamSource: Send {
    fn read(&mut self, out: &mut [i16]) -> Result<usize, StreamError>;
    /// True when the read head actually moved back to the start.
    fn rewind(&mut self) -> Result<bool, StreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MusicState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

pub struct BackgroundMusic {
    source: Option<Box<dyn StreamSource>>,
    state: MusicState,
    looping: bool,
    empty_eofs: u32,
    buf: Vec<i16>,
    queued: u64,
}

impl Default for BackgroundMusic {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundMusic {
    pub fn new() -> Self {
        Self {
            source: None,
            state: MusicState::Stopped,
            looping: false,
            empty_eofs: 0,
            buf: vec![0; STREAM_BUFFER_SAMPLES],
            queued: 0,
        }
    }

    pub fn state(&self) -> MusicState {
        self.state
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Samples handed to the backend since construction.
    pub fn queued_samples(&self) -> u64 {
        self.queued
    }

    /// BGM_Play: replaces whatever was playing.
    pub fn play(&mut self, source: Box<dyn StreamSource>, looping: bool, backend: &mut dyn AudioBackend) {
        if self.state != MusicState::Stopped {
            self.stop(backend);
        }
        self.source = Some(source);
        self.looping = looping;
        self.empty_eofs = 0;
        self.state = MusicState::Playing;
        backend.play(ChannelId::Stream, SoundHandle::NONE, false);
        log::info!("music started{}", if looping { " (looping)" } else { "" });
    }

    pub fn pause(&mut self, backend: &mut dyn AudioBackend) {
        if self.state != MusicState::Playing {
            log::debug!("music pause ignored while {:?}", self.state);
            return;
        }
        self.state = MusicState::Paused;
        backend.pause(ChannelId::Stream);
    }

    pub fn resume(&mut self, backend: &mut dyn AudioBackend) {
        if self.state != MusicState::Paused {
            log::debug!("music resume ignored while {:?}", self.state);
            return;
        }
        self.state = MusicState::Playing;
        backend.resume(ChannelId::Stream);
    }

    pub fn stop(&mut self, backend: &mut dyn AudioBackend) {
        if self.state == MusicState::Stopped {
            log::debug!("music already stopped");
            return;
        }
        self.state = MusicState::Stopped;
        self.source = None;
        self.empty_eofs = 0;
        backend.stop(ChannelId::Stream);
        log::info!("music stopped");
    }

    /// BGM_UpdateStream: read up to `MAX_STREAM_READS` buffers and queue them.
    pub fn update(&mut self, volume: f32, backend: &mut dyn AudioBackend) {
        if self.state != MusicState::Playing || volume <= 0.0 {
            return;
        }

        let mut did_rewind = false;
        for _ in 0..MAX_STREAM_READS {
            let Some(source) = self.source.as_mut() else {
                return;
            };
            let n = match source.read(&mut self.buf) {
                Ok(n) => n.min(self.buf.len()),
                Err(e) => {
                    log::warn!("{}, stopping", e);
                    self.stop(backend);
                    return;
                }
            };

            if n > 0 {
                backend.queue_stream_buffer(&self.buf[..n]);
                self.queued += n as u64;
                self.empty_eofs = 0;
                did_rewind = false;
                continue;
            }

            // end of stream
            if did_rewind {
                break;
            }
            self.empty_eofs += 1;
            if self.empty_eofs >= 2 {
                log::warn!("{}: stream keeps returning EOF", StreamError::NoData);
                self.stop(backend);
                return;
            }
            if !self.looping {
                self.stop(backend);
                return;
            }
            match source.rewind() {
                Ok(true) => {
                    self.empty_eofs = 0;
                    did_rewind = true;
                }
                Ok(false) => did_rewind = true,
                Err(e) => {
                    log::warn!("{}, stopping", e);
                    self.stop(backend);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snd_dma::tests::RecordingAudio;
    use std::collections::VecDeque;

    /// Plays back a fixed list of read results; rewinds report `rewinds`.
    struct Scripted {
        reads: VecDeque<Result<usize, StreamError>>,
        rewinds: Result<bool, StreamError>,
        rewound: usize,
    }

    impl Scripted {
        fn new(reads: Vec<Result<usize, StreamError>>, rewinds: Result<bool, StreamError>) -> Box<Self> {
            Box::new(Self { reads: reads.into(), rewinds, rewound: 0 })
        }
    }

    impl StreamSource for Scripted {
        fn read(&mut self, out: &mut [i16]) -> Result<usize, StreamError> {
            let r = self.reads.pop_front().unwrap_or(Ok(0))?;
            out[..r].fill(7);
            Ok(r)
        }
        fn rewind(&mut self) -> Result<bool, StreamError> {
            self.rewound += 1;
            self.rewinds.clone()
        }
    }

    #[test]
    fn non_looping_stream_stops_at_end() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        music.play(Scripted::new(vec![Ok(100), Ok(0)], Ok(true)), false, &mut audio);
        music.update(1.0, &mut audio);
        assert_eq!(music.state(), MusicState::Stopped);
        assert_eq!(audio.stream.len(), 100);
        assert!(audio.stops.contains(&ChannelId::Stream));
    }

    #[test]
    fn looping_stream_rewinds_and_continues() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        music.play(Scripted::new(vec![Ok(10), Ok(0), Ok(20), Ok(30)], Ok(true)), true, &mut audio);
        music.update(1.0, &mut audio);
        assert_eq!(music.state(), MusicState::Playing);
        assert_eq!(audio.stream.len(), 60);
    }

    #[test]
    fn empty_reads_with_successful_rewinds_keep_playing() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        music.play(Scripted::new(vec![], Ok(true)), true, &mut audio);
        for _ in 0..5 {
            music.update(1.0, &mut audio);
        }
        assert_eq!(music.state(), MusicState::Playing);
    }

    #[test]
    fn rewind_without_progress_is_a_dead_stream() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        music.play(Scripted::new(vec![], Ok(false)), true, &mut audio);
        // first tick: EOF, rewind, EOF ends the tick
        music.update(1.0, &mut audio);
        assert_eq!(music.state(), MusicState::Playing);
        // second consecutive EOF without progress
        music.update(1.0, &mut audio);
        assert_eq!(music.state(), MusicState::Stopped);
    }

    #[test]
    fn rewind_error_stops_immediately() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        music.play(Scripted::new(vec![Ok(0)], Err(StreamError::Rewind("bad seek".into()))), true, &mut audio);
        music.update(1.0, &mut audio);
        assert_eq!(music.state(), MusicState::Stopped);
    }

    #[test]
    fn read_error_stops() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        music.play(Scripted::new(vec![Err(StreamError::Read("truncated".into()))], Ok(true)), true, &mut audio);
        music.update(1.0, &mut audio);
        assert_eq!(music.state(), MusicState::Stopped);
    }

    #[test]
    fn reads_are_bounded_per_update() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        let reads = (0..10).map(|_| Ok(STREAM_BUFFER_SAMPLES)).collect();
        music.play(Scripted::new(reads, Ok(true)), false, &mut audio);
        music.update(1.0, &mut audio);
        assert_eq!(audio.stream.len(), MAX_STREAM_READS * STREAM_BUFFER_SAMPLES);
    }

    #[test]
    fn pause_and_resume_transitions() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        // invalid in Stopped
        music.pause(&mut audio);
        music.resume(&mut audio);
        assert_eq!(music.state(), MusicState::Stopped);

        music.play(Scripted::new(vec![Ok(5); 8], Ok(true)), false, &mut audio);
        music.resume(&mut audio);
        assert_eq!(music.state(), MusicState::Playing);
        music.pause(&mut audio);
        assert_eq!(music.state(), MusicState::Paused);
        assert!(audio.paused.contains(&ChannelId::Stream));

        // paused streams read nothing
        music.update(1.0, &mut audio);
        assert!(audio.stream.is_empty());

        music.resume(&mut audio);
        assert_eq!(music.state(), MusicState::Playing);
        music.update(1.0, &mut audio);
        assert_eq!(audio.stream.len(), 20);
    }

    #[test]
    fn silent_volume_reads_nothing() {
        let mut music = BackgroundMusic::new();
        let mut audio = RecordingAudio::default();
        music.play(Scripted::new(vec![Ok(5)], Ok(true)), false, &mut audio);
        music.update(0.0, &mut audio);
        assert!(audio.stream.is_empty());
        assert_eq!(music.state(), MusicState::Playing);
    }
}
