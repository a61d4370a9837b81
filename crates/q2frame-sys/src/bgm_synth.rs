// bgm_synth.rs — a generated PCM tone standing in for a decoded music track

use std::f32::consts::TAU;

use q2frame_client::cl_bgmusic::{StreamError, StreamSource};

pub const SAMPLE_RATE: u32 = 22050;

/// A fixed-length sine tone. End of stream after `length` samples.
#[derive(Debug, Clone)]
pub struct ToneSource {
    hz: f32,
    amplitude: f32,
    length: usize,
    position: usize,
}

impl ToneSource {
    pub fn new(hz: f32, seconds: f32) -> Self {
        Self { hz, amplitude: 0.25, length: (seconds * SAMPLE_RATE as f32) as usize, position: 0 }
    }
}

impl StreamSource for ToneSource {
    fn read(&mut self, out: &mut [i16]) -> Result<usize, StreamError> {
        let n = out.len().min(self.length - self.position);
        for (i, s) in out[..n].iter_mut().enumerate() {
            let t = (self.position + i) as f32 / SAMPLE_RATE as f32;
            *s = ((TAU * self.hz * t).sin() * self.amplitude * i16::MAX as f32) as i16;
        }
        self.position += n;
        Ok(n)
    }

    fn rewind(&mut self) -> Result<bool, StreamError> {
        if self.length == 0 {
            return Ok(false);
        }
        self.position = 0;
        Ok(true)
    }
}
