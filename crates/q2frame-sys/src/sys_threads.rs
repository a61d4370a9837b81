// sys_threads.rs — render and mixer consumer threads for the headless driver
//
// Both threads only ever see copied-out artifacts: the render thread copies
// frames out of a mailbox, the mixer thread owns the commands it receives.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use q2frame_client::ref_def::{FrameDescriptor, FrameMailbox};
use q2frame_client::snd_dma::ChannelId;
use q2frame_client::snd_queue::{AudioCommand, AudioConsumer};

/// How often the render thread looks for a new frame.
const RENDER_POLL_MS: u64 = 4;

/// A one-shot is reported finished after this many further commands.
pub const ONESHOT_LIFETIME_COMMANDS: u32 = 48;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub frames: u64,
    pub skipped: u64,
    pub entities: u64,
    pub particles: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerReport {
    pub commands: u64,
    pub plays: u64,
    pub finished: u64,
    pub stream_samples: u64,
}

/// Consume published frames until `shutdown` is raised.
pub fn spawn_render_thread(mailbox: FrameMailbox, shutdown: Arc<AtomicBool>) -> io::Result<JoinHandle<RenderReport>> {
    thread::Builder::new()
        .name("render".into())
        .spawn(move || render_loop(&mailbox, &shutdown))
}

fn render_loop(mailbox: &FrameMailbox, shutdown: &AtomicBool) -> RenderReport {
    let mut report = RenderReport::default();
    let mut frame = FrameDescriptor::default();
    let mut seen = 0;
    loop {
        // one last look after shutdown so the final frame is counted
        let stopping = shutdown.load(Ordering::Acquire);
        if let Some(seq) = mailbox.take_newer(seen, &mut frame) {
            report.skipped += seq - seen - 1;
            seen = seq;
            report.frames += 1;
            report.entities += frame.entities.len() as u64;
            report.particles += frame.particles.len() as u64;
        }
        if stopping {
            break;
        }
        thread::sleep(Duration::from_millis(RENDER_POLL_MS));
    }
    log::debug!("render thread done after {} frames", report.frames);
    report
}

/// Drain audio commands until the producer side is dropped.
pub fn spawn_mixer_thread(consumer: AudioConsumer) -> io::Result<JoinHandle<MixerReport>> {
    thread::Builder::new()
        .name("mixer".into())
        .spawn(move || mixer_loop(&consumer))
}

fn mixer_loop(consumer: &AudioConsumer) -> MixerReport {
    let mut report = MixerReport::default();
    let mut oneshots: HashMap<ChannelId, u32> = HashMap::new();
    while let Some(cmd) = consumer.recv() {
        report.commands += 1;
        match cmd {
            AudioCommand::Play(id, _, looping) => {
                report.plays += 1;
                if !looping && id != ChannelId::Stream {
                    oneshots.insert(id, 0);
                }
            }
            AudioCommand::Stop(id) => {
                oneshots.remove(&id);
            }
            AudioCommand::Stream(samples) => report.stream_samples += samples.len() as u64,
            AudioCommand::SetState(..)
            | AudioCommand::Pause(_)
            | AudioCommand::Resume(_)
            | AudioCommand::Listener { .. } => {}
        }

        oneshots.retain(|&id, age| {
            *age += 1;
            if *age < ONESHOT_LIFETIME_COMMANDS {
                return true;
            }
            consumer.finish(id);
            report.finished += 1;
            false
        });
    }
    log::debug!("mixer thread done after {} commands", report.commands);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use q2frame_client::client::SoundHandle;
    use q2frame_client::ref_def::{MailboxRenderer, RenderBackend};
    use q2frame_client::snd_dma::AudioBackend;
    use q2frame_client::snd_queue::QueuedAudioBackend;

    #[test]
    fn mixer_finishes_oneshots_and_exits_with_the_producer() {
        let (mut audio, consumer) = QueuedAudioBackend::new(512, 4);
        let mixer = spawn_mixer_thread(consumer).unwrap();
        audio.play(ChannelId::Mix(0), SoundHandle(1), false);
        audio.play(ChannelId::Mix(1), SoundHandle(2), true);
        for _ in 0..ONESHOT_LIFETIME_COMMANDS {
            audio.queue_stream_buffer(&[0; 8]);
        }
        drop(audio);
        let report = mixer.join().unwrap();
        assert_eq!(report.plays, 2);
        assert_eq!(report.finished, 1);
        assert_eq!(report.stream_samples, 8 * ONESHOT_LIFETIME_COMMANDS as u64);
    }

    #[test]
    fn render_thread_sees_the_last_frame() {
        let mailbox = FrameMailbox::new(4, 4);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut renderer = MailboxRenderer::new(mailbox.clone());
        let render = spawn_render_thread(mailbox, shutdown.clone()).unwrap();
        renderer.submit_frame(&FrameDescriptor::default());
        shutdown.store(true, Ordering::Release);
        let report = render.join().unwrap();
        assert_eq!(report.frames + report.skipped, 1);
    }
}
