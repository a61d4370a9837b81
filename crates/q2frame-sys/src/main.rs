// main.rs — headless driver: a scripted server through the presentation pipeline
//
// Usage: q2frame [+set <cvar> <value>]...
//   +set sys_ticks 600      ticks to run
//   +set sys_realtime 1     pace ticks with the wall clock instead of simulating it
//   +set sys_report 60      ticks between statistics lines
//   +set sys_fade 30        ticks over which s_volume fades out at the end
//   +set developer 1        debug logging unless RUST_LOG says otherwise

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use env_logger::Env;

use q2frame_client::cl_main::ClientPresentation;
use q2frame_client::cl_snap::SnapshotSource;
use q2frame_client::client::{ClientConfig, SequentialResolver};
use q2frame_client::ref_def::{FrameMailbox, MailboxRenderer};
use q2frame_client::snd_dma::SoundEvent;
use q2frame_client::snd_queue::QueuedAudioBackend;
use q2frame_common::common::sys_milliseconds;
use q2frame_common::cvar::CvarContext;
use q2frame_common::q_shared::{ATTN_NORM, CVAR_NOSET, CVAR_ZERO};
use q2frame_sys::bgm_synth::ToneSource;
use q2frame_sys::sv_script::{ScriptEvent, ScriptedServer, MODELS, SOUNDS};
use q2frame_sys::sys_threads::{spawn_mixer_thread, spawn_render_thread};

/// 60 Hz client frames.
const TICK_MS: u64 = 16;
const AUDIO_QUEUE_LEN: usize = 1024;

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cvars = CvarContext::new();
    ClientConfig::register(&mut cvars);
    cvars.get("sys_ticks", "600", CVAR_ZERO);
    cvars.get("sys_realtime", "0", CVAR_ZERO);
    cvars.get("sys_report", "60", CVAR_ZERO);
    cvars.get("sys_fade", "30", CVAR_ZERO);
    cvars.apply_command_line(args.iter().map(String::as_str));

    let config = ClientConfig::from_cvars(&cvars);
    let default_filter = if config.developer { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();
    cvars.full_set("version", concat!("q2frame ", env!("CARGO_PKG_VERSION")), CVAR_NOSET);

    let ticks = cvars.variable_usize("sys_ticks", 1);
    let realtime = cvars.variable_bool("sys_realtime");
    let report_every = cvars.variable_usize("sys_report", 1);
    let fade = cvars.variable_usize("sys_fade", 1).min(ticks);
    log::info!(
        "{}: {} ticks, {} entities, {} particles, {} channels",
        cvars.variable_string("version"),
        ticks,
        config.max_entities,
        config.max_particles,
        config.max_channels
    );

    let mut cl = ClientPresentation::new(&config);
    let mut resolver = SequentialResolver::default();
    cl.register_assets(&mut resolver);
    for &(index, name) in MODELS {
        cl.precache_model(index, name, &mut resolver);
    }
    for &(index, name) in SOUNDS {
        cl.precache_sound(index, name, &mut resolver);
    }
    cl.set_lightstyle(0, "m");
    cl.set_lightstyle(1, "mmnmmommommnonmmonqnmmo");
    cl.set_lightstyle(2, "abcdefghijklmnopqrstuvwxyzyxwvutsrqponmlkjihgfedcba");

    let (mut audio, consumer) = QueuedAudioBackend::new(AUDIO_QUEUE_LEN, config.max_channels);
    let mixer = spawn_mixer_thread(consumer)?;
    let mailbox = FrameMailbox::new(config.max_entities, config.max_particles);
    let shutdown = Arc::new(AtomicBool::new(false));
    let render = spawn_render_thread(mailbox.clone(), Arc::clone(&shutdown))?;
    let mut renderer = MailboxRenderer::new(mailbox);

    cl.music_mut().play(Box::new(ToneSource::new(220.0, 2.0)), true, &mut audio);

    let mut server = ScriptedServer::new();
    for baseline in server.baselines() {
        cl.on_baseline(*baseline);
    }
    let start = sys_milliseconds();
    for tick in 0..ticks {
        let remaining = ticks - tick;
        if remaining <= fade {
            let volume = config.volume * (remaining - 1) as f32 / fade as f32;
            if let Err(e) = cvars.set_value("s_volume", volume) {
                log::warn!("{}", e);
            }
        }
        if cvars.take_modified("s_volume") {
            cl.apply_cvars(&cvars);
        }
        let wall = if realtime { sys_milliseconds() - start } else { (tick as u64 * 1000 / 60) as i32 };
        server.run_to(wall);
        let snapshot = server.next_snapshot();
        cl.tick(snapshot, wall, &mut audio);

        // discrete events parsed after the frame show up next tick
        for ev in server.take_events() {
            match ev {
                ScriptEvent::Temp(event, params) => cl.on_temp_entity_event(event, &params),
                ScriptEvent::MuzzleFlash { entity, weapon } => cl.on_muzzle_flash(entity, weapon),
                ScriptEvent::Sound { index, origin } => {
                    let sound = cl.sound_handle(index);
                    cl.on_sound_event(SoundEvent::at(&origin, sound, 1.0, ATTN_NORM));
                }
            }
        }
        cl.submit(&mut renderer);

        if tick % report_every == 0 {
            let s = cl.stats();
            log::info!(
                "tick {:4} frame {:3} | ents {:3} lights {:2} parts {:5} | fx {}/{}/{} refused {} | snaps {} stale {} bad {} | snd {} loops {} | audio drops {}",
                tick,
                s.frame.server_frame,
                s.frame.entities,
                s.frame.dlights,
                s.frame.particles,
                s.effects.explosions,
                s.effects.beams,
                s.effects.lasers,
                s.effects.refused,
                s.snapshots.accepted,
                s.snapshots.stale,
                s.snapshots.undecodable,
                s.sound.active,
                s.sound.autosounds,
                audio.dropped()
            );
        }
        if realtime {
            thread::sleep(Duration::from_millis(TICK_MS));
        }
    }

    cl.on_disconnect(&mut audio);
    cl.submit(&mut renderer);
    shutdown.store(true, Ordering::Release);
    let dropped = audio.dropped();
    // closing the queue lets the mixer drain and exit
    drop(audio);

    match render.join() {
        Ok(r) => log::info!("render: {} frames, {} skipped, {} entities drawn", r.frames, r.skipped, r.entities),
        Err(_) => log::warn!("render thread panicked"),
    }
    match mixer.join() {
        Ok(m) => log::info!(
            "mixer: {} commands, {} plays, {} finished, {} stream samples, {} dropped",
            m.commands,
            m.plays,
            m.finished,
            m.stream_samples,
            dropped
        ),
        Err(_) => log::warn!("mixer thread panicked"),
    }
    Ok(())
}
