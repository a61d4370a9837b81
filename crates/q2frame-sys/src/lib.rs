// Headless host: scripted server, consumer threads and a synthetic music track.
pub mod bgm_synth;
pub mod sv_script;
pub mod sys_threads;
