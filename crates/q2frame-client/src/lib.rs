// Client presentation pipeline: snapshots in, frame descriptors and audio out.
pub mod client;
pub mod ref_def;
pub mod cl_pool;
pub mod cl_snap;
pub mod cl_lerp;
pub mod cl_fx;
pub mod cl_tent;
pub mod cl_ents;
pub mod cl_view;
pub mod snd_dma;
pub mod snd_queue;
pub mod cl_bgmusic;
pub mod cl_main;
