// ref_def.rs — the frame descriptor handed to a rendering backend

use std::sync::Arc;

use parking_lot::Mutex;
use q2frame_common::q_shared::{RenderFlags, Vec3, AREABITS_BYTES, MAX_LIGHTSTYLES};

use crate::client::{ModelHandle, MAX_DLIGHTS};

// ============================================================
// Descriptor records
// ============================================================

/// entity_t — one thing to draw, in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Entity {
    pub model: ModelHandle,
    pub angles: Vec3,
    pub origin: Vec3,    // also used as RF_BEAM's "from"
    pub frame: i32,      // also used as RF_BEAM's diameter
    pub oldorigin: Vec3, // also used as RF_BEAM's "to"
    pub oldframe: i32,
    pub backlerp: f32, // 0.0 = current, 1.0 = old
    pub skinnum: i32,  // also used as RF_BEAM's palette index
    pub alpha: f32,    // ignore if RF_TRANSLUCENT isn't set
    pub flags: RenderFlags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DLight {
    pub origin: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Particle {
    pub origin: Vec3,
    pub color: i32,
    pub alpha: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightStyle {
    pub rgb: [f32; 3], // 0.0 - 2.0
    pub white: f32,    // highest of rgb
}

impl Default for LightStyle {
    fn default() -> Self {
        Self { rgb: [1.0; 3], white: 3.0 }
    }
}

// ============================================================
// FrameDescriptor (refdef_t)
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    pub fov_x: f32,
    pub vieworg: Vec3,
    pub viewangles: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub blend: [f32; 4], // rgba 0-1 full screen blend
    pub time: f32,       // seconds, used to auto animate
    pub server_frame: i32,
    pub rdflags: i32,
    pub areabits: [u8; AREABITS_BYTES],
    pub lightstyles: Vec<LightStyle>,
    pub entities: Vec<Entity>,
    pub dlights: Vec<DLight>,
    pub particles: Vec<Particle>,
}

/// Counts used for per-tick reporting and determinism checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub server_frame: i32,
    pub entities: usize,
    pub dlights: usize,
    pub particles: usize,
}

impl FrameDescriptor {
    /// All backing storage sized up front. Assembly never grows it.
    pub fn with_capacity(max_entities: usize, max_particles: usize) -> Self {
        Self {
            fov_x: 90.0,
            vieworg: [0.0; 3],
            viewangles: [0.0; 3],
            forward: [1.0, 0.0, 0.0],
            right: [0.0, -1.0, 0.0],
            up: [0.0, 0.0, 1.0],
            blend: [0.0; 4],
            time: 0.0,
            server_frame: 0,
            rdflags: 0,
            areabits: [0; AREABITS_BYTES],
            lightstyles: Vec::with_capacity(MAX_LIGHTSTYLES),
            entities: Vec::with_capacity(max_entities),
            dlights: Vec::with_capacity(MAX_DLIGHTS),
            particles: Vec::with_capacity(max_particles),
        }
    }

    /// Drop content, keep allocations.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.dlights.clear();
        self.particles.clear();
        self.lightstyles.clear();
        self.blend = [0.0; 4];
        self.rdflags = 0;
    }

    pub fn summary(&self) -> FrameSummary {
        FrameSummary {
            server_frame: self.server_frame,
            entities: self.entities.len(),
            dlights: self.dlights.len(),
            particles: self.particles.len(),
        }
    }
}

impl Default for FrameDescriptor {
    fn default() -> Self {
        Self::with_capacity(0, 0)
    }
}

// ============================================================
// Rendering backend
// ============================================================

/// Consumes a descriptor before returning. The caller reuses its buffers next tick.
pub trait RenderBackend {
    fn submit_frame(&mut self, frame: &FrameDescriptor);
}

#[derive(Debug, Default)]
pub struct NullRenderer {
    pub frames: u64,
}

impl RenderBackend for NullRenderer {
    fn submit_frame(&mut self, _frame: &FrameDescriptor) {
        self.frames += 1;
    }
}

/// Latest-frame slot shared with a render thread.
#[derive(Debug, Default)]
struct MailboxSlot {
    frame: FrameDescriptor,
    sequence: u64,
}

/// Single-slot double buffer: the producer copies into the slot under the lock,
/// the consumer copies out. Neither side sees a partially written frame.
#[derive(Clone, Debug, Default)]
pub struct FrameMailbox {
    slot: Arc<Mutex<MailboxSlot>>,
}

impl FrameMailbox {
    pub fn new(max_entities: usize, max_particles: usize) -> Self {
        Self {
            slot: Arc::new(Mutex::new(MailboxSlot {
                frame: FrameDescriptor::with_capacity(max_entities, max_particles),
                sequence: 0,
            })),
        }
    }

    pub fn publish(&self, frame: &FrameDescriptor) {
        let mut slot = self.slot.lock();
        slot.frame.clone_from(frame);
        slot.sequence += 1;
    }

    /// Copy the newest frame into `out` if it is newer than `last_seen`.
    pub fn take_newer(&self, last_seen: u64, out: &mut FrameDescriptor) -> Option<u64> {
        let slot = self.slot.lock();
        if slot.sequence <= last_seen {
            return None;
        }
        out.clone_from(&slot.frame);
        Some(slot.sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }
}

/// Render backend that only publishes to a mailbox.
#[derive(Debug, Clone)]
pub struct MailboxRenderer {
    mailbox: FrameMailbox,
}

impl MailboxRenderer {
    pub fn new(mailbox: FrameMailbox) -> Self {
        Self { mailbox }
    }
}

impl RenderBackend for MailboxRenderer {
    fn submit_frame(&mut self, frame: &FrameDescriptor) {
        self.mailbox.publish(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_keeps_capacity() {
        let mut fd = FrameDescriptor::with_capacity(8, 16);
        fd.entities.push(Entity::default());
        fd.particles.push(Particle::default());
        fd.clear();
        assert!(fd.entities.is_empty());
        assert!(fd.entities.capacity() >= 8);
        assert!(fd.particles.capacity() >= 16);
        assert!(fd.dlights.capacity() >= MAX_DLIGHTS);
    }

    #[test]
    fn mailbox_hands_over_latest_copy() {
        let mailbox = FrameMailbox::new(4, 4);
        let mut renderer = MailboxRenderer::new(mailbox.clone());

        let mut fd = FrameDescriptor::with_capacity(4, 4);
        fd.server_frame = 7;
        fd.entities.push(Entity { frame: 3, ..Entity::default() });
        renderer.submit_frame(&fd);

        // producer reuses its buffer; the published copy is unaffected
        fd.clear();
        fd.server_frame = 8;

        let mut out = FrameDescriptor::default();
        let seq = mailbox.take_newer(0, &mut out);
        assert_eq!(seq, Some(1));
        assert_eq!(out.server_frame, 7);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(mailbox.take_newer(1, &mut out), None);
    }

    #[test]
    fn summary_counts() {
        let mut fd = FrameDescriptor::with_capacity(4, 4);
        fd.entities.push(Entity::default());
        fd.dlights.push(DLight::default());
        let s = fd.summary();
        assert_eq!((s.entities, s.dlights, s.particles), (1, 1, 0));
    }
}
