// cl_snap.rs — authoritative snapshot store, history ring and delta decoding

use std::collections::BTreeMap;

use q2frame_common::q_shared::{
    EffectFlags, EntityState, PlayerView, RenderFlags, Vec3, UPDATE_BACKUP, UPDATE_MASK,
};

// ============================================================
// Types
// ============================================================

/// One authoritative, timestamped view of the world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySnapshotFrame {
    pub server_frame: i32,
    pub server_time: i32, // ms
    pub delta_frame: i32, // -1 = uncompressed
    pub player: PlayerView,
    pub entities: BTreeMap<i32, EntityState>,
}

impl EntitySnapshotFrame {
    pub fn new(server_frame: i32, server_time: i32) -> Self {
        Self { server_frame, server_time, delta_frame: -1, ..Self::default() }
    }

    pub fn insert(&mut self, state: EntityState) {
        self.entities.insert(state.number, state);
    }
}

/// Changed fields of one entity against the delta base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDelta {
    pub number: i32,
    pub remove: bool,
    pub origin: Option<Vec3>,
    pub angles: Option<Vec3>,
    pub old_origin: Option<Vec3>,
    pub modelindex: Option<i32>,
    pub modelindex2: Option<i32>,
    pub frame: Option<i32>,
    pub skinnum: Option<i32>,
    pub effects: Option<EffectFlags>,
    pub renderfx: Option<RenderFlags>,
    pub sound: Option<i32>,
    pub event: Option<i32>,
}

impl EntityDelta {
    pub fn remove(number: i32) -> Self {
        Self { number, remove: true, ..Self::default() }
    }

    fn apply(&self, base: &EntityState) -> EntityState {
        let mut to = *base;
        to.number = self.number;
        // events are impulses, never carried forward
        to.event = self.event.unwrap_or(0);
        to.old_origin = self.old_origin.unwrap_or(base.origin);
        if let Some(v) = self.origin {
            to.origin = v;
        }
        if let Some(v) = self.angles {
            to.angles = v;
        }
        if let Some(v) = self.modelindex {
            to.modelindex = v;
        }
        if let Some(v) = self.modelindex2 {
            to.modelindex2 = v;
        }
        if let Some(v) = self.frame {
            to.frame = v;
        }
        if let Some(v) = self.skinnum {
            to.skinnum = v;
        }
        if let Some(v) = self.effects {
            to.effects = v;
        }
        if let Some(v) = self.renderfx {
            to.renderfx = v;
        }
        if let Some(v) = self.sound {
            to.sound = v;
        }
        to
    }
}

/// Compressed frame: a base frame number plus per-entity changes.
/// Entities of the base not named here are carried over unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDelta {
    pub server_frame: i32,
    pub server_time: i32,
    pub delta_frame: i32, // <= 0: against baselines
    pub player: PlayerView,
    pub entities: Vec<EntityDelta>,
}

/// What the transport delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotMessage {
    Full(EntitySnapshotFrame),
    Delta(FrameDelta),
}

/// Transport seam: at most one message is consumed per tick.
pub trait SnapshotSource {
    fn next_snapshot(&mut self) -> Option<SnapshotMessage>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("stale snapshot: time {incoming} <= current {current}")]
    Stale { incoming: i32, current: i32 },
    #[error("delta base frame {0} unavailable")]
    BadDeltaBase(i32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub accepted: u64,
    pub stale: u64,
    pub undecodable: u64,
}

/// Borrow of the two live frames, valid for one render frame.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotPair<'a> {
    pub previous: &'a EntitySnapshotFrame,
    pub current: &'a EntitySnapshotFrame,
    /// False until two frames have arrived since the last reset.
    pub interpolate: bool,
}

// ============================================================
// Store
// ============================================================

pub struct SnapshotStore {
    previous: Option<EntitySnapshotFrame>,
    current: Option<EntitySnapshotFrame>,
    history: Vec<Option<EntitySnapshotFrame>>,
    baselines: BTreeMap<i32, EntityState>,
    received: u32,
    stats: SnapshotStats,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let mut history = Vec::with_capacity(UPDATE_BACKUP);
        history.resize_with(UPDATE_BACKUP, || None);
        Self {
            previous: None,
            current: None,
            history,
            baselines: BTreeMap::new(),
            received: 0,
            stats: SnapshotStats::default(),
        }
    }

    /// Accept a full frame whose time strictly exceeds the current one.
    /// Stale and duplicate frames are refused and left untouched.
    pub fn ingest(&mut self, frame: EntitySnapshotFrame) -> Result<(), SnapshotError> {
        if let Some(cur) = &self.current {
            if frame.server_time <= cur.server_time {
                self.stats.stale += 1;
                return Err(SnapshotError::Stale {
                    incoming: frame.server_time,
                    current: cur.server_time,
                });
            }
        }

        self.history[frame.server_frame as usize & UPDATE_MASK] = Some(frame.clone());
        self.stats.accepted += 1;
        self.received = self.received.saturating_add(1);

        match self.current.take() {
            Some(cur) => self.previous = Some(cur),
            // first frame after reset fills both slots
            None => self.previous = Some(frame.clone()),
        }
        self.current = Some(frame);
        Ok(())
    }

    /// Reconstruct a full frame from the history ring.
    pub fn decode_delta(&self, delta: &FrameDelta) -> Result<EntitySnapshotFrame, SnapshotError> {
        let empty = BTreeMap::new();
        let base_entities = if delta.delta_frame <= 0 {
            &empty
        } else {
            let age = delta
                .server_frame
                .checked_sub(delta.delta_frame)
                .ok_or(SnapshotError::BadDeltaBase(delta.delta_frame))?;
            if age <= 0 || age >= (UPDATE_BACKUP - 1) as i32 {
                return Err(SnapshotError::BadDeltaBase(delta.delta_frame));
            }
            match &self.history[delta.delta_frame as usize & UPDATE_MASK] {
                Some(old) if old.server_frame == delta.delta_frame => &old.entities,
                _ => return Err(SnapshotError::BadDeltaBase(delta.delta_frame)),
            }
        };

        let mut entities = BTreeMap::new();
        for (&num, state) in base_entities {
            let mut carried = *state;
            carried.event = 0;
            carried.old_origin = state.origin;
            entities.insert(num, carried);
        }

        for ed in &delta.entities {
            if ed.remove {
                entities.remove(&ed.number);
                continue;
            }
            let base = match base_entities.get(&ed.number) {
                Some(s) => *s,
                None => self.baseline(ed.number),
            };
            entities.insert(ed.number, ed.apply(&base));
        }

        Ok(EntitySnapshotFrame {
            server_frame: delta.server_frame,
            server_time: delta.server_time,
            delta_frame: delta.delta_frame,
            player: delta.player,
            entities,
        })
    }

    /// Decode then ingest. An undecodable delta is dropped.
    pub fn ingest_delta(&mut self, delta: &FrameDelta) -> Result<(), SnapshotError> {
        match self.decode_delta(delta) {
            Ok(frame) => self.ingest(frame),
            Err(e) => {
                self.stats.undecodable += 1;
                Err(e)
            }
        }
    }

    pub fn ingest_message(&mut self, msg: SnapshotMessage) -> Result<(), SnapshotError> {
        match msg {
            SnapshotMessage::Full(frame) => self.ingest(frame),
            SnapshotMessage::Delta(delta) => self.ingest_delta(&delta),
        }
    }

    /// State new entities start from. Zeroed unless set.
    pub fn baseline(&self, number: i32) -> EntityState {
        self.baselines
            .get(&number)
            .copied()
            .unwrap_or_else(|| EntityState::new(number))
    }

    pub fn set_baseline(&mut self, state: EntityState) {
        self.baselines.insert(state.number, state);
    }

    /// Forget both live frames and the ring. Interpolation is off until two frames arrive.
    pub fn reset(&mut self) {
        self.previous = None;
        self.current = None;
        for h in &mut self.history {
            *h = None;
        }
        self.baselines.clear();
        self.received = 0;
    }

    pub fn get_pair(&self) -> Option<SnapshotPair<'_>> {
        let (previous, current) = (self.previous.as_ref()?, self.current.as_ref()?);
        let interpolate = self.received >= 2;
        if interpolate {
            assert!(
                current.server_time > previous.server_time,
                "snapshot order corrupted: current {} <= previous {}",
                current.server_time,
                previous.server_time
            );
        }
        Some(SnapshotPair { previous, current, interpolate })
    }

    pub fn current(&self) -> Option<&EntitySnapshotFrame> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> SnapshotStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(num: i32, time: i32, ents: &[(i32, f32)]) -> EntitySnapshotFrame {
        let mut f = EntitySnapshotFrame::new(num, time);
        for &(n, x) in ents {
            let mut s = EntityState::new(n);
            s.origin = [x, 0.0, 0.0];
            s.modelindex = 1;
            f.insert(s);
        }
        f
    }

    #[test]
    fn first_frame_fills_both_slots() {
        let mut store = SnapshotStore::new();
        store.ingest(frame(1, 100, &[(1, 5.0)])).unwrap();
        let pair = store.get_pair().unwrap();
        assert!(!pair.interpolate);
        assert_eq!(pair.previous, pair.current);
    }

    #[test]
    fn rotation_and_stale_rejection() {
        let mut store = SnapshotStore::new();
        store.ingest(frame(1, 100, &[])).unwrap();
        store.ingest(frame(2, 200, &[])).unwrap();
        assert_eq!(
            store.ingest(frame(3, 200, &[])),
            Err(SnapshotError::Stale { incoming: 200, current: 200 })
        );
        assert!(store.ingest(frame(0, 50, &[])).is_err());
        let pair = store.get_pair().unwrap();
        assert!(pair.interpolate);
        assert_eq!(pair.previous.server_time, 100);
        assert_eq!(pair.current.server_time, 200);
        assert_eq!(store.stats(), SnapshotStats { accepted: 2, stale: 2, undecodable: 0 });
    }

    #[test]
    fn reset_invalidates_interpolation() {
        let mut store = SnapshotStore::new();
        store.ingest(frame(1, 100, &[])).unwrap();
        store.ingest(frame(2, 200, &[])).unwrap();
        store.reset();
        assert!(store.get_pair().is_none());
        // older time is fine after a reset
        store.ingest(frame(1, 50, &[])).unwrap();
        assert!(!store.get_pair().unwrap().interpolate);
        store.ingest(frame(2, 150, &[])).unwrap();
        assert!(store.get_pair().unwrap().interpolate);
    }

    #[test]
    fn delta_against_history() {
        let mut store = SnapshotStore::new();
        let mut base = frame(10, 1000, &[(1, 0.0), (2, 50.0), (3, 9.0)]);
        base.entities.get_mut(&2).unwrap().event = 4;
        store.ingest(base).unwrap();

        let delta = FrameDelta {
            server_frame: 11,
            server_time: 1100,
            delta_frame: 10,
            player: PlayerView::default(),
            entities: vec![
                EntityDelta { number: 1, origin: Some([8.0, 0.0, 0.0]), ..Default::default() },
                EntityDelta::remove(3),
                EntityDelta { number: 7, modelindex: Some(2), ..Default::default() },
            ],
        };
        let out = store.decode_delta(&delta).unwrap();
        assert_eq!(out.entities.keys().copied().collect::<Vec<_>>(), vec![1, 2, 7]);
        let e1 = out.entities[&1];
        assert_eq!(e1.origin, [8.0, 0.0, 0.0]);
        assert_eq!(e1.old_origin, [0.0, 0.0, 0.0]);
        // unchanged entity carried, event cleared
        assert_eq!(out.entities[&2].origin, [50.0, 0.0, 0.0]);
        assert_eq!(out.entities[&2].event, 0);
        // new entity from a zeroed baseline
        assert_eq!(out.entities[&7].origin, [0.0; 3]);
        assert_eq!(out.entities[&7].modelindex, 2);
    }

    #[test]
    fn delta_new_entity_uses_baseline() {
        let mut store = SnapshotStore::new();
        let mut b = EntityState::new(5);
        b.modelindex = 3;
        b.origin = [1.0, 2.0, 3.0];
        store.set_baseline(b);
        let delta = FrameDelta {
            server_frame: 1,
            server_time: 100,
            delta_frame: -1,
            entities: vec![EntityDelta { number: 5, frame: Some(2), ..Default::default() }],
            ..Default::default()
        };
        store.ingest_delta(&delta).unwrap();
        let e = store.current().unwrap().entities[&5];
        assert_eq!((e.modelindex, e.frame, e.origin), (3, 2, [1.0, 2.0, 3.0]));
    }

    #[test]
    fn delta_with_missing_or_old_base_is_dropped() {
        let mut store = SnapshotStore::new();
        store.ingest(frame(10, 1000, &[(1, 0.0)])).unwrap();

        let missing = FrameDelta { server_frame: 12, server_time: 1200, delta_frame: 11, ..Default::default() };
        assert_eq!(store.ingest_delta(&missing), Err(SnapshotError::BadDeltaBase(11)));

        let too_old = FrameDelta { server_frame: 40, server_time: 4000, delta_frame: 10, ..Default::default() };
        assert_eq!(store.ingest_delta(&too_old), Err(SnapshotError::BadDeltaBase(10)));

        // frame 26 reuses ring slot 10: number mismatch is a miss
        store.ingest(frame(26, 2600, &[])).unwrap();
        let aliased = FrameDelta { server_frame: 12, server_time: 2800, delta_frame: 10, ..Default::default() };
        assert!(store.ingest_delta(&aliased).is_err());

        assert_eq!(store.stats().undecodable, 3);
        assert_eq!(store.current().unwrap().server_frame, 26);
    }

    #[test]
    fn frame_numbers_that_overflow_are_bad_bases() {
        let mut store = SnapshotStore::new();
        store.ingest(frame(1, 100, &[(1, 0.0)])).unwrap();
        let wild = FrameDelta { server_frame: i32::MIN, server_time: 200, delta_frame: 1, ..Default::default() };
        assert_eq!(store.ingest_delta(&wild), Err(SnapshotError::BadDeltaBase(1)));
        let wild = FrameDelta { server_frame: i32::MAX, server_time: 200, delta_frame: 1, ..Default::default() };
        assert_eq!(store.ingest_delta(&wild), Err(SnapshotError::BadDeltaBase(1)));
        assert_eq!(store.stats().undecodable, 2);
        assert_eq!(store.current().unwrap().server_frame, 1);
    }
}
