// cl_pool.rs — fixed-capacity slot pools addressed by generation-checked handles

/// Pool exhaustion. Reported by spawn calls, never fatal.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    #[error("{pool} pool exhausted ({capacity} slots)")]
    PoolExhausted { pool: &'static str, capacity: usize },
}

/// Stable reference to a pool slot. A reaped slot's old handles go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A slot is either on the free list or holds exactly one value.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    name: &'static str,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    exhausted: u64,
}

impl<T> Pool<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot { generation: 0, value: None });
        Self {
            name,
            slots,
            // lowest index pops first
            free: (0..capacity as u32).rev().collect(),
            exhausted: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Spawn attempts refused since construction.
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted
    }

    pub fn alloc(&mut self, value: T) -> Result<Handle, SpawnError> {
        let Some(index) = self.free.pop() else {
            self.exhausted += 1;
            log::trace!("{} pool full, spawn refused", self.name);
            return Err(SpawnError::PoolExhausted { pool: self.name, capacity: self.slots.len() });
        };
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        Ok(Handle { index, generation: slot.generation })
    }

    /// Return a slot to the free list. Panics on a stale handle or a double free.
    pub fn release(&mut self, handle: Handle) -> T {
        let name = self.name;
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .unwrap_or_else(|| panic!("{name} pool: handle {} out of range", handle.index));
        assert_eq!(
            slot.generation, handle.generation,
            "{name} pool: stale handle for slot {}", handle.index
        );
        let value = match slot.value.take() {
            Some(v) => v,
            None => panic!("{name} pool: double free of slot {}", handle.index),
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        value
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (Handle { index: i as u32, generation: s.generation }, v))
        })
    }

    /// Release every live value for which `expired` holds. Returns how many.
    pub fn reap(&mut self, mut expired: impl FnMut(&T) -> bool) -> usize {
        let mut reaped = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.as_ref().is_some_and(&mut expired) {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(i as u32);
                reaped += 1;
            }
        }
        reaped
    }

    /// Release everything and restore pop order.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free.clear();
        self.free.extend((0..self.slots.len() as u32).rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced<T>(p: &Pool<T>) -> bool {
        p.live_count() + p.free_count() == p.capacity()
    }

    #[test]
    fn capacity_two_refuses_third() {
        let mut pool = Pool::new("explosion", 2);
        assert!(pool.alloc(1).is_ok());
        assert!(pool.alloc(2).is_ok());
        let third = pool.alloc(3);
        assert_eq!(third, Err(SpawnError::PoolExhausted { pool: "explosion", capacity: 2 }));
        assert_eq!(pool.live_count(), 2);
        assert_eq!(pool.exhausted_count(), 1);
        assert!(balanced(&pool));
    }

    #[test]
    fn release_makes_handle_stale() {
        let mut pool = Pool::new("beam", 4);
        let h = pool.alloc("a").unwrap();
        assert_eq!(pool.release(h), "a");
        assert!(pool.get(h).is_none());
        let h2 = pool.alloc("b").unwrap();
        assert_eq!(h2.index(), h.index());
        assert_ne!(h2, h);
        assert_eq!(pool.get(h2), Some(&"b"));
        assert!(balanced(&pool));
    }

    #[test]
    #[should_panic(expected = "stale handle")]
    fn double_free_panics() {
        let mut pool = Pool::new("laser", 2);
        let h = pool.alloc(0u8).unwrap();
        pool.release(h);
        pool.release(h);
    }

    #[test]
    fn reap_returns_slots_immediately() {
        let mut pool = Pool::new("particle", 8);
        for i in 0..8 {
            pool.alloc(i).unwrap();
        }
        assert_eq!(pool.reap(|v| v % 2 == 0), 4);
        assert_eq!(pool.live_count(), 4);
        assert!(balanced(&pool));
        let live: Vec<i32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![1, 3, 5, 7]);
        for i in 0..4 {
            pool.alloc(100 + i).unwrap();
        }
        assert!(pool.alloc(0).is_err());
    }

    #[test]
    fn no_double_allocation_between_reaps() {
        let mut pool = Pool::new("explosion", 16);
        let mut seen = std::collections::HashSet::new();
        while let Ok(h) = pool.alloc(()) {
            assert!(seen.insert(h.index()));
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn clear_resets_order_and_counts() {
        let mut pool = Pool::new("beam", 3);
        let a = pool.alloc('a').unwrap();
        pool.alloc('b').unwrap();
        pool.clear();
        assert_eq!(pool.live_count(), 0);
        assert!(pool.get(a).is_none());
        assert_eq!(pool.alloc('c').unwrap().index(), 0);
    }

    #[test]
    fn display_mentions_pool() {
        let e = SpawnError::PoolExhausted { pool: "laser", capacity: 256 };
        assert_eq!(e.to_string(), "laser pool exhausted (256 slots)");
    }
}
