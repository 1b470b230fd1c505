/// Hands out `u32` slot indices below a fixed capacity and recycles freed ones.
///
/// Fresh indices grow monotonically from 0 (the high-water mark); freed
/// indices go to a LIFO free list and are handed out again before any fresh
/// index. Used for descriptor heap slots.
///
/// # Example
///
/// ```ignore
/// let mut slots = SlotAllocator::with_capacity(4);
/// let a = slots.try_alloc().unwrap();  // 0
/// let b = slots.try_alloc().unwrap();  // 1
/// slots.free(a);                       // 0 is now available
/// let c = slots.try_alloc().unwrap();  // 0 (recycled)
/// ```
#[derive(Debug)]
pub struct SlotAllocator {
    free_list: Vec<u32>,
    next_id: u32,
    live: u32,
    capacity: u32,
}

impl SlotAllocator {
    /// Create an empty allocator able to hold `capacity` live slots
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            free_list: Vec::new(),
            next_id: 0,
            live: 0,
            capacity,
        }
    }

    /// Take a slot, recycled first. `None` once `capacity` slots are live.
    pub fn try_alloc(&mut self) -> Option<u32> {
        if let Some(id) = self.free_list.pop() {
            self.live += 1;
            return Some(id);
        }
        if self.next_id >= self.capacity {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live += 1;
        Some(id)
    }

    /// Return a slot for reuse. Double frees and foreign ids are ignored.
    pub fn free(&mut self, id: u32) -> bool {
        if id >= self.next_id || self.free_list.contains(&id) {
            return false;
        }
        self.live -= 1;
        self.free_list.push(id);
        true
    }

    /// Highest index ever handed out + 1
    pub fn high_water_mark(&self) -> u32 {
        self.next_id
    }

    /// Maximum number of live slots
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of currently allocated slots
    pub fn len(&self) -> u32 {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
