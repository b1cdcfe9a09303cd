/// Moving average over the last `W` samples.
///
/// Samples live in a ring buffer; the running sum is adjusted by the value
/// being evicted so `put` is O(1). No output is produced until the window has
/// been filled once.
pub struct MovingAverage<const W: usize> {
    data: [f32; W],
    sum: f32,
    next: usize,
    count: usize,
}

impl<const W: usize> Default for MovingAverage<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize> MovingAverage<W> {
    pub const fn new() -> Self {
        Self {
            data: [0.0; W],
            sum: 0.0,
            next: 0,
            count: 0,
        }
    }

    pub fn put(&mut self, x: f32) {
        if W == 0 {
            return;
        }
        if self.count < W {
            self.count += 1;
        } else {
            self.sum -= self.data[self.next];
        }
        self.sum += x;
        self.data[self.next] = x;
        self.next = if self.next + 1 >= W { 0 } else { self.next + 1 };
    }

    /// Mean of the last `W` samples, or `None` until `W` samples were put.
    pub fn get(&self) -> Option<f32> {
        if W == 0 || self.count < W {
            return None;
        }
        Some(self.sum / W as f32)
    }

    pub fn is_ready(&self) -> bool {
        self.get().is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
