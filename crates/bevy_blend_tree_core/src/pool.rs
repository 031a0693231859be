/// Free list of reusable buffers.
///
/// Buffers are handed out by value and returned with [`BufferPool::release`], so the
/// allocation behind a pose or event buffer is reused across ticks instead of being freed.
#[derive(Debug)]
pub struct BufferPool<T> {
    free: Vec<T>,
    total_allocated: usize,
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self {
            free: Vec::new(),
            total_allocated: 0,
        }
    }
}

impl<T: Default> BufferPool<T> {
    pub fn acquire(&mut self) -> T {
        self.free.pop().unwrap_or_else(|| {
            self.total_allocated += 1;
            T::default()
        })
    }
}

impl<T> BufferPool<T> {
    pub fn release(&mut self, item: T) {
        self.free.push(item);
    }

    pub fn num_free(&self) -> usize {
        self.free.len()
    }

    /// Number of buffers ever created by this pool.
    pub fn total_allocated(&self) -> usize {
        self.total_allocated
    }

    pub fn shrink(&mut self) {
        self.free.clear();
        self.free.shrink_to_fit();
    }
}
