use parking_lot::Mutex;

/// Recycling pool for raw chunk buffers freed by the compressor
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take an empty buffer able to hold `size` bytes
    pub fn take(&self, size: usize) -> Vec<u8> {
        match self.buffers.lock().pop() {
            Some(mut buf) => {
                buf.clear();
                buf.reserve_exact(size);
                buf
            }
            None => Vec::with_capacity(size),
        }
    }

    /// Return a buffer; dropped when the pool is full
    pub fn give(&self, buf: Vec<u8>) {
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.capacity {
            buffers.push(buf);
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
