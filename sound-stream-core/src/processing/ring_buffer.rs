/// Fixed-capacity circular buffer of samples.
///
/// Not synchronized; the capture pipeline owns one behind its own lock.
///
/// Overflow behavior: drops oldest samples and reports how many were lost.
#[derive(Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![T::default(); capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Write samples into the ring buffer.
    ///
    /// Returns the number of older samples dropped to make room. If `samples`
    /// is larger than capacity, only the last `capacity` samples are kept.
    pub fn write(&mut self, samples: &[T]) -> usize {
        if samples.is_empty() {
            return 0;
        }

        let mut dropped = 0;
        let samples = if samples.len() > self.capacity {
            dropped += samples.len() - self.capacity;
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        let overflow = (self.available + samples.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % self.capacity;
            self.available -= overflow;
            dropped += overflow;
        }

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
        self.available += samples.len();
        dropped
    }

    /// Read and remove up to `count` samples.
    pub fn read(&mut self, count: usize) -> Vec<T> {
        let to_read = count.min(self.available);
        if to_read == 0 {
            return Vec::new();
        }

        let mut result = Vec::with_capacity(to_read);
        for i in 0..to_read {
            result.push(self.buffer[(self.read_index + i) % self.capacity]);
        }
        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        result
    }

    pub fn count(&self) -> usize {
        self.available
    }

    pub fn free(&self) -> usize {
        self.capacity - self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_write_read() {
        let mut buf = RingBuffer::<i16>::new(10);
        assert_eq!(buf.write(&[1, 2, 3]), 0);

        assert_eq!(buf.count(), 3);
        assert_eq!(buf.free(), 7);
        assert_eq!(buf.read(3), vec![1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn read_partial() {
        let mut buf = RingBuffer::<i16>::new(10);
        buf.write(&[1, 2, 3, 4, 5]);

        assert_eq!(buf.read(3), vec![1, 2, 3]);
        assert_eq!(buf.count(), 2);
        assert_eq!(buf.read(10), vec![4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut buf = RingBuffer::<i16>::new(4);
        buf.write(&[1, 2, 3, 4]);
        assert_eq!(buf.write(&[5, 6]), 2);

        assert_eq!(buf.count(), 4);
        assert_eq!(buf.read(4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn write_larger_than_capacity() {
        let mut buf = RingBuffer::<i16>::new(3);
        assert_eq!(buf.write(&[1, 2, 3, 4, 5]), 2);

        assert_eq!(buf.read(3), vec![3, 4, 5]);
    }

    #[test]
    fn wraparound() {
        let mut buf = RingBuffer::<f32>::new(4);

        buf.write(&[1.0, 2.0, 3.0]);
        buf.read(2);
        buf.write(&[4.0, 5.0, 6.0]);

        assert_eq!(buf.count(), 4);
        assert_eq!(buf.read(4), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn reset_clears_buffer() {
        let mut buf = RingBuffer::<i16>::new(10);
        buf.write(&[1, 2, 3]);
        buf.reset();

        assert!(buf.is_empty());
        assert!(buf.read(10).is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buf = RingBuffer::<i16>::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.write(&[7, 8]);
        assert_eq!(buf.read(2), vec![8]);
    }
}
