use std::collections::VecDeque;
use std::time::Instant;

/// Green-channel mean of one processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub value: f64,
    pub at: Instant,
}

impl FrameSample {
    pub fn new(value: f64, at: Instant) -> Self {
        Self { value, at }
    }
}

/// Fixed-capacity FIFO of samples ordered by non-decreasing timestamp.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    samples: VecDeque<FrameSample>,
    capacity: usize,
}

impl SignalBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once full. A sample stamped before
    /// the newest retained one is re-stamped to keep the ordering invariant.
    pub fn push(&mut self, mut sample: FrameSample) {
        if let Some(last) = self.samples.back() {
            if sample.at < last.at {
                sample.at = last.at;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.values().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn oldest(&self) -> Option<&FrameSample> {
        self.samples.front()
    }

    pub fn newest(&self) -> Option<&FrameSample> {
        self.samples.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn evicts_oldest_when_full() {
        let t0 = Instant::now();
        let mut buffer = SignalBuffer::new(3);
        for i in 0..5 {
            buffer.push(FrameSample::new(i as f64, t0 + Duration::from_millis(i)));
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.values().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.mean(), Some(3.0));
    }

    #[test]
    fn keeps_timestamps_non_decreasing() {
        let t0 = Instant::now();
        let mut buffer = SignalBuffer::new(4);
        buffer.push(FrameSample::new(1.0, t0 + Duration::from_millis(50)));
        buffer.push(FrameSample::new(2.0, t0));
        assert_eq!(buffer.newest().unwrap().at, buffer.oldest().unwrap().at);
    }

    #[test]
    fn empty_buffer_has_no_mean() {
        let buffer = SignalBuffer::new(10);
        assert!(buffer.is_empty());
        assert_eq!(buffer.mean(), None);
    }
}
