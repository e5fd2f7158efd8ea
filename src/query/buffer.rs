//! Fixed-capacity buffer of candidate document ids.

/// A reusable buffer of ascending `u64` candidates.
///
/// Filtering happens in place: walk the buffer with
/// [`retain_and_advance`](Self::retain_and_advance) /
/// [`reject_and_advance`](Self::reject_and_advance) and call
/// [`finalize`](Self::finalize) to shrink it to the retained values.
#[derive(Debug, Clone)]
pub struct QueryBuffer {
    data: Vec<u64>,
    end: usize,
    read: usize,
    write: usize,
}

impl QueryBuffer {
    pub fn new(capacity: usize) -> Self {
        QueryBuffer {
            data: vec![0; capacity],
            end: 0,
            read: 0,
            write: 0,
        }
    }

    /// Buffer pre-filled with `values`, which must be ascending.
    pub fn from_values(values: &[u64]) -> Self {
        QueryBuffer {
            data: values.to_vec(),
            end: values.len(),
            read: 0,
            write: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn is_full(&self) -> bool {
        self.end == self.data.len()
    }

    pub fn reset(&mut self) {
        self.end = 0;
        self.read = 0;
        self.write = 0;
    }

    /// The live values.
    pub fn values(&self) -> &[u64] {
        &self.data[..self.end]
    }

    /// Free space after the live values, for sources to fill.
    pub fn spare_mut(&mut self) -> &mut [u64] {
        &mut self.data[self.end..]
    }

    /// Mark `count` more values written into [`spare_mut`](Self::spare_mut).
    pub fn advance_end(&mut self, count: usize) {
        self.end = (self.end + count).min(self.data.len());
    }

    pub fn has_more(&self) -> bool {
        self.read < self.end
    }

    pub fn current_value(&self) -> u64 {
        self.data[self.read]
    }

    /// Keep the current value and move to the next.
    pub fn retain_and_advance(&mut self) {
        self.data[self.write] = self.data[self.read];
        self.write += 1;
        self.read += 1;
    }

    /// Drop the current value and move to the next.
    pub fn reject_and_advance(&mut self) {
        self.read += 1;
    }

    /// Keep every value not yet visited.
    pub fn retain_all_remaining(&mut self) {
        while self.has_more() {
            self.retain_and_advance();
        }
    }

    /// Drop every value not yet visited.
    pub fn reject_all_remaining(&mut self) {
        self.read = self.end;
    }

    /// Shrink to the retained values and rewind the cursors.
    pub fn finalize(&mut self) {
        self.end = self.write;
        self.read = 0;
        self.write = 0;
    }

    /// Keep only the values for which `keep` returns true.
    pub fn retain_where<F: FnMut(u64) -> bool>(&mut self, mut keep: F) {
        while self.has_more() {
            if keep(self.current_value()) {
                self.retain_and_advance();
            } else {
                self.reject_and_advance();
            }
        }
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_filter() {
        let mut buffer = QueryBuffer::new(8);
        let spare = buffer.spare_mut();
        spare[..5].copy_from_slice(&[1, 2, 3, 4, 5]);
        buffer.advance_end(5);
        assert_eq!(buffer.len(), 5);
        assert!(!buffer.is_full());

        buffer.retain_where(|v| v % 2 == 1);
        assert_eq!(buffer.values(), &[1, 3, 5]);

        buffer.reset();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_manual_cursor_walk() {
        let mut buffer = QueryBuffer::from_values(&[10, 20, 30, 40]);
        buffer.reject_and_advance();
        buffer.retain_and_advance();
        buffer.retain_all_remaining();
        buffer.finalize();
        assert_eq!(buffer.values(), &[20, 30, 40]);

        buffer.retain_and_advance();
        buffer.reject_all_remaining();
        buffer.finalize();
        assert_eq!(buffer.values(), &[20]);
    }
}
