use super::EditorError;

const INITIAL_CAPACITY: usize = 128;

/// Bytes of the line being typed, with explicitly managed capacity.
///
/// Capacity doubles when full. Overflowing the capacity arithmetic or failing
/// to allocate is an error, never a silent truncation.
#[derive(Debug, Default)]
pub struct InputLineBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl InputLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn push(&mut self, byte: u8) -> Result<(), EditorError> {
        if self.bytes.len() == self.capacity {
            self.grow()?;
        }
        self.bytes.push(byte);
        debug_assert!(self.bytes.len() <= self.capacity);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop()
    }

    /// Empties the line, keeping the allocation for the next one.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    fn grow(&mut self) -> Result<(), EditorError> {
        let next = next_capacity(self.capacity)?;
        self.bytes
            .try_reserve_exact(next - self.bytes.len())
            .map_err(|_| EditorError::Allocation { requested: next })?;
        self.capacity = next;
        Ok(())
    }
}

fn next_capacity(current: usize) -> Result<usize, EditorError> {
    if current == 0 {
        return Ok(INITIAL_CAPACITY);
    }
    current
        .checked_mul(2)
        .ok_or(EditorError::CapacityOverflow { current })
}
