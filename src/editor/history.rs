/// Submitted lines in submission order. Append-only, duplicates kept.
#[derive(Debug, Default, Clone)]
pub struct HistoryList {
    entries: Vec<Vec<u8>>,
}

impl HistoryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: &[u8]) {
        self.entries.push(line.to_vec());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(Vec::as_slice)
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.entries.last().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(Vec::as_slice)
    }
}
