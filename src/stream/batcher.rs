/// Merges small content fragments so clients are not flooded with
/// one-character events. `min_chars == 0` passes fragments through as-is.
#[derive(Debug, Default)]
pub struct ChunkBatcher {
    min_chars: usize,
    pending: String,
}

impl ChunkBatcher {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            pending: String::new(),
        }
    }

    /// Text ready to emit, if the pending batch reached the threshold.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }
        self.pending.push_str(fragment);
        if self.pending.chars().count() >= self.min_chars {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
