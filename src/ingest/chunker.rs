//! Sliding-window text chunker.
//!
//! Fixed-size character windows with bounded overlap, applied uniformly
//! to every input kind. A large input yields many chunks that all
//! inherit the same source metadata.

/// Configuration for the chunker.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Overlap between neighboring windows, in characters.
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split text into overlapping windows. Whitespace-only input
    /// yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chunk_size = self.config.chunk_size.max(1);
        let step = chunk_size.saturating_sub(self.config.chunk_overlap).max(1);

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let end = (start + chunk_size).min(total);
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end == total {
                break;
            }
            start += step;
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}
