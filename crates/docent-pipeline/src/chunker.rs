//! Content chunking for RAG retrieval.
//!
//! Splits text into fixed-size character windows where consecutive windows
//! share a fixed overlap.

use docent_config::AnalysisConfig;
use docent_core::DocumentChunk;

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Size of each chunk in characters.
    pub chunk_size: usize,
    /// Number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl ChunkConfig {
    pub fn from_analysis_config(config: &AnalysisConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// Content chunker for splitting text.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Create a new chunker; the overlap is clamped below the chunk size.
    pub fn new(config: ChunkConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let chunk_overlap = config.chunk_overlap.min(chunk_size - 1);
        Self {
            config: ChunkConfig {
                chunk_size,
                chunk_overlap,
            },
        }
    }

    /// Split text into chunks tagged with `namespace`.
    pub fn chunk_text(&self, namespace: &str, text: &str) -> Vec<DocumentChunk> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return vec![];
        }

        self.split_by_chars(trimmed)
            .into_iter()
            .enumerate()
            .map(|(index, content)| DocumentChunk::new(namespace, index, content))
            .collect()
    }

    fn split_by_chars(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut result = Vec::new();
        let mut start = 0;

        loop {
            let end = std::cmp::min(start + self.config.chunk_size, chars.len());
            result.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            // Move forward with overlap
            start = end - self.config.chunk_overlap;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of_len(len: usize) -> String {
        "abcdefghij".chars().cycle().take(len).collect()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunker = Chunker::new(ChunkConfig::default());
        let chunks = chunker.chunk_text("job_1", "  This is a small piece of text.  ");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "This is a small piece of text.");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].namespace, "job_1");
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::new(ChunkConfig::default());
        assert!(chunker.chunk_text("job_1", "").is_empty());
        assert!(chunker.chunk_text("job_1", "   \n").is_empty());
    }

    #[test]
    fn test_chunk_count_tracks_stride() {
        let chunker = Chunker::new(ChunkConfig::default());
        let stride = 512 - 50;

        for len in [513, 1000, 4096, 10_000] {
            let chunks = chunker.chunk_text("job_1", &text_of_len(len));
            let expected = (len + stride - 1) / stride;
            let diff = chunks.len() as i64 - expected as i64;
            assert!(diff.abs() <= 1, "len {} gave {} chunks", len, chunks.len());
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunker = Chunker::new(ChunkConfig::default());
        let chunks = chunker.chunk_text("job_1", &text_of_len(2000));

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].content.chars().collect();
                chars[chars.len() - 50..].iter().collect()
            };
            assert!(pair[1].content.starts_with(&tail));
            assert!(pair[0].content.chars().count() <= 512);
        }

        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_utf8_text() {
        let chunker = Chunker::new(ChunkConfig {
            chunk_size: 20,
            chunk_overlap: 5,
        });

        // Multi-byte characters must not be split
        let text = "Hello ─── World! This has unicode: 日本語 and more ─ content here.";
        let chunks = chunker.chunk_text("job_1", text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 20);
        }
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = Chunker::new(ChunkConfig {
            chunk_size: 10,
            chunk_overlap: 50,
        });
        // Overlap becomes chunk_size - 1, so each chunk advances one char
        let chunks = chunker.chunk_text("job_1", &text_of_len(30));
        assert_eq!(chunks.len(), 21);
    }
}
