//! Fixed-budget chunking with overlap.

use super::{ChunkingConfig, ContentChunk, SentenceSplitter, TextSegment};
use tracing::debug;

/// Accumulates segments into chunks of at most `chunk_size` characters.
///
/// When the next segment would overflow a non-empty buffer, the buffer is
/// closed as a chunk and the next chunk is seeded with the trailing `overlap`
/// characters of the closed one, starting at a word boundary. A chunk's start
/// offset is the start of the segment that opened it, never the overlap's origin.
pub struct OverlapChunker {
    config: ChunkingConfig,
    splitter: SentenceSplitter,
}

impl OverlapChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            splitter: SentenceSplitter::new(config.sentence_cap),
            config,
        }
    }

    /// Split ordered segments into ordered chunks with contiguous indices.
    pub fn chunk(&self, segments: &[TextSegment]) -> Vec<ContentChunk> {
        let segments = self.presplit(segments);
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_chars = 0usize;
        let mut chunk_start = 0.0;

        for segment in &segments {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }
            let text_chars = text.chars().count();

            if buffer_chars > 0 && buffer_chars + 1 + text_chars > self.config.chunk_size {
                let content = buffer.trim().to_string();
                let seed = self.overlap_seed(&content, text_chars);
                chunks.push(ContentChunk {
                    content,
                    start_seconds: chunk_start,
                    index: chunks.len() as u32,
                });

                buffer.clear();
                buffer_chars = 0;
                if !seed.is_empty() {
                    buffer.push_str(&seed);
                    buffer_chars = seed.chars().count();
                }
                chunk_start = segment.start_seconds;
            } else if buffer_chars == 0 {
                chunk_start = segment.start_seconds;
            }

            if buffer_chars > 0 {
                buffer.push(' ');
                buffer_chars += 1;
            }
            buffer.push_str(text);
            buffer_chars += text_chars;
        }

        let trailing = buffer.trim();
        if !trailing.is_empty() {
            chunks.push(ContentChunk {
                content: trailing.to_string(),
                start_seconds: chunk_start,
                index: chunks.len() as u32,
            });
        }

        debug!("Chunked {} segments into {} chunks", segments.len(), chunks.len());
        chunks
    }

    /// Break segments longer than the sentence cap into sentence-aligned pieces.
    ///
    /// Pieces inherit the timing of the segment they came from.
    fn presplit(&self, segments: &[TextSegment]) -> Vec<TextSegment> {
        let mut out = Vec::with_capacity(segments.len());
        for segment in segments {
            if segment.text.chars().count() <= self.config.sentence_cap {
                out.push(segment.clone());
                continue;
            }
            out.extend(self.splitter.split(&segment.text).into_iter().map(|piece| {
                TextSegment::new(piece, segment.start_seconds, segment.duration_seconds)
            }));
        }
        out
    }

    /// Trailing overlap of a closed chunk, shrunk when it would push the
    /// next chunk past the budget on its own.
    fn overlap_seed(&self, content: &str, next_chars: usize) -> String {
        let room = self.config.chunk_size.saturating_sub(next_chars + 1);
        let take = self.config.overlap.min(room);
        word_tail(content, take).to_string()
    }
}

impl Default for OverlapChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

/// The last `n` characters of `s`, respecting UTF-8 boundaries.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// The last `n` characters of `s`, advanced past a partial leading word.
fn word_tail(s: &str, n: usize) -> &str {
    let tail = tail_chars(s, n);
    let cut_mid_word = tail.len() < s.len()
        && !tail.starts_with(char::is_whitespace)
        && !s[..s.len() - tail.len()].ends_with(char::is_whitespace);
    if !cut_mid_word {
        return tail.trim_start();
    }
    match tail.find(char::is_whitespace) {
        Some(idx) => tail[idx..].trim_start(),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(total_chars: usize) -> String {
        let mut text = String::new();
        let mut i = 0;
        while text.len() < total_chars {
            text.push_str(&format!("Sentence number {} talks about topic {}. ", i, i % 7));
            i += 1;
        }
        text.trim().to_string()
    }

    #[test]
    fn test_two_caption_lines_make_one_chunk() {
        let chunker = OverlapChunker::default();
        let segments = vec![
            TextSegment::new("hello", 0.0, 1.0),
            TextSegment::new("world", 1.0, 1.0),
        ];

        let chunks = chunker.chunk(&segments);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
        assert_eq!(chunks[0].start_seconds, 0.0);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunker = OverlapChunker::default();
        assert!(chunker.chunk(&[]).is_empty());
        assert!(chunker.chunk(&[TextSegment::untimed("   ")]).is_empty());
    }

    #[test]
    fn test_long_text_is_bounded_and_contiguous() {
        let chunker = OverlapChunker::default();
        let text = format!("A. B. C. {}", filler(3000));
        let chunks = chunker.chunk(&[TextSegment::untimed(text)]);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.content.chars().count() <= 1200, "chunk {} too long", i);
            assert_eq!(chunk.start_seconds, 0.0);
            assert_eq!(chunk.index as usize, i);
        }
    }

    #[test]
    fn test_tail_of_each_chunk_prefixes_the_next() {
        let chunker = OverlapChunker::default();
        let chunks = chunker.chunk(&[TextSegment::untimed(filler(5000))]);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let tail = word_tail(&pair[0].content, 200);
            assert!(!tail.is_empty());
            assert!(
                pair[1].content.starts_with(tail),
                "chunk {} does not start with the tail of chunk {}",
                pair[1].index,
                pair[0].index
            );
        }
    }

    #[test]
    fn test_removing_overlaps_reconstructs_text() {
        let chunker = OverlapChunker::default();
        let text = filler(4000);
        let chunks = chunker.chunk(&[TextSegment::untimed(text.clone())]);

        let mut rebuilt = chunks[0].content.clone();
        for pair in chunks.windows(2) {
            let tail = word_tail(&pair[0].content, 200);
            let fresh = pair[1].content[tail.len()..].trim_start();
            rebuilt.push(' ');
            rebuilt.push_str(fresh);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_chunk_start_comes_from_opening_segment() {
        let chunker = OverlapChunker::new(ChunkingConfig {
            chunk_size: 30,
            overlap: 5,
            sentence_cap: 500,
        });
        let segments = vec![
            TextSegment::new("the first caption line", 0.0, 4.0),
            TextSegment::new("a second caption line", 4.0, 4.0),
            TextSegment::new("third", 8.0, 2.0),
        ];

        let chunks = chunker.chunk(&segments);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start_seconds, 0.0);
        assert_eq!(chunks[1].start_seconds, 4.0);
        assert_eq!(chunks[1].content, "line a second caption line");
        assert_eq!(chunks[2].start_seconds, 8.0);
        assert_eq!(chunks[2].content, "line third");
    }

    #[test]
    fn test_overlap_never_starts_mid_word() {
        let chunker = OverlapChunker::default();
        let chunks = chunker.chunk(&[TextSegment::untimed(filler(5000))]);
        for pair in chunks.windows(2) {
            let seed = word_tail(&pair[0].content, 200);
            let before = &pair[0].content[..pair[0].content.len() - seed.len()];
            assert!(before.ends_with(char::is_whitespace), "seed {:?} starts mid-word", seed);
        }

        assert_eq!(word_tail("alpha beta gamma", 7), "gamma");
        assert_eq!(word_tail("alpha beta gamma", 6), "gamma");
        assert_eq!(word_tail("alpha beta gamma", 3), "");
        assert_eq!(word_tail("gamma", 10), "gamma");
    }

    #[test]
    fn test_inner_punctuation_survives_chunking() {
        let chunker = OverlapChunker::default();
        let mut text = String::from(
            "...and so it begins. Pi is roughly 3.14 and the site is example.com today.",
        );
        while text.chars().count() < 700 {
            text.push_str(" Version 2.0.1 shipped on time! Did it? Yes.");
        }

        let chunks = chunker.chunk(&[TextSegment::untimed(text.clone())]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_tail_chars_respects_multibyte() {
        assert_eq!(tail_chars("héllo", 4), "éllo");
        assert_eq!(tail_chars("hi", 10), "hi");
        assert_eq!(tail_chars("hi", 0), "");
    }
}
