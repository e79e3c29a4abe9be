//! Prompt context and citations built from retrieval hits.

use crate::chunking::truncate_at_word;
use crate::models::{Citation, SearchHit, SourceKind};
use crate::video;

/// Separator placed between hits in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Kinds whose chunk offsets are real playback positions.
fn is_timed(kind: SourceKind) -> bool {
    matches!(kind, SourceKind::Video | SourceKind::Audio)
}

/// Label a hit with its source kind, author, title and position.
fn hit_header(hit: &SearchHit) -> String {
    let source = &hit.source;
    let mut header = match source.author.as_deref() {
        Some(author) => format!("[{} by {}] {}", source.kind.label(), author, source.title),
        None => format!("[{}] {}", source.kind.label(), source.title),
    };
    if is_timed(source.kind) {
        header.push_str(&format!(" ({})", hit.format_timestamp()));
    }
    header
}

/// Format hits for inclusion in the system prompt.
pub fn format_context_block(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("{}\n{}", hit_header(hit), hit.content.trim()))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Citations for the best `max_citations` hits. Hits are expected in score order.
pub fn build_citations(hits: &[SearchHit], max_citations: usize, snippet_chars: usize) -> Vec<Citation> {
    hits.iter()
        .take(max_citations)
        .map(|hit| citation(hit, snippet_chars))
        .collect()
}

fn citation(hit: &SearchHit, snippet_chars: usize) -> Citation {
    let source = &hit.source;
    let url = match (source.kind, source.external_id.as_deref()) {
        (SourceKind::Video, Some(video_id)) => Some(video::timestamped_url(video_id, hit.start_seconds)),
        _ => source.url.clone(),
    };

    Citation {
        source_id: source.id,
        kind: source.kind,
        title: source.title.clone(),
        author: source.author.clone(),
        timestamp: is_timed(source.kind).then(|| hit.format_timestamp()),
        start_seconds: hit.start_seconds,
        snippet: truncate_at_word(&hit.content, snippet_chars),
        score: hit.score,
        url,
        thumbnail_url: source.thumbnail_url.clone(),
    }
}
