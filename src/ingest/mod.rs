//! Import pipeline.
//!
//! Every source kind has its own pre-step (fetch captions, extract a document,
//! transcribe audio) and then converges on one shared tail: derive a title,
//! persist the source, chunk, embed every chunk in one batch, and persist the
//! chunks. A source is never left behind without chunks.

mod playlist;
mod upload;

pub use playlist::{PlaylistItem, PlaylistItemStatus, PlaylistReport};
pub use upload::Upload;

use crate::chunking::{total_duration, truncate_at_word, ChunkingConfig, OverlapChunker, TextSegment};
use crate::config::{IngestSettings, Prompts, Settings};
use crate::embedding::Embedder;
use crate::error::{ExtractionFailure, QuarryError, Result};
use crate::extract::{DocumentFormat, TextExtractor};
use crate::generation::{generate_with_adjustment, GenerationParams, GenerationRequest, Generator};
use crate::models::{Chunk, Source, SourceKind};
use crate::store::KnowledgeStore;
use crate::transcription::Transcriber;
use crate::video::{self, TranscriptProvider};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What to import.
#[derive(Debug)]
pub enum SourceInput {
    Video {
        url: String,
    },
    Text {
        title: Option<String>,
        content: String,
        author: Option<String>,
    },
    Document {
        upload: Upload,
        title: Option<String>,
        author: Option<String>,
    },
    Audio {
        upload: Upload,
        title: Option<String>,
        author: Option<String>,
    },
}

/// Result of a successful import.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub source_id: Uuid,
    pub kind: SourceKind,
    pub title: String,
    pub chunk_count: usize,
}

/// Collaborators the pipeline calls out to.
pub struct IngestServices {
    pub store: Arc<dyn KnowledgeStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub transcripts: Arc<dyn TranscriptProvider>,
    pub extractor: Arc<dyn TextExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
}

/// A source ready for the shared tail.
struct Prepared {
    source: Source,
    segments: Vec<TextSegment>,
    /// Title to use when no explicit title was given and generation fails.
    fallback_title: String,
    /// Whether the title still has to be derived.
    needs_title: bool,
    text_preview: String,
}

/// Imports sources into the knowledge base.
pub struct Ingestor {
    services: IngestServices,
    chunker: OverlapChunker,
    prompts: Prompts,
    settings: IngestSettings,
    title_model: String,
    fallback_max_tokens: u32,
    playlist_limit: usize,
    assumed_bitrate_kbps: u32,
}

impl Ingestor {
    pub fn new(services: IngestServices, settings: &Settings, prompts: Prompts) -> Self {
        Self {
            services,
            chunker: OverlapChunker::new(ChunkingConfig::from(&settings.chunking)),
            prompts,
            settings: settings.ingest.clone(),
            title_model: settings.generation.title_model.clone(),
            fallback_max_tokens: settings.generation.fallback_max_tokens,
            playlist_limit: settings.youtube.playlist_limit,
            assumed_bitrate_kbps: settings.transcription.assumed_bitrate_kbps,
        }
    }

    /// Import one source.
    pub async fn ingest(&self, input: SourceInput) -> Result<IngestOutcome> {
        let prepared = match input {
            SourceInput::Video { url } => self.prepare_video(&url).await?,
            SourceInput::Text { title, content, author } => self.prepare_text(title, content, author)?,
            SourceInput::Document { upload, title, author } => {
                // The upload guard lives until the pre-step is done, on every path.
                self.prepare_document(&upload, title, author).await?
            }
            SourceInput::Audio { upload, title, author } => {
                self.prepare_audio(&upload, title, author).await?
            }
        };
        self.persist(prepared).await
    }

    #[instrument(skip(self))]
    async fn prepare_video(&self, url: &str) -> Result<Prepared> {
        let video_id = video::resolve_video_id(url)?;

        if self.services.store.find_by_external_id(&video_id).await?.is_some() {
            return Err(QuarryError::DuplicateSource { external_id: video_id });
        }

        let transcript = self.services.transcripts.fetch_transcript(&video_id).await?;
        let segments: Vec<TextSegment> = transcript.lines.iter().map(TextSegment::from).collect();
        if segments.is_empty() {
            return Err(ExtractionFailure::NoTranscript(video_id).into());
        }

        let duration = total_duration(&segments).max(transcript.metadata.duration_seconds.unwrap_or(0.0));
        let metadata = transcript.metadata;

        let mut source = Source::new(SourceKind::Video, metadata.title.clone());
        source.url = Some(video::watch_url(&video_id));
        source.thumbnail_url = Some(
            metadata
                .thumbnail_url
                .unwrap_or_else(|| video::thumbnail_url(&video_id)),
        );
        source.duration_seconds = Some(duration);
        source.author = metadata.author;
        source.external_id = Some(video_id);

        Ok(Prepared {
            fallback_title: metadata.title,
            needs_title: false,
            text_preview: String::new(),
            source,
            segments,
        })
    }

    fn prepare_text(
        &self,
        title: Option<String>,
        content: String,
        author: Option<String>,
    ) -> Result<Prepared> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(QuarryError::Validation("Text content is empty".to_string()));
        }

        let title = clean(title);
        let mut source = Source::new(SourceKind::Text, title.clone().unwrap_or_default());
        source.author = clean(author);
        source.content = Some(content.clone());

        Ok(Prepared {
            fallback_title: first_line_title(&content),
            needs_title: title.is_none(),
            text_preview: preview(&content, self.settings.title_preview_chars),
            segments: vec![TextSegment::untimed(content)],
            source,
        })
    }

    #[instrument(skip(self, upload), fields(file = %upload.file_name()))]
    async fn prepare_document(
        &self,
        upload: &Upload,
        title: Option<String>,
        author: Option<String>,
    ) -> Result<Prepared> {
        let format = DocumentFormat::detect(upload.file_name(), upload.mime_type())?;
        let text = self.services.extractor.extract(upload.path(), format).await?;
        let text = text.trim().to_string();

        if text.chars().count() < self.settings.min_document_chars {
            return Err(ExtractionFailure::DocumentEmpty.into());
        }

        let title = clean(title);
        let mut source = Source::new(SourceKind::Document, title.clone().unwrap_or_default());
        source.author = clean(author);
        source.file_name = Some(upload.file_name().to_string());
        source.mime_type = Some(format.mime_type().to_string());

        Ok(Prepared {
            fallback_title: file_stem(upload.file_name()),
            needs_title: title.is_none(),
            text_preview: preview(&text, self.settings.title_preview_chars),
            segments: vec![TextSegment::untimed(text)],
            source,
        })
    }

    #[instrument(skip(self, upload), fields(file = %upload.file_name()))]
    async fn prepare_audio(
        &self,
        upload: &Upload,
        title: Option<String>,
        author: Option<String>,
    ) -> Result<Prepared> {
        let transcript = self.services.transcriber.transcribe(upload.path()).await?;
        let text = transcript.text.trim().to_string();

        if text.chars().count() < self.settings.min_transcription_chars {
            return Err(ExtractionFailure::TranscriptionEmpty.into());
        }

        let segments = if transcript.segments.is_empty() {
            vec![TextSegment::untimed(text.clone())]
        } else {
            transcript.segments
        };

        let duration = match transcript.duration_seconds {
            Some(d) => d,
            None if total_duration(&segments) > 0.0 => total_duration(&segments),
            None => estimate_audio_duration(upload.path(), self.assumed_bitrate_kbps).await?,
        };

        let title = clean(title);
        let mut source = Source::new(SourceKind::Audio, title.clone().unwrap_or_default());
        source.author = clean(author);
        source.file_name = Some(upload.file_name().to_string());
        source.mime_type = upload.mime_type().map(str::to_string);
        source.duration_seconds = Some(duration);

        Ok(Prepared {
            fallback_title: file_stem(upload.file_name()),
            needs_title: title.is_none(),
            text_preview: preview(&text, self.settings.title_preview_chars),
            segments,
            source,
        })
    }

    /// Shared tail: title, source row, chunks, embeddings, chunk rows.
    #[instrument(skip(self, prepared), fields(kind = %prepared.source.kind))]
    async fn persist(&self, prepared: Prepared) -> Result<IngestOutcome> {
        let Prepared {
            mut source,
            segments,
            fallback_title,
            needs_title,
            text_preview,
        } = prepared;

        if needs_title {
            source.title = self.derive_title(&text_preview, &fallback_title).await;
        }

        self.services.store.insert_source(&source).await?;

        match self.index_chunks(&source, &segments).await {
            Ok(chunk_count) => {
                info!("Imported {} '{}' with {} chunks", source.kind, source.title, chunk_count);
                Ok(IngestOutcome {
                    source_id: source.id,
                    kind: source.kind,
                    title: source.title,
                    chunk_count,
                })
            }
            Err(e) => {
                warn!("Import of '{}' failed, removing source: {}", source.title, e);
                if let Err(cleanup) = self.services.store.delete_source(source.id).await {
                    warn!("Failed to remove orphaned source {}: {}", source.id, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn index_chunks(&self, source: &Source, segments: &[TextSegment]) -> Result<usize> {
        let chunks = self.chunker.chunk(segments);
        if chunks.is_empty() {
            return Err(ExtractionFailure::NoChunks.into());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.services.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(QuarryError::Embedding(format!(
                "Expected {} embeddings, received {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let rows: Vec<Chunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                Chunk::new(source.id, chunk.content, embedding, chunk.start_seconds, chunk.index)
            })
            .collect();

        self.services.store.insert_chunks(&rows).await
    }

    /// Ask the model for a short title, falling back when it fails or answers nothing useful.
    async fn derive_title(&self, preview: &str, fallback: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("preview".to_string(), preview.to_string());

        let request = GenerationRequest {
            system_prompt: self.prompts.render_with_custom(&self.prompts.title.system, &HashMap::new()),
            history: Vec::new(),
            user_message: self.prompts.render_with_custom(&self.prompts.title.user, &vars),
            params: GenerationParams::new(&self.title_model, 0.3, 30),
        };

        match generate_with_adjustment(self.services.generator.as_ref(), request, self.fallback_max_tokens).await {
            Ok(answer) => {
                let title = answer
                    .lines()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or_default()
                    .trim()
                    .trim_matches(|c| c == '"' || c == '\'')
                    .trim();
                if title.is_empty() {
                    fallback.to_string()
                } else {
                    truncate_at_word(title, 120)
                }
            }
            Err(e) => {
                warn!("Title generation failed, using fallback: {}", e);
                fallback.to_string()
            }
        }
    }

    /// Import every video of a playlist. One failing video never aborts the batch.
    #[instrument(skip(self))]
    pub async fn import_playlist(&self, url: &str) -> Result<PlaylistReport> {
        let playlist_id = video::resolve_playlist_id(url)?;
        let video_ids = self
            .services
            .transcripts
            .list_playlist(&playlist_id, self.playlist_limit)
            .await?;

        let mut report = PlaylistReport::new(playlist_id);
        for video_id in video_ids {
            debug!("Importing playlist item {}", video_id);
            let result = self
                .ingest(SourceInput::Video {
                    url: video_id.clone(),
                })
                .await;
            report.record(video_id, result);
        }

        info!(
            "Playlist {}: {} imported, {} skipped, {} failed",
            report.playlist_id, report.imported, report.skipped, report.failed
        );
        Ok(report)
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn first_line_title(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("Untitled");
    truncate_at_word(line, 60)
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("Untitled")
        .to_string()
}

/// Estimate playing time from file size at an assumed constant bitrate.
async fn estimate_audio_duration(path: &Path, bitrate_kbps: u32) -> Result<f64> {
    let size = tokio::fs::metadata(path).await?.len();
    let bytes_per_second = bitrate_kbps.max(1) as f64 * 1000.0 / 8.0;
    Ok(size as f64 / bytes_per_second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::testing::{
        indexed_store, MockEmbedder, MockExtractor, MockGenerator, MockTranscriber,
        MockTranscriptProvider,
    };
    use crate::transcription::AudioTranscript;
    use crate::video::{TimedText, VideoMetadata, VideoTranscript};
    use std::io::Write;

    struct Harness {
        store: Arc<SqliteStore>,
        embedder: Arc<MockEmbedder>,
        generator: Arc<MockGenerator>,
        transcripts: Arc<MockTranscriptProvider>,
        ingestor: Ingestor,
    }

    async fn harness_with(
        generator: MockGenerator,
        extractor: MockExtractor,
        transcriber: MockTranscriber,
    ) -> Harness {
        let store = indexed_store(8).await;
        let embedder = Arc::new(MockEmbedder::new(8));
        let generator = Arc::new(generator);
        let transcripts = Arc::new(MockTranscriptProvider::new());

        let services = IngestServices {
            store: store.clone(),
            embedder: embedder.clone(),
            generator: generator.clone(),
            transcripts: transcripts.clone(),
            extractor: Arc::new(extractor),
            transcriber: Arc::new(transcriber),
        };
        let ingestor = Ingestor::new(services, &Settings::default(), Prompts::default());

        Harness { store, embedder, generator, transcripts, ingestor }
    }

    async fn harness() -> Harness {
        harness_with(
            MockGenerator::new("Generated Title"),
            MockExtractor::returning("unused"),
            MockTranscriber::returning(AudioTranscript::plain("unused")),
        )
        .await
    }

    fn hello_world() -> VideoTranscript {
        VideoTranscript {
            metadata: VideoMetadata {
                title: "Greetings".to_string(),
                author: Some("Channel".to_string()),
                duration_seconds: Some(1.5),
                thumbnail_url: None,
            },
            lines: vec![
                TimedText { text: "hello".to_string(), start_ms: 0, duration_ms: 1000 },
                TimedText { text: "world".to_string(), start_ms: 1000, duration_ms: 1000 },
            ],
        }
    }

    fn temp_upload(name: &str, contents: &[u8]) -> (tempfile::TempDir, Upload) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path).unwrap().write_all(contents).unwrap();
        let upload = Upload::temporary(path, name, None);
        (dir, upload)
    }

    #[tokio::test]
    async fn test_video_import_builds_one_chunk() {
        let h = harness().await;
        h.transcripts.add_video("dQw4w9WgXcQ", hello_world());

        let outcome = h
            .ingestor
            .ingest(SourceInput::Video { url: "https://youtu.be/dQw4w9WgXcQ".to_string() })
            .await
            .unwrap();
        assert_eq!(outcome.chunk_count, 1);
        assert_eq!(outcome.title, "Greetings");

        let source = h.store.get_source(outcome.source_id).await.unwrap().unwrap();
        assert_eq!(source.external_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(source.duration_seconds, Some(2.0));
        assert_eq!(source.author.as_deref(), Some("Channel"));

        let chunks = h.store.source_chunks(outcome.source_id).await.unwrap();
        assert_eq!(chunks[0].content, "hello world");
        assert_eq!(chunks[0].start_seconds, 0.0);
        assert_eq!(h.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_video_is_rejected() {
        let h = harness().await;
        h.transcripts.add_video("dQw4w9WgXcQ", hello_world());
        let input = || SourceInput::Video { url: "dQw4w9WgXcQ".to_string() };

        h.ingestor.ingest(input()).await.unwrap();
        let err = h.ingestor.ingest(input()).await.unwrap_err();
        assert!(matches!(err, QuarryError::DuplicateSource { .. }));

        assert_eq!(h.store.list_sources().await.unwrap().len(), 1);
        assert_eq!(h.store.chunk_count().await.unwrap(), 1);
        assert_eq!(h.transcripts.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_text_import_splits_long_content() {
        let h = harness().await;
        let mut content = String::from("A. B. C. ");
        let mut i = 0;
        while content.len() < 3000 {
            content.push_str(&format!("Filler sentence number {} for the test. ", i));
            i += 1;
        }

        let outcome = h
            .ingestor
            .ingest(SourceInput::Text { title: None, content, author: None })
            .await
            .unwrap();
        assert!(outcome.chunk_count > 1);
        assert_eq!(outcome.title, "Generated Title");

        let chunks = h.store.source_chunks(outcome.source_id).await.unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.content.chars().count() <= 1200);
            assert_eq!(chunk.start_seconds, 0.0);
            assert_eq!(chunk.chunk_index as usize, i);
        }
        assert_eq!(h.embedder.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_title_falls_back_when_generation_fails() {
        let h = harness_with(
            MockGenerator::failing("down"),
            MockExtractor::returning("unused"),
            MockTranscriber::returning(AudioTranscript::plain("unused")),
        )
        .await;

        let outcome = h
            .ingestor
            .ingest(SourceInput::Text {
                title: None,
                content: "\n  Release notes for version two\nMore text follows here.".to_string(),
                author: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.title, "Release notes for version two");
    }

    #[tokio::test]
    async fn test_embedding_failure_rolls_back_source() {
        let h = harness().await;
        h.embedder.fail_next();

        let err = h
            .ingestor
            .ingest(SourceInput::Text {
                title: Some("Notes".to_string()),
                content: "Some content worth indexing.".to_string(),
                author: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Embedding(_)));
        assert!(h.store.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_captions_leave_no_source() {
        let h = harness().await;
        let mut transcript = hello_world();
        transcript.lines = vec![
            TimedText { text: "  ".to_string(), start_ms: 0, duration_ms: 1000 },
            TimedText { text: "\n".to_string(), start_ms: 1000, duration_ms: 1000 },
        ];
        h.transcripts.add_video("zzzzzzzzzzz", transcript);

        let err = h
            .ingestor
            .ingest(SourceInput::Video { url: "zzzzzzzzzzz".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Extraction(ExtractionFailure::NoChunks)));
        assert!(h.store.list_sources().await.unwrap().is_empty());
        assert_eq!(h.embedder.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_scanned_document_is_rejected_and_upload_removed() {
        let h = harness_with(
            MockGenerator::new("t"),
            MockExtractor::returning("  \n "),
            MockTranscriber::returning(AudioTranscript::plain("unused")),
        )
        .await;
        let (_dir, upload) = temp_upload("scan.pdf", b"%PDF-1.4");
        let path = upload.path().to_path_buf();

        let err = h
            .ingestor
            .ingest(SourceInput::Document { upload, title: None, author: None })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Extraction(ExtractionFailure::DocumentEmpty)));
        assert!(err.to_string().contains("OCR"));
        assert!(!path.exists());
        assert!(h.store.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_import_removes_upload() {
        let text = "A document with plenty of words to pass the minimum length check easily.";
        let h = harness_with(
            MockGenerator::new("t"),
            MockExtractor::returning(text),
            MockTranscriber::returning(AudioTranscript::plain("unused")),
        )
        .await;
        let (_dir, upload) = temp_upload("Quarterly Report.docx", b"PK");
        let path = upload.path().to_path_buf();

        let outcome = h
            .ingestor
            .ingest(SourceInput::Document {
                upload,
                title: Some("Q3 report".to_string()),
                author: Some("Finance".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(outcome.title, "Q3 report");
        assert_eq!(outcome.kind, SourceKind::Document);
        assert!(!path.exists());

        let source = h.store.get_source(outcome.source_id).await.unwrap().unwrap();
        assert_eq!(source.file_name.as_deref(), Some("Quarterly Report.docx"));
    }

    #[tokio::test]
    async fn test_empty_transcription_is_rejected() {
        let h = harness_with(
            MockGenerator::new("t"),
            MockExtractor::returning("unused"),
            MockTranscriber::returning(AudioTranscript::plain("uh")),
        )
        .await;
        let (_dir, upload) = temp_upload("memo.mp3", &[0u8; 32]);

        let err = h
            .ingestor
            .ingest(SourceInput::Audio { upload, title: None, author: None })
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::Extraction(ExtractionFailure::TranscriptionEmpty)));
    }

    #[tokio::test]
    async fn test_audio_duration_estimated_from_size() {
        let h = harness_with(
            MockGenerator::failing("down"),
            MockExtractor::returning("unused"),
            MockTranscriber::returning(AudioTranscript::plain("A short voice memo about the roadmap.")),
        )
        .await;
        // 32 000 bytes at 128 kbps is two seconds.
        let (_dir, upload) = temp_upload("roadmap.mp3", &vec![0u8; 32_000]);

        let outcome = h
            .ingestor
            .ingest(SourceInput::Audio { upload, title: None, author: None })
            .await
            .unwrap();
        assert_eq!(outcome.title, "roadmap");

        let source = h.store.get_source(outcome.source_id).await.unwrap().unwrap();
        assert_eq!(source.duration_seconds, Some(2.0));
    }

    #[tokio::test]
    async fn test_playlist_continues_past_failures() {
        let h = harness().await;
        h.transcripts.add_video("aaaaaaaaaaa", hello_world());
        h.transcripts.add_video("bbbbbbbbbbb", hello_world());
        h.transcripts.set_playlist(&["aaaaaaaaaaa", "ccccccccccc", "bbbbbbbbbbb", "aaaaaaaaaaa"]);

        let report = h
            .ingestor
            .import_playlist("https://www.youtube.com/playlist?list=PLtestplaylist01")
            .await
            .unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.items.len(), 4);
        assert!(matches!(report.items[1].status, PlaylistItemStatus::Failed { .. }));
        assert!(matches!(report.items[3].status, PlaylistItemStatus::Skipped { .. }));
    }
}
